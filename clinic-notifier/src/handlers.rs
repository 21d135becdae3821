//! 通知服务的事件处理器
use crate::config::NotifierConfig;
use crate::sender::NotificationSender;
use crate::stats::NotificationStats;
use clinic_bus::catalog::{
    AppointmentCancelled, AppointmentCreated, NotificationSend, PaymentCompleted, PaymentFailed,
};
use clinic_bus::{Envelope, EventBus, HandlerTable, Subscription};
use std::sync::Arc;
use tracing::{error, info};

/// 构建处理器表，覆盖目录中的全部事件
pub fn handlers(stats: Arc<NotificationStats>, sender: Arc<dyn NotificationSender>) -> HandlerTable {
    HandlerTable::new()
        .on(move |env: Envelope, notification: NotificationSend| {
            let stats = stats.clone();
            let sender = sender.clone();
            async move { deliver(&env, &notification, &stats, sender.as_ref()).await }
        })
        .on(appointment_created)
        .on(appointment_cancelled)
        .on(payment_completed)
        .on(payment_failed)
}

async fn appointment_created(env: Envelope, event: AppointmentCreated) -> anyhow::Result<()> {
    info!(
        event_id = env.id(),
        appointment_id = %event.appointment_id,
        "appointment created"
    );
    Ok(())
}

async fn appointment_cancelled(env: Envelope, event: AppointmentCancelled) -> anyhow::Result<()> {
    info!(
        event_id = env.id(),
        appointment_id = %event.appointment_id,
        reason = event.reason.as_deref(),
        "appointment cancelled"
    );
    Ok(())
}

async fn payment_completed(env: Envelope, event: PaymentCompleted) -> anyhow::Result<()> {
    info!(
        event_id = env.id(),
        payment_id = %event.payment_id,
        amount = event.amount,
        currency = %event.currency,
        "payment completed"
    );
    Ok(())
}

async fn payment_failed(env: Envelope, event: PaymentFailed) -> anyhow::Result<()> {
    info!(
        event_id = env.id(),
        payment_id = %event.payment_id,
        reason = %event.reason,
        "payment failed"
    );
    Ok(())
}

async fn deliver(
    env: &Envelope,
    notification: &NotificationSend,
    stats: &NotificationStats,
    sender: &dyn NotificationSender,
) -> anyhow::Result<()> {
    info!(
        event_id = env.id(),
        channel = %notification.channel,
        to = %notification.to,
        template = %notification.template,
        "sending notification"
    );

    match sender.send(notification).await {
        Ok(()) => {
            stats.record_sent(notification.channel);
            info!(event_id = env.id(), "notification sent");
            Ok(())
        }
        Err(err) => {
            stats.record_failed();
            error!(event_id = env.id(), error = %err, "failed to send notification");
            Err(err)
        }
    }
}

/// 准备主题与订阅并开始消费
///
/// 中间件不可用时只记录错误并返回 `None`，服务继续运行。
pub async fn start(
    bus: &EventBus,
    config: &NotifierConfig,
    handlers: HandlerTable,
) -> Option<Subscription> {
    match bus
        .subscribe_to(&config.topic, &config.subscription, handlers)
        .await
    {
        Ok(subscription) => {
            info!(
                topic = %config.topic,
                subscription = %config.subscription,
                "listening for notification events"
            );
            Some(subscription)
        }
        Err(err) => {
            error!(
                topic = %config.topic,
                subscription = %config.subscription,
                error = %err,
                "failed to initialize event bus, continuing without subscription"
            );
            None
        }
    }
}
