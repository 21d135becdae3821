use async_trait::async_trait;
use clinic_bus::catalog::{NotificationChannel, NotificationSend, PaymentFailed};
use clinic_bus::{BusConfig, EventBus, MemoryBroker};
use clinic_notifier::{NotificationSender, NotificationStats, NotifierConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 前 `failures` 次发送失败，之后成功，并记录所有成功的收件人
#[derive(Default)]
struct FlakySender {
    failures: usize,
    calls: AtomicUsize,
    delivered: Mutex<Vec<String>>,
}

#[async_trait]
impl NotificationSender for FlakySender {
    async fn send(&self, notification: &NotificationSend) -> anyhow::Result<()> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
            anyhow::bail!("smtp relay refused connection");
        }
        self.delivered.lock().unwrap().push(notification.to.clone());
        Ok(())
    }
}

async fn eventually(cond: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(3), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn notification(to: &str, channel: NotificationChannel) -> NotificationSend {
    NotificationSend {
        to: to.into(),
        channel,
        template: "appointment-reminder".into(),
        data: Default::default(),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn sent_notifications_are_counted_per_channel() -> anyhow::Result<()> {
    let broker = MemoryBroker::new();
    let bus = EventBus::new(Arc::new(broker.clone()), BusConfig::default());
    let config = NotifierConfig::default();
    let stats = Arc::new(NotificationStats::new());
    let sender = Arc::new(FlakySender::default());

    let subscription = clinic_notifier::start(
        &bus,
        &config,
        clinic_notifier::handlers(stats.clone(), sender.clone()),
    )
    .await
    .expect("subscription should start");

    bus.publish_event(&config.topic, &notification("a@example.com", NotificationChannel::Email), None)
        .await?;
    bus.publish_event(&config.topic, &notification("+15550100", NotificationChannel::Sms), None)
        .await?;
    bus.publish_event(
        &config.topic,
        &PaymentFailed {
            payment_id: "pay_1".into(),
            appointment_id: "a1".into(),
            reason: "card declined".into(),
        },
        None,
    )
    .await?;

    eventually(|| broker.acked(&config.subscription) == 3).await;
    let snapshot = stats.snapshot();
    assert_eq!(snapshot.processed, 2);
    assert_eq!(snapshot.failed, 0);
    assert_eq!(snapshot.by_channel["email"], 1);
    assert_eq!(snapshot.by_channel["sms"], 1);
    assert_eq!(snapshot.by_channel["push"], 0);

    subscription.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_send_is_counted_and_retried() -> anyhow::Result<()> {
    let broker = MemoryBroker::with_redelivery_delay(Duration::from_millis(5));
    let bus = EventBus::new(Arc::new(broker.clone()), BusConfig::default());
    let config = NotifierConfig::default();
    let stats = Arc::new(NotificationStats::new());
    let sender = Arc::new(FlakySender {
        failures: 1,
        ..Default::default()
    });

    let subscription = clinic_notifier::start(
        &bus,
        &config,
        clinic_notifier::handlers(stats.clone(), sender.clone()),
    )
    .await
    .expect("subscription should start");

    bus.publish_event(&config.topic, &notification("device-token", NotificationChannel::Push), None)
        .await?;

    eventually(|| broker.acked(&config.subscription) == 1).await;
    assert_eq!(broker.nacked(&config.subscription), 1);

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.failed, 1);
    assert_eq!(snapshot.processed, 1);
    assert_eq!(snapshot.by_channel["push"], 1);
    assert_eq!(*sender.delivered.lock().unwrap(), vec!["device-token".to_string()]);

    subscription.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn unavailable_broker_does_not_stop_the_service() {
    let broker = MemoryBroker::new();
    broker.set_unavailable(true);
    let bus = EventBus::new(Arc::new(broker.clone()), BusConfig::default());
    let stats = Arc::new(NotificationStats::new());

    let subscription = clinic_notifier::start(
        &bus,
        &NotifierConfig::default(),
        clinic_notifier::handlers(stats, Arc::new(FlakySender::default())),
    )
    .await;

    assert!(subscription.is_none());
}
