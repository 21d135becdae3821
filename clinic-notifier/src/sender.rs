//! 通知发送渠道
use async_trait::async_trait;
use clinic_bus::catalog::{NotificationChannel, NotificationSend};
use std::time::Duration;
use tracing::info;

/// 按渠道投递一条通知；返回错误会让对应消息被否认并重投
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, notification: &NotificationSend) -> anyhow::Result<()>;
}

/// 只写日志的发送方，用于本地开发与演示；`latency` 模拟外部服务的耗时
#[derive(Debug, Clone, Default)]
pub struct LogSender {
    latency: Duration,
}

impl LogSender {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl NotificationSender for LogSender {
    async fn send(&self, notification: &NotificationSend) -> anyhow::Result<()> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let to = notification.to.as_str();
        let template = notification.template.as_str();
        match notification.channel {
            NotificationChannel::Email => info!(to, subject = template, "email sent"),
            NotificationChannel::Sms => info!(to, message = template, "sms sent"),
            NotificationChannel::Push => info!(to, title = template, "push notification sent"),
        }
        Ok(())
    }
}
