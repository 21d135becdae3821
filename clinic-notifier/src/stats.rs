//! 处理计数
//!
//! 处理器在多个任务中并发更新，计数器因此使用原子类型；
//! 对外只暴露可序列化的快照。
use clinic_bus::catalog::NotificationChannel;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct NotificationStats {
    processed: AtomicU64,
    failed: AtomicU64,
    email: AtomicU64,
    sms: AtomicU64,
    push: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub processed: u64,
    pub failed: u64,
    pub by_channel: BTreeMap<String, u64>,
}

impl NotificationStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sent(&self, channel: NotificationChannel) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.channel_counter(channel).fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let by_channel = [
            NotificationChannel::Email,
            NotificationChannel::Sms,
            NotificationChannel::Push,
        ]
        .into_iter()
        .map(|c| {
            (
                c.as_str().to_string(),
                self.channel_counter(c).load(Ordering::Relaxed),
            )
        })
        .collect();

        StatsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            by_channel,
        }
    }

    fn channel_counter(&self, channel: NotificationChannel) -> &AtomicU64 {
        match channel {
            NotificationChannel::Email => &self.email,
            NotificationChannel::Sms => &self.sms,
            NotificationChannel::Push => &self.push,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn snapshot_serializes_every_channel() {
        let stats = NotificationStats::new();
        stats.record_sent(NotificationChannel::Sms);
        stats.record_sent(NotificationChannel::Sms);
        stats.record_failed();

        let value = serde_json::to_value(stats.snapshot()).unwrap();
        assert_eq!(
            value,
            json!({
                "processed": 2,
                "failed": 1,
                "byChannel": {"email": 0, "sms": 2, "push": 0}
            })
        );
    }
}
