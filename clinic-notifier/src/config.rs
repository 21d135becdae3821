//! 通知服务配置
//!
//! | 变量                  | 默认值                  | 说明         |
//! |-----------------------|-------------------------|--------------|
//! | `TOPIC_NOTIFICATIONS` | `notifications`         | 订阅的主题   |
//! | `SUB_NOTIFICATIONS`   | `notifications-service` | 本服务的订阅 |
//!
//! 总线本身的变量见 `clinic_bus::config`。

const DEFAULT_TOPIC: &str = "notifications";
const DEFAULT_SUBSCRIPTION: &str = "notifications-service";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifierConfig {
    pub topic: String,
    pub subscription: String,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            topic: DEFAULT_TOPIC.to_string(),
            subscription: DEFAULT_SUBSCRIPTION.to_string(),
        }
    }
}

impl NotifierConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str, default: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            topic: read("TOPIC_NOTIFICATIONS", DEFAULT_TOPIC),
            subscription: read("SUB_NOTIFICATIONS", DEFAULT_SUBSCRIPTION),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = NotifierConfig::from_lookup(|_| None);
        assert_eq!(cfg, NotifierConfig::default());
        assert_eq!(cfg.subscription, "notifications-service");
    }

    #[test]
    fn overrides_are_read() {
        let cfg = NotifierConfig::from_lookup(|key| match key {
            "TOPIC_NOTIFICATIONS" => Some("alerts".into()),
            "SUB_NOTIFICATIONS" => Some(" ".into()),
            _ => None,
        });
        assert_eq!(cfg.topic, "alerts");
        assert_eq!(cfg.subscription, DEFAULT_SUBSCRIPTION);
    }
}
