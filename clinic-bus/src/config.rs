//! 事件总线配置
//!
//! # 环境变量
//!
//! | 变量                            | 默认值 | 说明                                   |
//! |---------------------------------|--------|----------------------------------------|
//! | `GOOGLE_CLOUD_PROJECT`          | --     | 中间件项目/命名空间，缺省时由客户端自动发现 |
//! | `PUBSUB_EMULATOR_HOST`          | --     | 本地模拟器地址                          |
//! | `EVENT_BUS_PUBLISH_TIMEOUT_MS`  | `10000`| 等待发布确认的超时                      |
//! | `EVENT_BUS_MAX_CONCURRENCY`     | `16`   | 单个订阅同时处理的消息数上限             |
//!
use bon::Builder;
use std::time::Duration;

const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_CONCURRENT_MESSAGES: usize = 16;

#[derive(Clone, Debug, Builder)]
pub struct BusConfig {
    /// 中间件项目标识，用于拼接资源路径
    pub project_id: Option<String>,
    pub emulator_host: Option<String>,
    #[builder(default = DEFAULT_PUBLISH_TIMEOUT)]
    pub publish_timeout: Duration,
    #[builder(default = DEFAULT_MAX_CONCURRENT_MESSAGES)]
    pub max_concurrent_messages: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            emulator_host: None,
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
            max_concurrent_messages: DEFAULT_MAX_CONCURRENT_MESSAGES,
        }
    }
}

impl BusConfig {
    /// 从进程环境读取配置；数值非法时回退到默认值
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let publish_timeout = non_empty("EVENT_BUS_PUBLISH_TIMEOUT_MS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .map_or(DEFAULT_PUBLISH_TIMEOUT, Duration::from_millis);

        let max_concurrent_messages = non_empty("EVENT_BUS_MAX_CONCURRENCY")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_CONCURRENT_MESSAGES);

        Self {
            project_id: non_empty("GOOGLE_CLOUD_PROJECT"),
            emulator_host: non_empty("PUBSUB_EMULATOR_HOST"),
            publish_timeout,
            max_concurrent_messages,
        }
    }

    /// 是否连接的是本地模拟器
    pub fn is_emulator(&self) -> bool {
        self.emulator_host.is_some()
    }
}
