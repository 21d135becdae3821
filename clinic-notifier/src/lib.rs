//! 通知服务
//!
//! 订阅通知主题，为目录中的全部事件注册处理器：`notification.send`
//! 按渠道交给 `NotificationSender` 发送，其余事件只记录日志。
pub mod config;
pub mod handlers;
pub mod sender;
pub mod stats;

pub use config::NotifierConfig;
pub use handlers::{handlers, start};
pub use sender::{LogSender, NotificationSender};
pub use stats::{NotificationStats, StatsSnapshot};
