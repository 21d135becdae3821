//! 诊所服务之间的类型化事件总线
//!
//! 生产者按目录模式校验后发布信封，消费者为关心的事件注册处理器；
//! 处理成功确认，失败否认并交给中间件重投。中间件通过 `Broker` 协议接入，
//! 内置 `MemoryBroker` 供测试与本地开发使用。
pub mod broker;
pub mod bus;
pub mod catalog;
pub mod channel;
pub mod config;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod handler;
pub mod publisher;

pub use broker::{Broker, MemoryBroker};
pub use bus::EventBus;
pub use catalog::{CatalogEvent, EventName};
pub use config::BusConfig;
pub use dispatcher::{Disposition, Subscription};
pub use envelope::Envelope;
pub use error::{BusError, BusResult};
pub use handler::{EventHandler, HandlerTable};
