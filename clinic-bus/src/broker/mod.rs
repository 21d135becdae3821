//! 消息中间件（Broker）协议
//!
//! 事件总线与具体传输之间的唯一接缝：主题/订阅的存在性检查与创建、
//! 发布与拉取。创建操作在中间件侧应当是幂等的（已存在视为成功）。
//!
//! 每条投递的 `InboundMessage` 只能以 `ack` 或 `nack` 之一结束，
//! 二者都会消费消息本身，因此同一次投递不可能既确认又否认。
//! 未应答就被丢弃的消息由中间件在确认期限到期后重投。
//!
pub mod memory;
#[cfg(feature = "pubsub")]
pub mod pubsub;

pub use memory::MemoryBroker;
#[cfg(feature = "pubsub")]
pub use pubsub::PubSubBroker;

use crate::error::BusResult;
use async_trait::async_trait;
use futures_core::stream::BoxStream;
use std::collections::HashMap;
use std::fmt;

/// 消息中间件：负责主题/订阅管理、发布与拉取
#[async_trait]
pub trait Broker: Send + Sync {
    async fn topic_exists(&self, topic: &str) -> BusResult<bool>;

    async fn create_topic(&self, topic: &str) -> BusResult<()>;

    async fn subscription_exists(&self, subscription: &str) -> BusResult<bool>;

    async fn create_subscription(&self, topic: &str, subscription: &str) -> BusResult<()>;

    /// 发布一条消息，返回中间件分配的消息 ID
    async fn publish(&self, topic: &str, message: OutboundMessage) -> BusResult<String>;

    /// 返回一个 'static 生命周期的投递流，便于在 tokio::spawn 中消费；
    /// 流中的错误代表传输层问题（如断连），不对应任何具体消息
    async fn pull(&self, subscription: &str)
    -> BusResult<BoxStream<'static, BusResult<InboundMessage>>>;
}

/// 待发布的消息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundMessage {
    pub data: Vec<u8>,
    pub attributes: HashMap<String, String>,
}

impl OutboundMessage {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// 一次投递的应答通道，由具体中间件实现
pub trait AckReply: Send {
    fn ack(self: Box<Self>);
    fn nack(self: Box<Self>);
}

/// 投递到订阅上的消息
pub struct InboundMessage {
    message_id: String,
    data: Vec<u8>,
    attributes: HashMap<String, String>,
    delivery_attempt: u32,
    reply: Box<dyn AckReply>,
}

impl InboundMessage {
    pub fn new(
        message_id: impl Into<String>,
        data: Vec<u8>,
        attributes: HashMap<String, String>,
        delivery_attempt: u32,
        reply: Box<dyn AckReply>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            data,
            attributes,
            delivery_attempt,
            reply,
        }
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// 第几次投递（从 1 开始）
    pub fn delivery_attempt(&self) -> u32 {
        self.delivery_attempt
    }

    /// 确认：消息已处理，不再重投
    pub fn ack(self) {
        self.reply.ack();
    }

    /// 否认：处理失败，由中间件按自身退避策略重投
    pub fn nack(self) {
        self.reply.nack();
    }
}

impl fmt::Debug for InboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundMessage")
            .field("message_id", &self.message_id)
            .field("bytes", &self.data.len())
            .field("attributes", &self.attributes)
            .field("delivery_attempt", &self.delivery_attempt)
            .finish_non_exhaustive()
    }
}
