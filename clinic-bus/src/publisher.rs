//! 事件发布（Publisher）
//!
//! 发布流程：
//! 1. 按目录模式校验载荷，失败立即返回 `ValidationError`，不会产生任何消息；
//! 2. 构造信封（新的 `id`、当前 `ts`、可选的 `traceId`）；
//! 3. 序列化信封，并把事件名作为消息属性一并附带；
//! 4. 通过通道管理确保主题存在后提交；
//! 5. 中间件拒绝或超时未确认时返回 `BrokerUnavailable` / `PublishTimeout`，
//!    超时覆盖第 4 步的全部往返（包括首次发布时的主题检查与创建）。
//!
//! 本模块不做发布重试，是否重试整个请求由调用方决定。
//!
use crate::broker::OutboundMessage;
use crate::catalog::{self, CatalogEvent, EventName};
use crate::channel::ChannelManager;
use crate::envelope::{EVENT_NAME_ATTRIBUTE, Envelope, MonotonicClock};
use crate::error::{BusError, BusResult};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// 发布结果：中间件分配的投递 ID 与已发送的信封
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub delivery_id: String,
    pub event: Envelope,
}

pub struct Publisher {
    channels: Arc<ChannelManager>,
    clock: MonotonicClock,
    publish_timeout: Duration,
}

impl Publisher {
    pub fn new(channels: Arc<ChannelManager>, publish_timeout: Duration) -> Self {
        Self {
            channels,
            clock: MonotonicClock::new(),
            publish_timeout,
        }
    }

    pub async fn publish(
        &self,
        topic: &str,
        name: EventName,
        payload: &Value,
        trace_id: Option<String>,
    ) -> BusResult<Published> {
        let payload = catalog::validate(name, payload)?;

        let event = Envelope::builder()
            .name(name)
            .payload(payload)
            .ts(self.clock.now())
            .maybe_trace_id(trace_id)
            .build();
        let message =
            OutboundMessage::new(event.to_bytes()?).with_attribute(EVENT_NAME_ATTRIBUTE, name.as_str());

        // 主题准备与提交共用同一个超时
        let send = async {
            let handle = self.channels.ensure_topic(topic).await?;
            self.channels.broker().publish(handle.name(), message).await
        };
        let delivery_id = tokio::time::timeout(self.publish_timeout, send)
            .await
            .map_err(|_| BusError::PublishTimeout {
                topic: topic.to_string(),
                timeout_ms: self.publish_timeout.as_millis(),
            })??;

        debug!(
            topic,
            event_id = event.id(),
            event_name = %name,
            delivery_id = %delivery_id,
            "event published"
        );
        Ok(Published { delivery_id, event })
    }

    /// 类型化发布：载荷结构体决定事件名，仍然经过目录校验
    pub async fn publish_event<E: CatalogEvent>(
        &self,
        topic: &str,
        event: &E,
        trace_id: Option<String>,
    ) -> BusResult<Published> {
        let payload = serde_json::to_value(event)?;
        self.publish(topic, E::NAME, &payload, trace_id).await
    }
}
