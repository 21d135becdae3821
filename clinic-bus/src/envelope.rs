//! 事件信封（Envelope）
//!
//! 线上格式：
//! ```text
//! { "id": string, "name": string, "payload": object, "ts": ISO-8601, "traceId"?: string }
//! attributes: { "eventName": string }
//! ```
//! 信封在发布时创建，之后不再修改；`id` 与 `ts` 只在构造时生成，
//! 重新序列化不会改变它们。
//!
use crate::catalog::{CatalogEvent, EventName};
use crate::error::{BusError, BusResult};
use bon::Builder;
use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Mutex;
use uuid::Uuid;

/// 随消息体一起发送的消息属性键，消费方可据此在不反序列化的情况下过滤
pub const EVENT_NAME_ATTRIBUTE: &str = "eventName";

#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// 全局唯一，发布时生成，供消费方做幂等与追踪
    #[builder(default = Uuid::new_v4().to_string())]
    id: String,
    name: EventName,
    payload: Value,
    #[builder(default = now_millis())]
    ts: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    trace_id: Option<String>,
}

impl Envelope {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> EventName {
        self.name
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn ts(&self) -> DateTime<Utc> {
        self.ts
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    pub fn to_bytes(&self) -> BusResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> BusResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// 将载荷解码为对应的类型化事件；事件名不匹配时返回 `TypeMismatch`
    pub fn decode<E: CatalogEvent>(&self) -> BusResult<E> {
        if self.name != E::NAME {
            return Err(BusError::TypeMismatch {
                expected: E::NAME.to_string(),
                found: self.name.to_string(),
            });
        }
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

fn now_millis() -> DateTime<Utc> {
    truncate_millis(Utc::now())
}

fn truncate_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.duration_trunc(TimeDelta::milliseconds(1)).unwrap_or(ts)
}

/// 进程内单调不减的时间戳来源
///
/// 墙钟回拨时沿用上一次的时间戳，保证同一发布进程产生的 `ts` 不会倒退。
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.observe(now_millis())
    }

    fn observe(&self, wall: DateTime<Utc>) -> DateTime<Utc> {
        // 锁中毒时仍可安全读取内部值
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let ts = match *last {
            Some(prev) if prev > wall => prev,
            _ => wall,
        };
        *last = Some(ts);
        ts
    }
}
