//! 事件总线统一错误定义
//!
//! 只覆盖发布侧与通道准备阶段会向调用方传播的错误；
//! 订阅侧的处理失败（handler 出错、消息损坏）不会向外传播，
//! 而是由分发器在消息粒度上转换为 ack/nack（见 `dispatcher::Disposition`）。
//!
use crate::catalog::ValidationError;
use thiserror::Error;

/// 统一错误类型
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BusError {
    // --- 载荷校验 ---
    #[error(transparent)]
    Validation(#[from] ValidationError),

    // --- 序列化 ---
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },
    #[error("type mismatch: expected={expected}, found={found}")]
    TypeMismatch { expected: String, found: String },

    // --- 消息中间件 ---
    #[error("broker unavailable: {reason}")]
    BrokerUnavailable { reason: String },
    #[error("publish timeout: topic={topic}, timeout_ms={timeout_ms}")]
    PublishTimeout { topic: String, timeout_ms: u128 },
    #[error("topic not found: {name}")]
    TopicNotFound { name: String },
    #[error("subscription not found: {name}")]
    SubscriptionNotFound { name: String },
}

impl BusError {
    pub fn broker_unavailable(reason: impl Into<String>) -> Self {
        BusError::BrokerUnavailable {
            reason: reason.into(),
        }
    }

    /// 是否为瞬时的传输层错误（调用方可自行决定是否重试整个请求）
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BusError::BrokerUnavailable { .. } | BusError::PublishTimeout { .. }
        )
    }
}

/// 统一 Result 类型别名
pub type BusResult<T> = Result<T, BusError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{EventName, validate};
    use serde_json::json;

    #[test]
    fn validation_error_converts_and_is_not_transient() {
        let err = validate(EventName::PaymentFailed, &json!({})).unwrap_err();
        let err: BusError = err.into();

        assert!(matches!(err, BusError::Validation(_)));
        assert!(!err.is_transient());
        assert!(err.to_string().contains("payment.failed"));
    }

    #[test]
    fn transport_errors_are_transient() {
        assert!(BusError::broker_unavailable("connection refused").is_transient());
        assert!(
            BusError::PublishTimeout {
                topic: "payments".into(),
                timeout_ms: 100,
            }
            .is_transient()
        );
        assert!(
            !BusError::SubscriptionNotFound {
                name: "x".into()
            }
            .is_transient()
        );
    }
}
