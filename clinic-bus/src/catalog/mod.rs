//! 事件目录（Event Catalog）
//!
//! 封闭的事件名集合与每个事件载荷的结构化模式，进程生命周期内不可变。
//! 发布侧（发送前）与分发侧（接收后）使用同一个 `validate`，
//! 无论模式违规来自异常的生产者还是传输损坏，都能被对称地捕获。
//!
//! 事件名 `EventName` 是标签，`payloads` 中的结构体是各标签对应的载荷，
//! 二者共同构成目录在边界上的和类型表示。

mod payloads;
mod schema;

pub use payloads::{
    AppointmentCancelled, AppointmentCreated, CatalogEvent, NotificationChannel, NotificationSend,
    PaymentCompleted, PaymentFailed,
};
pub use schema::{Field, FieldIssue, FieldKind, Presence, Schema, ValidationError};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// 目录中的事件名（封闭集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventName {
    #[serde(rename = "appointment.created")]
    AppointmentCreated,
    #[serde(rename = "appointment.cancelled")]
    AppointmentCancelled,
    #[serde(rename = "payment.completed")]
    PaymentCompleted,
    #[serde(rename = "payment.failed")]
    PaymentFailed,
    #[serde(rename = "notification.send")]
    NotificationSend,
}

const APPOINTMENT_CREATED: &[Field] = &[
    Field::required("appointmentId", FieldKind::String),
    Field::required("patientId", FieldKind::String),
    Field::required("doctorId", FieldKind::String),
    Field::required("datetime", FieldKind::String),
];

const APPOINTMENT_CANCELLED: &[Field] = &[
    Field::required("appointmentId", FieldKind::String),
    Field::optional("reason", FieldKind::String),
];

const PAYMENT_COMPLETED: &[Field] = &[
    Field::required("paymentId", FieldKind::String),
    Field::required("appointmentId", FieldKind::String),
    Field::required("amount", FieldKind::Number),
    Field::with_default("currency", FieldKind::String, "USD"),
];

const PAYMENT_FAILED: &[Field] = &[
    Field::required("paymentId", FieldKind::String),
    Field::required("appointmentId", FieldKind::String),
    Field::required("reason", FieldKind::String),
];

const NOTIFICATION_SEND: &[Field] = &[
    Field::required("to", FieldKind::String),
    Field::required("channel", FieldKind::OneOf(&["email", "sms", "push"])),
    Field::required("template", FieldKind::String),
    Field::required("data", FieldKind::Record),
];

impl EventName {
    pub const ALL: [EventName; 5] = [
        EventName::AppointmentCreated,
        EventName::AppointmentCancelled,
        EventName::PaymentCompleted,
        EventName::PaymentFailed,
        EventName::NotificationSend,
    ];

    /// 线上（wire）使用的事件名
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::AppointmentCreated => "appointment.created",
            EventName::AppointmentCancelled => "appointment.cancelled",
            EventName::PaymentCompleted => "payment.completed",
            EventName::PaymentFailed => "payment.failed",
            EventName::NotificationSend => "notification.send",
        }
    }

    pub fn schema(&self) -> Schema {
        match self {
            EventName::AppointmentCreated => Schema::new(APPOINTMENT_CREATED),
            EventName::AppointmentCancelled => Schema::new(APPOINTMENT_CANCELLED),
            EventName::PaymentCompleted => Schema::new(PAYMENT_COMPLETED),
            EventName::PaymentFailed => Schema::new(PAYMENT_FAILED),
            EventName::NotificationSend => Schema::new(NOTIFICATION_SEND),
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventName::ALL
            .into_iter()
            .find(|n| n.as_str() == s)
            .ok_or_else(|| ValidationError::unknown_event(s))
    }
}

/// 按目录模式校验载荷，返回规范化后的载荷（补齐默认值、去掉未声明字段）
pub fn validate(name: EventName, payload: &Value) -> Result<Value, ValidationError> {
    name.schema()
        .check(payload)
        .map_err(|issues| ValidationError::new(name.as_str(), issues))
}

/// 同 `validate`，但事件名来自运行时字符串；不在目录中的名称同样视为校验失败
pub fn validate_named(name: &str, payload: &Value) -> Result<Value, ValidationError> {
    validate(name.parse()?, payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn every_name_round_trips_through_its_wire_form() {
        for name in EventName::ALL {
            assert_eq!(name.as_str().parse::<EventName>().unwrap(), name);
            assert_eq!(
                serde_json::to_value(name).unwrap(),
                Value::from(name.as_str())
            );
            assert!(!name.schema().fields().is_empty());
        }
    }

    #[test]
    fn appointment_created_requires_all_string_fields() {
        let ok = validate(
            EventName::AppointmentCreated,
            &json!({
                "appointmentId": "a1",
                "patientId": "p1",
                "doctorId": "d1",
                "datetime": "2024-01-01T10:00:00Z"
            }),
        );
        assert!(ok.is_ok());

        let err = validate(
            EventName::AppointmentCreated,
            &json!({"appointmentId": "a1", "patientId": 7}),
        )
        .unwrap_err();
        assert_eq!(err.event, "appointment.created");
        assert_eq!(err.issue("patientId").unwrap().message, "expected string, received number");
        assert_eq!(err.issue("doctorId").unwrap().message, "required");
        assert_eq!(err.issue("datetime").unwrap().message, "required");
    }

    #[test]
    fn payment_completed_defaults_currency_and_ignores_sign() {
        let out = validate(
            EventName::PaymentCompleted,
            &json!({"paymentId": "pay_1", "appointmentId": "a1", "amount": -5}),
        )
        .unwrap();
        assert_eq!(out["currency"], "USD");
        assert_eq!(out["amount"], -5);
    }

    #[test]
    fn appointment_cancelled_reason_is_optional() {
        assert!(validate(EventName::AppointmentCancelled, &json!({"appointmentId": "a1"})).is_ok());
        assert!(
            validate(
                EventName::AppointmentCancelled,
                &json!({"appointmentId": "a1", "reason": "sick"})
            )
            .is_ok()
        );
    }

    #[test]
    fn notification_channel_is_closed() {
        let err = validate(
            EventName::NotificationSend,
            &json!({"to": "x", "channel": "fax", "template": "t", "data": {}}),
        )
        .unwrap_err();
        assert_eq!(err.issues.len(), 1);
        assert_eq!(err.issues[0].path, "channel");
    }

    #[test]
    fn unknown_names_fail_validation() {
        let err = validate_named("order.shipped", &json!({})).unwrap_err();
        assert_eq!(err.event, "order.shipped");
        assert_eq!(err.issue("name").unwrap().message, "unknown event");
    }
}
