use super::EventName;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// 目录事件载荷需要满足的能力边界：与唯一的事件名绑定
pub trait CatalogEvent:
    Clone + PartialEq + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const NAME: EventName;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentCreated {
    pub appointment_id: String,
    pub patient_id: String,
    pub doctor_id: String,
    /// ISO-8601 时间字符串，格式不在此处校验
    pub datetime: String,
}

impl CatalogEvent for AppointmentCreated {
    const NAME: EventName = EventName::AppointmentCreated;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentCancelled {
    pub appointment_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CatalogEvent for AppointmentCancelled {
    const NAME: EventName = EventName::AppointmentCancelled;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentCompleted {
    pub payment_id: String,
    pub appointment_id: String,
    /// 不限制正负，业务规则由调用方负责
    pub amount: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

impl CatalogEvent for PaymentCompleted {
    const NAME: EventName = EventName::PaymentCompleted;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentFailed {
    pub payment_id: String,
    pub appointment_id: String,
    pub reason: String,
}

impl CatalogEvent for PaymentFailed {
    const NAME: EventName = EventName::PaymentFailed;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannel {
    Email,
    Sms,
    Push,
}

impl NotificationChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationChannel::Email => "email",
            NotificationChannel::Sms => "sms",
            NotificationChannel::Push => "push",
        }
    }
}

impl fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSend {
    pub to: String,
    pub channel: NotificationChannel,
    pub template: String,
    pub data: Map<String, Value>,
}

impl CatalogEvent for NotificationSend {
    const NAME: EventName = EventName::NotificationSend;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::validate;
    use serde_json::json;

    // 类型化载荷序列化后必须能通过同名事件的结构化模式
    fn assert_conforms<E: CatalogEvent>(event: E) {
        let value = serde_json::to_value(&event).unwrap();
        let normalized = validate(E::NAME, &value).unwrap();
        let back: E = serde_json::from_value(normalized).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn typed_payloads_conform_to_their_schemas() {
        assert_conforms(AppointmentCreated {
            appointment_id: "a1".into(),
            patient_id: "p1".into(),
            doctor_id: "d1".into(),
            datetime: "2024-01-01T10:00:00Z".into(),
        });
        assert_conforms(AppointmentCancelled {
            appointment_id: "a1".into(),
            reason: None,
        });
        assert_conforms(PaymentCompleted {
            payment_id: "pay_1".into(),
            appointment_id: "a1".into(),
            amount: 12.5,
            currency: "EUR".into(),
        });
        assert_conforms(PaymentFailed {
            payment_id: "pay_1".into(),
            appointment_id: "a1".into(),
            reason: "card declined".into(),
        });
        assert_conforms(NotificationSend {
            to: "p1@example.com".into(),
            channel: NotificationChannel::Sms,
            template: "reminder".into(),
            data: Map::new(),
        });
    }

    #[test]
    fn currency_defaults_when_decoding() {
        let p: PaymentCompleted =
            serde_json::from_value(json!({"paymentId": "p", "appointmentId": "a", "amount": 1}))
                .unwrap();
        assert_eq!(p.currency, "USD");
    }
}
