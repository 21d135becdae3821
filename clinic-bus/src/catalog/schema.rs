//! 结构化载荷模式（Schema）
//!
//! 只描述字段是否存在与原始类型，不承载业务规则（例如金额正负），
//! 业务规则属于调用方的职责。
//!
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// 字段的原始类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Number,
    /// 取值受限的字符串
    OneOf(&'static [&'static str]),
    /// 任意键值的 JSON 对象
    Record,
}

impl FieldKind {
    fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Number => value.is_number(),
            FieldKind::OneOf(allowed) => value
                .as_str()
                .is_some_and(|s| allowed.iter().any(|a| *a == s)),
            FieldKind::Record => value.is_object(),
        }
    }

    fn expected(&self) -> String {
        match self {
            FieldKind::String => "string".to_string(),
            FieldKind::Number => "number".to_string(),
            FieldKind::OneOf(allowed) => format!("one of {}", allowed.join("|")),
            FieldKind::Record => "object".to_string(),
        }
    }
}

/// 字段缺省时的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Required,
    Optional,
    /// 缺省时填入给定字符串
    DefaultStr(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
    pub presence: Presence,
}

impl Field {
    pub const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            presence: Presence::Required,
        }
    }

    pub const fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            presence: Presence::Optional,
        }
    }

    pub const fn with_default(name: &'static str, kind: FieldKind, default: &'static str) -> Self {
        Self {
            name,
            kind,
            presence: Presence::DefaultStr(default),
        }
    }
}

/// 一个事件载荷的完整模式
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    fields: &'static [Field],
}

impl Schema {
    pub const fn new(fields: &'static [Field]) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &'static [Field] {
        self.fields
    }

    /// 校验并返回规范化后的载荷：补齐默认值、丢弃未声明的字段。
    /// 收集全部字段问题后一次性返回，而不是遇到第一个就失败。
    pub fn check(&self, payload: &Value) -> Result<Value, Vec<FieldIssue>> {
        let Some(object) = payload.as_object() else {
            return Err(vec![FieldIssue::new(
                "",
                format!("expected object, received {}", type_name(payload)),
            )]);
        };

        let mut normalized = Map::new();
        let mut issues = Vec::new();

        for field in self.fields {
            match object.get(field.name) {
                Some(value) if field.kind.accepts(value) => {
                    normalized.insert(field.name.to_string(), value.clone());
                }
                Some(value) => issues.push(FieldIssue::new(
                    field.name,
                    format!(
                        "expected {}, received {}",
                        field.kind.expected(),
                        describe(value)
                    ),
                )),
                None => match field.presence {
                    Presence::Required => issues.push(FieldIssue::new(field.name, "required")),
                    Presence::Optional => {}
                    Presence::DefaultStr(default) => {
                        normalized.insert(field.name.to_string(), Value::from(default));
                    }
                },
            }
        }

        if issues.is_empty() {
            Ok(Value::Object(normalized))
        } else {
            Err(issues)
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => format!("string \"{s}\""),
        other => type_name(other).to_string(),
    }
}

/// 单个字段的诊断信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldIssue {
    /// 字段路径，空字符串代表载荷本身
    pub path: String,
    pub message: String,
}

impl FieldIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// 载荷与目录模式不符，或事件名不在目录中
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("validation failed: event={event}, issues=[{}]", join_issues(.issues))]
pub struct ValidationError {
    pub event: String,
    pub issues: Vec<FieldIssue>,
}

impl ValidationError {
    pub fn new(event: impl Into<String>, issues: Vec<FieldIssue>) -> Self {
        Self {
            event: event.into(),
            issues,
        }
    }

    pub fn unknown_event(name: &str) -> Self {
        Self::new(name, vec![FieldIssue::new("name", "unknown event")])
    }

    /// 查找某个字段上的问题
    pub fn issue(&self, path: &str) -> Option<&FieldIssue> {
        self.issues.iter().find(|i| i.path == path)
    }
}

fn join_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
