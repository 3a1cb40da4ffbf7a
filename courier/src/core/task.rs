//! Task types and the stable task payload wire shape.

use super::error::Result;
use super::serialization::int_field;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::fmt;

/// The type of a task, used by the dispatcher to pick a processor.
///
/// Built-in types are associated constants; deployments add channel types
/// with [`TaskType::new`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskType(Cow<'static, str>);

impl TaskType {
    /// Generic function task: runs the handler named by `db_function`.
    pub const DB_FUNCTION: TaskType = TaskType(Cow::Borrowed("db_function"));
    /// Email channel send.
    pub const EMAIL: TaskType = TaskType(Cow::Borrowed("email"));
    /// SMS channel send.
    pub const SMS: TaskType = TaskType(Cow::Borrowed("sms"));
    /// Kickoff of an external asynchronous transcription.
    pub const TRANSCRIPTION: TaskType = TaskType(Cow::Borrowed("transcription"));

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for the generic function task type.
    pub fn is_function(&self) -> bool {
        *self == Self::DB_FUNCTION
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Payload carried by every task.
///
/// The shape is stable across all task types. Consumers extract what they
/// need; unknown fields land in `fields` and round-trip untouched. The single
/// correlation id field (e.g. `send_attempt_id`) lives in `fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPayload {
    pub task_type: TaskType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_function: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_handler: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_handler: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_handler: Option<String>,
    /// Attempt ordinal, set by the supervisor on channel tasks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl TaskPayload {
    /// Creates an empty payload of the given type.
    pub fn new(task_type: TaskType) -> Self {
        Self {
            task_type,
            db_function: None,
            before_handler: None,
            success_handler: None,
            error_handler: None,
            attempt: None,
            fields: Map::new(),
        }
    }

    /// Creates a `db_function` payload that runs the named function.
    pub fn function(name: impl Into<String>) -> Self {
        let mut payload = Self::new(TaskType::DB_FUNCTION);
        payload.db_function = Some(name.into());
        payload
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn with_before_handler(mut self, name: impl Into<String>) -> Self {
        self.before_handler = Some(name.into());
        self
    }

    pub fn with_success_handler(mut self, name: impl Into<String>) -> Self {
        self.success_handler = Some(name.into());
        self
    }

    pub fn with_error_handler(mut self, name: impl Into<String>) -> Self {
        self.error_handler = Some(name.into());
        self
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Reads an integer id field, typically the correlation id.
    pub fn id_field(&self, name: &str) -> Result<i64> {
        int_field(&self.fields, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_wire_shape() {
        let payload = TaskPayload::new(TaskType::EMAIL)
            .with_before_handler("email_before")
            .with_success_handler("email_success")
            .with_attempt(2)
            .with_field("send_attempt_id", 42);

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            value,
            json!({
                "task_type": "email",
                "before_handler": "email_before",
                "success_handler": "email_success",
                "attempt": 2,
                "send_attempt_id": 42,
            })
        );
    }

    #[test]
    fn test_payload_tolerates_extra_fields() {
        let payload: TaskPayload = serde_json::from_value(json!({
            "task_type": "db_function",
            "db_function": "supervise_email",
            "send_attempt_id": 7,
            "trace": {"origin": "api"},
        }))
        .unwrap();

        assert!(payload.task_type.is_function());
        assert_eq!(payload.db_function.as_deref(), Some("supervise_email"));
        assert_eq!(payload.id_field("send_attempt_id").unwrap(), 7);
        assert_eq!(payload.field("trace"), Some(&json!({"origin": "api"})));
        assert!(payload.id_field("missing").is_err());
    }

    #[test]
    fn test_custom_task_type_equals_constant() {
        assert_eq!(TaskType::new("sms"), TaskType::SMS);
        assert_eq!(TaskType::SMS.to_string(), "sms");
    }
}
