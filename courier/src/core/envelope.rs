//! The handler result envelope returned by every invoked business function.
//!
//! One canonical shape is used internally:
//! `{ success, error?, validation_failure_message?, payload? }`.
//! The alternate `status` string form is accepted on input and mapped as
//! `"succeeded"` ⇔ `success == true`, `"failed"` ⇔ `success == false` with an
//! `error`, `"invalid"` ⇔ `success == false` with a `validation_failure_message`.

use super::error::CoreError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Coarse status of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerStatus {
    Succeeded,
    /// Operational or business failure; retriable by the supervisor.
    Failed,
    /// Validation failure; never retried.
    Invalid,
}

impl HandlerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandlerStatus::Succeeded => "succeeded",
            HandlerStatus::Failed => "failed",
            HandlerStatus::Invalid => "invalid",
        }
    }
}

impl fmt::Display for HandlerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result envelope of a handler invocation.
///
/// Constructed only through [`HandlerResult::ok`], [`HandlerResult::error`]
/// and [`HandlerResult::invalid`], so `error` and
/// `validation_failure_message` never appear together and a failure never
/// carries a payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireEnvelope", into = "WireEnvelope")]
pub struct HandlerResult {
    success: bool,
    error: Option<String>,
    validation_failure_message: Option<String>,
    payload: Option<Map<String, Value>>,
}

impl HandlerResult {
    /// Success with a payload for the next stage.
    pub fn ok(payload: Map<String, Value>) -> Self {
        Self {
            success: true,
            error: None,
            validation_failure_message: None,
            payload: Some(payload),
        }
    }

    /// Success without a payload.
    pub fn done() -> Self {
        Self {
            success: true,
            error: None,
            validation_failure_message: None,
            payload: None,
        }
    }

    /// Operational or business failure.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            validation_failure_message: None,
            payload: None,
        }
    }

    /// Non-retriable validation failure.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: None,
            validation_failure_message: Some(message.into()),
            payload: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn status(&self) -> HandlerStatus {
        if self.success {
            HandlerStatus::Succeeded
        } else if self.validation_failure_message.is_some() {
            HandlerStatus::Invalid
        } else {
            HandlerStatus::Failed
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn validation_failure_message(&self) -> Option<&str> {
        self.validation_failure_message.as_deref()
    }

    /// Human-readable failure reason, whichever field carries it.
    pub fn failure_reason(&self) -> Option<&str> {
        self.error
            .as_deref()
            .or(self.validation_failure_message.as_deref())
    }

    pub fn payload(&self) -> Option<&Map<String, Value>> {
        self.payload.as_ref()
    }

    pub fn into_payload(self) -> Map<String, Value> {
        self.payload.unwrap_or_default()
    }
}

#[derive(Serialize, Deserialize)]
struct WireEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    success: Option<bool>,
    #[serde(default, skip_serializing)]
    status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    validation_failure_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<Map<String, Value>>,
}

impl TryFrom<WireEnvelope> for HandlerResult {
    type Error = CoreError;

    fn try_from(wire: WireEnvelope) -> Result<Self, Self::Error> {
        let success = match (wire.success, wire.status.as_deref()) {
            (Some(success), _) => success,
            (None, Some("succeeded")) => true,
            (None, Some("failed" | "invalid")) => false,
            (None, Some(other)) => {
                return Err(CoreError::InvalidEnvelope(format!("unknown status `{other}`")))
            }
            (None, None) => {
                return Err(CoreError::InvalidEnvelope(
                    "neither `success` nor `status` present".to_string(),
                ))
            }
        };

        match (
            success,
            wire.error,
            wire.validation_failure_message,
            wire.payload,
        ) {
            (true, None, None, payload) => Ok(Self {
                success: true,
                error: None,
                validation_failure_message: None,
                payload,
            }),
            (true, _, _, _) => Err(CoreError::InvalidEnvelope(
                "successful envelope carries a failure message".to_string(),
            )),
            (false, Some(_), Some(_), _) => Err(CoreError::InvalidEnvelope(
                "`error` and `validation_failure_message` are mutually exclusive".to_string(),
            )),
            (false, _, _, Some(_)) => Err(CoreError::InvalidEnvelope(
                "failed envelope carries a payload".to_string(),
            )),
            (false, Some(error), None, None) => Ok(Self::error(error)),
            (false, None, Some(message), None) => Ok(Self::invalid(message)),
            (false, None, None, None) => Err(CoreError::InvalidEnvelope(
                "failed envelope carries no reason".to_string(),
            )),
        }
    }
}

impl From<HandlerResult> for WireEnvelope {
    fn from(result: HandlerResult) -> Self {
        Self {
            success: Some(result.success),
            status: None,
            error: result.error,
            validation_failure_message: result.validation_failure_message,
            payload: result.payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_shape() {
        let mut payload = Map::new();
        payload.insert("to".to_string(), json!("a@example.com"));

        let value = serde_json::to_value(HandlerResult::ok(payload)).unwrap();
        assert_eq!(value, json!({"success": true, "payload": {"to": "a@example.com"}}));

        let value = serde_json::to_value(HandlerResult::invalid("no recipient")).unwrap();
        assert_eq!(
            value,
            json!({"success": false, "validation_failure_message": "no recipient"})
        );
    }

    #[test]
    fn test_status_form_maps_to_canonical() {
        let ok: HandlerResult =
            serde_json::from_value(json!({"status": "succeeded", "payload": {"id": 1}})).unwrap();
        assert!(ok.is_success());
        assert_eq!(ok.status(), HandlerStatus::Succeeded);

        let invalid: HandlerResult = serde_json::from_value(
            json!({"status": "invalid", "validation_failure_message": "bad phone"}),
        )
        .unwrap();
        assert_eq!(invalid.status(), HandlerStatus::Invalid);
        assert_eq!(invalid.failure_reason(), Some("bad phone"));

        let failed: HandlerResult =
            serde_json::from_value(json!({"status": "failed", "error": "timeout"})).unwrap();
        assert_eq!(failed.status(), HandlerStatus::Failed);
        assert_eq!(failed.status().to_string(), "failed");
    }

    #[test]
    fn test_error_and_validation_are_exclusive() {
        let result = serde_json::from_value::<HandlerResult>(json!({
            "success": false,
            "error": "boom",
            "validation_failure_message": "bad input",
        }));
        assert!(result.is_err());

        let result = serde_json::from_value::<HandlerResult>(json!({
            "success": false,
            "validation_failure_message": "bad input",
            "payload": {"to": "x"},
        }));
        assert!(result.is_err());
    }
}
