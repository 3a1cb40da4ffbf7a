use crate::core::TaskType;
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_max_attempts() -> u32 {
    2
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_response_timeout() -> Duration {
    Duration::from_secs(60 * 60)
}

/// How one kind of process is supervised.
///
/// Handler names default to `<process>.before`, `<process>.on_success` (or
/// `<process>.on_started` for two-stage processes) and `<process>.on_error`;
/// the supervisor itself runs as the db-function `<process>.supervise`.
///
/// ```
/// use courier::core::TaskType;
/// use courier::supervisor::SupervisorPolicy;
///
/// let policy = SupervisorPolicy::new("email_send", TaskType::EMAIL, "send_attempt_id")
///     .with_max_attempts(3);
/// assert_eq!(policy.function_name(), "email_send.supervise");
/// assert_eq!(policy.success_handler(), "email_send.on_success");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisorPolicy {
    /// Fact log namespace, e.g. `email_send`.
    pub process: String,
    /// Task type of the attempts this supervisor schedules.
    pub channel: TaskType,
    /// Payload field carrying the business entity id.
    pub id_field: String,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_poll_interval", with = "crate::config::duration_secs")]
    pub poll_interval: Duration,
    /// How long a started two-stage attempt may wait for its callback.
    #[serde(default = "default_response_timeout", with = "crate::config::duration_secs")]
    pub response_timeout: Duration,
    /// Attempts only start an external operation; completion arrives by callback.
    #[serde(default)]
    pub two_stage: bool,
    #[serde(default)]
    pub before_handler: Option<String>,
    #[serde(default)]
    pub success_handler: Option<String>,
    #[serde(default)]
    pub error_handler: Option<String>,
}

impl SupervisorPolicy {
    pub fn new(process: impl Into<String>, channel: TaskType, id_field: impl Into<String>) -> Self {
        Self {
            process: process.into(),
            channel,
            id_field: id_field.into(),
            max_attempts: default_max_attempts(),
            poll_interval: default_poll_interval(),
            response_timeout: default_response_timeout(),
            two_stage: false,
            before_handler: None,
            success_handler: None,
            error_handler: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn two_stage(mut self) -> Self {
        self.two_stage = true;
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

    /// Name under which the supervisor is registered as a db-function.
    pub fn function_name(&self) -> String {
        format!("{}.supervise", self.process)
    }

    pub fn before_handler(&self) -> String {
        self.before_handler
            .clone()
            .unwrap_or_else(|| format!("{}.before", self.process))
    }

    pub fn success_handler(&self) -> String {
        self.success_handler.clone().unwrap_or_else(|| {
            if self.two_stage {
                format!("{}.on_started", self.process)
            } else {
                format!("{}.on_success", self.process)
            }
        })
    }

    pub fn error_handler(&self) -> String {
        self.error_handler
            .clone()
            .unwrap_or_else(|| format!("{}.on_error", self.process))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let policy = SupervisorPolicy::new("transcription", TaskType::TRANSCRIPTION, "transcription_id");
        assert_eq!(policy.max_attempts, 2);
        assert_eq!(policy.poll_interval, Duration::from_secs(30));
        assert_eq!(policy.response_timeout, Duration::from_secs(3600));
        assert_eq!(policy.before_handler(), "transcription.before");
        assert_eq!(policy.error_handler(), "transcription.on_error");

        let two_stage = policy.two_stage();
        assert_eq!(two_stage.success_handler(), "transcription.on_started");
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let policy: SupervisorPolicy = serde_json::from_str(
            r#"{"process": "sms_send", "channel": "sms", "id_field": "send_attempt_id",
                "poll_interval": 5, "error_handler": "sms.failed"}"#,
        )
        .unwrap();
        assert_eq!(policy.channel, TaskType::SMS);
        assert_eq!(policy.max_attempts, 2);
        assert_eq!(policy.poll_interval, Duration::from_secs(5));
        assert_eq!(policy.error_handler(), "sms.failed");
        assert!(!policy.two_stage);
    }
}
