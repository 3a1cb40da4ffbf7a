//! Queue types for the durable task store.

use crate::core::{ProcessKey, TaskPayload, TaskType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Status of a task in the queue.
///
/// `Running` only means a lease was taken at some point; whether the task is
/// claimable again is decided by the lease expiry, not by the status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Task is waiting to be claimed by a worker.
    Pending,
    /// Task has been claimed under a lease.
    Running,
    /// Task has been processed and will never be claimed again.
    Complete,
}

impl TaskStatus {
    /// Returns the string representation of the task status.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Complete => "COMPLETE",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = crate::core::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TaskStatus::Pending),
            "RUNNING" => Ok(TaskStatus::Running),
            "COMPLETE" => Ok(TaskStatus::Complete),
            _ => Err(crate::core::CoreError::UnknownTaskStatus(s.to_string())),
        }
    }
}

/// Task store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// How long a claim stays exclusive before the task becomes claimable again.
    #[serde(with = "crate::config::duration_secs")]
    pub lease_duration: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            lease_duration: Duration::from_secs(5 * 60),
        }
    }
}

impl QueueConfig {
    pub fn with_lease_duration(mut self, lease: Duration) -> Self {
        self.lease_duration = lease;
        self
    }

    pub(crate) fn lease(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.lease_duration).unwrap_or(chrono::Duration::minutes(5))
    }
}

/// A task to be enqueued.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub payload: TaskPayload,
    pub scheduled_at: DateTime<Utc>,
}

impl NewTask {
    /// A task that is ready immediately.
    pub fn now(payload: TaskPayload) -> Self {
        Self {
            payload,
            scheduled_at: Utc::now(),
        }
    }

    /// A task that becomes ready at `scheduled_at`.
    pub fn at(payload: TaskPayload, scheduled_at: DateTime<Utc>) -> Self {
        Self {
            payload,
            scheduled_at,
        }
    }

    pub fn task_type(&self) -> &TaskType {
        &self.payload.task_type
    }
}

/// A schedulable unit of work.
#[derive(Debug, Clone)]
pub struct Task {
    /// Unique, monotonic identifier.
    pub id: i64,
    pub task_type: TaskType,
    pub payload: TaskPayload,
    pub status: TaskStatus,
    pub enqueued_at: DateTime<Utc>,
    /// Not-before time.
    pub scheduled_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    /// Worker ID holding (or last holding) the lease.
    pub locked_by: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Returns true if a worker may claim this task at `now`.
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        self.status != TaskStatus::Complete
            && self.scheduled_at <= now
            && self.lease_expires_at.is_none_or(|expiry| expiry <= now)
    }

    /// Returns true if this task has been completed.
    pub fn is_finished(&self) -> bool {
        self.status == TaskStatus::Complete
    }
}

/// An operational error entry recorded for observability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationalError {
    pub task_id: Option<i64>,
    /// Component that hit the error, e.g. `worker`, `callback`.
    pub source: String,
    pub message: String,
    pub detail: Option<serde_json::Value>,
    pub recorded_at: DateTime<Utc>,
}

impl OperationalError {
    pub fn new(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            task_id: None,
            source: source.into(),
            message: message.into(),
            detail: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn for_task(mut self, task_id: i64) -> Self {
        self.task_id = Some(task_id);
        self
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// One inbound callback delivery for an attempt, stored verbatim.
///
/// Redeliveries are kept as separate entries; the store never merges them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackDelivery {
    pub key: ProcessKey,
    pub attempt: u32,
    pub body: Vec<u8>,
    pub signature: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl CallbackDelivery {
    pub fn new(
        key: ProcessKey,
        attempt: u32,
        body: impl Into<Vec<u8>>,
        signature: Option<String>,
    ) -> Self {
        Self {
            key,
            attempt,
            body: body.into(),
            signature,
            received_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(scheduled_at: DateTime<Utc>) -> Task {
        Task {
            id: 1,
            task_type: TaskType::EMAIL,
            payload: TaskPayload::new(TaskType::EMAIL),
            status: TaskStatus::Pending,
            enqueued_at: scheduled_at,
            scheduled_at,
            claimed_at: None,
            lease_expires_at: None,
            locked_by: None,
            completed_at: None,
        }
    }

    #[test]
    fn test_claimable_rules() {
        let now = Utc::now();
        assert!(task(now).is_claimable(now));
        assert!(!task(now + chrono::Duration::seconds(5)).is_claimable(now));

        let mut leased = task(now);
        leased.status = TaskStatus::Running;
        leased.lease_expires_at = Some(now + chrono::Duration::seconds(30));
        assert!(!leased.is_claimable(now));
        assert!(leased.is_claimable(now + chrono::Duration::seconds(31)));

        let mut done = task(now);
        done.status = TaskStatus::Complete;
        assert!(!done.is_claimable(now));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("RUNNING".parse::<TaskStatus>().unwrap(), TaskStatus::Running);
        assert!("FAILED".parse::<TaskStatus>().is_err());
    }
}
