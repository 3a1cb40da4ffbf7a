use crate::core::{FactKind, FactSet};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Where a process stands, derived from its facts alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProcessState {
    /// No attempt has been scheduled.
    NotStarted,
    /// Attempt `attempt` is scheduled and has not settled.
    AttemptPending { attempt: u32 },
    /// The last attempt failed and another one is allowed.
    RetryPending { failures: u32 },
    Succeeded,
    /// Every allowed attempt failed.
    Exhausted { failures: u32 },
    /// The input was rejected before any provider call.
    Rejected,
}

impl ProcessState {
    pub fn derive(facts: &FactSet<'_>, max_attempts: u32) -> Self {
        let failures = facts.failure_count() as u32;
        let scheduled = facts.scheduled_count() as u32;

        if facts.has_succeeded() {
            ProcessState::Succeeded
        } else if facts.has(FactKind::Rejected) {
            ProcessState::Rejected
        } else if failures >= max_attempts {
            ProcessState::Exhausted { failures }
        } else if scheduled > failures {
            ProcessState::AttemptPending { attempt: scheduled }
        } else if failures > 0 {
            ProcessState::RetryPending { failures }
        } else {
            ProcessState::NotStarted
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProcessState::Succeeded | ProcessState::Exhausted { .. } | ProcessState::Rejected
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessState::NotStarted => "not_started",
            ProcessState::AttemptPending { .. } => "attempt_pending",
            ProcessState::RetryPending { .. } => "retry_pending",
            ProcessState::Succeeded => "succeeded",
            ProcessState::Exhausted { .. } => "exhausted",
            ProcessState::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one supervisor run decided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Succeeded,
    Rejected,
    Exhausted {
        failures: u32,
    },
    /// Not terminal: run again at `next_check_at`.
    Waiting {
        next_check_at: DateTime<Utc>,
        /// Attempt scheduled by this run, with its task id.
        scheduled: Option<ScheduledAttempt>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScheduledAttempt {
    pub attempt: u32,
    pub task_id: i64,
}

impl Decision {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Decision::Waiting { .. })
    }

    pub fn next_check_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Decision::Waiting { next_check_at, .. } => Some(*next_check_at),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Fact, ProcessKey};

    fn facts(kinds: &[(FactKind, u32)]) -> Vec<Fact> {
        kinds
            .iter()
            .enumerate()
            .map(|(i, (kind, attempt))| Fact {
                id: i as i64 + 1,
                key: ProcessKey::new("email_send", 42),
                kind: *kind,
                attempt: *attempt,
                payload: None,
                created_at: Utc::now(),
            })
            .collect()
    }

    fn derive(kinds: &[(FactKind, u32)]) -> ProcessState {
        let facts = facts(kinds);
        ProcessState::derive(&FactSet::new(&facts), 2)
    }

    #[test]
    fn test_derived_states() {
        use FactKind::*;

        assert_eq!(derive(&[]), ProcessState::NotStarted);
        assert_eq!(
            derive(&[(Scheduled, 1)]),
            ProcessState::AttemptPending { attempt: 1 }
        );
        assert_eq!(
            derive(&[(Scheduled, 1), (Failed, 1)]),
            ProcessState::RetryPending { failures: 1 }
        );
        assert_eq!(
            derive(&[(Scheduled, 1), (Failed, 1), (Scheduled, 2)]),
            ProcessState::AttemptPending { attempt: 2 }
        );
        assert_eq!(
            derive(&[(Scheduled, 1), (Failed, 1), (Scheduled, 2), (Failed, 2)]),
            ProcessState::Exhausted { failures: 2 }
        );
        assert_eq!(
            derive(&[(Scheduled, 1), (Failed, 1), (Scheduled, 2), (Succeeded, 0)]),
            ProcessState::Succeeded
        );
        assert_eq!(derive(&[(Scheduled, 1), (Rejected, 0)]), ProcessState::Rejected);
    }

    #[test]
    fn test_terminal_states() {
        assert!(ProcessState::Succeeded.is_terminal());
        assert!(ProcessState::Exhausted { failures: 2 }.is_terminal());
        assert!(!ProcessState::RetryPending { failures: 1 }.is_terminal());
    }
}
