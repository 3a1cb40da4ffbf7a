//! Fact model: immutable, uniquely keyed records of what happened to a process.

use super::error::CoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Kind of a fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactKind {
    /// A channel task was enqueued for an attempt.
    Scheduled,
    /// An external asynchronous operation was started for an attempt.
    Started,
    /// A raw callback response arrived for an attempt (unverified).
    ResponseReceived,
    /// The process succeeded. At most one per process.
    Succeeded,
    /// An attempt failed.
    Failed,
    /// Input was rejected by a before-handler. Terminal, at most one per process.
    Rejected,
}

impl FactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FactKind::Scheduled => "scheduled",
            FactKind::Started => "started",
            FactKind::ResponseReceived => "response_received",
            FactKind::Succeeded => "succeeded",
            FactKind::Failed => "failed",
            FactKind::Rejected => "rejected",
        }
    }

    /// Per-attempt kinds are unique per attempt ordinal; the rest are unique
    /// per process and always stored with attempt `0`.
    pub fn is_per_attempt(&self) -> bool {
        matches!(
            self,
            FactKind::Scheduled | FactKind::Started | FactKind::ResponseReceived | FactKind::Failed
        )
    }
}

impl fmt::Display for FactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FactKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(FactKind::Scheduled),
            "started" => Ok(FactKind::Started),
            "response_received" => Ok(FactKind::ResponseReceived),
            "succeeded" => Ok(FactKind::Succeeded),
            "failed" => Ok(FactKind::Failed),
            "rejected" => Ok(FactKind::Rejected),
            _ => Err(CoreError::UnknownFactKind(s.to_string())),
        }
    }
}

/// Identifies one logical process: the workflow name plus the business id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcessKey {
    pub process: String,
    pub id: i64,
}

impl ProcessKey {
    pub fn new(process: impl Into<String>, id: i64) -> Self {
        Self {
            process: process.into(),
            id,
        }
    }
}

impl fmt::Display for ProcessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.process, self.id)
    }
}

/// A fact waiting to be appended.
#[derive(Debug, Clone, PartialEq)]
pub struct NewFact {
    pub key: ProcessKey,
    pub kind: FactKind,
    pub attempt: u32,
    pub payload: Option<Value>,
}

impl NewFact {
    pub fn new(key: ProcessKey, kind: FactKind) -> Self {
        Self {
            key,
            kind,
            attempt: 0,
            payload: None,
        }
    }

    /// Sets the attempt ordinal. Ignored for process-level kinds.
    pub fn attempt(mut self, attempt: u32) -> Self {
        if self.kind.is_per_attempt() {
            self.attempt = attempt;
        }
        self
    }

    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// The uniqueness key enforced by every fact log backend.
    pub fn unique_key(&self) -> (ProcessKey, FactKind, u32) {
        (self.key.clone(), self.kind, self.attempt)
    }
}

/// A recorded fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub id: i64,
    pub key: ProcessKey,
    pub kind: FactKind,
    pub attempt: u32,
    pub payload: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// Read-only view over the facts of one process.
///
/// Every decision about a process is a pure function of this view; there is
/// no stored status to disagree with it.
#[derive(Debug, Clone, Copy)]
pub struct FactSet<'a> {
    facts: &'a [Fact],
}

impl<'a> FactSet<'a> {
    pub fn new(facts: &'a [Fact]) -> Self {
        Self { facts }
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a Fact> {
        self.facts.iter()
    }

    pub fn has(&self, kind: FactKind) -> bool {
        self.facts.iter().any(|f| f.kind == kind)
    }

    pub fn count(&self, kind: FactKind) -> usize {
        self.facts.iter().filter(|f| f.kind == kind).count()
    }

    pub fn get(&self, kind: FactKind, attempt: u32) -> Option<&'a Fact> {
        self.facts
            .iter()
            .find(|f| f.kind == kind && f.attempt == attempt)
    }

    pub fn has_succeeded(&self) -> bool {
        self.has(FactKind::Succeeded)
    }

    pub fn scheduled_count(&self) -> usize {
        self.count(FactKind::Scheduled)
    }

    pub fn failure_count(&self) -> usize {
        self.count(FactKind::Failed)
    }

    /// An attempt is settled once it failed or the process succeeded.
    pub fn is_attempt_settled(&self, attempt: u32) -> bool {
        self.has_succeeded() || self.get(FactKind::Failed, attempt).is_some()
    }
}
