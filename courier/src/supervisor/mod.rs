//! Fact-derived supervisor state machine.
//!
//! A supervisor is a db-function that runs once per process id per round. It
//! holds no state of its own: every run reads the fact log, decides, appends
//! at most one `scheduled` fact (together with its channel task) and asks the
//! worker to run it again later. Concurrent runs for the same id are safe
//! because the `scheduled(n)` fact can be appended only once.
//!
//! # Example
//!
//! ```no_run
//! use courier::core::TaskType;
//! use courier::executor::HandlerRegistry;
//! use courier::storage::InMemoryStore;
//! use courier::supervisor::{FactRecorder, Supervisor, SupervisorPolicy};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(InMemoryStore::new());
//! let policy = SupervisorPolicy::new("email_send", TaskType::EMAIL, "send_attempt_id");
//!
//! let mut handlers: HandlerRegistry<InMemoryStore> = HandlerRegistry::new();
//! FactRecorder::for_policy(&policy).register(&policy, &mut handlers);
//! let supervisor = Arc::new(Supervisor::new(policy));
//! supervisor.clone().register(&mut handlers);
//!
//! supervisor.kickoff(&store, 42).await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod policy;
mod recorder;
mod state;
mod verifier;

pub use error::{Result, SupervisorError};
pub use policy::SupervisorPolicy;
pub use recorder::FactRecorder;
pub use state::{Decision, ProcessState, ScheduledAttempt};
pub use verifier::{
    body_status, HmacVerifier, ReceivedResponse, ResponseVerifier, StatusVerifier, Verification,
};

use crate::core::{Fact, FactKind, FactSet, HandlerResult, NewFact, ProcessKey, TaskPayload};
use crate::executor::{HandlerContext, HandlerRegistry, Reply, Scheduler};
use crate::storage::{NewTask, Store};
use chrono::{DateTime, Utc};
use serde_json::{json, Map};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Payload field of a scheduled send.
pub const SEND_AT_FIELD: &str = "send_at";

/// Runs one [`SupervisorPolicy`].
pub struct Supervisor {
    policy: SupervisorPolicy,
    verifier: Arc<dyn ResponseVerifier>,
}

impl Supervisor {
    pub fn new(policy: SupervisorPolicy) -> Self {
        Self {
            policy,
            verifier: Arc::new(StatusVerifier),
        }
    }

    /// Sets the verifier used to settle two-stage responses.
    pub fn with_verifier(mut self, verifier: impl ResponseVerifier + 'static) -> Self {
        self.verifier = Arc::new(verifier);
        self
    }

    pub fn policy(&self) -> &SupervisorPolicy {
        &self.policy
    }

    pub fn key(&self, id: i64) -> ProcessKey {
        ProcessKey::new(self.policy.process.clone(), id)
    }

    /// Payload of this supervisor's db-function task for entity `id`.
    pub fn payload(&self, id: i64) -> TaskPayload {
        TaskPayload::function(self.policy.function_name())
            .with_field(self.policy.id_field.clone(), id)
    }

    /// Same as [`payload`](Self::payload) for a send that must not go out
    /// before `send_at`.
    pub fn payload_at(&self, id: i64, send_at: DateTime<Utc>) -> TaskPayload {
        self.payload(id).with_field(SEND_AT_FIELD, send_at.to_rfc3339())
    }

    /// Enqueues the first supervisor run for `id`.
    pub async fn kickoff<S: Store>(&self, store: &Arc<S>, id: i64) -> Result<i64> {
        Ok(Scheduler::new(store.clone())
            .schedule(self.payload(id), Utc::now())
            .await?)
    }

    /// Registers this supervisor as the db-function named by the policy.
    pub fn register<S: Store>(self: Arc<Self>, registry: &mut HandlerRegistry<S>) {
        let name = self.policy.function_name();
        registry.register(name, move |ctx: HandlerContext<S>| {
            let supervisor = self.clone();
            async move {
                let decision = supervisor.run(&*ctx.store, &ctx.task.payload).await?;
                Ok::<_, SupervisorError>(decision_reply(&decision))
            }
        });
    }

    /// Derived state of process `id`.
    pub async fn status<S: Store>(&self, store: &S, id: i64) -> Result<ProcessState> {
        let facts = store.facts_for(&self.key(id)).await?;
        Ok(ProcessState::derive(
            &FactSet::new(&facts),
            self.policy.max_attempts,
        ))
    }

    /// One supervisor round for the entity named in `payload`.
    pub async fn run<S: Store>(&self, store: &S, payload: &TaskPayload) -> Result<Decision> {
        let id = payload.id_field(&self.policy.id_field)?;
        let key = self.key(id);
        let now = Utc::now();

        let mut facts = store.facts_for(&key).await?;
        if self.policy.two_stage && self.settle(store, &key, &facts, now).await? {
            facts = store.facts_for(&key).await?;
        }
        let set = FactSet::new(&facts);

        if set.has_succeeded() {
            info!("Process {} succeeded, supervisor done", key);
            return Ok(Decision::Succeeded);
        }
        if set.has(FactKind::Rejected) {
            info!("Process {} rejected, supervisor done", key);
            return Ok(Decision::Rejected);
        }

        let failures = set.failure_count() as u32;
        if failures >= self.policy.max_attempts {
            info!(
                "Process {} exhausted after {} failed attempts",
                key, failures
            );
            return Ok(Decision::Exhausted { failures });
        }

        let send_at = send_at(payload)?;
        let due = send_at.is_none_or(|at| at <= now);
        let scheduled_count = set.scheduled_count() as u32;

        let mut scheduled = None;
        if scheduled_count <= failures && due {
            let attempt = scheduled_count + 1;
            let fact = NewFact::new(key.clone(), FactKind::Scheduled)
                .attempt(attempt)
                .payload(json!({ "channel": self.policy.channel.as_str() }));
            let task = NewTask::now(self.channel_payload(id, attempt, payload));

            match store.append_and_enqueue(fact, task).await? {
                Some(task_id) => {
                    info!(
                        "Process {} scheduled attempt {} as task {}",
                        key, attempt, task_id
                    );
                    scheduled = Some(ScheduledAttempt { attempt, task_id });
                }
                None => debug!(
                    "Process {} attempt {} already scheduled by another run",
                    key, attempt
                ),
            }
        }

        let next_check_at = match send_at {
            Some(at) if !due => at,
            _ => now + poll_interval(&self.policy),
        };

        Ok(Decision::Waiting {
            next_check_at,
            scheduled,
        })
    }

    fn channel_payload(&self, id: i64, attempt: u32, supervisor: &TaskPayload) -> TaskPayload {
        let mut fields: Map<_, _> = supervisor.fields.clone();
        fields.remove(SEND_AT_FIELD);

        let mut payload = TaskPayload::new(self.policy.channel.clone())
            .with_before_handler(self.policy.before_handler())
            .with_success_handler(self.policy.success_handler())
            .with_error_handler(self.policy.error_handler())
            .with_attempt(attempt);
        payload.fields = fields;
        payload.with_field(self.policy.id_field.clone(), id)
    }

    /// Settles two-stage attempts: verifies received responses and times out
    /// started attempts that never got one. Returns whether any fact was
    /// appended.
    async fn settle<S: Store>(
        &self,
        store: &S,
        key: &ProcessKey,
        facts: &[Fact],
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let set = FactSet::new(facts);
        if set.has_succeeded() {
            return Ok(false);
        }

        let mut appended = false;
        for attempt in 1..=set.scheduled_count() as u32 {
            if set.is_attempt_settled(attempt) {
                continue;
            }

            if let Some(received) = set.get(FactKind::ResponseReceived, attempt) {
                let mut responses: Vec<ReceivedResponse> = store
                    .deliveries_for(key, attempt)
                    .await?
                    .into_iter()
                    .map(ReceivedResponse::from)
                    .collect();

                // Facts appended without going through the inbox carry the only copy.
                let mut verification = Verification::Failed("empty response".into());
                if responses.is_empty() {
                    match received
                        .payload
                        .as_ref()
                        .map(ReceivedResponse::from_fact_payload)
                    {
                        Some(Ok(response)) => responses.push(response),
                        Some(Err(e)) => {
                            verification =
                                Verification::Failed(format!("unreadable response: {e}"))
                        }
                        None => {}
                    }
                }

                // Any one genuine delivery settles the attempt.
                for response in &responses {
                    verification = self.verifier.verify(response);
                    if verification == Verification::Succeeded {
                        break;
                    }
                }

                let succeeded = verification == Verification::Succeeded;
                let fact = match verification {
                    Verification::Succeeded => NewFact::new(key.clone(), FactKind::Succeeded)
                        .payload(json!({ "attempt": attempt })),
                    Verification::Failed(reason) => {
                        warn!(
                            "Process {} attempt {} response failed verification: {} ({} deliveries)",
                            key,
                            attempt,
                            reason,
                            responses.len()
                        );
                        NewFact::new(key.clone(), FactKind::Failed)
                            .attempt(attempt)
                            .payload(json!({ "reason": reason }))
                    }
                };
                appended |= store.append_fact(fact).await?;

                // A success settles every later attempt too.
                if succeeded {
                    return Ok(true);
                }
                continue;
            }

            if let Some(started) = set.get(FactKind::Started, attempt) {
                if started.created_at + response_timeout(&self.policy) <= now {
                    warn!(
                        "Process {} attempt {} timed out waiting for a response",
                        key, attempt
                    );
                    let fact = NewFact::new(key.clone(), FactKind::Failed)
                        .attempt(attempt)
                        .payload(json!({ "reason": "response timeout" }));
                    appended |= store.append_fact(fact).await?;
                }
            }
        }

        Ok(appended)
    }
}

fn send_at(payload: &TaskPayload) -> Result<Option<DateTime<Utc>>> {
    let Some(value) = payload.field(SEND_AT_FIELD) else {
        return Ok(None);
    };
    let text = value
        .as_str()
        .ok_or_else(|| SupervisorError::InvalidSendAt(value.to_string()))?;
    DateTime::parse_from_rfc3339(text)
        .map(|at| Some(at.with_timezone(&Utc)))
        .map_err(|e| SupervisorError::InvalidSendAt(format!("{text}: {e}")))
}

fn poll_interval(policy: &SupervisorPolicy) -> chrono::Duration {
    chrono::Duration::from_std(policy.poll_interval).unwrap_or(chrono::Duration::seconds(30))
}

fn response_timeout(policy: &SupervisorPolicy) -> chrono::Duration {
    chrono::Duration::from_std(policy.response_timeout).unwrap_or(chrono::Duration::hours(1))
}

fn decision_reply(decision: &Decision) -> Reply {
    let mut payload = Map::new();
    if let Ok(serde_json::Value::Object(fields)) = serde_json::to_value(decision) {
        payload = fields;
    }
    let result = HandlerResult::ok(payload);

    match decision.next_check_at() {
        Some(at) => Reply::run_again_at(result, at),
        None => result.into(),
    }
}
