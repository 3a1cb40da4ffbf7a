//! Ready-made success/error/started handlers that turn attempt outcomes
//! into facts.

use super::error::Result;
use super::policy::SupervisorPolicy;
use crate::core::{CoreError, FactKind, HandlerResult, NewFact, ProcessKey, TaskPayload};
use crate::executor::{HandlerContext, HandlerRegistry};
use crate::storage::Store;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// Appends facts for attempt outcomes, keyed by the task payload's id field
/// and `attempt`.
///
/// Every handler is idempotent: running it twice for the same attempt
/// records one fact.
#[derive(Debug, Clone)]
pub struct FactRecorder {
    process: String,
    id_field: String,
}

impl FactRecorder {
    pub fn new(process: impl Into<String>, id_field: impl Into<String>) -> Self {
        Self {
            process: process.into(),
            id_field: id_field.into(),
        }
    }

    pub fn for_policy(policy: &SupervisorPolicy) -> Self {
        Self::new(policy.process.clone(), policy.id_field.clone())
    }

    fn key(&self, payload: &TaskPayload) -> Result<ProcessKey> {
        Ok(ProcessKey::new(
            self.process.clone(),
            payload.id_field(&self.id_field)?,
        ))
    }

    fn attempt(payload: &TaskPayload) -> Result<u32> {
        payload
            .attempt
            .ok_or_else(|| CoreError::MissingField("attempt".into()).into())
    }

    /// Records `succeeded`. The provider response payload is kept on the fact.
    pub async fn record_success<S: Store>(&self, ctx: &HandlerContext<S>) -> Result<HandlerResult> {
        let key = self.key(&ctx.task.payload)?;
        let attempt = Self::attempt(&ctx.task.payload)?;
        let detail = previous_payload(ctx.previous.as_ref());

        let fact = NewFact::new(key.clone(), FactKind::Succeeded)
            .payload(json!({ "attempt": attempt, "response": detail }));
        if ctx.store.append_fact(fact).await? {
            info!("Process {} succeeded on attempt {}", key, attempt);
        } else {
            debug!("Process {} already succeeded", key);
        }
        Ok(HandlerResult::done())
    }

    /// Records `started(n)` for a two-stage attempt.
    pub async fn record_started<S: Store>(&self, ctx: &HandlerContext<S>) -> Result<HandlerResult> {
        let key = self.key(&ctx.task.payload)?;
        let attempt = Self::attempt(&ctx.task.payload)?;

        let fact = NewFact::new(key.clone(), FactKind::Started)
            .attempt(attempt)
            .payload(json!({ "response": previous_payload(ctx.previous.as_ref()) }));
        ctx.store.append_fact(fact).await?;
        debug!("Process {} started attempt {}", key, attempt);
        Ok(HandlerResult::done())
    }

    /// Records `rejected` for validation failures and `failed(n)` otherwise.
    pub async fn record_failure<S: Store>(&self, ctx: &HandlerContext<S>) -> Result<HandlerResult> {
        let key = self.key(&ctx.task.payload)?;
        let attempt = Self::attempt(&ctx.task.payload)?;

        let fact = match ctx.previous.as_ref() {
            Some(previous) if previous.validation_failure_message().is_some() => {
                info!(
                    "Process {} rejected: {}",
                    key,
                    previous.validation_failure_message().unwrap_or_default()
                );
                NewFact::new(key, FactKind::Rejected).payload(json!({
                    "attempt": attempt,
                    "message": previous.validation_failure_message(),
                }))
            }
            previous => {
                let reason = previous
                    .and_then(HandlerResult::failure_reason)
                    .unwrap_or("unspecified");
                info!("Process {} failed attempt {}: {}", key, attempt, reason);
                NewFact::new(key, FactKind::Failed)
                    .attempt(attempt)
                    .payload(json!({ "reason": reason }))
            }
        };

        ctx.store.append_fact(fact).await?;
        Ok(HandlerResult::done())
    }

    /// Registers the handlers under the policy's success and error names.
    /// Two-stage policies get the started recorder as their success handler.
    pub fn register<S: Store>(self, policy: &SupervisorPolicy, registry: &mut HandlerRegistry<S>) {
        let recorder = Arc::new(self);

        let on_success = recorder.clone();
        if policy.two_stage {
            registry.register(policy.success_handler(), move |ctx: HandlerContext<S>| {
                let recorder = on_success.clone();
                async move { recorder.record_started(&ctx).await }
            });
        } else {
            registry.register(policy.success_handler(), move |ctx: HandlerContext<S>| {
                let recorder = on_success.clone();
                async move { recorder.record_success(&ctx).await }
            });
        }

        registry.register(policy.error_handler(), move |ctx: HandlerContext<S>| {
            let recorder = recorder.clone();
            async move { recorder.record_failure(&ctx).await }
        });
    }
}

fn previous_payload(previous: Option<&HandlerResult>) -> Value {
    previous
        .and_then(HandlerResult::payload)
        .map(|payload| Value::Object(payload.clone()))
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FactSet, TaskType};
    use crate::storage::{FactLog, InMemoryStore, NewTask, Task, TaskStore};

    async fn channel_task(store: &InMemoryStore, attempt: u32) -> Task {
        let payload = TaskPayload::new(TaskType::EMAIL)
            .with_field("send_attempt_id", 42)
            .with_attempt(attempt);
        store.enqueue(NewTask::now(payload)).await.unwrap();
        store.claim_next_ready("test").await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_success_records_once() {
        let store = Arc::new(InMemoryStore::new());
        let recorder = FactRecorder::new("email_send", "send_attempt_id");
        let task = channel_task(&store, 1).await;

        let ctx = HandlerContext::new(store.clone(), task);
        recorder.record_success(&ctx).await.unwrap();
        recorder.record_success(&ctx).await.unwrap();

        let facts = store
            .facts_for(&ProcessKey::new("email_send", 42))
            .await
            .unwrap();
        assert_eq!(FactSet::new(&facts).count(FactKind::Succeeded), 1);
    }

    #[tokio::test]
    async fn test_failure_and_rejection() {
        let store = Arc::new(InMemoryStore::new());
        let recorder = FactRecorder::new("email_send", "send_attempt_id");
        let key = ProcessKey::new("email_send", 42);

        let task = channel_task(&store, 1).await;
        let ctx = HandlerContext::new(store.clone(), task)
            .with_previous(HandlerResult::error("mailbox full"));
        recorder.record_failure(&ctx).await.unwrap();

        let facts = store.facts_for(&key).await.unwrap();
        let failed = FactSet::new(&facts).get(FactKind::Failed, 1).unwrap();
        assert_eq!(failed.payload, Some(json!({"reason": "mailbox full"})));

        let task = channel_task(&store, 2).await;
        let ctx = HandlerContext::new(store.clone(), task)
            .with_previous(HandlerResult::invalid("no recipient"));
        recorder.record_failure(&ctx).await.unwrap();

        let facts = store.facts_for(&key).await.unwrap();
        let facts = FactSet::new(&facts);
        assert!(facts.has(FactKind::Rejected));
        assert_eq!(facts.failure_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_attempt_is_an_error() {
        let store = Arc::new(InMemoryStore::new());
        let recorder = FactRecorder::new("email_send", "send_attempt_id");
        store
            .enqueue(NewTask::now(
                TaskPayload::new(TaskType::EMAIL).with_field("send_attempt_id", 42),
            ))
            .await
            .unwrap();
        let task = store.claim_next_ready("test").await.unwrap().unwrap();

        let ctx = HandlerContext::new(store.clone(), task);
        assert!(recorder.record_success(&ctx).await.is_err());
    }
}
