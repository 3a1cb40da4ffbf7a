use super::{
    error::Result, error::StorageError, CallbackDelivery, DeliveryLog, ErrorLog, FactLog, NewTask,
    OperationalError, QueueConfig, Store, Task, TaskStatus, TaskStore,
};
use crate::core::{Fact, NewFact, ProcessKey};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;

/// In-memory store using DashMap for concurrent access.
///
/// Tasks are keyed by id; facts are grouped per process so that the
/// uniqueness check and the append happen under the same shard lock.
/// Claiming collects candidates first and then re-checks each one under its
/// entry lock, so two workers never claim the same task and never wait on
/// each other beyond a single shard.
///
/// Only suitable for single-process use: nothing is shared across processes.
pub struct InMemoryStore {
    config: QueueConfig,
    next_task_id: AtomicI64,
    next_fact_id: AtomicI64,
    next_error_id: AtomicI64,
    next_delivery_id: AtomicI64,
    tasks: DashMap<i64, Task>,
    facts: DashMap<ProcessKey, Vec<Fact>>,
    errors: DashMap<i64, OperationalError>,
    deliveries: DashMap<(ProcessKey, u32), Vec<CallbackDelivery>>,
    /// Notification mechanism to wake up workers when new work arrives
    work_notify: Arc<Notify>,
}

impl InMemoryStore {
    /// Creates a new in-memory store with the default lease duration.
    pub fn new() -> Self {
        Self::with_config(QueueConfig::default())
    }

    pub fn with_config(config: QueueConfig) -> Self {
        Self {
            config,
            next_task_id: AtomicI64::new(1),
            next_fact_id: AtomicI64::new(1),
            next_error_id: AtomicI64::new(1),
            next_delivery_id: AtomicI64::new(1),
            tasks: DashMap::new(),
            facts: DashMap::new(),
            errors: DashMap::new(),
            deliveries: DashMap::new(),
            work_notify: Arc::new(Notify::new()),
        }
    }

    /// Returns a snapshot of all tasks ordered by id.
    pub fn tasks(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tasks.iter().map(|e| e.value().clone()).collect();
        tasks.sort_by_key(|t| t.id);
        tasks
    }

    fn insert_task(&self, task: NewTask) -> i64 {
        let id = self.next_task_id.fetch_add(1, Ordering::SeqCst);
        let task_type = task.payload.task_type.clone();
        self.tasks.insert(
            id,
            Task {
                id,
                task_type: task_type.clone(),
                payload: task.payload,
                status: TaskStatus::Pending,
                enqueued_at: Utc::now(),
                scheduled_at: task.scheduled_at,
                claimed_at: None,
                lease_expires_at: None,
                locked_by: None,
                completed_at: None,
            },
        );
        debug!("Enqueued task: id={}, type={}", id, task_type);
        id
    }

    fn to_fact(&self, fact: NewFact) -> Fact {
        Fact {
            id: self.next_fact_id.fetch_add(1, Ordering::SeqCst),
            key: fact.key,
            kind: fact.kind,
            attempt: fact.attempt,
            payload: fact.payload,
            created_at: Utc::now(),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn is_duplicate(existing: &[Fact], fact: &NewFact) -> bool {
    existing
        .iter()
        .any(|f| f.kind == fact.kind && f.attempt == fact.attempt)
}

#[async_trait]
impl FactLog for InMemoryStore {
    async fn append_fact(&self, fact: NewFact) -> Result<bool> {
        let mut entry = self.facts.entry(fact.key.clone()).or_default();
        if is_duplicate(&entry, &fact) {
            debug!(
                "Ignored duplicate fact: key={}, kind={}, attempt={}",
                fact.key, fact.kind, fact.attempt
            );
            return Ok(false);
        }
        let fact = self.to_fact(fact);
        debug!(
            "Appended fact: key={}, kind={}, attempt={}",
            fact.key, fact.kind, fact.attempt
        );
        entry.push(fact);
        Ok(true)
    }

    async fn facts_for(&self, key: &ProcessKey) -> Result<Vec<Fact>> {
        Ok(self
            .facts
            .get(key)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl TaskStore for InMemoryStore {
    async fn enqueue(&self, task: NewTask) -> Result<i64> {
        let id = self.insert_task(task);
        self.work_notify.notify_one();
        Ok(id)
    }

    async fn claim_next_ready(&self, worker_id: &str) -> Result<Option<Task>> {
        let now = Utc::now();

        // Collect first: holding iterator shard locks while calling get_mut deadlocks.
        let mut candidates: Vec<(DateTime<Utc>, i64)> = self
            .tasks
            .iter()
            .filter(|entry| entry.value().is_claimable(now))
            .map(|entry| (entry.value().scheduled_at, entry.value().id))
            .collect();
        candidates.sort();

        for (_, id) in candidates {
            let Some(mut entry) = self.tasks.get_mut(&id) else {
                continue;
            };
            // Another worker may have claimed it since the scan.
            if !entry.is_claimable(now) {
                continue;
            }
            entry.status = TaskStatus::Running;
            entry.claimed_at = Some(now);
            entry.lease_expires_at = Some(now + self.config.lease());
            entry.locked_by = Some(worker_id.to_string());

            debug!(
                "Claimed task: id={}, type={}, worker={}",
                entry.id, entry.task_type, worker_id
            );
            return Ok(Some(entry.clone()));
        }

        Ok(None)
    }

    async fn complete(&self, task_id: i64) -> Result<()> {
        let mut entry = self
            .tasks
            .get_mut(&task_id)
            .ok_or(StorageError::TaskNotFound(task_id))?;
        entry.status = TaskStatus::Complete;
        entry.completed_at = Some(Utc::now());
        debug!("Completed task: id={}", task_id);
        Ok(())
    }

    async fn get_task(&self, task_id: i64) -> Result<Option<Task>> {
        Ok(self.tasks.get(&task_id).map(|entry| entry.value().clone()))
    }

    async fn ready_count(&self, now: DateTime<Utc>) -> Result<u64> {
        Ok(self
            .tasks
            .iter()
            .filter(|entry| entry.value().is_claimable(now))
            .count() as u64)
    }

    async fn purge_completed(&self, older_than: Duration) -> Result<u64> {
        let older_than = chrono::Duration::from_std(older_than)
            .map_err(|e| StorageError::InvalidParameter(format!("invalid duration: {e}")))?;
        let cutoff = Utc::now() - older_than;

        let mut deleted = 0u64;
        self.tasks.retain(|_, task| {
            let expired = task.is_finished() && task.completed_at.is_some_and(|at| at < cutoff);
            if expired {
                deleted += 1;
            }
            !expired
        });
        Ok(deleted)
    }

    fn work_notify(&self) -> Option<&Arc<Notify>> {
        Some(&self.work_notify)
    }
}

#[async_trait]
impl ErrorLog for InMemoryStore {
    async fn record_error(&self, error: OperationalError) -> Result<()> {
        let id = self.next_error_id.fetch_add(1, Ordering::SeqCst);
        self.errors.insert(id, error);
        Ok(())
    }

    async fn recent_errors(&self, limit: usize) -> Result<Vec<OperationalError>> {
        let mut entries: Vec<(i64, OperationalError)> = self
            .errors
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        entries.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(entries.into_iter().take(limit).map(|(_, e)| e).collect())
    }
}

#[async_trait]
impl DeliveryLog for InMemoryStore {
    async fn record_delivery(&self, delivery: CallbackDelivery) -> Result<i64> {
        let id = self.next_delivery_id.fetch_add(1, Ordering::SeqCst);
        debug!(
            "Recorded delivery: id={}, key={}, attempt={}",
            id, delivery.key, delivery.attempt
        );
        self.deliveries
            .entry((delivery.key.clone(), delivery.attempt))
            .or_default()
            .push(delivery);
        Ok(id)
    }

    async fn deliveries_for(
        &self,
        key: &ProcessKey,
        attempt: u32,
    ) -> Result<Vec<CallbackDelivery>> {
        Ok(self
            .deliveries
            .get(&(key.clone(), attempt))
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn append_and_enqueue(&self, fact: NewFact, task: NewTask) -> Result<Option<i64>> {
        let task_id = {
            let mut entry = self.facts.entry(fact.key.clone()).or_default();
            if is_duplicate(&entry, &fact) {
                debug!(
                    "Skipped enqueue, fact already recorded: key={}, kind={}, attempt={}",
                    fact.key, fact.kind, fact.attempt
                );
                return Ok(None);
            }
            // The fact shard stays locked until the task exists.
            let task_id = self.insert_task(task);
            let fact = self.to_fact(fact);
            entry.push(fact);
            task_id
        };
        self.work_notify.notify_one();
        Ok(Some(task_id))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
