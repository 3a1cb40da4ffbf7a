//! Kickoff entry point.
//!
//! Starting a workflow means enqueuing the first run of its db-function; from
//! there the function re-enqueues itself through the worker's trampoline.

use crate::core::TaskPayload;
use crate::storage::{NewTask, StorageError, Store};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

/// Enqueues db-function runs.
///
/// # Example
///
/// ```no_run
/// use courier::executor::Scheduler;
/// use courier::storage::InMemoryStore;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = Arc::new(InMemoryStore::new());
/// let scheduler = Scheduler::new(store);
///
/// let task_id = scheduler
///     .kickoff("email_send.supervise", "send_attempt_id", 42)
///     .await?;
/// println!("Supervisor task: {}", task_id);
/// # Ok(())
/// # }
/// ```
pub struct Scheduler<S: Store> {
    store: Arc<S>,
}

impl<S: Store> Scheduler<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Enqueues `function` for the entity `id` to run now.
    pub async fn kickoff(&self, function: &str, id_field: &str, id: i64) -> Result<i64, StorageError> {
        self.schedule(TaskPayload::function(function).with_field(id_field, id), Utc::now())
            .await
    }

    /// Enqueues an arbitrary payload to run at `at`.
    pub async fn schedule(&self, payload: TaskPayload, at: DateTime<Utc>) -> Result<i64, StorageError> {
        let task_type = payload.task_type.clone();
        let task_id = self.store.enqueue(NewTask::at(payload, at)).await?;
        info!("Scheduled {} task {} at {}", task_type, task_id, at);
        Ok(task_id)
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}
