//! Storage layer for the courier orchestration engine.
//!
//! The durable store owns two logically independent structures:
//!
//! - the **fact log**: append-only, uniquely keyed facts per process ([`FactLog`])
//! - the **task store**: a queue of schedulable tasks with lease-based claiming ([`TaskStore`])
//!
//! plus an operational error log ([`ErrorLog`]) and the raw callback
//! deliveries of two-stage processes ([`DeliveryLog`]). Backends:
//!
//! - [`InMemoryStore`]: DashMap-based storage for tests and single-process use
//! - [`SqliteStore`]: persistent SQLite storage with connection pooling (feature `sqlite`)
//! - [`PostgresStore`]: Postgres storage using `FOR UPDATE SKIP LOCKED` (feature `postgres`)
//!
//! # Example
//!
//! ```no_run
//! use courier::core::{FactKind, NewFact, ProcessKey};
//! use courier::storage::{FactLog, InMemoryStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = InMemoryStore::new();
//! let key = ProcessKey::new("email_send", 42);
//! let recorded = store.append_fact(NewFact::new(key, FactKind::Succeeded)).await?;
//! assert!(recorded);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

mod error;
mod queue;

#[cfg(any(feature = "sqlite", feature = "postgres"))]
mod pool;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

pub mod memory;

// Re-export public types
pub use error::{Result, StorageError};
pub use memory::InMemoryStore;
pub use queue::{CallbackDelivery, NewTask, OperationalError, QueueConfig, Task, TaskStatus};

#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub use pool::PoolConfig;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;

use crate::core::{Fact, FactKind, FactSet, NewFact, ProcessKey};

/// Append-only fact log.
///
/// The uniqueness of `(process, process_id, kind, attempt)` is the only
/// mechanism preventing double effects; implementations must enforce it
/// atomically.
#[async_trait]
pub trait FactLog: Send + Sync {
    /// Appends a fact.
    ///
    /// Returns `true` if the fact was recorded and `false` if a fact with the
    /// same key already existed (the duplicate is ignored, not an error).
    async fn append_fact(&self, fact: NewFact) -> Result<bool>;

    /// Returns all facts of a process in append order.
    async fn facts_for(&self, key: &ProcessKey) -> Result<Vec<Fact>>;

    /// Returns true if the process has a `succeeded` fact.
    async fn has_succeeded(&self, key: &ProcessKey) -> Result<bool> {
        let facts = self.facts_for(key).await?;
        Ok(FactSet::new(&facts).has_succeeded())
    }

    /// Returns the number of `failed` facts of the process.
    async fn count_failures(&self, key: &ProcessKey) -> Result<usize> {
        let facts = self.facts_for(key).await?;
        Ok(FactSet::new(&facts).count(FactKind::Failed))
    }
}

/// Durable task queue with claim/lease semantics.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Enqueues a task and returns its id. No uniqueness is enforced.
    async fn enqueue(&self, task: NewTask) -> Result<i64>;

    /// Atomically claims one ready task under a lease.
    ///
    /// Concurrent callers never receive the same task and never block each
    /// other. Returns `None` if nothing is ready.
    async fn claim_next_ready(&self, worker_id: &str) -> Result<Option<Task>>;

    /// Marks a task complete; it will never be claimed again.
    async fn complete(&self, task_id: i64) -> Result<()>;

    /// Gets a task by id.
    async fn get_task(&self, task_id: i64) -> Result<Option<Task>>;

    /// Counts tasks claimable at `now`.
    async fn ready_count(&self, now: DateTime<Utc>) -> Result<u64>;

    /// Deletes completed tasks older than `older_than`. Facts are never purged.
    async fn purge_completed(&self, older_than: Duration) -> Result<u64>;

    /// Optional handle used to wake idle workers when work is enqueued.
    fn work_notify(&self) -> Option<&Arc<Notify>> {
        None
    }
}

/// Log of operational errors, kept for observability only.
#[async_trait]
pub trait ErrorLog: Send + Sync {
    async fn record_error(&self, error: OperationalError) -> Result<()>;

    /// Most recent entries first.
    async fn recent_errors(&self, limit: usize) -> Result<Vec<OperationalError>>;
}

/// Raw callback deliveries. Every delivery is kept, redeliveries included.
#[async_trait]
pub trait DeliveryLog: Send + Sync {
    /// Stores one delivery and returns its id.
    async fn record_delivery(&self, delivery: CallbackDelivery) -> Result<i64>;

    /// Deliveries for one attempt in arrival order.
    async fn deliveries_for(&self, key: &ProcessKey, attempt: u32)
        -> Result<Vec<CallbackDelivery>>;
}

/// The durable store: fact log, task store, error log and delivery log
/// behind one handle.
#[async_trait]
pub trait Store: FactLog + TaskStore + ErrorLog + DeliveryLog + 'static {
    /// Atomically appends `fact` and, only if it was newly recorded, enqueues
    /// `task`.
    ///
    /// Returns the task id, or `None` when the fact already existed and
    /// nothing was enqueued.
    async fn append_and_enqueue(&self, fact: NewFact, task: NewTask) -> Result<Option<i64>>;

    /// Close the store.
    async fn close(&self) -> Result<()>;
}

#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub(crate) fn millis_to_datetime(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StorageError::CorruptRow(format!("timestamp out of range: {millis}")))
}

#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub(crate) fn cutoff_millis(older_than: Duration) -> Result<i64> {
    let older_than = chrono::Duration::from_std(older_than)
        .map_err(|e| StorageError::InvalidParameter(format!("invalid duration: {e}")))?;
    Ok((Utc::now() - older_than).timestamp_millis())
}
