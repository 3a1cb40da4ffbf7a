use super::{
    cutoff_millis, error::Result, error::StorageError, millis_to_datetime, CallbackDelivery,
    DeliveryLog, ErrorLog, FactLog, NewTask, OperationalError, PoolConfig, QueueConfig, Store,
    Task, TaskStore,
};
use crate::core::{deserialize_value, serialize_value, Fact, NewFact, ProcessKey, TaskPayload};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Row, Sqlite, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info};

const TASK_COLUMNS: &str = "id, task_type, payload, status, enqueued_at, scheduled_at, \
                            claimed_at, lease_expires_at, locked_by, completed_at";

/// SQLite-backed store with connection pooling.
///
/// Claiming is a single `UPDATE ... RETURNING` statement (SQLite 3.35+), so
/// two workers can never claim the same row. Fact uniqueness is a table
/// constraint; duplicates are dropped with `ON CONFLICT DO NOTHING`.
pub struct SqliteStore {
    pool: SqlitePool,
    db_path: String,
    queue: QueueConfig,
    work_notify: Arc<Notify>,
}

impl SqliteStore {
    /// Opens (or creates) the database at `db_path` with default configuration.
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        Self::with_config(db_path, PoolConfig::default(), QueueConfig::default()).await
    }

    pub async fn with_config(
        db_path: impl AsRef<Path>,
        pool_config: PoolConfig,
        queue: QueueConfig,
    ) -> Result<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        let connect_options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path_str))
            .map_err(|e| StorageError::Connection(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5))
            .create_if_missing(true);

        let pool = Self::build_pool(connect_options, &pool_config).await?;

        let store = Self {
            pool,
            db_path: db_path_str,
            queue,
            work_notify: Arc::new(Notify::new()),
        };
        store.initialize().await?;

        Ok(store)
    }

    /// Creates an in-memory SQLite store.
    pub async fn in_memory() -> Result<Self> {
        Self::in_memory_with_config(QueueConfig::default()).await
    }

    /// In-memory databases are private to one connection, so the pool is
    /// pinned to a single connection.
    pub async fn in_memory_with_config(queue: QueueConfig) -> Result<Self> {
        let pool_config = PoolConfig {
            max_size: 1,
            min_idle: Some(0),
            ..PoolConfig::default()
        };

        let connect_options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StorageError::Connection(e.to_string()))?
            .journal_mode(SqliteJournalMode::Memory)
            .synchronous(SqliteSynchronous::Normal);

        let pool = Self::build_pool(connect_options, &pool_config).await?;

        let store = Self {
            pool,
            db_path: ":memory:".to_string(),
            queue,
            work_notify: Arc::new(Notify::new()),
        };
        store.initialize().await?;

        Ok(store)
    }

    async fn build_pool(
        connect_options: SqliteConnectOptions,
        config: &PoolConfig,
    ) -> Result<Pool<Sqlite>> {
        let mut builder = SqlitePoolOptions::new()
            .max_connections(config.max_size)
            .acquire_timeout(config.connection_timeout);

        if let Some(min_idle) = config.min_idle {
            builder = builder.min_connections(min_idle);
        }

        if let Some(max_lifetime) = config.max_lifetime {
            builder = builder.max_lifetime(max_lifetime);
        }

        if let Some(idle_timeout) = config.idle_timeout {
            builder = builder.idle_timeout(idle_timeout);
        }

        let pool = builder
            .connect_with(connect_options)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(pool)
    }

    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_type TEXT NOT NULL,
                payload TEXT NOT NULL,
                status TEXT CHECK( status IN ('PENDING','RUNNING','COMPLETE') ) NOT NULL,
                enqueued_at INTEGER NOT NULL,
                scheduled_at INTEGER NOT NULL,
                claimed_at INTEGER,
                lease_expires_at INTEGER,
                locked_by TEXT,
                completed_at INTEGER
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_tasks_ready ON tasks(status, scheduled_at)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS facts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                process TEXT NOT NULL,
                process_id INTEGER NOT NULL,
                kind TEXT NOT NULL,
                attempt INTEGER NOT NULL DEFAULT 0,
                payload TEXT,
                created_at INTEGER NOT NULL,
                UNIQUE (process, process_id, kind, attempt)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS operational_errors (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id INTEGER,
                source TEXT NOT NULL,
                message TEXT NOT NULL,
                detail TEXT,
                recorded_at INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS callback_deliveries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                process TEXT NOT NULL,
                process_id INTEGER NOT NULL,
                attempt INTEGER NOT NULL,
                body BLOB NOT NULL,
                signature TEXT,
                received_at INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_deliveries_attempt
             ON callback_deliveries(process, process_id, attempt)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Returns the database path.
    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    /// Returns the current pool size for monitoring.
    pub fn pool_size(&self) -> u32 {
        self.pool.size()
    }

    async fn insert_task<'e, E>(executor: E, task: &NewTask) -> Result<i64>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        let payload = serialize_value(&task.payload)?;
        let row = sqlx::query(
            "INSERT INTO tasks (task_type, payload, status, enqueued_at, scheduled_at)
             VALUES (?, ?, 'PENDING', ?, ?)
             RETURNING id",
        )
        .bind(task.task_type().as_str())
        .bind(payload)
        .bind(Utc::now().timestamp_millis())
        .bind(task.scheduled_at.timestamp_millis())
        .fetch_one(executor)
        .await?;

        let id: i64 = row.try_get("id")?;
        debug!("Enqueued task: id={}, type={}", id, task.task_type());
        Ok(id)
    }

    async fn insert_fact<'e, E>(executor: E, fact: &NewFact) -> Result<bool>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        let payload = fact.payload.as_ref().map(serialize_value).transpose()?;
        let result = sqlx::query(
            "INSERT INTO facts (process, process_id, kind, attempt, payload, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT (process, process_id, kind, attempt) DO NOTHING",
        )
        .bind(&fact.key.process)
        .bind(fact.key.id)
        .bind(fact.kind.as_str())
        .bind(i64::from(fact.attempt))
        .bind(payload)
        .bind(Utc::now().timestamp_millis())
        .execute(executor)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> Result<Task> {
        let payload: String = row.try_get("payload")?;
        let payload: TaskPayload = deserialize_value(&payload)?;
        let status: String = row.try_get("status")?;

        let optional_time = |column: &str| -> Result<Option<DateTime<Utc>>> {
            let millis: Option<i64> = row.try_get(column)?;
            millis.map(millis_to_datetime).transpose()
        };

        Ok(Task {
            id: row.try_get("id")?,
            task_type: payload.task_type.clone(),
            payload,
            status: status.parse()?,
            enqueued_at: millis_to_datetime(row.try_get("enqueued_at")?)?,
            scheduled_at: millis_to_datetime(row.try_get("scheduled_at")?)?,
            claimed_at: optional_time("claimed_at")?,
            lease_expires_at: optional_time("lease_expires_at")?,
            locked_by: row.try_get("locked_by")?,
            completed_at: optional_time("completed_at")?,
        })
    }

    fn row_to_fact(row: &sqlx::sqlite::SqliteRow) -> Result<Fact> {
        let kind: String = row.try_get("kind")?;
        let attempt: i64 = row.try_get("attempt")?;
        let payload: Option<String> = row.try_get("payload")?;

        Ok(Fact {
            id: row.try_get("id")?,
            key: ProcessKey::new(
                row.try_get::<String, _>("process")?,
                row.try_get("process_id")?,
            ),
            kind: kind.parse()?,
            attempt: u32::try_from(attempt)
                .map_err(|_| StorageError::CorruptRow(format!("attempt out of range: {attempt}")))?,
            payload: payload.as_deref().map(deserialize_value).transpose()?,
            created_at: millis_to_datetime(row.try_get("created_at")?)?,
        })
    }
}

#[async_trait]
impl FactLog for SqliteStore {
    async fn append_fact(&self, fact: NewFact) -> Result<bool> {
        let recorded = Self::insert_fact(&self.pool, &fact).await?;
        debug!(
            "Append fact: key={}, kind={}, attempt={}, recorded={}",
            fact.key, fact.kind, fact.attempt, recorded
        );
        Ok(recorded)
    }

    async fn facts_for(&self, key: &ProcessKey) -> Result<Vec<Fact>> {
        let rows = sqlx::query(
            "SELECT id, process, process_id, kind, attempt, payload, created_at
             FROM facts
             WHERE process = ? AND process_id = ?
             ORDER BY id ASC",
        )
        .bind(&key.process)
        .bind(key.id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_fact).collect()
    }
}

#[async_trait]
impl TaskStore for SqliteStore {
    async fn enqueue(&self, task: NewTask) -> Result<i64> {
        let id = Self::insert_task(&self.pool, &task).await?;
        self.work_notify.notify_one();
        Ok(id)
    }

    async fn claim_next_ready(&self, worker_id: &str) -> Result<Option<Task>> {
        let now = Utc::now();
        let lease_expires_at = now + self.queue.lease();

        let task = sqlx::query(&format!(
            "UPDATE tasks
             SET status = 'RUNNING', claimed_at = ?1, lease_expires_at = ?2, locked_by = ?3
             WHERE id = (
                 SELECT id FROM tasks
                 WHERE status != 'COMPLETE'
                   AND scheduled_at <= ?1
                   AND (lease_expires_at IS NULL OR lease_expires_at <= ?1)
                 ORDER BY scheduled_at ASC, id ASC
                 LIMIT 1
             )
             RETURNING {TASK_COLUMNS}"
        ))
        .bind(now.timestamp_millis())
        .bind(lease_expires_at.timestamp_millis())
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await?
        .map(|row| Self::row_to_task(&row))
        .transpose()?;

        if let Some(task) = &task {
            debug!(
                "Claimed task: id={}, type={}, worker={}",
                task.id, task.task_type, worker_id
            );
        }

        Ok(task)
    }

    async fn complete(&self, task_id: i64) -> Result<()> {
        let result = sqlx::query(
            "UPDATE tasks SET status = 'COMPLETE', completed_at = ? WHERE id = ?",
        )
        .bind(Utc::now().timestamp_millis())
        .bind(task_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::TaskNotFound(task_id));
        }

        debug!("Completed task: id={}", task_id);
        Ok(())
    }

    async fn get_task(&self, task_id: i64) -> Result<Option<Task>> {
        sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?"))
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| Self::row_to_task(&row))
            .transpose()
    }

    async fn ready_count(&self, now: DateTime<Utc>) -> Result<u64> {
        let now = now.timestamp_millis();
        let row = sqlx::query(
            "SELECT COUNT(*) AS ready FROM tasks
             WHERE status != 'COMPLETE'
               AND scheduled_at <= ?1
               AND (lease_expires_at IS NULL OR lease_expires_at <= ?1)",
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        let ready: i64 = row.try_get("ready")?;
        Ok(ready as u64)
    }

    async fn purge_completed(&self, older_than: Duration) -> Result<u64> {
        let cutoff = cutoff_millis(older_than)?;
        let result =
            sqlx::query("DELETE FROM tasks WHERE status = 'COMPLETE' AND completed_at < ?")
                .bind(cutoff)
                .execute(&self.pool)
                .await?;

        let deleted = result.rows_affected();
        if deleted > 0 {
            info!("Purged {} completed tasks", deleted);
        }
        Ok(deleted)
    }

    fn work_notify(&self) -> Option<&Arc<Notify>> {
        Some(&self.work_notify)
    }
}

#[async_trait]
impl ErrorLog for SqliteStore {
    async fn record_error(&self, error: OperationalError) -> Result<()> {
        let detail = error.detail.as_ref().map(serialize_value).transpose()?;
        sqlx::query(
            "INSERT INTO operational_errors (task_id, source, message, detail, recorded_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(error.task_id)
        .bind(&error.source)
        .bind(&error.message)
        .bind(detail)
        .bind(error.recorded_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_errors(&self, limit: usize) -> Result<Vec<OperationalError>> {
        let rows = sqlx::query(
            "SELECT task_id, source, message, detail, recorded_at
             FROM operational_errors
             ORDER BY id DESC
             LIMIT ?",
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<OperationalError> {
                let detail: Option<String> = row.try_get("detail")?;
                Ok(OperationalError {
                    task_id: row.try_get("task_id")?,
                    source: row.try_get("source")?,
                    message: row.try_get("message")?,
                    detail: detail.as_deref().map(deserialize_value).transpose()?,
                    recorded_at: millis_to_datetime(row.try_get("recorded_at")?)?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl DeliveryLog for SqliteStore {
    async fn record_delivery(&self, delivery: CallbackDelivery) -> Result<i64> {
        let row = sqlx::query(
            "INSERT INTO callback_deliveries
                 (process, process_id, attempt, body, signature, received_at)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(&delivery.key.process)
        .bind(delivery.key.id)
        .bind(i64::from(delivery.attempt))
        .bind(&delivery.body)
        .bind(&delivery.signature)
        .bind(delivery.received_at.timestamp_millis())
        .fetch_one(&self.pool)
        .await?;

        let id: i64 = row.try_get("id")?;
        debug!(
            "Recorded delivery: id={}, key={}, attempt={}",
            id, delivery.key, delivery.attempt
        );
        Ok(id)
    }

    async fn deliveries_for(
        &self,
        key: &ProcessKey,
        attempt: u32,
    ) -> Result<Vec<CallbackDelivery>> {
        let rows = sqlx::query(
            "SELECT body, signature, received_at
             FROM callback_deliveries
             WHERE process = ? AND process_id = ? AND attempt = ?
             ORDER BY id ASC",
        )
        .bind(&key.process)
        .bind(key.id)
        .bind(i64::from(attempt))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<CallbackDelivery> {
                Ok(CallbackDelivery {
                    key: key.clone(),
                    attempt,
                    body: row.try_get("body")?,
                    signature: row.try_get("signature")?,
                    received_at: millis_to_datetime(row.try_get("received_at")?)?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn append_and_enqueue(&self, fact: NewFact, task: NewTask) -> Result<Option<i64>> {
        let mut tx = self.pool.begin().await?;

        if !Self::insert_fact(&mut *tx, &fact).await? {
            tx.rollback().await?;
            debug!(
                "Skipped enqueue, fact already recorded: key={}, kind={}, attempt={}",
                fact.key, fact.kind, fact.attempt
            );
            return Ok(None);
        }

        let task_id = Self::insert_task(&mut *tx, &task).await?;
        tx.commit().await?;

        self.work_notify.notify_one();
        Ok(Some(task_id))
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        info!("Closed task store database");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FactKind, TaskType};
    use serde_json::json;

    fn sms_task() -> NewTask {
        NewTask::now(
            TaskPayload::new(TaskType::SMS)
                .with_field("send_attempt_id", 7)
                .with_attempt(1),
        )
    }

    #[tokio::test]
    async fn test_enqueue_claim_complete() {
        let store = SqliteStore::in_memory().await.unwrap();
        let id = store.enqueue(sms_task()).await.unwrap();

        let claimed = store.claim_next_ready("worker-1").await.unwrap().unwrap();
        assert_eq!(claimed.id, id);
        assert_eq!(claimed.task_type, TaskType::SMS);
        assert_eq!(claimed.payload.attempt, Some(1));
        assert_eq!(claimed.locked_by.as_deref(), Some("worker-1"));
        assert!(store.claim_next_ready("worker-2").await.unwrap().is_none());

        store.complete(id).await.unwrap();
        let task = store.get_task(id).await.unwrap().unwrap();
        assert!(task.is_finished());
        assert!(task.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_expired_lease_is_reclaimable() {
        let store = SqliteStore::in_memory_with_config(
            QueueConfig::default().with_lease_duration(Duration::from_millis(20)),
        )
        .await
        .unwrap();
        let id = store.enqueue(sms_task()).await.unwrap();

        store.claim_next_ready("worker-1").await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        let reclaimed = store.claim_next_ready("worker-2").await.unwrap().unwrap();
        assert_eq!(reclaimed.id, id);
        assert_eq!(reclaimed.locked_by.as_deref(), Some("worker-2"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_expired_lease_has_one_reclaimer_across_connections() {
        let path = std::env::temp_dir().join(format!(
            "courier-reclaim-{}-{}.db",
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        let store = Arc::new(
            SqliteStore::with_config(
                &path,
                PoolConfig::default().with_max_size(8),
                QueueConfig::default().with_lease_duration(Duration::from_millis(20)),
            )
            .await
            .unwrap(),
        );
        let id = store.enqueue(sms_task()).await.unwrap();
        store.claim_next_ready("crashed").await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        let mut handles = vec![];
        for worker in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .claim_next_ready(&format!("worker-{worker}"))
                    .await
                    .unwrap()
            }));
        }

        let mut winners = vec![];
        for handle in handles {
            winners.extend(handle.await.unwrap());
        }
        assert_eq!(winners.len(), 1);
        assert_eq!(winners[0].id, id);
        assert_ne!(winners[0].locked_by.as_deref(), Some("crashed"));

        store.close().await.unwrap();
        for suffix in ["", "-wal", "-shm"] {
            let mut file = path.clone().into_os_string();
            file.push(suffix);
            let _ = std::fs::remove_file(file);
        }
    }

    #[tokio::test]
    async fn test_complete_missing_task() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert!(matches!(
            store.complete(404).await,
            Err(StorageError::TaskNotFound(404))
        ));
    }

    #[tokio::test]
    async fn test_fact_uniqueness() {
        let store = SqliteStore::in_memory().await.unwrap();
        let key = ProcessKey::new("sms_send", 7);

        let failed = |attempt| NewFact::new(key.clone(), FactKind::Failed).attempt(attempt);
        assert!(store.append_fact(failed(1)).await.unwrap());
        assert!(!store.append_fact(failed(1)).await.unwrap());
        assert!(store.append_fact(failed(2)).await.unwrap());

        assert_eq!(store.count_failures(&key).await.unwrap(), 2);
        assert!(!store.has_succeeded(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_fact_payload_round_trip() {
        let store = SqliteStore::in_memory().await.unwrap();
        let key = ProcessKey::new("transcription", 3);
        store
            .append_fact(
                NewFact::new(key.clone(), FactKind::ResponseReceived)
                    .attempt(1)
                    .payload(json!({"body": "ok", "encoding": "utf8"})),
            )
            .await
            .unwrap();

        let facts = store.facts_for(&key).await.unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].kind, FactKind::ResponseReceived);
        assert_eq!(facts[0].attempt, 1);
        assert_eq!(facts[0].payload, Some(json!({"body": "ok", "encoding": "utf8"})));
    }

    #[tokio::test]
    async fn test_append_and_enqueue_is_atomic_per_fact() {
        let store = SqliteStore::in_memory().await.unwrap();
        let fact = NewFact::new(ProcessKey::new("sms_send", 7), FactKind::Scheduled).attempt(1);

        let first = store
            .append_and_enqueue(fact.clone(), sms_task())
            .await
            .unwrap();
        let second = store.append_and_enqueue(fact, sms_task()).await.unwrap();

        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(store.ready_count(Utc::now()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_every_delivery_is_kept() {
        let store = SqliteStore::in_memory().await.unwrap();
        let key = ProcessKey::new("transcription", 5);

        let first = CallbackDelivery::new(key.clone(), 1, vec![0xff, 0x00], Some("aa".into()));
        let second = CallbackDelivery::new(key.clone(), 1, &b"{}"[..], None);
        store.record_delivery(first.clone()).await.unwrap();
        store.record_delivery(second.clone()).await.unwrap();
        store
            .record_delivery(CallbackDelivery::new(key.clone(), 2, &b"{}"[..], None))
            .await
            .unwrap();

        let deliveries = store.deliveries_for(&key, 1).await.unwrap();
        assert_eq!(deliveries.len(), 2);
        assert_eq!(deliveries[0].body, first.body);
        assert_eq!(deliveries[0].signature.as_deref(), Some("aa"));
        assert_eq!(deliveries[1].body, second.body);
        assert_eq!(deliveries[1].signature, None);
    }

    #[tokio::test]
    async fn test_operational_errors() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .record_error(
                OperationalError::new("callback", "unparseable correlation id")
                    .with_detail(json!({"body": "raw"})),
            )
            .await
            .unwrap();

        let errors = store.recent_errors(10).await.unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].source, "callback");
        assert_eq!(errors[0].detail, Some(json!({"body": "raw"})));
    }
}
