//! Worker pool: N independent loops that claim, dispatch, route and complete.
//!
//! A loop holds no authoritative state. It claims one task under a lease,
//! hands it to the dispatcher, performs the follow-up enqueue a db-function
//! asked for, and completes the task no matter how processing went. If the
//! process dies in between, the lease expires and another loop picks the task
//! up.

use super::dispatcher::{Dispatcher, Outcome, ProcessContext};
use crate::storage::{NewTask, OperationalError, Store, StorageError, Task};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of concurrent loops.
    pub concurrency: usize,
    /// How long an idle loop sleeps before claiming again.
    #[serde(with = "crate::config::duration_secs")]
    pub poll_interval: Duration,
    /// Upper bound for a single provider call.
    #[serde(with = "crate::config::duration_secs")]
    pub provider_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            poll_interval: Duration::from_secs(1),
            provider_timeout: Duration::from_secs(10),
        }
    }
}

/// A pool of task-processing loops sharing one store and one dispatcher.
///
/// # Example
///
/// ```no_run
/// use courier::executor::{Dispatcher, FunctionProcessor, HandlerRegistry, Worker};
/// use courier::storage::InMemoryStore;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn example() {
/// let store = Arc::new(InMemoryStore::new());
/// let handlers = Arc::new(HandlerRegistry::new());
/// let dispatcher = Arc::new(
///     Dispatcher::builder()
///         .processor(FunctionProcessor::new(handlers))
///         .build(),
/// );
///
/// let handle = Worker::new(store, dispatcher, "worker-1")
///     .with_concurrency(8)
///     .with_poll_interval(Duration::from_millis(200))
///     .start();
///
/// // ... later
/// handle.shutdown().await;
/// # }
/// ```
pub struct Worker<S: Store> {
    store: Arc<S>,
    dispatcher: Arc<Dispatcher<S>>,
    worker_id: String,
    config: WorkerConfig,
}

impl<S: Store> Worker<S> {
    pub fn new(store: Arc<S>, dispatcher: Arc<Dispatcher<S>>, worker_id: impl Into<String>) -> Self {
        Self {
            store,
            dispatcher,
            worker_id: worker_id.into(),
            config: WorkerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.config.concurrency = concurrency.max(1);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.config.provider_timeout = timeout;
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Claims and processes at most one task as `loop_id`.
    ///
    /// Returns `Ok(false)` when nothing was ready. Only the claim itself can
    /// fail; everything after it is routed to the operational error log.
    pub async fn run_once(&self, loop_id: &str) -> Result<bool, StorageError> {
        let Some(task) = self.store.claim_next_ready(loop_id).await? else {
            return Ok(false);
        };

        let span = info_span!(
            "task",
            task.id = task.id,
            task_type = %task.task_type,
            worker.id = %loop_id
        );
        self.process_task(loop_id, task).instrument(span).await;
        Ok(true)
    }

    async fn process_task(&self, loop_id: &str, task: Task) {
        let ctx = ProcessContext {
            store: self.store.clone(),
            worker_id: loop_id.to_string(),
            provider_timeout: self.config.provider_timeout,
        };

        let Outcome {
            result,
            run_again_at,
        } = self.dispatcher.dispatch(&ctx, &task).await;

        match result {
            Ok(envelope) if envelope.is_success() => {
                debug!("Task {} processed", task.id);
            }
            Ok(envelope) => {
                info!(
                    "Task {} finished with {}: {}",
                    task.id,
                    envelope.status(),
                    envelope.failure_reason().unwrap_or("unspecified")
                );
            }
            Err(e) => {
                error!("Task {} failed: {}", task.id, e);
                let entry = OperationalError::new("worker", e.to_string())
                    .for_task(task.id)
                    .with_detail(json!({
                        "task_type": task.task_type.as_str(),
                        "payload": &task.payload,
                    }));
                self.record(entry).await;
            }
        }

        // Trampoline: the db-function asked to run again.
        if let Some(at) = run_again_at {
            match self
                .store
                .enqueue(NewTask::at(task.payload.clone(), at))
                .await
            {
                Ok(next) => debug!("Task {} rescheduled as {} at {}", task.id, next, at),
                Err(e) => {
                    warn!("Failed to enqueue follow-up for task {}: {}", task.id, e);
                    self.record(
                        OperationalError::new("worker", format!("follow-up enqueue failed: {e}"))
                            .for_task(task.id),
                    )
                    .await;
                }
            }
        }

        if let Err(e) = self.store.complete(task.id).await {
            // The lease will expire and the task will be processed again.
            warn!("Failed to complete task {}: {}", task.id, e);
        }
    }

    async fn record(&self, entry: OperationalError) {
        if let Err(e) = self.store.record_error(entry).await {
            warn!("Failed to record operational error: {}", e);
        }
    }

    async fn run_loop(self: Arc<Self>, index: usize, token: CancellationToken) {
        let loop_id = format!("{}-{}", self.worker_id, index);
        debug!("Worker loop {} started", loop_id);

        // Checked between tasks only: a claimed task always runs to completion.
        while !token.is_cancelled() {
            match self.run_once(&loop_id).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => warn!("Worker loop {} failed to claim task: {}", loop_id, e),
            }
            self.idle(&token).await;
        }

        debug!("Worker loop {} stopped", loop_id);
    }

    async fn idle(&self, token: &CancellationToken) {
        let sleep = tokio::time::sleep(self.config.poll_interval);
        match self.store.work_notify() {
            Some(notify) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {}
                    _ = notify.notified() => {}
                    _ = sleep => {}
                }
            }
            None => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {}
                    _ = sleep => {}
                }
            }
        }
    }

    /// Starts the loops in the background.
    ///
    /// Returns a [`WorkerHandle`] that can be used to stop them.
    pub fn start(self) -> WorkerHandle {
        let cancellation_token = CancellationToken::new();
        let worker_id = self.worker_id.clone();
        let concurrency = self.config.concurrency.max(1);
        let worker = Arc::new(self);

        info!(
            "Starting worker {} with {} loops",
            worker.worker_id, concurrency
        );

        let token = cancellation_token.clone();
        let handle = tokio::spawn(async move {
            let mut loops = JoinSet::new();
            for index in 0..concurrency {
                loops.spawn(worker.clone().run_loop(index, token.child_token()));
            }

            while let Some(result) = loops.join_next().await {
                if let Err(e) = result {
                    error!("Worker loop of {} panicked: {}", worker.worker_id, e);
                }
            }

            info!("Worker {} stopped", worker.worker_id);
        });

        WorkerHandle {
            worker_id,
            handle,
            cancellation_token,
        }
    }
}

/// Handle for controlling a running worker pool.
pub struct WorkerHandle {
    worker_id: String,
    handle: JoinHandle<()>,
    cancellation_token: CancellationToken,
}

impl WorkerHandle {
    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Returns the cancellation token; child tokens are cancelled with it.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation_token
    }

    /// Stops claiming new work and waits for in-flight tasks to finish.
    pub async fn shutdown(self) {
        self.cancellation_token.cancel();
        let _ = self.handle.await;
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Aborts immediately. In-flight tasks keep their lease until it expires.
    pub fn abort(&self) {
        self.handle.abort();
    }
}
