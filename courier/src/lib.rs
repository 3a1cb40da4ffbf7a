//! Courier: a durable task queue with fact-derived supervisors.
//!
//! Courier runs small units of work (tasks) out of a shared store and drives
//! multi-attempt processes such as "send this email, retry once" from an
//! append-only fact log. Nothing about a process is stored as mutable state:
//! every decision is derived from its facts, and the uniqueness of each fact
//! is what keeps concurrent workers from doing the same thing twice.
//!
//! # Quick Start
//!
//! ```no_run
//! use courier::prelude::*;
//! use courier::provider::{Provider, ProviderError, ProviderRequest, ProviderResponse};
//!
//! struct Mailer;
//!
//! #[async_trait::async_trait]
//! impl Provider for Mailer {
//!     async fn call(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
//!         Ok(ProviderResponse::new(request.payload))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(InMemoryStore::new());
//!     let policy = SupervisorPolicy::new("email_send", TaskType::EMAIL, "send_attempt_id");
//!
//!     let mut handlers = HandlerRegistry::new();
//!     handlers.register(policy.before_handler(), |_ctx| async move {
//!         Ok::<_, CoreError>(HandlerResult::done())
//!     });
//!     FactRecorder::for_policy(&policy).register(&policy, &mut handlers);
//!     let supervisor = Arc::new(Supervisor::new(policy));
//!     supervisor.clone().register(&mut handlers);
//!     let handlers = Arc::new(handlers);
//!
//!     let dispatcher = Dispatcher::builder()
//!         .processor(FunctionProcessor::new(handlers.clone()))
//!         .processor(HandlerProcessor::new(TaskType::EMAIL, handlers, Arc::new(Mailer)))
//!         .build();
//!
//!     supervisor.kickoff(&store, 42).await?;
//!
//!     let worker = Worker::new(store.clone(), Arc::new(dispatcher), "worker-1").start();
//!     tokio::time::sleep(std::time::Duration::from_secs(1)).await;
//!     worker.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`core`]: task payloads, facts, handler envelopes and correlation ids
//! - [`storage`]: the fact log, the leased task store and the error log
//! - [`executor`]: handler registry, processors, dispatcher and worker pool
//! - [`supervisor`]: the fact-derived retry state machine
//! - [`provider`]: the seam to external channel providers
//! - [`callback`]: inbound responses for two-stage processes
//! - [`config`]: engine configuration

pub mod callback;
pub mod config;
pub mod core;
pub mod executor;
pub mod provider;
pub mod storage;
pub mod supervisor;

pub use config::EngineConfig;

pub use core::{
    CoreError, CorrelationId, Fact, FactKind, FactSet, HandlerResult, NewFact, ProcessKey,
    TaskPayload, TaskType,
};

pub use executor::{
    Dispatcher, FunctionProcessor, HandlerProcessor, HandlerRegistry, ProcessError, Processor,
    Scheduler, Worker, WorkerConfig, WorkerHandle,
};

pub use storage::{InMemoryStore, NewTask, StorageError, Store, Task, TaskStatus};

#[cfg(feature = "sqlite")]
pub use storage::SqliteStore;

#[cfg(feature = "postgres")]
pub use storage::PostgresStore;

pub use supervisor::{Decision, FactRecorder, ProcessState, Supervisor, SupervisorPolicy};

// Re-export dependencies used in public API
pub use serde;
pub use tokio;

/// Prelude module for convenient glob imports
///
/// # Example
///
/// ```
/// use courier::prelude::*;
/// ```
pub mod prelude {
    pub use crate::callback::{CallbackInbox, CallbackReceipt};

    pub use crate::core::{
        CoreError, CorrelationId, FactKind, FactSet, HandlerResult, NewFact, ProcessKey,
        TaskPayload, TaskType,
    };

    pub use crate::executor::{
        Dispatcher, FunctionProcessor, HandlerContext, HandlerProcessor, HandlerRegistry,
        Outcome, ProcessContext, ProcessError, Processor, Reply, Scheduler, Worker, WorkerConfig,
        WorkerHandle,
    };

    pub use crate::storage::{
        DeliveryLog, ErrorLog, FactLog, InMemoryStore, NewTask, StorageError, Store, TaskStore,
    };

    #[cfg(feature = "sqlite")]
    pub use crate::storage::SqliteStore;

    pub use crate::supervisor::{
        Decision, FactRecorder, ProcessState, ResponseVerifier, Supervisor, SupervisorPolicy,
    };

    pub use serde::{Deserialize, Serialize};
    pub use std::sync::Arc;
}
