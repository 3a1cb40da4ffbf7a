//! Execution layer: handler invocation, processor dispatch and the worker pool.
//!
//! Module organization:
//! - `handler`: named business functions and the [`HandlerResult`](crate::core::HandlerResult) lifecycle
//! - `dispatcher`: the immutable task-type to processor map
//! - `processor`: the built-in function and channel processors
//! - `worker`: claim/dispatch/complete loops
//! - `scheduler`: kickoff entry point

mod dispatcher;
mod error;
mod handler;
mod processor;
mod scheduler;
mod worker;

pub use dispatcher::{Dispatcher, DispatcherBuilder, Outcome, ProcessContext, Processor};
pub use error::{ProcessError, Result};
pub use handler::{BoxError, HandlerContext, HandlerRegistry, Reply};
pub use processor::{FunctionProcessor, HandlerProcessor};
pub use scheduler::Scheduler;
pub use worker::{Worker, WorkerConfig, WorkerHandle};
