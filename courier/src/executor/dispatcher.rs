//! Routing claimed tasks to the processor responsible for their type.

use super::error::ProcessError;
use super::handler::Reply;
use crate::core::{HandlerResult, TaskType};
use crate::storage::Task;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Per-run environment handed to processors by the worker.
pub struct ProcessContext<S> {
    pub store: Arc<S>,
    pub worker_id: String,
    /// Upper bound for a single provider call.
    pub provider_timeout: Duration,
}

/// Result of one processing pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    /// The business envelope, or the operational error that prevented one.
    pub result: Result<HandlerResult, ProcessError>,
    /// Follow-up requested by a db-function.
    pub run_again_at: Option<DateTime<Utc>>,
}

impl Outcome {
    pub fn failed(error: ProcessError) -> Self {
        Self {
            result: Err(error),
            run_again_at: None,
        }
    }
}

impl From<Reply> for Outcome {
    fn from(reply: Reply) -> Self {
        Self {
            result: Ok(reply.result),
            run_again_at: reply.run_again_at,
        }
    }
}

impl From<HandlerResult> for Outcome {
    fn from(result: HandlerResult) -> Self {
        Reply::from(result).into()
    }
}

/// Processes tasks of one type.
#[async_trait]
pub trait Processor<S>: Send + Sync {
    fn task_type(&self) -> TaskType;

    async fn process(&self, ctx: &ProcessContext<S>, task: &Task) -> Outcome;
}

/// Immutable map from task type to processor.
///
/// ```
/// use courier::executor::{Dispatcher, FunctionProcessor, HandlerRegistry};
/// use courier::storage::InMemoryStore;
/// use std::sync::Arc;
///
/// let handlers = Arc::new(HandlerRegistry::<InMemoryStore>::new());
/// let dispatcher = Dispatcher::builder()
///     .processor(FunctionProcessor::new(handlers))
///     .build();
/// assert_eq!(dispatcher.len(), 1);
/// ```
pub struct Dispatcher<S> {
    processors: HashMap<TaskType, Arc<dyn Processor<S>>>,
}

impl<S: Send + Sync + 'static> Dispatcher<S> {
    pub fn builder() -> DispatcherBuilder<S> {
        DispatcherBuilder {
            processors: HashMap::new(),
        }
    }

    pub fn get(&self, task_type: &TaskType) -> Option<&Arc<dyn Processor<S>>> {
        self.processors.get(task_type)
    }

    /// Runs the task through its processor. Unknown types become a failed
    /// outcome rather than an error so the worker still completes the task.
    pub async fn dispatch(&self, ctx: &ProcessContext<S>, task: &Task) -> Outcome {
        match self.get(&task.task_type) {
            Some(processor) => processor.process(ctx, task).await,
            None => Outcome::failed(ProcessError::UnknownTaskType(task.task_type.to_string())),
        }
    }

    pub fn task_types(&self) -> impl Iterator<Item = &TaskType> {
        self.processors.keys()
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}

pub struct DispatcherBuilder<S> {
    processors: HashMap<TaskType, Arc<dyn Processor<S>>>,
}

impl<S: Send + Sync + 'static> DispatcherBuilder<S> {
    /// Adds a processor. A later processor for the same type replaces the
    /// earlier one.
    pub fn processor(mut self, processor: impl Processor<S> + 'static) -> Self {
        let task_type = processor.task_type();
        if self
            .processors
            .insert(task_type.clone(), Arc::new(processor))
            .is_some()
        {
            warn!("Replaced processor for task type: {}", task_type);
        } else {
            debug!("Registered processor for task type: {}", task_type);
        }
        self
    }

    pub fn build(self) -> Dispatcher<S> {
        Dispatcher {
            processors: self.processors,
        }
    }
}
