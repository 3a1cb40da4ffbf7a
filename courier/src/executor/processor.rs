//! Built-in processors.
//!
//! - [`FunctionProcessor`] runs `db_function` tasks (supervisors and other
//!   routines living next to the store).
//! - [`HandlerProcessor`] runs channel tasks: before-handler, provider call,
//!   then the success or error handler.

use super::dispatcher::{Outcome, ProcessContext, Processor};
use super::error::ProcessError;
use super::handler::{HandlerContext, HandlerRegistry};
use crate::core::{CoreError, CorrelationId, HandlerResult, ProcessKey, TaskType};
use crate::provider::{Provider, ProviderRequest};
use crate::storage::{Store, Task};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Runs the handler named by the payload's `db_function`.
pub struct FunctionProcessor<S> {
    handlers: Arc<HandlerRegistry<S>>,
}

impl<S> FunctionProcessor<S> {
    pub fn new(handlers: Arc<HandlerRegistry<S>>) -> Self {
        Self { handlers }
    }
}

#[async_trait]
impl<S: Store> Processor<S> for FunctionProcessor<S> {
    fn task_type(&self) -> TaskType {
        TaskType::DB_FUNCTION
    }

    async fn process(&self, ctx: &ProcessContext<S>, task: &Task) -> Outcome {
        let Some(name) = task.payload.db_function.as_deref() else {
            return Outcome::failed(ProcessError::MissingHandlerName("db_function"));
        };

        match self
            .handlers
            .invoke(name, HandlerContext::new(ctx.store.clone(), task.clone()))
            .await
        {
            Ok(reply) => {
                if !reply.result.is_success() {
                    warn!(
                        "Function {} returned failure: {}",
                        name,
                        reply.result.failure_reason().unwrap_or("unspecified")
                    );
                }
                reply.into()
            }
            Err(e) => Outcome::failed(e),
        }
    }
}

/// Two-stage settings: the correlation id handed to the provider is built
/// from the process name, the payload's id field and the attempt.
#[derive(Debug, Clone)]
struct Kickoff {
    process: String,
    id_field: String,
}

/// Runs one channel type through its before/success/error handlers and a
/// provider.
///
/// ```no_run
/// use courier::core::TaskType;
/// use courier::executor::{HandlerProcessor, HandlerRegistry};
/// use courier::provider::Provider;
/// use courier::storage::InMemoryStore;
/// use std::sync::Arc;
///
/// # fn example(provider: Arc<dyn Provider>) {
/// let handlers = Arc::new(HandlerRegistry::<InMemoryStore>::new());
/// let transcription = HandlerProcessor::new(TaskType::TRANSCRIPTION, handlers, provider)
///     .with_kickoff("transcription", "transcription_id");
/// # }
/// ```
pub struct HandlerProcessor<S> {
    task_type: TaskType,
    handlers: Arc<HandlerRegistry<S>>,
    provider: Arc<dyn Provider>,
    kickoff: Option<Kickoff>,
}

impl<S: Store> HandlerProcessor<S> {
    pub fn new(
        task_type: TaskType,
        handlers: Arc<HandlerRegistry<S>>,
        provider: Arc<dyn Provider>,
    ) -> Self {
        Self {
            task_type,
            handlers,
            provider,
            kickoff: None,
        }
    }

    /// Switches to kickoff mode: the provider only starts the external
    /// operation and receives a correlation id for the later callback.
    pub fn with_kickoff(mut self, process: impl Into<String>, id_field: impl Into<String>) -> Self {
        self.kickoff = Some(Kickoff {
            process: process.into(),
            id_field: id_field.into(),
        });
        self
    }

    fn request(
        &self,
        task: &Task,
        payload: Map<String, Value>,
    ) -> Result<ProviderRequest, ProcessError> {
        let correlation_id = match &self.kickoff {
            Some(kickoff) => {
                let id = task.payload.id_field(&kickoff.id_field)?;
                let attempt = task
                    .payload
                    .attempt
                    .ok_or_else(|| CoreError::MissingField("attempt".into()))?;
                Some(CorrelationId::new(
                    ProcessKey::new(kickoff.process.clone(), id),
                    attempt,
                ))
            }
            None => None,
        };

        Ok(ProviderRequest {
            task_type: self.task_type.clone(),
            payload,
            correlation_id,
        })
    }

    /// Invokes an optional success/error handler with `previous`. Without a
    /// handler the outcome is `previous` itself.
    async fn follow_with(
        &self,
        role: &'static str,
        name: Option<&str>,
        ctx: &ProcessContext<S>,
        task: &Task,
        previous: HandlerResult,
    ) -> Outcome {
        let Some(name) = name else {
            debug!("Task {} has no {}", task.id, role);
            return previous.into();
        };

        let handler_ctx =
            HandlerContext::new(ctx.store.clone(), task.clone()).with_previous(previous);
        match self.handlers.invoke(name, handler_ctx).await {
            Ok(reply) => Outcome::from(reply.result),
            Err(e) => Outcome::failed(e),
        }
    }

    /// Reports an attempt failure caused by `cause` to the error handler and
    /// returns `cause` as the outcome.
    async fn fail_attempt(&self, ctx: &ProcessContext<S>, task: &Task, cause: ProcessError) -> Outcome {
        let handled = self
            .follow_with(
                "error_handler",
                task.payload.error_handler.as_deref(),
                ctx,
                task,
                HandlerResult::error(cause.to_string()),
            )
            .await;
        if let Err(e) = handled.result {
            error!("Error handler failed for task {}: {}", task.id, e);
        }
        Outcome::failed(cause)
    }
}

#[async_trait]
impl<S: Store> Processor<S> for HandlerProcessor<S> {
    fn task_type(&self) -> TaskType {
        self.task_type.clone()
    }

    async fn process(&self, ctx: &ProcessContext<S>, task: &Task) -> Outcome {
        let Some(before) = task.payload.before_handler.as_deref() else {
            return Outcome::failed(ProcessError::MissingHandlerName("before_handler"));
        };

        let prepared = match self
            .handlers
            .invoke(before, HandlerContext::new(ctx.store.clone(), task.clone()))
            .await
        {
            Ok(reply) => reply.result,
            Err(e) => return self.fail_attempt(ctx, task, e).await,
        };

        if !prepared.is_success() {
            // Validation failures and refusals never reach the provider.
            debug!(
                "Before-handler {} refused task {}: {}",
                before,
                task.id,
                prepared.failure_reason().unwrap_or("unspecified")
            );
            let handled = self
                .follow_with(
                    "error_handler",
                    task.payload.error_handler.as_deref(),
                    ctx,
                    task,
                    prepared.clone(),
                )
                .await;
            return match handled.result {
                Ok(_) => prepared.into(),
                Err(e) => Outcome::failed(e),
            };
        }

        let request = match self.request(task, prepared.into_payload()) {
            Ok(request) => request,
            Err(e) => return self.fail_attempt(ctx, task, e).await,
        };

        match tokio::time::timeout(ctx.provider_timeout, self.provider.call(request)).await {
            Ok(Ok(response)) => {
                self.follow_with(
                    "success_handler",
                    task.payload.success_handler.as_deref(),
                    ctx,
                    task,
                    HandlerResult::ok(response.payload),
                )
                .await
            }
            Ok(Err(e)) => self.fail_attempt(ctx, task, e.into()).await,
            Err(_) => {
                self.fail_attempt(ctx, task, ProcessError::ProviderTimeout(ctx.provider_timeout))
                    .await
            }
        }
    }
}
