//! Named business functions and the registry that invokes them.
//!
//! Every handler (before/success/error handlers and db-functions) has the
//! same shape: it receives a [`HandlerContext`] and resolves to a
//! [`HandlerResult`] envelope, optionally wrapped in a [`Reply`] that asks the
//! worker to run the task again later.

use super::error::{ProcessError, Result};
use crate::core::HandlerResult;
use crate::storage::Task;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::debug;

/// A boxed error that can be sent across threads.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// What a handler sees when it is invoked.
pub struct HandlerContext<S> {
    pub store: Arc<S>,
    pub task: Task,
    /// Envelope produced by the preceding step: the before-handler's
    /// validation result, or the provider outcome for success/error handlers.
    pub previous: Option<HandlerResult>,
}

impl<S> HandlerContext<S> {
    pub fn new(store: Arc<S>, task: Task) -> Self {
        Self {
            store,
            task,
            previous: None,
        }
    }

    pub fn with_previous(mut self, previous: HandlerResult) -> Self {
        self.previous = Some(previous);
        self
    }
}

/// A handler's answer: the envelope plus an optional "run me again at".
///
/// Only db-functions use `run_again_at`; the worker turns it into a new task
/// with the same payload (the trampoline that drives supervisors).
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub result: HandlerResult,
    pub run_again_at: Option<DateTime<Utc>>,
}

impl Reply {
    pub fn run_again_at(result: HandlerResult, at: DateTime<Utc>) -> Self {
        Self {
            result,
            run_again_at: Some(at),
        }
    }
}

impl From<HandlerResult> for Reply {
    fn from(result: HandlerResult) -> Self {
        Self {
            result,
            run_again_at: None,
        }
    }
}

type BoxedHandler<S> = Arc<
    dyn Fn(HandlerContext<S>) -> Pin<Box<dyn Future<Output = Result<Reply>> + Send>>
        + Send
        + Sync,
>;

/// Registry mapping handler names to functions.
///
/// Built once at startup and shared read-only by every processor.
pub struct HandlerRegistry<S> {
    handlers: HashMap<String, BoxedHandler<S>>,
}

impl<S: Send + Sync + 'static> HandlerRegistry<S> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registers a handler under `name`, replacing any previous one.
    ///
    /// The handler may return anything convertible into a [`Reply`] (a plain
    /// [`HandlerResult`] or a `Reply`). An `Err` is an operational failure,
    /// not a business outcome.
    ///
    /// ```
    /// use courier::core::HandlerResult;
    /// use courier::executor::HandlerRegistry;
    /// use courier::storage::InMemoryStore;
    ///
    /// let mut registry: HandlerRegistry<InMemoryStore> = HandlerRegistry::new();
    /// registry.register("email.before", |ctx| async move {
    ///     let id = ctx.task.payload.id_field("send_attempt_id")?;
    ///     let mut payload = serde_json::Map::new();
    ///     payload.insert("to".into(), format!("user-{id}@example.com").into());
    ///     Ok::<_, courier::core::CoreError>(HandlerResult::ok(payload))
    /// });
    /// assert!(registry.contains("email.before"));
    /// ```
    pub fn register<F, Fut, R, E>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(HandlerContext<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
        R: Into<Reply>,
        E: Into<BoxError>,
    {
        let name = name.into();
        let handler_name = name.clone();
        let handler = Arc::new(handler);

        let boxed: BoxedHandler<S> = Arc::new(move |ctx: HandlerContext<S>| {
            let handler = handler.clone();
            let name = handler_name.clone();
            Box::pin(async move {
                handler(ctx).await.map(Into::into).map_err(|e| {
                    let boxed: BoxError = e.into();
                    ProcessError::Handler {
                        name,
                        message: boxed.to_string(),
                    }
                })
            })
        });

        debug!("Registered handler: {}", name);
        self.handlers.insert(name, boxed);
    }

    /// Invokes the handler registered under `name`.
    pub async fn invoke(&self, name: &str, ctx: HandlerContext<S>) -> Result<Reply> {
        let handler = self
            .handlers
            .get(name)
            .cloned()
            .ok_or_else(|| ProcessError::HandlerNotRegistered(name.to_string()))?;
        handler(ctx).await
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<S: Send + Sync + 'static> Default for HandlerRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}
