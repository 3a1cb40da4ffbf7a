#![allow(dead_code)]

use async_trait::async_trait;
use courier::core::CorrelationId;
use courier::prelude::*;
use courier::provider::{Provider, ProviderError, ProviderRequest, ProviderResponse};
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Provider that fails its first `failures` calls and records every request.
pub struct ScriptedProvider {
    failures: usize,
    calls: AtomicUsize,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn succeeding() -> Self {
        Self::failing_first(0)
    }

    pub fn failing_first(failures: usize) -> Self {
        Self {
            failures,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn always_failing() -> Self {
        Self::failing_first(usize::MAX)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, field: &str, id: i64) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.payload.get(field).and_then(Value::as_i64) == Some(id))
            .count()
    }

    pub fn correlation_ids(&self) -> Vec<CorrelationId> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter_map(|r| r.correlation_id.clone())
            .collect()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn call(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if call < self.failures {
            return Err(ProviderError::Transport("connection reset".into()));
        }
        Ok(ProviderResponse::new(request.payload))
    }
}

/// Before-handler that copies the id into the provider payload.
pub fn register_before(
    handlers: &mut HandlerRegistry<InMemoryStore>,
    policy: &SupervisorPolicy,
) {
    let id_field = policy.id_field.clone();
    handlers.register(policy.before_handler(), move |ctx: HandlerContext<InMemoryStore>| {
        let id_field = id_field.clone();
        async move {
            let id = ctx.task.payload.id_field(&id_field)?;
            let mut payload = Map::new();
            payload.insert(id_field, json!(id));
            payload.insert("to".into(), json!(format!("user-{id}@example.com")));
            Ok::<_, CoreError>(HandlerResult::ok(payload))
        }
    });
}

pub struct Engine {
    pub store: Arc<InMemoryStore>,
    pub supervisor: Arc<Supervisor>,
    pub worker: Worker<InMemoryStore>,
}

impl Engine {
    /// Wires one supervised channel: recorder, supervisor, function and
    /// channel processors.
    pub fn new(
        store: Arc<InMemoryStore>,
        policy: SupervisorPolicy,
        supervisor: Supervisor,
        mut handlers: HandlerRegistry<InMemoryStore>,
        provider: Arc<ScriptedProvider>,
    ) -> Self {
        FactRecorder::for_policy(&policy).register(&policy, &mut handlers);
        let supervisor = Arc::new(supervisor);
        supervisor.clone().register(&mut handlers);
        let handlers = Arc::new(handlers);

        let mut channel = HandlerProcessor::new(policy.channel.clone(), handlers.clone(), provider);
        if policy.two_stage {
            channel = channel.with_kickoff(policy.process.clone(), policy.id_field.clone());
        }
        let dispatcher = Dispatcher::builder()
            .processor(FunctionProcessor::new(handlers))
            .processor(channel)
            .build();

        let worker = Worker::new(store.clone(), Arc::new(dispatcher), "test-worker")
            .with_poll_interval(Duration::from_millis(5));

        Self {
            store,
            supervisor,
            worker,
        }
    }

    /// Runs tasks one at a time until `done` holds.
    pub async fn run_until<F>(&self, mut done: F)
    where
        F: FnMut() -> bool,
    {
        for _ in 0..2_000 {
            if done() {
                return;
            }
            if !self.worker.run_once("test-loop").await.unwrap() {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        }
        panic!("condition not reached");
    }

    /// Runs tasks until process `id` reaches a terminal state.
    pub async fn run_to_end(&self, id: i64) -> ProcessState {
        for _ in 0..2_000 {
            let state = self.supervisor.status(&*self.store, id).await.unwrap();
            if state.is_terminal() {
                return state;
            }
            if !self.worker.run_once("test-loop").await.unwrap() {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        }
        panic!("process {id} did not terminate");
    }
}
