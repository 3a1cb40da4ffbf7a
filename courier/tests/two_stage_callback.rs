//! Two-stage processes: the channel task only starts the external job, the
//! result arrives later through the callback inbox.

mod common;

use common::{init_tracing, Engine, ScriptedProvider};
use courier::callback::{CallbackInbox, CallbackReceipt};
use courier::core::ProcessKey;
use courier::prelude::*;
use courier::supervisor::HmacVerifier;
use serde_json::{json, Map};
use std::time::Duration;

const SECRET: &str = "transcription-callback-secret";

fn transcription_policy() -> SupervisorPolicy {
    SupervisorPolicy::new("transcription", TaskType::TRANSCRIPTION, "transcription_id")
        .two_stage()
        .with_poll_interval(Duration::from_millis(10))
}

fn engine(store: Arc<InMemoryStore>, provider: Arc<ScriptedProvider>, policy: SupervisorPolicy) -> Engine {
    let mut handlers = HandlerRegistry::new();
    handlers.register(
        policy.before_handler(),
        |ctx: HandlerContext<InMemoryStore>| async move {
            let id = ctx.task.payload.id_field("transcription_id")?;
            let mut payload = Map::new();
            payload.insert("audio_url".into(), json!(format!("s3://calls/{id}.wav")));
            Ok::<_, CoreError>(HandlerResult::ok(payload))
        },
    );
    let supervisor = Supervisor::new(policy.clone()).with_verifier(HmacVerifier::new(SECRET).unwrap());
    Engine::new(store, policy, supervisor, handlers, provider)
}

#[tokio::test]
async fn test_signed_callback_completes_process() {
    init_tracing();
    let store = Arc::new(InMemoryStore::new());
    let provider = Arc::new(ScriptedProvider::succeeding());
    let engine = engine(store.clone(), provider.clone(), transcription_policy());
    let inbox = CallbackInbox::new(store.clone());

    engine.supervisor.kickoff(&store, 17).await.unwrap();
    engine
        .run_until(|| !provider.correlation_ids().is_empty())
        .await;

    let correlation = provider.correlation_ids()[0].clone();
    assert_eq!(correlation.to_string(), "transcription:17:1");
    assert_eq!(
        engine.supervisor.status(&*store, 17).await.unwrap(),
        ProcessState::AttemptPending { attempt: 1 }
    );

    let body = br#"{"status":"completed","text":"hello"}"#;
    let signature = HmacVerifier::new(SECRET).unwrap().sign(body);
    let receipt = inbox
        .receive(&correlation.to_string(), body, Some(&signature))
        .await
        .unwrap();
    assert!(matches!(receipt, CallbackReceipt::Recorded(_)));

    // A redelivery changes nothing.
    let receipt = inbox
        .receive(&correlation.to_string(), body, Some(&signature))
        .await
        .unwrap();
    assert!(matches!(receipt, CallbackReceipt::Duplicate(_)));

    assert_eq!(engine.run_to_end(17).await, ProcessState::Succeeded);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_forged_callback_fails_attempt_and_retries() {
    init_tracing();
    let store = Arc::new(InMemoryStore::new());
    let provider = Arc::new(ScriptedProvider::succeeding());
    let engine = engine(store.clone(), provider.clone(), transcription_policy());
    let inbox = CallbackInbox::new(store.clone());

    engine.supervisor.kickoff(&store, 18).await.unwrap();
    engine
        .run_until(|| !provider.correlation_ids().is_empty())
        .await;

    let body = br#"{"status":"completed"}"#;
    let forged = HmacVerifier::new("wrong-secret").unwrap().sign(body);
    inbox
        .receive("transcription:18:1", body, Some(&forged))
        .await
        .unwrap();

    // The failed verification schedules a second kickoff.
    engine
        .run_until(|| provider.correlation_ids().len() == 2)
        .await;
    let second = provider.correlation_ids()[1].to_string();
    assert_eq!(second, "transcription:18:2");

    let facts = store
        .facts_for(&ProcessKey::new("transcription", 18))
        .await
        .unwrap();
    let failed = FactSet::new(&facts).get(FactKind::Failed, 1).unwrap();
    assert_eq!(
        failed.payload.as_ref().unwrap()["reason"],
        json!("signature mismatch")
    );

    let signature = HmacVerifier::new(SECRET).unwrap().sign(body);
    inbox.receive(&second, body, Some(&signature)).await.unwrap();
    assert_eq!(engine.run_to_end(18).await, ProcessState::Succeeded);
}

#[tokio::test]
async fn test_genuine_redelivery_after_forgery_completes_process() {
    init_tracing();
    let store = Arc::new(InMemoryStore::new());
    let provider = Arc::new(ScriptedProvider::succeeding());
    let engine = engine(store.clone(), provider.clone(), transcription_policy());
    let inbox = CallbackInbox::new(store.clone());

    engine.supervisor.kickoff(&store, 24).await.unwrap();
    engine
        .run_until(|| !provider.correlation_ids().is_empty())
        .await;

    // Both deliveries land before the next supervisor round.
    let body = br#"{"status":"completed","text":"hello"}"#;
    let forged = HmacVerifier::new("wrong-secret").unwrap().sign(body);
    let genuine = HmacVerifier::new(SECRET).unwrap().sign(body);
    inbox
        .receive("transcription:24:1", body, Some(&forged))
        .await
        .unwrap();
    let receipt = inbox
        .receive("transcription:24:1", body, Some(&genuine))
        .await
        .unwrap();
    assert!(matches!(receipt, CallbackReceipt::Duplicate(_)));

    assert_eq!(engine.run_to_end(24).await, ProcessState::Succeeded);
    assert_eq!(provider.calls(), 1);
    assert_eq!(
        store
            .deliveries_for(&ProcessKey::new("transcription", 24), 1)
            .await
            .unwrap()
            .len(),
        2
    );
}

#[tokio::test]
async fn test_silent_provider_times_out() {
    init_tracing();
    let store = Arc::new(InMemoryStore::new());
    let provider = Arc::new(ScriptedProvider::succeeding());
    let policy = transcription_policy().with_response_timeout(Duration::from_millis(20));
    let engine = engine(store.clone(), provider.clone(), policy);

    engine.supervisor.kickoff(&store, 19).await.unwrap();
    assert_eq!(
        engine.run_to_end(19).await,
        ProcessState::Exhausted { failures: 2 }
    );
    assert_eq!(provider.calls(), 2);

    let facts = store
        .facts_for(&ProcessKey::new("transcription", 19))
        .await
        .unwrap();
    let failed = FactSet::new(&facts).get(FactKind::Failed, 2).unwrap();
    assert_eq!(
        failed.payload.as_ref().unwrap()["reason"],
        json!("response timeout")
    );
}

#[tokio::test]
async fn test_unroutable_callback_is_recorded_as_error() {
    let store = Arc::new(InMemoryStore::new());
    let inbox = CallbackInbox::new(store.clone());

    let receipt = inbox.receive("not-a-correlation", b"{}", None).await.unwrap();
    assert_eq!(receipt, CallbackReceipt::Unroutable);
    assert_eq!(store.recent_errors(1).await.unwrap()[0].source, "callback");
}
