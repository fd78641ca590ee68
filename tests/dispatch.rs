//! Registration and routing behaviour across both dispatch modes.

mod common;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};

use common::{inbound, MemoryTransport};
use switchboard::{DispatchError, DispatchMode, Registrator, RegistratorConfig};

fn direct(transport: Arc<MemoryTransport>) -> Registrator {
    Registrator::new(RegistratorConfig::direct("svc"), transport).unwrap()
}

fn legacy(transport: Arc<MemoryTransport>) -> Registrator {
    Registrator::new(RegistratorConfig::legacy("svc.queue"), transport).unwrap()
}

/// Handler that records the bodies it was invoked with into `calls`
fn recorder(
    calls: &Arc<Mutex<Vec<Value>>>,
) -> impl Fn(Value) -> futures_util::future::Ready<switchboard::Result<Value>> + Send + Sync + 'static
{
    let seen = Arc::clone(calls);
    move |body: Value| {
        seen.lock().unwrap().push(body);
        futures_util::future::ready(Ok(json!({"result": "ok"})))
    }
}

#[tokio::test]
async fn direct_mode_derives_queue_name_from_prefix_and_handler() {
    let transport = MemoryTransport::new();
    let registrator = direct(Arc::clone(&transport));

    let binding = registrator
        .rpc("Moffa", |body| async move { Ok(body) })
        .await
        .unwrap();

    assert_eq!(binding.name, "svc.moffa");
    assert_eq!(binding.routing_key, "svc.moffa");
    assert!(!binding.durable);

    let bindings = registrator.registry().bindings("moffa").await.unwrap();
    assert_eq!(bindings.len(), 1, "one consumer");

    let declared = transport.declared();
    assert_eq!(declared.len(), 1);
    assert_eq!(declared[0].name, "svc.moffa");
    assert!(!declared[0].durable);
}

#[tokio::test]
async fn direct_mode_honours_explicit_queue_name() {
    let transport = MemoryTransport::new();
    let registrator = direct(transport);

    let binding = registrator
        .rpc_on("boffa", "boffa.moffa", |body| async move { Ok(body) })
        .await
        .unwrap();

    assert_eq!(binding.name, "boffa.moffa");
    assert!(registrator.registry().contains("boffa").await);
}

#[tokio::test]
async fn re_registration_accumulates_bindings() {
    let transport = MemoryTransport::new();
    let registrator = direct(transport);

    registrator
        .task_on("alpha", "alpha.first", |_| async { Ok(json!({})) })
        .await
        .unwrap();
    registrator
        .task_on("alpha", "alpha.second", |_| async { Ok(json!({})) })
        .await
        .unwrap();

    let bindings = registrator.registry().bindings("alpha").await.unwrap();
    assert_eq!(bindings.len(), 2, "two bindings, not one overwritten");
    assert_eq!(bindings[0].name, "alpha.first");
    assert_eq!(bindings[1].name, "alpha.second");
}

#[tokio::test]
async fn legacy_mode_binds_every_handler_to_the_shared_queue() {
    let transport = MemoryTransport::new();
    let registrator = legacy(transport);

    let alpha = registrator
        .rpc("alpha", |body| async move { Ok(body) })
        .await
        .unwrap();
    let beta = registrator
        .rpc_on("beta", "custom.key", |body| async move { Ok(body) })
        .await
        .unwrap();

    assert_eq!(registrator.mode(), DispatchMode::Legacy);
    assert_eq!(alpha.name, "svc.queue");
    assert_eq!(beta.name, "svc.queue", "override does not move consumption");
    assert_eq!(alpha.routing_key, "svc.queue");
    assert_eq!(beta.routing_key, "custom.key");

    assert!(registrator.router().resolves("alpha").await);
    assert!(registrator.router().resolves("beta").await);
}

#[tokio::test]
async fn legacy_mode_requires_a_shared_queue_name() {
    let config = RegistratorConfig {
        legacy: true,
        queue: None,
        ..RegistratorConfig::default()
    };
    let result = Registrator::new(config, MemoryTransport::new());
    match result {
        Err(DispatchError::Config(message)) => assert!(message.contains("queue")),
        other => panic!("expected configuration error, got {other:?}"),
    }
}

#[tokio::test]
async fn multiplex_routes_to_the_named_handler_only() {
    let transport = MemoryTransport::new();
    let registrator = legacy(Arc::clone(&transport));

    let alpha_calls = Arc::new(Mutex::new(Vec::new()));
    let beta_calls = Arc::new(Mutex::new(Vec::new()));
    registrator.rpc("alpha", recorder(&alpha_calls)).await.unwrap();
    registrator.rpc("beta", recorder(&beta_calls)).await.unwrap();

    let envelope = json!({"command": "alpha", "data": {"n": 1}});
    let (message, acks) = inbound(envelope.clone());
    let router = registrator.registry().callbacks("alpha").await.unwrap()[0].clone();
    router(envelope, message).await.unwrap();

    assert_eq!(*alpha_calls.lock().unwrap(), vec![json!({"n": 1})]);
    assert!(beta_calls.lock().unwrap().is_empty(), "beta untouched");
    assert_eq!(acks.load(Ordering::SeqCst), 1);

    let replies = transport.sent_to("caller.client");
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].payload, json!({"result": "ok"}));
    assert_eq!(replies[0].props.correlation_id.as_deref(), Some("corr-1"));
}

#[tokio::test]
async fn malformed_envelope_is_answered_without_invoking_a_handler() {
    let transport = MemoryTransport::new();
    let registrator = legacy(Arc::clone(&transport));

    let calls = Arc::new(Mutex::new(Vec::new()));
    registrator.rpc("flappy", recorder(&calls)).await.unwrap();

    // no "command" key at all
    let body = json!({"data": {"n": 1}});
    let (message, acks) = inbound(body.clone());
    let router = registrator.registry().callbacks("flappy").await.unwrap()[0].clone();
    router(body.clone(), message).await.unwrap();

    assert!(calls.lock().unwrap().is_empty(), "no handler invoked");
    assert_eq!(acks.load(Ordering::SeqCst), 1);

    let replies = transport.sent_to("caller.client");
    assert_eq!(replies.len(), 1);
    let error = replies[0].payload["error"].as_str().unwrap();
    assert!(error.contains("Malformed request"), "got {error:?}");
    assert_eq!(replies[0].payload["sent"], body);
}

#[tokio::test]
async fn missing_data_key_is_malformed_too() {
    let transport = MemoryTransport::new();
    let registrator = legacy(Arc::clone(&transport));
    registrator
        .rpc("alpha", |body| async move { Ok(body) })
        .await
        .unwrap();

    let body = json!({"command": "alpha"});
    let (message, acks) = inbound(body.clone());
    let router = registrator.registry().callbacks("alpha").await.unwrap()[0].clone();
    router(body, message).await.unwrap();

    assert_eq!(acks.load(Ordering::SeqCst), 1);
    let replies = transport.sent_to("caller.client");
    assert!(replies[0].payload["error"]
        .as_str()
        .unwrap()
        .contains("Malformed request"));
}

#[tokio::test]
async fn unknown_command_is_answered_with_the_original_envelope() {
    let transport = MemoryTransport::new();
    let registrator = legacy(Arc::clone(&transport));
    registrator
        .rpc("alpha", |body| async move { Ok(body) })
        .await
        .unwrap();

    let body = json!({"command": "nope", "data": {}});
    let (message, acks) = inbound(body.clone());
    let router = registrator.registry().callbacks("alpha").await.unwrap()[0].clone();
    router(body.clone(), message).await.unwrap();

    assert_eq!(acks.load(Ordering::SeqCst), 1);
    let replies = transport.sent_to("caller.client");
    assert_eq!(replies.len(), 1);
    let error = replies[0].payload["error"].as_str().unwrap();
    assert!(error.contains("Unable call method"), "got {error:?}");
    assert_eq!(replies[0].payload["sent"], body);
}

#[tokio::test]
async fn failing_handler_becomes_an_error_reply_on_the_legacy_queue() {
    let transport = MemoryTransport::new();
    let registrator = legacy(Arc::clone(&transport));
    registrator
        .rpc("alpha", |_| async { Err(DispatchError::handler_error("boom")) })
        .await
        .unwrap();

    let body = json!({"command": "alpha", "data": {}});
    let (message, acks) = inbound(body.clone());
    let router = registrator.registry().callbacks("alpha").await.unwrap()[0].clone();
    router(body, message).await.unwrap();

    assert_eq!(acks.load(Ordering::SeqCst), 1, "acked exactly once");
    let replies = transport.sent_to("caller.client");
    assert_eq!(replies.len(), 1);
    assert!(replies[0].payload["error"]
        .as_str()
        .unwrap()
        .contains("Unable call method"));
}

#[tokio::test]
async fn direct_mode_handler_errors_propagate_unacked() {
    let transport = MemoryTransport::new();
    let registrator = direct(Arc::clone(&transport));
    registrator
        .task("alpha", |_| async { Err(DispatchError::handler_error("boom")) })
        .await
        .unwrap();

    let (message, acks) = inbound(json!({"n": 1}));
    let callback = registrator.registry().callbacks("alpha").await.unwrap()[0].clone();
    let result = callback(json!({"n": 1}), message).await;

    assert!(result.is_err(), "error reaches the consumption loop");
    assert_eq!(acks.load(Ordering::SeqCst), 0, "not acknowledged here");
    assert!(transport.published().is_empty(), "no error reply in direct mode");
}

#[tokio::test]
async fn every_outcome_acknowledges_exactly_once() {
    let transport = MemoryTransport::new();
    let registrator = direct(Arc::clone(&transport));
    registrator
        .task("quiet", |_| async { Ok(json!({})) })
        .await
        .unwrap();
    registrator
        .rpc("loud", |body| async move { Ok(body) })
        .await
        .unwrap();

    for name in ["quiet", "loud"] {
        let (message, acks) = inbound(json!({"x": 1}));
        let callback = registrator.registry().callbacks(name).await.unwrap()[0].clone();
        callback(json!({"x": 1}), message).await.unwrap();
        assert_eq!(acks.load(Ordering::SeqCst), 1, "{name} acked once");
    }

    // task style sends nothing back
    assert!(transport.sent_to("caller.client").len() == 1, "only rpc replied");
}
