//! `run`/`scope` context overlays observed from inside a hook, matching
//! what a real call would see without exposing any instance internals to
//! the test.

mod common;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use apiloom_core::context::ContextMap;
use apiloom_core::{AlwaysHook, BoundApi, HookOptions, InstanceConfig, MergeStrategy, ScopeConfig};
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::Value;

use common::math_and_greet_system;

struct CaptureContext(Arc<Mutex<Option<ContextMap>>>);

#[async_trait]
impl AlwaysHook for CaptureContext {
    async fn call(&self, _path: &str, _result: &Value, context: &ContextMap) {
        *self.0.lock().unwrap() = Some(context.clone());
    }
}

fn base_context() -> ContextMap {
    serde_json::from_value(serde_json::json!({
        "tenant": "acme",
        "limits": { "timeout": 5000, "retries": 3 }
    }))
    .unwrap()
}

#[tokio::test]
async fn shallow_scope_overlay_replaces_whole_top_level_keys() {
    let system = Arc::new(math_and_greet_system());
    let config = InstanceConfig::new(PathBuf::from("/api"))
        .with_context(base_context())
        .with_scope(ScopeConfig {
            enabled: true,
            merge: MergeStrategy::Shallow,
        });
    let api = BoundApi::build(config, system.clone(), system).await.unwrap();

    let seen = Arc::new(Mutex::new(None));
    api.hooks()
        .on_always(Arc::new(CaptureContext(seen.clone())), HookOptions::default())
        .unwrap();

    let overlay = serde_json::json!({ "limits": { "timeout": 9000 } });
    let api_in_scope = api.clone();
    api.run(
        overlay,
        Box::pin(async move {
            api_in_scope
                .call("math.add", vec![Value::from(1), Value::from(1)])
                .await
                .unwrap()
        }),
    )
    .await
    .unwrap();

    let seen = seen.lock().unwrap().clone().unwrap();
    assert_eq!(seen.get("tenant"), Some(&Value::from("acme")));
    // Shallow merge: the whole `limits` object was replaced, `retries` is gone.
    assert_eq!(seen.get("limits"), Some(&serde_json::json!({ "timeout": 9000 })));
}

#[tokio::test]
async fn deep_scope_overlay_merges_nested_objects() {
    let system = Arc::new(math_and_greet_system());
    let config = InstanceConfig::new(PathBuf::from("/api"))
        .with_context(base_context())
        .with_scope(ScopeConfig {
            enabled: true,
            merge: MergeStrategy::Deep,
        });
    let api = BoundApi::build(config, system.clone(), system).await.unwrap();

    let seen = Arc::new(Mutex::new(None));
    api.hooks()
        .on_always(Arc::new(CaptureContext(seen.clone())), HookOptions::default())
        .unwrap();

    let overlay = serde_json::json!({ "limits": { "timeout": 9000 } });
    let api_in_scope = api.clone();
    api.run(
        overlay,
        Box::pin(async move {
            api_in_scope
                .call("math.add", vec![Value::from(1), Value::from(1)])
                .await
                .unwrap()
        }),
    )
    .await
    .unwrap();

    let seen = seen.lock().unwrap().clone().unwrap();
    assert_eq!(
        seen.get("limits"),
        Some(&serde_json::json!({ "timeout": 9000, "retries": 3 }))
    );
}

struct CaptureTenants(Arc<Mutex<Vec<Option<Value>>>>);

#[async_trait]
impl AlwaysHook for CaptureTenants {
    async fn call(&self, _path: &str, _result: &Value, context: &ContextMap) {
        self.0.lock().unwrap().push(context.get("tenant").cloned());
    }
}

#[tokio::test]
async fn concurrent_scopes_do_not_observe_each_others_overlay() {
    let system = Arc::new(math_and_greet_system());
    let config = InstanceConfig::new(PathBuf::from("/api")).with_context(base_context());
    let api = BoundApi::build(config, system.clone(), system).await.unwrap();

    let tenants = Arc::new(Mutex::new(Vec::new()));
    api.hooks()
        .on_always(Arc::new(CaptureTenants(tenants.clone())), HookOptions::default())
        .unwrap();

    let api_a = api.clone();
    let api_a_inner = api.clone();
    let api_b = api.clone();
    let api_b_inner = api.clone();
    let fut_a = api_a.run(
        serde_json::json!({ "tenant": "a" }),
        Box::pin(async move {
            api_a_inner
                .call("math.add", vec![Value::from(1), Value::from(1)])
                .await
                .unwrap()
        }),
    );
    let fut_b = api_b.run(
        serde_json::json!({ "tenant": "b" }),
        Box::pin(async move {
            api_b_inner
                .call("math.add", vec![Value::from(2), Value::from(2)])
                .await
                .unwrap()
        }),
    );

    tokio::join!(fut_a, fut_b);

    let seen = tenants.lock().unwrap().clone();
    assert_eq!(seen.len(), 2);
    assert!(seen.contains(&Some(Value::from("a"))));
    assert!(seen.contains(&Some(Value::from("b"))));
}

#[tokio::test]
async fn run_fails_when_scope_is_disabled() {
    let system = Arc::new(math_and_greet_system());
    let config = InstanceConfig::new(PathBuf::from("/api")).with_scope(ScopeConfig {
        enabled: false,
        merge: MergeStrategy::Shallow,
    });
    let api = BoundApi::build(config, system.clone(), system).await.unwrap();

    let err = api
        .run(Value::Null, Box::pin(async { Value::Null }))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), apiloom_core::ErrorKind::RuntimeError);
}
