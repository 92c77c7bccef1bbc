//! End-to-end shaping: building a real instance over a small directory and
//! checking the resulting public surface, rather than inspecting a
//! `ShapePlan` directly.

mod common;

use std::path::PathBuf;
use std::sync::Arc;

use apiloom_core::{BoundApi, InstanceConfig, Mode};
use serde_json::Value;

use common::math_and_greet_system;

#[tokio::test]
async fn root_object_exposes_namespaced_and_callable_children() {
    let system = Arc::new(math_and_greet_system());
    let config = InstanceConfig::new(PathBuf::from("/api")).with_mode(Mode::Eager);
    let api = BoundApi::build(config, system.clone(), system).await.unwrap();

    assert!(!api.is_callable());

    let sum = api.call("math.add", vec![Value::from(2), Value::from(3)]).await.unwrap();
    assert_eq!(sum, Value::from(5));

    let greeting = api.call("greet", vec![Value::from("ada")]).await.unwrap();
    assert_eq!(greeting, Value::from("hello, ada"));
}

#[tokio::test]
async fn lazy_mode_produces_the_same_public_shape_as_eager() {
    let system = Arc::new(math_and_greet_system());
    let config = InstanceConfig::new(PathBuf::from("/api")).with_mode(Mode::Lazy);
    let api = BoundApi::build(config, system.clone(), system).await.unwrap();

    let sum = api.call("math.add", vec![Value::from(10), Value::from(5)]).await.unwrap();
    assert_eq!(sum, Value::from(15));

    let greeting = api.call("greet", vec![Value::from("lin")]).await.unwrap();
    assert_eq!(greeting, Value::from("hello, lin"));
}

#[tokio::test]
async fn calling_an_unknown_path_is_an_argument_error() {
    let system = Arc::new(math_and_greet_system());
    let config = InstanceConfig::new(PathBuf::from("/api"));
    let api = BoundApi::build(config, system.clone(), system).await.unwrap();

    let err = api.call("math.divide", vec![]).await.unwrap_err();
    assert_eq!(err.kind(), apiloom_core::ErrorKind::ArgumentError);
}

#[tokio::test]
async fn calling_a_non_callable_path_is_an_argument_error() {
    let system = Arc::new(math_and_greet_system());
    let config = InstanceConfig::new(PathBuf::from("/api"));
    let api = BoundApi::build(config, system.clone(), system).await.unwrap();

    let err = api.call("math", vec![]).await.unwrap_err();
    assert_eq!(err.kind(), apiloom_core::ErrorKind::ArgumentError);
}
