//! Lazy mode: subdirectories stay unmaterialized until addressed, and
//! materializing one is safe to race.

mod common;

use std::path::PathBuf;
use std::sync::Arc;

use apiloom_core::{BoundApi, DescribeNode, InstanceConfig, Mode};
use serde_json::Value;

use common::math_and_greet_system;

#[tokio::test]
async fn describe_without_show_all_never_materializes_lazy_subdirectories() {
    let system = Arc::new(math_and_greet_system());
    let config = InstanceConfig::new(PathBuf::from("/api")).with_mode(Mode::Lazy);
    let api = BoundApi::build(config, system.clone(), system).await.unwrap();

    let described = api.describe(false).await.unwrap();
    let DescribeNode::Object { children } = described else {
        panic!("expected root object");
    };
    assert!(matches!(children.get("greet"), Some(DescribeNode::Lazy { .. })));
}

#[tokio::test]
async fn describe_with_show_all_materializes_everything() {
    let system = Arc::new(math_and_greet_system());
    let config = InstanceConfig::new(PathBuf::from("/api")).with_mode(Mode::Lazy);
    let api = BoundApi::build(config, system.clone(), system).await.unwrap();

    let described = api.describe(true).await.unwrap();
    let DescribeNode::Object { children } = described else {
        panic!("expected root object");
    };
    assert!(matches!(children.get("greet"), Some(DescribeNode::Callable { .. })));
}

#[tokio::test]
async fn concurrent_access_materializes_a_lazy_subdirectory_exactly_once() {
    let system = Arc::new(math_and_greet_system());
    let config = InstanceConfig::new(PathBuf::from("/api")).with_mode(Mode::Lazy);
    let api = BoundApi::build(config, system.clone(), system).await.unwrap();

    let api_a = api.clone();
    let api_b = api.clone();
    let (result_a, result_b) = tokio::join!(
        api_a.call("greet", vec![Value::from("a")]),
        api_b.call("greet", vec![Value::from("b")]),
    );

    assert_eq!(result_a.unwrap(), Value::from("hello, a"));
    assert_eq!(result_b.unwrap(), Value::from("hello, b"));
}

#[tokio::test]
async fn accessing_a_materialized_path_twice_returns_consistent_results() {
    let system = Arc::new(math_and_greet_system());
    let config = InstanceConfig::new(PathBuf::from("/api")).with_mode(Mode::Lazy);
    let api = BoundApi::build(config, system.clone(), system).await.unwrap();

    let first = api.call("greet", vec![Value::from("kay")]).await.unwrap();
    let second = api.call("greet", vec![Value::from("kay")]).await.unwrap();
    assert_eq!(first, second);
}
