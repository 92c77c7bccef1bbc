use std::path::PathBuf;
use std::sync::Arc;

use apiloom_core::error::BoxError;
use apiloom_core::{ExportValue, InMemoryModuleSystem, RawExports, UserFn};
use async_trait::async_trait;
use serde_json::Value;

pub struct TestFn<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F> UserFn for TestFn<F>
where
    F: Fn(Vec<Value>) -> std::result::Result<Value, BoxError> + Send + Sync,
{
    async fn call(&self, args: Vec<Value>) -> std::result::Result<Value, BoxError> {
        (self.f)(args)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

pub fn test_fn<F>(name: &str, f: F) -> Arc<dyn UserFn>
where
    F: Fn(Vec<Value>) -> std::result::Result<Value, BoxError> + Send + Sync + 'static,
{
    Arc::new(TestFn {
        name: name.to_string(),
        f,
    })
}

pub fn add_fn() -> Arc<dyn UserFn> {
    test_fn("add", |args| {
        let a = args.first().and_then(Value::as_i64).unwrap_or(0);
        let b = args.get(1).and_then(Value::as_i64).unwrap_or(0);
        Ok(Value::from(a + b))
    })
}

pub fn failing_fn() -> Arc<dyn UserFn> {
    test_fn("explode", |_args| Err("boom".to_string().into()))
}

pub fn multiply_fn() -> Arc<dyn UserFn> {
    test_fn("multiply", |args| {
        let a = args.first().and_then(Value::as_i64).unwrap_or(0);
        let b = args.get(1).and_then(Value::as_i64).unwrap_or(0);
        Ok(Value::from(a * b))
    })
}

/// Builds an in-memory directory tree:
///
/// ```text
/// /api
///   math.mjs      (named: add, multiply)
///   greet/
///     greet.mjs   (default: fn greet(name))
/// ```
pub fn math_and_greet_system() -> InMemoryModuleSystem {
    let mut system = InMemoryModuleSystem::new();
    system.add_directory(
        "/api",
        vec![PathBuf::from("/api/math.mjs"), PathBuf::from("/api/greet")],
    );
    system.add_directory("/api/greet", vec![PathBuf::from("/api/greet/greet.mjs")]);

    let mut math_named = std::collections::BTreeMap::new();
    math_named.insert("add".to_string(), ExportValue::Function(add_fn()));
    math_named.insert("multiply".to_string(), ExportValue::Function(multiply_fn()));
    math_named.insert("explode".to_string(), ExportValue::Function(failing_fn()));
    system.add_module(
        "/api/math.mjs",
        RawExports {
            default: None,
            named: math_named,
            marked_as_callable_default: false,
        },
    );

    let greet = test_fn("greet", |args| {
        let name = args.first().and_then(Value::as_str).unwrap_or("world");
        Ok(Value::from(format!("hello, {name}")))
    });
    system.add_module(
        "/api/greet/greet.mjs",
        RawExports {
            default: Some(ExportValue::Function(greet)),
            named: std::collections::BTreeMap::new(),
            marked_as_callable_default: false,
        },
    );

    system
}
