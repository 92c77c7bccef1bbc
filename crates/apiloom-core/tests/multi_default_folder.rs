//! Root files with a default (rule 7, "first one wins, the rest attach as
//! siblings") and a subdirectory whose files carry more than one callable
//! default (rule 1/2's multi-default-folder protocol) exercised end to end
//! through a built instance rather than `ShapeRules` directly.

mod common;

use std::path::PathBuf;
use std::sync::Arc;

use apiloom_core::{BoundApi, ExportValue, InMemoryModuleSystem, InstanceConfig, RawExports};
use serde_json::Value;

use common::test_fn;

/// ```text
/// /api
///   greet.mjs   (default: fn greet(name))
///   farewell.mjs (default: fn farewell(name))
/// ```
///
/// Two root files each export a callable default. Rule 7 makes the first
/// one (lexicographic file-stem order: `farewell` before `greet`) the root
/// callable; the other attaches as a sibling instead of overwriting it.
fn two_root_defaults_system() -> InMemoryModuleSystem {
    let mut system = InMemoryModuleSystem::new();
    system.add_directory(
        "/api",
        vec![PathBuf::from("/api/farewell.mjs"), PathBuf::from("/api/greet.mjs")],
    );

    let greet = test_fn("greet", |args| {
        let name = args.first().and_then(Value::as_str).unwrap_or("world");
        Ok(Value::from(format!("hello, {name}")))
    });
    system.add_module(
        "/api/greet.mjs",
        RawExports {
            default: Some(ExportValue::Function(greet)),
            named: std::collections::BTreeMap::new(),
            marked_as_callable_default: false,
        },
    );

    let farewell = test_fn("farewell", |args| {
        let name = args.first().and_then(Value::as_str).unwrap_or("world");
        Ok(Value::from(format!("bye, {name}")))
    });
    system.add_module(
        "/api/farewell.mjs",
        RawExports {
            default: Some(ExportValue::Function(farewell)),
            named: std::collections::BTreeMap::new(),
            marked_as_callable_default: false,
        },
    );

    system
}

#[tokio::test]
async fn first_root_default_by_file_stem_order_becomes_root_callable() {
    let system = Arc::new(two_root_defaults_system());
    let config = InstanceConfig::new(PathBuf::from("/api"));
    let api = BoundApi::build(config, system.clone(), system).await.unwrap();

    assert!(api.is_callable());
    let reply = api.call("", vec![Value::from("ada")]).await.unwrap();
    assert_eq!(reply, Value::from("bye, ada"));

    // The later root default is not lost — it attaches as a sibling key.
    let reply = api.call("greet", vec![Value::from("lin")]).await.unwrap();
    assert_eq!(reply, Value::from("hello, lin"));
}

/// ```text
/// /api
///   shapes/
///     circle.mjs  (default: fn circle(r))
///     square.mjs  (default: fn square(s))
/// ```
///
/// Two distinct, non-self-referential function defaults inside the same
/// subdirectory trip `has_multiple_callable_defaults`: each file's default
/// becomes a property keyed by its own `apiKey` (rule 2) instead of either
/// one silently becoming the folder callable.
fn multi_callable_default_folder_system() -> InMemoryModuleSystem {
    let mut system = InMemoryModuleSystem::new();
    system.add_directory(
        "/api",
        vec![PathBuf::from("/api/shapes")],
    );
    system.add_directory(
        "/api/shapes",
        vec![
            PathBuf::from("/api/shapes/circle.mjs"),
            PathBuf::from("/api/shapes/square.mjs"),
        ],
    );

    let circle = test_fn("circle", |args| {
        let r = args.first().and_then(Value::as_i64).unwrap_or(0);
        Ok(Value::from(r * r * 3))
    });
    system.add_module(
        "/api/shapes/circle.mjs",
        RawExports {
            default: Some(ExportValue::Function(circle)),
            named: std::collections::BTreeMap::new(),
            marked_as_callable_default: false,
        },
    );

    let square = test_fn("square", |args| {
        let s = args.first().and_then(Value::as_i64).unwrap_or(0);
        Ok(Value::from(s * s))
    });
    system.add_module(
        "/api/shapes/square.mjs",
        RawExports {
            default: Some(ExportValue::Function(square)),
            named: std::collections::BTreeMap::new(),
            marked_as_callable_default: false,
        },
    );

    system
}

#[tokio::test]
async fn multiple_callable_defaults_in_one_folder_each_attach_as_their_own_property() {
    let system = Arc::new(multi_callable_default_folder_system());
    let config = InstanceConfig::new(PathBuf::from("/api"));
    let api = BoundApi::build(config, system.clone(), system).await.unwrap();

    // Neither default silently became `shapes` itself — both survive as
    // distinct, independently callable properties.
    let area = api.call("shapes.circle", vec![Value::from(2)]).await.unwrap();
    assert_eq!(area, Value::from(12));
    let area = api.call("shapes.square", vec![Value::from(3)]).await.unwrap();
    assert_eq!(area, Value::from(9));

    let err = api.call("shapes", vec![]).await.unwrap_err();
    assert_eq!(err.kind(), apiloom_core::ErrorKind::ArgumentError);
}
