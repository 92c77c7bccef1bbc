//! `ContextRuntime`: the self/context/reference bindings every instance
//! installs once at build time, plus the `run`/`scope` overlay mechanics.
//!
//! Two implementations, selected by `InstanceConfig.runtime` and resolved
//! once at `Instance::build`:
//!
//! - [`AsyncLocalRuntime`] backs overlays with `tokio::task_local!` so
//!   context is carried automatically across `.await` points, timers, and
//!   spawned tasks produced inside the wrapped call.
//! - [`LiveBindingRuntime`] keeps a shared, mutable "current" cell and
//!   relies on [`ContextRuntime::wrap`] to re-install the right snapshot
//!   around any captured callback, since live-binding carries nothing for
//!   free across an `.await`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::BoxError;
use crate::tree::UserFn;

pub type InstanceId = uuid::Uuid;
pub type ContextMap = serde_json::Map<String, Value>;
pub type ApiPath = String;
pub type Leaf = Arc<dyn UserFn>;

/// The fixed self/context/reference bindings installed for one instance at
/// build time. `self_value` and `reference` are immutable for the
/// instance's lifetime; `context` is the base layer every `run`/`scope`
/// overlay is merged on top of.
#[derive(Clone, Default)]
pub struct SelfContextReference {
    pub self_value: Value,
    pub context: ContextMap,
    pub reference: Value,
}

/// Per-instance context propagation strategy. The core never merges
/// overlays itself outside of this trait — `instance::scope` only ever
/// calls `run`.
pub trait ContextRuntime: Send + Sync {
    fn install(&self, instance: InstanceId, bindings: SelfContextReference);

    /// Runs `thunk` with `overlay` merged on top of whatever context is
    /// current when `run` is called. Nested `run` calls inherit and
    /// overlay further; two overlapping calls never observe each other's
    /// overlay.
    fn run<'a>(&'a self, overlay: ContextMap, thunk: BoxFuture<'a, Value>) -> BoxFuture<'a, Value>;

    /// Wraps a leaf so that invoking it later observes the context that
    /// was current at wrap time, even if the runtime's propagation
    /// mechanism would otherwise lose it (always a no-op for
    /// [`AsyncLocalRuntime`]; load-bearing for [`LiveBindingRuntime`]).
    fn wrap(&self, path: ApiPath, target: Leaf) -> Leaf;

    fn current(&self) -> ContextMap;

    fn bindings(&self, instance: InstanceId) -> Option<SelfContextReference>;
}

tokio::task_local! {
    static CURRENT_CONTEXT: ContextMap;
}

/// `tokio::task_local!`-backed runtime. The default — matches "two
/// overlapping calls see independent contexts; nested `run()` inherits and
/// overlays" for free, the same way request-scoped state is usually
/// threaded through an async call tree.
#[derive(Default)]
pub struct AsyncLocalRuntime {
    bindings: RwLock<HashMap<InstanceId, SelfContextReference>>,
}

impl AsyncLocalRuntime {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ContextRuntime for AsyncLocalRuntime {
    fn install(&self, instance: InstanceId, bindings: SelfContextReference) {
        self.bindings.write().unwrap().insert(instance, bindings);
    }

    fn run<'a>(&'a self, overlay: ContextMap, thunk: BoxFuture<'a, Value>) -> BoxFuture<'a, Value> {
        Box::pin(async move {
            let mut merged = CURRENT_CONTEXT
                .try_with(|c| c.clone())
                .unwrap_or_default();
            for (k, v) in overlay {
                merged.insert(k, v);
            }
            CURRENT_CONTEXT.scope(merged, thunk).await
        })
    }

    fn wrap(&self, _path: ApiPath, target: Leaf) -> Leaf {
        target
    }

    fn current(&self) -> ContextMap {
        CURRENT_CONTEXT.try_with(|c| c.clone()).unwrap_or_default()
    }

    fn bindings(&self, instance: InstanceId) -> Option<SelfContextReference> {
        self.bindings.read().unwrap().get(&instance).cloned()
    }
}

/// Shared mutable "current" cell, mutated around `run` and restored
/// afterward. Simpler to reason about than task-locals but does not
/// survive a captured callback outbound of the `run` call that installed
/// it — `wrap` exists specifically to patch that gap.
#[derive(Default)]
pub struct LiveBindingRuntime {
    current: Arc<RwLock<ContextMap>>,
    bindings: RwLock<HashMap<InstanceId, SelfContextReference>>,
}

impl LiveBindingRuntime {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ContextRuntime for LiveBindingRuntime {
    fn install(&self, instance: InstanceId, bindings: SelfContextReference) {
        self.bindings.write().unwrap().insert(instance, bindings);
    }

    fn run<'a>(&'a self, overlay: ContextMap, thunk: BoxFuture<'a, Value>) -> BoxFuture<'a, Value> {
        Box::pin(async move {
            let previous = self.current.read().unwrap().clone();
            let mut merged = previous.clone();
            for (k, v) in overlay {
                merged.insert(k, v);
            }
            *self.current.write().unwrap() = merged;
            let result = thunk.await;
            *self.current.write().unwrap() = previous;
            result
        })
    }

    fn wrap(&self, _path: ApiPath, target: Leaf) -> Leaf {
        Arc::new(LiveBoundLeaf {
            inner: target,
            snapshot: self.current.read().unwrap().clone(),
            current: self.current.clone(),
        })
    }

    fn current(&self) -> ContextMap {
        self.current.read().unwrap().clone()
    }

    fn bindings(&self, instance: InstanceId) -> Option<SelfContextReference> {
        self.bindings.read().unwrap().get(&instance).cloned()
    }
}

struct LiveBoundFn {
    inner: Leaf,
    snapshot: ContextMap,
    current: Arc<RwLock<ContextMap>>,
}

#[async_trait]
impl UserFn for LiveBoundFn {
    async fn call(&self, args: Vec<Value>) -> std::result::Result<Value, BoxError> {
        let previous = self.current.read().unwrap().clone();
        *self.current.write().unwrap() = self.snapshot.clone();
        let result = self.inner.call(args).await;
        *self.current.write().unwrap() = previous;
        result
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn arity(&self) -> Option<usize> {
        self.inner.arity()
    }
}

#[allow(dead_code)]
type LiveBoundLeaf = LiveBoundFn;
