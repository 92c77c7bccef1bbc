//! `HookManager`: the before/after/always/error interception pipeline
//! wrapped around every user-callable leaf.
//!
//! Registration is by `(type, pattern, priority)`; dispatch order is a
//! stable sort by `(-priority, insertion_index)`, matching
//! `pcb_zen_core::passes::SuppressPass`'s hierarchical pattern matching for
//! the pattern semantics (`"electrical"` matches `"electrical.voltage_mismatch"`)
//! translated here into dotted-path globs via `globset`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use async_trait::async_trait;
use globset::{GlobBuilder, GlobMatcher};
use serde_json::Value;

use crate::context::ContextMap;
use crate::error::{ApiLoomError, BoxError, Result};
use crate::tree::{is_reserved_key, UserFn};

pub type HookId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookType {
    Before,
    After,
    Always,
    Error,
}

/// What a `before` hook decided. `Continue` leaves args untouched;
/// `RewriteArgs` replaces them for the remaining chain and the eventual
/// function body; `ShortCircuit` skips the body and `after` chain
/// entirely, forwarding its value straight to `always`.
#[derive(Debug, Clone)]
pub enum BeforeOutcome {
    Continue,
    RewriteArgs(Vec<Value>),
    ShortCircuit(Value),
}

/// Which pipeline stage an error originated in, carried to `error` hooks
/// alongside the failing hook's id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Before,
    Function,
    After,
    Always,
}

#[derive(Debug, Clone)]
pub struct ErrorSource {
    pub stage: Stage,
    pub hook_id: Option<HookId>,
    pub timestamp: SystemTime,
}

#[async_trait]
pub trait BeforeHook: Send + Sync {
    async fn call(
        &self,
        path: &str,
        args: &[Value],
        context: &ContextMap,
    ) -> std::result::Result<BeforeOutcome, BoxError>;
}

#[async_trait]
pub trait AfterHook: Send + Sync {
    async fn call(
        &self,
        path: &str,
        result: &Value,
        context: &ContextMap,
    ) -> std::result::Result<Option<Value>, BoxError>;
}

#[async_trait]
pub trait AlwaysHook: Send + Sync {
    async fn call(&self, path: &str, result: &Value, context: &ContextMap);
}

#[async_trait]
pub trait ErrorHook: Send + Sync {
    async fn call(
        &self,
        path: &str,
        error: &ApiLoomError,
        source: &ErrorSource,
        context: &ContextMap,
    );
}

enum HookBody {
    Before(Arc<dyn BeforeHook>),
    After(Arc<dyn AfterHook>),
    Always(Arc<dyn AlwaysHook>),
    Error(Arc<dyn ErrorHook>),
}

struct RegisteredHook {
    id: HookId,
    hook_type: HookType,
    pattern: String,
    matcher: GlobMatcher,
    priority: i32,
    insertion: u64,
    body: HookBody,
}

/// Translates a dotted API path pattern (`*` = one segment, `**` = any
/// depth) into a `globset` matcher over `/`-joined paths, since `globset`
/// already understands `**` natively once segments are slash-separated.
/// `literal_separator(true)` is required for that split to mean anything —
/// globset's default lets `*` cross `/`, which would make `math.*` match
/// `math.sub.deep` the same as `math.**`.
fn compile_pattern(pattern: &str) -> Result<GlobMatcher> {
    let translated = pattern.replace('.', "/");
    GlobBuilder::new(&translated)
        .literal_separator(true)
        .build()
        .map(|g| g.compile_matcher())
        .map_err(|e| ApiLoomError::argument(format!("invalid hook pattern `{pattern}`: {e}")))
}

fn path_to_glob_subject(path: &str) -> String {
    path.replace('.', "/")
}

/// Options passed to [`HookManager::on`]: `on(type, handler, { id,
/// pattern, priority })`.
pub struct HookOptions {
    pub id: Option<HookId>,
    pub pattern: String,
    pub priority: i32,
}

impl Default for HookOptions {
    fn default() -> Self {
        HookOptions {
            id: None,
            pattern: "**".to_string(),
            priority: 0,
        }
    }
}

/// A dotted path's first segment is a reserved management key.
/// `tree::is_reserved_key` is the single source of truth; this is the only
/// other site that consults it, never an independent list.
fn path_is_reserved(path: &str) -> bool {
    let first_segment = path.split('.').next().unwrap_or(path);
    is_reserved_key(first_segment)
}

/// Registry of hooks by type, pattern, and priority, plus the dispatch
/// pipeline every wrapped leaf routes through. One instance per
/// `instance::Instance`; `enabled`/`suppress_errors` mirror
/// `InstanceConfig.hooks`.
pub struct HookManager {
    hooks: RwLock<Vec<RegisteredHook>>,
    next_insertion: AtomicU64,
    next_anon_id: AtomicU64,
    enabled: AtomicBool,
    suppress_errors: bool,
}

impl HookManager {
    pub fn new(suppress_errors: bool) -> Self {
        HookManager {
            hooks: RwLock::new(Vec::new()),
            next_insertion: AtomicU64::new(0),
            next_anon_id: AtomicU64::new(0),
            enabled: AtomicBool::new(true),
            suppress_errors,
        }
    }

    fn alloc_id(&self) -> HookId {
        format!("hook-{}", self.next_anon_id.fetch_add(1, Ordering::SeqCst))
    }

    fn register(&self, hook_type: HookType, opts: HookOptions, body: HookBody) -> Result<HookId> {
        let matcher = compile_pattern(&opts.pattern)?;
        let id = opts.id.unwrap_or_else(|| self.alloc_id());
        let insertion = self.next_insertion.fetch_add(1, Ordering::SeqCst);
        self.hooks.write().unwrap().push(RegisteredHook {
            id: id.clone(),
            hook_type,
            pattern: opts.pattern,
            matcher,
            priority: opts.priority,
            insertion,
            body,
        });
        Ok(id)
    }

    pub fn on_before(&self, handler: Arc<dyn BeforeHook>, opts: HookOptions) -> Result<HookId> {
        self.register(HookType::Before, opts, HookBody::Before(handler))
    }

    pub fn on_after(&self, handler: Arc<dyn AfterHook>, opts: HookOptions) -> Result<HookId> {
        self.register(HookType::After, opts, HookBody::After(handler))
    }

    pub fn on_always(&self, handler: Arc<dyn AlwaysHook>, opts: HookOptions) -> Result<HookId> {
        self.register(HookType::Always, opts, HookBody::Always(handler))
    }

    pub fn on_error(&self, handler: Arc<dyn ErrorHook>, opts: HookOptions) -> Result<HookId> {
        self.register(HookType::Error, opts, HookBody::Error(handler))
    }

    pub fn off(&self, id: &str) {
        self.hooks.write().unwrap().retain(|h| h.id != id);
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn clear(&self, hook_type: Option<HookType>) {
        let mut hooks = self.hooks.write().unwrap();
        match hook_type {
            Some(t) => hooks.retain(|h| h.hook_type != t),
            None => hooks.clear(),
        }
    }

    pub fn list(&self, hook_type: Option<HookType>) -> Vec<(HookId, String, i32)> {
        let hooks = self.hooks.read().unwrap();
        hooks
            .iter()
            .filter(|h| hook_type.map(|t| t == h.hook_type).unwrap_or(true))
            .map(|h| (h.id.clone(), h.pattern.clone(), h.priority))
            .collect()
    }

    /// Hooks of one type matching `path`, ordered by descending priority
    /// then ascending insertion order.
    fn matching(&self, hook_type: HookType, path: &str) -> Vec<MatchedHook> {
        let subject = path_to_glob_subject(path);
        let hooks = self.hooks.read().unwrap();
        let mut matched: Vec<MatchedHook> = hooks
            .iter()
            .filter(|h| h.hook_type == hook_type && h.matcher.is_match(&subject))
            .map(|h| MatchedHook {
                id: h.id.clone(),
                priority: h.priority,
                insertion: h.insertion,
                body: clone_body(&h.body),
            })
            .collect();
        matched.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.insertion.cmp(&b.insertion)));
        matched
    }

    /// Runs the full `before* -> (body | short-circuit) -> after* ->
    /// always*` pipeline around `body`, with `error*` inserted at the point
    /// of failure. Returns `Ok(Value::Null)` instead of propagating when a
    /// stage fails and `suppressErrors` is set.
    pub async fn dispatch(
        &self,
        path: &str,
        args: Vec<Value>,
        context: &ContextMap,
        body: &dyn UserFn,
    ) -> Result<Value> {
        if !self.is_enabled() || path_is_reserved(path) {
            return body
                .call(args)
                .await
                .map_err(|e| ApiLoomError::Hook {
                    path: path.to_string(),
                    hook_id: "<body>".to_string(),
                    source: e,
                });
        }

        match self.dispatch_inner(path, args, context, body).await {
            Ok(value) => Ok(value),
            Err(err) => {
                if self.suppress_errors {
                    Ok(Value::Null)
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn dispatch_inner(
        &self,
        path: &str,
        args: Vec<Value>,
        context: &ContextMap,
        body: &dyn UserFn,
    ) -> Result<Value> {
        let mut current_args = args;
        let mut short_circuit: Option<Value> = None;

        for hook in self.matching(HookType::Before, path) {
            let HookBody::Before(handler) = &hook.body else {
                unreachable!("matching(Before) only yields Before bodies")
            };
            match handler.call(path, &current_args, context).await {
                Ok(BeforeOutcome::Continue) => {}
                Ok(BeforeOutcome::RewriteArgs(new_args)) => current_args = new_args,
                Ok(BeforeOutcome::ShortCircuit(value)) => {
                    short_circuit = Some(value);
                    break;
                }
                Err(source) => {
                    let api_err = ApiLoomError::Hook {
                        path: path.to_string(),
                        hook_id: hook.id.clone(),
                        source,
                    };
                    self.run_error_hooks(path, &api_err, Stage::Before, Some(hook.id), context)
                        .await;
                    return Err(api_err);
                }
            }
        }

        let mut result = match short_circuit {
            Some(value) => value,
            None => match body.call(current_args).await {
                Ok(value) => value,
                Err(source) => {
                    let api_err = ApiLoomError::Hook {
                        path: path.to_string(),
                        hook_id: "<body>".to_string(),
                        source,
                    };
                    self.run_error_hooks(path, &api_err, Stage::Function, None, context)
                        .await;
                    return Err(api_err);
                }
            },
        };

        if short_circuit.is_none() {
            for hook in self.matching(HookType::After, path) {
                let HookBody::After(handler) = &hook.body else {
                    unreachable!("matching(After) only yields After bodies")
                };
                match handler.call(path, &result, context).await {
                    Ok(Some(new_result)) => result = new_result,
                    Ok(None) => {}
                    Err(source) => {
                        let api_err = ApiLoomError::Hook {
                            path: path.to_string(),
                            hook_id: hook.id.clone(),
                            source,
                        };
                        self.run_error_hooks(path, &api_err, Stage::After, Some(hook.id), context)
                            .await;
                        return Err(api_err);
                    }
                }
            }
        }

        // `always` runs unconditionally; its own failures are delivered to
        // `error` hooks but never escape to the caller. The prior `result`
        // stands.
        for hook in self.matching(HookType::Always, path) {
            let HookBody::Always(handler) = &hook.body else {
                unreachable!("matching(Always) only yields Always bodies")
            };
            handler.call(path, &result, context).await;
        }

        Ok(result)
    }

    async fn run_error_hooks(
        &self,
        path: &str,
        error: &ApiLoomError,
        stage: Stage,
        hook_id: Option<HookId>,
        context: &ContextMap,
    ) {
        let source = ErrorSource {
            stage,
            hook_id,
            timestamp: SystemTime::now(),
        };
        for hook in self.matching(HookType::Error, path) {
            let HookBody::Error(handler) = &hook.body else {
                unreachable!("matching(Error) only yields Error bodies")
            };
            handler.call(path, error, &source, context).await;
        }
    }
}

struct MatchedHook {
    id: HookId,
    priority: i32,
    insertion: u64,
    body: HookBody,
}

fn clone_body(body: &HookBody) -> HookBody {
    match body {
        HookBody::Before(h) => HookBody::Before(h.clone()),
        HookBody::After(h) => HookBody::After(h.clone()),
        HookBody::Always(h) => HookBody::Always(h.clone()),
        HookBody::Error(h) => HookBody::Error(h.clone()),
    }
}

/// Wraps `target` so every call routes through `manager`'s pipeline,
/// keeping `.name()`/`.arity()` transparent to dotted navigation (design
/// §3 invariant) and preserving `path` for pattern matching and error
/// reporting.
pub struct HookedFn {
    path: String,
    target: Arc<dyn UserFn>,
    manager: Arc<HookManager>,
    context: ContextMap,
}

impl HookedFn {
    pub fn new(
        path: String,
        target: Arc<dyn UserFn>,
        manager: Arc<HookManager>,
        context: ContextMap,
    ) -> Self {
        HookedFn {
            path,
            target,
            manager,
            context,
        }
    }
}

#[async_trait]
impl UserFn for HookedFn {
    async fn call(&self, args: Vec<Value>) -> std::result::Result<Value, BoxError> {
        self.manager
            .dispatch(&self.path, args, &self.context, self.target.as_ref())
            .await
            .map_err(|e| Box::new(e) as BoxError)
    }

    fn name(&self) -> &str {
        self.target.name()
    }

    fn arity(&self) -> Option<usize> {
        self.target.arity()
    }
}
