//! `InstanceAssembler` / `AddApi` / `ScopeApi` / `Shutdown`.
//!
//! `Instance` owns an instance's mutable state; `BoundApi` is the public
//! façade callers hold, mutated in place while preserving its own identity
//! across re-binds — here that means the tree lives behind a
//! `tokio::sync::RwLock` inside an `Arc`, cloned cheaply by every
//! `BoundApi` handle rather than copied.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::build::{EagerBuilder, LazyBuilder};
use crate::context::{
    AsyncLocalRuntime, ContextMap, ContextRuntime, InstanceId, LiveBindingRuntime,
    SelfContextReference,
};
use crate::error::{ApiLoomError, Result};
use crate::hooks::HookManager;
use crate::module::{DirectoryProvider, ModuleLoader};
use crate::sanitize::{DefaultSanitizer, SanitizeRules, Sanitizer};
use crate::shape::Mode;
use crate::tree::{is_reserved_key, ApiNode, ObjectNode};

/// `runtime: "async"|"live"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    Async,
    Live,
}

impl Default for RuntimeKind {
    fn default() -> Self {
        RuntimeKind::Async
    }
}

/// `apiShape: "auto"|"function"|"object"` — forces callable vs. object root
/// instead of inferring it from whether the root claimed a callable
/// identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApiShape {
    #[default]
    Auto,
    Function,
    Object,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    Shallow,
    Deep,
}

impl Default for MergeStrategy {
    fn default() -> Self {
        MergeStrategy::Shallow
    }
}

/// `scope: false | { merge: "shallow"|"deep" }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeConfig {
    pub enabled: bool,
    pub merge: MergeStrategy,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        ScopeConfig {
            enabled: true,
            merge: MergeStrategy::Shallow,
        }
    }
}

/// `hooks: bool | string | { enabled, pattern, suppressErrors }`. The
/// three-shape union is flattened here; `InstanceConfig` builder methods
/// (`with_hooks_disabled`, `with_hooks_pattern`, …) cover the shorthand
/// forms an embedder would otherwise spell as a bare bool or string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HooksConfig {
    pub enabled: bool,
    pub pattern: String,
    pub suppress_errors: bool,
}

impl Default for HooksConfig {
    fn default() -> Self {
        HooksConfig {
            enabled: true,
            pattern: "**".to_string(),
            suppress_errors: false,
        }
    }
}

/// Configuration for one instance.
/// `context`/`reference` hold live `ExportValue`/`Value` data supplied by
/// the embedder rather than loaded from a config file, so they are not
/// part of the serializable surface — everything else round-trips through
/// `toml`/`json`, matching `pcb_zen_core::config::PcbToml`.
/// Scalar fields are declared before the nested-struct ones (`sanitize`,
/// `hooks`, `scope`): the `toml` crate's serializer requires every
/// non-table value in a struct to precede its table values, since a table
/// header in the emitted document closes off plain `key = value` lines for
/// the parent table.
#[derive(Clone, Serialize, Deserialize)]
pub struct InstanceConfig {
    pub dir: PathBuf,
    pub mode: Mode,
    pub api_depth: Option<u32>,
    pub runtime: RuntimeKind,
    pub api_shape: ApiShape,
    pub allow_api_overwrite: bool,
    pub debug: bool,
    #[serde(skip, default)]
    pub context: ContextMap,
    #[serde(skip, default)]
    pub reference: ObjectNode,
    pub sanitize: SanitizeRules,
    pub hooks: HooksConfig,
    pub scope: ScopeConfig,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        InstanceConfig {
            dir: PathBuf::from("api"),
            mode: Mode::Eager,
            api_depth: None,
            runtime: RuntimeKind::default(),
            api_shape: ApiShape::default(),
            context: ContextMap::new(),
            reference: ObjectNode::default(),
            sanitize: SanitizeRules::default(),
            allow_api_overwrite: true,
            hooks: HooksConfig::default(),
            scope: ScopeConfig::default(),
            debug: false,
        }
    }
}

impl InstanceConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        InstanceConfig {
            dir: dir.into(),
            ..Default::default()
        }
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_api_depth(mut self, depth: u32) -> Self {
        self.api_depth = Some(depth);
        self
    }

    pub fn with_runtime(mut self, runtime: RuntimeKind) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn with_api_shape(mut self, shape: ApiShape) -> Self {
        self.api_shape = shape;
        self
    }

    pub fn with_context(mut self, context: ContextMap) -> Self {
        self.context = context;
        self
    }

    pub fn with_reference(mut self, reference: ObjectNode) -> Self {
        self.reference = reference;
        self
    }

    pub fn with_allow_api_overwrite(mut self, allow: bool) -> Self {
        self.allow_api_overwrite = allow;
        self
    }

    pub fn with_hooks(mut self, hooks: HooksConfig) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_scope(mut self, scope: ScopeConfig) -> Self {
        self.scope = scope;
        self
    }

    fn validate(&self) -> Result<()> {
        if matches!(self.api_depth, Some(0)) {
            return Err(ApiLoomError::argument("apiDepth must be at least 1"));
        }
        Ok(())
    }

    /// Loads everything but `context`/`reference` from a TOML document —
    /// the `dir`, `mode`, `apiDepth`, `runtime`, `sanitize`, `hooks`, `scope`
    /// fields an embedder would otherwise wire up by hand. Mirrors the
    /// `PcbToml`/`WorkspaceConfig` round-trip `pcb_zen_core::config` does
    /// for its own `toml`-backed configuration.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw)
            .map_err(|e| ApiLoomError::argument(format!("invalid apiloom config: {e}")))
    }

    /// The inverse of [`InstanceConfig::from_toml_str`], useful for an
    /// embedder persisting a config it built programmatically. `context`/
    /// `reference` are `#[serde(skip)]` and never round-trip through TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ApiLoomError::argument(format!("failed to serialize config: {e}")))
    }
}

/// Options accepted by [`Instance::add_api`] / [`BoundApi::add_api`].
#[derive(Debug, Clone, Default)]
pub struct AddApiOptions {
    pub allow_api_overwrite: Option<bool>,
}

struct ShutdownState {
    in_progress: AtomicBool,
    done: AtomicBool,
    notify: tokio::sync::Notify,
}

impl Default for ShutdownState {
    fn default() -> Self {
        ShutdownState {
            in_progress: AtomicBool::new(false),
            done: AtomicBool::new(false),
            notify: tokio::sync::Notify::new(),
        }
    }
}

/// The instance's mutable state. Never exposed directly — callers hold a
/// [`BoundApi`], which is a thin, cloneable handle onto an `Arc<Instance>`.
pub struct Instance {
    id: InstanceId,
    config: InstanceConfig,
    directory_provider: Arc<dyn DirectoryProvider>,
    module_loader: Arc<dyn ModuleLoader>,
    sanitizer: Arc<dyn Sanitizer>,
    api: tokio::sync::RwLock<ApiNode>,
    api_shape_is_callable: bool,
    hook_manager: Arc<HookManager>,
    runtime: Box<dyn ContextRuntime>,
    shutdown_state: ShutdownState,
    addapi_inflight: StdMutex<HashSet<String>>,
}

fn overlapping_paths(a: &str, b: &str) -> bool {
    a == b || a.starts_with(&format!("{b}.")) || b.starts_with(&format!("{a}."))
}

/// Shallow, overlay-wins merge: `{...parent, ...overlay}`.
fn shallow_merge(base: &ContextMap, overlay: &ContextMap) -> ContextMap {
    let mut merged = base.clone();
    for (k, v) in overlay {
        merged.insert(k.clone(), v.clone());
    }
    merged
}

/// Recursive merge: overlay leaves win, nested objects merge.
fn deep_merge_value(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            let mut merged = base_map.clone();
            for (k, v) in overlay_map {
                let merged_value = match merged.get(k) {
                    Some(existing) => deep_merge_value(existing, v),
                    None => v.clone(),
                };
                merged.insert(k.clone(), merged_value);
            }
            Value::Object(merged)
        }
        (_, overlay_value) => overlay_value.clone(),
    }
}

fn deep_merge(base: &ContextMap, overlay: &ContextMap) -> ContextMap {
    match deep_merge_value(&Value::Object(base.clone()), &Value::Object(overlay.clone())) {
        Value::Object(merged) => merged,
        _ => unreachable!("merging two objects always yields an object"),
    }
}

impl Instance {
    /// Validates config, builds the raw tree, merges in `reference`,
    /// resolves the runtime and hook manager, and returns the bound handle.
    pub async fn build(
        config: InstanceConfig,
        directory_provider: Arc<dyn DirectoryProvider>,
        module_loader: Arc<dyn ModuleLoader>,
    ) -> Result<BoundApi> {
        config.validate()?;
        let sanitizer: Arc<dyn Sanitizer> =
            Arc::new(DefaultSanitizer::new(config.sanitize.clone()));

        let root = directory_provider
            .canonicalize(&config.dir)
            .unwrap_or_else(|_| config.dir.clone());

        tracing::info!(dir = %root.display(), mode = ?config.mode, "building api instance");

        let mut raw_api = match config.mode {
            Mode::Eager => {
                let builder = EagerBuilder::new(
                    directory_provider.as_ref(),
                    module_loader.as_ref(),
                    sanitizer.as_ref(),
                    config.api_depth,
                    config.allow_api_overwrite,
                );
                builder.build(&root).await?
            }
            Mode::Lazy => {
                let builder = LazyBuilder::new(
                    directory_provider.as_ref(),
                    module_loader.as_ref(),
                    sanitizer.as_ref(),
                    config.api_depth,
                    config.allow_api_overwrite,
                );
                builder.build(&root).await?
            }
        };

        // Merge `reference` into the root, shallow, no-clobber —
        // its own keys become API keys without overwriting loaded modules.
        if let Some(obj) = raw_api.as_object_mut() {
            for (k, v) in &config.reference.children {
                if is_reserved_key(k) {
                    return Err(ApiLoomError::shape_conflict(
                        k,
                        "`reference` key collides with a reserved lifecycle key",
                    ));
                }
                if !obj.children.contains_key(k) {
                    obj.insert(k.clone(), v.clone());
                }
            }
        }

        let api_shape_is_callable = match config.api_shape {
            ApiShape::Function => true,
            ApiShape::Object => false,
            ApiShape::Auto => raw_api.is_callable(),
        };

        let runtime: Box<dyn ContextRuntime> = match config.runtime {
            RuntimeKind::Async => Box::new(AsyncLocalRuntime::new()),
            RuntimeKind::Live => Box::new(LiveBindingRuntime::new()),
        };

        let instance_id = InstanceId::new_v4();
        runtime.install(
            instance_id,
            SelfContextReference {
                self_value: Value::Null,
                context: config.context.clone(),
                reference: Value::Object(serde_json::Map::new()),
            },
        );

        let hook_manager = Arc::new(HookManager::new(config.hooks.suppress_errors));
        if !config.hooks.enabled {
            hook_manager.disable();
        }

        let instance = Arc::new(Instance {
            id: instance_id,
            config,
            directory_provider,
            module_loader,
            sanitizer,
            api: tokio::sync::RwLock::new(raw_api),
            api_shape_is_callable,
            hook_manager,
            runtime,
            shutdown_state: ShutdownState::default(),
            addapi_inflight: StdMutex::new(HashSet::new()),
        });

        Ok(BoundApi { instance })
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    fn base_context(&self) -> ContextMap {
        self.runtime
            .bindings(self.id)
            .map(|b| b.context)
            .unwrap_or_default()
    }

    /// The context a plain (non-overlaid) call observes: the instance's
    /// base context with whatever `run`/`scope` overlay is currently
    /// ambient layered on top.
    fn effective_context(&self) -> ContextMap {
        let base = self.base_context();
        let current = self.runtime.current();
        if current.is_empty() {
            base
        } else {
            shallow_merge(&base, &current)
        }
    }

    fn lazy_builder(&self) -> LazyBuilder<'_> {
        LazyBuilder::new(
            self.directory_provider.as_ref(),
            self.module_loader.as_ref(),
            self.sanitizer.as_ref(),
            self.config.api_depth,
            self.config.allow_api_overwrite,
        )
    }

    async fn materialize_in_place(&self, node: &mut ApiNode) -> Result<()> {
        if let ApiNode::Lazy(proxy) = node {
            let materialized = self.lazy_builder().materialize(&**proxy).await?.clone();
            *node = materialized;
        }
        Ok(())
    }

    /// Resolves a dotted path, materializing any [`crate::tree::LazyProxy`]
    /// encountered along the way. Held under a single write-lock critical
    /// section spanning the materializing `.await`s — legal for a
    /// `tokio::sync::RwLock` and consistent with the single-threaded,
    /// cooperative scheduling model: readers never interleave with a
    /// materialization in flight, and `LazyProxy`'s own `OnceCell` still
    /// gives the at-most-once guarantee if this lock is ever relaxed.
    pub async fn get(&self, path: &str) -> Result<ApiNode> {
        let mut guard = self.api.write().await;
        if path.is_empty() {
            return Ok(guard.clone());
        }
        let mut current = &mut *guard;
        for segment in path.split('.') {
            self.materialize_in_place(current).await?;
            let obj = current.as_object_mut().ok_or_else(|| {
                ApiLoomError::shape_conflict(path, format!("`{segment}` is not a container"))
            })?;
            current = obj
                .children
                .get_mut(segment)
                .ok_or_else(|| ApiLoomError::argument(format!("no such path: `{path}`")))?;
        }
        self.materialize_in_place(current).await?;
        Ok(current.clone())
    }

    pub async fn call(&self, path: &str, args: Vec<Value>) -> Result<Value> {
        let node = self.get(path).await?;
        let func = match node {
            ApiNode::Callable(c) => c.func,
            _ => return Err(ApiLoomError::argument(format!("`{path}` is not callable"))),
        };

        let context = self.effective_context();
        let wrapped = self.runtime.wrap(path.to_string(), func);
        self.hook_manager
            .dispatch(path, args, &context, wrapped.as_ref())
            .await
    }

    /// Calls the root itself, when `apiShape` resolved to `function` — the
    /// convenience top-level callable alias.
    pub async fn call_root(&self, args: Vec<Value>) -> Result<Value> {
        if !self.api_shape_is_callable {
            return Err(ApiLoomError::argument(
                "the root api is not callable (apiShape resolved to object)",
            ));
        }
        self.call("", args).await
    }

    pub fn is_callable(&self) -> bool {
        self.api_shape_is_callable
    }

    pub fn hooks(&self) -> Arc<HookManager> {
        self.hook_manager.clone()
    }

    pub fn ctx(&self) -> SelfContextReference {
        self.runtime.bindings(self.id).unwrap_or_default()
    }

    /// Computes the fully merged context up front (per `scope.merge`) and
    /// hands it to the runtime as a self-contained overlay, so the choice
    /// of back-end never needs to know about merge strategy.
    pub async fn run(&self, overlay: Value, thunk: BoxFuture<'_, Value>) -> Result<Value> {
        if !self.config.scope.enabled {
            return Err(ApiLoomError::Runtime(
                "scope is disabled for this instance".to_string(),
            ));
        }
        let overlay_map = match overlay {
            Value::Object(map) => map,
            Value::Null => ContextMap::new(),
            _ => return Err(ApiLoomError::argument("scope overlay must be an object")),
        };

        let current = self.effective_context();
        let merged = match self.config.scope.merge {
            MergeStrategy::Shallow => shallow_merge(&current, &overlay_map),
            MergeStrategy::Deep => deep_merge(&current, &overlay_map),
        };

        Ok(self.runtime.run(merged, thunk).await)
    }

    /// Mounts a new subtree at a dotted path. Serializes overlapping calls
    /// on intersecting dotted paths; non-overlapping calls interleave
    /// freely since the guard is released before the long-running load
    /// begins.
    pub async fn add_api(
        &self,
        dotted_path: &str,
        folder: &Path,
        metadata: Option<Value>,
        opts: AddApiOptions,
    ) -> Result<()> {
        if dotted_path.trim().is_empty() {
            return Err(ApiLoomError::argument("dotted path must not be empty"));
        }
        let segments: Vec<String> = dotted_path
            .split('.')
            .map(|s| self.sanitizer.sanitize(s))
            .collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(ApiLoomError::argument(
                "dotted path must not contain empty segments",
            ));
        }
        if let Some(first) = segments.first() {
            if is_reserved_key(first) {
                return Err(ApiLoomError::argument(format!(
                    "`{first}` is a reserved lifecycle key and cannot be used as an addApi path"
                )));
            }
        }
        if !self.directory_provider.exists(folder) || !self.directory_provider.is_directory(folder)
        {
            return Err(ApiLoomError::loader(
                folder,
                format!("no such folder: {}", folder.display()),
            ));
        }

        let prefix_key = segments.join(".");
        {
            let mut inflight = self.addapi_inflight.lock().unwrap();
            if inflight
                .iter()
                .any(|existing| overlapping_paths(existing, &prefix_key))
            {
                return Err(ApiLoomError::Lifecycle(format!(
                    "addApi is already in flight for an overlapping path: `{prefix_key}`"
                )));
            }
            inflight.insert(prefix_key.clone());
        }

        let allow_overwrite = opts
            .allow_api_overwrite
            .unwrap_or(self.config.allow_api_overwrite);
        let result = self
            .add_api_inner(&segments, folder, allow_overwrite, metadata)
            .await;

        self.addapi_inflight.lock().unwrap().remove(&prefix_key);
        result
    }

    async fn add_api_inner(
        &self,
        segments: &[String],
        folder: &Path,
        allow_overwrite: bool,
        metadata: Option<Value>,
    ) -> Result<()> {
        if let Some(meta) = &metadata {
            tracing::debug!(path = %segments.join("."), ?meta, "addApi: attaching subtree");
        }

        let subtree = match self.config.mode {
            Mode::Eager => {
                let builder = EagerBuilder::new(
                    self.directory_provider.as_ref(),
                    self.module_loader.as_ref(),
                    self.sanitizer.as_ref(),
                    self.config.api_depth,
                    allow_overwrite,
                );
                builder.build(folder).await?
            }
            Mode::Lazy => {
                let builder = LazyBuilder::new(
                    self.directory_provider.as_ref(),
                    self.module_loader.as_ref(),
                    self.sanitizer.as_ref(),
                    self.config.api_depth,
                    allow_overwrite,
                );
                builder.build(folder).await?
            }
        };

        let mut guard = self.api.write().await;
        let mut current = &mut *guard;
        for segment in &segments[..segments.len() - 1] {
            self.materialize_in_place(current).await?;
            let obj = current.as_object_mut().ok_or_else(|| {
                ApiLoomError::shape_conflict(segment, "addApi path runs through a primitive")
            })?;
            obj.children
                .entry(segment.clone())
                .or_insert_with(|| ApiNode::Object(ObjectNode::new()));
            current = obj.children.get_mut(segment).unwrap();
        }

        let last = segments.last().expect("non-empty dotted path");
        self.materialize_in_place(current).await?;
        let obj = current.as_object_mut().ok_or_else(|| {
            ApiLoomError::shape_conflict(last, "addApi path runs through a primitive")
        })?;

        match obj.children.get_mut(last) {
            Some(ApiNode::Object(existing)) if matches!(subtree, ApiNode::Object(_)) => {
                if let ApiNode::Object(new_obj) = subtree {
                    for (k, v) in new_obj.children {
                        if !existing.children.contains_key(&k) || allow_overwrite {
                            existing.insert(k, v);
                        }
                    }
                }
            }
            Some(_) if !allow_overwrite => {
                tracing::warn!(
                    path = %last,
                    "addApi: key already exists and allowApiOverwrite is false, skipping"
                );
            }
            _ => {
                obj.insert(last.clone(), subtree);
            }
        }

        Ok(())
    }

    /// Tears down the instance. Idempotent: a second caller while one
    /// shutdown is in flight awaits its completion and
    /// then returns `Ok(())` without re-running the disposer. Bounds the
    /// user-supplied shutdown future to ~5 seconds before proceeding with
    /// internal disposal regardless.
    pub async fn shutdown(
        &self,
        user_shutdown: Option<BoxFuture<'_, std::result::Result<(), crate::error::BoxError>>>,
    ) -> Result<()> {
        if self.shutdown_state.done.load(Ordering::SeqCst) {
            return Ok(());
        }
        if self.shutdown_state.in_progress.swap(true, Ordering::SeqCst) {
            self.shutdown_state.notify.notified().await;
            return Ok(());
        }

        let user_error = match user_shutdown {
            Some(fut) => match tokio::time::timeout(Duration::from_secs(5), fut).await {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(_) => Some("user-defined shutdown timed out after 5s".to_string()),
            },
            None => None,
        };

        self.hook_manager.disable();
        self.hook_manager.clear(None);

        self.shutdown_state.done.store(true, Ordering::SeqCst);
        self.shutdown_state.in_progress.store(false, Ordering::SeqCst);
        self.shutdown_state.notify.notify_waiters();

        match user_error {
            None => Ok(()),
            Some(msg) => Err(ApiLoomError::Lifecycle(format!(
                "shutdown completed internal disposal but the user-defined shutdown failed: {msg}"
            ))),
        }
    }

    pub async fn describe(&self, show_all: bool) -> Result<DescribeNode> {
        let mut guard = self.api.write().await;
        describe_node(self, &mut guard, show_all).await
    }
}

fn describe_node<'a>(
    instance: &'a Instance,
    node: &'a mut ApiNode,
    show_all: bool,
) -> BoxFuture<'a, Result<DescribeNode>> {
    Box::pin(async move {
        if show_all {
            instance.materialize_in_place(node).await?;
        }
        match node {
            ApiNode::Lazy(proxy) => Ok(DescribeNode::Lazy {
                path: proxy.path.clone(),
            }),
            ApiNode::Value(v) => Ok(DescribeNode::Value { value: v.clone() }),
            ApiNode::Object(obj) => {
                let mut children = BTreeMap::new();
                for (k, child) in obj.children.iter_mut() {
                    children.insert(k.clone(), describe_node(instance, child, show_all).await?);
                }
                Ok(DescribeNode::Object { children })
            }
            ApiNode::Callable(c) => {
                let mut children = BTreeMap::new();
                for (k, child) in c.properties.children.iter_mut() {
                    children.insert(k.clone(), describe_node(instance, child, show_all).await?);
                }
                Ok(DescribeNode::Callable {
                    name: c.func.name().to_string(),
                    children,
                })
            }
        }
    })
}

/// A JSON-serializable projection of the tree, used by `describe()`.
/// `Lazy` only ever appears when `show_all` is false — an unmaterialized
/// slot describes itself by path rather than forcing a load.
///
/// `Value` is a struct variant, not a newtype around a bare
/// `serde_json::Value`, on purpose: `#[serde(tag = "kind")]` internal
/// tagging requires every variant to serialize to a JSON object so the
/// `kind` field can be merged in, and a leaf export can be any JSON type
/// (a number, a string, `null`) that doesn't serialize to one on its own.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind")]
pub enum DescribeNode {
    Object { children: BTreeMap<String, DescribeNode> },
    Callable {
        name: String,
        children: BTreeMap<String, DescribeNode>,
    },
    Value { value: Value },
    Lazy { path: PathBuf },
}

/// The public façade. Cheap to clone (an `Arc` bump) — every clone shares
/// the same underlying [`Instance`], so a `BoundApi` handed to a hook or a
/// user module and the one the caller of `build` holds observe the same
/// live tree — all such references share logical identity, never a
/// recursive clone.
#[derive(Clone)]
pub struct BoundApi {
    instance: Arc<Instance>,
}

impl BoundApi {
    pub async fn build(
        config: InstanceConfig,
        directory_provider: Arc<dyn DirectoryProvider>,
        module_loader: Arc<dyn ModuleLoader>,
    ) -> Result<Self> {
        Instance::build(config, directory_provider, module_loader).await
    }

    pub fn id(&self) -> InstanceId {
        self.instance.id()
    }

    pub fn is_callable(&self) -> bool {
        self.instance.is_callable()
    }

    pub async fn get(&self, path: &str) -> Result<ApiNode> {
        self.instance.get(path).await
    }

    pub async fn call(&self, path: &str, args: Vec<Value>) -> Result<Value> {
        self.instance.call(path, args).await
    }

    pub async fn call_root(&self, args: Vec<Value>) -> Result<Value> {
        self.instance.call_root(args).await
    }

    pub fn hooks(&self) -> Arc<HookManager> {
        self.instance.hooks()
    }

    pub fn ctx(&self) -> SelfContextReference {
        self.instance.ctx()
    }

    pub async fn run(&self, overlay: Value, thunk: BoxFuture<'_, Value>) -> Result<Value> {
        self.instance.run(overlay, thunk).await
    }

    pub async fn add_api(
        &self,
        dotted_path: &str,
        folder: &Path,
        metadata: Option<Value>,
        opts: AddApiOptions,
    ) -> Result<()> {
        self.instance
            .add_api(dotted_path, folder, metadata, opts)
            .await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.instance.shutdown(None).await
    }

    pub async fn shutdown_with(
        &self,
        user_shutdown: BoxFuture<'_, std::result::Result<(), crate::error::BoxError>>,
    ) -> Result<()> {
        self.instance.shutdown(Some(user_shutdown)).await
    }

    pub async fn describe(&self, show_all: bool) -> Result<DescribeNode> {
        self.instance.describe(show_all).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn shallow_merge_overlay_replaces_whole_values() {
        let mut base = ContextMap::new();
        base.insert("timeout".to_string(), Value::from(5000));
        base.insert("retries".to_string(), Value::from(3));

        let mut overlay = ContextMap::new();
        overlay.insert("timeout".to_string(), Value::from(10000));

        let merged = shallow_merge(&base, &overlay);
        assert_eq!(merged.get("timeout"), Some(&Value::from(10000)));
        assert_eq!(merged.get("retries"), Some(&Value::from(3)));
    }

    #[test]
    fn deep_merge_recurses_into_nested_objects() {
        let base: ContextMap = serde_json::from_value(serde_json::json!({
            "config": { "timeout": 5000, "retries": 3, "nested": { "flag": true } }
        }))
        .unwrap();
        let overlay: ContextMap = serde_json::from_value(serde_json::json!({
            "config": { "timeout": 10000, "nested": { "newProp": "added" } }
        }))
        .unwrap();

        let merged = deep_merge(&base, &overlay);
        let expected = serde_json::json!({
            "config": {
                "timeout": 10000,
                "retries": 3,
                "nested": { "flag": true, "newProp": "added" }
            }
        });
        assert_eq!(Value::Object(merged), expected);
    }

    #[test]
    fn overlapping_paths_detects_prefix_collisions() {
        assert!(overlapping_paths("a.b", "a.b"));
        assert!(overlapping_paths("a.b", "a.b.c"));
        assert!(overlapping_paths("a.b.c", "a.b"));
        assert!(!overlapping_paths("a.b", "a.c"));
    }

    #[test]
    fn config_round_trips_through_toml() {
        let config = InstanceConfig::new("widgets")
            .with_mode(Mode::Lazy)
            .with_api_depth(3)
            .with_runtime(RuntimeKind::Live)
            .with_allow_api_overwrite(false);

        let toml_str = config.to_toml_string().unwrap();
        let parsed = InstanceConfig::from_toml_str(&toml_str).unwrap();

        assert_eq!(parsed.dir, PathBuf::from("widgets"));
        assert_eq!(parsed.mode, Mode::Lazy);
        assert_eq!(parsed.api_depth, Some(3));
        assert_eq!(parsed.runtime, RuntimeKind::Live);
        assert!(!parsed.allow_api_overwrite);
    }

    #[test]
    fn malformed_toml_is_an_argument_error() {
        let err = InstanceConfig::from_toml_str("dir = [this is not valid").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ArgumentError);
    }
}
