//! The shaped API tree: what `build::eager`/`build::lazy` produce and what
//! `instance::Instance` hands callers through `BoundApi`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::BoxError;

/// A user-supplied callable, the shaped form of [`crate::module::ExportValue::Function`].
/// `name()`/`arity()` back the "function-name equals folder name" rule-8/9
/// comparisons and hook-pattern dispatch; everything else is invocation.
#[async_trait]
pub trait UserFn: Send + Sync {
    async fn call(&self, args: Vec<Value>) -> std::result::Result<Value, BoxError>;

    fn name(&self) -> &str;

    fn arity(&self) -> Option<usize> {
        None
    }
}

impl fmt::Debug for dyn UserFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserFn").field("name", &self.name()).finish()
    }
}

/// A node in the assembled API tree. Reserved keys (see [`is_reserved_key`])
/// can never appear as a child — the builders check this before insertion,
/// not on read.
///
/// `Lazy` only ever appears in trees produced by `build::lazy::LazyBuilder`;
/// `build::eager::EagerBuilder` never emits it — its output is fully
/// materialized before it returns, so no proxy ever appears in it.
#[derive(Clone, Debug)]
pub enum ApiNode {
    Object(ObjectNode),
    Callable(CallableNode),
    Value(Value),
    Lazy(Arc<LazyProxy>),
}

impl ApiNode {
    pub fn is_callable(&self) -> bool {
        matches!(self, ApiNode::Callable(_))
    }

    pub fn as_object(&self) -> Option<&ObjectNode> {
        match self {
            ApiNode::Object(o) => Some(o),
            ApiNode::Callable(c) => Some(&c.properties),
            ApiNode::Value(_) | ApiNode::Lazy(_) => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut ObjectNode> {
        match self {
            ApiNode::Object(o) => Some(o),
            ApiNode::Callable(c) => Some(&mut c.properties),
            ApiNode::Value(_) | ApiNode::Lazy(_) => None,
        }
    }
}

/// An unmaterialized directory slot. `cell` is populated at most once
/// (`tokio::sync::OnceCell`); concurrent callers awaiting the same slot
/// share one in-flight materialization.
pub struct LazyProxy {
    pub path: std::path::PathBuf,
    pub folder_name: String,
    pub api_key: String,
    pub depth: u32,
    pub cell: tokio::sync::OnceCell<ApiNode>,
}

impl LazyProxy {
    pub fn new(path: std::path::PathBuf, folder_name: String, api_key: String, depth: u32) -> Self {
        LazyProxy {
            path,
            folder_name,
            api_key,
            depth,
            cell: tokio::sync::OnceCell::new(),
        }
    }
}

impl fmt::Debug for LazyProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyProxy")
            .field("path", &self.path)
            .field("materialized", &self.cell.initialized())
            .finish()
    }
}

/// A plain container of named children, in sanitized-key order. Insertion
/// order of named entries carries no API meaning; `BTreeMap` is used purely
/// so `describe()` output and test snapshots are deterministic.
#[derive(Clone, Debug, Default)]
pub struct ObjectNode {
    pub children: BTreeMap<String, ApiNode>,
}

impl ObjectNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: String, node: ApiNode) -> Option<ApiNode> {
        self.children.insert(key, node)
    }

    pub fn get(&self, key: &str) -> Option<&ApiNode> {
        self.children.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

/// A folder (or function-as-default-export) that is itself callable, with
/// sibling properties attached — functions are valid containers too.
#[derive(Clone)]
pub struct CallableNode {
    pub func: Arc<dyn UserFn>,
    pub properties: ObjectNode,
}

impl fmt::Debug for CallableNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallableNode")
            .field("name", &self.func.name())
            .field("properties", &self.properties)
            .finish()
    }
}

/// Keys the runtime reserves for its own lifecycle surface. Builders never
/// allow a module/folder to produce one of these as a child key, and the
/// hook pipeline (`hooks::HookManager::dispatch`) never wraps or matches
/// against them. This is the single source of truth — no other site
/// pattern-matches on these names independently.
pub const RESERVED_KEYS: &[&str] = &[
    "shutdown", "addApi", "describe", "hooks", "__ctx", "_impl", "run", "scope",
];

/// `RESERVED_KEYS` as a set, built once. `is_reserved_key` is on the hot
/// path of every insertion and every hook dispatch, so this avoids a linear
/// scan per call the way `pcb_zen_core::lang::symbol`'s `once_cell::sync::Lazy`
/// statics avoid rebuilding a lookup table on every use.
static RESERVED_KEY_SET: once_cell::sync::Lazy<std::collections::HashSet<&'static str>> =
    once_cell::sync::Lazy::new(|| RESERVED_KEYS.iter().copied().collect());

pub fn is_reserved_key(key: &str) -> bool {
    RESERVED_KEY_SET.contains(key)
}
