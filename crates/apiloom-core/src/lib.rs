//! Turns a directory tree of modules into a single callable API object.
//!
//! The pieces, in the order a build pass touches them:
//!
//! - [`module`] discovers files/subdirectories and analyzes each module's
//!   exports, behind the [`module::DirectoryProvider`]/[`module::ModuleLoader`]
//!   capability traits an embedder supplies.
//! - [`sanitize`] turns a raw file/folder name into an API key.
//! - [`shape`] decides, per file and per subdirectory, how it folds into its
//!   parent's shape — a pure function, shared by both builders.
//! - [`build`] interprets a [`shape::ShapePlan`] into an [`tree::ApiNode`]
//!   tree, either eagerly ([`build::EagerBuilder`]) or lazily
//!   ([`build::LazyBuilder`], deferring subdirectories behind
//!   [`tree::LazyProxy`]).
//! - [`context`] carries the self/context/reference bindings a call observes,
//!   and the `run`/`scope` overlay mechanics on top of them.
//! - [`hooks`] is the before/after/always/error pipeline every call routes
//!   through.
//! - [`instance`] assembles all of the above into a running [`instance::BoundApi`]
//!   and owns its lifecycle (`addApi`, `run`/`scope`, `shutdown`, `describe`).

pub mod build;
pub mod context;
pub mod error;
pub mod hooks;
pub mod instance;
pub mod module;
pub mod sanitize;
pub mod shape;
pub mod tree;

pub use context::{
    AsyncLocalRuntime, ContextMap, ContextRuntime, InstanceId, LiveBindingRuntime,
    SelfContextReference,
};
pub use error::{ApiLoomError, ErrorKind, Result};
pub use hooks::{
    AfterHook, AlwaysHook, BeforeHook, BeforeOutcome, ErrorHook, ErrorSource, HookId, HookManager,
    HookOptions, HookType, Stage,
};
pub use instance::{
    AddApiOptions, ApiShape, BoundApi, DescribeNode, HooksConfig, Instance, InstanceConfig,
    MergeStrategy, RuntimeKind, ScopeConfig,
};
pub use module::{DirectoryProvider, ExportValue, InMemoryModuleSystem, ModuleLoader, RawExports};
pub use shape::Mode;
pub use tree::{ApiNode, CallableNode, LazyProxy, ObjectNode, UserFn};

#[cfg(feature = "native")]
pub use module::NativeDirectoryProvider;
