//! The crate's single error type.
//!
//! `apiloom-core` never returns a bare `anyhow::Error` from a public API —
//! every failure mode named by the design is a variant here, the way
//! `pcb_zen_core::diagnostics::LoadError` wraps a structured diagnostic
//! instead of a string. `anyhow`/`eyre` style catch-alls belong at the
//! embedder's boundary (see `apiloom-cli`), not inside the library.

use std::fmt;
use std::path::PathBuf;

use crate::hooks::HookId;

/// A boxed, type-erased source error. Used at the boundary between this
/// crate's capability traits (`ModuleLoader`, `DirectoryProvider`) and its
/// own error enum, so callers can supply any error type from their own
/// loader implementation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum ApiLoomError {
    /// Bad input: an empty or malformed dotted path, a wrong option type,
    /// an invalid `scope.merge` value.
    #[error("invalid argument: {0}")]
    Argument(String),

    /// File/folder not found, import failure, or an unsupported module
    /// shape surfaced by a `ModuleLoader`.
    #[error("failed to load module at {path}: {source}")]
    Loader {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    /// Attempt to extend an API through a primitive, or a key collision
    /// with overwrites disabled.
    #[error("api shape conflict at `{path}`: {reason}")]
    ApiShapeConflict { path: String, reason: String },

    /// Failure inside a `LazyProxy`'s resolution. The proxy remains
    /// unresolved and is safe to retry.
    #[error("failed to materialize `{path}`: {source}")]
    Materialization {
        path: String,
        #[source]
        source: BoxError,
    },

    /// Failure inside a hook handler.
    #[error("hook `{hook_id}` failed on `{path}`: {source}")]
    Hook {
        path: String,
        hook_id: HookId,
        #[source]
        source: BoxError,
    },

    /// Shutdown timeout, or recursive shutdown misuse.
    #[error("lifecycle error: {0}")]
    Lifecycle(String),

    /// Context-runtime misuse, e.g. `run`/`scope` called while scope is
    /// disabled.
    #[error("runtime misuse: {0}")]
    Runtime(String),
}

impl ApiLoomError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiLoomError::Argument(_) => ErrorKind::ArgumentError,
            ApiLoomError::Loader { .. } => ErrorKind::LoaderError,
            ApiLoomError::ApiShapeConflict { .. } => ErrorKind::ApiShapeConflict,
            ApiLoomError::Materialization { .. } => ErrorKind::MaterializationError,
            ApiLoomError::Hook { .. } => ErrorKind::HookError,
            ApiLoomError::Lifecycle(_) => ErrorKind::LifecycleError,
            ApiLoomError::Runtime(_) => ErrorKind::RuntimeError,
        }
    }

    pub fn argument(msg: impl Into<String>) -> Self {
        ApiLoomError::Argument(msg.into())
    }

    pub fn loader(path: impl Into<PathBuf>, source: impl Into<BoxError>) -> Self {
        ApiLoomError::Loader {
            path: path.into(),
            source: source.into(),
        }
    }

    pub fn shape_conflict(path: impl Into<String>, reason: impl Into<String>) -> Self {
        ApiLoomError::ApiShapeConflict {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// The error taxonomy from the design: a tag, not a type name, so callers
/// can match on `.kind()` without downcasting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ArgumentError,
    LoaderError,
    ApiShapeConflict,
    MaterializationError,
    HookError,
    LifecycleError,
    RuntimeError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::ArgumentError => "ArgumentError",
            ErrorKind::LoaderError => "LoaderError",
            ErrorKind::ApiShapeConflict => "ApiShapeConflict",
            ErrorKind::MaterializationError => "MaterializationError",
            ErrorKind::HookError => "HookError",
            ErrorKind::LifecycleError => "LifecycleError",
            ErrorKind::RuntimeError => "RuntimeError",
        };
        f.write_str(s)
    }
}

pub type Result<T> = std::result::Result<T, ApiLoomError>;
