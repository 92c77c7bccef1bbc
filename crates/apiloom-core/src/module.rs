//! `ModuleAnalyzer`: the capability boundary between this crate and the
//! host's own notion of "a source file" plus "a directory of files".
//!
//! Two capabilities are defined here, mirroring the split
//! `pcb_zen_core::FileProvider` makes between filesystem navigation (kept
//! inside the crate, fully implemented) and content interpretation (handed
//! to the caller):
//!
//! - [`DirectoryProvider`] discovers file/subdirectory structure. It is
//!   genuinely implemented by this crate for the native case
//!   ([`NativeDirectoryProvider`]), the way `DefaultFileProvider` is a real,
//!   caching, filesystem-backed implementation of `FileProvider`.
//! - [`ModuleLoader`] turns a single file's contents into exports. This is
//!   the host module system, deliberately out of scope for the core, and
//!   is always supplied by the embedder; this crate only ships an
//!   in-memory reference implementation for tests, the way
//!   `pcb_zen_core::RemoteFetcher` ships only a `NoopRemoteFetcher`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::BoxError;
use crate::sanitize::Sanitizer;
use crate::tree::UserFn;

/// A single exported value from a module, before it has been shaped into
/// the API tree. `Function`/`Object` variants wrap their payload in an
/// `Arc` so that self-referential-default detection (`is_self_referential_default`)
/// can use pointer identity — the Rust analog of a `default === namedExports[k]`
/// identity check.
#[derive(Clone)]
pub enum ExportValue {
    Function(Arc<dyn UserFn>),
    Object(Arc<BTreeMap<String, ExportValue>>),
    Primitive(Value),
}

impl ExportValue {
    pub fn function(f: impl UserFn + 'static) -> Self {
        ExportValue::Function(Arc::new(f))
    }

    pub fn object(map: BTreeMap<String, ExportValue>) -> Self {
        ExportValue::Object(Arc::new(map))
    }

    /// Identity comparison, the Rust analog of JavaScript's `===` on two
    /// export values. Two primitives are never considered identical even
    /// if equal by value — `isSelfReferentialDefault` is about two names
    /// pointing at the same underlying thing, not about two constants that
    /// happen to match.
    pub fn is_same(&self, other: &ExportValue) -> bool {
        match (self, other) {
            (ExportValue::Function(a), ExportValue::Function(b)) => Arc::ptr_eq(a, b),
            (ExportValue::Object(a), ExportValue::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn kind(&self) -> DefaultKind {
        match self {
            ExportValue::Function(_) => DefaultKind::Function,
            ExportValue::Object(_) => DefaultKind::Object,
            ExportValue::Primitive(_) => DefaultKind::Primitive,
        }
    }
}

/// What a module's default export is, without ever invoking it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultKind {
    None,
    Function,
    Object,
    Primitive,
}

/// The raw result of loading one file, before `ModuleAnalyzer` computes the
/// derived fields (`apiKey`, `defaultKind`, `namedOnly`,
/// `isSelfReferentialDefault`) that make it a [`ModuleRecord`].
#[derive(Clone, Default)]
pub struct RawExports {
    pub default: Option<ExportValue>,
    pub named: BTreeMap<String, ExportValue>,
    /// Protocol marker requesting callable treatment for an object default
    /// in a multi-default folder.
    pub marked_as_callable_default: bool,
}

/// A fully analyzed module, consumed by `ShapeRules`.
#[derive(Clone)]
pub struct ModuleRecord {
    pub file_path: PathBuf,
    pub file_stem: String,
    pub api_key: String,
    pub default: Option<ExportValue>,
    pub named: BTreeMap<String, ExportValue>,
    pub default_kind: DefaultKind,
    pub named_only: bool,
    pub is_self_referential_default: bool,
    pub marked_as_callable_default: bool,
}

impl ModuleRecord {
    fn from_raw(file_path: PathBuf, file_stem: String, api_key: String, raw: RawExports) -> Self {
        let default_kind = raw
            .default
            .as_ref()
            .map(ExportValue::kind)
            .unwrap_or(DefaultKind::None);
        let named_only = raw.default.is_none() && !raw.named.is_empty();
        let is_self_referential_default = match &raw.default {
            Some(default) => raw.named.values().any(|v| v.is_same(default)),
            None => false,
        };

        ModuleRecord {
            file_path,
            file_stem,
            api_key,
            default: raw.default,
            named: raw.named,
            default_kind,
            named_only,
            is_self_referential_default,
            marked_as_callable_default: raw.marked_as_callable_default,
        }
    }

    /// A module whose only named export is the value that would become the
    /// folder callable (rule 8/9's function-name check), used by `ShapeRules`.
    pub fn function_name(&self) -> Option<&str> {
        match &self.default {
            Some(ExportValue::Function(f)) => Some(f.name()),
            _ => None,
        }
    }
}

/// Directory structure as seen by the builders, before shaping.
#[derive(Clone)]
pub struct DirectoryRecord {
    pub path: PathBuf,
    pub folder_name: String,
    pub api_key: String,
    /// Lexicographic order by file stem — ties in shaping are resolved by
    /// visiting files in this order (design rule-priority ties).
    pub files: Vec<ModuleRecord>,
    pub sub_dirs: Vec<DirectorySummary>,
    pub depth: u32,
    pub has_multiple_callable_defaults: bool,
}

/// A subdirectory, named but not yet descended into — `LazyBuilder` only
/// needs this much to answer enumeration without materializing.
#[derive(Debug, Clone)]
pub struct DirectorySummary {
    pub path: PathBuf,
    pub folder_name: String,
    pub api_key: String,
}

impl DirectoryRecord {
    pub fn new(
        path: PathBuf,
        folder_name: String,
        api_key: String,
        mut files: Vec<ModuleRecord>,
        sub_dirs: Vec<DirectorySummary>,
        depth: u32,
    ) -> Self {
        files.sort_by(|a, b| a.file_stem.cmp(&b.file_stem));
        let has_multiple_callable_defaults = Self::classify(&files);
        DirectoryRecord {
            path,
            folder_name,
            api_key,
            files,
            sub_dirs,
            depth,
            has_multiple_callable_defaults,
        }
    }

    /// One pass over `files`, computed before any shaping decision is
    /// made.
    fn classify(files: &[ModuleRecord]) -> bool {
        let non_self_referential_defaults: Vec<&ModuleRecord> = files
            .iter()
            .filter(|f| f.default.is_some() && !f.is_self_referential_default)
            .collect();

        non_self_referential_defaults.len() >= 2
            && non_self_referential_defaults
                .iter()
                .any(|f| f.default_kind == DefaultKind::Function || f.marked_as_callable_default)
    }
}

/// Discovers file/subdirectory structure. Fully implemented by this crate —
/// the part of "the host module system" the design keeps in scope.
pub trait DirectoryProvider: Send + Sync {
    fn list_directory(&self, path: &Path) -> std::result::Result<Vec<PathBuf>, BoxError>;
    fn is_directory(&self, path: &Path) -> bool;
    fn exists(&self, path: &Path) -> bool;
    fn canonicalize(&self, path: &Path) -> std::result::Result<PathBuf, BoxError>;
}

/// Turns a file's contents into exports. Always supplied by the embedder —
/// this is the design's "host module system", specified only at the
/// interface.
#[async_trait]
pub trait ModuleLoader: Send + Sync {
    async fn load(&self, path: &Path) -> std::result::Result<RawExports, BoxError>;
}

/// Analyzes one file into a [`ModuleRecord`], calling the injected
/// [`ModuleLoader`] for the part that is genuinely out of scope and the
/// injected [`Sanitizer`] for the key that names it. This free function,
/// not the trait, is "ModuleAnalyzer" proper.
pub async fn analyze_module(
    loader: &dyn ModuleLoader,
    sanitizer: &dyn Sanitizer,
    path: &Path,
) -> crate::error::Result<ModuleRecord> {
    let file_stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();
    let api_key = sanitizer.sanitize(&file_stem);

    let raw = loader
        .load(path)
        .await
        .map_err(|e| crate::error::ApiLoomError::loader(path, e))?;

    Ok(ModuleRecord::from_raw(
        path.to_path_buf(),
        file_stem,
        api_key,
        raw,
    ))
}

/// Bound on the number of `canonicalize` results `NativeDirectoryProvider`
/// keeps around. A build walks one tree once; this just stops long-lived
/// embedders (many `addApi` calls against many different folders over a
/// process lifetime) from growing the cache without limit.
#[cfg(feature = "native")]
const CANONICALIZE_CACHE_CAPACITY: usize = 4096;

/// Real filesystem-backed [`DirectoryProvider`], caching `canonicalize`
/// results the way `pcb_zen_core::DefaultFileProvider` does, bounded by an
/// LRU so the cache can't grow without limit across a long-lived embedder.
#[cfg(feature = "native")]
pub struct NativeDirectoryProvider {
    canonicalize_cache:
        std::sync::Mutex<lru::LruCache<PathBuf, std::result::Result<PathBuf, String>>>,
}

#[cfg(feature = "native")]
impl Default for NativeDirectoryProvider {
    fn default() -> Self {
        NativeDirectoryProvider {
            canonicalize_cache: std::sync::Mutex::new(lru::LruCache::new(
                std::num::NonZeroUsize::new(CANONICALIZE_CACHE_CAPACITY).unwrap(),
            )),
        }
    }
}

#[cfg(feature = "native")]
impl NativeDirectoryProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(feature = "native")]
impl DirectoryProvider for NativeDirectoryProvider {
    fn list_directory(&self, path: &Path) -> std::result::Result<Vec<PathBuf>, BoxError> {
        let mut entries = Vec::new();
        for entry in walkdir::WalkDir::new(path)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
        {
            entries.push(entry?.path().to_path_buf());
        }
        entries.sort();
        Ok(entries)
    }

    fn is_directory(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn canonicalize(&self, path: &Path) -> std::result::Result<PathBuf, BoxError> {
        let path_buf = path.to_path_buf();
        let mut cache = self.canonicalize_cache.lock().unwrap();
        if let Some(cached) = cache.get(&path_buf) {
            return cached.clone().map_err(|e| e.into());
        }
        drop(cache);
        let result = path.canonicalize().map_err(|e| e.to_string());
        self.canonicalize_cache
            .lock()
            .unwrap()
            .put(path_buf, result.clone());
        result.map_err(|e| e.into())
    }
}

/// In-memory [`DirectoryProvider`] + [`ModuleLoader`] for tests and for
/// embedding contexts with no real filesystem — the analog of
/// `pcb_zen_core::InMemoryFileProvider`.
#[derive(Default)]
pub struct InMemoryModuleSystem {
    directories: std::collections::HashMap<PathBuf, Vec<PathBuf>>,
    modules: std::collections::HashMap<PathBuf, RawExports>,
}

impl InMemoryModuleSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_directory(&mut self, path: impl Into<PathBuf>, children: Vec<PathBuf>) -> &mut Self {
        self.directories.insert(path.into(), children);
        self
    }

    pub fn add_module(&mut self, path: impl Into<PathBuf>, raw: RawExports) -> &mut Self {
        self.modules.insert(path.into(), raw);
        self
    }

    /// Folds another in-memory system's directories and modules into this
    /// one, for tests that need two independently-built fixtures to share a
    /// single `DirectoryProvider`/`ModuleLoader` (e.g. `addApi` mounting a
    /// subtree that lives outside the instance's own root).
    pub fn merge(&mut self, other: InMemoryModuleSystem) -> &mut Self {
        self.directories.extend(other.directories);
        self.modules.extend(other.modules);
        self
    }
}

impl DirectoryProvider for InMemoryModuleSystem {
    fn list_directory(&self, path: &Path) -> std::result::Result<Vec<PathBuf>, BoxError> {
        self.directories
            .get(path)
            .cloned()
            .ok_or_else(|| format!("no such directory: {}", path.display()).into())
    }

    fn is_directory(&self, path: &Path) -> bool {
        self.directories.contains_key(path)
    }

    fn exists(&self, path: &Path) -> bool {
        self.directories.contains_key(path) || self.modules.contains_key(path)
    }

    fn canonicalize(&self, path: &Path) -> std::result::Result<PathBuf, BoxError> {
        Ok(path.to_path_buf())
    }
}

#[async_trait]
impl ModuleLoader for InMemoryModuleSystem {
    async fn load(&self, path: &Path) -> std::result::Result<RawExports, BoxError> {
        self.modules
            .get(path)
            .cloned()
            .ok_or_else(|| format!("no such module: {}", path.display()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sanitize::DefaultSanitizer;
    use crate::tree::test_support::closure_fn;

    #[tokio::test]
    async fn self_referential_default_is_detected_by_identity() {
        let f = Arc::new(closure_fn("toggle", |_| Ok(Value::Null)));
        let mut named = BTreeMap::new();
        named.insert("toggle".to_string(), ExportValue::Function(f.clone()));
        let raw = RawExports {
            default: Some(ExportValue::Function(f)),
            named,
            marked_as_callable_default: false,
        };

        let mut system = InMemoryModuleSystem::new();
        system.add_module("/api/power.mjs", raw);

        let sanitizer = DefaultSanitizer::default();
        let record = analyze_module(&system, &sanitizer, Path::new("/api/power.mjs"))
            .await
            .unwrap();

        assert!(record.is_self_referential_default);
        assert_eq!(record.default_kind, DefaultKind::Function);
    }

    #[tokio::test]
    async fn distinct_functions_are_not_self_referential() {
        let default_fn = Arc::new(closure_fn("toggle", |_| Ok(Value::Null)));
        let on_fn = Arc::new(closure_fn("on", |_| Ok(Value::Null)));
        let mut named = BTreeMap::new();
        named.insert("on".to_string(), ExportValue::Function(on_fn));
        let raw = RawExports {
            default: Some(ExportValue::Function(default_fn)),
            named,
            marked_as_callable_default: false,
        };

        let mut system = InMemoryModuleSystem::new();
        system.add_module("/api/power.mjs", raw);
        let sanitizer = DefaultSanitizer::default();
        let record = analyze_module(&system, &sanitizer, Path::new("/api/power.mjs"))
            .await
            .unwrap();

        assert!(!record.is_self_referential_default);
    }

    #[test]
    fn multi_callable_default_requires_two_non_self_referential_and_one_callable() {
        let a = ModuleRecord {
            file_path: "a".into(),
            file_stem: "a".into(),
            api_key: "a".into(),
            default: Some(ExportValue::Primitive(Value::from(1))),
            named: BTreeMap::new(),
            default_kind: DefaultKind::Primitive,
            named_only: false,
            is_self_referential_default: false,
            marked_as_callable_default: false,
        };
        let mut b = a.clone();
        b.file_stem = "b".into();
        b.api_key = "b".into();

        assert!(!DirectoryRecord::classify(&[a.clone(), b.clone()]));

        let mut c = a;
        c.default_kind = DefaultKind::Function;
        c.default = Some(ExportValue::Function(Arc::new(closure_fn("f", |_| {
            Ok(Value::Null)
        }))));
        assert!(DirectoryRecord::classify(&[c, b]));
    }

    #[cfg(feature = "native")]
    #[test]
    fn native_directory_provider_lists_a_real_directory_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.mjs"), "").unwrap();
        std::fs::write(dir.path().join("a.mjs"), "").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let provider = NativeDirectoryProvider::new();
        let entries = provider.list_directory(dir.path()).unwrap();
        let names: Vec<_> = entries
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.mjs", "b.mjs", "sub"]);
    }

    #[cfg(feature = "native")]
    #[test]
    fn native_directory_provider_caches_canonicalize_results() {
        let dir = tempfile::tempdir().unwrap();
        let provider = NativeDirectoryProvider::new();

        let first = provider.canonicalize(dir.path()).unwrap();
        let second = provider.canonicalize(dir.path()).unwrap();
        assert_eq!(first, second);
        assert!(first.is_absolute());
    }
}
