//! `LazyBuilder`: assembles one directory level eagerly and defers every
//! subdirectory behind a [`crate::tree::LazyProxy`], materialized on first
//! access. Shares `shape::plan_directory` with `eager` — the only
//! difference is what a subdirectory becomes.

use std::path::Path;
use std::sync::Arc;

use crate::error::{ApiLoomError, Result};
use crate::module::{DirectoryProvider, ModuleLoader};
use crate::sanitize::Sanitizer;
use crate::shape::Mode;
use crate::tree::{ApiNode, LazyProxy};

use super::common::{assemble_files, finish_node, insert_child, load_directory_record, plan_for};

pub struct LazyBuilder<'a> {
    directory_provider: &'a dyn DirectoryProvider,
    module_loader: &'a dyn ModuleLoader,
    sanitizer: &'a dyn Sanitizer,
    api_depth: Option<u32>,
    allow_overwrite: bool,
}

impl<'a> LazyBuilder<'a> {
    pub fn new(
        directory_provider: &'a dyn DirectoryProvider,
        module_loader: &'a dyn ModuleLoader,
        sanitizer: &'a dyn Sanitizer,
        api_depth: Option<u32>,
        allow_overwrite: bool,
    ) -> Self {
        LazyBuilder {
            directory_provider,
            module_loader,
            sanitizer,
            api_depth,
            allow_overwrite,
        }
    }

    /// Builds the root node. The root itself is always materialized
    /// immediately (the caller needs to know whether the root is callable
    /// to decide `apiShape`); only its subdirectories become proxies.
    pub async fn build(&self, root: &Path) -> Result<ApiNode> {
        self.build_one_level(root, 0).await
    }

    /// Resolves `proxy` on first access; subsequent calls observe the
    /// already-materialized value without re-running anything, because
    /// `OnceCell::get_or_try_init` itself de-duplicates concurrent callers.
    pub async fn materialize<'p>(&self, proxy: &'p LazyProxy) -> Result<&'p ApiNode> {
        proxy
            .cell
            .get_or_try_init(|| self.build_one_level(&proxy.path, proxy.depth))
            .await
    }

    /// Cheap `ownKeys`-equivalent: lists the directory and sanitizes names,
    /// without ever calling `ModuleLoader::load`. Two entries can sanitize
    /// to the same key (e.g. `power.mjs` and a `power/` folder), so the
    /// preview is deduplicated the same way `itertools::Itertools::unique`
    /// is used elsewhere in the pack for exactly this "sort, then collapse
    /// repeats" shape.
    pub fn preview_keys(&self, proxy: &LazyProxy) -> Result<Vec<String>> {
        use itertools::Itertools;

        let entries = self
            .directory_provider
            .list_directory(&proxy.path)
            .map_err(|e| ApiLoomError::loader(&proxy.path, e))?;

        let keys: Vec<String> = entries
            .iter()
            .map(|entry| {
                let name = entry
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or_default();
                self.sanitizer.sanitize(name)
            })
            .sorted()
            .unique()
            .collect();
        Ok(keys)
    }

    async fn build_one_level(&self, path: &Path, depth: u32) -> Result<ApiNode> {
        let dir = load_directory_record(
            self.directory_provider,
            self.module_loader,
            self.sanitizer,
            path,
            depth,
        )
        .await?;

        let plan = plan_for(&dir, depth, Mode::Lazy);
        let mut assembly = assemble_files(&dir, &plan, depth, self.allow_overwrite)?;

        let descend = self.api_depth.map(|max| depth + 1 < max).unwrap_or(true);
        if descend {
            let path_label = dir.path.to_string_lossy().to_string();
            for sub in &dir.sub_dirs {
                let proxy = ApiNode::Lazy(Arc::new(LazyProxy::new(
                    sub.path.clone(),
                    sub.folder_name.clone(),
                    sub.api_key.clone(),
                    depth + 1,
                )));
                insert_child(
                    &mut assembly.object,
                    &sub.api_key,
                    proxy,
                    self.allow_overwrite,
                    &path_label,
                )?;
            }
        }

        Ok(finish_node(assembly, &dir.folder_name))
    }
}
