//! `EagerBuilder`: loads everything up front, depth-first, synchronously
//! with respect to the output tree — no [`crate::tree::ApiNode::Lazy`]
//! placeholder ever appears in what it returns.

use std::path::Path;

use futures::future::BoxFuture;

use super::common::{assemble_files, finish_node, insert_child, load_directory_record, plan_for};
use crate::error::Result;
use crate::module::{DirectoryProvider, ModuleLoader};
use crate::sanitize::Sanitizer;
use crate::shape::Mode;
use crate::tree::ApiNode;

pub struct EagerBuilder<'a> {
    directory_provider: &'a dyn DirectoryProvider,
    module_loader: &'a dyn ModuleLoader,
    sanitizer: &'a dyn Sanitizer,
    api_depth: Option<u32>,
    allow_overwrite: bool,
}

impl<'a> EagerBuilder<'a> {
    pub fn new(
        directory_provider: &'a dyn DirectoryProvider,
        module_loader: &'a dyn ModuleLoader,
        sanitizer: &'a dyn Sanitizer,
        api_depth: Option<u32>,
        allow_overwrite: bool,
    ) -> Self {
        EagerBuilder {
            directory_provider,
            module_loader,
            sanitizer,
            api_depth,
            allow_overwrite,
        }
    }

    pub async fn build(&self, root: &Path) -> Result<ApiNode> {
        self.build_dir(root, 0).await
    }

    fn build_dir<'f>(&'f self, path: &'f Path, depth: u32) -> BoxFuture<'f, Result<ApiNode>> {
        Box::pin(async move {
            let dir = load_directory_record(
                self.directory_provider,
                self.module_loader,
                self.sanitizer,
                path,
                depth,
            )
            .await?;

            let plan = plan_for(&dir, depth, Mode::Eager);
            let mut assembly = assemble_files(&dir, &plan, depth, self.allow_overwrite)?;

            let descend = self.api_depth.map(|max| depth + 1 < max).unwrap_or(true);
            if descend {
                let path_label = dir.path.to_string_lossy().to_string();
                for sub in &dir.sub_dirs {
                    let child = self.build_dir(&sub.path, depth + 1).await?;
                    insert_child(
                        &mut assembly.object,
                        &sub.api_key,
                        child,
                        self.allow_overwrite,
                        &path_label,
                    )?;
                }
            }

            Ok(finish_node(assembly, &dir.folder_name))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{ExportValue, InMemoryModuleSystem, RawExports};
    use crate::sanitize::DefaultSanitizer;
    use crate::tree::test_support::closure_fn;
    use serde_json::Value;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn system_with_math_folder() -> InMemoryModuleSystem {
        let mut system = InMemoryModuleSystem::new();
        system.add_directory("/api", vec![PathBuf::from("/api/math")]);
        system.add_directory("/api/math", vec![PathBuf::from("/api/math/math.mjs")]);

        let add = Arc::new(closure_fn("add", |args| {
            let a = args[0].as_i64().unwrap_or(0);
            let b = args[1].as_i64().unwrap_or(0);
            Ok(Value::from(a + b))
        }));
        let multiply = Arc::new(closure_fn("multiply", |args| {
            let a = args[0].as_i64().unwrap_or(0);
            let b = args[1].as_i64().unwrap_or(0);
            Ok(Value::from(a * b))
        }));
        let mut named = std::collections::BTreeMap::new();
        named.insert("add".to_string(), ExportValue::Function(add));
        named.insert("multiply".to_string(), ExportValue::Function(multiply));
        system.add_module(
            "/api/math/math.mjs",
            RawExports {
                default: None,
                named,
                marked_as_callable_default: false,
            },
        );
        system
    }

    #[tokio::test]
    async fn auto_flattening_drops_redundant_file_level_nesting() {
        let system = system_with_math_folder();
        let sanitizer = DefaultSanitizer::default();
        let builder = EagerBuilder::new(&system, &system, &sanitizer, None, true);

        let root = builder.build(Path::new("/api")).await.unwrap();
        let root_obj = root.as_object().unwrap();
        let math = root_obj.get("math").unwrap().as_object().unwrap();

        assert!(math.get("add").is_some());
        assert!(math.get("multiply").is_some());
        assert!(math.get("math").is_none());
    }
}
