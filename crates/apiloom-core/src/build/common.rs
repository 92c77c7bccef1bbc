//! Shared tree-assembly helpers used by both `eager` and `lazy`. Neither
//! builder branches on mode here — this module only turns one
//! already-decided [`FileTag`] into tree mutations; the decision itself
//! lives entirely in `shape::plan_directory`.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{ApiLoomError, Result};
use crate::module::{DirectoryRecord, DirectorySummary, ExportValue, ModuleRecord};
use crate::sanitize::Sanitizer;
use crate::shape::{plan_directory, FileTag, Mode, ShapePlan};
use crate::tree::{is_reserved_key, ApiNode, CallableNode, ObjectNode};

/// Converts one already-analyzed export value into a tree node. Nested
/// `ExportValue::Object` maps become nested `ObjectNode`s recursively —
/// this is plain data, never a directory, so no lazy placeholder is ever
/// appropriate here.
pub(crate) fn export_to_node(value: &ExportValue) -> ApiNode {
    match value {
        ExportValue::Function(f) => ApiNode::Callable(CallableNode {
            func: f.clone(),
            properties: ObjectNode::new(),
        }),
        ExportValue::Object(map) => {
            let mut obj = ObjectNode::new();
            for (k, v) in map.iter() {
                obj.insert(k.clone(), export_to_node(v));
            }
            ApiNode::Object(obj)
        }
        ExportValue::Primitive(v) => ApiNode::Value(v.clone()),
    }
}

/// Shapes one module's own default + named exports into a node, as used
/// whenever a file keeps its own namespace (rules 1, 2, 5, 12) rather than
/// flattening into its parent.
pub(crate) fn leaf_node_for_module(file: &ModuleRecord) -> ApiNode {
    let mut properties = ObjectNode::new();
    for (k, v) in &file.named {
        properties.insert(k.clone(), export_to_node(v));
    }

    match &file.default {
        Some(ExportValue::Function(f)) => ApiNode::Callable(CallableNode {
            func: f.clone(),
            properties,
        }),
        Some(ExportValue::Object(map)) => {
            let mut obj = ObjectNode::new();
            for (k, v) in map.iter() {
                obj.insert(k.clone(), export_to_node(v));
            }
            // Named exports layer on top of the default object's own
            // properties (rule 9's ordering, reused here for consistency).
            for (k, node) in properties.children {
                obj.insert(k, node);
            }
            ApiNode::Object(obj)
        }
        Some(ExportValue::Primitive(val)) => {
            if properties.is_empty() {
                ApiNode::Value(val.clone())
            } else {
                ApiNode::Object(properties)
            }
        }
        None => ApiNode::Object(properties),
    }
}

/// Enforces the reserved-key filter and `allowApiOverwrite` before writing
/// a child into an assembled object — the single choke point every
/// builder routes insertion through.
pub(crate) fn insert_checked(
    object: &mut ObjectNode,
    key: &str,
    node: ApiNode,
    allow_overwrite: bool,
    path: &str,
) -> Result<()> {
    if is_reserved_key(key) {
        return Err(ApiLoomError::shape_conflict(
            path,
            format!("`{key}` is reserved for the runtime's own lifecycle surface"),
        ));
    }
    if object.children.contains_key(key) && !allow_overwrite {
        return Err(ApiLoomError::shape_conflict(
            path,
            format!("key `{key}` already exists and allowApiOverwrite is false"),
        ));
    }
    object.insert(key.to_string(), node);
    Ok(())
}

/// Rule 13: if a folder's assembled children collapse to a single child
/// keyed by the folder's own name, the folder node is replaced by that
/// child. Applied bottom-up by construction — every caller runs this right
/// after it finishes assembling a directory's node, before returning to
/// its own parent.
pub(crate) fn apply_upward_flatten(node: ApiNode, folder_name: &str) -> ApiNode {
    if let ApiNode::Object(obj) = &node {
        if obj.children.len() == 1 {
            if let Some((key, child)) = obj.children.iter().next() {
                if key == folder_name {
                    return child.clone();
                }
            }
        }
    }
    node
}

/// The result of interpreting one directory's [`ShapePlan`]: the
/// directory's own properties, plus an optional callable identity chosen
/// by rules 7/8/2.
pub(crate) struct DirectoryAssembly {
    pub object: ObjectNode,
    pub callable: Option<Arc<dyn crate::tree::UserFn>>,
}

/// Interprets every [`FileTag`] in `plan` against `dir.files`, producing
/// the directory's own properties and (if any file claimed it) its
/// callable identity. Subdirectories are the caller's responsibility —
/// `eager`/`lazy` differ only in how a subdirectory becomes a child node.
pub(crate) fn assemble_files(
    dir: &DirectoryRecord,
    plan: &ShapePlan,
    depth: u32,
    allow_overwrite: bool,
) -> Result<DirectoryAssembly> {
    let mut object = ObjectNode::new();
    let mut callable: Option<Arc<dyn crate::tree::UserFn>> = None;
    let path_label = dir.path.to_string_lossy().to_string();

    for file in &dir.files {
        let tag = plan
            .tag_for(&file.file_path)
            .cloned()
            .unwrap_or(FileTag::PreserveAsNamespace);

        match tag {
            FileTag::PreserveAsNamespace => {
                insert_checked(
                    &mut object,
                    &file.api_key,
                    leaf_node_for_module(file),
                    allow_overwrite,
                    &path_label,
                )?;
            }
            FileTag::PreserveAsProperty { key } => {
                insert_checked(
                    &mut object,
                    &key,
                    leaf_node_for_module(file),
                    allow_overwrite,
                    &path_label,
                )?;
            }
            FileTag::FlattenNamedOnly | FileTag::MergeIntoFolder => {
                for (k, v) in &file.named {
                    insert_checked(&mut object, k, export_to_node(v), allow_overwrite, &path_label)?;
                }
            }
            FileTag::PromoteSingleNamedExport { key } => {
                if let Some(v) = file.named.get(&key) {
                    insert_checked(&mut object, &key, export_to_node(v), allow_overwrite, &path_label)?;
                }
            }
            FileTag::RootCallable => {
                if let Some(ExportValue::Function(f)) = &file.default {
                    callable = Some(f.clone());
                } else if let Some(default) = &file.default {
                    insert_checked(
                        &mut object,
                        &file.api_key,
                        export_to_node(default),
                        allow_overwrite,
                        &path_label,
                    )?;
                }
                for (k, v) in &file.named {
                    insert_checked(&mut object, k, export_to_node(v), allow_overwrite, &path_label)?;
                }
            }
            FileTag::RootSibling => {
                if let Some(default) = &file.default {
                    insert_checked(
                        &mut object,
                        &file.api_key,
                        export_to_node(default),
                        allow_overwrite,
                        &path_label,
                    )?;
                }
                for (k, v) in &file.named {
                    insert_checked(&mut object, k, export_to_node(v), allow_overwrite, &path_label)?;
                }
            }
            FileTag::UseAsFolderCallable => {
                if let Some(ExportValue::Function(f)) = &file.default {
                    callable = Some(f.clone());
                }
                for (k, v) in &file.named {
                    insert_checked(&mut object, k, export_to_node(v), allow_overwrite, &path_label)?;
                }
            }
            FileTag::FlattenDefaultObject => {
                if let Some(ExportValue::Object(map)) = &file.default {
                    for (k, v) in map.iter() {
                        insert_checked(&mut object, k, export_to_node(v), allow_overwrite, &path_label)?;
                    }
                }
                for (k, v) in &file.named {
                    insert_checked(&mut object, k, export_to_node(v), allow_overwrite, &path_label)?;
                }
            }
            FileTag::UseFilenameAsKey { key } => {
                insert_checked(
                    &mut object,
                    &key,
                    leaf_node_for_module(file),
                    allow_overwrite,
                    &path_label,
                )?;
            }
        }
        let _ = depth;
    }

    Ok(DirectoryAssembly { object, callable })
}

/// Lists one directory, sanitizes names, and loads every file in it into a
/// [`ModuleRecord`]. Shared by `eager` (called for every directory up
/// front) and `lazy` (called lazily, once per materialization).
pub(crate) async fn load_directory_record(
    directory_provider: &dyn crate::module::DirectoryProvider,
    module_loader: &dyn crate::module::ModuleLoader,
    sanitizer: &dyn Sanitizer,
    path: &Path,
    depth: u32,
) -> Result<DirectoryRecord> {
    let folder_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();
    let folder_key = sanitizer.sanitize(&folder_name);

    let entries = directory_provider
        .list_directory(path)
        .map_err(|e| ApiLoomError::loader(path, e))?;

    let mut files = Vec::new();
    let mut sub_dirs = Vec::new();
    for entry in entries {
        if directory_provider.is_directory(&entry) {
            let name = entry
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            let key = sanitizer.sanitize(&name);
            sub_dirs.push(DirectorySummary {
                path: entry,
                folder_name: name,
                api_key: key,
            });
        } else {
            let record = crate::module::analyze_module(module_loader, sanitizer, &entry).await?;
            files.push(record);
        }
    }

    Ok(DirectoryRecord::new(
        path.to_path_buf(),
        folder_name,
        folder_key,
        files,
        sub_dirs,
        depth,
    ))
}

pub(crate) fn plan_for(dir: &DirectoryRecord, depth: u32, mode: Mode) -> ShapePlan {
    plan_directory(dir, depth, mode)
}

/// Finishes a directory's node: attaches its callable identity if one was
/// chosen, otherwise leaves it a plain object; then applies rule 13.
pub(crate) fn finish_node(assembly: DirectoryAssembly, folder_name: &str) -> ApiNode {
    let node = match assembly.callable {
        Some(func) => ApiNode::Callable(CallableNode {
            func,
            properties: assembly.object,
        }),
        None => ApiNode::Object(assembly.object),
    };
    apply_upward_flatten(node, folder_name)
}

pub(crate) fn insert_child(
    object: &mut ObjectNode,
    key: &str,
    child: ApiNode,
    allow_overwrite: bool,
    path: &str,
) -> Result<()> {
    insert_checked(object, key, child, allow_overwrite, path)
}

pub(crate) type JsonValue = Value;
