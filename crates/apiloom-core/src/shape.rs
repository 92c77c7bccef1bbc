//! `ShapeRules`: the decision engine. A pure function from a directory's
//! analyzed files/subdirectories to a per-file, per-subdirectory plan.
//! `build::eager` and `build::lazy` are the only consumers, and neither may
//! branch on the rule outcomes themselves — this module owns every rule.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::module::{DefaultKind, DirectoryRecord};

/// Whether a build is eager or lazy. Threaded through `plan_directory` so
/// decisions can be audited against the mode that requested them, but never
/// branched on inside a rule — eager and lazy modes must see identical
/// plans for identical directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Eager,
    Lazy,
}

/// Per-file outcome of rules 1-12. The builder interprets each tag; this
/// module only classifies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileTag {
    /// Rules 1, 5: the module's exports (default + named) become a
    /// sub-object of the directory node, keyed by `apiKey`.
    PreserveAsNamespace,
    /// Rule 2: the file's default becomes a callable property of the
    /// directory, keyed by `key`; named exports attach to that property.
    PreserveAsProperty { key: String },
    /// Rules 3, 10: every named export is promoted into the directory's
    /// own scope under its own name.
    FlattenNamedOnly,
    /// Rules 4, 11: the sole named export (`key`) is used directly under
    /// `apiKey`, skipping the intermediate object.
    PromoteSingleNamedExport { key: String },
    /// Rule 6 (root only): named exports flatten straight into the root.
    MergeIntoFolder,
    /// Rule 7 (root only): this file's default becomes the root callable.
    RootCallable,
    /// Rule 7 (root only): a root file with a default, but not the first
    /// one seen — attaches as a sibling instead of becoming the callable.
    RootSibling,
    /// Rule 8: the folder node becomes this file's default function;
    /// siblings attach as properties.
    UseAsFolderCallable,
    /// Rule 9: the default object's own properties merge into the folder;
    /// named exports layer on top.
    FlattenDefaultObject,
    /// Rule 12: keep the function's own declared name (not `apiKey`) as
    /// the key, preserving casing like `autoIP`.
    UseFilenameAsKey { key: String },
}

/// Per-subdirectory outcome. Upward flattening (rule 13) is a tree
/// transform applied after a subdirectory's own node has been assembled,
/// not a shaping decision taken here — every subdirectory plans the same
/// way; it is always visited and its node attached under its `apiKey`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubdirTag {
    Namespace,
}

/// The result of `plan_directory`: exactly one [`FileTag`] per file and
/// one [`SubdirTag`] per subdirectory, keyed for the builder to look up
/// without re-deriving anything.
#[derive(Debug, Clone, Default)]
pub struct ShapePlan {
    /// Keyed by `ModuleRecord::file_path` (display form) — `apiKey` is not
    /// unique enough across rule 2's multi-default properties.
    pub per_file: BTreeMap<String, FileTag>,
    /// Keyed by subdirectory `apiKey`.
    pub per_subdir: BTreeMap<String, SubdirTag>,
}

impl ShapePlan {
    pub fn tag_for(&self, file_path: &std::path::Path) -> Option<&FileTag> {
        self.per_file.get(&file_path.to_string_lossy().to_string())
    }
}

fn is_generic_filename(stem: &str) -> bool {
    matches!(stem, "index" | "main")
}

/// Rule priority: earlier rules win, first match per file stops
/// evaluation. Root-only rules (6, 7) only fire at `depth ==
/// 0`; subdirectory-only rules (8-12) only fire at `depth > 0`.
pub fn plan_directory(dir: &DirectoryRecord, depth: u32, _mode: Mode) -> ShapePlan {
    let mut plan = ShapePlan::default();
    let mut root_callable_chosen = false;

    for file in &dir.files {
        let key = file.file_path.to_string_lossy().to_string();
        let named_keys: Vec<&String> = file.named.keys().collect();

        let tag = if file.is_self_referential_default {
            FileTag::PreserveAsNamespace
        } else if dir.has_multiple_callable_defaults && file.default.is_some() {
            FileTag::PreserveAsProperty {
                key: file.api_key.clone(),
            }
        } else if dir.has_multiple_callable_defaults && file.named_only {
            FileTag::FlattenNamedOnly
        } else if named_keys.len() == 1 && *named_keys[0] == file.api_key {
            FileTag::PromoteSingleNamedExport {
                key: file.api_key.clone(),
            }
        } else if depth == 0 {
            plan_root_file(file, dir, &mut root_callable_chosen)
        } else {
            plan_subdir_file(file, dir, &named_keys)
        };

        plan.per_file.insert(key, tag);
    }

    for sub in &dir.sub_dirs {
        plan.per_subdir
            .insert(sub.api_key.clone(), SubdirTag::Namespace);
    }

    plan
}

fn plan_root_file(
    file: &crate::module::ModuleRecord,
    dir: &DirectoryRecord,
    root_callable_chosen: &mut bool,
) -> FileTag {
    if file.api_key == dir.folder_name && file.named_only {
        return FileTag::MergeIntoFolder;
    }
    if file.default.is_some() {
        if !*root_callable_chosen {
            *root_callable_chosen = true;
            return FileTag::RootCallable;
        }
        return FileTag::RootSibling;
    }
    FileTag::PreserveAsNamespace
}

fn plan_subdir_file(
    file: &crate::module::ModuleRecord,
    dir: &DirectoryRecord,
    named_keys: &[&String],
) -> FileTag {
    if file.file_stem == dir.folder_name {
        match file.default_kind {
            DefaultKind::Function => return FileTag::UseAsFolderCallable,
            DefaultKind::Object => return FileTag::FlattenDefaultObject,
            _ => {}
        }
        if file.named_only {
            return FileTag::FlattenNamedOnly;
        }
    }
    if is_generic_filename(&file.file_stem) && named_keys.len() == 1 {
        return FileTag::PromoteSingleNamedExport {
            key: (*named_keys[0]).clone(),
        };
    }
    if file.default_kind == DefaultKind::Function {
        if let Some(fname) = file.function_name() {
            if fname.to_lowercase() == file.file_stem.to_lowercase() && fname != file.api_key {
                return FileTag::UseFilenameAsKey {
                    key: fname.to_string(),
                };
            }
        }
    }
    FileTag::PreserveAsNamespace
}
