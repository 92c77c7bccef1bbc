//! `NameSanitizer`: maps a raw filename or folder name to an API key.
//!
//! The design treats this as a fixed external contract — the core only
//! ever calls it and compares the keys it returns. The default
//! implementation below is camelCase-ish with configurable overrides,
//! built on `heck` the way the rest of the pack reaches for it for
//! identifier casing.

use std::collections::HashSet;

use heck::ToLowerCamelCase;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Real-world filenames carry characters `heck`'s word-boundary detection
/// doesn't expect (`v2.1-release!`, `on (beta)`, stray punctuation). This
/// strips everything but alphanumerics/`_`/`-`/whitespace before handing
/// the result to `to_lower_camel_case`, the way `pcb_zen_core::lang::module`
/// uses a precompiled `regex::Regex` to pre-filter a name before further
/// processing rather than teaching the casing crate about every case.
static NON_IDENTIFIER_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s-]+").expect("static pattern is valid"));

/// Pluggable naming contract. The core treats this as opaque: rule
/// comparisons in `shape` use sanitized keys only, never the raw names.
pub trait Sanitizer: Send + Sync {
    fn sanitize(&self, raw: &str) -> String;
}

/// Per-instance sanitizer configuration, passed through verbatim from
/// `InstanceConfig::sanitize`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SanitizeRules {
    /// Lower-case the first character of the camelCased result (default
    /// behavior; set to `Some(false)` to keep the first segment's casing).
    pub lower_first: Option<bool>,
    /// Preserve names that are entirely upper-case (e.g. `NVR`) instead of
    /// camel-casing them.
    pub preserve_all_upper: Option<bool>,
    /// Preserve names that are entirely lower-case.
    pub preserve_all_lower: Option<bool>,
    /// Exact names to leave untouched.
    #[serde(default)]
    pub leave: Vec<String>,
    /// Names to leave untouched, compared case-insensitively.
    #[serde(default)]
    pub leave_insensitive: Vec<String>,
    /// Exact names to force to all upper-case.
    #[serde(default)]
    pub upper: Vec<String>,
    /// Exact names to force to all lower-case.
    #[serde(default)]
    pub lower: Vec<String>,
}

/// Default `Sanitizer`: camelCase-ish, with the override rules from
/// `SanitizeRules` applied before falling back to the generic conversion.
#[derive(Debug, Clone, Default)]
pub struct DefaultSanitizer {
    rules: SanitizeRules,
    leave_insensitive: HashSet<String>,
}

impl DefaultSanitizer {
    pub fn new(rules: SanitizeRules) -> Self {
        let leave_insensitive = rules
            .leave_insensitive
            .iter()
            .map(|s| s.to_lowercase())
            .collect();
        Self {
            rules,
            leave_insensitive,
        }
    }
}

impl Sanitizer for DefaultSanitizer {
    fn sanitize(&self, raw: &str) -> String {
        if self.rules.leave.iter().any(|s| s == raw) {
            return raw.to_string();
        }
        if self.leave_insensitive.contains(&raw.to_lowercase()) {
            return raw.to_string();
        }
        if self.rules.upper.iter().any(|s| s == raw) {
            return raw.to_uppercase();
        }
        if self.rules.lower.iter().any(|s| s == raw) {
            return raw.to_lowercase();
        }

        let is_all_upper = raw.chars().any(|c| c.is_alphabetic()) && raw.chars().all(|c| !c.is_lowercase());
        if is_all_upper && self.rules.preserve_all_upper.unwrap_or(false) {
            return raw.to_string();
        }

        let is_all_lower = raw.chars().any(|c| c.is_alphabetic()) && raw.chars().all(|c| !c.is_uppercase());
        if is_all_lower && self.rules.preserve_all_lower.unwrap_or(false) {
            return raw.to_string();
        }

        let stripped = NON_IDENTIFIER_CHARS.replace_all(raw, " ");
        let camel = stripped.to_lower_camel_case();
        if self.rules.lower_first.unwrap_or(true) {
            camel
        } else {
            let mut chars = camel.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => camel,
            }
        }
    }
}
