//! Tree assembly: `EagerBuilder` and `LazyBuilder` both consume
//! `shape::plan_directory` and differ only in how a subdirectory becomes a
//! child node — never branch on mode inside a rule.

mod common;
pub mod eager;
pub mod lazy;

pub use eager::EagerBuilder;
pub use lazy::LazyBuilder;
