//! Variable expansion and build-context derivation for the build
//! orchestration core:
//!
//! - [`variables::VariableSet`] — the ordered, layered key/value store
//!   with `$VAR`/`${VAR}` expansion.
//! - [`build_context::BuildContext`] — `StartBuild`, directory derivation,
//!   feature-flag/git-flag parsing, and per-stage attempts parsing.

pub mod build_context;
pub mod error;
pub mod variables;

pub use build_context::{BuildContext, BuildDirs};
pub use error::{ConfigError, ConfigResult};
pub use variables::VariableSet;
