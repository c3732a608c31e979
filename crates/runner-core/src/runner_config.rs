//! Runner-side configuration, immutable for the duration of one build.
//!
//! The core must never mutate the caller's configuration: a build takes a
//! defensive copy before it begins, and the caller's value must be
//! byte-identical before and after `Run`. In Rust this invariant falls out
//! of ownership: every field here is owned data (`String`/`Vec`/`HashMap`,
//! no `Rc`/`Arc` aliasing), so `RunnerConfig::clone()` already produces an
//! independent value with no shared mutable state for the core to
//! accidentally corrupt. The pipeline engine clones the config it's
//! handed at the start of `Run` and only ever touches the clone.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    pub executor_name: String,
    pub clone_url: Option<String>,
    pub debug_trace_disabled: bool,
    pub environment_overrides: Vec<(String, String)>,
    pub runner_token: String,
    pub credentials: Credentials,
    /// Whether a custom `GIT_CLONE_PATH` may override the computed build
    /// directory.
    pub custom_build_dir_enabled: bool,
    /// Whether build directories are shared across concurrent jobs on the
    /// same runner (affects `BuildDir` layout and the
    /// `CI_SHARED_ENVIRONMENT`/`CI_DISPOSABLE_ENVIRONMENT` synthetic var).
    pub shared_build_dir: bool,
    /// This runner's project-runner-ID slot, used in the shared `BuildDir`
    /// layout and in the `concurrent-<n>` suffix of `ProjectUniqueName`.
    pub concurrent_id: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
    pub extra: HashMap<String, String>,
}
