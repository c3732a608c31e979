//! The contracts the core consumes but never implements: `Executor`,
//! `ExecutorProvider`, `ScriptGenerator`, `Trace`. Concrete backends
//! (shell, container, VM) live outside this workspace.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{CancellationCause, Error, Result};

/// Returned by `Executor::shell`, the context a `ScriptGenerator` needs to
/// render a stage's script in the executor's own shell dialect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellScriptInfo {
    pub shell_name: String,
    pub build_dir: String,
    pub cache_dir: String,
}

/// Arguments to `Executor::prepare`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepareOptions {
    /// `KEY=VALUE` pairs, already expanded, in `VariableSet` order.
    pub variables: Vec<String>,
    pub image: String,
    pub build_dir: String,
    pub cache_dir: String,
}

/// A single stage dispatched to `Executor::run`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunCommand {
    pub stage: String,
    pub script: String,
    /// True for the fixed prologue/epilogue stages (`get_sources`,
    /// `archive_cache`, ...); false for user-declared stages
    /// (`step_script`, `step_release`, ...).
    pub predefined: bool,
}

/// What a `ScriptGenerator` produced for a stage.
#[derive(Debug, Clone)]
pub enum ScriptOutcome {
    Script(String),
    /// Sentinel meaning there is nothing to run for this stage.
    Skip,
}

/// Trait for generating a stage's script in some shell dialect. Concrete
/// implementations (bash, powershell, ...) live outside this workspace.
pub trait ScriptGenerator: Send + Sync {
    fn name(&self) -> &'static str;

    fn generate_script(&self, stage: &str, info: &ShellScriptInfo) -> Result<ScriptOutcome>;
}

/// Byte sink for the job's own build log, plus the hooks the
/// `CancellationHub` and masking layer need. Implemented by the (excluded)
/// coordinator client's trace reporter.
pub trait Trace: Send + Sync {
    fn write(&self, data: &[u8]);

    fn is_stdout(&self) -> bool;

    /// Registers a function the `CancellationHub`'s `UserCancel` source
    /// invokes to request cancellation.
    fn set_cancel_func(&self, cancel: Box<dyn Fn() + Send + Sync>);

    /// Patterns that must never appear verbatim in subsequent `write`
    /// calls.
    fn set_masked(&self, patterns: Vec<String>);

    /// Reports the job's terminal outcome and, for cancellations, the
    /// classified cause.
    fn fail(&self, err: Error, cause: Option<CancellationCause>);
}

/// Trait for the pluggable execution backend. A fresh instance is created
/// for every attempt during prepare-retry, so `cleanup` is called once for
/// every instance that was created (including ones discarded after a
/// retryable `prepare` failure), while `finish` is called once per job, on
/// whichever instance survives to run the stage sequence.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Obtain script-generation context. Called exactly once per retained
    /// executor, after a successful `prepare`.
    async fn shell(&self) -> Result<ShellScriptInfo>;

    /// Set up the execution environment. Retried by the prepare policy on
    /// retryable failure; a `BuildError` short-circuits immediately.
    async fn prepare(&self, options: PrepareOptions, trace: Arc<dyn Trace>) -> Result<()>;

    /// Execute one stage's generated script. Retried per the stage's own
    /// attempts policy.
    async fn run(&self, cmd: RunCommand) -> Result<()>;

    /// Tear down anything `prepare` set up. Called once for every executor
    /// instance created, on every exit path. Errors are logged, never
    /// fatal.
    async fn cleanup(&self);

    /// Called once per job, with the job's terminal outcome, on whichever
    /// executor instance survived prepare-retry. The last observable call
    /// on that instance.
    async fn finish(&self, outcome: Option<Error>);
}

/// Factory + capability queries for an `Executor` backend.
pub trait ExecutorProvider: Send + Sync {
    fn can_create(&self) -> bool;

    fn default_shell(&self) -> &'static str;

    /// Populates executor-specific feature flags the pipeline should
    /// consult (e.g. whether the backend supports masking).
    fn get_features(&self, out: &mut ExecutorFeatures) -> Result<()>;

    fn create(&self) -> Arc<dyn Executor>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutorFeatures {
    pub supports_masking: bool,
    pub supports_interactive: bool,
}
