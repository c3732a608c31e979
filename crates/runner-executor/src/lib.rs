//! Re-exports the `Executor`/`ExecutorProvider` contracts consumed by the
//! pipeline engine, plus [`scripted`], an in-memory test double.
//!
//! Concrete execution backends (shell, container, VM) live outside this
//! workspace — this crate exists so downstream implementors and this
//! workspace's own test suite have one shared place to depend on the
//! contract types from.

pub mod scripted;

pub use runner_core::executor::{
    Executor, ExecutorFeatures, ExecutorProvider, PrepareOptions, RunCommand, ScriptGenerator,
    ScriptOutcome, ShellScriptInfo, Trace,
};
pub use scripted::{NullTrace, Outcome, ScriptedExecutor, ScriptedGenerator, ScriptedProvider};
