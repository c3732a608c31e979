//! Domain types and external contracts for the build orchestration core.
//!
//! This crate contains:
//! - Resource identifiers
//! - The job payload and runner configuration data model
//! - The error taxonomy
//! - The `Executor`/`ExecutorProvider`/`ScriptGenerator`/`Trace`/
//!   `InteractiveSession` contracts this core consumes but never
//!   implements

pub mod error;
pub mod executor;
pub mod id;
pub mod job;
pub mod runner_config;
pub mod terminal;

pub use error::{CancellationCause, Error, FailureReason, Result, SkipBuildStage};
pub use id::ResourceId;
