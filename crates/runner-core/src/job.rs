//! The job payload handed to the core by the (excluded) coordinator client.

use serde::{Deserialize, Serialize};

use crate::ResourceId;

/// Opaque job description fetched by the coordinator client and handed to
/// `BuildContext::start_build`. Immutable once received.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResponse {
    pub id: ResourceId,
    pub project_id: ResourceId,
    pub repo_url: String,
    /// Container/VM image reference, empty when the executor doesn't need one.
    pub image: String,
    pub variables: Vec<JobVariable>,
    pub stage_hints: StageHints,
    pub artifacts: Vec<ArtifactDeclaration>,
    pub runner_info: RunnerInfo,
}

/// A single declared variable from the job payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobVariable {
    pub key: String,
    pub value: String,
    /// Whether the value may appear unmasked in a public log.
    pub public: bool,
    /// Whether an executor should materialize this as a file rather than
    /// an environment variable.
    pub file: bool,
}

impl JobVariable {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            public: true,
            file: false,
        }
    }

    pub fn masked(mut self) -> Self {
        self.public = false;
        self
    }

    pub fn as_file(mut self) -> Self {
        self.file = true;
        self
    }
}

/// Which optional stages the job response declares are present, so
/// `StagePlan` construction doesn't have to special-case on stage content.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StageHints {
    pub has_after_script: bool,
    pub has_release_step: bool,
}

/// When an artifact upload stage should run, relative to the pipeline's
/// final outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactWhen {
    OnSuccess,
    OnFailure,
    Always,
}

impl ArtifactWhen {
    /// True if this declaration's upload condition matches the outcome.
    pub fn matches(self, succeeded: bool) -> bool {
        match self {
            ArtifactWhen::Always => true,
            ArtifactWhen::OnSuccess => succeeded,
            ArtifactWhen::OnFailure => !succeeded,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactDeclaration {
    pub name: String,
    pub paths: Vec<String>,
    pub when: ArtifactWhen,
}

/// Runner-supplied information about the job's execution ceiling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RunnerInfo {
    pub timeout_seconds: u64,
}
