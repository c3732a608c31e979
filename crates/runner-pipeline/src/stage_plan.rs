//! `StagePlan`: the fixed prologue/epilogue plus the job's user stages,
//! each carrying an attempts policy resolved once at construction time
//! so the Pipeline Engine never re-parses a variable mid-loop.

use runner_config::BuildContext;
use runner_core::Result;
use runner_core::job::ArtifactWhen;

/// Identifies one stage in a `StagePlan`. `User` covers both the always
/// present `step_script` and any additional named step the job response
/// declares (`step_release`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StageId {
    GetSources,
    RestoreCache,
    DownloadArtifacts,
    User(String),
    AfterScript,
    ArchiveCache,
    UploadOnSuccessArtifacts,
    UploadOnFailureArtifacts,
}

impl StageId {
    /// The name used both as the `Executor::run` stage label and in
    /// `InvalidAttempt` error messages.
    pub fn as_str(&self) -> &str {
        match self {
            StageId::GetSources => "get_sources",
            StageId::RestoreCache => "restore_cache",
            StageId::DownloadArtifacts => "download_artifacts",
            StageId::User(name) => name,
            StageId::AfterScript => "after_script",
            StageId::ArchiveCache => "archive_cache",
            StageId::UploadOnSuccessArtifacts => "upload_artifacts_on_success",
            StageId::UploadOnFailureArtifacts => "upload_artifacts_on_failure",
        }
    }

    /// Prologue/epilogue stages are `predefined`; job-declared steps are
    /// not.
    pub fn is_predefined(&self) -> bool {
        !matches!(self, StageId::User(_))
    }
}

/// One stage with its attempts policy already resolved.
#[derive(Debug, Clone)]
pub struct PlannedStage {
    pub id: StageId,
    pub attempts: u32,
}

/// The ordered stage sequence for one job: a fixed prologue, the job's
/// own user stages, and one of two epilogue branches chosen at runtime by
/// the pipeline's terminal outcome.
///
/// `Prepare` is deliberately not a member here: it is driven by the
/// prepare-retry loop directly against `ExecutorProvider`/`Executor`
/// before any `StagePlan` stage runs, never through `Executor::run`.
#[derive(Debug, Clone)]
pub struct StagePlan {
    pub prologue: Vec<PlannedStage>,
    pub user: Vec<PlannedStage>,
    pub after_script: Option<PlannedStage>,
    pub archive_cache: PlannedStage,
    pub upload_on_success: Option<PlannedStage>,
    pub upload_on_failure: Option<PlannedStage>,
}

impl StagePlan {
    /// Resolves every stage's attempts policy from `ctx`'s variable set
    /// and lays out the prologue/user/epilogue sequence. Fails only if a
    /// configured attempts variable is out of `[1, 10]`.
    pub fn build(ctx: &BuildContext) -> Result<Self> {
        let prologue = vec![
            PlannedStage {
                attempts: ctx.stage_attempts("GET_SOURCES_ATTEMPTS", "get_sources")?,
                id: StageId::GetSources,
            },
            PlannedStage {
                attempts: ctx.stage_attempts("RESTORE_CACHE_ATTEMPTS", "restore_cache")?,
                id: StageId::RestoreCache,
            },
            PlannedStage {
                attempts: ctx.stage_attempts("ARTIFACT_DOWNLOAD_ATTEMPTS", "download_artifacts")?,
                id: StageId::DownloadArtifacts,
            },
        ];

        let section_attempts = ctx.executor_job_section_attempts()?;

        let mut user = vec![PlannedStage {
            id: StageId::User("step_script".to_string()),
            attempts: section_attempts,
        }];
        if ctx.job.stage_hints.has_release_step {
            user.push(PlannedStage {
                id: StageId::User("step_release".to_string()),
                attempts: section_attempts,
            });
        }

        let after_script = ctx.job.stage_hints.has_after_script.then(|| PlannedStage {
            id: StageId::AfterScript,
            attempts: section_attempts,
        });

        let archive_cache = PlannedStage {
            id: StageId::ArchiveCache,
            attempts: section_attempts,
        };

        let has_artifact_matching = |when: ArtifactWhen| {
            ctx.job
                .artifacts
                .iter()
                .any(|a| a.when == when || a.when == ArtifactWhen::Always)
        };

        let upload_on_success = has_artifact_matching(ArtifactWhen::OnSuccess).then(|| {
            PlannedStage {
                id: StageId::UploadOnSuccessArtifacts,
                attempts: section_attempts,
            }
        });
        let upload_on_failure = has_artifact_matching(ArtifactWhen::OnFailure).then(|| {
            PlannedStage {
                id: StageId::UploadOnFailureArtifacts,
                attempts: section_attempts,
            }
        });

        Ok(Self {
            prologue,
            user,
            after_script,
            archive_cache,
            upload_on_success,
            upload_on_failure,
        })
    }

    /// The epilogue stages to run for a terminal outcome, in order:
    /// `[AfterScript, ArchiveCache, UploadOnSuccessArtifacts]` on
    /// success, `[AfterScript, UploadOnFailureArtifacts]` on failure, each
    /// conditional member included only when present on the plan.
    pub fn epilogue_for(&self, succeeded: bool) -> Vec<&PlannedStage> {
        let mut stages = Vec::new();
        if let Some(after) = &self.after_script {
            stages.push(after);
        }
        if succeeded {
            stages.push(&self.archive_cache);
            if let Some(upload) = &self.upload_on_success {
                stages.push(upload);
            }
        } else if let Some(upload) = &self.upload_on_failure {
            stages.push(upload);
        }
        stages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runner_config::BuildContext;
    use runner_core::ResourceId;
    use runner_core::job::{ArtifactDeclaration, JobResponse, RunnerInfo, StageHints};
    use runner_core::runner_config::{Credentials, RunnerConfig};

    fn ctx_with(job_mutate: impl FnOnce(&mut JobResponse)) -> BuildContext {
        let mut job = JobResponse {
            id: ResourceId::new(),
            project_id: ResourceId::new(),
            repo_url: "https://example/ns/repo".to_string(),
            image: String::new(),
            variables: vec![],
            stage_hints: StageHints::default(),
            artifacts: vec![],
            runner_info: RunnerInfo { timeout_seconds: 3600 },
        };
        job_mutate(&mut job);
        let config = RunnerConfig {
            executor_name: "shell".to_string(),
            clone_url: None,
            debug_trace_disabled: false,
            environment_overrides: vec![],
            runner_token: "tok".to_string(),
            credentials: Credentials::default(),
            custom_build_dir_enabled: false,
            shared_build_dir: false,
            concurrent_id: 0,
        };
        BuildContext::start_build(job, config, "/builds", "/cache").unwrap()
    }

    #[test]
    fn minimal_job_has_only_step_script_and_archive_cache() {
        let ctx = ctx_with(|_| {});
        let plan = StagePlan::build(&ctx).unwrap();
        assert_eq!(plan.user.len(), 1);
        assert_eq!(plan.user[0].id, StageId::User("step_script".to_string()));
        assert!(plan.after_script.is_none());
        assert!(plan.upload_on_success.is_none());
        assert!(plan.upload_on_failure.is_none());
        assert_eq!(plan.epilogue_for(true).len(), 1); // archive_cache only
        assert_eq!(plan.epilogue_for(false).len(), 0);
    }

    #[test]
    fn release_step_and_after_script_hints_are_honored() {
        let ctx = ctx_with(|job| {
            job.stage_hints.has_release_step = true;
            job.stage_hints.has_after_script = true;
        });
        let plan = StagePlan::build(&ctx).unwrap();
        assert_eq!(plan.user.len(), 2);
        assert!(plan.after_script.is_some());
        assert_eq!(plan.epilogue_for(true).len(), 2); // after_script + archive_cache
        assert_eq!(plan.epilogue_for(false).len(), 1); // after_script only
    }

    #[test]
    fn artifact_declarations_gate_upload_stages() {
        let ctx = ctx_with(|job| {
            job.artifacts.push(ArtifactDeclaration {
                name: "logs".to_string(),
                paths: vec!["logs/".to_string()],
                when: ArtifactWhen::OnFailure,
            });
        });
        let plan = StagePlan::build(&ctx).unwrap();
        assert!(plan.upload_on_failure.is_some());
        assert!(plan.upload_on_success.is_none());
        assert_eq!(plan.epilogue_for(false).len(), 1);
        assert_eq!(plan.epilogue_for(true).len(), 1); // archive_cache only, no upload
    }

    #[test]
    fn always_artifact_matches_both_outcomes() {
        let ctx = ctx_with(|job| {
            job.artifacts.push(ArtifactDeclaration {
                name: "report".to_string(),
                paths: vec!["report.xml".to_string()],
                when: ArtifactWhen::Always,
            });
        });
        let plan = StagePlan::build(&ctx).unwrap();
        assert!(plan.upload_on_success.is_some());
        assert!(plan.upload_on_failure.is_some());
    }

    #[test]
    fn out_of_range_attempts_fails_stage_plan_construction() {
        let ctx = ctx_with(|job| {
            job.variables
                .push(runner_core::job::JobVariable::new("GET_SOURCES_ATTEMPTS", "11"));
        });
        let err = StagePlan::build(&ctx).unwrap_err();
        assert_eq!(
            err.to_string(),
            "number of attempts out of the range [1, 10] for stage: get_sources"
        );
    }
}
