//! `BuildContext` and `StartBuild`: turns a job response and runner config
//! into a sealed `VariableSet` plus the three directories every later
//! stage reads from.

use runner_core::job::JobResponse;
use runner_core::runner_config::RunnerConfig;
use runner_core::{Error, Result as CoreResult};

use crate::error::{ConfigError, ConfigResult};
use crate::variables::VariableSet;

/// The repo checkout, cache mount, and parent directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildDirs {
    pub root_dir: String,
    pub build_dir: String,
    pub cache_dir: String,
}

/// Immutable-after-start job descriptor: the sealed variable set plus the
/// directories and flags every pipeline stage reads from.
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub job: JobResponse,
    pub config: RunnerConfig,
    pub variables: VariableSet,
    pub dirs: BuildDirs,
}

impl BuildContext {
    /// Derives `BuildDir`/`CacheDir`/`RootDir`, appends the synthetic
    /// variables, and seals the result. Fails on an empty
    /// `root_dir`/`cache_dir`, a `GIT_CLONE_PATH` that the config doesn't
    /// allow, or one that escapes `CI_BUILDS_DIR`.
    pub fn start_build(
        job: JobResponse,
        config: RunnerConfig,
        root_dir: &str,
        cache_dir: &str,
    ) -> ConfigResult<Self> {
        if root_dir.is_empty() {
            return Err(ConfigError::EmptyRootDir);
        }
        if cache_dir.is_empty() {
            return Err(ConfigError::EmptyCacheDir);
        }

        let mut variables = VariableSet::new();
        for var in &job.variables {
            variables.append(var.clone());
        }
        for (key, value) in &config.environment_overrides {
            variables.append_value(key.clone(), value.clone());
        }

        let (namespace, repo) = split_repo_path(&job.repo_url);
        let project_path = format!("{namespace}/{repo}");

        let build_dir = if variables.contains("GIT_CLONE_PATH") {
            if !config.custom_build_dir_enabled {
                return Err(ConfigError::CustomBuildDirNotAllowed);
            }
            let expanded = variables.expand(&variables.get("GIT_CLONE_PATH"));
            if !is_descendant(&expanded, root_dir) {
                return Err(ConfigError::GitClonePathOutsideBuildsDir {
                    path: expanded,
                    builds_dir: root_dir.to_string(),
                });
            }
            expanded
        } else if config.shared_build_dir {
            format!(
                "{root_dir}/{}/{}/{namespace}/{repo}",
                runner_short_token(&config.runner_token),
                config.concurrent_id,
            )
        } else {
            format!("{root_dir}/{namespace}/{repo}")
        };

        variables.append_value("CI_PROJECT_DIR", build_dir.clone());
        variables.append_value("CI_PROJECT_PATH", project_path);
        variables.append_value("CI_SERVER", "yes");
        if !job.image.is_empty() {
            variables.append_value("CI_JOB_IMAGE", job.image.clone());
        }
        variables.append_value("CI_BUILDS_DIR", root_dir.to_string());
        if config.shared_build_dir {
            variables.append_value("CI_SHARED_ENVIRONMENT", "true");
        } else {
            variables.append_value("CI_DISPOSABLE_ENVIRONMENT", "true");
        }

        let dirs = BuildDirs {
            root_dir: root_dir.to_string(),
            build_dir,
            cache_dir: cache_dir.to_string(),
        };

        Ok(Self {
            job,
            config,
            variables,
            dirs,
        })
    }

    /// Parses a boolean-ish flag value: `true|1` => true, `false|0|""` =>
    /// false, anything else => false plus a log warning. Reads job
    /// variables first, then runner environment overrides, so an override
    /// takes precedence over a job-declared value.
    pub fn is_feature_flag_on(&self, name: &str) -> bool {
        match self.variables.get(name).as_str() {
            "true" | "1" => true,
            "false" | "0" | "" => false,
            other => {
                tracing::warn!(
                    flag = name,
                    value = other,
                    "unrecognized feature flag value, treating as disabled"
                );
                false
            }
        }
    }

    /// AND of the `CI_DEBUG_TRACE` flag and `!DebugTraceDisabled`.
    pub fn is_debug_trace_enabled(&self) -> bool {
        self.is_feature_flag_on("CI_DEBUG_TRACE") && !self.config.debug_trace_disabled
    }

    /// User-visible line for the job's own trace when the runner
    /// configuration vetoes a job-requested debug trace.
    pub fn debug_trace_disabled_message(&self) -> Option<&'static str> {
        if self.is_feature_flag_on("CI_DEBUG_TRACE") && self.config.debug_trace_disabled {
            Some("CI_DEBUG_TRACE is enabled by variables, but the runner configuration disables it")
        } else {
            None
        }
    }

    pub fn is_lfs_smudge_disabled(&self) -> bool {
        self.is_feature_flag_on("GIT_LFS_SKIP_SMUDGE")
    }

    /// `GIT_CLONE_PATH`-aware remote URL, with `gitlab-ci-token`/
    /// `$CI_JOB_TOKEN` injected into the userinfo when `CloneURL` is
    /// configured; otherwise the job response's repo URL verbatim.
    pub fn get_remote_url(&self) -> String {
        let Some(clone_url) = &self.config.clone_url else {
            return self.job.repo_url.clone();
        };
        let project_path = self.variables.get("CI_PROJECT_PATH");
        let token = self.variables.get("CI_JOB_TOKEN");
        let raw = format!("{}/{project_path}.git", clone_url.trim_end_matches('/'));

        match url::Url::parse(&raw) {
            Ok(mut url) => {
                let _ = url.set_username("gitlab-ci-token");
                let _ = url.set_password(Some(&token));
                url.to_string()
            }
            Err(_) => raw,
        }
    }

    /// `runner-<8-char token fingerprint>-project-<id>-concurrent-<id>`,
    /// truncated to the 63-char DNS-label bound.
    pub fn project_unique_name(&self) -> String {
        let name = format!(
            "runner-{}-project-{}-concurrent-{}",
            runner_short_token(&self.config.runner_token),
            self.job.project_id,
            self.config.concurrent_id,
        );
        name.chars().take(63).collect()
    }

    pub fn git_clean_flags(&self) -> Vec<String> {
        match self.variables.get("GIT_CLEAN_FLAGS").as_str() {
            "" => vec!["-ffdx".to_string()],
            "none" => vec![],
            other => other.split_whitespace().map(str::to_string).collect(),
        }
    }

    pub fn git_fetch_flags(&self) -> Vec<String> {
        match self.variables.get("GIT_FETCH_EXTRA_FLAGS").as_str() {
            "" => vec!["--prune".to_string(), "--quiet".to_string()],
            "none" => vec![],
            other => other.split_whitespace().map(str::to_string).collect(),
        }
    }

    /// Attempts configured for `variable`, clamped to `[1, 10]`. Empty
    /// means 1 attempt; out of range is `Error::InvalidAttempt`, named
    /// after `stage_label` in the error message.
    pub fn stage_attempts(&self, variable: &str, stage_label: &str) -> CoreResult<u32> {
        let raw = self.variables.get(variable);
        if raw.is_empty() {
            return Ok(1);
        }
        match raw.trim().parse::<i64>() {
            Ok(n) if (1..=10).contains(&n) => Ok(n as u32),
            _ => Err(Error::InvalidAttempt {
                stage: stage_label.to_string(),
            }),
        }
    }

    pub fn executor_job_section_attempts(&self) -> CoreResult<u32> {
        self.stage_attempts("EXECUTOR_JOB_SECTION_ATTEMPTS", "executor_job_section")
    }
}

/// `true` if `path` is `root` or a path-component descendant of it.
/// Uses `Path::starts_with`, which compares whole components rather than
/// byte prefixes, so `/builds2` is correctly not a descendant of
/// `/builds`.
fn is_descendant(path: &str, root: &str) -> bool {
    std::path::Path::new(path).starts_with(std::path::Path::new(root))
}

/// First 8 raw characters of `token`, lowercased, with non-alphanumeric
/// characters dropped rather than replaced.
fn runner_short_token(token: &str) -> String {
    token
        .chars()
        .take(8)
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Splits a repo URL's final two path segments into `(namespace, repo)`,
/// stripping a trailing `.git`.
fn split_repo_path(repo_url: &str) -> (String, String) {
    let trimmed = repo_url.trim_end_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
    let mut parts = trimmed.rsplitn(3, '/');
    let repo = parts.next().unwrap_or("project").to_string();
    let namespace = parts.next().unwrap_or("namespace").to_string();
    (namespace, repo)
}
