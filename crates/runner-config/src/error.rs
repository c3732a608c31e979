//! Errors raised while deriving a `BuildContext` from a job and runner
//! configuration.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("GIT_CLONE_PATH is set but the runner does not allow a custom build directory")]
    CustomBuildDirNotAllowed,

    #[error("GIT_CLONE_PATH `{path}` is not a descendant of CI_BUILDS_DIR `{builds_dir}`")]
    GitClonePathOutsideBuildsDir { path: String, builds_dir: String },

    #[error("root directory must not be empty")]
    EmptyRootDir,

    #[error("cache directory must not be empty")]
    EmptyCacheDir,
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
