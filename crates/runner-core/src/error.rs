//! Error taxonomy for the build orchestration core.
//!
//! `BuildError`, `PrepareRetryable`, `StageRetryable` and `InvalidAttempt`
//! are all represented as variants of [`Error`]; `SkipBuildStage` is
//! deliberately kept as its own type rather than a variant, since it is a
//! control-flow sentinel the pipeline peeks at before calling
//! `Executor::run`, never a failure.

use thiserror::Error;

/// Why a job ended the way it did, attached to [`Error::Build`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    ScriptFailure,
    JobExecutionTimeout,
    RunnerSystemFailure,
    JobCanceled,
    UnknownFailure,
}

/// The cause a cancellation hub attaches to a fired cancellation token.
/// Whichever source fires first wins; the rest are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancellationCause {
    JobExecutionTimeout,
    JobCanceled,
    RunnerSystemFailure,
    ScriptFailure,
}

impl CancellationCause {
    pub fn as_failure_reason(self) -> FailureReason {
        match self {
            CancellationCause::JobExecutionTimeout => FailureReason::JobExecutionTimeout,
            CancellationCause::JobCanceled => FailureReason::JobCanceled,
            CancellationCause::RunnerSystemFailure => FailureReason::RunnerSystemFailure,
            CancellationCause::ScriptFailure => FailureReason::ScriptFailure,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The executed script, or the executor itself, failed in a way
    /// attributable to the job. Never retried by the prepare loop.
    #[error("build error: {message}")]
    Build {
        message: String,
        reason: FailureReason,
    },

    /// Transient executor setup failure. Retried by the prepare policy.
    #[error("prepare failed: {0}")]
    PrepareRetryable(String),

    /// Stage-level failure, retried per the stage's own attempts policy.
    #[error("stage failed: {0}")]
    StageRetryable(String),

    /// Attempts configured outside `[1, 10]`. Fatal, never retried.
    #[error("number of attempts out of the range [1, 10] for stage: {stage}")]
    InvalidAttempt { stage: String },

    /// The whole pipeline observed a cancellation.
    #[error("cancelled: {0:?}")]
    Cancelled(CancellationCause),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether a retry loop should retry this error, provided the
    /// cancellation token has not fired.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::PrepareRetryable(_) | Error::StageRetryable(_))
    }

    pub fn build(message: impl Into<String>, reason: FailureReason) -> Self {
        Error::Build {
            message: message.into(),
            reason,
        }
    }
}

/// Control-flow sentinel returned by a script generator to say "there is
/// nothing to run for this stage". Distinct from [`Error`] on purpose: a
/// skip is never a failure, so it can't unify with the retryable-error
/// predicate above.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkipBuildStage;

pub type Result<T> = std::result::Result<T, Error>;
