//! `RetryRunner`: the bounded retry loop shared by executor preparation
//! and individual stages. Retry semantics: retry iff the error is
//! retryable AND the cancellation token has not fired; the returned
//! error is always the error of the last attempt.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use runner_core::error::CancellationCause;
use runner_core::{Error, Result};

/// Fixed-attempt, fixed-delay policy for `Executor::prepare`: up to
/// `max_attempts` tries with a constant `interval` between them. An
/// attempt returning a non-retryable error short-circuits immediately.
#[derive(Debug, Clone, Copy)]
pub struct PreparePolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl PreparePolicy {
    /// The default policy: 3 attempts. `interval` is the globally
    /// configurable `PreparationRetryInterval`; test code sets it to
    /// zero so retry tests don't sleep wall-clock time.
    pub fn new(interval: Duration) -> Self {
        Self {
            max_attempts: 3,
            interval,
        }
    }
}

impl Default for PreparePolicy {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

/// Runs `attempt` up to `policy.max_attempts` times, retrying only on a
/// retryable error observed before `cancel` fires, sleeping
/// `policy.interval` between attempts. Driven by the Pipeline Engine's
/// prepare phase, which has `attempt` create a fresh `Executor` for each
/// retry (unlike stage retry, which re-runs the same executor) — this
/// function only owns the looping and backoff, not the executor
/// lifecycle. Any cancellation is surfaced as a generic
/// `CancellationCause::JobCanceled`; callers that track a more specific
/// cause should replace it with their own.
pub async fn run_prepare<F, Fut>(
    policy: PreparePolicy,
    cancel: &CancellationToken,
    mut attempt: F,
) -> Result<()>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut last_err = None;
    for attempt_no in 1..=policy.max_attempts {
        if cancel.is_cancelled() {
            return Err(cancelled_error(cancel));
        }

        match attempt(attempt_no).await {
            Ok(()) => return Ok(()),
            Err(err) if err.is_retryable() && attempt_no < policy.max_attempts => {
                tracing::warn!(attempt = attempt_no, error = %err, "prepare failed, retrying");
                last_err = Some(err);
                if !policy.interval.is_zero() {
                    tokio::select! {
                        _ = tokio::time::sleep(policy.interval) => {}
                        _ = cancel.cancelled() => return Err(cancelled_error(cancel)),
                    }
                }
            }
            Err(err) => return Err(err),
        }
    }
    Err(last_err.expect("loop always attempts at least once"))
}

/// Runs `attempt` up to `attempts` times for a single stage, retrying
/// only on a retryable error observed before `cancel` fires. Unlike
/// `run_prepare`, the same executor call is repeated; there is no
/// inter-attempt delay for stages.
pub async fn run_stage<F, Fut>(
    attempts: u32,
    stage_label: &str,
    cancel: &CancellationToken,
    mut attempt: F,
) -> Result<()>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut last_err = None;
    for attempt_no in 1..=attempts {
        if cancel.is_cancelled() {
            return Err(cancelled_error(cancel));
        }

        match attempt(attempt_no).await {
            Ok(()) => return Ok(()),
            Err(err) if err.is_retryable() && attempt_no < attempts && !cancel.is_cancelled() => {
                tracing::warn!(
                    stage = stage_label,
                    attempt = attempt_no,
                    error = %err,
                    "stage failed, retrying"
                );
                last_err = Some(err);
            }
            Err(err) => return Err(err),
        }
    }
    Err(last_err.expect("loop always attempts at least once"))
}

fn cancelled_error(cancel: &CancellationToken) -> Error {
    let _ = cancel;
    Error::Cancelled(CancellationCause::JobCanceled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn run_prepare_retries_retryable_errors_until_success() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let result = run_prepare(PreparePolicy::new(Duration::ZERO), &cancel, |n| {
            let calls = &calls;
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                if n < 3 {
                    Err(Error::PrepareRetryable("transient".into()))
                } else {
                    Ok(())
                }
            }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn run_prepare_short_circuits_on_non_retryable_error() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let result = run_prepare(PreparePolicy::new(Duration::ZERO), &cancel, |_| {
            let calls = &calls;
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::build("bad script", runner_core::FailureReason::ScriptFailure))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn run_prepare_exhausts_attempts_and_returns_last_error() {
        let cancel = CancellationToken::new();
        let result = run_prepare(PreparePolicy::new(Duration::ZERO), &cancel, |n| async move {
            Err(Error::PrepareRetryable(format!("attempt {n}")))
        })
        .await;
        assert_eq!(result.unwrap_err().to_string(), "prepare failed: attempt 3");
    }

    #[tokio::test]
    async fn run_stage_honors_per_stage_attempts_cap() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let result = run_stage(2, "get_sources", &cancel, |_| {
            let calls = &calls;
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::StageRetryable("flaky".into()))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn run_stage_does_not_retry_once_cancelled() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = run_stage(5, "get_sources", &cancel, |_| {
            let calls = &calls;
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;
        assert!(matches!(result, Err(Error::Cancelled(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
