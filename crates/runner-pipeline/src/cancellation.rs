//! `CancellationHub`: multiplexes `Deadline`, `UserCancel`, `SystemSignal`
//! and `TerminalDisconnect` into one cancellation token with a classified
//! cause. Whichever source fires first wins; the rest are ignored —
//! modeled as one hub owning a single token rather than ad-hoc
//! close-once code per source.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use runner_core::error::CancellationCause;
use runner_core::executor::Trace;

/// The job's effective deadline: `min(job timeout, config-provided
/// execution ceiling)`.
pub fn effective_deadline(job_timeout: Duration, ceiling: Option<Duration>) -> Duration {
    match ceiling {
        Some(ceiling) => job_timeout.min(ceiling),
        None => job_timeout,
    }
}

pub struct CancellationHub {
    token: CancellationToken,
    cause: Mutex<Option<CancellationCause>>,
}

impl CancellationHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            token: CancellationToken::new(),
            cause: Mutex::new(None),
        })
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// The cause recorded by whichever source fired first, if any.
    pub fn cause(&self) -> Option<CancellationCause> {
        *self.cause.lock().unwrap()
    }

    /// Records `cause` and cancels the token, unless a source already
    /// fired first.
    pub fn fire(&self, cause: CancellationCause) {
        let mut guard = self.cause.lock().unwrap();
        if guard.is_none() {
            tracing::warn!(?cause, "cancellation hub fired");
            *guard = Some(cause);
            self.token.cancel();
        }
    }

    /// Wires the `UserCancel` source by registering a cancel callback on
    /// `trace`, so an external cancel request can fire the hub.
    pub fn watch_user_cancel(self: &Arc<Self>, trace: &Arc<dyn Trace>) {
        let hub = self.clone();
        trace.set_cancel_func(Box::new(move || hub.fire(CancellationCause::JobCanceled)));
    }

    /// Spawns the supervisory task multiplexing `Deadline` and
    /// `SystemSignal`. `system_signal` is a host-supplied one-shot
    /// future — this hub never listens for OS signals itself.
    pub fn spawn_watchers(
        self: &Arc<Self>,
        deadline: Duration,
        system_signal: impl Future<Output = ()> + Send + 'static,
    ) -> JoinHandle<()> {
        let hub = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(deadline) => hub.fire(CancellationCause::JobExecutionTimeout),
                _ = system_signal => hub.fire(CancellationCause::RunnerSystemFailure),
                _ = hub.token.cancelled() => {}
            }
        })
    }

    /// Wires `TerminalDisconnect` (terminal mode only): `disconnect`
    /// resolves once the interactive session's disconnect channel yields
    /// an error description.
    pub fn spawn_terminal_watcher(
        self: &Arc<Self>,
        disconnect: impl Future<Output = String> + Send + 'static,
    ) -> JoinHandle<()> {
        let hub = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = disconnect => hub.fire(CancellationCause::ScriptFailure),
                _ = hub.token.cancelled() => {}
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::pending;

    #[test]
    fn effective_deadline_takes_the_minimum() {
        assert_eq!(
            effective_deadline(Duration::from_secs(3600), Some(Duration::from_secs(60))),
            Duration::from_secs(60)
        );
        assert_eq!(
            effective_deadline(Duration::from_secs(30), Some(Duration::from_secs(60))),
            Duration::from_secs(30)
        );
        assert_eq!(effective_deadline(Duration::from_secs(30), None), Duration::from_secs(30));
    }

    #[test]
    fn first_fire_wins_subsequent_sources_are_ignored() {
        let hub = CancellationHub::new();
        hub.fire(CancellationCause::JobExecutionTimeout);
        hub.fire(CancellationCause::JobCanceled);
        assert_eq!(hub.cause(), Some(CancellationCause::JobExecutionTimeout));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_fires_job_execution_timeout() {
        let hub = CancellationHub::new();
        let handle = hub.spawn_watchers(Duration::from_secs(5), pending());
        tokio::time::advance(Duration::from_secs(6)).await;
        handle.await.unwrap();
        assert_eq!(hub.cause(), Some(CancellationCause::JobExecutionTimeout));
        assert!(hub.token().is_cancelled());
    }

    #[tokio::test]
    async fn system_signal_fires_runner_system_failure() {
        let hub = CancellationHub::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let handle = hub.spawn_watchers(Duration::from_secs(3600), async move {
            let _ = rx.await;
        });
        tx.send(()).unwrap();
        handle.await.unwrap();
        assert_eq!(hub.cause(), Some(CancellationCause::RunnerSystemFailure));
    }

    #[tokio::test]
    async fn terminal_disconnect_fires_script_failure_cause() {
        let hub = CancellationHub::new();
        let handle = hub.spawn_terminal_watcher(async { "peer hung up".to_string() });
        handle.await.unwrap();
        assert_eq!(hub.cause(), Some(CancellationCause::ScriptFailure));
    }
}
