//! `TerminalGate`: waits on an interactive session until one of {job
//! cancel, session timeout, system signal, peer disconnect}, then closes
//! the session exactly once.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use runner_core::Error;
use runner_core::error::FailureReason;
use runner_core::terminal::InteractiveSession;

/// Blocks until one of its four sources fires, then closes `session`
/// exactly once before returning. `ctx` is normally the main pipeline's
/// `CancellationHub` token, so a job cancel (from any of its own four
/// sources) also tears down an attached terminal.
pub async fn wait_for_terminal(
    ctx: CancellationToken,
    timeout: Duration,
    system_signal: impl Future<Output = String> + Send,
    session: &dyn InteractiveSession,
) -> Result<(), Error> {
    let result = tokio::select! {
        _ = ctx.cancelled() => Err(Error::build(
            "build cancelled, killing session",
            FailureReason::JobCanceled,
        )),
        _ = tokio::time::sleep(timeout) => Err(Error::build(
            format!("terminal session timed out (maximum time allowed - {timeout:?})"),
            FailureReason::JobExecutionTimeout,
        )),
        signal = system_signal => Err(Error::build(
            format!("terminal disconnected by system signal: {signal}"),
            FailureReason::RunnerSystemFailure,
        )),
        err = session.disconnected() => Err(Error::build(
            format!("terminal disconnected: {err}"),
            FailureReason::UnknownFailure,
        )),
    };
    session.close().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::pending;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    #[derive(Default)]
    struct TestSession {
        closes: AtomicU32,
    }

    #[async_trait]
    impl InteractiveSession for TestSession {
        async fn disconnected(&self) -> String {
            pending().await
        }

        async fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn ctx_cancel_produces_killing_session_message() {
        let ctx = CancellationToken::new();
        ctx.cancel();
        let session = TestSession::default();
        let err = wait_for_terminal(ctx, Duration::from_secs(60), pending(), &session)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "build error: build cancelled, killing session");
        assert_eq!(session.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn session_timeout_produces_timed_out_message() {
        let ctx = CancellationToken::new();
        let session = TestSession::default();
        let handle = tokio::spawn(async move {
            wait_for_terminal(ctx, Duration::from_secs(1), pending(), &session).await
        });
        tokio::time::advance(Duration::from_secs(2)).await;
        // `handle` owns `session`, so assert on the error text alone here.
        let err = handle.await.unwrap().unwrap_err();
        assert_eq!(
            err.to_string(),
            "build error: terminal session timed out (maximum time allowed - 1s)"
        );
    }

    #[tokio::test]
    async fn system_signal_message_includes_signal_name() {
        let ctx = CancellationToken::new();
        let session = TestSession::default();
        let err = wait_for_terminal(ctx, Duration::from_secs(60), async { "SIGTERM".to_string() }, &session)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "build error: terminal disconnected by system signal: SIGTERM"
        );
    }
}
