//! The interactive-session transport consumed by `TerminalGate` but never
//! implemented here — concrete transports (a websocket relay, an
//! exec-over-SSH session, ...) live outside this workspace.

use async_trait::async_trait;

/// A live interactive shell attached to a running job over some
/// bidirectional stream. `TerminalGate` drives this down to exactly one
/// `close` call regardless of which cancellation source fired first.
#[async_trait]
pub trait InteractiveSession: Send + Sync {
    /// Resolves with a description of the disconnect once the peer goes
    /// away. Never resolves if the peer stays connected.
    async fn disconnected(&self) -> String;

    /// Closes the session. Idempotent from the caller's perspective:
    /// `TerminalGate` calls this exactly once, but a conforming
    /// implementation should tolerate being called from elsewhere too.
    async fn close(&self);
}
