//! Stream Session
//!
//! Handle to one in-flight streaming request. The session lifecycle is an
//! explicit state machine rather than ad hoc boolean flags:
//!
//! ```text
//! Idle -> AwaitingFirstByte -> Streaming -> Completed
//!                   |              |------> Cancelled
//!                   |------------------|--> Failed
//! ```
//!
//! Cancellation sets a token observed at the session task's next
//! suspension point (the next awaited chunk read); it never interrupts a
//! chunk already being processed, and no transcript mutation happens
//! after it is acknowledged.

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Lifecycle phase of one streaming session
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SessionPhase {
    /// Created but not yet started
    #[default]
    Idle,
    /// Request issued, no response bytes observed yet
    AwaitingFirstByte,
    /// Response body is being consumed
    Streaming,
    /// Stream finished normally (sentinel or end of byte source)
    Completed,
    /// Cancelled before completion
    Cancelled,
    /// Failed with a transport error (display text attached)
    Failed(String),
}

impl SessionPhase {
    /// Whether the session has reached a terminal phase
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Cancelled | Self::Failed(_)
        )
    }
}

/// Handle to one in-flight stream
///
/// Cheap to clone; all clones observe the same session. Dropping the
/// handle does not cancel the stream.
#[derive(Clone, Debug)]
pub struct StreamSession {
    cancel: CancellationToken,
    phase: watch::Receiver<SessionPhase>,
}

impl StreamSession {
    /// Create a session handle plus the task-side phase publisher
    pub(crate) fn new(cancel: CancellationToken) -> (Self, watch::Sender<SessionPhase>) {
        let (phase_tx, phase_rx) = watch::channel(SessionPhase::Idle);
        (
            Self {
                cancel,
                phase: phase_rx,
            },
            phase_tx,
        )
    }

    /// Request cancellation.
    ///
    /// Idempotent: cancelling twice, or after natural completion, is a
    /// no-op.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Current lifecycle phase
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.phase.borrow().clone()
    }

    /// Whether the session has terminated
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.phase().is_terminal()
    }

    /// Wait until the session reaches a terminal phase
    pub async fn wait(&mut self) -> SessionPhase {
        while !self.phase.borrow().is_terminal() {
            if self.phase.changed().await.is_err() {
                break;
            }
        }
        self.phase.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_phases() {
        assert!(!SessionPhase::Idle.is_terminal());
        assert!(!SessionPhase::AwaitingFirstByte.is_terminal());
        assert!(!SessionPhase::Streaming.is_terminal());
        assert!(SessionPhase::Completed.is_terminal());
        assert!(SessionPhase::Cancelled.is_terminal());
        assert!(SessionPhase::Failed("boom".to_string()).is_terminal());
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let token = CancellationToken::new();
        let (session, phase_tx) = StreamSession::new(token.clone());

        session.cancel();
        session.cancel();
        assert!(token.is_cancelled());

        let _ = phase_tx.send(SessionPhase::Cancelled);
        assert!(session.is_finished());
        // Cancelling after termination is still a no-op.
        session.cancel();
        assert_eq!(session.phase(), SessionPhase::Cancelled);
    }

    #[tokio::test]
    async fn test_wait_observes_terminal_phase() {
        let (mut session, phase_tx) = StreamSession::new(CancellationToken::new());

        tokio::spawn(async move {
            let _ = phase_tx.send(SessionPhase::AwaitingFirstByte);
            let _ = phase_tx.send(SessionPhase::Streaming);
            let _ = phase_tx.send(SessionPhase::Completed);
        });

        assert_eq!(session.wait().await, SessionPhase::Completed);
    }
}
