//! Session phase tracking

use tokio::sync::watch;
use tracing::debug;

/// Phases a subscriber session moves through, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionPhase {
    Starting,
    Started,
    Terminated,
}

/// Forward-only phase tracker shared between handlers and the polling loop.
///
/// Phases only ever move towards `Terminated`. A late status message cannot
/// move a terminated session back to an earlier phase.
pub struct Lifecycle {
    tx: watch::Sender<SessionPhase>,
}

impl Lifecycle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionPhase::Starting);
        Self { tx }
    }

    pub fn phase(&self) -> SessionPhase {
        *self.tx.borrow()
    }

    pub fn is_terminated(&self) -> bool {
        self.phase() == SessionPhase::Terminated
    }

    /// Advances to `phase` if it is later than the current one and reports
    /// whether anything changed.
    pub fn advance(&self, phase: SessionPhase) -> bool {
        self.tx.send_if_modified(|current| {
            if phase > *current {
                debug!(from = ?*current, to = ?phase, "session phase advanced");
                *current = phase;
                true
            } else {
                false
            }
        })
    }

    /// Resolves once the session reaches `Terminated`.
    pub async fn terminated(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so wait_for can only fail after this
        // borrow is gone.
        let _ = rx.wait_for(|phase| *phase == SessionPhase::Terminated).await;
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
