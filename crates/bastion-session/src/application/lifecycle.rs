//! Connection lifecycle: the state machine with its keepalive attached.
//!
//! [`Connection`] is the only place that moves a session between states.
//! Every move goes through [`StateMachine`], and after every move the
//! keepalive is reconciled: running if and only if the state is Connected.
//! No caller can start or stop the keepalive on its own, so the two can
//! never disagree.

use std::time::Duration;

use tracing::debug;

use bastion_core::{ConnectionState, ErrorStatus, StateError, StateMachine, Transition};

use super::keepalive::KeepaliveScheduler;

#[derive(Debug)]
pub struct Connection {
    machine: StateMachine,
    keepalive: KeepaliveScheduler,
}

impl Connection {
    pub fn new(keepalive_period: Duration) -> Self {
        Self {
            machine: StateMachine::new(),
            keepalive: KeepaliveScheduler::new(keepalive_period),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.machine.state()
    }

    pub fn failure(&self) -> Option<&ErrorStatus> {
        self.machine.failure()
    }

    pub fn keepalive_active(&self) -> bool {
        self.keepalive.is_active()
    }

    /// # Errors
    ///
    /// [`StateError::Illegal`] when `to` is not a successor of the current
    /// state; nothing changes in that case.
    pub fn transition(&mut self, to: ConnectionState) -> Result<Transition, StateError> {
        let transition = self.machine.transition(to)?;
        self.sync_keepalive();
        Ok(transition)
    }

    /// Records a fatal gateway status and forces Disconnected.  `None` when
    /// the connection already failed or is not live.
    pub fn fail(&mut self, status: ErrorStatus) -> Option<Transition> {
        let transition = self.machine.fail(status)?;
        self.sync_keepalive();
        Some(transition)
    }

    /// Completes when a keepalive is due.  Pending while not Connected.
    pub async fn keepalive_due(&mut self) {
        self.keepalive.tick().await
    }

    fn sync_keepalive(&mut self) {
        if self.machine.state() == ConnectionState::Connected {
            if !self.keepalive.is_active() {
                debug!(period = ?self.keepalive.period(), "keepalive started");
                self.keepalive.start();
            }
        } else if self.keepalive.cancel() {
            debug!("keepalive cancelled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, task};
    use ConnectionState::*;

    fn connection() -> Connection {
        Connection::new(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_keepalive_runs_only_while_connected() {
        // Arrange
        let mut conn = connection();

        // Act / Assert: walk the graphical path
        for (state, expected) in [
            (Connecting, false),
            (Waiting, false),
            (Connected, true),
            (Disconnecting, false),
            (Disconnected, false),
        ] {
            conn.transition(state).unwrap();
            assert_eq!(conn.keepalive_active(), expected, "in {state:?}");
        }
    }

    #[tokio::test]
    async fn test_redundant_connected_keeps_single_keepalive() {
        let mut conn = connection();
        conn.transition(Connecting).unwrap();
        conn.transition(Connected).unwrap();

        let again = conn.transition(Connected).unwrap();

        assert_eq!(again, Transition::Unchanged);
        assert!(conn.keepalive_active());
    }

    #[tokio::test]
    async fn test_illegal_transition_leaves_keepalive_untouched() {
        let mut conn = connection();
        conn.transition(Connecting).unwrap();
        conn.transition(Connected).unwrap();

        let result = conn.transition(Waiting);

        assert!(matches!(result, Err(StateError::Illegal { .. })));
        assert_eq!(conn.state(), Connected);
        assert!(conn.keepalive_active());
    }

    #[tokio::test]
    async fn test_failure_cancels_keepalive() {
        // Arrange
        let mut conn = connection();
        conn.transition(Connecting).unwrap();
        conn.transition(Connected).unwrap();

        // Act
        let transition = conn.fail(ErrorStatus::new(802, None));

        // Assert
        assert!(transition.is_some());
        assert_eq!(conn.state(), Disconnected);
        assert!(!conn.keepalive_active());
        assert!(conn.fail(ErrorStatus::new(800, None)).is_none());
        assert_eq!(conn.failure().map(|s| s.code), Some(802));
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_due_never_fires_after_disconnect() {
        let mut conn = connection();
        conn.transition(Connecting).unwrap();
        conn.transition(Connected).unwrap();
        conn.transition(Disconnected).unwrap();

        let mut due = task::spawn(conn.keepalive_due());
        tokio::time::advance(Duration::from_secs(30)).await;

        assert_pending!(due.poll());
    }
}
