//! Per-session connection lifecycle.
//!
//! # States (for beginners)
//!
//! ```text
//!  Idle ──► Connecting ──► Waiting ──► Connected ──► Disconnecting ──► Disconnected
//!              │  │           │  ▲         │                               ▲
//!              │  └───────────┼──┘         └───────────────────────────────┤
//!              └──────────────┴────────────── transport error ─────────────┘
//! ```
//!
//! - `Idle`: adapter constructed, transport not opened yet.
//! - `Connecting`: transport handshake in flight.
//! - `Waiting`: transport open, waiting for the first application-level
//!   acknowledgment (graphical sessions only; terminal sessions go from
//!   `Connecting` straight to `Connected`).
//! - `Connected`: application traffic is flowing.
//! - `Disconnecting`: a graceful close was started by either side.
//! - `Disconnected`: terminal.  There is no resume; retrying means creating
//!   a brand-new session.
//!
//! A transition to the current state is reported as
//! [`Transition::Unchanged`] rather than an error, because the remote may
//! acknowledge a connection more than once.

use thiserror::Error;

use crate::domain::status::ErrorStatus;

/// Lifecycle state of one session's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Waiting,
    Connected,
    Disconnecting,
    Disconnected,
}

impl ConnectionState {
    /// States reachable in one step from `self`.
    pub fn successors(self) -> &'static [ConnectionState] {
        use ConnectionState::*;
        match self {
            Idle => &[Connecting],
            Connecting => &[Waiting, Connected, Disconnecting, Disconnected],
            Waiting => &[Connected, Disconnecting, Disconnected],
            Connected => &[Disconnecting, Disconnected],
            Disconnecting => &[Disconnected],
            Disconnected => &[],
        }
    }

    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        self.successors().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        self == ConnectionState::Disconnected
    }

    /// `true` once the transport has been asked to open and until it is gone.
    pub fn is_live(self) -> bool {
        !matches!(self, ConnectionState::Idle | ConnectionState::Disconnected)
    }
}

/// Outcome of a successful [`StateMachine::transition`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Changed {
        from: ConnectionState,
        to: ConnectionState,
    },
    /// The machine was already in the requested state.
    Unchanged,
}

impl Transition {
    /// Returns `true` if this transition entered `state`.
    pub fn entered(&self, state: ConnectionState) -> bool {
        matches!(self, Transition::Changed { to, .. } if *to == state)
    }

    /// Returns `true` if this transition left `state`.
    pub fn left(&self, state: ConnectionState) -> bool {
        matches!(self, Transition::Changed { from, .. } if *from == state)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("illegal connection transition {from:?} -> {to:?}")]
    Illegal {
        from: ConnectionState,
        to: ConnectionState,
    },
}

/// Enforces the transition table and records the (single) gateway failure.
#[derive(Debug, Clone)]
pub struct StateMachine {
    state: ConnectionState,
    failure: Option<ErrorStatus>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Idle,
            failure: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The gateway status that ended this connection, if any.
    pub fn failure(&self) -> Option<&ErrorStatus> {
        self.failure.as_ref()
    }

    /// Moves to `to` if the transition table allows it.
    ///
    /// # Errors
    ///
    /// [`StateError::Illegal`] if `to` is not a successor of the current
    /// state.  The machine is left unchanged.
    pub fn transition(&mut self, to: ConnectionState) -> Result<Transition, StateError> {
        let from = self.state;
        if from == to {
            return Ok(Transition::Unchanged);
        }
        if !from.can_transition_to(to) {
            return Err(StateError::Illegal { from, to });
        }
        self.state = to;
        Ok(Transition::Changed { from, to })
    }

    /// Records a gateway failure and forces the machine to `Disconnected`.
    ///
    /// Only the first failure of a connection is recorded; later calls, or a
    /// call on an already disconnected machine, return `None` and change
    /// nothing.
    pub fn fail(&mut self, status: ErrorStatus) -> Option<Transition> {
        if self.failure.is_some() || self.state.is_terminal() || self.state == ConnectionState::Idle
        {
            return None;
        }
        let from = self.state;
        self.failure = Some(status);
        self.state = ConnectionState::Disconnected;
        Some(Transition::Changed {
            from,
            to: ConnectionState::Disconnected,
        })
    }
}
