//! bastion-session library crate.
//!
//! Runs remote sessions through a bastion host: one [`SessionHandle`] per
//! session, and a [`FanOutCoordinator`] to drive many terminal sessions
//! from one input.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! caller (CLI, UI)
//!         ↕
//! [bastion-session]
//!   ├── domain/           SessionConfig, geometry, SessionEvent
//!   ├── application/      session actor, keepalive, resize, clipboard, fan-out
//!   └── infrastructure/
//!         ├── api/        REST collaborator (reqwest)
//!         ├── transport/  WebSocket client (tokio-tungstenite)
//!         └── adapter     terminal / display output
//!         ↕
//! [bastion-core]          wire codecs, state machine, error taxonomy
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` talks to the network and backend only through the
//!   `SessionApi` and `Connector` traits, so tests can swap in in-memory
//!   implementations.
//! - `infrastructure` holds the real implementations of those traits.

/// Domain layer: configuration and event types (no I/O).
pub mod domain;

/// Application layer: session lifecycle and fan-out.
pub mod application;

/// Infrastructure layer: REST client, transports, adapters, config file.
pub mod infrastructure;

pub use application::{
    BroadcastReport, FanOutCoordinator, FanOutError, SessionContext, SessionError, SessionHandle,
    SessionRequest,
};
pub use domain::{GroupEvent, SessionConfig, SessionEvent, SessionFailure, Viewport};
