//! # bastion-core
//!
//! Shared, I/O-free foundation for the bastion remote-session transport:
//! wire codecs, the per-session connection state machine and the display
//! gateway's error taxonomy.
//!
//! # Architecture overview
//!
//! A bastion (jump host) relays every remote session through a persistent
//! duplex transport.  Two families of sessions exist:
//!
//! - **Terminal-family** sessions (shell access) exchange small text frames
//!   of the form `<digit><content>`.  See [`protocol::codec`].
//! - **Graphical-family** sessions (remote desktop) go through a display
//!   gateway whose control plane uses length-prefixed instructions.  See
//!   [`protocol::instruction`].  The gateway reports failures with a fixed
//!   numeric status vocabulary, mapped to user-facing categories by
//!   [`domain::status`].
//!
//! Both families share one lifecycle, [`domain::state::ConnectionState`],
//! enforced by [`domain::state::StateMachine`].
//!
//! Nothing in this crate opens sockets, spawns tasks or reads the clock; the
//! `bastion-session` crate drives these types from its event loop.

pub mod domain;
pub mod protocol;

pub use domain::clipboard::{ClipboardData, ClipboardPayload, ClipboardPolicy};
pub use domain::session::{
    AssetId, ExecutionMode, ProtocolFamily, RemoteProtocol, Session, SessionId, SessionRole,
};
pub use domain::state::{ConnectionState, StateError, StateMachine, Transition};
pub use domain::status::{ErrorCategory, ErrorStatus};
pub use protocol::codec::{decode_message, encode_message, Message, MessageType, ProtocolError};
pub use protocol::instruction::{decode_instructions, encode_instruction, Instruction};
pub use protocol::resize::ResizePayload;
