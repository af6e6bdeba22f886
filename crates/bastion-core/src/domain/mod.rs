//! Domain entities shared by every session: identity, lifecycle, gateway
//! status codes and clipboard values.
//!
//! Nothing in this module performs I/O.

pub mod clipboard;
pub mod session;
pub mod state;
pub mod status;

pub use clipboard::{ClipboardData, ClipboardPayload, ClipboardPolicy};
pub use session::{
    AssetId, ExecutionMode, ProtocolFamily, RemoteProtocol, Session, SessionId, SessionRole,
};
pub use state::{ConnectionState, StateError, StateMachine, Transition};
pub use status::{ErrorCategory, ErrorStatus};
