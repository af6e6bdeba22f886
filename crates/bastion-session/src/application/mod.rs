//! Application layer: session behaviour built on the core types.
//!
//! | Module       | Responsibility                                          |
//! |--------------|---------------------------------------------------------|
//! | `keepalive`  | periodic keepalive timer                                |
//! | `lifecycle`  | state machine with the keepalive attached               |
//! | `resize`     | viewport changes → resize messages                      |
//! | `clipboard`  | clipboard streams for graphical sessions                |
//! | `session`    | the per-session actor and its handle                    |
//! | `fanout`     | groups of sessions driven by one input                  |

pub mod clipboard;
pub mod fanout;
pub mod keepalive;
pub mod lifecycle;
pub mod resize;
pub mod session;

pub use clipboard::{
    ClipboardBridge, ClipboardDirection, ClipboardError, InboundOutcome, BLOB_CHUNK_BYTES,
};
pub use fanout::{BroadcastReport, FanOutCoordinator, FanOutError, LaunchReport, MemberStatus};
pub use keepalive::KeepaliveScheduler;
pub use lifecycle::Connection;
pub use resize::{ResizeAction, ResizeSynchronizer};
pub use session::{SessionContext, SessionError, SessionHandle, SessionRequest};
