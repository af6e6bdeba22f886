//! Domain layer for bastion-session.
//!
//! Pure value types shared by the application and infrastructure layers:
//! session configuration, viewport geometry and the events a session emits.
//! No I/O, no async.

pub mod config;
pub mod events;

pub use config::{
    ConsoleConfig, DisplayGeometry, LogSection, ServerSection, SessionConfig, SessionSection,
    TerminalGeometry, Viewport,
};
pub use events::{CommandShortcut, GroupEvent, SessionEvent, SessionFailure};
