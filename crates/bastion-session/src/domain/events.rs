//! Events published by session handles and fan-out groups.
//!
//! Observers subscribe to a `tokio::sync::broadcast` channel of
//! [`SessionEvent`]s.  Each subscriber gets its own copy of every event, so
//! a terminal renderer and a status bar can watch the same session without
//! coordinating.

use std::fmt;

use serde::{Deserialize, Serialize};

use bastion_core::{
    AssetId, ClipboardPayload, ConnectionState, ErrorCategory, ErrorStatus, SessionId,
};

/// A saved command the backend offers for quick insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandShortcut {
    pub id: String,
    pub name: String,
    pub content: String,
}

/// Why a session ended abnormally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionFailure {
    /// The display gateway reported a status.
    Gateway {
        status: ErrorStatus,
        category: ErrorCategory,
    },
    /// The transport failed or closed without a close handshake.
    Transport(String),
}

impl SessionFailure {
    pub fn gateway(status: ErrorStatus) -> Self {
        let category = status.category();
        Self::Gateway { status, category }
    }
}

impl fmt::Display for SessionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gateway { status, category } => write!(f, "{category} (code {})", status.code),
            Self::Transport(reason) => write!(f, "transport failure: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },
    /// Remote terminal output, already written to the terminal adapter.
    Output(String),
    Shortcuts(Vec<CommandShortcut>),
    /// Clipboard content published by the remote side.
    Clipboard(ClipboardPayload),
    /// A recoverable fault; the connection stays up.
    Warning(String),
    /// Emitted at most once per session, right before it reaches
    /// Disconnected.
    Failed(SessionFailure),
    /// Orderly close, local or remote.
    Closed { reason: Option<String> },
}

/// A member event re-published by a fan-out group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEvent {
    pub session_id: SessionId,
    pub asset_id: AssetId,
    pub event: SessionEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_failure_carries_category() {
        let failure = SessionFailure::gateway(ErrorStatus::new(802, None));
        assert_eq!(
            failure.to_string(),
            "administrator force-closed session (code 802)"
        );
    }

    #[test]
    fn test_shortcut_deserializes_camel_case() {
        let json = r#"{"id":"c1","name":"Disk usage","content":"df -h"}"#;
        let shortcut: CommandShortcut = serde_json::from_str(json).unwrap();
        assert_eq!(shortcut.content, "df -h");
    }
}
