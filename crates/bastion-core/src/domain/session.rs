//! Session identity as assigned by the bastion backend.
//!
//! A [`Session`] is created by the backend when a user initiates access to
//! an asset.  The backend picks the `id`; the client picks nothing but the
//! asset and the execution mode.  Everything the transport needs to know
//! (which endpoint to open, which wire format to speak) is derived from the
//! session's mode and protocol.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Server-assigned session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a target asset (host) in the inventory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(String);

impl AssetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How the backend executes the session.
///
/// `Native` sessions are relayed by the backend's own shell bridge and speak
/// the terminal codec.  `Guacd` sessions are relayed through the display
/// gateway and speak gateway instructions, even for text protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Native,
    Guacd,
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "native" => Ok(ExecutionMode::Native),
            "guacd" => Ok(ExecutionMode::Guacd),
            other => Err(format!("unknown execution mode '{other}'")),
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExecutionMode::Native => "native",
            ExecutionMode::Guacd => "guacd",
        })
    }
}

/// Remote access protocol of the target asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteProtocol {
    Ssh,
    Telnet,
    Rdp,
    Vnc,
}

/// Wire-format family a session speaks on its transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolFamily {
    /// Digit-prefixed text messages.
    Terminal,
    /// Display-gateway instructions.
    Graphical,
}

/// Whether the session drives the remote host or only observes it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionRole {
    #[default]
    Access,
    /// Read-only view of another user's live session.
    Monitor,
}

impl ProtocolFamily {
    /// Returns the transport endpoint suffix for this family and role.
    ///
    /// | family    | Access   | Monitor          |
    /// |-----------|----------|------------------|
    /// | Terminal  | `ssh`    | `ssh-monitor`    |
    /// | Graphical | `tunnel` | `tunnel-monitor` |
    pub fn endpoint_suffix(self, role: SessionRole) -> &'static str {
        match (self, role) {
            (ProtocolFamily::Terminal, SessionRole::Access) => "ssh",
            (ProtocolFamily::Terminal, SessionRole::Monitor) => "ssh-monitor",
            (ProtocolFamily::Graphical, SessionRole::Access) => "tunnel",
            (ProtocolFamily::Graphical, SessionRole::Monitor) => "tunnel-monitor",
        }
    }
}

/// A backend session as returned by `createSession`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    pub asset_id: AssetId,
    pub mode: ExecutionMode,
    pub protocol: RemoteProtocol,
}

impl Session {
    /// Derives the wire family from mode and protocol.
    ///
    /// Only native SSH uses the terminal codec; everything relayed through
    /// the display gateway is graphical-family.
    pub fn family(&self) -> ProtocolFamily {
        match (self.mode, self.protocol) {
            (ExecutionMode::Native, RemoteProtocol::Ssh) => ProtocolFamily::Terminal,
            _ => ProtocolFamily::Graphical,
        }
    }
}
