//! Bidirectional message transport behind a session.
//!
//! A [`Connector`] opens one transport per session and hands back a
//! [`TransportLink`]: a pair of ordered channels.  Frames written to
//! `outbound` reach the remote side in order; frames from the remote side
//! arrive on `inbound` in order, ending with exactly one
//! [`InboundFrame::Closed`] or [`InboundFrame::Error`].
//!
//! Implementations:
//!
//! - [`WsConnector`]: a real WebSocket client (tokio-tungstenite).
//! - [`MemoryConnector`]: an in-process loopback whose remote ends are
//!   handed to the test as [`RemotePeer`]s.
//!
//! Dropping the `outbound` sender closes the transport.

pub mod memory;
pub mod ws;

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use url::Url;

use bastion_core::{ProtocolFamily, Session, SessionRole};

use crate::domain::SessionConfig;

pub use memory::{MemoryConnector, RemotePeer};
pub use ws::WsConnector;

// ── Frames ────────────────────────────────────────────────────────────────────

/// Frames the session writes to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Text(String),
    /// Starts the close handshake; nothing is sent after it.
    Close,
}

/// Close handshake details sent by the remote side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

/// Frames and lifecycle notices read from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Text(String),
    Binary(Vec<u8>),
    /// The transport closed.  `None` when no close frame was received.
    Closed(Option<CloseInfo>),
    /// The transport failed; no further frames follow.
    Error(String),
}

/// One open transport.
#[derive(Debug)]
pub struct TransportLink {
    pub outbound: mpsc::Sender<OutboundFrame>,
    pub inbound: mpsc::Receiver<InboundFrame>,
}

// ── Target ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid transport URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("failed to connect to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },
}

/// Where a session's transport connects.
///
/// `{ws_base}/sessions/{id}/{suffix}?X-Auth-Token=..&<geometry>` where the
/// suffix depends on family and role, and the geometry is `cols`/`rows` for
/// terminal sessions or density-scaled `width`/`height`/`dpi` for graphical
/// ones.
#[derive(Clone, PartialEq, Eq)]
pub struct TransportTarget {
    url: Url,
}

impl TransportTarget {
    pub fn for_session(
        config: &SessionConfig,
        session: &Session,
        role: SessionRole,
    ) -> Result<Self, TransportError> {
        let family = session.family();
        let mut url = Url::parse(&format!(
            "{}/sessions/{}/{}",
            config.ws_base.trim_end_matches('/'),
            session.id,
            family.endpoint_suffix(role)
        ))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("X-Auth-Token", &config.auth_token);
            match family {
                ProtocolFamily::Terminal => {
                    let geometry = config.terminal_geometry;
                    query
                        .append_pair("cols", &geometry.cols.to_string())
                        .append_pair("rows", &geometry.rows.to_string());
                }
                ProtocolFamily::Graphical => {
                    let geometry = config
                        .display_geometry
                        .scaled(config.density_scale(session.protocol));
                    query
                        .append_pair("width", &geometry.width.to_string())
                        .append_pair("height", &geometry.height.to_string())
                        .append_pair("dpi", &geometry.dpi.to_string());
                }
            }
        }
        Ok(Self { url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The URL without its query string, safe to log.
    pub fn endpoint(&self) -> String {
        let mut url = self.url.clone();
        url.set_query(None);
        url.to_string()
    }
}

impl fmt::Debug for TransportTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportTarget")
            .field("endpoint", &self.endpoint())
            .finish()
    }
}

/// Opens transports.  Implementations must be shareable across sessions.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, target: &TransportTarget) -> Result<TransportLink, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use bastion_core::{ExecutionMode, RemoteProtocol, SessionId};

    fn session(mode: ExecutionMode, protocol: RemoteProtocol) -> Session {
        Session {
            id: SessionId::new("s-1"),
            asset_id: bastion_core::AssetId::new("a-1"),
            mode,
            protocol,
        }
    }

    #[test]
    fn test_terminal_target_carries_cols_and_rows() {
        // Arrange
        let config = SessionConfig::new("wss://jump.example.com/api/", "tok");

        // Act
        let target = TransportTarget::for_session(
            &config,
            &session(ExecutionMode::Native, RemoteProtocol::Ssh),
            SessionRole::Access,
        )
        .unwrap();

        // Assert
        assert_eq!(
            target.url().as_str(),
            "wss://jump.example.com/api/sessions/s-1/ssh?X-Auth-Token=tok&cols=80&rows=24"
        );
    }

    #[test]
    fn test_rdp_target_scales_geometry() {
        let config = SessionConfig::new("ws://h/api", "tok");
        let target = TransportTarget::for_session(
            &config,
            &session(ExecutionMode::Guacd, RemoteProtocol::Rdp),
            SessionRole::Access,
        )
        .unwrap();
        assert_eq!(
            target.url().query(),
            Some("X-Auth-Token=tok&width=2048&height=1536&dpi=192")
        );
    }

    #[test]
    fn test_monitor_role_selects_monitor_endpoint() {
        let config = SessionConfig::new("ws://h/api", "tok");
        let target = TransportTarget::for_session(
            &config,
            &session(ExecutionMode::Guacd, RemoteProtocol::Vnc),
            SessionRole::Monitor,
        )
        .unwrap();
        assert_eq!(target.endpoint(), "ws://h/api/sessions/s-1/tunnel-monitor");
    }

    #[test]
    fn test_debug_output_hides_token() {
        let config = SessionConfig::new("ws://h/api", "super-secret");
        let target = TransportTarget::for_session(
            &config,
            &session(ExecutionMode::Native, RemoteProtocol::Ssh),
            SessionRole::Access,
        )
        .unwrap();
        assert!(!format!("{target:?}").contains("super-secret"));
    }
}
