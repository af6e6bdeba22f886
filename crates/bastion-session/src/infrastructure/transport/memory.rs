//! In-process loopback transport.
//!
//! Every `open` call creates a fresh channel pair and hands the remote end
//! to whoever awaits [`MemoryConnector::accept`].  Tests play the server by
//! holding the [`RemotePeer`]: they push frames to the session and read what
//! the session sent.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use url::Url;

use bastion_core::SessionId;

use super::{
    CloseInfo, Connector, InboundFrame, OutboundFrame, TransportError, TransportLink,
    TransportTarget,
};

const BUFFER: usize = 64;

pub struct MemoryConnector {
    peers_tx: mpsc::UnboundedSender<RemotePeer>,
    peers_rx: Mutex<mpsc::UnboundedReceiver<RemotePeer>>,
    refusing: AtomicBool,
}

impl MemoryConnector {
    pub fn new() -> Self {
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        Self {
            peers_tx,
            peers_rx: Mutex::new(peers_rx),
            refusing: AtomicBool::new(false),
        }
    }

    /// While set, every `open` fails with [`TransportError::Connect`].
    pub fn set_refusing(&self, refusing: bool) {
        self.refusing.store(refusing, Ordering::SeqCst);
    }

    /// Waits for the next transport a session opens.
    pub async fn accept(&self) -> Option<RemotePeer> {
        self.peers_rx.lock().await.recv().await
    }
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open(&self, target: &TransportTarget) -> Result<TransportLink, TransportError> {
        if self.refusing.load(Ordering::SeqCst) {
            return Err(TransportError::Connect {
                endpoint: target.endpoint(),
                reason: "connection refused".to_string(),
            });
        }

        let (outbound_tx, outbound_rx) = mpsc::channel(BUFFER);
        let (inbound_tx, inbound_rx) = mpsc::channel(BUFFER);
        let peer = RemotePeer {
            url: target.url().clone(),
            to_session: inbound_tx,
            from_session: outbound_rx,
        };
        self.peers_tx
            .send(peer)
            .map_err(|_| TransportError::Connect {
                endpoint: target.endpoint(),
                reason: "memory connector dropped".to_string(),
            })?;

        Ok(TransportLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

/// The server side of one in-memory transport.
pub struct RemotePeer {
    url: Url,
    to_session: mpsc::Sender<InboundFrame>,
    from_session: mpsc::Receiver<OutboundFrame>,
}

impl RemotePeer {
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Session id taken from the `/sessions/{id}/...` path.
    pub fn session_id(&self) -> Option<SessionId> {
        let mut segments = self.url.path_segments()?;
        segments.find(|s| *s == "sessions")?;
        segments.next().map(SessionId::new)
    }

    pub fn query(&self, key: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    /// Delivers a text frame.  Returns `false` once the session is gone.
    pub async fn send_text(&self, text: impl Into<String>) -> bool {
        self.to_session
            .send(InboundFrame::Text(text.into()))
            .await
            .is_ok()
    }

    pub async fn send_binary(&self, bytes: Vec<u8>) -> bool {
        self.to_session.send(InboundFrame::Binary(bytes)).await.is_ok()
    }

    /// Closes with a close frame.
    pub async fn close(&self, code: u16, reason: impl Into<String>) {
        let info = CloseInfo {
            code,
            reason: reason.into(),
        };
        let _ = self.to_session.send(InboundFrame::Closed(Some(info))).await;
    }

    /// Drops the connection without a close handshake.
    pub async fn drop_connection(&self) {
        let _ = self.to_session.send(InboundFrame::Closed(None)).await;
    }

    pub async fn fail(&self, reason: impl Into<String>) {
        let _ = self.to_session.send(InboundFrame::Error(reason.into())).await;
    }

    /// Next frame the session sent; `None` after the session dropped its end.
    pub async fn recv(&mut self) -> Option<OutboundFrame> {
        self.from_session.recv().await
    }

    /// Everything the session has sent so far, without waiting.
    pub fn drain(&mut self) -> Vec<OutboundFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.from_session.try_recv() {
            frames.push(frame);
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SessionConfig;
    use bastion_core::{AssetId, ExecutionMode, RemoteProtocol, Session, SessionRole};

    fn target() -> TransportTarget {
        let session = Session {
            id: SessionId::new("s-9"),
            asset_id: AssetId::new("a"),
            mode: ExecutionMode::Native,
            protocol: RemoteProtocol::Ssh,
        };
        TransportTarget::for_session(&SessionConfig::new("ws://h", "t"), &session, SessionRole::Access)
            .unwrap()
    }

    #[tokio::test]
    async fn test_frames_flow_both_ways_in_order() {
        // Arrange
        let connector = MemoryConnector::new();
        let mut link = connector.open(&target()).await.unwrap();
        let mut peer = connector.accept().await.unwrap();

        // Act
        link.outbound.send(OutboundFrame::Text("a".into())).await.unwrap();
        link.outbound.send(OutboundFrame::Text("b".into())).await.unwrap();
        peer.send_text("x").await;

        // Assert
        assert_eq!(peer.session_id(), Some(SessionId::new("s-9")));
        assert_eq!(peer.query("cols").as_deref(), Some("80"));
        assert_eq!(
            peer.drain(),
            vec![OutboundFrame::Text("a".into()), OutboundFrame::Text("b".into())]
        );
        assert_eq!(link.inbound.recv().await, Some(InboundFrame::Text("x".into())));
    }

    #[tokio::test]
    async fn test_refusing_connector_fails_open() {
        let connector = MemoryConnector::new();
        connector.set_refusing(true);
        assert!(matches!(
            connector.open(&target()).await,
            Err(TransportError::Connect { .. })
        ));
    }
}
