//! WebSocket transport (tokio-tungstenite client).
//!
//! `connect_async` performs the HTTP upgrade; the resulting stream is split
//! into sink and source halves and driven by one pump task that bridges them
//! to the [`TransportLink`] channels.  Protocol-level pings are answered by
//! tungstenite itself.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::Message as WsMessage,
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

use super::{
    CloseInfo, Connector, InboundFrame, OutboundFrame, TransportError, TransportLink,
    TransportTarget,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens real WebSocket connections.
#[derive(Debug, Clone)]
pub struct WsConnector {
    buffer: usize,
}

impl WsConnector {
    pub fn new() -> Self {
        Self { buffer: 64 }
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, target: &TransportTarget) -> Result<TransportLink, TransportError> {
        let endpoint = target.endpoint();
        let (ws, _response) =
            connect_async(target.url().as_str())
                .await
                .map_err(|e| TransportError::Connect {
                    endpoint: endpoint.clone(),
                    reason: e.to_string(),
                })?;
        info!(%endpoint, "websocket connected");

        let (outbound_tx, outbound_rx) = mpsc::channel(self.buffer);
        let (inbound_tx, inbound_rx) = mpsc::channel(self.buffer);
        tokio::spawn(pump(ws, outbound_rx, inbound_tx, endpoint));

        Ok(TransportLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

/// Moves frames between the socket and the link channels until either side
/// closes.
async fn pump(
    ws: WsStream,
    mut outbound: mpsc::Receiver<OutboundFrame>,
    inbound: mpsc::Sender<InboundFrame>,
    endpoint: String,
) {
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(OutboundFrame::Text(text)) => {
                    if let Err(e) = sink.send(WsMessage::Text(text)).await {
                        warn!(%endpoint, "websocket send failed: {e}");
                        let _ = inbound.send(InboundFrame::Error(e.to_string())).await;
                        break;
                    }
                }
                // An explicit close or a dropped sender both end the socket.
                Some(OutboundFrame::Close) | None => {
                    debug!(%endpoint, "closing websocket");
                    let _ = sink.send(WsMessage::Close(None)).await;
                    let _ = sink.close().await;
                    break;
                }
            },

            message = stream.next() => {
                let (frame, last) = match message {
                    Some(Ok(WsMessage::Text(text))) => (InboundFrame::Text(text), false),
                    Some(Ok(WsMessage::Binary(bytes))) => (InboundFrame::Binary(bytes), false),
                    Some(Ok(WsMessage::Close(close))) => {
                        let info = close.map(|c| CloseInfo {
                            code: u16::from(c.code),
                            reason: c.reason.into_owned(),
                        });
                        (InboundFrame::Closed(info), true)
                    }
                    // Ping/Pong/raw frames are handled by tungstenite.
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => (InboundFrame::Error(e.to_string()), true),
                    None => (InboundFrame::Closed(None), true),
                };
                if inbound.send(frame).await.is_err() || last {
                    break;
                }
            }
        }
    }

    debug!(%endpoint, "websocket pump finished");
}
