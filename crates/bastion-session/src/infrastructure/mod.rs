//! Infrastructure layer: everything that touches the network, the file
//! system or the terminal.
//!
//! ```text
//! infrastructure/
//!   api/           SessionApi trait, reqwest client, recording backend
//!   transport/     Connector trait, WebSocket client, in-memory loopback
//!   adapter.rs     Terminal/display adapters
//!   config_store   console.toml loading
//! ```

pub mod adapter;
pub mod api;
pub mod config_store;
pub mod transport;

pub use adapter::{
    Adapter, AdapterFactory, DisplayAdapter, HeadlessDisplay, PrefixedTerminal, RecordingDisplay,
    RecordingTerminal, TerminalAdapter,
};
pub use api::{ApiCall, ApiError, HttpSessionApi, RecordingSessionApi, SessionApi};
pub use config_store::{load_config, ConfigError};
pub use transport::{
    Connector, InboundFrame, MemoryConnector, OutboundFrame, RemotePeer, TransportError,
    TransportLink, TransportTarget, WsConnector,
};
