//! REST collaborator: session bookkeeping on the bastion backend.
//!
//! The session core never talks HTTP directly.  It calls the [`SessionApi`]
//! trait, which has two implementations:
//!
//! - [`HttpSessionApi`]: the production client, built on `reqwest`.
//! - [`RecordingSessionApi`]: an in-memory backend that records every call,
//!   used by tests and offline demos.
//!
//! Unit tests can also use `MockSessionApi`, generated by `mockall`.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use bastion_core::{AssetId, ExecutionMode, Session, SessionId};

use crate::domain::CommandShortcut;

pub use http::HttpSessionApi;
pub use memory::{ApiCall, RecordingSessionApi};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid API URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("backend rejected request: {0}")]
    Rejected(String),
}

/// Backend operations a session handle depends on.
///
/// Every method is a single request; none of them is retried here.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionApi: Send + Sync {
    /// Registers a new session for `asset_id` and returns its identity.
    async fn create_session(
        &self,
        asset_id: &AssetId,
        mode: ExecutionMode,
    ) -> Result<Session, ApiError>;

    /// Records that the remote side acknowledged the connection.
    async fn mark_connected(&self, session_id: &SessionId) -> Result<(), ApiError>;

    /// Reports a terminal geometry change (`width` = cols, `height` = rows).
    async fn resize(&self, session_id: &SessionId, width: u32, height: u32)
        -> Result<(), ApiError>;

    async fn disconnect(&self, session_id: &SessionId) -> Result<(), ApiError>;

    async fn command_shortcuts(&self) -> Result<Vec<CommandShortcut>, ApiError>;
}
