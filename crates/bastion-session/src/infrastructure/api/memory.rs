//! In-memory [`SessionApi`] that records every call.
//!
//! Used by the integration tests and for running the session core without a
//! backend.  Assets default to native SSH; individual assets can be given
//! another protocol or be rejected outright.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use uuid::Uuid;

use bastion_core::{AssetId, ExecutionMode, RemoteProtocol, Session, SessionId};

use super::{ApiError, SessionApi};
use crate::domain::CommandShortcut;

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    Create {
        asset_id: AssetId,
        mode: ExecutionMode,
    },
    MarkConnected(SessionId),
    Resize {
        session_id: SessionId,
        width: u32,
        height: u32,
    },
    Disconnect(SessionId),
    Shortcuts,
}

#[derive(Default)]
struct Backend {
    calls: Vec<ApiCall>,
    protocols: HashMap<AssetId, RemoteProtocol>,
    rejected: HashSet<AssetId>,
    shortcuts: Vec<CommandShortcut>,
}

#[derive(Default)]
pub struct RecordingSessionApi {
    backend: Mutex<Backend>,
}

impl RecordingSessionApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sessions for `asset_id` report `protocol` instead of SSH.
    pub fn with_protocol(self, asset_id: impl Into<String>, protocol: RemoteProtocol) -> Self {
        self.lock()
            .protocols
            .insert(AssetId::new(asset_id), protocol);
        self
    }

    /// `create_session` fails for `asset_id`.
    pub fn rejecting(self, asset_id: impl Into<String>) -> Self {
        self.lock().rejected.insert(AssetId::new(asset_id));
        self
    }

    pub fn with_shortcuts(self, shortcuts: Vec<CommandShortcut>) -> Self {
        self.lock().shortcuts = shortcuts;
        self
    }

    /// Snapshot of every call so far, in order.
    pub fn calls(&self) -> Vec<ApiCall> {
        self.lock().calls.clone()
    }

    pub fn count(&self, predicate: impl Fn(&ApiCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| predicate(c)).count()
    }

    fn lock(&self) -> MutexGuard<'_, Backend> {
        self.backend.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: ApiCall) {
        self.lock().calls.push(call);
    }
}

#[async_trait]
impl SessionApi for RecordingSessionApi {
    async fn create_session(
        &self,
        asset_id: &AssetId,
        mode: ExecutionMode,
    ) -> Result<Session, ApiError> {
        let mut backend = self.lock();
        backend.calls.push(ApiCall::Create {
            asset_id: asset_id.clone(),
            mode,
        });
        if backend.rejected.contains(asset_id) {
            return Err(ApiError::Rejected(format!("asset {asset_id} is not accessible")));
        }
        let protocol = backend
            .protocols
            .get(asset_id)
            .copied()
            .unwrap_or(RemoteProtocol::Ssh);
        Ok(Session {
            id: SessionId::new(Uuid::new_v4().to_string()),
            asset_id: asset_id.clone(),
            mode,
            protocol,
        })
    }

    async fn mark_connected(&self, session_id: &SessionId) -> Result<(), ApiError> {
        self.record(ApiCall::MarkConnected(session_id.clone()));
        Ok(())
    }

    async fn resize(
        &self,
        session_id: &SessionId,
        width: u32,
        height: u32,
    ) -> Result<(), ApiError> {
        self.record(ApiCall::Resize {
            session_id: session_id.clone(),
            width,
            height,
        });
        Ok(())
    }

    async fn disconnect(&self, session_id: &SessionId) -> Result<(), ApiError> {
        self.record(ApiCall::Disconnect(session_id.clone()));
        Ok(())
    }

    async fn command_shortcuts(&self) -> Result<Vec<CommandShortcut>, ApiError> {
        let mut backend = self.lock();
        backend.calls.push(ApiCall::Shortcuts);
        Ok(backend.shortcuts.clone())
    }
}
