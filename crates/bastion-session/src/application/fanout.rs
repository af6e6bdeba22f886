//! Fan-out coordinator: one command line, many hosts.
//!
//! A group owns one independent [`SessionHandle`] per asset.  Members share
//! nothing but the group's event stream: a member that fails, closes or
//! lags has no effect on the others.
//!
//! - `broadcast` writes the same input to every member that is Connected
//!   right now.  Members that are not are skipped, not queued; the returned
//!   [`BroadcastReport`] says which were which.
//! - An optional initial command runs exactly once per member, the first
//!   time that member reaches Connected.  It is triggered from the member's
//!   state watch, not its event stream: events can be dropped when a
//!   receiver lags, the latest state cannot.
//! - Every member event is re-published as a [`GroupEvent`] tagged with the
//!   member's session id.
//! - Dropping the group closes every member.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::future::join_all;
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use bastion_core::{AssetId, ConnectionState, SessionId};

use super::session::{InputSender, SessionContext, SessionError, SessionHandle, SessionRequest};
use crate::domain::{GroupEvent, SessionEvent, Viewport};

#[derive(Debug, Error)]
pub enum FanOutError {
    #[error("fan-out group has no members")]
    EmptyGroup,

    #[error("session {0} is not a member of this group")]
    UnknownMember(SessionId),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: Vec<SessionId>,
    /// Members that were not Connected or no longer accept input.
    pub skipped: Vec<SessionId>,
}

/// Outcome of [`FanOutCoordinator::launch`].
#[derive(Debug, Default)]
pub struct LaunchReport {
    pub started: Vec<SessionId>,
    pub failed: Vec<(AssetId, SessionError)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberStatus {
    pub session_id: SessionId,
    pub asset_id: AssetId,
    pub state: ConnectionState,
    pub command_executed: bool,
}

struct Member {
    handle: SessionHandle,
    executed: Arc<AtomicBool>,
}

pub struct FanOutCoordinator {
    ctx: SessionContext,
    command: Option<String>,
    members: BTreeMap<SessionId, Member>,
    events: broadcast::Sender<GroupEvent>,
}

impl FanOutCoordinator {
    /// `command`, if any, runs once on each member when it first connects.
    pub fn new(ctx: SessionContext, command: Option<String>) -> Self {
        let (events, _) = broadcast::channel(ctx.config.event_capacity.max(1));
        Self {
            ctx,
            command: command.filter(|c| !c.trim().is_empty()),
            members: BTreeMap::new(),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GroupEvent> {
        self.events.subscribe()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn state(&self, session_id: &SessionId) -> Option<ConnectionState> {
        self.members.get(session_id).map(|m| m.handle.state())
    }

    pub fn handle(&self, session_id: &SessionId) -> Option<&SessionHandle> {
        self.members.get(session_id).map(|m| &m.handle)
    }

    pub fn members(&self) -> Vec<MemberStatus> {
        self.members
            .iter()
            .map(|(id, m)| MemberStatus {
                session_id: id.clone(),
                asset_id: m.handle.session().asset_id.clone(),
                state: m.handle.state(),
                command_executed: m.executed.load(Ordering::SeqCst),
            })
            .collect()
    }

    /// Completes once every current member has reached Disconnected.
    ///
    /// Built from the members' state watches, so it cannot miss an end the
    /// way a lagging event receiver can.  Members added later are not
    /// included.
    pub fn all_ended(&self) -> impl Future<Output = ()> + Send + 'static {
        let states: Vec<_> = self
            .members
            .values()
            .map(|m| m.handle.watch_state())
            .collect();
        async move {
            join_all(states.into_iter().map(|mut state| async move {
                // A dropped sender means the actor is gone: ended as well.
                let _ = state.wait_for(|s| s.is_terminal()).await;
            }))
            .await;
        }
    }

    /// Opens one member.
    ///
    /// # Errors
    ///
    /// [`FanOutError::Session`] if the session cannot be opened; the group
    /// is unchanged in that case.
    pub async fn add(&mut self, request: SessionRequest) -> Result<SessionId, FanOutError> {
        let (handle, events) = SessionHandle::open(&self.ctx, request).await?;
        Ok(self.insert(handle, events))
    }

    /// Opens one member per request, concurrently.  A request that fails
    /// is reported and does not stop the others.
    pub async fn launch(
        &mut self,
        requests: impl IntoIterator<Item = SessionRequest>,
    ) -> LaunchReport {
        let ctx = self.ctx.clone();
        let opened = join_all(requests.into_iter().map(|request| {
            let ctx = &ctx;
            async move {
                let asset_id = request.asset_id.clone();
                (asset_id, SessionHandle::open(ctx, request).await)
            }
        }))
        .await;

        let mut report = LaunchReport::default();
        for (asset_id, result) in opened {
            match result {
                Ok((handle, events)) => report.started.push(self.insert(handle, events)),
                Err(e) => {
                    warn!(asset = %asset_id, "member failed to open: {e}");
                    report.failed.push((asset_id, e));
                }
            }
        }
        report
    }

    /// Sends `text` to every Connected member.
    ///
    /// # Errors
    ///
    /// [`FanOutError::EmptyGroup`] when the group has no members.
    pub fn broadcast(&self, text: &str) -> Result<BroadcastReport, FanOutError> {
        if self.members.is_empty() {
            return Err(FanOutError::EmptyGroup);
        }
        let mut report = BroadcastReport::default();
        for (id, member) in &self.members {
            let sent = member.handle.state() == ConnectionState::Connected
                && member.handle.send_input(text).is_ok();
            if sent {
                report.delivered.push(id.clone());
            } else {
                debug!(session = %id, "broadcast skipped member");
                report.skipped.push(id.clone());
            }
        }
        Ok(report)
    }

    /// Resizes one member.
    pub fn resize(&self, session_id: &SessionId, viewport: Viewport) -> Result<(), FanOutError> {
        let member = self
            .members
            .get(session_id)
            .ok_or_else(|| FanOutError::UnknownMember(session_id.clone()))?;
        member.handle.resize(viewport)?;
        Ok(())
    }

    /// Applies the same viewport to every member.  Returns how many members
    /// accepted it.
    pub fn resize_all(&self, viewport: Viewport) -> Result<usize, FanOutError> {
        if self.members.is_empty() {
            return Err(FanOutError::EmptyGroup);
        }
        Ok(self
            .members
            .values()
            .filter(|m| m.handle.resize(viewport).is_ok())
            .count())
    }

    /// Closes one member and removes it from the group.
    pub async fn remove(&mut self, session_id: &SessionId) -> Result<(), FanOutError> {
        let member = self
            .members
            .remove(session_id)
            .ok_or_else(|| FanOutError::UnknownMember(session_id.clone()))?;
        member.handle.close().await;
        Ok(())
    }

    /// Closes every member and waits for all of them to finish.
    pub async fn shutdown(mut self) {
        let members = std::mem::take(&mut self.members);
        info!(members = members.len(), "shutting down fan-out group");
        join_all(members.into_values().map(|m| m.handle.close())).await;
    }

    fn insert(
        &mut self,
        handle: SessionHandle,
        events: broadcast::Receiver<SessionEvent>,
    ) -> SessionId {
        let session_id = handle.id().clone();
        let asset_id = handle.session().asset_id.clone();
        let executed = Arc::new(AtomicBool::new(false));

        match (&self.command, handle.input_sender()) {
            (Some(command), Ok(input)) => {
                tokio::spawn(run_initial_command(
                    session_id.clone(),
                    handle.watch_state(),
                    InitialCommand {
                        text: with_line_end(command),
                        input,
                        executed: Arc::clone(&executed),
                    },
                ));
            }
            (Some(_), Err(e)) => {
                warn!(session = %session_id, "initial command not applicable: {e}");
            }
            (None, _) => {}
        }

        tokio::spawn(forward_member_events(
            session_id.clone(),
            asset_id,
            events,
            self.events.clone(),
        ));
        self.members
            .insert(session_id.clone(), Member { handle, executed });
        session_id
    }
}

struct InitialCommand {
    text: String,
    input: InputSender,
    executed: Arc<AtomicBool>,
}

/// Waits for the member's first Connected and writes the command once.
/// Gives up if the member ends without connecting.
async fn run_initial_command(
    session_id: SessionId,
    mut state: watch::Receiver<ConnectionState>,
    initial: InitialCommand,
) {
    let reached = state
        .wait_for(|s| *s == ConnectionState::Connected || s.is_terminal())
        .await
        .map(|s| *s);
    if !matches!(reached, Ok(ConnectionState::Connected)) {
        debug!(session = %session_id, "member ended before connecting");
        return;
    }
    // swap() makes the check-and-set atomic.
    if !initial.executed.swap(true, Ordering::SeqCst) {
        info!(session = %session_id, "running initial command");
        if let Err(e) = initial.input.send(initial.text) {
            warn!(session = %session_id, "initial command not sent: {e}");
        }
    }
}

/// Re-publishes one member's events on the group stream.
async fn forward_member_events(
    session_id: SessionId,
    asset_id: AssetId,
    mut events: broadcast::Receiver<SessionEvent>,
    group: broadcast::Sender<GroupEvent>,
) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(session = %session_id, skipped, "group forwarder lagged");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        let _ = group.send(GroupEvent {
            session_id: session_id.clone(),
            asset_id: asset_id.clone(),
            event,
        });
    }
    debug!(session = %session_id, "member event stream ended");
}

fn with_line_end(command: &str) -> String {
    if command.ends_with('\r') || command.ends_with('\n') {
        command.to_string()
    } else {
        format!("{command}\r")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SessionConfig;
    use crate::infrastructure::adapter::{Adapter, RecordingTerminal};
    use crate::infrastructure::api::RecordingSessionApi;
    use crate::infrastructure::transport::MemoryConnector;
    use bastion_core::{ExecutionMode, Session};

    fn context() -> SessionContext {
        SessionContext {
            config: Arc::new(SessionConfig::new("ws://bastion.test/api", "token")),
            api: Arc::new(RecordingSessionApi::new().rejecting("ghost")),
            connector: Arc::new(MemoryConnector::new()),
            adapters: Arc::new(|_: &Session| Adapter::Terminal(Box::new(RecordingTerminal::new()))),
        }
    }

    #[test]
    fn test_with_line_end() {
        assert_eq!(with_line_end("uptime"), "uptime\r");
        assert_eq!(with_line_end("uptime\n"), "uptime\n");
    }

    #[tokio::test]
    async fn test_empty_group_broadcast_is_an_error() {
        let group = FanOutCoordinator::new(context(), None);

        assert!(matches!(group.broadcast("ls\r"), Err(FanOutError::EmptyGroup)));
        assert!(matches!(
            group.resize_all(Viewport::Terminal(Default::default())),
            Err(FanOutError::EmptyGroup)
        ));
    }

    #[tokio::test]
    async fn test_launch_reports_failed_assets_and_keeps_others() {
        // Arrange
        let mut group = FanOutCoordinator::new(context(), Some("uptime".into()));

        // Act
        let report = group
            .launch([
                SessionRequest::access("web-1", ExecutionMode::Native),
                SessionRequest::access("ghost", ExecutionMode::Native),
                SessionRequest::access("web-2", ExecutionMode::Native),
            ])
            .await;

        // Assert
        assert_eq!(report.started.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, AssetId::new("ghost"));
        assert_eq!(group.len(), 2);
        group.shutdown().await;
    }

    #[tokio::test]
    async fn test_broadcast_skips_members_not_yet_connected() {
        let mut group = FanOutCoordinator::new(context(), None);
        let id = group
            .add(SessionRequest::access("web-1", ExecutionMode::Native))
            .await
            .unwrap();

        let report = group.broadcast("ls\r").unwrap();

        assert!(report.delivered.is_empty());
        assert_eq!(report.skipped, vec![id]);
        group.shutdown().await;
    }

    #[tokio::test]
    async fn test_remove_unknown_member() {
        let mut group = FanOutCoordinator::new(context(), None);
        let missing = SessionId::new("nope");

        let result = group.remove(&missing).await;

        assert!(matches!(result, Err(FanOutError::UnknownMember(id)) if id == missing));
    }
}
