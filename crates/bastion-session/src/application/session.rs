//! Session handle: one remote session, end to end.
//!
//! # How it works (for beginners)
//!
//! Each session runs as one Tokio task (the *actor*) that owns everything
//! mutable about the session: the connection state, the keepalive timer,
//! the transport link, the clipboard bridge and the rendering adapter.
//! The [`SessionHandle`] returned to the caller owns none of it.  It talks
//! to the actor through three channels:
//!
//! ```text
//!   SessionHandle ──commands (mpsc)──▶ actor ──frames──▶ transport
//!        ▲                               │
//!        ├──── state (watch) ◀───────────┤
//!        └──── events (broadcast) ◀──────┘
//! ```
//!
//! Because only the actor touches the state, no locks are needed and events
//! come out in exactly the order they happened.  The keepalive timer lives
//! inside the actor's `select!` loop, so once the actor stops nothing can
//! fire on a torn-down session.
//!
//! # Lifecycle
//!
//! 1. `open` asks the backend for a session, then moves Idle → Connecting
//!    before the transport is even opened.
//! 2. Terminal sessions become Connected when the remote sends a Connected
//!    message.  Graphical sessions go Connecting → Waiting when the
//!    transport opens, then Connected on the first `sync` instruction.
//! 3. On Connected the backend is told (`mark_connected`); terminal sessions
//!    also load command shortcuts, graphical sessions send their size.
//! 4. Closing cancels the keepalive, closes the transport and then disposes
//!    the adapter, in that order.  Dropping the handle closes the session
//!    too.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use bastion_core::protocol::instruction::opcode;
use bastion_core::{
    decode_instructions, decode_message, encode_instruction, encode_message, AssetId,
    ClipboardPayload, ClipboardPolicy, ConnectionState, ErrorCategory, ErrorStatus,
    ExecutionMode, Instruction, Message, MessageType, ProtocolFamily, Session, SessionId,
    SessionRole, Transition,
};

use super::clipboard::{ClipboardBridge, ClipboardDirection, ClipboardError, InboundOutcome};
use super::lifecycle::Connection;
use super::resize::{ResizeAction, ResizeSynchronizer};
use crate::domain::{DisplayGeometry, SessionConfig, SessionEvent, SessionFailure, Viewport};
use crate::infrastructure::adapter::{Adapter, AdapterFactory};
use crate::infrastructure::api::{ApiError, SessionApi};
use crate::infrastructure::transport::{
    CloseInfo, Connector, InboundFrame, OutboundFrame, TransportError, TransportLink,
    TransportTarget,
};

/// WebSocket close code for an orderly close.
const NORMAL_CLOSURE: u16 = 1000;

// ── Public types ──────────────────────────────────────────────────────────────

/// What to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub asset_id: AssetId,
    pub mode: ExecutionMode,
    pub role: SessionRole,
}

impl SessionRequest {
    pub fn access(asset_id: impl Into<String>, mode: ExecutionMode) -> Self {
        Self {
            asset_id: AssetId::new(asset_id),
            mode,
            role: SessionRole::Access,
        }
    }

    pub fn monitor(asset_id: impl Into<String>, mode: ExecutionMode) -> Self {
        Self {
            role: SessionRole::Monitor,
            ..Self::access(asset_id, mode)
        }
    }
}

/// Collaborators shared by every session a process opens.
#[derive(Clone)]
pub struct SessionContext {
    pub config: Arc<SessionConfig>,
    pub api: Arc<dyn SessionApi>,
    pub connector: Arc<dyn Connector>,
    pub adapters: AdapterFactory,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("backend refused a session for asset {asset_id}: {source}")]
    Create {
        asset_id: AssetId,
        #[source]
        source: ApiError,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("a {adapter:?} adapter cannot render a {session:?} session")]
    AdapterMismatch {
        adapter: ProtocolFamily,
        session: ProtocolFamily,
    },

    #[error("session {0} is read-only")]
    ReadOnly(SessionId),

    #[error("session {session_id} does not support {operation}")]
    Unsupported {
        session_id: SessionId,
        operation: &'static str,
    },

    #[error(transparent)]
    Clipboard(#[from] ClipboardError),

    #[error("session {0} is closed")]
    Closed(SessionId),
}

enum Command {
    Input(String),
    Instruction(Instruction),
    Resize(Viewport),
    Clipboard(ClipboardPayload),
    Close,
}

impl Command {
    /// Loggable name; payloads may hold keystrokes or clipboard content.
    fn name(&self) -> &'static str {
        match self {
            Command::Input(_) => "input",
            Command::Instruction(_) => "instruction",
            Command::Resize(_) => "resize",
            Command::Clipboard(_) => "clipboard",
            Command::Close => "close",
        }
    }
}

// ── SessionHandle ─────────────────────────────────────────────────────────────

/// Caller-side handle of one running session.
pub struct SessionHandle {
    session: Session,
    role: SessionRole,
    clipboard: ClipboardPolicy,
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    events: broadcast::Sender<SessionEvent>,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    /// Creates the backend session and starts connecting.
    ///
    /// Returns once the session is Connecting; the transport is opened in
    /// the background.  The returned receiver is subscribed before the first
    /// event is published, so it sees every event of the session.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Create`] if the backend refuses the session.
    /// - [`SessionError::Transport`] if no valid endpoint URL can be built.
    /// - [`SessionError::AdapterMismatch`] if the adapter factory returns
    ///   the wrong kind of adapter for the session's protocol.
    pub async fn open(
        ctx: &SessionContext,
        request: SessionRequest,
    ) -> Result<(Self, broadcast::Receiver<SessionEvent>), SessionError> {
        let session = ctx
            .api
            .create_session(&request.asset_id, request.mode)
            .await
            .map_err(|source| SessionError::Create {
                asset_id: request.asset_id.clone(),
                source,
            })?;
        let family = session.family();
        info!(
            session = %session.id,
            asset = %session.asset_id,
            ?family,
            role = ?request.role,
            "session created"
        );

        let prepared = TransportTarget::for_session(&ctx.config, &session, request.role)
            .map_err(SessionError::from)
            .and_then(|target| {
                let adapter = (ctx.adapters)(&session);
                if adapter.family() == family {
                    Ok((target, adapter))
                } else {
                    Err(SessionError::AdapterMismatch {
                        adapter: adapter.family(),
                        session: family,
                    })
                }
            });
        let (target, adapter) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                if let Err(api_err) = ctx.api.disconnect(&session.id).await {
                    error!(session = %session.id, "disconnect after failed open: {api_err}");
                }
                return Err(e);
            }
        };

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = broadcast::channel(ctx.config.event_capacity.max(1));
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);

        let mut actor = SessionActor {
            session: session.clone(),
            role: request.role,
            family,
            connection: Connection::new(ctx.config.keepalive_interval),
            resize: ResizeSynchronizer::new(family, ctx.config.density_scale(session.protocol)),
            clipboard: ClipboardBridge::new(ctx.config.clipboard),
            display_geometry: ctx.config.display_geometry,
            adapter,
            api: Arc::clone(&ctx.api),
            link: None,
            commands: command_rx,
            state_tx,
            events: event_tx.clone(),
        };
        actor.advance(ConnectionState::Connecting);

        let task = tokio::spawn(actor.run(Arc::clone(&ctx.connector), target));

        let handle = Self {
            session,
            role: request.role,
            clipboard: ctx.config.clipboard,
            commands: command_tx,
            state: state_rx,
            events: event_tx,
            task: Some(task),
        };
        Ok((handle, event_rx))
    }

    pub fn id(&self) -> &SessionId {
        &self.session.id
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn family(&self) -> ProtocolFamily {
        self.session.family()
    }

    pub fn role(&self) -> SessionRole {
        self.role
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Waits until the session reaches `target` or Disconnected, and returns
    /// the state it stopped at.
    pub async fn wait_for_state(&self, target: ConnectionState) -> ConnectionState {
        let mut state = self.state.clone();
        if let Ok(reached) = state.wait_for(|s| *s == target || s.is_terminal()).await {
            return *reached;
        }
        let current = *state.borrow();
        current
    }

    /// Sends keyboard input to a terminal session.
    ///
    /// Input is silently dropped while the session is not Connected.
    ///
    /// # Errors
    ///
    /// [`SessionError::ReadOnly`] for monitor sessions,
    /// [`SessionError::Unsupported`] for graphical sessions,
    /// [`SessionError::Closed`] once the session has shut down.
    pub fn send_input(&self, text: impl Into<String>) -> Result<(), SessionError> {
        self.input_sender()?.send(text.into())
    }

    /// Forwards a display-engine instruction (keys, mouse) to a graphical
    /// session.  Dropped while not Connected.
    pub fn send_instruction(&self, instruction: Instruction) -> Result<(), SessionError> {
        self.ensure_writable()?;
        self.ensure_family(ProtocolFamily::Graphical, "display instructions")?;
        self.dispatch(Command::Instruction(instruction))
    }

    /// Reports a viewport change.  Ignored unless Connected.
    pub fn resize(&self, viewport: Viewport) -> Result<(), SessionError> {
        self.dispatch(Command::Resize(viewport))
    }

    /// Pushes local clipboard content to a graphical session.
    ///
    /// # Errors
    ///
    /// [`SessionError::Clipboard`] when paste is disabled by policy; no
    /// clipboard stream is opened in that case.
    pub fn send_clipboard(&self, payload: ClipboardPayload) -> Result<(), SessionError> {
        self.ensure_writable()?;
        self.ensure_family(ProtocolFamily::Graphical, "clipboard")?;
        if !self.clipboard.paste {
            return Err(ClipboardError::Denied(ClipboardDirection::Paste).into());
        }
        self.dispatch(Command::Clipboard(payload))
    }

    /// Closes the session and waits for teardown to finish.
    pub async fn close(mut self) {
        let _ = self.commands.send(Command::Close);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!(session = %self.session.id, "session task ended abnormally: {e}");
            }
        }
    }

    pub(crate) fn input_sender(&self) -> Result<InputSender, SessionError> {
        self.ensure_writable()?;
        self.ensure_family(ProtocolFamily::Terminal, "text input")?;
        Ok(InputSender {
            session_id: self.session.id.clone(),
            commands: self.commands.clone(),
        })
    }

    fn ensure_writable(&self) -> Result<(), SessionError> {
        match self.role {
            SessionRole::Access => Ok(()),
            SessionRole::Monitor => Err(SessionError::ReadOnly(self.session.id.clone())),
        }
    }

    fn ensure_family(
        &self,
        family: ProtocolFamily,
        operation: &'static str,
    ) -> Result<(), SessionError> {
        if self.family() == family {
            Ok(())
        } else {
            Err(SessionError::Unsupported {
                session_id: self.session.id.clone(),
                operation,
            })
        }
    }

    fn dispatch(&self, command: Command) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .map_err(|_| SessionError::Closed(self.session.id.clone()))
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        // The actor tears down on its own; nobody waits for it here.
        let _ = self.commands.send(Command::Close);
    }
}

/// Cloneable input path into a terminal session, already checked for role
/// and family.
#[derive(Clone)]
pub(crate) struct InputSender {
    session_id: SessionId,
    commands: mpsc::UnboundedSender<Command>,
}

impl InputSender {
    pub(crate) fn send(&self, text: String) -> Result<(), SessionError> {
        self.commands
            .send(Command::Input(text))
            .map_err(|_| SessionError::Closed(self.session_id.clone()))
    }
}

// ── Actor ─────────────────────────────────────────────────────────────────────

struct SessionActor {
    session: Session,
    role: SessionRole,
    family: ProtocolFamily,
    connection: Connection,
    resize: ResizeSynchronizer,
    clipboard: ClipboardBridge,
    display_geometry: DisplayGeometry,
    adapter: Adapter,
    api: Arc<dyn SessionApi>,
    link: Option<TransportLink>,
    commands: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionActor {
    async fn run(mut self, connector: Arc<dyn Connector>, target: TransportTarget) {
        debug!(session = %self.session.id, endpoint = %target.endpoint(), "opening transport");

        // Commands keep flowing while the transport opens so that a close
        // request is not stuck behind a slow handshake.
        let mut open = connector.open(&target);
        let opened = loop {
            tokio::select! {
                result = &mut open => break Some(result),
                command = self.commands.recv() => match command {
                    Some(Command::Close) | None => break None,
                    Some(other) => {
                        debug!(
                            session = %self.session.id,
                            command = other.name(),
                            "command dropped while connecting"
                        );
                    }
                },
            }
        };
        drop(open);

        match opened {
            None => self.close_locally().await,
            Some(Err(e)) => self.fail_transport(e.to_string()),
            Some(Ok(link)) => {
                self.link = Some(link);
                if self.family == ProtocolFamily::Graphical {
                    self.advance(ConnectionState::Waiting);
                }
                self.event_loop().await;
            }
        }

        self.teardown();
    }

    async fn event_loop(&mut self) {
        while !self.connection.state().is_terminal() {
            tokio::select! {
                frame = next_inbound(&mut self.link) => match frame {
                    Some(frame) => self.on_frame(frame).await,
                    None => self.fail_transport("transport dropped"),
                },
                command = self.commands.recv() => match command {
                    Some(command) => self.on_command(command).await,
                    None => self.close_locally().await,
                },
                _ = self.connection.keepalive_due() => self.send_keepalive().await,
            }
        }
    }

    // ── Inbound ───────────────────────────────────────────────────────────────

    async fn on_frame(&mut self, frame: InboundFrame) {
        match frame {
            InboundFrame::Text(text) => match self.family {
                ProtocolFamily::Terminal => self.on_terminal_text(&text).await,
                ProtocolFamily::Graphical => self.on_gateway_text(&text).await,
            },
            InboundFrame::Binary(bytes) => {
                debug!(session = %self.session.id, len = bytes.len(), "binary frame ignored");
            }
            InboundFrame::Closed(info) => self.on_transport_closed(info),
            InboundFrame::Error(reason) => self.fail_transport(reason),
        }
    }

    async fn on_terminal_text(&mut self, text: &str) {
        let message = match decode_message(text) {
            Ok(message) => message,
            Err(e) => {
                self.report_warning(format!("dropped malformed frame: {e}"));
                return;
            }
        };
        match message.kind() {
            MessageType::Connected => self.on_connected().await,
            MessageType::Data => {
                if let Adapter::Terminal(terminal) = &mut self.adapter {
                    terminal.write(message.content());
                }
                self.publish(SessionEvent::Output(message.into_content()));
            }
            MessageType::Closed => {
                let reason = Some(message.into_content()).filter(|r| !r.is_empty());
                self.on_remote_close(reason);
            }
            kind @ (MessageType::Ping | MessageType::Resize) => {
                debug!(session = %self.session.id, %kind, "remote message ignored");
            }
        }
    }

    async fn on_gateway_text(&mut self, text: &str) {
        let instructions = match decode_instructions(text) {
            Ok(instructions) => instructions,
            Err(e) => {
                self.report_warning(format!("dropped malformed frame: {e}"));
                return;
            }
        };
        for instruction in instructions {
            if self.connection.state().is_terminal() {
                break;
            }
            self.on_instruction(instruction).await;
        }
    }

    async fn on_instruction(&mut self, instruction: Instruction) {
        match instruction.opcode() {
            opcode::SYNC => {
                if self.connection.state() == ConnectionState::Waiting {
                    self.on_connected().await;
                }
                if let Some(timestamp) = instruction.arg(0) {
                    let echo = Instruction::new(opcode::SYNC, [timestamp]);
                    self.send_instructions(&[echo]).await;
                }
                self.render(&instruction);
            }
            opcode::ERROR => {
                let code = instruction
                    .arg(1)
                    .and_then(|c| c.parse::<u16>().ok())
                    .unwrap_or_default();
                let message = instruction
                    .arg(0)
                    .filter(|m| !m.is_empty())
                    .map(str::to_owned);
                self.fail_gateway(ErrorStatus::new(code, message));
            }
            opcode::DISCONNECT => self.on_remote_close(None),
            opcode::NOP => {}
            _ => match self.clipboard.inbound(&instruction) {
                InboundOutcome::Ignored => self.render(&instruction),
                InboundOutcome::Progress { replies } => self.send_instructions(&replies).await,
                InboundOutcome::Published { payload } => {
                    info!(
                        session = %self.session.id,
                        mime = %payload.mime_type,
                        bytes = payload.len(),
                        "clipboard received"
                    );
                    self.publish(SessionEvent::Clipboard(payload));
                }
                InboundOutcome::Rejected { error, replies } => {
                    self.send_instructions(&replies).await;
                    self.report_warning(error.to_string());
                }
            },
        }
    }

    async fn on_connected(&mut self) {
        match self.connection.transition(ConnectionState::Connected) {
            Ok(Transition::Unchanged) => {
                debug!(session = %self.session.id, "redundant connected acknowledgement");
            }
            Ok(transition) => {
                self.announce(transition);
                self.notify_connected();
                match self.family {
                    ProtocolFamily::Terminal => self.load_shortcuts(),
                    ProtocolFamily::Graphical => {
                        let size = self.resize.size_instruction(self.display_geometry);
                        self.send_instructions(&[size]).await;
                    }
                }
            }
            Err(e) => self.report_warning(format!("connected acknowledgement ignored: {e}")),
        }
    }

    fn on_transport_closed(&mut self, info: Option<CloseInfo>) {
        let state = self.connection.state();
        if state.is_terminal() {
            return;
        }
        if state == ConnectionState::Disconnecting {
            self.advance(ConnectionState::Disconnected);
            self.publish(SessionEvent::Closed { reason: None });
            return;
        }
        match info {
            Some(info)
                if self.family == ProtocolFamily::Graphical
                    && ErrorCategory::from_code(info.code).is_some() =>
            {
                let message = Some(info.reason).filter(|r| !r.is_empty());
                self.fail_gateway(ErrorStatus::new(info.code, message));
            }
            Some(info) if info.code == NORMAL_CLOSURE => {
                self.on_remote_close(Some(info.reason).filter(|r| !r.is_empty()));
            }
            Some(info) => {
                self.fail_transport(format!("closed with code {}: {}", info.code, info.reason));
            }
            None => self.fail_transport("connection lost without close handshake"),
        }
    }

    fn on_remote_close(&mut self, reason: Option<String>) {
        if self.connection.state().is_terminal() {
            return;
        }
        info!(session = %self.session.id, ?reason, "remote closed the session");
        self.advance(ConnectionState::Disconnecting);
        self.advance(ConnectionState::Disconnected);
        self.publish(SessionEvent::Closed { reason });
    }

    fn fail_gateway(&mut self, status: ErrorStatus) {
        let Some(transition) = self.connection.fail(status.clone()) else {
            return;
        };
        let failure = SessionFailure::gateway(status);
        error!(session = %self.session.id, "session failed: {failure}");
        self.publish(SessionEvent::Failed(failure));
        self.announce(transition);
    }

    fn fail_transport(&mut self, reason: impl Into<String>) {
        let state = self.connection.state();
        if state.is_terminal() {
            return;
        }
        if state == ConnectionState::Disconnecting {
            self.advance(ConnectionState::Disconnected);
            self.publish(SessionEvent::Closed { reason: None });
            return;
        }
        let failure = SessionFailure::Transport(reason.into());
        error!(session = %self.session.id, "session failed: {failure}");
        self.publish(SessionEvent::Failed(failure));
        self.advance(ConnectionState::Disconnected);
    }

    // ── Commands ──────────────────────────────────────────────────────────────

    async fn on_command(&mut self, command: Command) {
        let state = self.connection.state();
        match command {
            Command::Close => self.close_locally().await,
            Command::Input(text) => {
                if state != ConnectionState::Connected || self.role == SessionRole::Monitor {
                    debug!(session = %self.session.id, ?state, "input dropped");
                    return;
                }
                self.send_text(encode_message(&Message::data(text))).await;
            }
            Command::Instruction(instruction) => {
                if state != ConnectionState::Connected {
                    debug!(session = %self.session.id, ?state, "instruction dropped");
                    return;
                }
                self.send_instructions(&[instruction]).await;
            }
            Command::Resize(viewport) => match self.resize.reconcile(state, viewport) {
                None => debug!(session = %self.session.id, ?state, ?viewport, "resize discarded"),
                Some(ResizeAction::Terminal { message, geometry }) => {
                    self.send_text(encode_message(&message)).await;
                    self.report_resize(u32::from(geometry.cols), u32::from(geometry.rows));
                }
                Some(ResizeAction::Display { instruction }) => {
                    if let Viewport::Display(geometry) = viewport {
                        self.display_geometry = geometry;
                    }
                    self.send_instructions(&[instruction]).await;
                }
            },
            Command::Clipboard(payload) => {
                if state != ConnectionState::Connected {
                    self.report_warning("clipboard not sent: session is not connected".into());
                    return;
                }
                match self.clipboard.outbound(&payload) {
                    Ok(instructions) => self.send_instructions(&instructions).await,
                    Err(e) => self.report_warning(e.to_string()),
                }
            }
        }
    }

    async fn close_locally(&mut self) {
        if self.connection.state().is_terminal() {
            return;
        }
        info!(session = %self.session.id, "closing session");
        // Leaving Connected cancels the keepalive before the transport goes.
        self.advance(ConnectionState::Disconnecting);
        if let Some(link) = self.link.take() {
            let _ = link.outbound.send(OutboundFrame::Close).await;
        }
        self.advance(ConnectionState::Disconnected);
        self.publish(SessionEvent::Closed { reason: None });

        if let Err(e) = self.api.disconnect(&self.session.id).await {
            error!(session = %self.session.id, "backend disconnect failed: {e}");
        }
    }

    fn teardown(&mut self) {
        self.link = None;
        self.adapter.dispose();
        debug!(session = %self.session.id, "session actor finished");
    }

    // ── Outbound ──────────────────────────────────────────────────────────────

    async fn send_keepalive(&mut self) {
        let frame = match self.family {
            ProtocolFamily::Terminal => encode_message(&Message::ping()),
            ProtocolFamily::Graphical => {
                encode_instruction(&Instruction::new(opcode::NOP, Vec::<String>::new()))
            }
        };
        debug!(session = %self.session.id, "keepalive");
        self.send_text(frame).await;
    }

    /// One frame per instruction, so a clipboard stream reaches the gateway
    /// chunk by chunk.  Stops early once the transport is gone.
    async fn send_instructions(&mut self, instructions: &[Instruction]) {
        for instruction in instructions {
            if self.link.is_none() || self.connection.state().is_terminal() {
                return;
            }
            self.send_text(encode_instruction(instruction)).await;
        }
    }

    async fn send_text(&mut self, text: String) {
        let Some(outbound) = self.link.as_ref().map(|l| l.outbound.clone()) else {
            return;
        };
        if outbound.send(OutboundFrame::Text(text)).await.is_err() {
            self.fail_transport("transport writer closed");
        }
    }

    fn render(&mut self, instruction: &Instruction) {
        if let Adapter::Display(display) = &mut self.adapter {
            display.render(instruction);
        }
    }

    // ── Backend side effects ──────────────────────────────────────────────────

    fn notify_connected(&self) {
        let api = Arc::clone(&self.api);
        let id = self.session.id.clone();
        tokio::spawn(async move {
            if let Err(e) = api.mark_connected(&id).await {
                error!(session = %id, "mark_connected failed: {e}");
            }
        });
    }

    fn load_shortcuts(&self) {
        let api = Arc::clone(&self.api);
        let events = self.events.clone();
        let id = self.session.id.clone();
        tokio::spawn(async move {
            let event = match api.command_shortcuts().await {
                Ok(shortcuts) => SessionEvent::Shortcuts(shortcuts),
                Err(e) => {
                    warn!(session = %id, "loading command shortcuts failed: {e}");
                    SessionEvent::Warning(format!("command shortcuts unavailable: {e}"))
                }
            };
            let _ = events.send(event);
        });
    }

    fn report_resize(&self, width: u32, height: u32) {
        let api = Arc::clone(&self.api);
        let id = self.session.id.clone();
        tokio::spawn(async move {
            if let Err(e) = api.resize(&id, width, height).await {
                error!(session = %id, "resize report failed: {e}");
            }
        });
    }

    // ── State and events ──────────────────────────────────────────────────────

    fn advance(&mut self, to: ConnectionState) {
        match self.connection.transition(to) {
            Ok(transition) => self.announce(transition),
            Err(e) => warn!(session = %self.session.id, "{e}"),
        }
    }

    fn announce(&mut self, transition: Transition) {
        if let Transition::Changed { from, to } = transition {
            info!(session = %self.session.id, ?from, ?to, "state changed");
            self.state_tx.send_replace(to);
            self.publish(SessionEvent::StateChanged { from, to });
        }
    }

    fn publish(&self, event: SessionEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    fn report_warning(&self, message: String) {
        warn!(session = %self.session.id, "{message}");
        self.publish(SessionEvent::Warning(message));
    }
}

async fn next_inbound(link: &mut Option<TransportLink>) -> Option<InboundFrame> {
    match link {
        Some(link) => link.inbound.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::adapter::{RecordingDisplay, RecordingTerminal};
    use crate::infrastructure::api::MockSessionApi;
    use crate::infrastructure::transport::MemoryConnector;
    use bastion_core::RemoteProtocol;

    fn context(api: MockSessionApi, adapters: AdapterFactory) -> SessionContext {
        SessionContext {
            config: Arc::new(SessionConfig::new("ws://bastion.test/api", "token")),
            api: Arc::new(api),
            connector: Arc::new(MemoryConnector::new()),
            adapters,
        }
    }

    fn terminal_adapters() -> AdapterFactory {
        Arc::new(|_: &Session| Adapter::Terminal(Box::new(RecordingTerminal::new())))
    }

    #[tokio::test]
    async fn test_open_reports_backend_refusal() {
        // Arrange
        let mut api = MockSessionApi::new();
        api.expect_create_session()
            .times(1)
            .returning(|_, _| Err(ApiError::Rejected("asset locked".into())));
        api.expect_disconnect().never();
        let ctx = context(api, terminal_adapters());

        // Act
        let result =
            SessionHandle::open(&ctx, SessionRequest::access("db-1", ExecutionMode::Native)).await;

        // Assert
        assert!(matches!(result, Err(SessionError::Create { .. })));
    }

    #[tokio::test]
    async fn test_adapter_mismatch_releases_backend_session() {
        // Arrange: the backend says RDP, the factory only knows terminals
        let mut api = MockSessionApi::new();
        api.expect_create_session().returning(|asset, mode| {
            Ok(Session {
                id: SessionId::new("s-1"),
                asset_id: asset.clone(),
                mode,
                protocol: RemoteProtocol::Rdp,
            })
        });
        api.expect_disconnect()
            .withf(|id| id.as_str() == "s-1")
            .times(1)
            .returning(|_| Ok(()));
        let ctx = context(api, terminal_adapters());

        // Act
        let result =
            SessionHandle::open(&ctx, SessionRequest::access("win-1", ExecutionMode::Guacd)).await;

        // Assert
        assert!(matches!(
            result,
            Err(SessionError::AdapterMismatch {
                adapter: ProtocolFamily::Terminal,
                session: ProtocolFamily::Graphical,
            })
        ));
    }

    #[tokio::test]
    async fn test_monitor_handle_rejects_input_and_clipboard() {
        // Arrange
        let mut api = MockSessionApi::new();
        api.expect_create_session().returning(|asset, mode| {
            Ok(Session {
                id: SessionId::new("s-2"),
                asset_id: asset.clone(),
                mode,
                protocol: RemoteProtocol::Vnc,
            })
        });
        api.expect_disconnect().returning(|_| Ok(()));
        let adapters: AdapterFactory =
            Arc::new(|_: &Session| Adapter::Display(Box::new(RecordingDisplay::new())));
        let ctx = context(api, adapters);

        // Act
        let (handle, _events) =
            SessionHandle::open(&ctx, SessionRequest::monitor("vnc-1", ExecutionMode::Guacd))
                .await
                .unwrap();

        // Assert
        assert!(matches!(
            handle.send_clipboard(ClipboardPayload::text("x")),
            Err(SessionError::ReadOnly(_))
        ));
        assert!(matches!(
            handle.send_instruction(Instruction::new("key", ["65", "1"])),
            Err(SessionError::ReadOnly(_))
        ));
        handle.close().await;
    }

    #[tokio::test]
    async fn test_open_returns_in_connecting_state() {
        let mut api = MockSessionApi::new();
        api.expect_create_session().returning(|asset, mode| {
            Ok(Session {
                id: SessionId::new("s-3"),
                asset_id: asset.clone(),
                mode,
                protocol: RemoteProtocol::Ssh,
            })
        });
        api.expect_disconnect().returning(|_| Ok(()));
        let ctx = context(api, terminal_adapters());

        let (handle, mut events) =
            SessionHandle::open(&ctx, SessionRequest::access("web-1", ExecutionMode::Native))
                .await
                .unwrap();

        assert_eq!(handle.state(), ConnectionState::Connecting);
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::StateChanged {
                from: ConnectionState::Idle,
                to: ConnectionState::Connecting,
            }
        );
        assert!(matches!(
            handle.send_clipboard(ClipboardPayload::text("x")),
            Err(SessionError::Unsupported { .. })
        ));
        handle.close().await;
    }
}
