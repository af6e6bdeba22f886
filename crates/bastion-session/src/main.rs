//! bastion-batch: run one command line on many hosts through the bastion.
//!
//! Opens one terminal session per `--asset`, optionally runs `--command`
//! once on each as soon as it connects, then broadcasts every stdin line to
//! every connected session.  Output from each host is printed to stdout
//! prefixed with its asset id.  A host that fails is reported and the others
//! keep running.
//!
//! # Usage
//!
//! ```text
//! bastion-batch --asset web-1 --asset web-2 [OPTIONS]
//!
//! Options:
//!   --asset <ASSET_ID>        Asset to open (repeatable, required)
//!   --command <TEXT>          Command to run once per host on connect
//!   --mode <MODE>             native | guacd [default: native]
//!   --config <PATH>           Config file [default: platform config dir]
//!   --api-base <URL>          REST base URL
//!   --ws-base <URL>           WebSocket base URL
//!   --token <TOKEN>           Auth token
//!   --keepalive-secs <SECS>   Keepalive interval
//!   --log-level <LEVEL>       Default log level when RUST_LOG is unset
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable                 | Overrides           |
//! |--------------------------|---------------------|
//! | `BASTION_CONFIG`         | `--config`          |
//! | `BASTION_API_BASE`       | `[server] api_base` |
//! | `BASTION_WS_BASE`        | `[server] ws_base`  |
//! | `BASTION_TOKEN`          | `--token`           |
//! | `BASTION_KEEPALIVE_SECS` | `[session] keepalive_secs` |
//! | `BASTION_LOG`            | `[log] level`       |
//!
//! Flags beat environment variables, which beat the config file.
//!
//! Stdin EOF or Ctrl+C closes every session and exits.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use bastion_core::{ConnectionState, ExecutionMode, ProtocolFamily, Session};
use bastion_session::application::{FanOutCoordinator, SessionContext, SessionRequest};
use bastion_session::domain::{ConsoleConfig, GroupEvent, SessionEvent};
use bastion_session::infrastructure::{
    load_config, Adapter, HeadlessDisplay, HttpSessionApi, PrefixedTerminal, WsConnector,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(
    name = "bastion-batch",
    about = "Run commands on many hosts through a bastion",
    version
)]
struct Cli {
    /// Asset to open a session on.  Repeat for several hosts.
    #[arg(long = "asset", value_name = "ASSET_ID", required = true)]
    assets: Vec<String>,

    /// Command to run once on each host when it connects.
    #[arg(long)]
    command: Option<String>,

    /// Execution mode requested from the backend.
    #[arg(long, default_value = "native")]
    mode: ExecutionMode,

    /// Path of the console config file.
    #[arg(long, env = "BASTION_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, env = "BASTION_API_BASE")]
    api_base: Option<String>,

    #[arg(long, env = "BASTION_WS_BASE")]
    ws_base: Option<String>,

    /// Auth token for REST calls and transports.
    #[arg(long, env = "BASTION_TOKEN", hide_env_values = true)]
    token: String,

    #[arg(long, env = "BASTION_KEEPALIVE_SECS")]
    keepalive_secs: Option<u64>,

    /// Log level used when `RUST_LOG` is not set.
    #[arg(long, env = "BASTION_LOG")]
    log_level: Option<String>,
}

impl Cli {
    /// Layers the command-line values over the config file.
    fn apply_overrides(&self, mut config: ConsoleConfig) -> ConsoleConfig {
        if let Some(api_base) = &self.api_base {
            config.server.api_base = api_base.clone();
        }
        if let Some(ws_base) = &self.ws_base {
            config.server.ws_base = ws_base.clone();
        }
        if let Some(secs) = self.keepalive_secs {
            config.session.keepalive_secs = secs;
        }
        if let Some(level) = &self.log_level {
            config.log.level = level.clone();
        }
        config
    }

    fn requests(&self) -> Vec<SessionRequest> {
        self.assets
            .iter()
            .map(|asset| SessionRequest::access(asset.as_str(), self.mode))
            .collect()
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let file = load_config(cli.config.as_deref()).context("failed to load console config")?;
    let console = cli.apply_overrides(file);

    // Logs go to stderr; stdout carries host output only.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&console.log.level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let api = HttpSessionApi::new(&console.server.api_base, cli.token.clone())
        .with_context(|| format!("invalid API base URL '{}'", console.server.api_base))?;
    let ctx = SessionContext {
        config: Arc::new(console.session_config(cli.token.clone())),
        api: Arc::new(api),
        connector: Arc::new(WsConnector::new()),
        adapters: Arc::new(|session: &Session| match session.family() {
            ProtocolFamily::Terminal => Adapter::Terminal(Box::new(PrefixedTerminal::stdout(
                session.asset_id.to_string(),
            ))),
            ProtocolFamily::Graphical => Adapter::Display(Box::new(HeadlessDisplay::default())),
        }),
    };

    let mut group = FanOutCoordinator::new(ctx, cli.command.clone());
    let mut events = group.subscribe();

    let report = group.launch(cli.requests()).await;
    for (asset, e) in &report.failed {
        error!(asset = %asset, "{e}");
    }
    if group.is_empty() {
        anyhow::bail!("no session could be opened");
    }
    info!(members = group.len(), "fan-out group ready");

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    // Ends are read from the members' state, which a lagging event stream
    // cannot lose.
    let ended = group.all_ended();
    tokio::pin!(ended);

    loop {
        tokio::select! {
            line = stdin.next_line() => match line.context("failed to read stdin")? {
                Some(line) => match group.broadcast(&format!("{line}\r")) {
                    Ok(report) if !report.skipped.is_empty() => warn!(
                        delivered = report.delivered.len(),
                        skipped = report.skipped.len(),
                        "input not delivered to every host"
                    ),
                    Ok(_) => {}
                    Err(e) => warn!("{e}"),
                },
                None => {
                    info!("stdin closed");
                    break;
                }
            },

            event = events.recv() => match event {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event stream lagged"),
                Err(RecvError::Closed) => break,
            },

            () = &mut ended => {
                info!("all sessions ended");
                break;
            }

            _ = tokio::signal::ctrl_c() => {
                info!("received Ctrl+C, closing sessions");
                break;
            }
        }
    }

    group.shutdown().await;
    Ok(())
}

/// Logs one member event.
fn log_event(event: &GroupEvent) {
    let asset = &event.asset_id;
    match &event.event {
        SessionEvent::StateChanged {
            to: ConnectionState::Connected,
            ..
        } => info!(%asset, "connected"),
        SessionEvent::Failed(failure) => error!(%asset, "{failure}"),
        SessionEvent::Closed {
            reason: Some(reason),
        } => info!(%asset, "closed: {reason}"),
        SessionEvent::Warning(message) => warn!(%asset, "{message}"),
        _ => {}
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
