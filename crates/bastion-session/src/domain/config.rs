//! Session configuration and the console configuration file schema.
//!
//! [`SessionConfig`] is an immutable value handed to every session handle
//! at construction.  Nothing in the session crate reads process-wide mutable
//! settings; two handles built from two configs never influence each other.
//!
//! [`ConsoleConfig`] mirrors the TOML file read by the `bastion-batch`
//! binary:
//!
//! ```toml
//! [server]
//! api_base = "https://bastion.example.com/api"
//! ws_base  = "wss://bastion.example.com/api"
//!
//! [session]
//! keepalive_secs = 5
//! cols = 80
//! rows = 24
//!
//! [log]
//! level = "info"
//! ```
//!
//! Every field has a serde default so a partial file (or an empty one) is
//! valid.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use bastion_core::{ClipboardPolicy, RemoteProtocol};

// ── Geometry ──────────────────────────────────────────────────────────────────

/// Terminal size in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalGeometry {
    pub cols: u16,
    pub rows: u16,
}

impl TerminalGeometry {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }

    /// Computes how many cells of `cell_width × cell_height` pixels fit in a
    /// `width × height` pixel area.  Never returns a zero dimension.
    pub fn fit(width: u32, height: u32, cell_width: u32, cell_height: u32) -> Self {
        let cells = |pixels: u32, cell: u32| -> u16 {
            let n = pixels / cell.max(1);
            n.clamp(1, u32::from(u16::MAX)) as u16
        };
        Self {
            cols: cells(width, cell_width),
            rows: cells(height, cell_height),
        }
    }
}

impl Default for TerminalGeometry {
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

/// Remote display size in CSS pixels plus DPI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayGeometry {
    pub width: u32,
    pub height: u32,
    pub dpi: u32,
}

impl DisplayGeometry {
    pub fn new(width: u32, height: u32, dpi: u32) -> Self {
        Self { width, height, dpi }
    }

    /// Multiplies every dimension by `factor`.
    pub fn scaled(self, factor: u32) -> Self {
        Self {
            width: self.width.saturating_mul(factor),
            height: self.height.saturating_mul(factor),
            dpi: self.dpi.saturating_mul(factor),
        }
    }
}

impl Default for DisplayGeometry {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 768,
            dpi: 96,
        }
    }
}

/// A viewport change reported by an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Viewport {
    Terminal(TerminalGeometry),
    Display(DisplayGeometry),
}

// ── SessionConfig ─────────────────────────────────────────────────────────────

/// Immutable configuration for one session handle.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Base URL of the WebSocket endpoints, e.g. `wss://host/api`.
    pub ws_base: String,
    /// Token sent as the `X-Auth-Token` query parameter.  Never logged.
    pub auth_token: String,
    /// Interval between keepalive pings while Connected.
    pub keepalive_interval: Duration,
    pub terminal_geometry: TerminalGeometry,
    pub display_geometry: DisplayGeometry,
    pub clipboard: ClipboardPolicy,
    /// Graphical sub-protocols that render at double density.
    pub high_density: Vec<RemoteProtocol>,
    /// Bound of each session's event broadcast channel.
    pub event_capacity: usize,
}

impl SessionConfig {
    pub fn new(ws_base: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            ws_base: ws_base.into(),
            auth_token: auth_token.into(),
            keepalive_interval: Duration::from_secs(5),
            terminal_geometry: TerminalGeometry::default(),
            display_geometry: DisplayGeometry::default(),
            clipboard: ClipboardPolicy::default(),
            high_density: vec![RemoteProtocol::Rdp],
            event_capacity: 256,
        }
    }

    /// Density multiplier applied to display geometry for `protocol`.
    pub fn density_scale(&self, protocol: RemoteProtocol) -> u32 {
        if self.high_density.contains(&protocol) {
            2
        } else {
            1
        }
    }
}

// ── ConsoleConfig (TOML file) ─────────────────────────────────────────────────

/// Root of the console configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsoleConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub log: LogSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSection {
    /// REST base URL.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// WebSocket base URL.
    #[serde(default = "default_ws_base")]
    pub ws_base: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            ws_base: default_ws_base(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSection {
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
    #[serde(default = "default_cols")]
    pub cols: u16,
    #[serde(default = "default_rows")]
    pub rows: u16,
    #[serde(default = "default_true")]
    pub clipboard_copy: bool,
    #[serde(default = "default_true")]
    pub clipboard_paste: bool,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            keepalive_secs: default_keepalive_secs(),
            cols: default_cols(),
            rows: default_rows(),
            clipboard_copy: true,
            clipboard_paste: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ConsoleConfig {
    /// Builds the per-session configuration from the file values.
    pub fn session_config(&self, auth_token: impl Into<String>) -> SessionConfig {
        let mut config = SessionConfig::new(self.server.ws_base.clone(), auth_token);
        config.keepalive_interval = Duration::from_secs(self.session.keepalive_secs.max(1));
        config.terminal_geometry = TerminalGeometry::new(self.session.cols, self.session.rows);
        config.clipboard = ClipboardPolicy {
            copy: self.session.clipboard_copy,
            paste: self.session.clipboard_paste,
        };
        config
    }
}

fn default_api_base() -> String {
    "http://127.0.0.1:8088/api".to_string()
}
fn default_ws_base() -> String {
    "ws://127.0.0.1:8088/api".to_string()
}
fn default_keepalive_secs() -> u64 {
    5
}
fn default_cols() -> u16 {
    80
}
fn default_rows() -> u16 {
    24
}
fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_defaults() {
        let config = SessionConfig::new("ws://h", "t");
        assert_eq!(config.keepalive_interval, Duration::from_secs(5));
        assert_eq!(config.terminal_geometry, TerminalGeometry::new(80, 24));
        assert_eq!(config.display_geometry, DisplayGeometry::new(1024, 768, 96));
        assert!(config.clipboard.copy && config.clipboard.paste);
    }

    #[test]
    fn test_rdp_renders_at_double_density() {
        let config = SessionConfig::new("ws://h", "t");
        assert_eq!(config.density_scale(RemoteProtocol::Rdp), 2);
        assert_eq!(config.density_scale(RemoteProtocol::Vnc), 1);
    }

    #[test]
    fn test_fit_never_returns_zero() {
        assert_eq!(TerminalGeometry::fit(0, 0, 9, 17), TerminalGeometry::new(1, 1));
        assert_eq!(TerminalGeometry::fit(900, 340, 9, 17), TerminalGeometry::new(100, 20));
        assert_eq!(TerminalGeometry::fit(100, 100, 0, 0), TerminalGeometry::new(100, 100));
    }

    #[test]
    fn test_scaled_display_geometry() {
        let scaled = DisplayGeometry::new(800, 600, 96).scaled(2);
        assert_eq!(scaled, DisplayGeometry::new(1600, 1200, 192));
    }

    #[test]
    fn test_empty_toml_yields_defaults() {
        let config: ConsoleConfig = toml::from_str("").unwrap();
        assert_eq!(config, ConsoleConfig::default());
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        // Arrange
        let text = r#"
            [server]
            ws_base = "wss://jump.example.com/api"

            [session]
            keepalive_secs = 8
        "#;

        // Act
        let config: ConsoleConfig = toml::from_str(text).unwrap();
        let session = config.session_config("secret");

        // Assert
        assert_eq!(config.server.api_base, default_api_base());
        assert_eq!(session.ws_base, "wss://jump.example.com/api");
        assert_eq!(session.keepalive_interval, Duration::from_secs(8));
        assert_eq!(session.terminal_geometry, TerminalGeometry::new(80, 24));
    }
}
