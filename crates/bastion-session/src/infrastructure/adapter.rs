//! Rendering adapters: where remote output ends up.
//!
//! A session owns exactly one adapter, chosen by its protocol family:
//!
//! - [`TerminalAdapter`] receives decoded terminal output.
//! - [`DisplayAdapter`] receives every gateway instruction the session core
//!   does not consume itself (drawing, audio, cursor...).
//!
//! The session calls `dispose` exactly once, after the transport is closed.
//!
//! Implementations here:
//!
//! | Type                 | Used by                  |
//! |----------------------|--------------------------|
//! | [`PrefixedTerminal`] | `bastion-batch` stdout   |
//! | [`HeadlessDisplay`]  | `bastion-batch`          |
//! | [`RecordingTerminal`]| tests                    |
//! | [`RecordingDisplay`] | tests                    |

use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{trace, warn};

use bastion_core::{Instruction, ProtocolFamily, Session};

pub trait TerminalAdapter: Send {
    fn write(&mut self, text: &str);
    fn dispose(&mut self) {}
}

pub trait DisplayAdapter: Send {
    fn render(&mut self, instruction: &Instruction);
    fn dispose(&mut self) {}
}

pub enum Adapter {
    Terminal(Box<dyn TerminalAdapter>),
    Display(Box<dyn DisplayAdapter>),
}

impl Adapter {
    pub fn family(&self) -> ProtocolFamily {
        match self {
            Adapter::Terminal(_) => ProtocolFamily::Terminal,
            Adapter::Display(_) => ProtocolFamily::Graphical,
        }
    }

    pub fn dispose(&mut self) {
        match self {
            Adapter::Terminal(t) => t.dispose(),
            Adapter::Display(d) => d.dispose(),
        }
    }
}

/// Builds the adapter for a freshly created session.
pub type AdapterFactory = Arc<dyn Fn(&Session) -> Adapter + Send + Sync>;

// ── PrefixedTerminal ──────────────────────────────────────────────────────────

/// Writes complete output lines to `W`, each prefixed with `[prefix] `.
///
/// Output arrives in arbitrary chunks; a partial line is held until its
/// newline arrives or the adapter is disposed.
pub struct PrefixedTerminal<W: Write + Send> {
    prefix: String,
    pending: String,
    writer: W,
}

impl PrefixedTerminal<std::io::Stdout> {
    pub fn stdout(prefix: impl Into<String>) -> Self {
        Self::new(prefix, std::io::stdout())
    }
}

impl<W: Write + Send> PrefixedTerminal<W> {
    pub fn new(prefix: impl Into<String>, writer: W) -> Self {
        Self {
            prefix: prefix.into(),
            pending: String::new(),
            writer,
        }
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    fn emit(&mut self, line: &str) {
        let line = line.trim_end_matches('\r');
        if let Err(e) = writeln!(self.writer, "[{}] {}", self.prefix, line) {
            warn!(prefix = %self.prefix, "terminal output write failed: {e}");
        }
    }
}

impl<W: Write + Send> TerminalAdapter for PrefixedTerminal<W> {
    fn write(&mut self, text: &str) {
        self.pending.push_str(text);
        while let Some(pos) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=pos).collect();
            self.emit(&line[..line.len() - 1]);
        }
    }

    fn dispose(&mut self) {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.emit(&rest);
        }
        let _ = self.writer.flush();
    }
}

// ── HeadlessDisplay ───────────────────────────────────────────────────────────

/// Discards display instructions.  Lets a graphical session run without a
/// renderer (batch runs, monitoring).
#[derive(Debug, Default)]
pub struct HeadlessDisplay {
    rendered: u64,
}

impl HeadlessDisplay {
    pub fn rendered(&self) -> u64 {
        self.rendered
    }
}

impl DisplayAdapter for HeadlessDisplay {
    fn render(&mut self, instruction: &Instruction) {
        self.rendered += 1;
        trace!(opcode = instruction.opcode(), "display instruction dropped");
    }
}

// ── Recording adapters ────────────────────────────────────────────────────────

#[derive(Default)]
struct TerminalRecord {
    text: String,
    disposals: usize,
}

/// Terminal adapter that keeps everything written to it.  Clones share the
/// same record, so a test can keep one clone and give the other away.
#[derive(Clone, Default)]
pub struct RecordingTerminal {
    record: Arc<Mutex<TerminalRecord>>,
}

impl RecordingTerminal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> String {
        self.lock().text.clone()
    }

    pub fn disposals(&self) -> usize {
        self.lock().disposals
    }

    fn lock(&self) -> MutexGuard<'_, TerminalRecord> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TerminalAdapter for RecordingTerminal {
    fn write(&mut self, text: &str) {
        self.lock().text.push_str(text);
    }

    fn dispose(&mut self) {
        self.lock().disposals += 1;
    }
}

#[derive(Default)]
struct DisplayRecord {
    instructions: Vec<Instruction>,
    disposals: usize,
}

#[derive(Clone, Default)]
pub struct RecordingDisplay {
    record: Arc<Mutex<DisplayRecord>>,
}

impl RecordingDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn instructions(&self) -> Vec<Instruction> {
        self.lock().instructions.clone()
    }

    pub fn disposals(&self) -> usize {
        self.lock().disposals
    }

    fn lock(&self) -> MutexGuard<'_, DisplayRecord> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DisplayAdapter for RecordingDisplay {
    fn render(&mut self, instruction: &Instruction) {
        self.lock().instructions.push(instruction.clone());
    }

    fn dispose(&mut self) {
        self.lock().disposals += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixed_terminal_holds_partial_lines() {
        // Arrange
        let mut term = PrefixedTerminal::new("web-1", Vec::new());

        // Act
        term.write("total 0\r\ndr");
        term.write("wx\n");
        term.write("prompt$ ");

        // Assert: the prompt has no newline yet
        assert_eq!(
            String::from_utf8_lossy(term.get_ref()),
            "[web-1] total 0\n[web-1] drwx\n"
        );

        term.dispose();
        assert!(String::from_utf8_lossy(term.get_ref()).ends_with("[web-1] prompt$ \n"));
    }

    #[test]
    fn test_recording_terminal_clones_share_state() {
        let recorder = RecordingTerminal::new();
        let mut adapter = recorder.clone();

        adapter.write("abc");
        adapter.dispose();

        assert_eq!(recorder.text(), "abc");
        assert_eq!(recorder.disposals(), 1);
    }

    #[test]
    fn test_adapter_family() {
        let terminal = Adapter::Terminal(Box::new(RecordingTerminal::new()));
        let display = Adapter::Display(Box::new(HeadlessDisplay::default()));
        assert_eq!(terminal.family(), ProtocolFamily::Terminal);
        assert_eq!(display.family(), ProtocolFamily::Graphical);
    }
}
