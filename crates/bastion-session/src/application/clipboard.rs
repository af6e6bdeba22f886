//! Clipboard bridge for graphical sessions.
//!
//! Clipboard content moves as a gateway *stream*: `clipboard,<index>,<mime>`
//! opens it, `blob,<index>,<base64>` carries chunks and `end,<index>`
//! closes it.
//!
//! - Outbound (local → remote, "paste"): one stream per payload.  Data is
//!   split into chunks of at most [`BLOB_CHUNK_BYTES`]; text is only split
//!   on character boundaries so every blob is valid UTF-8 on its own.
//! - Inbound (remote → local, "copy"): chunks are accumulated and the
//!   payload is published once, on `end`.  Each accepted blob is acked with
//!   `ack,<index>,OK,0`.  Only one inbound stream is accepted at a time; a
//!   second one is refused with `ack,<index>,<reason>,256`.
//!
//! Both directions check the session's [`ClipboardPolicy`] before any
//! stream is opened.  A failed stream is reported as a [`ClipboardError`];
//! it never affects the connection.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use thiserror::Error;
use tracing::debug;

use bastion_core::protocol::instruction::opcode;
use bastion_core::{
    domain::clipboard::is_textual_mime, ClipboardData, ClipboardPayload, ClipboardPolicy,
    Instruction,
};

/// Bytes per outbound blob, before base64.
pub const BLOB_CHUNK_BYTES: usize = 6 * 1024;

const STATUS_OK: u16 = 0;
const STATUS_UNSUPPORTED: u16 = 256;
const STATUS_BAD_REQUEST: u16 = 768;
const STATUS_FORBIDDEN: u16 = 771;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipboardDirection {
    /// Remote → local.
    Copy,
    /// Local → remote.
    Paste,
}

impl fmt::Display for ClipboardDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ClipboardDirection::Copy => "copy",
            ClipboardDirection::Paste => "paste",
        })
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClipboardError {
    #[error("clipboard {0} is disabled for this session")]
    Denied(ClipboardDirection),

    #[error("clipboard stream {rejected} refused: stream {active} is still open")]
    ConcurrentStream { active: String, rejected: String },

    #[error("malformed clipboard instruction: {0}")]
    Malformed(String),

    #[error("clipboard stream {0} carried an invalid base64 chunk")]
    InvalidChunk(String),

    #[error("clipboard stream {0} is not valid UTF-8 text")]
    InvalidText(String),
}

/// What the session must do after feeding an inbound instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundOutcome {
    /// Not a clipboard stream this bridge owns; pass it to the display.
    Ignored,
    /// Send `replies`; nothing else happened.
    Progress { replies: Vec<Instruction> },
    /// A stream completed.
    Published { payload: ClipboardPayload },
    /// A stream was refused or abandoned.  Send `replies` and report `error`.
    Rejected {
        error: ClipboardError,
        replies: Vec<Instruction>,
    },
}

#[derive(Debug)]
struct InboundStream {
    index: String,
    mime_type: String,
    buffer: Vec<u8>,
}

#[derive(Debug)]
pub struct ClipboardBridge {
    policy: ClipboardPolicy,
    next_index: u32,
    inbound: Option<InboundStream>,
}

impl ClipboardBridge {
    pub fn new(policy: ClipboardPolicy) -> Self {
        Self {
            policy,
            next_index: 0,
            inbound: None,
        }
    }

    /// Number of outbound streams opened so far.
    pub fn streams_opened(&self) -> u32 {
        self.next_index
    }

    pub fn inbound_open(&self) -> bool {
        self.inbound.is_some()
    }

    /// Builds the instructions for pushing `payload` to the remote side.
    ///
    /// # Errors
    ///
    /// [`ClipboardError::Denied`] when paste is disabled.  No stream index
    /// is consumed in that case.
    pub fn outbound(
        &mut self,
        payload: &ClipboardPayload,
    ) -> Result<Vec<Instruction>, ClipboardError> {
        if !self.policy.paste {
            return Err(ClipboardError::Denied(ClipboardDirection::Paste));
        }

        let index = self.next_index.to_string();
        self.next_index = self.next_index.wrapping_add(1);

        let mut instructions = vec![Instruction::new(
            opcode::CLIPBOARD,
            [index.clone(), payload.mime_type.clone()],
        )];
        match &payload.data {
            ClipboardData::Text(text) => {
                instructions.extend(
                    text_chunks(text, BLOB_CHUNK_BYTES).map(|c| blob(&index, c.as_bytes())),
                );
            }
            ClipboardData::Binary(bytes) => {
                instructions.extend(bytes.chunks(BLOB_CHUNK_BYTES).map(|c| blob(&index, c)));
            }
        }
        instructions.push(Instruction::new(opcode::END, [index]));

        debug!(
            mime = %payload.mime_type,
            bytes = payload.len(),
            "clipboard stream prepared"
        );
        Ok(instructions)
    }

    /// Feeds one inbound instruction.  Anything other than a clipboard
    /// stream instruction is [`InboundOutcome::Ignored`].
    pub fn inbound(&mut self, instruction: &Instruction) -> InboundOutcome {
        match instruction.opcode() {
            opcode::CLIPBOARD => self.open_inbound(instruction),
            opcode::BLOB => self.inbound_blob(instruction),
            opcode::END => self.end_inbound(instruction),
            _ => InboundOutcome::Ignored,
        }
    }

    fn open_inbound(&mut self, instruction: &Instruction) -> InboundOutcome {
        let (Some(index), Some(mime_type)) = (instruction.arg(0), instruction.arg(1)) else {
            return InboundOutcome::Rejected {
                error: ClipboardError::Malformed(instruction.to_string()),
                replies: Vec::new(),
            };
        };

        if !self.policy.copy {
            return InboundOutcome::Rejected {
                error: ClipboardError::Denied(ClipboardDirection::Copy),
                replies: vec![ack(index, "clipboard copy disabled", STATUS_FORBIDDEN)],
            };
        }

        if let Some(active) = &self.inbound {
            return InboundOutcome::Rejected {
                error: ClipboardError::ConcurrentStream {
                    active: active.index.clone(),
                    rejected: index.to_string(),
                },
                replies: vec![ack(index, "clipboard stream already open", STATUS_UNSUPPORTED)],
            };
        }

        self.inbound = Some(InboundStream {
            index: index.to_string(),
            mime_type: mime_type.to_string(),
            buffer: Vec::new(),
        });
        InboundOutcome::Progress {
            replies: Vec::new(),
        }
    }

    fn inbound_blob(&mut self, instruction: &Instruction) -> InboundOutcome {
        let Some(stream) = self.owned_stream(instruction) else {
            return InboundOutcome::Ignored;
        };
        let data = instruction.arg(1).unwrap_or_default();
        match STANDARD.decode(data) {
            Ok(bytes) => {
                stream.buffer.extend_from_slice(&bytes);
                let reply = ack(&stream.index, "OK", STATUS_OK);
                InboundOutcome::Progress {
                    replies: vec![reply],
                }
            }
            Err(_) => {
                let index = stream.index.clone();
                self.inbound = None;
                InboundOutcome::Rejected {
                    replies: vec![ack(&index, "invalid clipboard data", STATUS_BAD_REQUEST)],
                    error: ClipboardError::InvalidChunk(index),
                }
            }
        }
    }

    fn end_inbound(&mut self, instruction: &Instruction) -> InboundOutcome {
        if self.owned_stream(instruction).is_none() {
            return InboundOutcome::Ignored;
        }
        let Some(stream) = self.inbound.take() else {
            return InboundOutcome::Ignored;
        };

        let payload = if is_textual_mime(&stream.mime_type) {
            match String::from_utf8(stream.buffer) {
                Ok(text) => ClipboardPayload {
                    mime_type: stream.mime_type,
                    data: ClipboardData::Text(text),
                },
                Err(_) => {
                    return InboundOutcome::Rejected {
                        error: ClipboardError::InvalidText(stream.index),
                        replies: Vec::new(),
                    }
                }
            }
        } else {
            ClipboardPayload::binary(stream.mime_type, stream.buffer)
        };
        InboundOutcome::Published { payload }
    }

    /// The open inbound stream, if `instruction` targets it.
    fn owned_stream(&mut self, instruction: &Instruction) -> Option<&mut InboundStream> {
        let index = instruction.arg(0)?;
        self.inbound.as_mut().filter(|s| s.index == index)
    }
}

/// Splits `text` into pieces of at most `max` bytes, never inside a
/// character.  A character wider than `max` gets a piece of its own.
fn text_chunks(text: &str, max: usize) -> impl Iterator<Item = &str> {
    let mut rest = text;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        let mut end = rest.len().min(max);
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        if end == 0 {
            end = rest.chars().next().map_or(rest.len(), char::len_utf8);
        }
        let (head, tail) = rest.split_at(end);
        rest = tail;
        Some(head)
    })
}

fn blob(index: &str, bytes: &[u8]) -> Instruction {
    Instruction::new(opcode::BLOB, [index.to_string(), STANDARD.encode(bytes)])
}

fn ack(index: &str, message: &str, code: u16) -> Instruction {
    Instruction::new(
        opcode::ACK,
        [index.to_string(), message.to_string(), code.to_string()],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ins(opcode: &str, args: &[&str]) -> Instruction {
        Instruction::new(opcode, args.iter().copied())
    }

    fn bridge(copy: bool, paste: bool) -> ClipboardBridge {
        ClipboardBridge::new(ClipboardPolicy { copy, paste })
    }

    // ── Outbound ──────────────────────────────────────────────────────────────

    #[test]
    fn test_short_text_is_one_blob() {
        // Arrange
        let mut bridge = bridge(true, true);

        // Act
        let out = bridge.outbound(&ClipboardPayload::text("hello")).unwrap();

        // Assert
        assert_eq!(
            out,
            vec![
                ins("clipboard", &["0", "text/plain"]),
                ins("blob", &["0", "aGVsbG8="]),
                ins("end", &["0"]),
            ]
        );
    }

    #[test]
    fn test_empty_text_sends_no_blob() {
        let mut bridge = bridge(true, true);

        let out = bridge.outbound(&ClipboardPayload::text("")).unwrap();

        assert_eq!(
            out,
            vec![ins("clipboard", &["0", "text/plain"]), ins("end", &["0"])]
        );
    }

    #[test]
    fn test_long_text_is_chunked_on_char_boundaries() {
        // Arrange: the leading byte pushes the 3-byte characters off the
        // chunk size.
        let mut bridge = bridge(true, true);
        let text = format!("a{}", "€".repeat(BLOB_CHUNK_BYTES));

        // Act
        let out = bridge.outbound(&ClipboardPayload::text(text.clone())).unwrap();

        // Assert: every blob fits and decodes to whole characters.
        let pieces: Vec<String> = out
            .iter()
            .filter(|i| i.opcode() == "blob")
            .map(|i| {
                let bytes = STANDARD.decode(i.arg(1).unwrap()).unwrap();
                assert!(bytes.len() <= BLOB_CHUNK_BYTES);
                String::from_utf8(bytes).unwrap()
            })
            .collect();
        assert!(pieces.len() >= 3);
        assert_eq!(pieces.concat(), text);
        assert_eq!(out.first().unwrap().opcode(), "clipboard");
        assert_eq!(out.last().unwrap().opcode(), "end");
    }

    #[test]
    fn test_text_chunks_keep_wide_characters_whole() {
        let chunks: Vec<&str> = text_chunks("a€b", 2).collect();
        assert_eq!(chunks, vec!["a", "€", "b"]);
    }

    #[test]
    fn test_outbound_binary_is_chunked() {
        let mut bridge = bridge(true, true);
        let bytes = vec![7u8; BLOB_CHUNK_BYTES * 2 + 1];

        let out = bridge
            .outbound(&ClipboardPayload::binary("image/png", bytes))
            .unwrap();

        let blobs = out.iter().filter(|i| i.opcode() == "blob").count();
        assert_eq!(blobs, 3);
        assert_eq!(out.first().unwrap().opcode(), "clipboard");
        assert_eq!(out.last().unwrap().opcode(), "end");
    }

    #[test]
    fn test_paste_disabled_opens_no_stream() {
        // Arrange
        let mut bridge = bridge(true, false);

        // Act
        let result = bridge.outbound(&ClipboardPayload::text("secret"));

        // Assert: denied before any stream index is consumed
        assert_eq!(
            result,
            Err(ClipboardError::Denied(ClipboardDirection::Paste))
        );
        assert_eq!(bridge.streams_opened(), 0);
    }

    #[test]
    fn test_outbound_streams_get_fresh_indices() {
        let mut bridge = bridge(true, true);
        bridge.outbound(&ClipboardPayload::text("a")).unwrap();
        let second = bridge.outbound(&ClipboardPayload::text("b")).unwrap();
        assert_eq!(second[0].arg(0), Some("1"));
    }

    // ── Inbound ───────────────────────────────────────────────────────────────

    #[test]
    fn test_inbound_stream_publishes_on_end() {
        // Arrange
        let mut bridge = bridge(true, true);

        // Act
        let open = bridge.inbound(&ins("clipboard", &["4", "text/plain"]));
        let first = bridge.inbound(&ins("blob", &["4", "aGVs"]));
        let second = bridge.inbound(&ins("blob", &["4", "bG8="]));
        let end = bridge.inbound(&ins("end", &["4"]));

        // Assert
        assert_eq!(open, InboundOutcome::Progress { replies: vec![] });
        assert_eq!(
            first,
            InboundOutcome::Progress {
                replies: vec![ins("ack", &["4", "OK", "0"])]
            }
        );
        assert!(matches!(second, InboundOutcome::Progress { .. }));
        assert_eq!(
            end,
            InboundOutcome::Published {
                payload: ClipboardPayload::text("hello")
            }
        );
        assert!(!bridge.inbound_open());
    }

    #[test]
    fn test_binary_inbound_stream_stays_binary() {
        let mut bridge = bridge(true, true);
        bridge.inbound(&ins("clipboard", &["1", "image/png"]));
        bridge.inbound(&ins("blob", &["1", "AAEC"]));

        let end = bridge.inbound(&ins("end", &["1"]));

        assert_eq!(
            end,
            InboundOutcome::Published {
                payload: ClipboardPayload::binary("image/png", vec![0, 1, 2])
            }
        );
    }

    #[test]
    fn test_copy_disabled_refuses_inbound_stream() {
        let mut bridge = bridge(false, true);

        let outcome = bridge.inbound(&ins("clipboard", &["2", "text/plain"]));

        assert_eq!(
            outcome,
            InboundOutcome::Rejected {
                error: ClipboardError::Denied(ClipboardDirection::Copy),
                replies: vec![ins("ack", &["2", "clipboard copy disabled", "771"])],
            }
        );
        assert!(!bridge.inbound_open());
    }

    #[test]
    fn test_concurrent_inbound_stream_is_refused() {
        // Arrange
        let mut bridge = bridge(true, true);
        bridge.inbound(&ins("clipboard", &["1", "text/plain"]));

        // Act
        let outcome = bridge.inbound(&ins("clipboard", &["2", "text/plain"]));

        // Assert: second stream refused, first still open
        match outcome {
            InboundOutcome::Rejected { error, replies } => {
                assert_eq!(
                    error,
                    ClipboardError::ConcurrentStream {
                        active: "1".into(),
                        rejected: "2".into()
                    }
                );
                assert_eq!(replies[0].arg(0), Some("2"));
                assert_eq!(replies[0].arg(2), Some("256"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(bridge.inbound_open());
    }

    #[test]
    fn test_invalid_blob_abandons_stream() {
        let mut bridge = bridge(true, true);
        bridge.inbound(&ins("clipboard", &["1", "text/plain"]));

        let outcome = bridge.inbound(&ins("blob", &["1", "!!not base64!!"]));

        assert!(matches!(
            outcome,
            InboundOutcome::Rejected {
                error: ClipboardError::InvalidChunk(_),
                ..
            }
        ));
        assert!(!bridge.inbound_open());
    }

    #[test]
    fn test_foreign_streams_and_opcodes_are_ignored() {
        let mut bridge = bridge(true, true);
        bridge.inbound(&ins("clipboard", &["1", "text/plain"]));

        assert_eq!(bridge.inbound(&ins("blob", &["9", "AAAA"])), InboundOutcome::Ignored);
        assert_eq!(bridge.inbound(&ins("end", &["9"])), InboundOutcome::Ignored);
        assert_eq!(
            bridge.inbound(&ins("png", &["0", "0", "0", "0"])),
            InboundOutcome::Ignored
        );
    }

    #[test]
    fn test_invalid_utf8_text_is_rejected() {
        let mut bridge = bridge(true, true);
        bridge.inbound(&ins("clipboard", &["1", "text/plain"]));
        bridge.inbound(&ins("blob", &["1", &STANDARD.encode([0xff, 0xfe])]));

        let outcome = bridge.inbound(&ins("end", &["1"]));

        assert!(matches!(
            outcome,
            InboundOutcome::Rejected {
                error: ClipboardError::InvalidText(_),
                ..
            }
        ));
    }
}
