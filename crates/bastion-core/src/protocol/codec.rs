//! Codec for terminal-family session messages.
//!
//! Wire format:
//! ```text
//! <type:1 ASCII digit><content:remaining UTF-8 text>
//! ```
//!
//! | digit | type        | content                                  |
//! |-------|-------------|------------------------------------------|
//! | `0`   | `Closed`    | close reason (may be empty)              |
//! | `1`   | `Connected` | empty                                    |
//! | `2`   | `Data`      | terminal input or output text            |
//! | `3`   | `Resize`    | base64 of `{"cols":N,"rows":N}`          |
//! | `4`   | `Ping`      | empty                                    |
//!
//! # Framing assumption
//!
//! There is no length prefix and no escaping.  The format relies on the
//! transport delivering exactly one message per frame (one WebSocket text
//! frame = one message).  Because the type is always exactly one character,
//! content that itself starts with a digit is unambiguous: `"22abc"` decodes
//! as `Data("2abc")`.
//!
//! Decoding is hardened: an empty frame or a type character outside `0`–`4`
//! is rejected with a [`ProtocolError`] instead of being mis-parsed.

use std::fmt;

use thiserror::Error;

use crate::protocol::resize::ResizePayload;

/// Errors that can occur while encoding or decoding session frames.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The frame carried no bytes at all.
    #[error("empty frame")]
    EmptyFrame,

    /// The leading type character is not one of `0`–`4`.
    #[error("unknown message type: {0:?}")]
    UnknownMessageType(char),

    /// The message had a different type than the caller required.
    #[error("expected a {expected} message, got {found}")]
    UnexpectedMessageType {
        expected: MessageType,
        found: MessageType,
    },

    /// The resize payload was not base64-encoded `{cols, rows}` JSON.
    #[error("invalid resize payload: {0}")]
    InvalidResizePayload(String),

    /// A graphical-family instruction violated the length-prefixed framing.
    #[error("malformed instruction at byte {offset}: {reason}")]
    MalformedInstruction { offset: usize, reason: String },
}

// ── Message type ──────────────────────────────────────────────────────────────

/// The five message kinds of the terminal-family protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Closed = 0,
    Connected = 1,
    Data = 2,
    Resize = 3,
    Ping = 4,
}

impl MessageType {
    /// All message types in wire order.
    pub const ALL: [MessageType; 5] = [
        MessageType::Closed,
        MessageType::Connected,
        MessageType::Data,
        MessageType::Resize,
        MessageType::Ping,
    ];

    /// Returns the single ASCII digit that prefixes this type on the wire.
    pub fn digit(self) -> char {
        char::from(b'0' + self as u8)
    }
}

impl TryFrom<char> for MessageType {
    type Error = ProtocolError;

    fn try_from(value: char) -> Result<Self, Self::Error> {
        match value {
            '0' => Ok(MessageType::Closed),
            '1' => Ok(MessageType::Connected),
            '2' => Ok(MessageType::Data),
            '3' => Ok(MessageType::Resize),
            '4' => Ok(MessageType::Ping),
            other => Err(ProtocolError::UnknownMessageType(other)),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::Closed => "Closed",
            MessageType::Connected => "Connected",
            MessageType::Data => "Data",
            MessageType::Resize => "Resize",
            MessageType::Ping => "Ping",
        };
        f.write_str(name)
    }
}

// ── Message ───────────────────────────────────────────────────────────────────

/// One terminal-family wire unit.
///
/// Messages are immutable values: one is built per send or receive event and
/// then dropped.  Use the named constructors rather than [`Message::new`]
/// where one exists, so the content always has the shape the remote expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    kind: MessageType,
    content: String,
}

impl Message {
    pub fn new(kind: MessageType, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
        }
    }

    /// Terminal input (outbound) or output (inbound).
    pub fn data(text: impl Into<String>) -> Self {
        Self::new(MessageType::Data, text)
    }

    /// Keepalive ping with empty content.
    pub fn ping() -> Self {
        Self::new(MessageType::Ping, String::new())
    }

    pub fn connected() -> Self {
        Self::new(MessageType::Connected, String::new())
    }

    pub fn closed(reason: impl Into<String>) -> Self {
        Self::new(MessageType::Closed, reason)
    }

    /// Geometry update; the content is the base64-encoded `{cols, rows}` record.
    pub fn resize(cols: u16, rows: u16) -> Self {
        Self::new(MessageType::Resize, ResizePayload { cols, rows }.encode())
    }

    pub fn kind(&self) -> MessageType {
        self.kind
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn into_content(self) -> String {
        self.content
    }

    /// Decodes the geometry carried by a `Resize` message.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::UnexpectedMessageType`] for any other message type,
    /// [`ProtocolError::InvalidResizePayload`] if the content is not a valid
    /// encoded size record.
    pub fn resize_payload(&self) -> Result<ResizePayload, ProtocolError> {
        if self.kind != MessageType::Resize {
            return Err(ProtocolError::UnexpectedMessageType {
                expected: MessageType::Resize,
                found: self.kind,
            });
        }
        ResizePayload::decode(&self.content)
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a type and content into a wire string: `str(type) + content`.
///
/// # Examples
///
/// ```rust
/// use bastion_core::protocol::codec::{encode, MessageType};
///
/// assert_eq!(encode(MessageType::Data, "ls\n"), "2ls\n");
/// assert_eq!(encode(MessageType::Ping, ""), "4");
/// ```
pub fn encode(kind: MessageType, content: &str) -> String {
    let mut frame = String::with_capacity(1 + content.len());
    frame.push(kind.digit());
    frame.push_str(content);
    frame
}

/// Encodes a [`Message`] into its wire string.
pub fn encode_message(msg: &Message) -> String {
    encode(msg.kind, &msg.content)
}

/// Decodes one wire frame into a [`Message`].
///
/// The first character selects the type; everything after it is the content,
/// verbatim.
///
/// # Errors
///
/// [`ProtocolError::EmptyFrame`] for an empty frame and
/// [`ProtocolError::UnknownMessageType`] when the first character is not a
/// known type digit.
///
/// # Examples
///
/// ```rust
/// use bastion_core::protocol::codec::{decode_message, MessageType};
///
/// let msg = decode_message("2hello").unwrap();
/// assert_eq!(msg.kind(), MessageType::Data);
/// assert_eq!(msg.content(), "hello");
/// ```
pub fn decode_message(frame: &str) -> Result<Message, ProtocolError> {
    let mut chars = frame.chars();
    let first = chars.next().ok_or(ProtocolError::EmptyFrame)?;
    let kind = MessageType::try_from(first)?;
    // Type digits are ASCII, so the content starts at byte 1.
    Ok(Message::new(kind, &frame[1..]))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
