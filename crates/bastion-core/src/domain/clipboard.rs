//! Clipboard values relayed between the local machine and a remote desktop.
//!
//! A [`ClipboardPayload`] only exists for the duration of one read or write;
//! it is never stored.

use serde::{Deserialize, Serialize};

/// Clipboard content: text, or an opaque binary blob (images, files).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipboardData {
    Text(String),
    Binary(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardPayload {
    pub mime_type: String,
    pub data: ClipboardData,
}

impl ClipboardPayload {
    /// Plain-text payload (`text/plain`).
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            mime_type: "text/plain".to_string(),
            data: ClipboardData::Text(text.into()),
        }
    }

    pub fn binary(mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: ClipboardData::Binary(bytes),
        }
    }

    /// Returns the payload bytes regardless of representation.
    pub fn as_bytes(&self) -> &[u8] {
        match &self.data {
            ClipboardData::Text(text) => text.as_bytes(),
            ClipboardData::Binary(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Returns `true` for mime types whose content is relayed as text.
pub fn is_textual_mime(mime_type: &str) -> bool {
    mime_type
        .split(';')
        .next()
        .map(|essence| essence.trim().to_ascii_lowercase().starts_with("text/"))
        .unwrap_or(false)
}

/// Session-level clipboard permissions.
///
/// `copy` allows remote → local (the remote publishes, we receive).
/// `paste` allows local → remote (we push our clipboard to the remote).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipboardPolicy {
    pub copy: bool,
    pub paste: bool,
}

impl Default for ClipboardPolicy {
    fn default() -> Self {
        Self {
            copy: true,
            paste: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_payload_is_text_plain() {
        let payload = ClipboardPayload::text("hi");
        assert_eq!(payload.mime_type, "text/plain");
        assert_eq!(payload.len(), 2);
    }

    #[test]
    fn test_is_textual_mime() {
        assert!(is_textual_mime("text/plain"));
        assert!(is_textual_mime("text/html; charset=utf-8"));
        assert!(is_textual_mime("TEXT/PLAIN"));
        assert!(!is_textual_mime("image/png"));
        assert!(!is_textual_mime("application/octet-stream"));
    }

    #[test]
    fn test_default_policy_allows_both_directions() {
        let policy = ClipboardPolicy::default();
        assert!(policy.copy);
        assert!(policy.paste);
    }
}
