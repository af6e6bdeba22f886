//! Terminal geometry record carried by `Resize` messages.
//!
//! The record is serialized as JSON (`{"cols":80,"rows":24}`) and then
//! base64-encoded so it can travel as opaque text inside a message whose
//! content is otherwise free-form.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::protocol::codec::ProtocolError;

/// Terminal size in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizePayload {
    pub cols: u16,
    pub rows: u16,
}

impl ResizePayload {
    /// Returns the base64 text of the JSON record.
    pub fn encode(&self) -> String {
        // `Value`'s `Display` cannot fail, unlike `serde_json::to_string`.
        let json = serde_json::json!({ "cols": self.cols, "rows": self.rows }).to_string();
        STANDARD.encode(json)
    }

    /// Parses base64 text back into a size record.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::InvalidResizePayload`] if the text is not base64 or
    /// the decoded bytes are not a `{cols, rows}` JSON object.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let bytes = STANDARD
            .decode(text)
            .map_err(|e| ProtocolError::InvalidResizePayload(format!("base64: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ProtocolError::InvalidResizePayload(format!("json: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_is_base64_of_json_record() {
        let encoded = ResizePayload { cols: 80, rows: 24 }.encode();
        let json = STANDARD.decode(&encoded).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&json).unwrap();
        assert_eq!(value["cols"], 80);
        assert_eq!(value["rows"], 24);
    }

    #[test]
    fn test_payload_round_trips_through_base64() {
        let original = ResizePayload { cols: 211, rows: 57 };
        assert_eq!(ResizePayload::decode(&original.encode()), Ok(original));
    }

    #[test]
    fn test_decode_rejects_non_base64() {
        let result = ResizePayload::decode("not base64!!");
        assert!(matches!(result, Err(ProtocolError::InvalidResizePayload(_))));
    }

    #[test]
    fn test_decode_rejects_json_without_rows() {
        let text = STANDARD.encode(r#"{"cols":80}"#);
        let result = ResizePayload::decode(&text);
        assert!(matches!(result, Err(ProtocolError::InvalidResizePayload(_))));
    }
}
