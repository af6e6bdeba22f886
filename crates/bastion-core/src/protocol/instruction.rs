//! Length-prefixed instruction framing for graphical-family sessions.
//!
//! The display gateway speaks in *instructions*: an opcode followed by zero
//! or more string arguments.  Every element is prefixed with its length in
//! Unicode scalar values and a dot; elements are separated by `,` and the
//! instruction ends with `;`.
//!
//! ```text
//! 4.size,4.1024,3.768,2.96;
//! ^ ^    ^ ^
//! | |    | └ element value
//! | |    └ element length
//! | └ opcode
//! └ opcode length
//! ```
//!
//! Unlike the terminal codec, this framing is self-delimiting, so a single
//! transport frame may carry several instructions back to back.
//!
//! Only the control-plane opcodes listed in [`opcode`] are interpreted by
//! the session core.  Everything else is handed to the external display
//! engine untouched.

use std::fmt;

use crate::protocol::codec::ProtocolError;

/// Control-plane opcodes interpreted by the session core.
pub mod opcode {
    pub const ACK: &str = "ack";
    pub const BLOB: &str = "blob";
    pub const CLIPBOARD: &str = "clipboard";
    pub const DISCONNECT: &str = "disconnect";
    pub const END: &str = "end";
    pub const ERROR: &str = "error";
    pub const NOP: &str = "nop";
    pub const SIZE: &str = "size";
    pub const SYNC: &str = "sync";
}

/// One display-gateway instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    opcode: String,
    args: Vec<String>,
}

impl Instruction {
    pub fn new<I, S>(opcode: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            opcode: opcode.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn opcode(&self) -> &str {
        &self.opcode
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Returns the argument at `index`, if present.
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    pub fn encode(&self) -> String {
        encode_instruction(self)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Encodes an instruction into its length-prefixed wire form.
///
/// # Examples
///
/// ```rust
/// use bastion_core::protocol::instruction::{encode_instruction, Instruction};
///
/// let ins = Instruction::new("size", ["1024", "768", "96"]);
/// assert_eq!(encode_instruction(&ins), "4.size,4.1024,3.768,2.96;");
/// ```
pub fn encode_instruction(instruction: &Instruction) -> String {
    let mut out = String::new();
    push_element(&mut out, &instruction.opcode);
    for arg in &instruction.args {
        out.push(',');
        push_element(&mut out, arg);
    }
    out.push(';');
    out
}

fn push_element(out: &mut String, value: &str) {
    out.push_str(&value.chars().count().to_string());
    out.push('.');
    out.push_str(value);
}

/// Decodes every instruction contained in one transport frame.
///
/// # Errors
///
/// [`ProtocolError::EmptyFrame`] for an empty frame, and
/// [`ProtocolError::MalformedInstruction`] when a length prefix is missing or
/// not a number, an element is shorter than its declared length, or an
/// element is not followed by `,` or `;`.
pub fn decode_instructions(frame: &str) -> Result<Vec<Instruction>, ProtocolError> {
    if frame.is_empty() {
        return Err(ProtocolError::EmptyFrame);
    }

    let mut instructions = Vec::new();
    let mut rest = frame;

    while !rest.is_empty() {
        let mut elements: Vec<String> = Vec::new();
        loop {
            let offset = frame.len() - rest.len();
            let dot = rest
                .find('.')
                .ok_or_else(|| malformed(offset, "missing length prefix"))?;
            let len_text = &rest[..dot];
            if len_text.is_empty() || !len_text.bytes().all(|b| b.is_ascii_digit()) {
                return Err(malformed(offset, "length prefix is not a number"));
            }
            let len: usize = len_text
                .parse()
                .map_err(|_| malformed(offset, "length prefix out of range"))?;

            let body = &rest[dot + 1..];
            // The terminator must follow exactly `len` characters.
            let (end, terminator) = body
                .char_indices()
                .nth(len)
                .ok_or_else(|| malformed(offset, "element shorter than its length"))?;

            elements.push(body[..end].to_owned());
            // Both terminators are single-byte ASCII.
            rest = &body[end + 1..];

            match terminator {
                ',' => continue,
                ';' => break,
                _ => return Err(malformed(offset, "element not followed by ',' or ';'")),
            }
        }

        let mut elements = elements.into_iter();
        let opcode = elements.next().unwrap_or_default();
        instructions.push(Instruction {
            opcode,
            args: elements.collect(),
        });
    }

    Ok(instructions)
}

fn malformed(offset: usize, reason: &str) -> ProtocolError {
    ProtocolError::MalformedInstruction {
        offset,
        reason: reason.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_opcode_without_args() {
        assert_eq!(Instruction::new("nop", Vec::<String>::new()).encode(), "3.nop;");
    }

    #[test]
    fn test_encode_counts_characters_not_bytes() {
        let ins = Instruction::new("blob", ["0", "héllo"]);
        assert_eq!(ins.encode(), "4.blob,1.0,5.héllo;");
    }

    #[test]
    fn test_decode_single_instruction() {
        // Act
        let decoded = decode_instructions("5.error,12.SGVsbG8gd29y,3.519;").unwrap();

        // Assert
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].opcode(), "error");
        assert_eq!(decoded[0].arg(0), Some("SGVsbG8gd29y"));
        assert_eq!(decoded[0].arg(1), Some("519"));
        assert_eq!(decoded[0].arg(2), None);
    }

    #[test]
    fn test_decode_several_instructions_in_one_frame() {
        let decoded = decode_instructions("4.sync,3.100;3.nop;").unwrap();
        assert_eq!(
            decoded,
            vec![
                Instruction::new("sync", ["100"]),
                Instruction::new("nop", Vec::<String>::new()),
            ]
        );
    }

    #[test]
    fn test_decode_value_may_contain_separators() {
        // The length prefix, not the separators, delimits each element.
        let decoded = decode_instructions("4.blob,1.0,5.a,b;c;").unwrap();
        assert_eq!(decoded[0].arg(1), Some("a,b;c"));
    }

    #[test]
    fn test_decode_multibyte_values() {
        let original = Instruction::new("clipboard", ["3", "text/plain; charset=ü"]);
        let decoded = decode_instructions(&original.encode()).unwrap();
        assert_eq!(decoded, vec![original]);
    }

    #[test]
    fn test_decode_empty_frame_is_rejected() {
        assert_eq!(decode_instructions(""), Err(ProtocolError::EmptyFrame));
    }

    #[test]
    fn test_decode_missing_terminator_is_rejected() {
        let result = decode_instructions("4.sync,3.100");
        assert!(matches!(
            result,
            Err(ProtocolError::MalformedInstruction { .. })
        ));
    }

    #[test]
    fn test_decode_wrong_length_is_rejected() {
        // Declared length 2 but the element is "sync": the character after
        // "sy" is 'n', which is not a separator.
        let result = decode_instructions("2.sync;");
        assert!(matches!(
            result,
            Err(ProtocolError::MalformedInstruction { offset: 0, .. })
        ));
    }

    #[test]
    fn test_decode_non_numeric_length_is_rejected() {
        let result = decode_instructions("x.sync;");
        assert!(matches!(
            result,
            Err(ProtocolError::MalformedInstruction { .. })
        ));
    }

    #[test]
    fn test_decode_reports_offset_of_bad_element() {
        let result = decode_instructions("3.nop;4.sync,9.1;");
        assert!(matches!(
            result,
            Err(ProtocolError::MalformedInstruction { offset: 13, .. })
        ));
    }
}
