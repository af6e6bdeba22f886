//! Wire formats spoken on a session transport.

pub mod codec;
pub mod instruction;
pub mod resize;

pub use codec::{decode_message, encode_message, Message, MessageType, ProtocolError};
pub use instruction::{decode_instructions, encode_instruction, Instruction};
pub use resize::ResizePayload;
