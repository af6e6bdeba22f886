//! Resize synchronizer.
//!
//! Turns an adapter viewport change into the messages the remote side needs.
//! Only a Connected session is resized: a change arriving in any other state
//! is dropped, not queued, because the remote side negotiates its initial
//! geometry from the transport URL anyway.

use bastion_core::protocol::instruction::opcode;
use bastion_core::{ConnectionState, Instruction, Message, ProtocolFamily};

use crate::domain::{DisplayGeometry, TerminalGeometry, Viewport};

/// What to send for one accepted viewport change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResizeAction {
    /// Send `message` on the transport and report `geometry` to the backend.
    Terminal {
        message: Message,
        geometry: TerminalGeometry,
    },
    /// Send a `size` instruction.
    Display { instruction: Instruction },
}

#[derive(Debug, Clone, Copy)]
pub struct ResizeSynchronizer {
    family: ProtocolFamily,
    density_scale: u32,
}

impl ResizeSynchronizer {
    pub fn new(family: ProtocolFamily, density_scale: u32) -> Self {
        Self {
            family,
            density_scale: density_scale.max(1),
        }
    }

    /// Returns the action for `viewport`, or `None` if the session is not
    /// Connected or the viewport does not match the session's family.
    pub fn reconcile(&self, state: ConnectionState, viewport: Viewport) -> Option<ResizeAction> {
        if state != ConnectionState::Connected {
            return None;
        }
        match (self.family, viewport) {
            (ProtocolFamily::Terminal, Viewport::Terminal(geometry)) => {
                Some(ResizeAction::Terminal {
                    message: Message::resize(geometry.cols, geometry.rows),
                    geometry,
                })
            }
            (ProtocolFamily::Graphical, Viewport::Display(geometry)) => {
                Some(ResizeAction::Display {
                    instruction: self.size_instruction(geometry),
                })
            }
            _ => None,
        }
    }

    /// `size,<width>,<height>,<dpi>` at the session's density.
    pub fn size_instruction(&self, geometry: DisplayGeometry) -> Instruction {
        let scaled = geometry.scaled(self.density_scale);
        Instruction::new(
            opcode::SIZE,
            [
                scaled.width.to_string(),
                scaled.height.to_string(),
                scaled.dpi.to_string(),
            ],
        )
    }
}
