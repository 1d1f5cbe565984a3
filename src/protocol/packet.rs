//! Protocol-agnostic command packet

use super::{Command, CommandStatus};

/// One command/response transaction, independent of the wire dialect.
///
/// Codecs produce frames from `cmd`, `status` and `out_buffer`, and fill `cmd`,
/// `status` and `in_buffer` from the frames they decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericPacket {
    pub cmd: Command,
    /// `None` is the undefined status, the state of every freshly built request.
    pub status: Option<CommandStatus>,
    /// Selects one of several chips of the same kind. Dialects without a selector byte
    /// drop it.
    pub periph_id: u8,
    pub out_buffer: Vec<u8>,
    pub in_buffer: Vec<u8>,
}

impl GenericPacket {
    /// Create a request with an empty payload and undefined status.
    pub fn new(cmd: Command) -> Self {
        Self { cmd, status: None, periph_id: 0, out_buffer: Vec::new(), in_buffer: Vec::new() }
    }

    /// Create a request carrying `payload`.
    pub fn with_payload(cmd: Command, payload: impl Into<Vec<u8>>) -> Self {
        Self { cmd, status: None, periph_id: 0, out_buffer: payload.into(), in_buffer: Vec::new() }
    }

    /// Address the chip selected by `periph_id`.
    pub fn for_periph(mut self, periph_id: u8) -> Self {
        self.periph_id = periph_id;
        self
    }

    /// Whether the device reported successful completion.
    pub fn is_completed(&self) -> bool {
        self.status == Some(CommandStatus::Completed)
    }
}

impl Default for GenericPacket {
    fn default() -> Self {
        Self::new(Command::GET_INFO)
    }
}
