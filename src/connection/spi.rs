//! SPI word layout and frame batching
//!
//! Callers describe SPI traffic as 32-bit words. Bit 31 selects write (1) or read (0).
//! Register-file slaves (RFIC, board) use bits 30..16 for the address and bits 15..0
//! for the data; Si5351 slaves use bits 15..8 for the address and bits 7..0 for the
//! data. Words go on the wire big-endian, trimmed to the bytes the slave understands.

use crate::config::SpiSlaveKind;
use crate::protocol::Command;

/// Bit 31 of an SPI word: set for writes.
pub const WRITE_FLAG: u32 = 1 << 31;

const ADDRESS_MASK: u16 = 0x7FFF;

/// Build a register-file write word.
pub fn write_word(address: u16, data: u16) -> u32 {
    WRITE_FLAG | (u32::from(address & ADDRESS_MASK) << 16) | u32::from(data)
}

/// Build a register-file read word.
pub fn read_word(address: u16) -> u32 {
    u32::from(address & ADDRESS_MASK) << 16
}

pub fn is_write(word: u32) -> bool {
    word & WRITE_FLAG != 0
}

/// How words for one slave kind map onto commands and wire bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SlaveCodec {
    kind: SpiSlaveKind,
}

impl SlaveCodec {
    pub(crate) fn new(kind: SpiSlaveKind) -> Self {
        Self { kind }
    }

    pub(crate) fn write_command(&self) -> Command {
        match self.kind {
            SpiSlaveKind::Rfic => Command::LMS7002_WR,
            SpiSlaveKind::Board => Command::BRDSPI_WR,
            SpiSlaveKind::Si5351 => Command::SI5351_WR,
        }
    }

    pub(crate) fn read_command(&self) -> Command {
        match self.kind {
            SpiSlaveKind::Rfic => Command::LMS7002_RD,
            SpiSlaveKind::Board => Command::BRDSPI_RD,
            SpiSlaveKind::Si5351 => Command::SI5351_RD,
        }
    }

    /// Wire bytes of one write word.
    pub(crate) fn write_width(&self) -> usize {
        match self.kind {
            SpiSlaveKind::Rfic | SpiSlaveKind::Board => 4,
            SpiSlaveKind::Si5351 => 2,
        }
    }

    /// Wire bytes of one read request.
    pub(crate) fn read_request_width(&self) -> usize {
        match self.kind {
            SpiSlaveKind::Rfic | SpiSlaveKind::Board => 2,
            SpiSlaveKind::Si5351 => 1,
        }
    }

    /// Wire bytes of one read answer: the address echoed back, then the data.
    pub(crate) fn read_reply_width(&self) -> usize {
        match self.kind {
            SpiSlaveKind::Rfic | SpiSlaveKind::Board => 4,
            SpiSlaveKind::Si5351 => 2,
        }
    }

    pub(crate) fn encode_write(&self, word: u32, out: &mut Vec<u8>) {
        let bytes = (word & !WRITE_FLAG).to_be_bytes();
        out.extend_from_slice(&bytes[4 - self.write_width()..]);
    }

    pub(crate) fn encode_read(&self, word: u32, out: &mut Vec<u8>) {
        let bytes = word.to_be_bytes();
        match self.kind {
            SpiSlaveKind::Rfic | SpiSlaveKind::Board => out.extend_from_slice(&bytes[..2]),
            SpiSlaveKind::Si5351 => out.push(bytes[2]),
        }
    }

    /// Data value from one read answer.
    pub(crate) fn decode_read(&self, reply: &[u8]) -> u32 {
        match self.kind {
            SpiSlaveKind::Rfic | SpiSlaveKind::Board => u32::from(u16::from_be_bytes([reply[2], reply[3]])),
            SpiSlaveKind::Si5351 => u32::from(reply[1]),
        }
    }

    /// Words of one kind that fit one frame of `max_data_length` payload bytes.
    pub(crate) fn words_per_frame(&self, max_data_length: usize, write: bool) -> usize {
        let width = if write {
            self.write_width()
        } else {
            self.read_request_width().max(self.read_reply_width())
        };
        (max_data_length / width).max(1)
    }
}

/// A run of consecutive words of the same kind that travels in one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Batch {
    pub start: usize,
    pub len: usize,
    pub write: bool,
}

/// Split `words` into frames, never mixing reads and writes and never exceeding the
/// per-frame limits.
pub(crate) fn batches(words: &[u32], writes_per_frame: usize, reads_per_frame: usize) -> Vec<Batch> {
    let mut batches = Vec::new();
    let mut start = 0;
    while start < words.len() {
        let write = is_write(words[start]);
        let limit = if write { writes_per_frame } else { reads_per_frame };
        let len = words[start..]
            .iter()
            .take(limit)
            .take_while(|word| is_write(**word) == write)
            .count();
        batches.push(Batch { start, len, write });
        start += len;
    }
    batches
}
