//! FPGA stream-control registers
//!
//! Each RX stream owns a block of 16-bit board registers, programmed with ordinary
//! board-SPI write words:
//!
//! | Offset | Register                                   |
//! |--------|--------------------------------------------|
//! | 0      | control (enable, timed start, burst mode)  |
//! | 1      | burst length, low 16 bits                  |
//! | 2      | burst length, high 16 bits                 |
//! | 3..=6  | start timestamp, least significant first   |
//!
//! Start and burst registers are written before the control register so the FPGA
//! never starts with stale parameters.

use crate::connection::spi;
use crate::types::StreamMetadata;

/// Address of the register block of stream 0.
pub const STREAM_REG_BASE: u16 = 0x0100;
/// Distance between the register blocks of consecutive streams.
pub const STREAM_REG_STRIDE: u16 = 0x10;

pub const REG_CONTROL: u16 = 0;
pub const REG_BURST_LO: u16 = 1;
pub const REG_BURST_HI: u16 = 2;
pub const REG_TIMESTAMP: u16 = 3;

pub const CTRL_ENABLE: u16 = 0x0001;
pub const CTRL_TIMED_START: u16 = 0x0002;
pub const CTRL_BURST: u16 = 0x0004;

/// What the caller asked an RX stream to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamCommand {
    Stop,
    /// Deliver exactly `samples` samples, then flag end of burst.
    Burst { samples: u32, start: Option<u64> },
    /// Stream until stopped; `hint` is the requested packets per transfer.
    Continuous { hint: u32, start: Option<u64> },
}

impl StreamCommand {
    /// Interpret the legacy `(burst_size, metadata)` control arguments.
    pub fn from_request(burst_size: usize, metadata: &StreamMetadata) -> Self {
        let size = u32::try_from(burst_size).unwrap_or(u32::MAX);
        match (burst_size, metadata.end_of_burst) {
            (0, false) => StreamCommand::Stop,
            (_, true) => StreamCommand::Burst { samples: size, start: metadata.timestamp },
            (_, false) => StreamCommand::Continuous { hint: size, start: metadata.timestamp },
        }
    }

    /// Start timestamp, if the stream waits for one.
    pub fn start(&self) -> Option<u64> {
        match self {
            StreamCommand::Stop => None,
            StreamCommand::Burst { start, .. } | StreamCommand::Continuous { start, .. } => *start,
        }
    }

    /// Board-SPI write words programming `stream_id`'s register block.
    pub fn register_writes(&self, stream_id: u8) -> Vec<u32> {
        let base = STREAM_REG_BASE + u16::from(stream_id) * STREAM_REG_STRIDE;
        let write = |offset: u16, value: u16| spi::write_word(base + offset, value);

        let (length, mut control) = match *self {
            StreamCommand::Stop => return vec![write(REG_CONTROL, 0)],
            StreamCommand::Burst { samples, .. } => (samples, CTRL_ENABLE | CTRL_BURST),
            StreamCommand::Continuous { hint, .. } => (hint, CTRL_ENABLE),
        };

        let mut words = vec![write(REG_BURST_LO, length as u16), write(REG_BURST_HI, (length >> 16) as u16)];
        if let Some(start) = self.start() {
            control |= CTRL_TIMED_START;
            for lane in 0..4u16 {
                words.push(write(REG_TIMESTAMP + lane, (start >> (16 * lane)) as u16));
            }
        }
        words.push(write(REG_CONTROL, control));
        words
    }
}
