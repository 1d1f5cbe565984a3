//! Wire dialects and their fixed frame layouts
//!
//! Three firmware generations speak three incompatible fixed-size framings:
//!
//! | Dialect | Frame | Header                                       | Payload |
//! |---------|-------|----------------------------------------------|---------|
//! | DIGIC   | 64    | cmd, i2c_addr, block_count, reserved         | 60      |
//! | LMS64C  | 64    | cmd, status, block_count, periph, reserved[4]| 56      |
//! | Novena  | 128   | cmd, status, block_count                     | 125     |
//!
//! All header fields are single bytes, so the header has no byte-order concerns.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Byte positions of the header fields within one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    /// Total frame length on the wire.
    pub pkt_length: usize,
    /// Payload bytes available after the header.
    pub max_data_length: usize,
    /// Offset of the status byte, if the dialect carries one.
    pub status_offset: Option<usize>,
    /// Offset of the I2C address byte, if the dialect carries one.
    pub i2c_address_offset: Option<usize>,
    /// Offset of the block count byte.
    pub block_count_offset: usize,
    /// Offset of the peripheral selector, if the dialect carries one.
    pub periph_offset: Option<usize>,
}

impl FrameLayout {
    /// Offset of the first payload byte.
    pub const fn data_offset(&self) -> usize {
        self.pkt_length - self.max_data_length
    }
}

const DIGIC_LAYOUT: FrameLayout = FrameLayout {
    pkt_length: 64,
    max_data_length: 60,
    status_offset: None,
    i2c_address_offset: Some(1),
    block_count_offset: 2,
    periph_offset: None,
};

const LMS64C_LAYOUT: FrameLayout = FrameLayout {
    pkt_length: 64,
    max_data_length: 56,
    status_offset: Some(1),
    i2c_address_offset: None,
    block_count_offset: 2,
    periph_offset: Some(3),
};

const NOVENA_LAYOUT: FrameLayout = FrameLayout {
    pkt_length: 128,
    max_data_length: 125,
    status_offset: Some(1),
    i2c_address_offset: None,
    block_count_offset: 2,
    periph_offset: None,
};

/// Packet dialect bound to a connection for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "lowercase")]
pub enum Dialect {
    /// I2C-addressed framing used by the DigiGreen/DigiRed boards.
    Digic {
        #[serde(default)]
        i2c_address: u8,
    },
    /// 64-byte framing with an in-frame status byte.
    #[default]
    Lms64c,
    /// Double-size framing used on the Novena board.
    Novena,
}

impl Dialect {
    /// Frame layout of this dialect.
    pub const fn layout(&self) -> FrameLayout {
        match self {
            Dialect::Digic { .. } => DIGIC_LAYOUT,
            Dialect::Lms64c => LMS64C_LAYOUT,
            Dialect::Novena => NOVENA_LAYOUT,
        }
    }

    /// Total frame length in bytes.
    pub const fn pkt_length(&self) -> usize {
        self.layout().pkt_length
    }

    /// Maximum payload bytes per frame.
    pub const fn max_data_length(&self) -> usize {
        self.layout().max_data_length
    }

    /// Whether frames of this dialect carry a device status byte.
    pub const fn carries_status(&self) -> bool {
        self.layout().status_offset.is_some()
    }

    /// Short name used in logs and errors.
    pub const fn name(&self) -> &'static str {
        match self {
            Dialect::Digic { .. } => "DIGIC",
            Dialect::Lms64c => "LMS64C",
            Dialect::Novena => "Novena",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
