//! Command codes, device status codes and per-command block units

use serde::{Deserialize, Serialize};
use std::fmt;

/// Command byte carried in the first header field of every dialect.
///
/// Named constants cover the LMS64C command set; any other byte is carried verbatim so
/// vendor extensions and future firmware commands still round-trip through the codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Command(pub u8);

impl Command {
    pub const GET_INFO: Command = Command(0x00);
    pub const LMS6002_RST: Command = Command(0x10);
    pub const SI5356_WR: Command = Command(0x11);
    pub const SI5356_RD: Command = Command(0x12);
    pub const SI5351_WR: Command = Command(0x13);
    pub const SI5351_RD: Command = Command(0x14);
    pub const TFP410_WR: Command = Command(0x15);
    pub const TFP410_RD: Command = Command(0x16);
    pub const LMS7002_RST: Command = Command(0x20);
    pub const LMS7002_WR: Command = Command(0x21);
    pub const LMS7002_RD: Command = Command(0x22);
    pub const LMS6002_WR: Command = Command(0x23);
    pub const LMS6002_RD: Command = Command(0x24);
    pub const LMS_LNA: Command = Command(0x2A);
    pub const LMS_PA: Command = Command(0x2B);
    pub const PROG_MCU: Command = Command(0x2C);
    pub const ADF4002_WR: Command = Command(0x31);
    pub const USB_FIFO_RST: Command = Command(0x40);
    pub const BRDSPI_WR: Command = Command(0x55);
    pub const BRDSPI_RD: Command = Command(0x56);
    pub const BRDSPI8_WR: Command = Command(0x57);
    pub const BRDSPI8_RD: Command = Command(0x58);
    pub const BRDCONF_WR: Command = Command(0x5D);
    pub const BRDCONF_RD: Command = Command(0x5E);
    pub const ANALOG_VAL_WR: Command = Command(0x61);
    pub const ANALOG_VAL_RD: Command = Command(0x62);
    pub const MYRIAD_RST: Command = Command(0x80);
    pub const MYRIAD_WR: Command = Command(0x81);
    pub const MYRIAD_RD: Command = Command(0x82);
    pub const MEMORY_WR: Command = Command(0x8C);
    pub const MEMORY_RD: Command = Command(0x8D);

    /// Human readable name, if this is a known command.
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Command::GET_INFO => "GET_INFO",
            Command::LMS6002_RST => "LMS6002_RST",
            Command::SI5356_WR => "SI5356_WR",
            Command::SI5356_RD => "SI5356_RD",
            Command::SI5351_WR => "SI5351_WR",
            Command::SI5351_RD => "SI5351_RD",
            Command::TFP410_WR => "TFP410_WR",
            Command::TFP410_RD => "TFP410_RD",
            Command::LMS7002_RST => "LMS7002_RST",
            Command::LMS7002_WR => "LMS7002_WR",
            Command::LMS7002_RD => "LMS7002_RD",
            Command::LMS6002_WR => "LMS6002_WR",
            Command::LMS6002_RD => "LMS6002_RD",
            Command::LMS_LNA => "LMS_LNA",
            Command::LMS_PA => "LMS_PA",
            Command::PROG_MCU => "PROG_MCU",
            Command::ADF4002_WR => "ADF4002_WR",
            Command::USB_FIFO_RST => "USB_FIFO_RST",
            Command::BRDSPI_WR => "BRDSPI_WR",
            Command::BRDSPI_RD => "BRDSPI_RD",
            Command::BRDSPI8_WR => "BRDSPI8_WR",
            Command::BRDSPI8_RD => "BRDSPI8_RD",
            Command::BRDCONF_WR => "BRDCONF_WR",
            Command::BRDCONF_RD => "BRDCONF_RD",
            Command::ANALOG_VAL_WR => "ANALOG_VAL_WR",
            Command::ANALOG_VAL_RD => "ANALOG_VAL_RD",
            Command::MYRIAD_RST => "MYRIAD_RST",
            Command::MYRIAD_WR => "MYRIAD_WR",
            Command::MYRIAD_RD => "MYRIAD_RD",
            Command::MEMORY_WR => "MEMORY_WR",
            Command::MEMORY_RD => "MEMORY_RD",
            _ => return None,
        };
        Some(name)
    }

    /// Size of one request block and the span of the matching reply, for the
    /// register-addressed dialects (LMS64C, Novena).
    pub fn block_layout(self) -> BlockLayout {
        match self {
            Command::LMS7002_WR | Command::BRDSPI_WR => BlockLayout::symmetric(4),
            Command::LMS7002_RD | Command::BRDSPI_RD => BlockLayout::new(2, ReplySpan::Blocks(4)),
            Command::SI5351_WR | Command::SI5356_WR | Command::LMS6002_WR => {
                BlockLayout::symmetric(2)
            }
            Command::SI5351_RD | Command::SI5356_RD | Command::LMS6002_RD => {
                BlockLayout::new(1, ReplySpan::Blocks(2))
            }
            Command::ADF4002_WR => BlockLayout::symmetric(3),
            Command::LMS6002_RST
            | Command::LMS7002_RST
            | Command::MYRIAD_RST
            | Command::USB_FIFO_RST
            | Command::LMS_LNA
            | Command::LMS_PA => BlockLayout::symmetric(1),
            Command::GET_INFO => BlockLayout::new(1, ReplySpan::WholePayload),
            _ => BlockLayout::symmetric(2),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}(0x{:02X})", name, self.0),
            None => write!(f, "0x{:02X}", self.0),
        }
    }
}

impl From<u8> for Command {
    fn from(value: u8) -> Self {
        Command(value)
    }
}

/// How the payload of a frame is divided into `block_count` units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLayout {
    /// Bytes per block in a request frame.
    pub request_unit: usize,
    /// How the reply frame's payload is sized.
    pub reply: ReplySpan,
}

impl BlockLayout {
    pub const fn new(request_unit: usize, reply: ReplySpan) -> Self {
        Self { request_unit, reply }
    }

    pub const fn symmetric(unit: usize) -> Self {
        Self { request_unit: unit, reply: ReplySpan::Blocks(unit) }
    }
}

/// Payload span of a reply frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplySpan {
    /// `block_count` blocks of the given size.
    Blocks(usize),
    /// The full payload region regardless of `block_count`.
    WholePayload,
}

/// Status byte reported by the device in dialects that carry one.
///
/// The "undefined" status (byte 0) is not a variant: packets hold
/// `Option<CommandStatus>` and `None` encodes as 0 on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandStatus {
    Completed,
    UnknownCommand,
    Busy,
    TooManyBlocks,
    Error,
    WrongOrder,
    ResourceDenied,
    /// A non-zero status byte this crate has no name for.
    Unrecognized(u8),
}

impl CommandStatus {
    /// Wire value of the "undefined" status.
    pub const UNDEFINED_BYTE: u8 = 0;

    /// Decode a status byte; 0 means undefined.
    pub fn from_byte(byte: u8) -> Option<Self> {
        let status = match byte {
            Self::UNDEFINED_BYTE => return None,
            1 => CommandStatus::Completed,
            2 => CommandStatus::UnknownCommand,
            3 => CommandStatus::Busy,
            4 => CommandStatus::TooManyBlocks,
            5 => CommandStatus::Error,
            6 => CommandStatus::WrongOrder,
            7 => CommandStatus::ResourceDenied,
            other => CommandStatus::Unrecognized(other),
        };
        Some(status)
    }

    /// Wire value of this status.
    pub fn to_byte(self) -> u8 {
        match self {
            CommandStatus::Completed => 1,
            CommandStatus::UnknownCommand => 2,
            CommandStatus::Busy => 3,
            CommandStatus::TooManyBlocks => 4,
            CommandStatus::Error => 5,
            CommandStatus::WrongOrder => 6,
            CommandStatus::ResourceDenied => 7,
            CommandStatus::Unrecognized(byte) => byte,
        }
    }

    /// Encode an optional status, mapping `None` to the undefined byte.
    pub fn encode(status: Option<Self>) -> u8 {
        status.map_or(Self::UNDEFINED_BYTE, Self::to_byte)
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandStatus::Completed => f.write_str("COMPLETED"),
            CommandStatus::UnknownCommand => f.write_str("UNKNOWN_CMD"),
            CommandStatus::Busy => f.write_str("BUSY"),
            CommandStatus::TooManyBlocks => f.write_str("MANY_BLOCKS"),
            CommandStatus::Error => f.write_str("ERROR"),
            CommandStatus::WrongOrder => f.write_str("WRONG_ORDER"),
            CommandStatus::ResourceDenied => f.write_str("RESOURCE_DENIED"),
            CommandStatus::Unrecognized(byte) => write!(f, "0x{:02X}", byte),
        }
    }
}
