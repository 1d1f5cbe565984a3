//! Device identification decoded from the GET_INFO reply
//!
//! The reply payload starts with a fixed five-byte record:
//!
//! | Offset | Field           |
//! |--------|-----------------|
//! | 0      | firmware        |
//! | 1      | device kind     |
//! | 2      | protocol        |
//! | 3      | hardware        |
//! | 4      | expansion board |
//!
//! Remaining payload bytes are reserved and ignored.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{ConnectionError, Result};

/// Length of the identification record at the start of the GET_INFO payload.
pub const INFO_RECORD_LEN: usize = 5;

/// Board family reported in byte 1 of the GET_INFO reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceKind {
    Unknown,
    Evb6,
    DigiGreen,
    DigiRed,
    Evb7,
    Zipper,
    SocketBoard,
    Evb7V2,
    Stream,
    Novena,
    DataSpark,
    RfSpark,
    Lms6002UsbStick,
    RfESpark,
    LimeSdrUsb,
}

impl DeviceKind {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            1 => DeviceKind::Evb6,
            2 => DeviceKind::DigiGreen,
            3 => DeviceKind::DigiRed,
            4 => DeviceKind::Evb7,
            5 => DeviceKind::Zipper,
            6 => DeviceKind::SocketBoard,
            7 => DeviceKind::Evb7V2,
            8 => DeviceKind::Stream,
            9 => DeviceKind::Novena,
            10 => DeviceKind::DataSpark,
            11 => DeviceKind::RfSpark,
            12 => DeviceKind::Lms6002UsbStick,
            13 => DeviceKind::RfESpark,
            14 => DeviceKind::LimeSdrUsb,
            _ => DeviceKind::Unknown,
        }
    }

    /// Display name of the board.
    pub fn name(self) -> &'static str {
        match self {
            DeviceKind::Unknown => "UNKNOWN",
            DeviceKind::Evb6 => "EVB6",
            DeviceKind::DigiGreen => "DigiGreen",
            DeviceKind::DigiRed => "DigiRed",
            DeviceKind::Evb7 => "EVB7",
            DeviceKind::Zipper => "ZIPPER",
            DeviceKind::SocketBoard => "Socket Board",
            DeviceKind::Evb7V2 => "EVB7_v2",
            DeviceKind::Stream => "Stream",
            DeviceKind::Novena => "Novena",
            DeviceKind::DataSpark => "DataSpark",
            DeviceKind::RfSpark => "RF-Spark",
            DeviceKind::Lms6002UsbStick => "LMS6002-USB Stick",
            DeviceKind::RfESpark => "RF-ESpark",
            DeviceKind::LimeSdrUsb => "LimeSDR-USB",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Expansion board reported in byte 4 of the GET_INFO reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExpansionBoard {
    Unknown,
    Unsupported,
    NotAvailable,
    Myriad1,
    Myriad2,
    Novena,
    Hpm1000,
    Myriad7,
    Hmp7,
    Myriad7Novena,
}

impl ExpansionBoard {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            1 => ExpansionBoard::Unsupported,
            2 => ExpansionBoard::NotAvailable,
            3 => ExpansionBoard::Myriad1,
            4 => ExpansionBoard::Myriad2,
            5 => ExpansionBoard::Novena,
            6 => ExpansionBoard::Hpm1000,
            7 => ExpansionBoard::Myriad7,
            8 => ExpansionBoard::Hmp7,
            9 => ExpansionBoard::Myriad7Novena,
            _ => ExpansionBoard::Unknown,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ExpansionBoard::Unknown => "UNKNOWN",
            ExpansionBoard::Unsupported => "UNSUPPORTED",
            ExpansionBoard::NotAvailable => "NOT AVAILABLE",
            ExpansionBoard::Myriad1 => "Myriad1",
            ExpansionBoard::Myriad2 => "Myriad2",
            ExpansionBoard::Novena => "Novena",
            ExpansionBoard::Hpm1000 => "HPM1000",
            ExpansionBoard::Myriad7 => "Myriad7",
            ExpansionBoard::Hmp7 => "HMP7",
            ExpansionBoard::Myriad7Novena => "Myriad7 Novena",
        }
    }
}

impl fmt::Display for ExpansionBoard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Displayable identification of the connected device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_name: String,
    pub expansion_name: String,
    pub firmware_version: String,
    pub hardware_version: String,
    pub protocol_version: String,
}

impl DeviceInfo {
    /// Decode the identification record from a GET_INFO reply payload.
    pub fn from_info_reply(payload: &[u8]) -> Result<Self> {
        let record: &[u8; INFO_RECORD_LEN] = payload
            .get(..INFO_RECORD_LEN)
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or_else(|| {
                ConnectionError::failed(format!(
                    "GET_INFO reply carries {} bytes, need {}",
                    payload.len(),
                    INFO_RECORD_LEN
                ))
            })?;
        let [firmware, kind, protocol, hardware, expansion] = *record;

        Ok(Self {
            device_name: DeviceKind::from_byte(kind).name().to_string(),
            expansion_name: ExpansionBoard::from_byte(expansion).name().to_string(),
            firmware_version: firmware.to_string(),
            hardware_version: hardware.to_string(),
            protocol_version: protocol.to_string(),
        })
    }
}
