//! Sample packet framing on the sample pipe
//!
//! Every packet is exactly `packet_size` bytes: a 16-byte header followed by the payload
//! and zero fill.
//!
//! | Offset | Size | Field                                              |
//! |--------|------|----------------------------------------------------|
//! | 0      | 1    | flags: bit 0 timestamp valid, bit 1 end of burst   |
//! | 1      | 1    | stream id                                          |
//! | 2      | 2    | payload length in bytes, little-endian             |
//! | 4      | 4    | reserved, zero                                     |
//! | 8      | 8    | timestamp of the first sample, little-endian       |

use crate::{ConnectionError, Result};

/// Header length of every sample packet.
pub const SAMPLE_HEADER_LEN: usize = 16;

const FLAG_TIMESTAMP: u8 = 0x01;
const FLAG_END_OF_BURST: u8 = 0x02;

const FRAMING: &str = "sample packet";

/// One decoded sample packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplePacket {
    pub stream_id: u8,
    /// Timestamp of the first sample in `payload`.
    pub timestamp: Option<u64>,
    /// Set on the packet carrying the last sample of a burst.
    pub end_of_burst: bool,
    /// Channel-interleaved sample bytes.
    pub payload: Vec<u8>,
}

impl SamplePacket {
    /// Serialize into a zero-filled packet of `packet_size` bytes.
    pub fn encode(&self, packet_size: usize) -> Result<Vec<u8>> {
        let capacity = packet_size.saturating_sub(SAMPLE_HEADER_LEN).min(u16::MAX as usize);
        if self.payload.len() > capacity {
            return Err(ConnectionError::FrameTooLarge {
                dialect: FRAMING,
                len: self.payload.len(),
                max: capacity,
            });
        }

        let mut flags = 0;
        if self.timestamp.is_some() {
            flags |= FLAG_TIMESTAMP;
        }
        if self.end_of_burst {
            flags |= FLAG_END_OF_BURST;
        }

        let mut packet = vec![0u8; packet_size];
        packet[0] = flags;
        packet[1] = self.stream_id;
        packet[2..4].copy_from_slice(&(self.payload.len() as u16).to_le_bytes());
        packet[8..16].copy_from_slice(&self.timestamp.unwrap_or(0).to_le_bytes());
        packet[SAMPLE_HEADER_LEN..SAMPLE_HEADER_LEN + self.payload.len()].copy_from_slice(&self.payload);
        Ok(packet)
    }

    /// Parse a packet read from the sample pipe.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < SAMPLE_HEADER_LEN {
            return Err(ConnectionError::malformed(
                FRAMING,
                format!("{} bytes cannot hold the {}-byte header", bytes.len(), SAMPLE_HEADER_LEN),
            ));
        }

        let flags = bytes[0];
        let payload_len = u16::from_le_bytes([bytes[2], bytes[3]]) as usize;
        let end = SAMPLE_HEADER_LEN + payload_len;
        if end > bytes.len() {
            return Err(ConnectionError::malformed(
                FRAMING,
                format!("payload length {} overruns a {}-byte packet", payload_len, bytes.len()),
            ));
        }

        let mut timestamp = [0u8; 8];
        timestamp.copy_from_slice(&bytes[8..16]);

        Ok(Self {
            stream_id: bytes[1],
            timestamp: (flags & FLAG_TIMESTAMP != 0).then(|| u64::from_le_bytes(timestamp)),
            end_of_burst: flags & FLAG_END_OF_BURST != 0,
            payload: bytes[SAMPLE_HEADER_LEN..end].to_vec(),
        })
    }
}
