//! Frame encoding and decoding
//!
//! Maps a [`GenericPacket`] to exactly one fixed-length frame of the connection's
//! [`Dialect`] and back. Encoding always yields `pkt_length` bytes; decoding rejects any
//! buffer of another length and any `block_count` that would reach past the payload.
//!
//! `block_count` counts dialect-specific units: single bytes for DIGIC, and
//! command-dependent blocks for LMS64C and Novena (see [`Command::block_layout`]).
//! A request whose payload does not fill its last block is zero padded, so only
//! block-aligned payloads survive an encode/decode round trip byte for byte.

use tracing::trace;

use super::{Command, CommandStatus, Dialect, GenericPacket, ReplySpan};
use crate::{ConnectionError, Result};

/// Which side of a command/response exchange a frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Request,
    Reply,
}

impl Dialect {
    /// Encode `packet` into one frame of this dialect.
    pub fn encode(&self, packet: &GenericPacket) -> Result<Vec<u8>> {
        self.encode_frame(packet, Direction::Request)
    }

    /// Encode a device reply, counting blocks in the reply units of `packet.cmd`.
    ///
    /// This is the device side of [`Dialect::decode_reply`]; hosts only need it to
    /// emulate hardware.
    pub fn encode_reply(&self, packet: &GenericPacket) -> Result<Vec<u8>> {
        self.encode_frame(packet, Direction::Reply)
    }

    fn encode_frame(&self, packet: &GenericPacket, direction: Direction) -> Result<Vec<u8>> {
        let layout = self.layout();
        let len = packet.out_buffer.len();
        if len > layout.max_data_length {
            return Err(ConnectionError::FrameTooLarge {
                dialect: self.name(),
                len,
                max: layout.max_data_length,
            });
        }

        let block_count = match self.span(packet.cmd, direction) {
            ReplySpan::Blocks(unit) => len.div_ceil(unit),
            ReplySpan::WholePayload => 1,
        };

        let mut frame = vec![0u8; layout.pkt_length];
        frame[0] = packet.cmd.0;
        if let Some(offset) = layout.status_offset {
            frame[offset] = CommandStatus::encode(packet.status);
        }
        if let (Some(offset), Dialect::Digic { i2c_address }) = (layout.i2c_address_offset, self) {
            frame[offset] = *i2c_address;
        }
        if let Some(offset) = layout.periph_offset {
            frame[offset] = packet.periph_id;
        }
        // block_count <= max_data_length, which always fits a byte
        frame[layout.block_count_offset] = block_count as u8;

        let data_offset = layout.data_offset();
        frame[data_offset..data_offset + len].copy_from_slice(&packet.out_buffer);

        trace!(
            dialect = self.name(),
            cmd = %packet.cmd,
            block_count,
            payload = len,
            "Encoded frame"
        );
        Ok(frame)
    }

    /// Decode a frame produced by [`Dialect::encode`], sizing the payload by request units.
    ///
    /// The payload lands in `in_buffer`; `out_buffer` is left empty.
    pub fn decode(&self, frame: &[u8]) -> Result<GenericPacket> {
        self.decode_frame(frame, Direction::Request)
    }

    /// Decode a frame sent by the device in answer to a request.
    ///
    /// Replies to read commands carry wider blocks than the request that triggered them,
    /// and some replies (GET_INFO) fill the whole payload regardless of `block_count`.
    pub fn decode_reply(&self, frame: &[u8]) -> Result<GenericPacket> {
        self.decode_frame(frame, Direction::Reply)
    }

    fn decode_frame(&self, frame: &[u8], direction: Direction) -> Result<GenericPacket> {
        let layout = self.layout();
        if frame.len() != layout.pkt_length {
            return Err(ConnectionError::malformed(
                self.name(),
                format!("expected {} bytes, got {}", layout.pkt_length, frame.len()),
            ));
        }

        let cmd = Command(frame[0]);
        let status = layout.status_offset.and_then(|offset| CommandStatus::from_byte(frame[offset]));
        let periph_id = layout.periph_offset.map_or(0, |offset| frame[offset]);
        let block_count = frame[layout.block_count_offset] as usize;

        let payload_len = match self.span(cmd, direction) {
            ReplySpan::Blocks(unit) => block_count * unit,
            ReplySpan::WholePayload => layout.max_data_length,
        };
        if payload_len > layout.max_data_length {
            return Err(ConnectionError::malformed(
                self.name(),
                format!(
                    "block count {} of {} implies {} payload bytes, limit is {}",
                    block_count, cmd, payload_len, layout.max_data_length
                ),
            ));
        }

        let data_offset = layout.data_offset();
        let in_buffer = frame[data_offset..data_offset + payload_len].to_vec();

        trace!(dialect = self.name(), cmd = %cmd, block_count, payload = payload_len, "Decoded frame");
        Ok(GenericPacket { cmd, status, periph_id, out_buffer: Vec::new(), in_buffer })
    }

    /// Bytes per request block for `cmd`.
    pub fn request_unit(&self, cmd: Command) -> usize {
        match self {
            Dialect::Digic { .. } => 1,
            Dialect::Lms64c | Dialect::Novena => cmd.block_layout().request_unit,
        }
    }

    /// Payload span of the device's reply to `cmd`.
    pub fn reply_span(&self, cmd: Command) -> ReplySpan {
        match self {
            Dialect::Digic { .. } if cmd == Command::GET_INFO => ReplySpan::WholePayload,
            Dialect::Digic { .. } => ReplySpan::Blocks(1),
            Dialect::Lms64c | Dialect::Novena => cmd.block_layout().reply,
        }
    }

    fn span(&self, cmd: Command, direction: Direction) -> ReplySpan {
        match direction {
            Direction::Request => ReplySpan::Blocks(self.request_unit(cmd)),
            Direction::Reply => self.reply_span(cmd),
        }
    }
}
