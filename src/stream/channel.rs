//! Per-stream buffering and state
//!
//! An RX stream keeps every received packet payload it has not handed out yet, so a
//! read that times out loses nothing and a read smaller than a packet leaves the rest
//! for the next call. Channels are interleaved sample by sample on the wire; reads
//! split them into one buffer per channel and writes merge them back.

use std::collections::VecDeque;
use tracing::{debug, trace};

use super::{SamplePacket, StreamState};
use crate::types::StreamMetadata;

/// Received payload not yet handed to the caller.
#[derive(Debug)]
struct Segment {
    data: Vec<u8>,
    /// Consumed bytes.
    pos: usize,
    /// Timestamp of `data[0]`.
    timestamp: Option<u64>,
    end_of_burst: bool,
}

impl Segment {
    fn remaining_frames(&self, frame: usize) -> usize {
        (self.data.len() - self.pos) / frame
    }
}

/// Receive side of one stream.
#[derive(Debug)]
pub(crate) struct RxStream {
    id: u8,
    state: StreamState,
    segments: VecDeque<Segment>,
}

impl RxStream {
    pub(crate) fn new(id: u8) -> Self {
        Self { id, state: StreamState::Idle, segments: VecDeque::new() }
    }

    pub(crate) fn id(&self) -> u8 {
        self.id
    }

    pub(crate) fn state(&self) -> StreamState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: StreamState) {
        if self.state != state {
            debug!(stream = self.id, from = ?self.state, to = ?state, "RX stream state change");
            self.state = state;
        }
    }

    /// Drop buffered samples and move to `state`.
    pub(crate) fn reset(&mut self, state: StreamState) {
        self.segments.clear();
        self.set_state(state);
    }

    /// Buffer a packet received for this stream.
    pub(crate) fn push(&mut self, packet: SamplePacket) {
        if self.state == StreamState::Armed {
            self.set_state(StreamState::Running);
        }
        trace!(stream = self.id, bytes = packet.payload.len(), eob = packet.end_of_burst, "Buffered samples");
        self.segments.push_back(Segment {
            data: packet.payload,
            pos: 0,
            timestamp: packet.timestamp,
            end_of_burst: packet.end_of_burst,
        });
    }

    /// Whether `frames` frames, or the end of a burst, are already buffered.
    pub(crate) fn ready(&self, frames: usize, frame: usize) -> bool {
        let mut available = 0;
        for segment in &self.segments {
            available += segment.remaining_frames(frame);
            if available >= frames || segment.end_of_burst {
                return true;
            }
        }
        available >= frames
    }

    /// Deliver up to one buffer of samples per channel, stopping early at end of burst.
    ///
    /// Returns the samples written to each buffer.
    pub(crate) fn take(
        &mut self,
        buffers: &mut [&mut [u8]],
        bytes_per_sample: usize,
        metadata: &mut StreamMetadata,
    ) -> usize {
        let frame = bytes_per_sample * buffers.len();
        if frame == 0 {
            return 0;
        }
        let wanted = buffers.first().map_or(0, |buffer| buffer.len() / bytes_per_sample);

        let first_timestamp = self.segments.front().and_then(|segment| {
            // Sample counters wrap
            segment.timestamp.map(|ts| ts.wrapping_add((segment.pos / frame) as u64))
        });

        let mut delivered = 0;
        let mut end_of_burst = false;
        while delivered < wanted {
            let Some(segment) = self.segments.front_mut() else { break };
            let count = segment.remaining_frames(frame).min(wanted - delivered);
            for i in 0..count {
                let start = segment.pos + i * frame;
                let src = &segment.data[start..start + frame];
                for (channel, buffer) in buffers.iter_mut().enumerate() {
                    let dst = (delivered + i) * bytes_per_sample;
                    buffer[dst..dst + bytes_per_sample]
                        .copy_from_slice(&src[channel * bytes_per_sample..(channel + 1) * bytes_per_sample]);
                }
            }
            segment.pos += count * frame;
            delivered += count;

            if segment.remaining_frames(frame) == 0 {
                let ended = segment.end_of_burst;
                self.segments.pop_front();
                if ended {
                    end_of_burst = true;
                    break;
                }
            }
        }

        // An empty end-of-burst packet right after the last delivered sample.
        if !end_of_burst {
            let trailing_end = self
                .segments
                .front()
                .is_some_and(|segment| segment.end_of_burst && segment.remaining_frames(frame) == 0);
            if trailing_end {
                self.segments.pop_front();
                end_of_burst = true;
            }
        }

        metadata.timestamp = if delivered > 0 { first_timestamp } else { None };
        metadata.end_of_burst = end_of_burst;
        if end_of_burst {
            self.set_state(StreamState::Idle);
        }
        delivered
    }
}

/// Transmit side of one stream.
#[derive(Debug)]
pub(crate) struct TxStream {
    id: u8,
    state: StreamState,
}

impl TxStream {
    pub(crate) fn new(id: u8) -> Self {
        Self { id, state: StreamState::Idle }
    }

    pub(crate) fn id(&self) -> u8 {
        self.id
    }

    pub(crate) fn state(&self) -> StreamState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: StreamState) {
        if self.state != state {
            debug!(stream = self.id, from = ?self.state, to = ?state, "TX stream state change");
            self.state = state;
        }
    }
}

/// Merge per-channel buffers into the wire's sample-interleaved order.
pub(crate) fn interleave(buffers: &[&[u8]], bytes_per_sample: usize) -> Vec<u8> {
    let samples = buffers.first().map_or(0, |buffer| buffer.len() / bytes_per_sample);
    let mut wire = Vec::with_capacity(samples * bytes_per_sample * buffers.len());
    for sample in 0..samples {
        let range = sample * bytes_per_sample..(sample + 1) * bytes_per_sample;
        for buffer in buffers {
            wire.extend_from_slice(&buffer[range.clone()]);
        }
    }
    wire
}
