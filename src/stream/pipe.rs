//! Sample pipes shared by all streams of one direction

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::{trace, warn};

use super::SamplePacket;
use crate::transport::{DataLog, LogDirection, Transport, read_exact, write_all};
use crate::{ConnectionError, Result};

/// Packets kept per stream that is not being read. Older ones are dropped first.
pub(crate) const MAX_PARKED_PACKETS: usize = 32;

/// Receive pipe. Packets for a stream other than the one being read are parked until
/// that stream reads.
pub(crate) struct RxPipe {
    transport: Box<dyn Transport>,
    packet_size: usize,
    known: BTreeSet<u8>,
    parked: HashMap<u8, VecDeque<SamplePacket>>,
}

impl RxPipe {
    pub(crate) fn new(transport: Box<dyn Transport>, packet_size: usize, known: BTreeSet<u8>) -> Self {
        Self { transport, packet_size, known, parked: HashMap::new() }
    }

    /// Next packet for `stream_id`, waiting until `deadline` at most.
    ///
    /// `budget` is the caller's timeout and is only used for error reporting.
    pub(crate) fn receive(
        &mut self,
        stream_id: u8,
        deadline: Instant,
        budget: Duration,
        log: &DataLog,
    ) -> Result<SamplePacket> {
        if let Some(packet) = self.parked.get_mut(&stream_id).and_then(VecDeque::pop_front) {
            return Ok(packet);
        }

        let mut bytes = vec![0u8; self.packet_size];
        loop {
            let timeout = deadline.saturating_duration_since(Instant::now());
            read_exact(self.transport.as_mut(), &mut bytes, timeout)
                .map_err(|e| ConnectionError::from_transport("sample pipe read", e, budget))?;
            log.emit(LogDirection::Rx, &bytes);

            let packet = SamplePacket::decode(&bytes)?;
            if packet.stream_id == stream_id {
                return Ok(packet);
            }
            if self.known.contains(&packet.stream_id) {
                trace!(stream = packet.stream_id, reader = stream_id, "Parked packet for another stream");
                let queue = self.parked.entry(packet.stream_id).or_default();
                if queue.len() == MAX_PARKED_PACKETS {
                    queue.pop_front();
                    warn!(stream = packet.stream_id, "Stream is not being read, dropped its oldest parked packet");
                }
                queue.push_back(packet);
            } else {
                warn!(stream = packet.stream_id, "Dropped sample packet for an unknown stream");
            }
        }
    }

    /// Forget packets parked for `stream_id`.
    pub(crate) fn discard(&mut self, stream_id: u8) {
        if let Some(queue) = self.parked.get_mut(&stream_id) {
            queue.clear();
        }
    }
}

/// Transmit pipe.
pub(crate) struct TxPipe {
    transport: Box<dyn Transport>,
    packet_size: usize,
}

impl TxPipe {
    pub(crate) fn new(transport: Box<dyn Transport>, packet_size: usize) -> Self {
        Self { transport, packet_size }
    }

    pub(crate) fn send(
        &mut self,
        packet: &SamplePacket,
        deadline: Instant,
        budget: Duration,
        log: &DataLog,
    ) -> Result<()> {
        let bytes = packet.encode(self.packet_size)?;
        let timeout = deadline.saturating_duration_since(Instant::now());
        write_all(self.transport.as_mut(), &bytes, timeout)
            .map_err(|e| ConnectionError::from_transport("sample pipe write", e, budget))?;
        log.emit(LogDirection::Tx, &bytes);
        Ok(())
    }
}
