//! Framed connection over a control transport and optional sample pipes

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

use super::Connection;
use super::si5351;
use super::spi::{self, SlaveCodec};
use crate::config::{ConnectionConfig, SpiSlaveKind};
use crate::protocol::{Command, CommandStatus, GenericPacket};
use crate::stream::{
    RxPipe, RxStream, SAMPLE_HEADER_LEN, SamplePacket, StreamCommand, StreamDirection, StreamState, TxPipe,
    TxStream, interleave,
};
use crate::transport::{DataLog, DataLogCallback, LogDirection, Transport, read_exact, write_all};
use crate::types::{DeviceInfo, RficInfo, StreamMetadata};
use crate::{ConnectionError, Result};

/// Argument of LMS7002_RST requesting a full reset pulse.
const RESET_PULSE: u8 = 2;

/// Band-select register layout: TRF band in bits 1..0, RFE band in bits 3..2.
const BAND_MASK: u32 = 0b11;
const RFE_BAND_SHIFT: u32 = 2;

/// Upper bound for deadlines when the caller passes an effectively infinite timeout.
const FAR_FUTURE: Duration = Duration::from_secs(365 * 24 * 3600);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE)
}

/// Connection speaking one packet dialect over a [`Transport`].
///
/// The dialect is fixed by the [`ConnectionConfig`] for the whole lifetime. Control-plane
/// calls are serialised by one lock; each stream has its own lock, and the RX and TX
/// sample pipes are locked separately.
///
/// A device that never answers still yields a connection, just not an open one:
///
/// ```rust
/// use std::io;
/// use std::time::Duration;
/// use rfic_link::{Connection, ConnectionConfig, ConnectionError, PacketConnection, Transport};
///
/// struct Silent;
///
/// impl Transport for Silent {
///     fn write(&mut self, data: &[u8], _timeout: Duration) -> io::Result<usize> {
///         Ok(data.len())
///     }
///
///     fn read(&mut self, _buf: &mut [u8], _timeout: Duration) -> io::Result<usize> {
///         Err(io::ErrorKind::TimedOut.into())
///     }
/// }
///
/// let connection = PacketConnection::new(ConnectionConfig::default(), Box::new(Silent)).unwrap();
/// assert!(!connection.is_open());
/// assert!(matches!(connection.device_reset(), Err(ConnectionError::Disconnected)));
/// ```
pub struct PacketConnection {
    config: ConnectionConfig,
    control: Mutex<Box<dyn Transport>>,
    open: AtomicBool,
    info: Mutex<DeviceInfo>,
    reference_clock_hz: Mutex<f64>,
    rx_pipe: Option<Mutex<RxPipe>>,
    tx_pipe: Option<Mutex<TxPipe>>,
    rx_streams: BTreeMap<u32, Mutex<RxStream>>,
    tx_streams: BTreeMap<u32, Mutex<TxStream>>,
    data_log: DataLog,
}

impl PacketConnection {
    /// Validate `config`, then probe the device on `control` with GET_INFO.
    ///
    /// Only an invalid configuration is an error. A device that does not answer yields a
    /// connection whose [`Connection::is_open`] is false.
    pub fn new(config: ConnectionConfig, control: Box<dyn Transport>) -> Result<Self> {
        config.validate()?;

        // Channels were checked to fit a byte during validation
        let rx_streams = config
            .rfics
            .iter()
            .filter_map(|rfic| rfic.rx_channel)
            .map(|channel| (channel, Mutex::new(RxStream::new(channel as u8))))
            .collect();
        let tx_streams = config
            .rfics
            .iter()
            .filter_map(|rfic| rfic.tx_channel)
            .map(|channel| (channel, Mutex::new(TxStream::new(channel as u8))))
            .collect();

        let connection = Self {
            reference_clock_hz: Mutex::new(config.reference_clock.rate_hz),
            config,
            control: Mutex::new(control),
            open: AtomicBool::new(true),
            info: Mutex::new(DeviceInfo::default()),
            rx_pipe: None,
            tx_pipe: None,
            rx_streams,
            tx_streams,
            data_log: DataLog::default(),
        };

        match connection.refresh_device_info() {
            Ok(info) => info!(
                dialect = %connection.config.dialect,
                device = %info.device_name,
                firmware = %info.firmware_version,
                "Connected to device"
            ),
            Err(e) => {
                warn!(dialect = %connection.config.dialect, error = %e, "Device did not answer the probe");
                connection.open.store(false, Ordering::Release);
            }
        }
        Ok(connection)
    }

    /// Attach the transport carrying received sample packets.
    pub fn with_rx_pipe(mut self, transport: Box<dyn Transport>) -> Self {
        let known: BTreeSet<u8> = self.rx_streams.values().map(|stream| lock(stream).id()).collect();
        self.rx_pipe = Some(Mutex::new(RxPipe::new(transport, self.config.stream.packet_size, known)));
        self
    }

    /// Attach the transport carrying transmitted sample packets.
    pub fn with_tx_pipe(mut self, transport: Box<dyn Transport>) -> Self {
        self.tx_pipe = Some(Mutex::new(TxPipe::new(transport, self.config.stream.packet_size)));
        self
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Current state of a stream, `None` for unknown stream ids.
    pub fn stream_state(&self, direction: StreamDirection, stream_id: u32) -> Option<StreamState> {
        match direction {
            StreamDirection::Rx => self.rx_streams.get(&stream_id).map(|stream| lock(stream).state()),
            StreamDirection::Tx => self.tx_streams.get(&stream_id).map(|stream| lock(stream).state()),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_open() { Ok(()) } else { Err(ConnectionError::Disconnected) }
    }

    fn mark_closed(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            warn!(dialect = %self.config.dialect, "Connection lost");
        }
    }

    /// Record a lost link so later calls fail fast with `Disconnected`.
    fn observe(&self, err: ConnectionError) -> ConnectionError {
        if matches!(err, ConnectionError::Disconnected) {
            self.mark_closed();
        }
        err
    }

    /// One request/reply round trip on an already locked control transport.
    fn exchange(&self, control: &mut dyn Transport, packet: &mut GenericPacket) -> Result<()> {
        let dialect = self.config.dialect;
        let timeout = self.config.control_timeout();

        let frame = dialect.encode(packet)?;
        write_all(control, &frame, timeout)
            .map_err(|e| self.observe(ConnectionError::from_transport("control write", e, timeout)))?;
        self.data_log.emit(LogDirection::Tx, &frame);

        let mut reply = vec![0u8; dialect.pkt_length()];
        read_exact(control, &mut reply, timeout)
            .map_err(|e| self.observe(ConnectionError::from_transport("control read", e, timeout)))?;
        self.data_log.emit(LogDirection::Rx, &reply);

        let decoded = dialect.decode_reply(&reply)?;
        if decoded.cmd != packet.cmd {
            return Err(ConnectionError::malformed(
                dialect.name(),
                format!("reply to {} answers {}", packet.cmd, decoded.cmd),
            ));
        }
        packet.status = decoded.status;
        packet.in_buffer = decoded.in_buffer;
        Ok(())
    }

    /// Fail unless the device reported completion. Dialects without a status byte
    /// cannot report failure, so their replies always pass.
    fn check_completed(&self, packet: &GenericPacket) -> Result<()> {
        if !self.config.dialect.carries_status() {
            return Ok(());
        }
        match packet.status {
            Some(CommandStatus::Completed) => Ok(()),
            Some(status) => Err(ConnectionError::CommandRejected { command: packet.cmd, status }),
            None => Err(ConnectionError::failed(format!("device left the status of {} undefined", packet.cmd))),
        }
    }

    /// Send `cmd` and require a completed reply.
    fn command(&self, packet: &mut GenericPacket) -> Result<()> {
        self.transfer_packet(packet)?;
        self.check_completed(packet)
    }

    /// Position of `index` among the slaves of the same kind, used as the peripheral id.
    fn periph_id(&self, index: u32, kind: SpiSlaveKind) -> u8 {
        self.config
            .spi_slaves
            .iter()
            .filter(|(_, slave)| **slave == kind)
            .position(|(slave_index, _)| *slave_index == index)
            .map_or(0, |position| position as u8)
    }

    fn validate_buffers(&self, lengths: impl Iterator<Item = usize>) -> Result<()> {
        let bytes_per_sample = self.config.stream.bytes_per_sample;
        let mut lengths = lengths.peekable();
        let first = *lengths
            .peek()
            .ok_or_else(|| ConnectionError::invalid_argument("at least one channel buffer is required"))?;
        for len in lengths {
            if len != first {
                return Err(ConnectionError::invalid_argument("channel buffers differ in length"));
            }
        }
        if first % bytes_per_sample != 0 {
            return Err(ConnectionError::invalid_argument(format!(
                "buffer length {} is not a whole number of {}-byte samples",
                first, bytes_per_sample
            )));
        }
        Ok(())
    }
}

impl Connection for PacketConnection {
    fn is_open(&self) -> bool {
        if !self.open.load(Ordering::Acquire) {
            return false;
        }
        // A busy control plane reports a lost link through its own exchange
        match self.control.try_lock() {
            Ok(control) => control.is_open(),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().is_open(),
            Err(TryLockError::WouldBlock) => true,
        }
    }

    fn device_info(&self) -> DeviceInfo {
        lock(&self.info).clone()
    }

    fn refresh_device_info(&self) -> Result<DeviceInfo> {
        let mut packet = GenericPacket::new(Command::GET_INFO);
        self.command(&mut packet)?;
        let info = DeviceInfo::from_info_reply(&packet.in_buffer)?;
        *lock(&self.info) = info.clone();
        Ok(info)
    }

    fn list_rfics(&self) -> Vec<RficInfo> {
        self.config.rfics.clone()
    }

    fn device_reset(&self) -> Result<()> {
        let mut packet = GenericPacket::with_payload(Command::LMS7002_RST, [RESET_PULSE]);
        self.command(&mut packet)?;
        debug!("Device reset acknowledged");
        Ok(())
    }

    fn transact_spi(&self, index: u32, write: &[u32], mut read: Option<&mut [u32]>) -> Result<()> {
        if write.is_empty() {
            return Ok(());
        }
        self.ensure_open()?;

        let kind = *self
            .config
            .spi_slaves
            .get(&index)
            .ok_or_else(|| ConnectionError::unsupported(format!("SPI index {}", index)))?;
        if let Some(capacity) = read.as_deref().map(<[u32]>::len).filter(|len| *len < write.len()) {
            return Err(ConnectionError::invalid_argument(format!(
                "read buffer holds {} words, {} transactions requested",
                capacity,
                write.len()
            )));
        }

        let codec = SlaveCodec::new(kind);
        let periph_id = self.periph_id(index, kind);
        let max_data = self.config.dialect.max_data_length();
        let plan = spi::batches(write, codec.words_per_frame(max_data, true), codec.words_per_frame(max_data, false));

        let mut control = lock(&self.control);
        let mut frames = 0;
        for batch in &plan {
            let words = &write[batch.start..batch.start + batch.len];
            if batch.write {
                let mut payload = Vec::with_capacity(words.len() * codec.write_width());
                for word in words {
                    codec.encode_write(*word, &mut payload);
                }
                let mut packet = GenericPacket::with_payload(codec.write_command(), payload).for_periph(periph_id);
                self.exchange(control.as_mut(), &mut packet)?;
                self.check_completed(&packet)?;
            } else {
                let Some(read) = read.as_deref_mut() else { continue };

                let mut payload = Vec::with_capacity(words.len() * codec.read_request_width());
                for word in words {
                    codec.encode_read(*word, &mut payload);
                }
                let mut packet = GenericPacket::with_payload(codec.read_command(), payload).for_periph(periph_id);
                self.exchange(control.as_mut(), &mut packet)?;
                self.check_completed(&packet)?;

                let width = codec.read_reply_width();
                if packet.in_buffer.len() < words.len() * width {
                    return Err(ConnectionError::malformed(
                        self.config.dialect.name(),
                        format!(
                            "{} answered {} bytes for {} reads",
                            packet.cmd,
                            packet.in_buffer.len(),
                            words.len()
                        ),
                    ));
                }
                for (offset, answer) in packet.in_buffer.chunks_exact(width).take(words.len()).enumerate() {
                    read[batch.start + offset] = codec.decode_read(answer);
                }
            }
            frames += 1;
        }

        trace!(index, words = write.len(), frames, "SPI transaction");
        Ok(())
    }

    fn update_external_band_select(&self, trf_band: u32, rfe_band: u32) {
        let (Some(register), Some(board)) = (self.config.band_select_register, self.config.board_spi_index()) else {
            trace!(trf_band, rfe_band, "No external band select on this board");
            return;
        };
        let value = (trf_band & BAND_MASK) | ((rfe_band & BAND_MASK) << RFE_BAND_SHIFT);
        if let Err(e) = self.transact_spi(board, &[spi::write_word(register, value as u16)], None) {
            warn!(trf_band, rfe_band, error = %e, "External band select update failed");
        }
    }

    fn reference_clock_rate(&self) -> f64 {
        *lock(&self.reference_clock_hz)
    }

    fn set_reference_clock_rate(&self, rate_hz: f64) {
        let clock = &self.config.reference_clock;
        if !clock.programmable {
            debug!(rate_hz, "Reference clock is fixed; ignoring rate change");
            return;
        }
        // Validation guarantees a synthesizer for programmable clocks
        let Some(index) = self.config.reference_clock_spi_index() else {
            return;
        };

        let words: Vec<u32> = match si5351::output_registers(clock.crystal_hz, rate_hz, clock.output) {
            Ok(registers) => registers.into_iter().map(|(address, data)| si5351::write_word(address, data)).collect(),
            Err(e) => {
                warn!(rate_hz, error = %e, "Ignoring reference clock rate");
                return;
            }
        };
        // The rate only changes once the synthesizer accepted it
        let mut current = lock(&self.reference_clock_hz);
        match self.transact_spi(index, &words, None) {
            Ok(()) => {
                *current = rate_hz;
                debug!(rate_hz, spi_index = index, output = clock.output, "Reference clock programmed");
            }
            Err(e) => warn!(rate_hz, error = %e, "Programming the reference clock failed"),
        }
    }

    fn transfer_packet(&self, packet: &mut GenericPacket) -> Result<()> {
        self.ensure_open()?;
        let mut control = lock(&self.control);
        self.exchange(control.as_mut(), packet)
    }

    fn rx_stream_control(&self, stream_id: u32, burst_size: usize, metadata: &StreamMetadata) -> Result<()> {
        let stream = self
            .rx_streams
            .get(&stream_id)
            .ok_or_else(|| ConnectionError::unsupported(format!("RX stream {}", stream_id)))?;
        let board = self
            .config
            .board_spi_index()
            .ok_or_else(|| ConnectionError::unsupported("stream control registers"))?;
        self.ensure_open()?;

        let command = StreamCommand::from_request(burst_size, metadata);
        let mut stream = lock(stream);
        if let Err(e) = self.transact_spi(board, &command.register_writes(stream.id()), None) {
            stream.set_state(StreamState::Error);
            return Err(e);
        }

        let next = match command {
            StreamCommand::Stop => StreamState::Idle,
            _ if command.start().is_some() => StreamState::Armed,
            _ => StreamState::Running,
        };
        stream.reset(next);
        if let Some(pipe) = &self.rx_pipe {
            lock(pipe).discard(stream.id());
        }
        debug!(stream_id, ?command, "RX stream control applied");
        Ok(())
    }

    fn read_stream(
        &self,
        stream_id: u32,
        buffers: &mut [&mut [u8]],
        timeout: Duration,
        metadata: &mut StreamMetadata,
    ) -> Result<usize> {
        let stream = self
            .rx_streams
            .get(&stream_id)
            .ok_or_else(|| ConnectionError::unsupported(format!("RX stream {}", stream_id)))?;
        let pipe = self.rx_pipe.as_ref().ok_or_else(|| ConnectionError::unsupported("RX sample pipe"))?;
        self.validate_buffers(buffers.iter().map(|buffer| buffer.len()))?;
        self.ensure_open()?;

        let bytes_per_sample = self.config.stream.bytes_per_sample;
        let frame = bytes_per_sample * buffers.len();
        let wanted = buffers[0].len() / bytes_per_sample;

        let mut stream = lock(stream);
        if stream.state() == StreamState::Error {
            return Err(ConnectionError::failed(format!(
                "RX stream {} failed earlier and must be restarted",
                stream_id
            )));
        }

        let deadline = deadline_after(timeout);
        while !stream.ready(wanted, frame) {
            let received = lock(pipe).receive(stream.id(), deadline, timeout, &self.data_log);
            match received {
                Ok(packet) => stream.push(packet),
                Err(e @ ConnectionError::Timeout { .. }) => {
                    trace!(stream_id, "RX read timed out, buffered samples kept");
                    return Err(e);
                }
                Err(e) => {
                    stream.set_state(StreamState::Error);
                    return Err(self.observe(e));
                }
            }
        }

        let samples = stream.take(buffers, bytes_per_sample, metadata);
        trace!(stream_id, samples, end_of_burst = metadata.end_of_burst, "RX read");
        Ok(samples * bytes_per_sample)
    }

    fn write_stream(
        &self,
        stream_id: u32,
        buffers: &[&[u8]],
        timeout: Duration,
        metadata: &StreamMetadata,
    ) -> Result<usize> {
        let stream = self
            .tx_streams
            .get(&stream_id)
            .ok_or_else(|| ConnectionError::unsupported(format!("TX stream {}", stream_id)))?;
        let pipe = self.tx_pipe.as_ref().ok_or_else(|| ConnectionError::unsupported("TX sample pipe"))?;
        self.validate_buffers(buffers.iter().map(|buffer| buffer.len()))?;
        self.ensure_open()?;

        let bytes_per_sample = self.config.stream.bytes_per_sample;
        let frame = bytes_per_sample * buffers.len();
        let capacity = (self.config.stream.packet_size - SAMPLE_HEADER_LEN) / frame * frame;
        if capacity == 0 {
            return Err(ConnectionError::invalid_argument(format!(
                "{} channels do not fit one sample packet",
                buffers.len()
            )));
        }

        let mut stream = lock(stream);
        let mut pipe = lock(pipe);
        let deadline = deadline_after(timeout);
        let wire = interleave(buffers, bytes_per_sample);

        // An empty write still delivers a requested end of burst
        let chunks: Vec<&[u8]> = if wire.is_empty() {
            if !metadata.end_of_burst {
                return Ok(0);
            }
            vec![&wire[..]]
        } else {
            wire.chunks(capacity).collect()
        };

        let last = chunks.len() - 1;
        let mut sent = 0usize;
        for (i, chunk) in chunks.into_iter().enumerate() {
            let packet = SamplePacket {
                stream_id: stream.id(),
                // Sample counters wrap
                timestamp: metadata.timestamp.map(|ts| ts.wrapping_add(sent as u64)),
                end_of_burst: metadata.end_of_burst && i == last,
                payload: chunk.to_vec(),
            };
            match pipe.send(&packet, deadline, timeout, &self.data_log) {
                Ok(()) => {
                    stream.set_state(StreamState::Running);
                    sent += chunk.len() / frame;
                }
                Err(ConnectionError::Timeout { .. }) if sent > 0 => {
                    debug!(stream_id, sent, "TX write timed out after a partial transfer");
                    return Ok(sent * bytes_per_sample);
                }
                Err(e @ ConnectionError::Timeout { .. }) => return Err(e),
                Err(e) => {
                    stream.set_state(StreamState::Error);
                    return Err(self.observe(e));
                }
            }
        }

        if metadata.end_of_burst {
            stream.set_state(StreamState::Idle);
        }
        trace!(stream_id, samples = sent, "TX write");
        Ok(sent * bytes_per_sample)
    }

    fn set_data_log_callback(&self, callback: Option<DataLogCallback>) {
        self.data_log.set(callback);
    }
}

impl fmt::Debug for PacketConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketConnection")
            .field("dialect", &self.config.dialect)
            .field("open", &self.open.load(Ordering::Acquire))
            .field("rx_streams", &self.rx_streams.keys().collect::<Vec<_>>())
            .field("tx_streams", &self.tx_streams.keys().collect::<Vec<_>>())
            .field("data_log", &self.data_log)
            .finish()
    }
}
