//! Emulated hardware for tests and benchmarks
//!
//! [`EmulatedDevice`] answers control frames the way firmware does: it keeps one register
//! file per slave kind and peripheral, replies to GET_INFO with a fixed identification
//! record, and counts the frames it sees. [`SamplePipe`] stands in for a sample transport
//! with queued RX packets and captured TX packets. Both are cheap handles over shared
//! state, so a test keeps a clone after moving another into a connection.

#![cfg(any(test, feature = "benchmark"))]

use std::collections::{BTreeMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::config::{ConnectionConfig, SpiSlaveKind};
use crate::protocol::{Command, CommandStatus, Dialect, GenericPacket};
use crate::stream::SamplePacket;
use crate::transport::Transport;
use crate::types::{INFO_RECORD_LEN, RficInfo};

/// Identification record answered by default: firmware 3, LimeSDR-USB, protocol 1,
/// hardware 4, no expansion board.
pub const DEFAULT_INFO_RECORD: [u8; INFO_RECORD_LEN] = [3, 14, 1, 4, 2];

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn timeout_error(timeout: Duration) -> io::Error {
    if timeout.is_zero() {
        io::Error::from(io::ErrorKind::WouldBlock)
    } else {
        io::Error::from(io::ErrorKind::TimedOut)
    }
}

/// Profile with one RFIC on SPI 0 (RX and TX channel 0), the FPGA on SPI 1, a Si5351 on
/// SPI 2 and a band-select register.
pub fn single_rfic_config(dialect: Dialect) -> ConnectionConfig {
    let mut config = ConnectionConfig { dialect, ..ConnectionConfig::default() };
    config.spi_slaves.insert(0, SpiSlaveKind::Rfic);
    config.spi_slaves.insert(1, SpiSlaveKind::Board);
    config.spi_slaves.insert(2, SpiSlaveKind::Si5351);
    config.rfics = vec![RficInfo::new(0).with_si5351(2).with_channels(Some(0), Some(0))];
    config.band_select_register = Some(0x0017);
    config.reference_clock.programmable = true;
    config
}

#[derive(Debug)]
struct DeviceState {
    dialect: Dialect,
    info: [u8; INFO_RECORD_LEN],
    registers: BTreeMap<(SpiSlaveKind, u8, u16), u16>,
    pending: VecDeque<Vec<u8>>,
    requests: Vec<GenericPacket>,
    status_override: Option<CommandStatus>,
    silent: bool,
    reply_delay: Duration,
    connected: bool,
    frames_written: usize,
    frames_read: usize,
    resets: usize,
}

/// Firmware emulator speaking one dialect on the control plane.
#[derive(Debug, Clone)]
pub struct EmulatedDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl EmulatedDevice {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            state: Arc::new(Mutex::new(DeviceState {
                dialect,
                info: DEFAULT_INFO_RECORD,
                registers: BTreeMap::new(),
                pending: VecDeque::new(),
                requests: Vec::new(),
                status_override: None,
                silent: false,
                reply_delay: Duration::ZERO,
                connected: true,
                frames_written: 0,
                frames_read: 0,
                resets: 0,
            })),
        }
    }

    /// Replace the identification record answered to GET_INFO.
    pub fn set_info(&self, info: [u8; INFO_RECORD_LEN]) {
        lock(&self.state).info = info;
    }

    /// Answer every command with `status` instead of the natural one.
    pub fn set_status_override(&self, status: Option<CommandStatus>) {
        lock(&self.state).status_override = status;
    }

    /// Accept frames but never answer them.
    pub fn set_silent(&self, silent: bool) {
        lock(&self.state).silent = silent;
    }

    /// Hold every reply back for `delay`, like firmware busy with a slow peripheral.
    pub fn set_reply_delay(&self, delay: Duration) {
        lock(&self.state).reply_delay = delay;
    }

    /// Drop the link: the transport reports closed and I/O fails with `NotConnected`.
    pub fn disconnect(&self) {
        lock(&self.state).connected = false;
    }

    pub fn register(&self, kind: SpiSlaveKind, periph_id: u8, address: u16) -> Option<u16> {
        lock(&self.state).registers.get(&(kind, periph_id, address)).copied()
    }

    pub fn set_register(&self, kind: SpiSlaveKind, periph_id: u8, address: u16, value: u16) {
        lock(&self.state).registers.insert((kind, periph_id, address), value);
    }

    /// Every request decoded so far, oldest first.
    pub fn requests(&self) -> Vec<GenericPacket> {
        lock(&self.state).requests.clone()
    }

    /// Commands received so far, oldest first.
    pub fn commands(&self) -> Vec<Command> {
        lock(&self.state).requests.iter().map(|request| request.cmd).collect()
    }

    pub fn frames_written(&self) -> usize {
        lock(&self.state).frames_written
    }

    pub fn frames_read(&self) -> usize {
        lock(&self.state).frames_read
    }

    pub fn resets(&self) -> usize {
        lock(&self.state).resets
    }

    /// Forget recorded requests and counters, keeping registers.
    pub fn clear_history(&self) {
        let mut state = lock(&self.state);
        state.requests.clear();
        state.frames_written = 0;
        state.frames_read = 0;
    }
}

impl DeviceState {
    fn answer(&mut self, request: &GenericPacket) -> GenericPacket {
        let mut reply = GenericPacket::new(request.cmd).for_periph(request.periph_id);
        let periph = request.periph_id;
        let data = &request.in_buffer;

        let status = match request.cmd {
            Command::GET_INFO => {
                reply.out_buffer = self.info.to_vec();
                CommandStatus::Completed
            }
            Command::LMS7002_RST | Command::LMS6002_RST | Command::MYRIAD_RST | Command::USB_FIFO_RST => {
                self.resets += 1;
                CommandStatus::Completed
            }
            Command::LMS7002_WR | Command::BRDSPI_WR => {
                let kind = register_kind(request.cmd);
                for word in data.chunks_exact(4) {
                    let address = u16::from_be_bytes([word[0], word[1]]) & 0x7FFF;
                    let value = u16::from_be_bytes([word[2], word[3]]);
                    self.registers.insert((kind, periph, address), value);
                }
                CommandStatus::Completed
            }
            Command::LMS7002_RD | Command::BRDSPI_RD => {
                let kind = register_kind(request.cmd);
                for address in data.chunks_exact(2) {
                    let addr = u16::from_be_bytes([address[0], address[1]]) & 0x7FFF;
                    let value = self.registers.get(&(kind, periph, addr)).copied().unwrap_or(0);
                    reply.out_buffer.extend_from_slice(&addr.to_be_bytes());
                    reply.out_buffer.extend_from_slice(&value.to_be_bytes());
                }
                CommandStatus::Completed
            }
            Command::SI5351_WR => {
                for pair in data.chunks_exact(2) {
                    self.registers.insert((SpiSlaveKind::Si5351, periph, u16::from(pair[0])), u16::from(pair[1]));
                }
                CommandStatus::Completed
            }
            Command::SI5351_RD => {
                for address in data {
                    let key = (SpiSlaveKind::Si5351, periph, u16::from(*address));
                    let value = self.registers.get(&key).copied().unwrap_or(0);
                    reply.out_buffer.extend_from_slice(&[*address, value as u8]);
                }
                CommandStatus::Completed
            }
            _ => CommandStatus::UnknownCommand,
        };

        reply.status = Some(self.status_override.unwrap_or(status));
        reply
    }
}

fn register_kind(cmd: Command) -> SpiSlaveKind {
    if cmd == Command::BRDSPI_WR || cmd == Command::BRDSPI_RD {
        SpiSlaveKind::Board
    } else {
        SpiSlaveKind::Rfic
    }
}

impl Transport for EmulatedDevice {
    fn write(&mut self, data: &[u8], _timeout: Duration) -> io::Result<usize> {
        let mut state = lock(&self.state);
        if !state.connected {
            return Err(io::ErrorKind::NotConnected.into());
        }
        let request = state
            .dialect
            .decode(data)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        state.frames_written += 1;

        let reply = state.answer(&request);
        state.requests.push(request);
        if !state.silent {
            let frame = state
                .dialect
                .encode_reply(&reply)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
            state.pending.push_back(frame);
        }
        Ok(data.len())
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        let delay = lock(&self.state).reply_delay;
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let mut state = lock(&self.state);
        if !state.connected {
            return Err(io::ErrorKind::NotConnected.into());
        }
        let frame = state.pending.pop_front().ok_or_else(|| timeout_error(timeout))?;
        let len = frame.len().min(buf.len());
        buf[..len].copy_from_slice(&frame[..len]);
        state.frames_read += 1;
        Ok(len)
    }

    fn is_open(&self) -> bool {
        lock(&self.state).connected
    }
}

#[derive(Debug, Default)]
struct PipeState {
    rx: VecDeque<Vec<u8>>,
    tx: Vec<Vec<u8>>,
    tx_budget: Option<usize>,
    broken: bool,
}

/// Sample transport with scripted RX packets and captured TX packets.
#[derive(Debug, Clone, Default)]
pub struct SamplePipe {
    state: Arc<Mutex<PipeState>>,
}

impl SamplePipe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a packet for the host to receive.
    pub fn queue(&self, packet: &SamplePacket, packet_size: usize) {
        // Test packets are built to fit; an oversized one is a bug in the test itself
        let bytes = packet.encode(packet_size).expect("test packet fits the packet size");
        lock(&self.state).rx.push_back(bytes);
    }

    /// Queue raw bytes, e.g. a corrupted packet.
    pub fn queue_raw(&self, bytes: Vec<u8>) {
        lock(&self.state).rx.push_back(bytes);
    }

    pub fn queued(&self) -> usize {
        lock(&self.state).rx.len()
    }

    /// Accept only `packets` more writes, then time out.
    pub fn limit_tx(&self, packets: Option<usize>) {
        lock(&self.state).tx_budget = packets;
    }

    /// Fail every further operation with `BrokenPipe`.
    pub fn break_pipe(&self) {
        lock(&self.state).broken = true;
    }

    /// Raw packets written by the host.
    pub fn sent_raw(&self) -> Vec<Vec<u8>> {
        lock(&self.state).tx.clone()
    }

    /// Packets written by the host, decoded.
    pub fn sent(&self) -> Vec<SamplePacket> {
        lock(&self.state)
            .tx
            .iter()
            .map(|bytes| SamplePacket::decode(bytes).expect("host wrote a well-formed packet"))
            .collect()
    }
}

impl Transport for SamplePipe {
    fn write(&mut self, data: &[u8], timeout: Duration) -> io::Result<usize> {
        let mut state = lock(&self.state);
        if state.broken {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        if let Some(budget) = state.tx_budget.as_mut() {
            if *budget == 0 {
                return Err(timeout_error(timeout));
            }
            *budget -= 1;
        }
        state.tx.push(data.to_vec());
        Ok(data.len())
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        let mut state = lock(&self.state);
        if state.broken {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        let bytes = state.rx.pop_front().ok_or_else(|| timeout_error(timeout))?;
        let len = bytes.len().min(buf.len());
        buf[..len].copy_from_slice(&bytes[..len]);
        Ok(len)
    }
}
