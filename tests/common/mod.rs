//! Hardware stand-ins built only from the public API

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::io;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use rfic_link::{Command, CommandStatus, Dialect, GenericPacket, Transport};

/// Register banks of the firmware.
pub const RFIC_BANK: u8 = 0;
pub const BOARD_BANK: u8 = 1;

/// GET_INFO record: firmware 2, LimeSDR-USB, protocol 1, hardware 3, Myriad7.
pub const INFO: [u8; 5] = [2, 14, 1, 3, 7];

#[derive(Default)]
struct FirmwareState {
    registers: BTreeMap<(u8, u8, u16), u16>,
    replies: VecDeque<Vec<u8>>,
}

/// Firmware with an RFIC and a board register file.
#[derive(Clone)]
pub struct Firmware {
    dialect: Dialect,
    state: Arc<Mutex<FirmwareState>>,
}

impl Firmware {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect, state: Arc::default() }
    }

    pub fn register(&self, bank: u8, periph: u8, address: u16) -> Option<u16> {
        self.state.lock().unwrap().registers.get(&(bank, periph, address)).copied()
    }

    fn answer(&self, state: &mut FirmwareState, request: &GenericPacket) -> GenericPacket {
        let bank = if request.cmd == Command::BRDSPI_WR || request.cmd == Command::BRDSPI_RD {
            BOARD_BANK
        } else {
            RFIC_BANK
        };
        let mut reply = GenericPacket::new(request.cmd).for_periph(request.periph_id);
        reply.status = Some(CommandStatus::Completed);

        match request.cmd {
            Command::GET_INFO => reply.out_buffer = INFO.to_vec(),
            Command::LMS7002_RST => {}
            Command::LMS7002_WR | Command::BRDSPI_WR => {
                for word in request.in_buffer.chunks_exact(4) {
                    let address = u16::from_be_bytes([word[0], word[1]]);
                    let value = u16::from_be_bytes([word[2], word[3]]);
                    state.registers.insert((bank, request.periph_id, address), value);
                }
            }
            Command::LMS7002_RD | Command::BRDSPI_RD => {
                for word in request.in_buffer.chunks_exact(2) {
                    let address = u16::from_be_bytes([word[0], word[1]]);
                    let value = state.registers.get(&(bank, request.periph_id, address)).copied().unwrap_or(0);
                    reply.out_buffer.extend_from_slice(&address.to_be_bytes());
                    reply.out_buffer.extend_from_slice(&value.to_be_bytes());
                }
            }
            _ => reply.status = Some(CommandStatus::UnknownCommand),
        }
        reply
    }
}

impl Transport for Firmware {
    fn write(&mut self, data: &[u8], _timeout: Duration) -> io::Result<usize> {
        let request = self
            .dialect
            .decode(data)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        let mut state = self.state.lock().unwrap();
        let reply = self.answer(&mut state, &request);
        let frame = self
            .dialect
            .encode_reply(&reply)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        state.replies.push_back(frame);
        Ok(data.len())
    }

    fn read(&mut self, buf: &mut [u8], _timeout: Duration) -> io::Result<usize> {
        let frame = self.state.lock().unwrap().replies.pop_front().ok_or(io::ErrorKind::TimedOut)?;
        buf[..frame.len()].copy_from_slice(&frame);
        Ok(frame.len())
    }
}

/// Sample pipe whose TX side feeds its own RX side, like a board in digital loopback.
///
/// Reads block until a packet arrives or the timeout expires.
#[derive(Clone, Default)]
pub struct Loopback {
    shared: Arc<(Mutex<VecDeque<Vec<u8>>>, Condvar)>,
}

impl Transport for Loopback {
    fn write(&mut self, data: &[u8], _timeout: Duration) -> io::Result<usize> {
        let (queue, ready) = &*self.shared;
        queue.lock().unwrap().push_back(data.to_vec());
        ready.notify_all();
        Ok(data.len())
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        let (queue, ready) = &*self.shared;
        let (mut queue, _) = ready.wait_timeout_while(queue.lock().unwrap(), timeout, |q| q.is_empty()).unwrap();
        let packet = queue.pop_front().ok_or(if timeout.is_zero() {
            io::ErrorKind::WouldBlock
        } else {
            io::ErrorKind::TimedOut
        })?;
        buf[..packet.len()].copy_from_slice(&packet);
        Ok(packet.len())
    }
}
