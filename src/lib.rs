//! Connection layer for LMS-family RFIC boards.
//!
//! rfic-link is the seam between RFIC drivers and the boards carrying the chips. Drivers
//! program against the [`Connection`] trait; [`PacketConnection`] implements it on top of
//! any byte [`Transport`] by speaking one of the fixed-size packet dialects used by the
//! board firmware.
//!
//! # Features
//!
//! - **Packet dialects**: DIGIC, LMS64C and Novena framings behind one [`GenericPacket`]
//! - **SPI transactions**: 32-bit word batches, split into as few frames as fit
//! - **Sample streaming**: blocking RX/TX with timestamps, bursts and timeouts
//! - **Device profiles**: YAML descriptions of SPI slaves, RFICs and stream framing
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::io;
//! use std::time::Duration;
//! use rfic_link::{Connection, ConnectionConfig, PacketConnection, Transport};
//! use rfic_link::connection::spi;
//!
//! struct UsbControl;
//!
//! impl Transport for UsbControl {
//!     fn write(&mut self, data: &[u8], _timeout: Duration) -> io::Result<usize> {
//!         Ok(data.len())
//!     }
//!
//!     fn read(&mut self, buf: &mut [u8], _timeout: Duration) -> io::Result<usize> {
//!         Ok(buf.len())
//!     }
//! }
//!
//! fn main() -> rfic_link::Result<()> {
//!     let config = ConnectionConfig::from_path("profiles/limesdr-usb.yaml")?;
//!     let connection = PacketConnection::new(config, Box::new(UsbControl))?;
//!     println!("Connected to {}", connection.device_info().device_name);
//!
//!     let mut value = [0u32; 1];
//!     connection.transact_spi(0, &[spi::read_word(0x002F)], Some(&mut value))?;
//!     println!("Chip revision register: 0x{:04X}", value[0]);
//!     Ok(())
//! }
//! ```

mod error;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

pub mod config;
pub mod connection;
pub mod protocol;
pub mod stream;
pub mod transport;

// Core exports
pub use error::*;
pub use types::*;

pub use config::{ConnectionConfig, DEFAULT_REFERENCE_CLOCK_HZ, ReferenceClock, SpiSlaveKind, StreamConfig};
pub use connection::{Connection, PacketConnection};
pub use protocol::{Command, CommandStatus, Dialect, GenericPacket};
pub use stream::{SamplePacket, StreamCommand, StreamDirection, StreamState};
pub use transport::{DataLogCallback, LogDirection, Transport};
