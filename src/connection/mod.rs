//! Connection abstraction
//!
//! [`Connection`] is the uniform surface RFIC drivers program against. Every method has a
//! default describing hardware with no capabilities, so a minimal implementation only
//! overrides what its device can do. All methods take `&self`: implementations are
//! internally synchronised and can be shared across threads.
//!
//! [`PacketConnection`] is the framed implementation: one packet dialect on a control
//! transport, plus optional sample pipes for streaming.

use std::time::Duration;

use crate::config::DEFAULT_REFERENCE_CLOCK_HZ;
use crate::protocol::GenericPacket;
use crate::transport::DataLogCallback;
use crate::types::{DeviceInfo, RficInfo, StreamMetadata};
use crate::{ConnectionError, Result};

mod packet;
pub(crate) mod si5351;
pub mod spi;

pub use packet::PacketConnection;

#[cfg(test)]
mod tests;

/// Transaction surface of one physical device.
pub trait Connection: Send + Sync {
    /// Whether the device answered its probe and the transport is still up.
    ///
    /// Constructors may fail to reach the device without returning an error, so callers
    /// check this before use.
    fn is_open(&self) -> bool {
        false
    }

    /// Cached identification of the device. Empty when the device was never reached.
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo::default()
    }

    /// Query the device again and replace the cached identification.
    fn refresh_device_info(&self) -> Result<DeviceInfo> {
        Err(ConnectionError::unsupported("device info"))
    }

    /// RFICs reachable through this connection. Empty when none is accessible.
    fn list_rfics(&self) -> Vec<RficInfo> {
        Vec::new()
    }

    /// Pulse the RFIC reset line. Success means the command was acknowledged, not that
    /// the chip finished resetting.
    fn device_reset(&self) -> Result<()> {
        Err(ConnectionError::unsupported("device reset"))
    }

    /// Run `write.len()` SPI transactions on the slave at `index`.
    ///
    /// Bit 31 of each word selects write (1) or read (0); see [`spi`] for the address and
    /// data fields. Read results land at the same position of `read`; without a read
    /// buffer, read words are skipped entirely. Register state after a failure is
    /// unknown.
    fn transact_spi(&self, index: u32, write: &[u32], read: Option<&mut [u32]>) -> Result<()> {
        let _ = (write, read);
        Err(ConnectionError::unsupported(format!("SPI index {}", index)))
    }

    /// Drive the external band-select lines for the given TRF and RFE bands.
    ///
    /// Best effort: failures are logged, never returned.
    fn update_external_band_select(&self, trf_band: u32, rfe_band: u32) {
        let _ = (trf_band, rfe_band);
    }

    fn reference_clock_rate(&self) -> f64 {
        DEFAULT_REFERENCE_CLOCK_HZ
    }

    /// Change the reference clock. Hardware with a fixed reference ignores the request.
    fn set_reference_clock_rate(&self, rate_hz: f64) {
        let _ = rate_hz;
    }

    /// Send one command packet and fill `packet` from the device's reply.
    fn transfer_packet(&self, packet: &mut GenericPacket) -> Result<()> {
        Err(ConnectionError::unsupported(format!("command {}", packet.cmd)))
    }

    /// Start, stop or re-arm an RX stream.
    ///
    /// - `burst_size == 0` without end of burst stops the stream
    /// - with end of burst, exactly `burst_size` samples are requested
    /// - otherwise the stream runs continuously, `burst_size` hinting packets per transfer
    ///
    /// A timestamp in `metadata` delays the start until the device clock reaches it.
    fn rx_stream_control(&self, stream_id: u32, burst_size: usize, metadata: &StreamMetadata) -> Result<()> {
        let _ = (burst_size, metadata);
        Err(ConnectionError::unsupported(format!("RX stream {}", stream_id)))
    }

    /// Fill one buffer per channel with received samples.
    ///
    /// Returns bytes written per buffer, fewer than requested only when a burst ended
    /// (then `metadata.end_of_burst` is set). `metadata.timestamp` receives the timestamp
    /// of the first returned sample.
    fn read_stream(
        &self,
        stream_id: u32,
        buffers: &mut [&mut [u8]],
        timeout: Duration,
        metadata: &mut StreamMetadata,
    ) -> Result<usize> {
        let _ = (buffers, timeout, metadata);
        Err(ConnectionError::unsupported(format!("RX stream {}", stream_id)))
    }

    /// Send one buffer per channel.
    ///
    /// Returns bytes accepted per buffer. Accepted samples cannot be retracted, so a
    /// timeout after a partial transfer reports the partial count.
    fn write_stream(
        &self,
        stream_id: u32,
        buffers: &[&[u8]],
        timeout: Duration,
        metadata: &StreamMetadata,
    ) -> Result<usize> {
        let _ = (buffers, timeout, metadata);
        Err(ConnectionError::unsupported(format!("TX stream {}", stream_id)))
    }

    /// Install or clear the hook observing raw traffic.
    fn set_data_log_callback(&self, callback: Option<DataLogCallback>) {
        let _ = callback;
    }
}
