//! Raw byte pipe to the device
//!
//! A [`Transport`] moves opaque bytes with a deadline and nothing else. The USB, PCIe or
//! socket plumbing behind it is out of scope for this crate: anything that can block on
//! a write or a read for at most `timeout` can carry the control and sample planes.
//!
//! A zero timeout means poll: return immediately with whatever is available. Timeouts
//! are reported as [`std::io::ErrorKind::TimedOut`] (or `WouldBlock` when polling).
//! Disconnects are reported as `NotConnected` or `BrokenPipe`.

use std::fmt;
use std::io;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// Blocking byte transport with per-call deadlines.
pub trait Transport: Send {
    /// Write `data`, returning how many bytes the device accepted.
    fn write(&mut self, data: &[u8], timeout: Duration) -> io::Result<usize>;

    /// Read into `buf`, returning how many bytes arrived.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;

    /// Whether the underlying link is still established.
    fn is_open(&self) -> bool {
        true
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, data: &[u8], timeout: Duration) -> io::Result<usize> {
        (**self).write(data, timeout)
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        (**self).read(buf, timeout)
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }
}

/// Direction of a raw transfer passed to the data-log hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogDirection {
    /// Bytes sent to the device.
    Tx,
    /// Bytes received from the device.
    Rx,
}

impl fmt::Display for LogDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogDirection::Tx => f.write_str("TX"),
            LogDirection::Rx => f.write_str("RX"),
        }
    }
}

/// Hook observing every raw frame moved by a connection.
///
/// Runs on the thread performing the I/O, with the connection's pipe lock held.
pub type DataLogCallback = Arc<dyn Fn(LogDirection, &[u8]) + Send + Sync>;

/// Slot holding the current [`DataLogCallback`] of one connection.
#[derive(Default)]
pub(crate) struct DataLog {
    callback: RwLock<Option<DataLogCallback>>,
}

impl DataLog {
    pub(crate) fn set(&self, callback: Option<DataLogCallback>) {
        *self.callback.write().unwrap_or_else(PoisonError::into_inner) = callback;
    }

    pub(crate) fn emit(&self, direction: LogDirection, bytes: &[u8]) {
        let callback = self.callback.read().unwrap_or_else(PoisonError::into_inner).clone();
        if let Some(callback) = callback {
            callback(direction, bytes);
        }
    }
}

impl fmt::Debug for DataLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let installed = self.callback.read().map(|cb| cb.is_some()).unwrap_or(false);
        f.debug_struct("DataLog").field("installed", &installed).finish()
    }
}

/// Write the whole of `data` or fail.
///
/// A transport accepting fewer bytes than offered is treated as a write error, since a
/// partial frame leaves the device out of sync.
pub(crate) fn write_all(transport: &mut dyn Transport, data: &[u8], timeout: Duration) -> io::Result<()> {
    let written = transport.write(data, timeout)?;
    if written != data.len() {
        return Err(io::Error::new(
            io::ErrorKind::WriteZero,
            format!("short write: {} of {} bytes", written, data.len()),
        ));
    }
    Ok(())
}

/// Read exactly `buf.len()` bytes or fail.
pub(crate) fn read_exact(transport: &mut dyn Transport, buf: &mut [u8], timeout: Duration) -> io::Result<()> {
    let read = transport.read(buf, timeout)?;
    if read != buf.len() {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("short read: {} of {} bytes", read, buf.len()),
        ));
    }
    Ok(())
}
