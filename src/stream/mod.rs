//! Sample streaming
//!
//! Streams move samples over a sample pipe separate from the control plane. Each stream
//! follows the same life cycle:
//!
//! ```text
//! Idle ──control(start)──► Armed ──first packet──► Running ──end of burst / stop──► Idle
//!   └──────control(start, no timestamp)───────────►   │
//!                                                     └──transport failure──► Error
//! ```
//!
//! RX streams are started and stopped through FPGA registers (see [`control`]); TX
//! streams run while the caller writes and return to idle after an end-of-burst packet.

mod channel;
pub mod control;
mod packet;
mod pipe;

pub(crate) use channel::{RxStream, TxStream, interleave};
pub use control::StreamCommand;
pub use packet::{SAMPLE_HEADER_LEN, SamplePacket};
pub(crate) use pipe::{RxPipe, TxPipe};

use serde::{Deserialize, Serialize};

/// Life-cycle state of one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamState {
    /// Not started, or the last burst ended.
    Idle,
    /// Started with a timestamp; waiting for the first sample.
    Armed,
    Running,
    /// A transport or control failure left the stream in an unknown state. Restart it.
    Error,
}

/// Direction of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamDirection {
    Rx,
    Tx,
}
