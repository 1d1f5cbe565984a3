//! Packet model and the three fixed-size wire dialects.
//!
//! [`GenericPacket`] is what callers build; a [`Dialect`] turns it into exactly one frame
//! and back. Codecs are pure functions with no I/O, so they can be exercised without a
//! device:
//!
//! ```rust
//! use rfic_link::protocol::{Command, Dialect, GenericPacket};
//!
//! let packet = GenericPacket::with_payload(Command(5), [1, 2]);
//! let frame = Dialect::Lms64c.encode(&packet).unwrap();
//! assert_eq!(frame.len(), 64);
//! assert_eq!(&frame[..10], &[5, 0, 1, 0, 0, 0, 0, 0, 1, 2]);
//! ```

mod codec;
mod command;
mod dialect;
mod packet;

pub use command::{BlockLayout, Command, CommandStatus, ReplySpan};
pub use dialect::{Dialect, FrameLayout};
pub use packet::GenericPacket;
