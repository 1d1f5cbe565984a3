//! Plain data exchanged across the connection surface.
//!
//! - [`DeviceInfo`] identifies the board behind a connection
//! - [`RficInfo`] routes SPI traffic and streaming channels to one RFIC
//! - [`StreamMetadata`] carries timestamps and burst flags for stream calls
//! - [`OperationStatus`] and [`TransferStatus`] collapse a [`crate::Result`] into the
//!   coarse codes older callers branch on

mod device_info;
mod metadata;
mod rfic;
mod status;

pub use device_info::{DeviceInfo, DeviceKind, ExpansionBoard, INFO_RECORD_LEN};
pub use metadata::StreamMetadata;
pub use rfic::RficInfo;
pub use status::{OperationStatus, TransferStatus};
