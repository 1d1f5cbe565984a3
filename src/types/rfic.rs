//! Description of the RFIC chips reachable through a connection

use serde::{Deserialize, Serialize};

/// SPI routing and streaming channels for one RFIC.
///
/// Channels are `None` when the RFIC cannot stream in that direction. Each present
/// channel is unique among the RFICs of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RficInfo {
    /// SPI index of the RFIC itself.
    pub spi_index_rfic: u32,
    /// SPI index of the Si5351 clock generator feeding this RFIC, if any.
    #[serde(default)]
    pub spi_index_si5351: Option<u32>,
    #[serde(default)]
    pub rx_channel: Option<u32>,
    #[serde(default)]
    pub tx_channel: Option<u32>,
}

impl RficInfo {
    /// An RFIC at `spi_index_rfic` with no clock generator and no streaming channels.
    pub fn new(spi_index_rfic: u32) -> Self {
        Self { spi_index_rfic, spi_index_si5351: None, rx_channel: None, tx_channel: None }
    }

    pub fn with_channels(mut self, rx_channel: Option<u32>, tx_channel: Option<u32>) -> Self {
        self.rx_channel = rx_channel;
        self.tx_channel = tx_channel;
        self
    }

    pub fn with_si5351(mut self, spi_index: u32) -> Self {
        self.spi_index_si5351 = Some(spi_index);
        self
    }
}
