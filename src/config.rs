//! Device profiles
//!
//! A [`ConnectionConfig`] describes the hardware behind one connection: which packet
//! dialect it speaks, which SPI indices exist and what sits on them, the RFICs and their
//! streaming channels, and how the sample pipe is framed. Profiles are plain YAML:
//!
//! ```yaml
//! dialect:
//!   protocol: lms64c
//! control_timeout_ms: 250
//! rfics:
//!   - spi_index_rfic: 0
//!     spi_index_si5351: 2
//!     rx_channel: 0
//!     tx_channel: 0
//! spi_slaves:
//!   0: rfic
//!   1: board
//!   2: si5351
//! reference_clock:
//!   rate_hz: 30720000.0
//!   programmable: true
//!   crystal_hz: 25000000
//!   output: 0
//! band_select_register: 23
//! stream:
//!   packet_size: 4096
//!   bytes_per_sample: 4
//!   fpga_spi_index: 1
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::connection::si5351::MAX_OUTPUT;
use crate::protocol::Dialect;
use crate::stream::SAMPLE_HEADER_LEN;
use crate::types::RficInfo;
use crate::{ConnectionError, Result};

/// Reference clock assumed when a profile does not name one.
pub const DEFAULT_REFERENCE_CLOCK_HZ: f64 = 30.72e6;

/// Crystal on the Si5351 XA/XB pins.
pub const DEFAULT_SI5351_CRYSTAL_HZ: u64 = 25_000_000;

/// What is wired to an SPI index, which decides the command pair and word layout used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpiSlaveKind {
    /// RFIC register file: 15-bit address, 16-bit data.
    Rfic,
    /// FPGA or board register file: 15-bit address, 16-bit data.
    Board,
    /// Si5351 clock generator: 8-bit address, 8-bit data.
    Si5351,
}

/// Reference clock of the board.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceClock {
    pub rate_hz: f64,
    /// Whether the rate can be changed at runtime. Fixed references ignore updates,
    /// programmable ones are produced by a Si5351 and reprogrammed on every change.
    pub programmable: bool,
    /// Si5351 SPI index producing the reference. Falls back to the Si5351 of the
    /// first RFIC that names one, then to the first `si5351` slave.
    pub si5351_spi_index: Option<u32>,
    pub crystal_hz: u64,
    /// Si5351 output (CLK0..CLK5) wired to the RFIC reference input.
    pub output: u8,
}

impl Default for ReferenceClock {
    fn default() -> Self {
        Self {
            rate_hz: DEFAULT_REFERENCE_CLOCK_HZ,
            programmable: false,
            si5351_spi_index: None,
            crystal_hz: DEFAULT_SI5351_CRYSTAL_HZ,
            output: 0,
        }
    }
}

/// Framing of the sample pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Size of one sample packet including its header.
    pub packet_size: usize,
    /// Bytes per sample of one channel, e.g. 4 for 16-bit I/Q.
    pub bytes_per_sample: usize,
    /// Board SPI index holding the FPGA stream registers. Falls back to the first
    /// `board` slave when unset.
    pub fpga_spi_index: Option<u32>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self { packet_size: 4096, bytes_per_sample: 4, fpga_spi_index: None }
    }
}

/// Everything a [`crate::PacketConnection`] needs to know about its hardware.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub dialect: Dialect,
    pub control_timeout_ms: u64,
    pub rfics: Vec<RficInfo>,
    pub spi_slaves: BTreeMap<u32, SpiSlaveKind>,
    pub reference_clock: ReferenceClock,
    /// Board register receiving the external band-select bits, if the board has one.
    pub band_select_register: Option<u16>,
    pub stream: StreamConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            control_timeout_ms: 100,
            rfics: Vec::new(),
            spi_slaves: BTreeMap::new(),
            reference_clock: ReferenceClock::default(),
            band_select_register: None,
            stream: StreamConfig::default(),
        }
    }
}

impl ConnectionConfig {
    /// Parse and validate a YAML profile.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: ConnectionConfig = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        debug!(
            dialect = %config.dialect,
            rfics = config.rfics.len(),
            spi_slaves = config.spi_slaves.len(),
            "Loaded connection profile"
        );
        Ok(config)
    }

    /// Read, parse and validate a YAML profile from disk.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| ConnectionError::Config {
            reason: format!("cannot read profile {}", path.display()),
            source: Some(Box::new(e)),
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// Check the cross-field invariants serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.control_timeout_ms == 0 {
            return Err(ConnectionError::config("control_timeout_ms must be non-zero"));
        }

        let mut rx_channels = BTreeSet::new();
        let mut tx_channels = BTreeSet::new();
        for rfic in &self.rfics {
            self.expect_slave(rfic.spi_index_rfic, SpiSlaveKind::Rfic)?;
            if let Some(index) = rfic.spi_index_si5351 {
                self.expect_slave(index, SpiSlaveKind::Si5351)?;
            }
            for channel in rfic.rx_channel.iter().chain(rfic.tx_channel.iter()) {
                if *channel > u32::from(u8::MAX) {
                    return Err(ConnectionError::config(format!(
                        "channel {} does not fit the 8-bit stream id",
                        channel
                    )));
                }
            }
            if let Some(channel) = rfic.rx_channel.filter(|c| !rx_channels.insert(*c)) {
                return Err(ConnectionError::config(format!("RX channel {} is used twice", channel)));
            }
            if let Some(channel) = rfic.tx_channel.filter(|c| !tx_channels.insert(*c)) {
                return Err(ConnectionError::config(format!("TX channel {} is used twice", channel)));
            }
        }

        if let Some(index) = self.stream.fpga_spi_index {
            self.expect_slave(index, SpiSlaveKind::Board)?;
        }
        if self.band_select_register.is_some() && self.board_spi_index().is_none() {
            return Err(ConnectionError::config("band_select_register needs a board SPI slave"));
        }

        let clock = &self.reference_clock;
        if !clock.rate_hz.is_finite() || clock.rate_hz <= 0.0 {
            return Err(ConnectionError::config(format!("reference clock rate {} Hz", clock.rate_hz)));
        }
        if clock.programmable {
            if let Some(index) = clock.si5351_spi_index {
                self.expect_slave(index, SpiSlaveKind::Si5351)?;
            }
            if self.reference_clock_spi_index().is_none() {
                return Err(ConnectionError::config("a programmable reference clock needs a si5351 SPI slave"));
            }
            if clock.crystal_hz == 0 {
                return Err(ConnectionError::config("crystal_hz must be non-zero"));
            }
            if clock.output > MAX_OUTPUT {
                return Err(ConnectionError::config(format!(
                    "Si5351 output {} is out of range 0..={}",
                    clock.output, MAX_OUTPUT
                )));
            }
        }

        if self.stream.bytes_per_sample == 0 {
            return Err(ConnectionError::config("bytes_per_sample must be non-zero"));
        }
        let payload = self.stream.packet_size.saturating_sub(SAMPLE_HEADER_LEN);
        if payload < self.stream.bytes_per_sample {
            return Err(ConnectionError::config(format!(
                "packet_size {} leaves no room for a sample after the {}-byte header",
                self.stream.packet_size, SAMPLE_HEADER_LEN
            )));
        }
        if payload > u16::MAX as usize {
            return Err(ConnectionError::config(format!(
                "packet_size {} exceeds the 16-bit payload length field",
                self.stream.packet_size
            )));
        }

        Ok(())
    }

    /// Deadline applied to every control-plane write and read.
    pub fn control_timeout(&self) -> Duration {
        Duration::from_millis(self.control_timeout_ms)
    }

    /// Board SPI index used for FPGA and band-select register writes.
    pub fn board_spi_index(&self) -> Option<u32> {
        self.stream.fpga_spi_index.or_else(|| {
            self.spi_slaves
                .iter()
                .find(|(_, kind)| **kind == SpiSlaveKind::Board)
                .map(|(index, _)| *index)
        })
    }

    /// Si5351 SPI index that produces the reference clock.
    pub fn reference_clock_spi_index(&self) -> Option<u32> {
        self.reference_clock
            .si5351_spi_index
            .or_else(|| self.rfics.iter().find_map(|rfic| rfic.spi_index_si5351))
            .or_else(|| {
                self.spi_slaves
                    .iter()
                    .find(|(_, kind)| **kind == SpiSlaveKind::Si5351)
                    .map(|(index, _)| *index)
            })
    }

    fn expect_slave(&self, index: u32, kind: SpiSlaveKind) -> Result<()> {
        match self.spi_slaves.get(&index) {
            Some(found) if *found == kind => Ok(()),
            Some(found) => Err(ConnectionError::config(format!(
                "SPI index {} is declared as {:?}, expected {:?}",
                index, found, kind
            ))),
            None => Err(ConnectionError::config(format!("SPI index {} is not declared", index))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILE: &str = r#"
dialect:
  protocol: lms64c
control_timeout_ms: 250
rfics:
  - spi_index_rfic: 0
    spi_index_si5351: 2
    rx_channel: 0
    tx_channel: 0
spi_slaves:
  0: rfic
  1: board
  2: si5351
reference_clock:
  rate_hz: 40000000.0
  programmable: true
band_select_register: 23
stream:
  packet_size: 4096
  bytes_per_sample: 4
  fpga_spi_index: 1
"#;

    #[test]
    fn parses_full_profile() {
        let config = ConnectionConfig::from_yaml_str(PROFILE).unwrap();
        assert_eq!(config.dialect, Dialect::Lms64c);
        assert_eq!(config.control_timeout(), Duration::from_millis(250));
        assert_eq!(config.rfics, vec![RficInfo::new(0).with_si5351(2).with_channels(Some(0), Some(0))]);
        assert_eq!(config.spi_slaves.get(&2), Some(&SpiSlaveKind::Si5351));
        assert!(config.reference_clock.programmable);
        assert_eq!(config.band_select_register, Some(23));
        assert_eq!(config.board_spi_index(), Some(1));
    }

    #[test]
    fn empty_profile_uses_defaults() {
        let config = ConnectionConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, ConnectionConfig::default());
        assert_eq!(config.reference_clock.rate_hz, DEFAULT_REFERENCE_CLOCK_HZ);
        assert_eq!(config.stream.packet_size, 4096);
        assert_eq!(config.board_spi_index(), None);
    }

    #[test]
    fn digic_profile_carries_i2c_address() {
        let config = ConnectionConfig::from_yaml_str("dialect:\n  protocol: digic\n  i2c_address: 96\n").unwrap();
        assert_eq!(config.dialect, Dialect::Digic { i2c_address: 96 });
    }

    #[test]
    fn duplicate_channels_are_rejected() {
        let mut config = ConnectionConfig::default();
        config.spi_slaves.insert(0, SpiSlaveKind::Rfic);
        config.spi_slaves.insert(1, SpiSlaveKind::Rfic);
        config.rfics = vec![
            RficInfo::new(0).with_channels(Some(0), Some(0)),
            RficInfo::new(1).with_channels(Some(0), Some(1)),
        ];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("RX channel 0"));

        config.rfics[1].rx_channel = None;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn undeclared_or_mistyped_slaves_are_rejected() {
        let mut config = ConnectionConfig { rfics: vec![RficInfo::new(4)], ..Default::default() };
        assert!(config.validate().is_err());

        config.spi_slaves.insert(4, SpiSlaveKind::Board);
        assert!(config.validate().unwrap_err().to_string().contains("expected Rfic"));
    }

    #[test]
    fn stream_framing_limits() {
        let mut config = ConnectionConfig::default();
        config.stream.packet_size = SAMPLE_HEADER_LEN;
        assert!(config.validate().is_err());

        config.stream.packet_size = SAMPLE_HEADER_LEN + 4;
        assert!(config.validate().is_ok());

        config.stream.bytes_per_sample = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn programmable_clock_needs_a_synthesizer() {
        let mut config = ConnectionConfig::default();
        config.reference_clock.programmable = true;
        assert!(config.validate().unwrap_err().to_string().contains("si5351"));

        config.spi_slaves.insert(5, SpiSlaveKind::Si5351);
        assert!(config.validate().is_ok());
        assert_eq!(config.reference_clock_spi_index(), Some(5));

        config.reference_clock.output = 6;
        assert!(config.validate().is_err());
        config.reference_clock.output = 1;
        config.reference_clock.si5351_spi_index = Some(3);
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_yaml_is_a_config_error() {
        let err = ConnectionConfig::from_yaml_str("dialect: [").unwrap_err();
        assert!(matches!(err, ConnectionError::Config { source: Some(_), .. }));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = ConnectionConfig::from_path("/nonexistent/profile.yaml").unwrap_err();
        assert!(matches!(err, ConnectionError::Config { .. }));
    }
}
