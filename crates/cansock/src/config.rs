//! Channel configuration
//!
//! TOML-backed descriptions of ISO-TP and raw CAN channels. Numeric fields
//! are deserialized wide and narrowed during conversion, so an out-of-range
//! value is reported as a [`ValidationError`] naming the field rather than
//! as a parse error.
//!
//! ```toml
//! interface = "vcan0"
//! rx_id = "0x7E8"
//! tx_id = "0x7E0"
//!
//! [options]
//! flags = ["wait_tx_done"]
//! tx_padding = 0xAA
//! rx_padding = 0xAA
//!
//! [flow_control]
//! block_size = 8
//! st_min = 0x05
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use cansock_core::error::octet;
use cansock_core::filter::check_error_mask;
use cansock_core::{
    CanFilter, CanId, FdFlags, IsotpAddress, IsotpFlags, IsotpFlowControlOptions,
    IsotpLinkLayerOptions, IsotpOptions, ValidationError,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::channel::Channel;
use crate::error::ChannelResult;
use crate::native::NativeSocket;
use crate::option::{isotp, raw, Isotp, RawCan};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Parse a configuration file
pub fn load_config<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = from_toml_str(&text)?;
    tracing::debug!(path = %path.display(), "Loaded channel configuration");
    Ok(config)
}

pub fn from_toml_str<T: DeserializeOwned>(text: &str) -> Result<T, ConfigError> {
    Ok(toml::from_str(text)?)
}

/// Parse a CAN ID from string (hex with 0x prefix, or decimal)
pub fn parse_can_id(s: &str) -> Result<CanId, ValidationError> {
    Ok(CanId::new(parse_u32("can_id", s)?)?)
}

fn parse_u32(field: &'static str, s: &str) -> Result<u32, ValidationError> {
    let trimmed = s.trim();
    let (digits, radix) = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => (hex, 16),
        None => (trimmed, 10),
    };
    u32::from_str_radix(digits, radix)
        .map_err(|_| ValidationError::new(field, s, "hex (0x...) or decimal integer"))
}

fn parse_flags<F: bitflags::Flags>(
    field: &'static str,
    names: &[String],
) -> Result<F, ValidationError> {
    names.iter().try_fold(F::empty(), |acc, name| {
        F::from_name(&name.to_ascii_uppercase())
            .map(|flag| acc.union(flag))
            .ok_or_else(|| ValidationError::new(field, name, "known flag names"))
    })
}

fn timeout(ms: Option<u64>) -> Option<Duration> {
    ms.map(Duration::from_millis)
}

// =============================================================================
// ISO-TP
// =============================================================================

/// ISO-TP channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsotpChannelConfig {
    /// CAN interface name (e.g., "can0")
    pub interface: String,
    /// Receive CAN ID (ECU -> tester)
    pub rx_id: String,
    /// Transmit CAN ID (tester -> ECU)
    pub tx_id: String,
    /// Extended address expected in received frames
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rx_ext_address: Option<u32>,
    /// Extended address placed in transmitted frames
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_ext_address: Option<u32>,
    #[serde(default)]
    pub nonblocking: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_timeout_ms: Option<u64>,
    #[serde(default)]
    pub options: IsotpOptionsConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_control: Option<FlowControlConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_layer: Option<LinkLayerConfig>,
    /// Forced TX STmin, passed to the kernel verbatim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_stmin: Option<i32>,
    /// Forced RX STmin, passed to the kernel verbatim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rx_stmin: Option<i32>,
}

impl IsotpChannelConfig {
    /// Local endpoint (receive side)
    pub fn local_address(&self) -> Result<IsotpAddress, ValidationError> {
        endpoint(&self.rx_id, self.rx_ext_address)
    }

    /// Remote endpoint (transmit side)
    pub fn remote_address(&self) -> Result<IsotpAddress, ValidationError> {
        endpoint(&self.tx_id, self.tx_ext_address)
    }
}

fn endpoint(id: &str, ext_address: Option<u32>) -> Result<IsotpAddress, ValidationError> {
    let id = parse_can_id(id)?;
    Ok(match ext_address {
        Some(ext) => IsotpAddress::extended(id, octet("ext_address", ext)?),
        None => IsotpAddress::new(id),
    })
}

/// `CAN_ISOTP_OPTS` settings; unset fields keep kernel defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IsotpOptionsConfig {
    /// Flag names, e.g. `["wait_tx_done", "half_duplex"]`
    #[serde(default)]
    pub flags: Vec<String>,
    /// Gap between transmitted frames in microseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_txtime_us: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_padding: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rx_padding: Option<u32>,
}

impl IsotpOptionsConfig {
    pub fn to_options(&self) -> Result<IsotpOptions, ValidationError> {
        let flags: IsotpFlags = parse_flags("flags", &self.flags)?;
        let mut opts = IsotpOptions::DEFAULT.with_flags(flags)?;
        if let Some(us) = self.frame_txtime_us {
            opts = opts.with_frame_txtime(Duration::from_micros(us))?;
        }
        if let Some(pad) = self.tx_padding {
            opts = opts.with_tx_padding(octet("tx_padding", pad)?);
        }
        if let Some(pad) = self.rx_padding {
            opts = opts.with_rx_padding(octet("rx_padding", pad)?);
        }
        Ok(opts)
    }
}

/// `CAN_ISOTP_RECV_FC` settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowControlConfig {
    #[serde(default)]
    pub block_size: u32,
    /// Raw STmin byte (0x00-0x7F ms, 0xF1-0xF9 100us steps)
    #[serde(default)]
    pub st_min: u32,
    #[serde(default)]
    pub wft_max: u32,
}

impl FlowControlConfig {
    pub fn to_options(&self) -> Result<IsotpFlowControlOptions, ValidationError> {
        IsotpFlowControlOptions::new(
            octet("block_size", self.block_size)?,
            octet("st_min", self.st_min)?,
            octet("wft_max", self.wft_max)?,
        )
    }
}

/// `CAN_ISOTP_LL_OPTS` settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkLayerConfig {
    #[serde(default = "default_mtu")]
    pub mtu: u32,
    #[serde(default = "default_tx_dl")]
    pub tx_dl: u32,
    /// CAN-FD flag names, e.g. `["brs"]`
    #[serde(default)]
    pub tx_flags: Vec<String>,
}

fn default_mtu() -> u32 {
    16
}

fn default_tx_dl() -> u32 {
    8
}

impl Default for LinkLayerConfig {
    fn default() -> Self {
        Self {
            mtu: default_mtu(),
            tx_dl: default_tx_dl(),
            tx_flags: Vec::new(),
        }
    }
}

impl LinkLayerConfig {
    pub fn to_options(&self) -> Result<IsotpLinkLayerOptions, ValidationError> {
        let flags: FdFlags = parse_flags("tx_flags", &self.tx_flags)?;
        IsotpLinkLayerOptions::new(octet("mtu", self.mtu)?, octet("tx_dl", self.tx_dl)?, flags)
    }
}

impl<S: NativeSocket> Channel<Isotp, S> {
    /// Apply pre-bind options, blocking mode and timeouts, then bind
    pub fn apply_config(&mut self, config: &IsotpChannelConfig) -> ChannelResult<()> {
        let local = config.local_address()?;
        let remote = config.remote_address()?;

        self.set_option(isotp::OPTS, config.options.to_options()?)?;
        if let Some(fc) = &config.flow_control {
            self.set_option(isotp::RECV_FC, fc.to_options()?)?;
        }
        if let Some(ll) = &config.link_layer {
            self.set_option(isotp::LL_OPTS, ll.to_options()?)?;
        }
        if let Some(stmin) = config.tx_stmin {
            self.set_option(isotp::TX_STMIN, stmin)?;
        }
        if let Some(stmin) = config.rx_stmin {
            self.set_option(isotp::RX_STMIN, stmin)?;
        }

        self.set_blocking(!config.nonblocking)?;
        self.set_read_timeout(timeout(config.read_timeout_ms))?;
        self.set_write_timeout(timeout(config.write_timeout_ms))?;
        self.bind(&config.interface, &local, &remote)
    }
}

#[cfg(target_os = "linux")]
impl Channel<Isotp, crate::native::OsSocket> {
    /// Open, configure and bind a kernel ISO-TP socket
    pub fn open_configured(config: &IsotpChannelConfig) -> ChannelResult<Self> {
        let mut channel = Self::open()?;
        channel.apply_config(config)?;
        Ok(channel)
    }
}

// =============================================================================
// Raw CAN
// =============================================================================

/// Raw CAN channel configuration. Unset options keep kernel defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCanChannelConfig {
    /// CAN interface name; "any" receives from every interface
    pub interface: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loopback: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recv_own_msgs: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fd_frames: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_filters: Option<bool>,
    /// Error class mask, e.g. "0x1FFFFFFF"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_mask: Option<String>,
    /// Receive filters; omitted means receive everything
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Vec<FilterConfig>>,
    #[serde(default)]
    pub nonblocking: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_timeout_ms: Option<u64>,
}

/// One receive filter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    pub id: String,
    /// Identifier mask; omitted means an exact match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<String>,
    #[serde(default)]
    pub inverted: bool,
}

impl FilterConfig {
    pub fn to_filter(&self) -> Result<CanFilter, ValidationError> {
        let id = parse_can_id(&self.id)?;
        let filter = match &self.mask {
            Some(mask) => CanFilter::masked(id, parse_u32("mask", mask)?),
            None => CanFilter::exact(id),
        };
        Ok(if self.inverted {
            filter.inverted()
        } else {
            filter
        })
    }
}

impl RawCanChannelConfig {
    pub fn to_filters(&self) -> Result<Option<Vec<CanFilter>>, ValidationError> {
        self.filters
            .as_ref()
            .map(|filters| {
                filters
                    .iter()
                    .map(FilterConfig::to_filter)
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()
    }

    pub fn to_error_mask(&self) -> Result<Option<u32>, ValidationError> {
        self.error_mask
            .as_deref()
            .map(|mask| check_error_mask(parse_u32("error_mask", mask)?))
            .transpose()
    }
}

impl<S: NativeSocket> Channel<RawCan, S> {
    /// Apply options, blocking mode and timeouts, then bind
    pub fn apply_config(&mut self, config: &RawCanChannelConfig) -> ChannelResult<()> {
        let filters = config.to_filters()?;
        let error_mask = config.to_error_mask()?;

        let switches = [
            (raw::LOOPBACK, config.loopback),
            (raw::RECV_OWN_MSGS, config.recv_own_msgs),
            (raw::FD_FRAMES, config.fd_frames),
            (raw::JOIN_FILTERS, config.join_filters),
        ];
        for (option, value) in switches {
            if let Some(value) = value {
                self.set_option(option, value)?;
            }
        }
        if let Some(filters) = filters {
            self.set_option(raw::FILTER, filters)?;
        }
        if let Some(mask) = error_mask {
            self.set_option(raw::ERR_FILTER, mask)?;
        }

        self.set_blocking(!config.nonblocking)?;
        self.set_read_timeout(timeout(config.read_timeout_ms))?;
        self.set_write_timeout(timeout(config.write_timeout_ms))?;
        if config.interface == "any" {
            self.bind_any()
        } else {
            self.bind(&config.interface)
        }
    }
}

#[cfg(target_os = "linux")]
impl Channel<RawCan, crate::native::OsSocket> {
    /// Open, configure and bind a kernel raw CAN socket
    pub fn open_configured(config: &RawCanChannelConfig) -> ChannelResult<Self> {
        let mut channel = Self::open()?;
        channel.apply_config(config)?;
        Ok(channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelState;
    use crate::error::ChannelError;
    use crate::native::MockBus;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    const ISOTP_TOML: &str = r#"
interface = "vcan0"
rx_id = "0x7E8"
tx_id = "0x7E0"
nonblocking = true
read_timeout_ms = 250

[options]
flags = ["wait_tx_done"]
tx_padding = 0xAA
rx_padding = 0xAA

[flow_control]
block_size = 1
st_min = 0xF5

[link_layer]
mtu = 72
tx_dl = 64
tx_flags = ["brs"]
"#;

    #[test]
    fn test_parse_can_id() {
        assert_eq!(parse_can_id("0x7E0").unwrap(), CanId::standard(0x7E0).unwrap());
        assert_eq!(
            parse_can_id("0X18DA00F1").unwrap(),
            CanId::extended(0x18DA_00F1).unwrap()
        );
        assert_eq!(parse_can_id(" 2015 ").unwrap(), CanId::standard(2015).unwrap());
        assert!(parse_can_id("0xZZ").is_err());
        assert!(parse_can_id("0x20000000").is_err());
    }

    #[test]
    fn test_isotp_config_conversion() {
        let config: IsotpChannelConfig = from_toml_str(ISOTP_TOML).unwrap();
        let opts = config.options.to_options().unwrap();
        assert_eq!(opts.tx_padding(), Some(0xAA));
        assert!(opts.flags().contains(IsotpFlags::WAIT_TX_DONE));

        let fc = config.flow_control.as_ref().unwrap().to_options().unwrap();
        assert_eq!(fc.block_size(), 1);
        assert_eq!(fc.st_min(), 0xF5);

        let ll = config.link_layer.as_ref().unwrap().to_options().unwrap();
        assert_eq!(ll, IsotpLinkLayerOptions::can_fd(64, FdFlags::BRS).unwrap());
    }

    #[test]
    fn test_out_of_range_values_name_the_field() {
        let mut config: IsotpChannelConfig = from_toml_str(ISOTP_TOML).unwrap();
        config.flow_control = Some(FlowControlConfig {
            block_size: 256,
            ..Default::default()
        });
        let err = config.flow_control.as_ref().unwrap().to_options().unwrap_err();
        assert_eq!(err.field, "block_size");

        config.options.flags = vec!["bogus".into()];
        let err = config.options.to_options().unwrap_err();
        assert_eq!(err.field, "flags");
        assert_eq!(err.value, "bogus");
    }

    #[test]
    fn test_apply_isotp_config() {
        let bus = MockBus::new();
        let config: IsotpChannelConfig = from_toml_str(ISOTP_TOML).unwrap();
        let mut channel = Channel::<Isotp, _>::from_socket(bus.isotp_socket());
        channel.apply_config(&config).unwrap();

        assert_eq!(channel.state(), ChannelState::Bound);
        assert!(!channel.is_blocking().unwrap());
        assert_eq!(channel.read_timeout().unwrap(), Some(Duration::from_millis(250)));
        assert_eq!(channel.get_option(isotp::RECV_FC).unwrap().st_min(), 0xF5);
        assert!(channel.get_option(isotp::LL_OPTS).unwrap().is_fd());
    }

    #[test]
    fn test_apply_isotp_config_with_extended_addressing() {
        let bus = MockBus::new();
        let mut config: IsotpChannelConfig = from_toml_str(ISOTP_TOML).unwrap();
        config.rx_ext_address = Some(0xF1);
        config.tx_ext_address = Some(0x10);
        let mut channel = Channel::<Isotp, _>::from_socket(bus.isotp_socket());
        channel.apply_config(&config).unwrap();

        let opts = channel.get_option(isotp::OPTS).unwrap();
        assert_eq!(opts.ext_address(), Some(0x10));
        assert_eq!(opts.rx_ext_address(), Some(0xF1));
        assert_eq!(opts.tx_padding(), Some(0xAA));

        config.tx_ext_address = None;
        let mut other = Channel::<Isotp, _>::from_socket(bus.isotp_socket());
        assert!(matches!(
            other.apply_config(&config),
            Err(ChannelError::Validation(_))
        ));
    }

    #[test]
    fn test_raw_config() {
        let toml = r#"
interface = "vcan0"
recv_own_msgs = true
error_mask = "0x1FFFFFFF"

[[filters]]
id = "0x7E8"

[[filters]]
id = "0x18DAF100"
mask = "0x1FFFFF00"
inverted = true
"#;
        let config: RawCanChannelConfig = from_toml_str(toml).unwrap();
        let filters = config.to_filters().unwrap().unwrap();
        assert_eq!(filters.len(), 2);
        assert!(filters[1].is_inverted());

        let bus = MockBus::new();
        let mut channel = Channel::<RawCan, _>::from_socket(bus.raw_socket());
        channel.apply_config(&config).unwrap();
        assert_eq!(channel.get_option(raw::FILTER).unwrap(), filters);
        assert!(channel.get_option(raw::RECV_OWN_MSGS).unwrap());
        assert_eq!(channel.get_option(raw::ERR_FILTER).unwrap(), 0x1FFF_FFFF);
        assert!(channel.is_blocking().unwrap());
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(ISOTP_TOML.as_bytes()).unwrap();

        let config: IsotpChannelConfig = load_config(file.path()).unwrap();
        assert_eq!(config.interface, "vcan0");
        assert_eq!(config.local_address().unwrap().id().as_u32(), 0x7E8);
        assert_eq!(config.remote_address().unwrap().id().as_u32(), 0x7E0);
    }

    #[test]
    fn test_load_config_errors() {
        let missing: Result<RawCanChannelConfig, _> = load_config("/nonexistent/cansock.toml");
        assert!(matches!(missing, Err(ConfigError::Io { .. })));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"interface = 5").unwrap();
        let bad: Result<RawCanChannelConfig, _> = load_config(file.path());
        assert!(matches!(bad, Err(ConfigError::Parse(_))));
    }
}
