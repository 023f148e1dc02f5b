//! General ISO-TP socket options (`CAN_ISOTP_OPTS`)

use std::time::Duration;

use bitflags::bitflags;

use crate::abi::isotp::{
    DEFAULT_EXT_ADDRESS, DEFAULT_FRAME_TXTIME, DEFAULT_PAD_CONTENT, FRAME_TXTIME_ZERO,
};
use crate::error::ValidationError;

bitflags! {
    /// `can_isotp_options.flags`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct IsotpFlags: u32 {
        /// Listen only, do not send flow control frames
        const LISTEN_MODE = 0x0001;
        /// Enable extended addressing
        const EXTEND_ADDR = 0x0002;
        /// Pad transmitted frames to the full data length
        const TX_PADDING = 0x0004;
        /// Expect received frames to be padded
        const RX_PADDING = 0x0008;
        /// Check the length of received padding
        const CHK_PAD_LEN = 0x0010;
        /// Check the content of received padding
        const CHK_PAD_DATA = 0x0020;
        /// Half duplex error state handling
        const HALF_DUPLEX = 0x0040;
        /// Ignore STmin from received flow control frames
        const FORCE_TXSTMIN = 0x0080;
        /// Ignore consecutive frames arriving faster than RX STmin
        const FORCE_RXSTMIN = 0x0100;
        /// Use a separate extended address for reception
        const RX_EXT_ADDR = 0x0200;
        /// Block `write` until the transfer has completed
        const WAIT_TX_DONE = 0x0400;
        /// 1-to-N functional addressing, single frames only
        const SF_BROADCAST = 0x0800;
        /// 1-to-N transmission without flow control
        const CF_BROADCAST = 0x1000;
        /// Apply flow control parameter changes at runtime
        const DYN_FC_PARMS = 0x2000;
    }
}

/// Immutable view of `struct can_isotp_options`.
///
/// The padding content and extended address bytes are always carried, but
/// only take effect while the matching flag is set; the accessors returning
/// `Option` reflect that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IsotpOptions {
    pub(crate) flags: IsotpFlags,
    pub(crate) frame_txtime: u32,
    pub(crate) ext_address: u8,
    pub(crate) tx_pad_content: u8,
    pub(crate) rx_pad_content: u8,
    pub(crate) rx_ext_address: u8,
}

impl IsotpOptions {
    /// Kernel defaults of a freshly created ISO-TP socket
    pub const DEFAULT: Self = Self {
        flags: IsotpFlags::empty(),
        frame_txtime: DEFAULT_FRAME_TXTIME,
        ext_address: DEFAULT_EXT_ADDRESS,
        tx_pad_content: DEFAULT_PAD_CONTENT,
        rx_pad_content: DEFAULT_PAD_CONTENT,
        rx_ext_address: DEFAULT_EXT_ADDRESS,
    };

    pub fn flags(&self) -> IsotpFlags {
        self.flags
    }

    /// Gap between transmitted frames.
    ///
    /// `None` means the raw value is zero, which tells the kernel to keep
    /// its current setting.
    pub fn frame_txtime(&self) -> Option<Duration> {
        match self.frame_txtime {
            0 => None,
            FRAME_TXTIME_ZERO => Some(Duration::ZERO),
            nanos => Some(Duration::from_nanos(u64::from(nanos))),
        }
    }

    pub fn frame_txtime_raw(&self) -> u32 {
        self.frame_txtime
    }

    /// Extended address used for transmission (and reception, unless a
    /// separate RX address is configured)
    pub fn ext_address(&self) -> Option<u8> {
        self.flags
            .contains(IsotpFlags::EXTEND_ADDR)
            .then_some(self.ext_address)
    }

    pub fn rx_ext_address(&self) -> Option<u8> {
        self.flags
            .contains(IsotpFlags::RX_EXT_ADDR)
            .then_some(self.rx_ext_address)
    }

    pub fn tx_padding(&self) -> Option<u8> {
        self.flags
            .contains(IsotpFlags::TX_PADDING)
            .then_some(self.tx_pad_content)
    }

    pub fn rx_padding(&self) -> Option<u8> {
        self.flags
            .contains(IsotpFlags::RX_PADDING)
            .then_some(self.rx_pad_content)
    }

    /// Replace the whole flag set
    pub fn with_flags(self, flags: IsotpFlags) -> Result<Self, ValidationError> {
        check_flags(flags)?;
        Ok(Self { flags, ..self })
    }

    /// Add flags to the current set
    pub fn with_flag(self, flag: IsotpFlags) -> Result<Self, ValidationError> {
        self.with_flags(self.flags | flag)
    }

    /// Remove flags from the current set
    pub fn without_flag(self, flag: IsotpFlags) -> Result<Self, ValidationError> {
        self.with_flags(self.flags - flag)
    }

    /// Set the gap between transmitted frames. `Duration::ZERO` requests
    /// back-to-back transmission.
    pub fn with_frame_txtime(self, txtime: Duration) -> Result<Self, ValidationError> {
        let nanos = txtime.as_nanos();
        if nanos >= u128::from(FRAME_TXTIME_ZERO) {
            return Err(ValidationError::new(
                "frame_txtime",
                format!("{}ns", nanos),
                "0..=4294967294 ns",
            ));
        }
        let frame_txtime = if nanos == 0 {
            FRAME_TXTIME_ZERO
        } else {
            nanos as u32
        };
        Ok(Self {
            frame_txtime,
            ..self
        })
    }

    /// Enable extended addressing with `address` as the TX (and default RX)
    /// address byte
    pub fn with_extended_address(self, address: u8) -> Self {
        Self {
            flags: self.flags | IsotpFlags::EXTEND_ADDR,
            ext_address: address,
            ..self
        }
    }

    /// Use a separate extended address byte for reception
    pub fn with_rx_extended_address(self, address: u8) -> Result<Self, ValidationError> {
        if !self.flags.contains(IsotpFlags::EXTEND_ADDR) {
            return Err(ValidationError::new(
                "rx_ext_address",
                format!("0x{:02X}", address),
                "only with extended addressing enabled",
            ));
        }
        Ok(Self {
            flags: self.flags | IsotpFlags::RX_EXT_ADDR,
            rx_ext_address: address,
            ..self
        })
    }

    /// Disable extended addressing and reset both address bytes
    pub fn without_extended_address(self) -> Self {
        Self {
            flags: self.flags - (IsotpFlags::EXTEND_ADDR | IsotpFlags::RX_EXT_ADDR),
            ext_address: DEFAULT_EXT_ADDRESS,
            rx_ext_address: DEFAULT_EXT_ADDRESS,
            ..self
        }
    }

    pub fn with_tx_padding(self, content: u8) -> Self {
        Self {
            flags: self.flags | IsotpFlags::TX_PADDING,
            tx_pad_content: content,
            ..self
        }
    }

    pub fn with_rx_padding(self, content: u8) -> Self {
        Self {
            flags: self.flags | IsotpFlags::RX_PADDING,
            rx_pad_content: content,
            ..self
        }
    }

    /// Pad frames in both directions with `content`
    pub fn with_padding(self, content: u8) -> Self {
        self.with_tx_padding(content).with_rx_padding(content)
    }

    /// Disable padding in both directions; padding checks go with it
    pub fn without_padding(self) -> Self {
        Self {
            flags: self.flags
                - (IsotpFlags::TX_PADDING
                    | IsotpFlags::RX_PADDING
                    | IsotpFlags::CHK_PAD_LEN
                    | IsotpFlags::CHK_PAD_DATA),
            tx_pad_content: DEFAULT_PAD_CONTENT,
            rx_pad_content: DEFAULT_PAD_CONTENT,
            ..self
        }
    }
}

impl Default for IsotpOptions {
    fn default() -> Self {
        Self::DEFAULT
    }
}

fn check_flags(flags: IsotpFlags) -> Result<(), ValidationError> {
    if flags.contains(IsotpFlags::RX_EXT_ADDR) && !flags.contains(IsotpFlags::EXTEND_ADDR) {
        return Err(ValidationError::new(
            "flags",
            format!("0x{:04X}", flags.bits()),
            "RX_EXT_ADDR requires EXTEND_ADDR",
        ));
    }
    if flags.contains(IsotpFlags::SF_BROADCAST | IsotpFlags::CF_BROADCAST) {
        return Err(ValidationError::new(
            "flags",
            format!("0x{:04X}", flags.bits()),
            "at most one of SF_BROADCAST and CF_BROADCAST",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_matches_kernel() {
        let opts = IsotpOptions::DEFAULT;
        assert_eq!(opts.flags(), IsotpFlags::empty());
        assert_eq!(opts.frame_txtime(), Some(Duration::from_micros(50)));
        assert_eq!(opts.ext_address(), None);
        assert_eq!(opts.tx_padding(), None);
        assert_eq!(opts.rx_padding(), None);
    }

    #[test]
    fn test_with_padding_sets_both_directions() {
        let opts = IsotpOptions::DEFAULT.with_padding(0xAA);
        assert_eq!(opts.tx_padding(), Some(0xAA));
        assert_eq!(opts.rx_padding(), Some(0xAA));
        assert!(opts
            .flags()
            .contains(IsotpFlags::TX_PADDING | IsotpFlags::RX_PADDING));
        assert_ne!(opts, IsotpOptions::DEFAULT);
        assert_eq!(opts.without_padding(), IsotpOptions::DEFAULT);
    }

    #[test]
    fn test_rx_ext_address_requires_extended_addressing() {
        let err = IsotpOptions::DEFAULT
            .with_rx_extended_address(0x10)
            .unwrap_err();
        assert_eq!(err.field, "rx_ext_address");

        let opts = IsotpOptions::DEFAULT
            .with_extended_address(0x20)
            .with_rx_extended_address(0x10)
            .unwrap();
        assert_eq!(opts.ext_address(), Some(0x20));
        assert_eq!(opts.rx_ext_address(), Some(0x10));
        assert_eq!(opts.without_extended_address(), IsotpOptions::DEFAULT);
    }

    #[test]
    fn test_with_flags_rejects_inconsistent_sets() {
        assert!(IsotpOptions::DEFAULT
            .with_flags(IsotpFlags::RX_EXT_ADDR)
            .is_err());
        assert!(IsotpOptions::DEFAULT
            .with_flags(IsotpFlags::SF_BROADCAST | IsotpFlags::CF_BROADCAST)
            .is_err());
        let opts = IsotpOptions::DEFAULT
            .with_flag(IsotpFlags::LISTEN_MODE)
            .unwrap();
        assert_eq!(opts.flags(), IsotpFlags::LISTEN_MODE);
        assert_eq!(
            opts.without_flag(IsotpFlags::LISTEN_MODE).unwrap(),
            IsotpOptions::DEFAULT
        );
    }

    #[test]
    fn test_frame_txtime_zero_uses_sentinel() {
        let opts = IsotpOptions::DEFAULT
            .with_frame_txtime(Duration::ZERO)
            .unwrap();
        assert_eq!(opts.frame_txtime_raw(), FRAME_TXTIME_ZERO);
        assert_eq!(opts.frame_txtime(), Some(Duration::ZERO));

        let err = IsotpOptions::DEFAULT
            .with_frame_txtime(Duration::from_secs(5))
            .unwrap_err();
        assert_eq!(err.field, "frame_txtime");
    }
}
