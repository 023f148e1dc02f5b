//! Link-layer options (`CAN_ISOTP_LL_OPTS`)

use crate::abi::{CANFD_MTU, CAN_MAX_DLEN, CAN_MTU};
use crate::error::ValidationError;
use crate::frame::FdFlags;

/// TX data lengths the kernel accepts for CAN-FD
const FD_TX_DL: [u8; 8] = [8, 12, 16, 20, 24, 32, 48, 64];

/// Immutable view of `struct can_isotp_ll_options`.
///
/// A classic CAN link (`mtu == 16`) carries at most 8 data bytes per frame
/// and no FD flags; a CAN-FD link (`mtu == 72`) may use any FD data length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IsotpLinkLayerOptions {
    pub(crate) mtu: u8,
    pub(crate) tx_dl: u8,
    pub(crate) tx_flags: FdFlags,
}

impl IsotpLinkLayerOptions {
    /// Kernel defaults: classic CAN with 8-byte frames
    pub const DEFAULT: Self = Self {
        mtu: CAN_MTU,
        tx_dl: CAN_MAX_DLEN,
        tx_flags: FdFlags::empty(),
    };

    pub fn new(mtu: u8, tx_dl: u8, tx_flags: FdFlags) -> Result<Self, ValidationError> {
        check(mtu, tx_dl, tx_flags)?;
        Ok(Self {
            mtu,
            tx_dl,
            tx_flags,
        })
    }

    /// CAN-FD link with the given frame data length and flags
    pub fn can_fd(tx_dl: u8, tx_flags: FdFlags) -> Result<Self, ValidationError> {
        Self::new(CANFD_MTU, tx_dl, tx_flags)
    }

    pub fn mtu(&self) -> u8 {
        self.mtu
    }

    pub fn tx_dl(&self) -> u8 {
        self.tx_dl
    }

    pub fn tx_flags(&self) -> FdFlags {
        self.tx_flags
    }

    pub fn is_fd(&self) -> bool {
        self.mtu == CANFD_MTU
    }

    pub fn with_mtu(self, mtu: u8) -> Result<Self, ValidationError> {
        Self::new(mtu, self.tx_dl, self.tx_flags)
    }

    pub fn with_tx_dl(self, tx_dl: u8) -> Result<Self, ValidationError> {
        Self::new(self.mtu, tx_dl, self.tx_flags)
    }

    pub fn with_tx_flags(self, tx_flags: FdFlags) -> Result<Self, ValidationError> {
        Self::new(self.mtu, self.tx_dl, tx_flags)
    }
}

impl Default for IsotpLinkLayerOptions {
    fn default() -> Self {
        Self::DEFAULT
    }
}

fn check(mtu: u8, tx_dl: u8, tx_flags: FdFlags) -> Result<(), ValidationError> {
    if mtu != CAN_MTU && mtu != CANFD_MTU {
        return Err(ValidationError::new(
            "mtu",
            mtu,
            "16 (classic CAN) or 72 (CAN-FD)",
        ));
    }
    if !FD_TX_DL.contains(&tx_dl) {
        return Err(ValidationError::new(
            "tx_dl",
            tx_dl,
            "8, 12, 16, 20, 24, 32, 48 or 64",
        ));
    }
    if mtu == CAN_MTU && tx_dl > CAN_MAX_DLEN {
        return Err(ValidationError::new(
            "tx_dl",
            tx_dl,
            "8 on a classic CAN link (mtu 16)",
        ));
    }
    if mtu == CAN_MTU && !tx_flags.is_empty() {
        return Err(ValidationError::new(
            "tx_flags",
            format!("0x{:02X}", tx_flags.bits()),
            "no flags on a classic CAN link (mtu 16)",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_default_is_classic_can() {
        let ll = IsotpLinkLayerOptions::DEFAULT;
        assert_eq!((ll.mtu(), ll.tx_dl()), (16, 8));
        assert!(ll.tx_flags().is_empty());
        assert!(!ll.is_fd());
    }

    #[test]
    fn test_fd_with_bit_rate_switch() {
        let ll = IsotpLinkLayerOptions::DEFAULT
            .with_mtu(CANFD_MTU)
            .and_then(|ll| ll.with_tx_flags(FdFlags::BRS))
            .unwrap();
        assert!(ll.is_fd());
        assert_eq!(ll.tx_flags(), FdFlags::BRS);
        assert_eq!(ll, IsotpLinkLayerOptions::can_fd(8, FdFlags::BRS).unwrap());
    }

    #[rstest]
    #[case(16, 8, FdFlags::BRS, "tx_flags")]
    #[case(16, 64, FdFlags::empty(), "tx_dl")]
    #[case(72, 9, FdFlags::empty(), "tx_dl")]
    #[case(72, 65, FdFlags::empty(), "tx_dl")]
    #[case(64, 8, FdFlags::empty(), "mtu")]
    fn test_inconsistent_link_layer_rejected(
        #[case] mtu: u8,
        #[case] tx_dl: u8,
        #[case] flags: FdFlags,
        #[case] field: &str,
    ) {
        let err = IsotpLinkLayerOptions::new(mtu, tx_dl, flags).unwrap_err();
        assert_eq!(err.field, field);
    }

    #[test]
    fn test_cannot_downgrade_fd_link_with_long_frames() {
        let fd = IsotpLinkLayerOptions::can_fd(64, FdFlags::empty()).unwrap();
        assert!(fd.with_mtu(CAN_MTU).is_err());
    }
}
