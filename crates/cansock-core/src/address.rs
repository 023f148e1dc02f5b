//! Socket addresses for raw CAN and ISO-TP bindings
//!
//! Interface names are resolved to indices by the OS at bind time; the
//! types here only carry the resolved index. Identifier ranges and
//! extended-addressing consistency are checked when values are built.

use std::fmt;

use crate::error::ValidationError;
use crate::id::CanId;
use crate::options::IsotpOptions;

/// One endpoint of an ISO-TP connection: a CAN identifier and, with
/// extended addressing, the address byte carried in the first payload byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IsotpAddress {
    id: CanId,
    ext_address: Option<u8>,
}

impl IsotpAddress {
    /// Normal addressing
    pub fn new(id: CanId) -> Self {
        Self {
            id,
            ext_address: None,
        }
    }

    /// Normal addressing from a numeric identifier; identifiers above
    /// `0x7FF` use the extended frame format.
    pub fn from_id(id: u32) -> Result<Self, ValidationError> {
        Ok(Self::new(CanId::new(id)?))
    }

    /// Extended addressing with `ext_address` as the address byte
    pub fn extended(id: CanId, ext_address: u8) -> Self {
        Self {
            id,
            ext_address: Some(ext_address),
        }
    }

    pub fn id(&self) -> CanId {
        self.id
    }

    pub fn ext_address(&self) -> Option<u8> {
        self.ext_address
    }

    pub fn uses_extended_addressing(&self) -> bool {
        self.ext_address.is_some()
    }
}

impl fmt::Display for IsotpAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ext_address {
            Some(ext) => write!(f, "{}/0x{:02X}", self.id, ext),
            None => write!(f, "{}", self.id),
        }
    }
}

/// Extended address bytes of a local/remote pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtendedAddressing {
    /// Address byte placed in transmitted frames (the remote endpoint)
    pub tx: u8,
    /// Address byte expected in received frames (the local endpoint)
    pub rx: u8,
}

impl ExtendedAddressing {
    /// Addressing mode of a pair. Both endpoints must agree.
    pub fn of_pair(
        local: &IsotpAddress,
        remote: &IsotpAddress,
    ) -> Result<Option<Self>, ValidationError> {
        match (local.ext_address, remote.ext_address) {
            (Some(rx), Some(tx)) => Ok(Some(Self { tx, rx })),
            (None, None) => Ok(None),
            _ => Err(ValidationError::new(
                "ext_address",
                format!("local {}, remote {}", local, remote),
                "extended address on both endpoints or on neither",
            )),
        }
    }

    /// Merge the address bytes into socket options
    pub fn apply(self, opts: IsotpOptions) -> IsotpOptions {
        let opts = opts.without_extended_address().with_extended_address(self.tx);
        if self.rx == self.tx {
            return opts;
        }
        // EXTEND_ADDR was just set, so this cannot fail
        opts.with_rx_extended_address(self.rx).unwrap_or(opts)
    }
}

/// Raw CAN binding (`sockaddr_can` without transport addresses)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawCanAddress {
    pub(crate) ifindex: u32,
}

impl RawCanAddress {
    pub fn new(ifindex: u32) -> Self {
        Self { ifindex }
    }

    /// Receive from every CAN interface
    pub fn any() -> Self {
        Self { ifindex: 0 }
    }

    pub fn ifindex(&self) -> u32 {
        self.ifindex
    }
}

/// ISO-TP binding (`sockaddr_can.can_addr.tp`).
///
/// The kernel receives on `rx_id` and transmits to `tx_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IsotpSocketAddress {
    pub(crate) ifindex: u32,
    pub(crate) rx_id: CanId,
    pub(crate) tx_id: CanId,
}

impl IsotpSocketAddress {
    pub fn new(ifindex: u32, rx_id: CanId, tx_id: CanId) -> Self {
        Self {
            ifindex,
            rx_id,
            tx_id,
        }
    }

    /// Address for a local/remote endpoint pair, validating that both use
    /// the same addressing mode
    pub fn for_pair(
        ifindex: u32,
        local: &IsotpAddress,
        remote: &IsotpAddress,
    ) -> Result<Self, ValidationError> {
        ExtendedAddressing::of_pair(local, remote)?;
        Ok(Self::new(ifindex, local.id, remote.id))
    }

    pub fn ifindex(&self) -> u32 {
        self.ifindex
    }

    pub fn rx_id(&self) -> CanId {
        self.rx_id
    }

    pub fn tx_id(&self) -> CanId {
        self.tx_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::IsotpFlags;

    #[test]
    fn test_from_id_validates_range() {
        assert_eq!(
            IsotpAddress::from_id(0x7DF).unwrap().id(),
            CanId::standard(0x7DF).unwrap()
        );
        assert!(IsotpAddress::from_id(0x2000_0000).is_err());
    }

    #[test]
    fn test_pair_must_agree_on_addressing_mode() {
        let normal = IsotpAddress::new(CanId::standard(0x7E0).unwrap());
        let extended = IsotpAddress::extended(CanId::standard(0x7E8).unwrap(), 0xF1);
        let err = ExtendedAddressing::of_pair(&normal, &extended).unwrap_err();
        assert_eq!(err.field, "ext_address");
        assert!(IsotpSocketAddress::for_pair(1, &extended, &normal).is_err());
        assert_eq!(ExtendedAddressing::of_pair(&normal, &normal), Ok(None));
    }

    #[test]
    fn test_for_pair_maps_local_to_rx() {
        let local = IsotpAddress::from_id(0x7DF).unwrap();
        let remote = IsotpAddress::from_id(0x7E0).unwrap();
        let addr = IsotpSocketAddress::for_pair(3, &local, &remote).unwrap();
        assert_eq!(addr.ifindex(), 3);
        assert_eq!(addr.rx_id(), CanId::standard(0x7DF).unwrap());
        assert_eq!(addr.tx_id(), CanId::standard(0x7E0).unwrap());
    }

    #[test]
    fn test_apply_extended_addressing() {
        let same = ExtendedAddressing { tx: 0x10, rx: 0x10 }.apply(IsotpOptions::DEFAULT);
        assert_eq!(same.ext_address(), Some(0x10));
        assert_eq!(same.rx_ext_address(), None);

        let split = ExtendedAddressing { tx: 0x10, rx: 0x20 }.apply(same);
        assert_eq!(split.ext_address(), Some(0x10));
        assert_eq!(split.rx_ext_address(), Some(0x20));
        assert!(split
            .flags()
            .contains(IsotpFlags::EXTEND_ADDR | IsotpFlags::RX_EXT_ADDR));
    }

    #[test]
    fn test_display() {
        let addr = IsotpAddress::extended(CanId::standard(0x7E0).unwrap(), 0xF1);
        assert_eq!(addr.to_string(), "0x7E0/0xF1");
    }
}
