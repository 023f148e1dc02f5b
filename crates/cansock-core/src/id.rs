//! CAN identifiers

use std::fmt;

use crate::abi::{CAN_EFF_FLAG, CAN_EFF_MASK, CAN_SFF_MASK};
use crate::error::ValidationError;

/// An 11-bit standard or 29-bit extended CAN identifier.
///
/// Only the validating constructors and [`CanId::from_raw`] build one, so
/// the identifier always fits its format and never overlaps the RTR/ERR
/// flag bits of the kernel `canid_t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanId {
    /// Identifier bits plus `CAN_EFF_FLAG` for the extended format
    raw: u32,
}

impl CanId {
    /// Standard (11-bit) identifier, `0..=0x7FF`
    pub fn standard(id: u16) -> Result<Self, ValidationError> {
        if u32::from(id) > CAN_SFF_MASK {
            return Err(ValidationError::new(
                "can_id",
                format!("0x{:X}", id),
                "0x000..=0x7FF for standard frames",
            ));
        }
        Ok(Self { raw: u32::from(id) })
    }

    /// Extended (29-bit) identifier, `0..=0x1FFFFFFF`
    pub fn extended(id: u32) -> Result<Self, ValidationError> {
        if id > CAN_EFF_MASK {
            return Err(ValidationError::new(
                "can_id",
                format!("0x{:X}", id),
                "0x00000000..=0x1FFFFFFF for extended frames",
            ));
        }
        Ok(Self {
            raw: id | CAN_EFF_FLAG,
        })
    }

    /// Pick the standard format when the identifier fits 11 bits,
    /// the extended format otherwise.
    pub fn new(id: u32) -> Result<Self, ValidationError> {
        if id <= CAN_SFF_MASK {
            Ok(Self { raw: id })
        } else {
            Self::extended(id)
        }
    }

    /// Decode a kernel `canid_t`. Flag bits other than EFF are dropped.
    pub fn from_raw(raw: u32) -> Self {
        let raw = if raw & CAN_EFF_FLAG != 0 {
            raw & (CAN_EFF_MASK | CAN_EFF_FLAG)
        } else {
            raw & CAN_SFF_MASK
        };
        Self { raw }
    }

    /// Encode as a kernel `canid_t` (identifier plus EFF flag)
    pub fn raw(self) -> u32 {
        self.raw
    }

    /// The bare identifier without flag bits
    pub fn as_u32(self) -> u32 {
        self.raw & CAN_EFF_MASK
    }

    pub fn is_extended(self) -> bool {
        self.raw & CAN_EFF_FLAG != 0
    }
}

impl fmt::Display for CanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_extended() {
            write!(f, "0x{:08X}", self.as_u32())
        } else {
            write!(f, "0x{:03X}", self.as_u32())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{CAN_ERR_FLAG, CAN_RTR_FLAG};
    use rstest::rstest;

    #[test]
    fn test_standard_range() {
        let id = CanId::standard(0x7DF).unwrap();
        assert_eq!(id.as_u32(), 0x7DF);
        assert!(!id.is_extended());
        let err = CanId::standard(0x800).unwrap_err();
        assert_eq!(err.field, "can_id");
        assert_eq!(err.value, "0x800");
    }

    #[test]
    fn test_extended_range() {
        assert!(CanId::extended(0x1FFF_FFFF).unwrap().is_extended());
        assert!(CanId::extended(0x2000_0000).is_err());
        assert!(CanId::extended(0x7FFF_FFFF).is_err());
    }

    #[test]
    fn test_new_picks_narrowest_format() {
        assert_eq!(CanId::new(0x7E0).unwrap(), CanId::standard(0x7E0).unwrap());
        assert_eq!(
            CanId::new(0x18DA_F110).unwrap(),
            CanId::extended(0x18DA_F110).unwrap()
        );
        assert!(CanId::new(0xFFFF_FFFF).is_err());
    }

    #[test]
    fn test_raw_sets_eff_flag_only_for_extended() {
        assert_eq!(CanId::standard(0x7DF).unwrap().raw(), 0x7DF);
        assert_eq!(CanId::extended(0x7DF).unwrap().raw(), 0x8000_07DF);
        assert_eq!(CanId::from_raw(0x8000_07DF), CanId::extended(0x7DF).unwrap());
        assert_eq!(CanId::from_raw(0x4000_07DF), CanId::standard(0x7DF).unwrap());
    }

    #[rstest]
    #[case(0x0000_07FF)]
    #[case(0x0000_FFFF)]
    #[case(0x4000_07FF)]
    #[case(0x6000_0123)]
    #[case(0xFFFF_FFFF)]
    #[case(0xE000_0000)]
    #[case(0x7FFF_FFFF)]
    fn test_identifier_never_carries_rtr_or_err_bits(#[case] raw: u32) {
        let id = CanId::from_raw(raw);
        assert_eq!(id.raw() & (CAN_RTR_FLAG | CAN_ERR_FLAG), 0);
        let limit = if id.is_extended() {
            CAN_EFF_MASK
        } else {
            CAN_SFF_MASK
        };
        assert!(id.as_u32() <= limit, "{id} exceeds its format");
    }

    #[rstest]
    #[case(0x800)]
    #[case(0xFFFF)]
    fn test_out_of_range_standard_never_built(#[case] id: u16) {
        assert!(CanId::standard(id).is_err());
    }

    #[rstest]
    #[case(0x2000_0000)]
    #[case(0x7FFF_FFFF)]
    #[case(0xFFFF_FFFF)]
    fn test_out_of_range_extended_never_built(#[case] id: u32) {
        assert!(CanId::extended(id).is_err());
        assert!(CanId::new(id).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(CanId::standard(0x7E0).unwrap().to_string(), "0x7E0");
        assert_eq!(
            CanId::extended(0x18DB_33F1).unwrap().to_string(),
            "0x18DB33F1"
        );
    }
}
