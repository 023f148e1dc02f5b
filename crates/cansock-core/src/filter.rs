//! Raw socket receive filters (`CAN_RAW_FILTER`, `CAN_RAW_ERR_FILTER`)

use crate::abi::{CAN_EFF_FLAG, CAN_EFF_MASK, CAN_ERR_MASK, CAN_INV_FILTER, CAN_RTR_FLAG, CAN_SFF_MASK};
use crate::error::ValidationError;
use crate::id::CanId;

/// `struct can_filter`.
///
/// A frame matches when `received_id & mask == id & mask`; an inverted
/// filter matches everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CanFilter {
    pub(crate) id: u32,
    pub(crate) mask: u32,
}

impl CanFilter {
    /// Matches every frame
    pub const ALL: Self = Self { id: 0, mask: 0 };

    /// Match exactly `id` (frame format included, remote frames excluded)
    pub fn exact(id: CanId) -> Self {
        let id_mask = if id.is_extended() {
            CAN_EFF_MASK
        } else {
            CAN_SFF_MASK
        };
        Self {
            id: id.raw(),
            mask: id_mask | CAN_EFF_FLAG | CAN_RTR_FLAG,
        }
    }

    /// Match identifiers of `id`'s frame format under `mask`
    pub fn masked(id: CanId, mask: u32) -> Self {
        Self {
            id: id.raw(),
            mask: (mask & CAN_EFF_MASK) | CAN_EFF_FLAG,
        }
    }

    /// Filter from raw kernel values
    pub fn from_raw(id: u32, mask: u32) -> Self {
        Self { id, mask }
    }

    /// Match every frame this filter would not
    pub fn inverted(self) -> Self {
        Self {
            id: self.id ^ CAN_INV_FILTER,
            ..self
        }
    }

    pub fn is_inverted(&self) -> bool {
        self.id & CAN_INV_FILTER != 0
    }

    pub fn raw_id(&self) -> u32 {
        self.id
    }

    pub fn mask(&self) -> u32 {
        self.mask
    }

    /// Whether a frame with raw identifier `can_id` passes this filter
    pub fn matches(&self, can_id: u32) -> bool {
        let hit = (can_id & self.mask) == (self.id & !CAN_INV_FILTER & self.mask);
        hit != self.is_inverted()
    }
}

/// Validate an error frame class mask (`CAN_ERR_*` bits only)
pub fn check_error_mask(mask: u32) -> Result<u32, ValidationError> {
    if mask & !CAN_ERR_MASK != 0 {
        return Err(ValidationError::new(
            "error_mask",
            format!("0x{:08X}", mask),
            "bits within 0x1FFFFFFF",
        ));
    }
    Ok(mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_filter() {
        let filter = CanFilter::exact(CanId::standard(0x7E8).unwrap());
        assert!(filter.matches(0x7E8));
        assert!(!filter.matches(0x7E9));
        assert!(!filter.matches(0x7E8 | CAN_EFF_FLAG));
        assert!(!filter.matches(0x7E8 | CAN_RTR_FLAG));
    }

    #[test]
    fn test_masked_and_inverted() {
        let filter = CanFilter::masked(CanId::extended(0x18DA_F100).unwrap(), 0x1FFF_FF00);
        assert!(filter.matches(0x18DA_F110 | CAN_EFF_FLAG));
        assert!(!filter.matches(0x18DB_F110 | CAN_EFF_FLAG));

        let inverted = filter.inverted();
        assert!(inverted.is_inverted());
        assert!(!inverted.matches(0x18DA_F110 | CAN_EFF_FLAG));
        assert!(inverted.matches(0x18DB_F110 | CAN_EFF_FLAG));
        assert_eq!(inverted.inverted(), filter);
    }

    #[test]
    fn test_match_all() {
        assert!(CanFilter::ALL.matches(0x123));
        assert!(CanFilter::ALL.matches(0x1234_5678 | CAN_EFF_FLAG));
    }

    #[test]
    fn test_error_mask_range() {
        assert_eq!(check_error_mask(0x1FFF_FFFF), Ok(0x1FFF_FFFF));
        assert!(check_error_mask(0x2000_0000).is_err());
    }
}
