//! ISO-TP option value objects
//!
//! All option types are immutable. `with_*` operations validate the new
//! field and return a replacement value; `DEFAULT` constants hold the
//! configuration of a freshly created kernel socket.

mod flow_control;
mod isotp;
mod link_layer;

pub use flow_control::{duration_to_st_min, st_min_to_duration, IsotpFlowControlOptions};
pub use isotp::{IsotpFlags, IsotpOptions};
pub use link_layer::IsotpLinkLayerOptions;

use crate::error::ValidationError;

/// Validate a forced TX/RX STmin value (`CAN_ISOTP_TX_STMIN`,
/// `CAN_ISOTP_RX_STMIN`). The value is handed to the kernel verbatim.
pub fn check_forced_st_min(field: &'static str, value: i32) -> Result<i32, ValidationError> {
    if value < 0 {
        return Err(ValidationError::new(field, value, "0..=2147483647"));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forced_st_min_rejects_negative() {
        assert_eq!(check_forced_st_min("tx_stmin", 100), Ok(100));
        let err = check_forced_st_min("rx_stmin", -1).unwrap_err();
        assert_eq!(err.field, "rx_stmin");
    }
}
