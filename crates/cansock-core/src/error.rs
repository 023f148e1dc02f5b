//! Validation and marshalling errors

use std::fmt::Display;

use thiserror::Error;

/// A caller-supplied value lies outside the range accepted by the kernel.
///
/// Raised by value-object constructors and `with_*` operations before any
/// native call is made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid {field}: {value} (allowed: {allowed})")]
pub struct ValidationError {
    /// Name of the offending field
    pub field: &'static str,
    /// The rejected value, formatted for diagnostics
    pub value: String,
    /// Human-readable description of the accepted range
    pub allowed: &'static str,
}

impl ValidationError {
    pub fn new(field: &'static str, value: impl Display, allowed: &'static str) -> Self {
        Self {
            field,
            value: value.to_string(),
            allowed,
        }
    }
}

/// A byte sequence does not match the fixed layout of a kernel structure.
///
/// Indicates an ABI mismatch or a short `getsockopt` read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarshalError {
    #[error("Malformed {structure}: expected {expected} bytes, got {actual}")]
    Length {
        structure: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Malformed {structure} array: {actual} bytes is not a multiple of {element}")]
    ArrayLength {
        structure: &'static str,
        element: usize,
        actual: usize,
    },
}

/// Narrow a configuration integer to a single octet.
pub fn octet(field: &'static str, value: u32) -> Result<u8, ValidationError> {
    u8::try_from(value).map_err(|_| ValidationError::new(field, value, "0..=255"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_names_field_and_range() {
        let err = ValidationError::new("block_size", 300, "0..=255");
        assert_eq!(err.to_string(), "Invalid block_size: 300 (allowed: 0..=255)");
    }

    #[test]
    fn test_octet_bounds() {
        assert_eq!(octet("wft_max", 255), Ok(255));
        let err = octet("wft_max", 256).unwrap_err();
        assert_eq!(err.field, "wft_max");
        assert_eq!(err.value, "256");
    }
}
