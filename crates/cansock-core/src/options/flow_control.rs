//! Receive-side flow control options (`CAN_ISOTP_RECV_FC`)

use std::time::Duration;

use crate::abi::isotp::{DEFAULT_RECV_BS, DEFAULT_RECV_STMIN, DEFAULT_RECV_WFTMAX};
use crate::error::ValidationError;

const STMIN_ALLOWED: &str = "0x00..=0x7F (ms) or 0xF1..=0xF9 (100us steps)";

/// Immutable view of `struct can_isotp_fc_options`.
///
/// The STmin byte is kept in its ISO 15765-2 encoding: `0x00..=0x7F` are
/// milliseconds, `0xF1..=0xF9` are 100..900 microseconds. Values decoded from
/// the kernel are preserved bit-for-bit, even reserved ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IsotpFlowControlOptions {
    pub(crate) block_size: u8,
    pub(crate) st_min: u8,
    pub(crate) wft_max: u8,
}

impl IsotpFlowControlOptions {
    /// Kernel defaults: unlimited block size, no separation time, no wait frames
    pub const DEFAULT: Self = Self {
        block_size: DEFAULT_RECV_BS,
        st_min: DEFAULT_RECV_STMIN,
        wft_max: DEFAULT_RECV_WFTMAX,
    };

    pub fn new(block_size: u8, st_min: u8, wft_max: u8) -> Result<Self, ValidationError> {
        Self::DEFAULT
            .with_block_size(block_size)
            .with_wft_max(wft_max)
            .with_st_min(st_min)
    }

    /// Frames per block before the sender waits for flow control (0 = unlimited)
    pub fn block_size(&self) -> u8 {
        self.block_size
    }

    /// Raw STmin byte
    pub fn st_min(&self) -> u8 {
        self.st_min
    }

    /// STmin as a duration, `None` for reserved encodings
    pub fn st_min_duration(&self) -> Option<Duration> {
        st_min_to_duration(self.st_min)
    }

    /// Maximum number of wait frames (0 = wait frames are not sent)
    pub fn wft_max(&self) -> u8 {
        self.wft_max
    }

    pub fn with_block_size(self, block_size: u8) -> Self {
        Self { block_size, ..self }
    }

    pub fn with_st_min(self, st_min: u8) -> Result<Self, ValidationError> {
        if st_min_to_duration(st_min).is_none() {
            return Err(ValidationError::new(
                "st_min",
                format!("0x{:02X}", st_min),
                STMIN_ALLOWED,
            ));
        }
        Ok(Self { st_min, ..self })
    }

    /// Set STmin from a duration. Only exactly representable values are
    /// accepted.
    pub fn with_st_min_duration(self, st_min: Duration) -> Result<Self, ValidationError> {
        let raw = duration_to_st_min(st_min).ok_or_else(|| {
            ValidationError::new("st_min", format!("{:?}", st_min), STMIN_ALLOWED)
        })?;
        Ok(Self {
            st_min: raw,
            ..self
        })
    }

    pub fn with_wft_max(self, wft_max: u8) -> Self {
        Self { wft_max, ..self }
    }
}

impl Default for IsotpFlowControlOptions {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Decode an STmin byte
pub fn st_min_to_duration(raw: u8) -> Option<Duration> {
    match raw {
        0x00..=0x7F => Some(Duration::from_millis(u64::from(raw))),
        0xF1..=0xF9 => Some(Duration::from_micros(u64::from(raw - 0xF0) * 100)),
        _ => None,
    }
}

/// Encode a duration as an STmin byte, `None` if not exactly representable
pub fn duration_to_st_min(duration: Duration) -> Option<u8> {
    let micros = duration.as_micros();
    if duration.subsec_nanos() % 1_000 != 0 {
        return None;
    }
    if micros % 1_000 == 0 {
        let millis = micros / 1_000;
        return (millis <= 0x7F).then_some(millis as u8);
    }
    if (100..=900).contains(&micros) && micros % 100 == 0 {
        return Some(0xF0 + (micros / 100) as u8);
    }
    None
}
