//! Typed socket option keys
//!
//! A [`SocketOption`] ties a `(level, name)` pair to the protocol it belongs
//! to and to the value type the kernel exchanges for it, so that
//! `channel.set_option(isotp::RECV_FC, value)` only compiles for ISO-TP
//! channels and only with flow control values.

use std::fmt;
use std::marker::PhantomData;

use cansock_core::abi::{self, SOL_CAN_ISOTP, SOL_CAN_RAW};
use cansock_core::filter::check_error_mask;
use cansock_core::options::check_forced_st_min;
use cansock_core::{
    decode_array, encode_array, CanFilter, IsotpFlowControlOptions, IsotpLinkLayerOptions,
    IsotpOptions, MarshalError, NativeStruct, ValidationError,
};

/// A CAN socket protocol
pub trait Protocol {
    /// Name used in log output
    const NAME: &'static str;
    /// `SOCK_RAW` or `SOCK_DGRAM`
    const SOCK_TYPE: i32;
    /// `CAN_RAW` or `CAN_ISOTP`
    const PROTOCOL: i32;
}

/// ISO 15765-2 transport protocol sockets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Isotp {}

impl Protocol for Isotp {
    const NAME: &'static str = "isotp";
    const SOCK_TYPE: i32 = libc::SOCK_DGRAM;
    const PROTOCOL: i32 = abi::CAN_ISOTP;
}

/// Raw CAN frame sockets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawCan {}

impl Protocol for RawCan {
    const NAME: &'static str = "raw";
    const SOCK_TYPE: i32 = libc::SOCK_RAW;
    const PROTOCOL: i32 = abi::CAN_RAW;
}

/// A value exchanged through `setsockopt`/`getsockopt`
pub trait OptionValue: Sized + fmt::Debug {
    /// Buffer size used for `getsockopt`
    const CAPACITY: usize;

    /// Check the value before it reaches the kernel
    fn validate(&self, _option: &'static str) -> Result<(), ValidationError> {
        Ok(())
    }

    fn to_bytes(&self) -> Vec<u8>;

    /// Decode the bytes reported by `getsockopt`
    fn from_bytes(bytes: &[u8]) -> Result<Self, MarshalError>;
}

macro_rules! fixed_option_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl OptionValue for $ty {
                const CAPACITY: usize = <$ty as NativeStruct>::SIZE;

                fn to_bytes(&self) -> Vec<u8> {
                    self.encode()
                }

                fn from_bytes(bytes: &[u8]) -> Result<Self, MarshalError> {
                    <$ty as NativeStruct>::decode(bytes)
                }
            }
        )*
    };
}

fixed_option_value!(IsotpOptions, IsotpFlowControlOptions, IsotpLinkLayerOptions, bool);

/// Forced TX/RX STmin, passed to the kernel verbatim
impl OptionValue for i32 {
    const CAPACITY: usize = <i32 as NativeStruct>::SIZE;

    fn validate(&self, option: &'static str) -> Result<(), ValidationError> {
        check_forced_st_min(option, *self).map(|_| ())
    }

    fn to_bytes(&self) -> Vec<u8> {
        self.encode()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, MarshalError> {
        i32::decode(bytes)
    }
}

/// Error frame class mask
impl OptionValue for u32 {
    const CAPACITY: usize = <u32 as NativeStruct>::SIZE;

    fn validate(&self, _option: &'static str) -> Result<(), ValidationError> {
        check_error_mask(*self).map(|_| ())
    }

    fn to_bytes(&self) -> Vec<u8> {
        self.encode()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, MarshalError> {
        u32::decode(bytes)
    }
}

/// Receive filter list. An empty list receives nothing.
impl OptionValue for Vec<CanFilter> {
    const CAPACITY: usize = abi::raw::FILTER_MAX * <CanFilter as NativeStruct>::SIZE;

    fn validate(&self, option: &'static str) -> Result<(), ValidationError> {
        if self.len() > abi::raw::FILTER_MAX {
            return Err(ValidationError::new(option, self.len(), "0..=512 filters"));
        }
        Ok(())
    }

    fn to_bytes(&self) -> Vec<u8> {
        encode_array(self)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, MarshalError> {
        decode_array(bytes)
    }
}

/// When an option may be changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Only before bind; the kernel refuses it afterwards
    PreBind,
    /// At any time while the channel is open
    Any,
}

/// A typed socket option key
pub struct SocketOption<P, T> {
    level: i32,
    name: i32,
    label: &'static str,
    phase: Phase,
    _marker: PhantomData<fn() -> (P, T)>,
}

impl<P, T> SocketOption<P, T> {
    pub const fn new(level: i32, name: i32, label: &'static str, phase: Phase) -> Self {
        Self {
            level,
            name,
            label,
            phase,
            _marker: PhantomData,
        }
    }

    pub fn level(&self) -> i32 {
        self.level
    }

    pub fn name(&self) -> i32 {
        self.name
    }

    /// Short name used in logs and validation errors
    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }
}

impl<P, T> Clone for SocketOption<P, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P, T> Copy for SocketOption<P, T> {}

impl<P, T> fmt::Debug for SocketOption<P, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketOption")
            .field("level", &self.level)
            .field("name", &self.name)
            .field("label", &self.label)
            .finish()
    }
}

/// `SOL_CAN_ISOTP` options. All of them must be set before bind.
pub mod isotp {
    use super::*;
    use cansock_core::abi::isotp as opt;

    pub const OPTS: SocketOption<Isotp, IsotpOptions> =
        SocketOption::new(SOL_CAN_ISOTP, opt::OPTS, "isotp_opts", Phase::PreBind);

    pub const RECV_FC: SocketOption<Isotp, IsotpFlowControlOptions> =
        SocketOption::new(SOL_CAN_ISOTP, opt::RECV_FC, "recv_fc", Phase::PreBind);

    /// Forced separation time for transmitted frames (needs `FORCE_TXSTMIN`)
    pub const TX_STMIN: SocketOption<Isotp, i32> =
        SocketOption::new(SOL_CAN_ISOTP, opt::TX_STMIN, "tx_stmin", Phase::PreBind);

    /// Minimum separation time for received frames (needs `FORCE_RXSTMIN`)
    pub const RX_STMIN: SocketOption<Isotp, i32> =
        SocketOption::new(SOL_CAN_ISOTP, opt::RX_STMIN, "rx_stmin", Phase::PreBind);

    pub const LL_OPTS: SocketOption<Isotp, IsotpLinkLayerOptions> =
        SocketOption::new(SOL_CAN_ISOTP, opt::LL_OPTS, "ll_opts", Phase::PreBind);
}

/// `SOL_CAN_RAW` options
pub mod raw {
    use super::*;
    use cansock_core::abi::raw as opt;

    pub const FILTER: SocketOption<RawCan, Vec<CanFilter>> =
        SocketOption::new(SOL_CAN_RAW, opt::FILTER, "filter", Phase::Any);

    pub const ERR_FILTER: SocketOption<RawCan, u32> =
        SocketOption::new(SOL_CAN_RAW, opt::ERR_FILTER, "err_filter", Phase::Any);

    pub const LOOPBACK: SocketOption<RawCan, bool> =
        SocketOption::new(SOL_CAN_RAW, opt::LOOPBACK, "loopback", Phase::Any);

    pub const RECV_OWN_MSGS: SocketOption<RawCan, bool> =
        SocketOption::new(SOL_CAN_RAW, opt::RECV_OWN_MSGS, "recv_own_msgs", Phase::Any);

    pub const FD_FRAMES: SocketOption<RawCan, bool> =
        SocketOption::new(SOL_CAN_RAW, opt::FD_FRAMES, "fd_frames", Phase::Any);

    pub const JOIN_FILTERS: SocketOption<RawCan, bool> =
        SocketOption::new(SOL_CAN_RAW, opt::JOIN_FILTERS, "join_filters", Phase::Any);
}

#[cfg(test)]
mod tests {
    use super::*;
    use cansock_core::CanId;

    #[test]
    fn test_key_levels() {
        assert_eq!(isotp::OPTS.level(), 106);
        assert_eq!(isotp::LL_OPTS.name(), 5);
        assert_eq!(raw::FILTER.level(), 101);
        assert_eq!(raw::JOIN_FILTERS.name(), 6);
        assert_eq!(isotp::RECV_FC.phase(), Phase::PreBind);
        assert_eq!(raw::LOOPBACK.phase(), Phase::Any);
    }

    #[test]
    fn test_forced_st_min_validation_uses_option_label() {
        let err = (-5i32).validate(isotp::RX_STMIN.label()).unwrap_err();
        assert_eq!(err.field, "rx_stmin");
        assert!(100i32.validate("tx_stmin").is_ok());
    }

    #[test]
    fn test_filter_list_limits() {
        let too_many = vec![CanFilter::ALL; 513];
        assert!(too_many.validate("filter").is_err());
        let filters = vec![CanFilter::exact(CanId::standard(0x7E8).unwrap())];
        assert_eq!(Vec::<CanFilter>::from_bytes(&filters.to_bytes()), Ok(filters));
    }

    #[test]
    fn test_error_mask_validation() {
        assert!(0x1FFF_FFFFu32.validate("err_filter").is_ok());
        assert!(0xFFFF_FFFFu32.validate("err_filter").is_err());
    }
}
