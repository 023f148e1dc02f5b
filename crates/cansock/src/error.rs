//! Channel errors and OS error mapping

use std::io;

use cansock_core::{MarshalError, ValidationError};
use thiserror::Error;

/// Errors returned by channel operations
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Marshal(#[from] MarshalError),

    #[error("Channel is closed")]
    ChannelClosed,

    #[error("Channel is already bound")]
    AlreadyBound,

    #[error("Channel is not bound")]
    NotBound,

    #[error("{op}: address already in use (os error {code})")]
    AddressInUse { op: &'static str, code: i32 },

    #[error("{op}: no such CAN interface (os error {code})")]
    InterfaceNotFound { op: &'static str, code: i32 },

    #[error("{op}: permission denied (os error {code})")]
    PermissionDenied { op: &'static str, code: i32 },

    #[error("{op}: operation would block (os error {code})")]
    WouldBlock { op: &'static str, code: i32 },

    #[error("{op}: invalid argument (os error {code})")]
    InvalidArgument { op: &'static str, code: i32 },

    #[error("{op}: socket is closed or not connected (os error {code})")]
    Closed { op: &'static str, code: i32 },

    #[error("{op}: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: io::Error,
    },
}

pub type ChannelResult<T> = Result<T, ChannelError>;

impl ChannelError {
    /// OS error code carried by a mapped native failure
    pub fn os_error_code(&self) -> Option<i32> {
        match self {
            Self::AddressInUse { code, .. }
            | Self::InterfaceNotFound { code, .. }
            | Self::PermissionDenied { code, .. }
            | Self::WouldBlock { code, .. }
            | Self::InvalidArgument { code, .. }
            | Self::Closed { code, .. } => Some(*code),
            Self::Io { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }

    /// Name of the native call that failed
    pub fn operation(&self) -> Option<&'static str> {
        match self {
            Self::AddressInUse { op, .. }
            | Self::InterfaceNotFound { op, .. }
            | Self::PermissionDenied { op, .. }
            | Self::WouldBlock { op, .. }
            | Self::InvalidArgument { op, .. }
            | Self::Closed { op, .. }
            | Self::Io { op, .. } => Some(*op),
            _ => None,
        }
    }

    pub fn is_would_block(&self) -> bool {
        matches!(self, Self::WouldBlock { .. })
    }
}

/// Classify the failure of native call `op`
pub fn map_os_error(op: &'static str, err: io::Error) -> ChannelError {
    let Some(code) = err.raw_os_error() else {
        return ChannelError::Io { op, source: err };
    };
    // EWOULDBLOCK == EAGAIN on Linux
    match code {
        libc::EADDRINUSE => ChannelError::AddressInUse { op, code },
        libc::ENODEV | libc::ENXIO => ChannelError::InterfaceNotFound { op, code },
        libc::EACCES | libc::EPERM => ChannelError::PermissionDenied { op, code },
        libc::EAGAIN | libc::EINPROGRESS => ChannelError::WouldBlock { op, code },
        libc::EINVAL
        | libc::EADDRNOTAVAIL
        | libc::ENOPROTOOPT
        | libc::EDOM
        | libc::ERANGE
        | libc::EMSGSIZE
        | libc::EFAULT => ChannelError::InvalidArgument { op, code },
        libc::EBADF | libc::ENOTCONN | libc::ESHUTDOWN => ChannelError::Closed { op, code },
        _ => ChannelError::Io { op, source: err },
    }
}
