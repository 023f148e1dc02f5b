//! Classic CAN and CAN-FD frames

use bitflags::bitflags;

use crate::abi::{CANFD_MAX_DLEN, CAN_ERR_FLAG, CAN_ERR_MASK, CAN_MAX_DLEN, CAN_RTR_FLAG};
use crate::error::ValidationError;
use crate::id::CanId;

bitflags! {
    /// CAN-FD frame flags (`canfd_frame.flags`, `can_isotp_ll_options.tx_flags`)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FdFlags: u8 {
        /// Bit rate switch (second bitrate for payload data)
        const BRS = 0x01;
        /// Error state indicator of the transmitting node
        const ESI = 0x02;
        /// Mark a CAN-FD frame on sockets that also carry classic frames
        const FDF = 0x04;
    }
}

/// `struct can_frame`: up to 8 data bytes.
///
/// The raw `can_id` (identifier plus EFF/RTR/ERR flags) is kept as received
/// so that decoding never loses information. Data bytes past `len` are zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassicFrame {
    pub(crate) can_id: u32,
    pub(crate) len: u8,
    pub(crate) data: [u8; CAN_MAX_DLEN as usize],
}

impl ClassicFrame {
    /// Data frame
    pub fn new(id: CanId, data: &[u8]) -> Result<Self, ValidationError> {
        if data.len() > usize::from(CAN_MAX_DLEN) {
            return Err(ValidationError::new("data", data.len(), "0..=8 bytes"));
        }
        let mut buf = [0u8; CAN_MAX_DLEN as usize];
        buf[..data.len()].copy_from_slice(data);
        Ok(Self {
            can_id: id.raw(),
            len: data.len() as u8,
            data: buf,
        })
    }

    /// Remote transmission request with the given data length code
    pub fn remote(id: CanId, dlc: u8) -> Result<Self, ValidationError> {
        if dlc > CAN_MAX_DLEN {
            return Err(ValidationError::new("dlc", dlc, "0..=8"));
        }
        Ok(Self {
            can_id: id.raw() | CAN_RTR_FLAG,
            len: dlc,
            data: [0; CAN_MAX_DLEN as usize],
        })
    }

    pub fn id(&self) -> CanId {
        CanId::from_raw(self.can_id)
    }

    pub fn raw_id(&self) -> u32 {
        self.can_id
    }

    pub fn is_remote(&self) -> bool {
        self.can_id & CAN_RTR_FLAG != 0
    }

    pub fn is_error(&self) -> bool {
        self.can_id & CAN_ERR_FLAG != 0
    }

    /// Error class bits of an error frame (`CAN_ERR_*`)
    pub fn error_class(&self) -> Option<u32> {
        self.is_error().then_some(self.can_id & CAN_ERR_MASK)
    }

    pub fn len(&self) -> usize {
        usize::from(self.len)
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Payload; empty for remote frames
    pub fn data(&self) -> &[u8] {
        if self.is_remote() {
            &[]
        } else {
            &self.data[..self.len()]
        }
    }
}

/// `struct canfd_frame`: up to 64 data bytes in FD length steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FdFrame {
    pub(crate) can_id: u32,
    pub(crate) len: u8,
    pub(crate) flags: FdFlags,
    pub(crate) data: [u8; CANFD_MAX_DLEN as usize],
}

impl FdFrame {
    pub fn new(id: CanId, data: &[u8], flags: FdFlags) -> Result<Self, ValidationError> {
        if !is_fd_len(data.len()) {
            return Err(ValidationError::new(
                "data",
                data.len(),
                "0..=8, 12, 16, 20, 24, 32, 48 or 64 bytes",
            ));
        }
        let mut buf = [0u8; CANFD_MAX_DLEN as usize];
        buf[..data.len()].copy_from_slice(data);
        Ok(Self {
            can_id: id.raw(),
            len: data.len() as u8,
            flags,
            data: buf,
        })
    }

    pub fn id(&self) -> CanId {
        CanId::from_raw(self.can_id)
    }

    pub fn raw_id(&self) -> u32 {
        self.can_id
    }

    pub fn flags(&self) -> FdFlags {
        self.flags
    }

    pub fn len(&self) -> usize {
        usize::from(self.len)
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn data(&self) -> &[u8] {
        &self.data[..self.len()]
    }
}

/// A frame read from or written to a raw CAN socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanFrame {
    Classic(ClassicFrame),
    Fd(FdFrame),
}

impl CanFrame {
    pub fn id(&self) -> CanId {
        match self {
            Self::Classic(frame) => frame.id(),
            Self::Fd(frame) => frame.id(),
        }
    }

    pub fn data(&self) -> &[u8] {
        match self {
            Self::Classic(frame) => frame.data(),
            Self::Fd(frame) => frame.data(),
        }
    }

    pub fn is_fd(&self) -> bool {
        matches!(self, Self::Fd(_))
    }
}

impl From<ClassicFrame> for CanFrame {
    fn from(frame: ClassicFrame) -> Self {
        Self::Classic(frame)
    }
}

impl From<FdFrame> for CanFrame {
    fn from(frame: FdFrame) -> Self {
        Self::Fd(frame)
    }
}

/// Whether `len` is a valid CAN-FD payload length
pub fn is_fd_len(len: usize) -> bool {
    matches!(len, 0..=8 | 12 | 16 | 20 | 24 | 32 | 48 | 64)
}
