//! Linux kernel ABI constants for CAN sockets
//!
//! Values mirror `linux/can.h`, `linux/can/raw.h` and `linux/can/isotp.h`.
//! They are part of the stable user-space ABI and must not be changed.

/// Address family for CAN sockets
pub const AF_CAN: u16 = 29;

/// Raw CAN protocol number
pub const CAN_RAW: i32 = 1;
/// ISO 15765-2 transport protocol number
pub const CAN_ISOTP: i32 = 6;

pub const SOL_CAN_BASE: i32 = 100;
pub const SOL_CAN_RAW: i32 = SOL_CAN_BASE + CAN_RAW;
pub const SOL_CAN_ISOTP: i32 = SOL_CAN_BASE + CAN_ISOTP;

/// Extended frame format flag in `can_id`
pub const CAN_EFF_FLAG: u32 = 0x8000_0000;
/// Remote transmission request flag in `can_id`
pub const CAN_RTR_FLAG: u32 = 0x4000_0000;
/// Error message frame flag in `can_id`
pub const CAN_ERR_FLAG: u32 = 0x2000_0000;
/// Inverted filter flag in `can_filter.can_id`
pub const CAN_INV_FILTER: u32 = 0x2000_0000;

pub const CAN_SFF_MASK: u32 = 0x0000_07FF;
pub const CAN_EFF_MASK: u32 = 0x1FFF_FFFF;
pub const CAN_ERR_MASK: u32 = 0x1FFF_FFFF;

/// `sizeof(struct can_frame)`
pub const CAN_MTU: u8 = 16;
/// `sizeof(struct canfd_frame)`
pub const CANFD_MTU: u8 = 72;
pub const CAN_MAX_DLEN: u8 = 8;
pub const CANFD_MAX_DLEN: u8 = 64;

/// `SOL_CAN_ISOTP` option names and kernel defaults
pub mod isotp {
    pub const OPTS: i32 = 1;
    pub const RECV_FC: i32 = 2;
    pub const TX_STMIN: i32 = 3;
    pub const RX_STMIN: i32 = 4;
    pub const LL_OPTS: i32 = 5;

    /// Default frame transmission time in nanoseconds
    pub const DEFAULT_FRAME_TXTIME: u32 = 50_000;
    /// Requests a frame transmission time of zero (0 means "unchanged")
    pub const FRAME_TXTIME_ZERO: u32 = 0xFFFF_FFFF;
    pub const DEFAULT_EXT_ADDRESS: u8 = 0x00;
    pub const DEFAULT_PAD_CONTENT: u8 = 0xCC;
    pub const DEFAULT_RECV_BS: u8 = 0;
    pub const DEFAULT_RECV_STMIN: u8 = 0x00;
    pub const DEFAULT_RECV_WFTMAX: u8 = 0;
}

/// `SOL_CAN_RAW` option names
pub mod raw {
    pub const FILTER: i32 = 1;
    pub const ERR_FILTER: i32 = 2;
    pub const LOOPBACK: i32 = 3;
    pub const RECV_OWN_MSGS: i32 = 4;
    pub const FD_FRAMES: i32 = 5;
    pub const JOIN_FILTERS: i32 = 6;

    /// Maximum number of filters a raw socket accepts
    pub const FILTER_MAX: usize = 512;
}
