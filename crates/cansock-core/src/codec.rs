//! Native struct codec
//!
//! Converts value objects to and from the byte layouts the kernel expects
//! for `setsockopt`/`getsockopt`, `bind` and raw frame I/O. Every layout is
//! spelled out field by field in native byte order with explicit padding;
//! nothing relies on the host compiler's struct layout.
//!
//! ```text
//! can_isotp_options (12)       sockaddr_can (24)
//! +-------+--------------+     +--------+-----+---------+
//! | 0..4  | flags        |     | 0..2   | family        |
//! | 4..8  | frame_txtime |     | 2..4   | (padding)     |
//! | 8     | ext_address  |     | 4..8   | ifindex       |
//! | 9     | txpad        |     | 8..12  | tp.rx_id      |
//! | 10    | rxpad        |     | 12..16 | tp.tx_id      |
//! | 11    | rx_ext_addr  |     | 16..24 | (union tail)  |
//! +-------+--------------+     +--------+---------------+
//! ```

use byteorder::{ByteOrder, NativeEndian};

use crate::abi::{AF_CAN, CANFD_MAX_DLEN, CAN_MAX_DLEN};
use crate::address::{IsotpSocketAddress, RawCanAddress};
use crate::error::MarshalError;
use crate::filter::CanFilter;
use crate::frame::{CanFrame, ClassicFrame, FdFlags, FdFrame};
use crate::id::CanId;
use crate::options::{IsotpFlags, IsotpFlowControlOptions, IsotpLinkLayerOptions, IsotpOptions};

/// Byte range of a field within a structure
pub type Field = ::core::ops::Range<usize>;

/// Field offsets of the kernel structures
pub mod layout {
    use super::Field;

    pub mod isotp_options {
        use super::Field;
        pub const FLAGS: Field = 0..4;
        pub const FRAME_TXTIME: Field = 4..8;
        pub const EXT_ADDRESS: usize = 8;
        pub const TXPAD_CONTENT: usize = 9;
        pub const RXPAD_CONTENT: usize = 10;
        pub const RX_EXT_ADDRESS: usize = 11;
        pub const SIZE: usize = RX_EXT_ADDRESS + 1;
    }

    pub mod isotp_fc_options {
        pub const BS: usize = 0;
        pub const STMIN: usize = 1;
        pub const WFTMAX: usize = 2;
        pub const SIZE: usize = WFTMAX + 1;
    }

    pub mod isotp_ll_options {
        pub const MTU: usize = 0;
        pub const TX_DL: usize = 1;
        pub const TX_FLAGS: usize = 2;
        pub const SIZE: usize = TX_FLAGS + 1;
    }

    pub mod sockaddr_can {
        use super::Field;
        pub const FAMILY: Field = 0..2;
        pub const IFINDEX: Field = 4..8;
        pub const TP_RX_ID: Field = 8..12;
        pub const TP_TX_ID: Field = 12..16;
        /// The address union is sized by its j1939 member (u64 aligned)
        pub const UNION_TAIL: Field = 16..24;
        pub const SIZE: usize = UNION_TAIL.end;
    }

    pub mod can_frame {
        use super::Field;
        pub const CAN_ID: Field = 0..4;
        pub const LEN: usize = 4;
        pub const LEN8_DLC: usize = 7;
        pub const DATA: Field = 8..16;
        pub const SIZE: usize = DATA.end;
    }

    pub mod canfd_frame {
        use super::Field;
        pub const CAN_ID: Field = 0..4;
        pub const LEN: usize = 4;
        pub const FLAGS: usize = 5;
        pub const DATA: Field = 8..72;
        pub const SIZE: usize = DATA.end;
    }

    pub mod can_filter {
        use super::Field;
        pub const CAN_ID: Field = 0..4;
        pub const CAN_MASK: Field = 4..8;
        pub const SIZE: usize = CAN_MASK.end;
    }

    /// C `int` as used for scalar and boolean socket options
    pub mod int {
        pub const SIZE: usize = 4;
    }
}

// Kernel struct sizes (linux/can.h, linux/can/isotp.h)
const _: () = assert!(layout::isotp_options::SIZE == 12);
const _: () = assert!(layout::isotp_fc_options::SIZE == 3);
const _: () = assert!(layout::isotp_ll_options::SIZE == 3);
const _: () = assert!(layout::sockaddr_can::SIZE == 24);
const _: () = assert!(layout::can_frame::SIZE == 16);
const _: () = assert!(layout::canfd_frame::SIZE == 72);
const _: () = assert!(layout::can_filter::SIZE == 8);

/// A value with a fixed-size kernel representation
pub trait NativeStruct: Sized {
    /// Kernel structure name, used in error messages
    const NAME: &'static str;
    /// Exact encoded length in bytes
    const SIZE: usize;

    /// Write the encoding into `buf`, which is exactly `SIZE` bytes long
    fn encode_into(&self, buf: &mut [u8]);

    /// Read a value from `buf`, which is exactly `SIZE` bytes long.
    /// Must accept any byte content.
    fn decode_from(buf: &[u8]) -> Self;

    fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::SIZE];
        self.encode_into(&mut buf);
        buf
    }

    fn decode(bytes: &[u8]) -> Result<Self, MarshalError> {
        check_len(Self::NAME, Self::SIZE, bytes)?;
        Ok(Self::decode_from(bytes))
    }
}

pub fn check_len(structure: &'static str, expected: usize, bytes: &[u8]) -> Result<(), MarshalError> {
    if bytes.len() != expected {
        return Err(MarshalError::Length {
            structure,
            expected,
            actual: bytes.len(),
        });
    }
    Ok(())
}

/// Encode a contiguous C array of structures
pub fn encode_array<T: NativeStruct>(items: &[T]) -> Vec<u8> {
    let mut buf = vec![0u8; items.len() * T::SIZE];
    for (item, chunk) in items.iter().zip(buf.chunks_exact_mut(T::SIZE)) {
        item.encode_into(chunk);
    }
    buf
}

/// Decode a contiguous C array of structures
pub fn decode_array<T: NativeStruct>(bytes: &[u8]) -> Result<Vec<T>, MarshalError> {
    if bytes.len() % T::SIZE != 0 {
        return Err(MarshalError::ArrayLength {
            structure: T::NAME,
            element: T::SIZE,
            actual: bytes.len(),
        });
    }
    Ok(bytes.chunks_exact(T::SIZE).map(T::decode_from).collect())
}

impl NativeStruct for IsotpOptions {
    const NAME: &'static str = "can_isotp_options";
    const SIZE: usize = layout::isotp_options::SIZE;

    fn encode_into(&self, buf: &mut [u8]) {
        use layout::isotp_options::*;
        NativeEndian::write_u32(&mut buf[FLAGS], self.flags.bits());
        NativeEndian::write_u32(&mut buf[FRAME_TXTIME], self.frame_txtime);
        buf[EXT_ADDRESS] = self.ext_address;
        buf[TXPAD_CONTENT] = self.tx_pad_content;
        buf[RXPAD_CONTENT] = self.rx_pad_content;
        buf[RX_EXT_ADDRESS] = self.rx_ext_address;
    }

    fn decode_from(buf: &[u8]) -> Self {
        use layout::isotp_options::*;
        Self {
            flags: IsotpFlags::from_bits_truncate(NativeEndian::read_u32(&buf[FLAGS])),
            frame_txtime: NativeEndian::read_u32(&buf[FRAME_TXTIME]),
            ext_address: buf[EXT_ADDRESS],
            tx_pad_content: buf[TXPAD_CONTENT],
            rx_pad_content: buf[RXPAD_CONTENT],
            rx_ext_address: buf[RX_EXT_ADDRESS],
        }
    }
}

impl NativeStruct for IsotpFlowControlOptions {
    const NAME: &'static str = "can_isotp_fc_options";
    const SIZE: usize = layout::isotp_fc_options::SIZE;

    fn encode_into(&self, buf: &mut [u8]) {
        use layout::isotp_fc_options::*;
        buf[BS] = self.block_size;
        buf[STMIN] = self.st_min;
        buf[WFTMAX] = self.wft_max;
    }

    fn decode_from(buf: &[u8]) -> Self {
        use layout::isotp_fc_options::*;
        Self {
            block_size: buf[BS],
            st_min: buf[STMIN],
            wft_max: buf[WFTMAX],
        }
    }
}

impl NativeStruct for IsotpLinkLayerOptions {
    const NAME: &'static str = "can_isotp_ll_options";
    const SIZE: usize = layout::isotp_ll_options::SIZE;

    fn encode_into(&self, buf: &mut [u8]) {
        use layout::isotp_ll_options::*;
        buf[MTU] = self.mtu;
        buf[TX_DL] = self.tx_dl;
        buf[TX_FLAGS] = self.tx_flags.bits();
    }

    fn decode_from(buf: &[u8]) -> Self {
        use layout::isotp_ll_options::*;
        Self {
            mtu: buf[MTU],
            tx_dl: buf[TX_DL],
            tx_flags: FdFlags::from_bits_truncate(buf[TX_FLAGS]),
        }
    }
}

fn encode_sockaddr(buf: &mut [u8], ifindex: u32, rx_id: u32, tx_id: u32) {
    use layout::sockaddr_can::*;
    buf.fill(0);
    NativeEndian::write_u16(&mut buf[FAMILY], AF_CAN);
    NativeEndian::write_u32(&mut buf[IFINDEX], ifindex);
    NativeEndian::write_u32(&mut buf[TP_RX_ID], rx_id);
    NativeEndian::write_u32(&mut buf[TP_TX_ID], tx_id);
}

impl NativeStruct for RawCanAddress {
    const NAME: &'static str = "sockaddr_can";
    const SIZE: usize = layout::sockaddr_can::SIZE;

    fn encode_into(&self, buf: &mut [u8]) {
        encode_sockaddr(buf, self.ifindex, 0, 0);
    }

    fn decode_from(buf: &[u8]) -> Self {
        Self {
            ifindex: NativeEndian::read_u32(&buf[layout::sockaddr_can::IFINDEX]),
        }
    }
}

impl NativeStruct for IsotpSocketAddress {
    const NAME: &'static str = "sockaddr_can";
    const SIZE: usize = layout::sockaddr_can::SIZE;

    fn encode_into(&self, buf: &mut [u8]) {
        encode_sockaddr(buf, self.ifindex, self.rx_id.raw(), self.tx_id.raw());
    }

    fn decode_from(buf: &[u8]) -> Self {
        use layout::sockaddr_can::*;
        Self {
            ifindex: NativeEndian::read_u32(&buf[IFINDEX]),
            rx_id: CanId::from_raw(NativeEndian::read_u32(&buf[TP_RX_ID])),
            tx_id: CanId::from_raw(NativeEndian::read_u32(&buf[TP_TX_ID])),
        }
    }
}

impl NativeStruct for ClassicFrame {
    const NAME: &'static str = "can_frame";
    const SIZE: usize = layout::can_frame::SIZE;

    fn encode_into(&self, buf: &mut [u8]) {
        use layout::can_frame::*;
        buf.fill(0);
        NativeEndian::write_u32(&mut buf[CAN_ID], self.can_id);
        buf[LEN] = self.len;
        buf[DATA].copy_from_slice(&self.data);
    }

    fn decode_from(buf: &[u8]) -> Self {
        use layout::can_frame::*;
        let len = buf[LEN].min(CAN_MAX_DLEN);
        let mut data = [0u8; CAN_MAX_DLEN as usize];
        data[..usize::from(len)].copy_from_slice(&buf[DATA][..usize::from(len)]);
        Self {
            can_id: NativeEndian::read_u32(&buf[CAN_ID]),
            len,
            data,
        }
    }
}

impl NativeStruct for FdFrame {
    const NAME: &'static str = "canfd_frame";
    const SIZE: usize = layout::canfd_frame::SIZE;

    fn encode_into(&self, buf: &mut [u8]) {
        use layout::canfd_frame::*;
        buf.fill(0);
        NativeEndian::write_u32(&mut buf[CAN_ID], self.can_id);
        buf[LEN] = self.len;
        buf[FLAGS] = self.flags.bits();
        buf[DATA].copy_from_slice(&self.data);
    }

    fn decode_from(buf: &[u8]) -> Self {
        use layout::canfd_frame::*;
        let len = buf[LEN].min(CANFD_MAX_DLEN);
        let mut data = [0u8; CANFD_MAX_DLEN as usize];
        data[..usize::from(len)].copy_from_slice(&buf[DATA][..usize::from(len)]);
        Self {
            can_id: NativeEndian::read_u32(&buf[CAN_ID]),
            len,
            flags: FdFlags::from_bits_truncate(buf[FLAGS]),
            data,
        }
    }
}

impl CanFrame {
    /// Encode as `can_frame` or `canfd_frame`
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Classic(frame) => frame.encode(),
            Self::Fd(frame) => frame.encode(),
        }
    }

    /// Decode by length: 16 bytes is a classic frame, 72 bytes an FD frame
    pub fn decode(bytes: &[u8]) -> Result<Self, MarshalError> {
        match bytes.len() {
            layout::can_frame::SIZE => Ok(Self::Classic(ClassicFrame::decode_from(bytes))),
            layout::canfd_frame::SIZE => Ok(Self::Fd(FdFrame::decode_from(bytes))),
            actual => Err(MarshalError::Length {
                structure: "can_frame or canfd_frame",
                expected: layout::canfd_frame::SIZE,
                actual,
            }),
        }
    }
}

impl NativeStruct for CanFilter {
    const NAME: &'static str = "can_filter";
    const SIZE: usize = layout::can_filter::SIZE;

    fn encode_into(&self, buf: &mut [u8]) {
        use layout::can_filter::*;
        NativeEndian::write_u32(&mut buf[CAN_ID], self.id);
        NativeEndian::write_u32(&mut buf[CAN_MASK], self.mask);
    }

    fn decode_from(buf: &[u8]) -> Self {
        use layout::can_filter::*;
        Self {
            id: NativeEndian::read_u32(&buf[CAN_ID]),
            mask: NativeEndian::read_u32(&buf[CAN_MASK]),
        }
    }
}

impl NativeStruct for i32 {
    const NAME: &'static str = "int";
    const SIZE: usize = layout::int::SIZE;

    fn encode_into(&self, buf: &mut [u8]) {
        NativeEndian::write_i32(buf, *self);
    }

    fn decode_from(buf: &[u8]) -> Self {
        NativeEndian::read_i32(buf)
    }
}

impl NativeStruct for u32 {
    const NAME: &'static str = "u32";
    const SIZE: usize = layout::int::SIZE;

    fn encode_into(&self, buf: &mut [u8]) {
        NativeEndian::write_u32(buf, *self);
    }

    fn decode_from(buf: &[u8]) -> Self {
        NativeEndian::read_u32(buf)
    }
}

/// Boolean socket options are C `int`s; any non-zero value is true
impl NativeStruct for bool {
    const NAME: &'static str = "int";
    const SIZE: usize = layout::int::SIZE;

    fn encode_into(&self, buf: &mut [u8]) {
        NativeEndian::write_i32(buf, i32::from(*self));
    }

    fn decode_from(buf: &[u8]) -> Self {
        NativeEndian::read_i32(buf) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::IsotpAddress;
    use std::time::Duration;

    fn ne32(value: u32) -> [u8; 4] {
        value.to_ne_bytes()
    }

    #[test]
    fn test_isotp_options_layout() {
        let opts = IsotpOptions::DEFAULT
            .with_extended_address(0x12)
            .with_rx_extended_address(0x34)
            .unwrap()
            .with_tx_padding(0xAA)
            .with_rx_padding(0xBB)
            .with_frame_txtime(Duration::from_micros(100))
            .unwrap();
        let bytes = opts.encode();
        assert_eq!(bytes.len(), 12);
        assert_eq!(bytes[0..4], ne32(0x0002 | 0x0200 | 0x0004 | 0x0008));
        assert_eq!(bytes[4..8], ne32(100_000));
        assert_eq!(bytes[8..12], [0x12, 0xAA, 0xBB, 0x34]);
        assert_eq!(IsotpOptions::decode(&bytes), Ok(opts));
    }

    #[test]
    fn test_default_options_round_trip() {
        let bytes = IsotpOptions::DEFAULT.encode();
        assert_eq!(bytes[4..8], ne32(50_000));
        assert_eq!(bytes[8..12], [0x00, 0xCC, 0xCC, 0x00]);
        assert_eq!(IsotpOptions::decode(&bytes), Ok(IsotpOptions::DEFAULT));
    }

    #[test]
    fn test_unknown_flag_bits_are_dropped() {
        let mut bytes = IsotpOptions::DEFAULT.encode();
        bytes[0..4].copy_from_slice(&ne32(0x8000_0001));
        let opts = IsotpOptions::decode(&bytes).unwrap();
        assert_eq!(opts.flags(), IsotpFlags::LISTEN_MODE);
    }

    #[test]
    fn test_fc_and_ll_layout() {
        let fc = IsotpFlowControlOptions::new(4, 0xF5, 2).unwrap();
        assert_eq!(fc.encode(), vec![4, 0xF5, 2]);
        assert_eq!(IsotpFlowControlOptions::decode(&[4, 0xF5, 2]), Ok(fc));

        let ll = IsotpLinkLayerOptions::can_fd(64, FdFlags::BRS).unwrap();
        assert_eq!(ll.encode(), vec![72, 64, 0x01]);
        assert_eq!(IsotpLinkLayerOptions::decode(&[72, 64, 0x01]), Ok(ll));
    }

    #[test]
    fn test_reserved_st_min_decodes_verbatim() {
        let fc = IsotpFlowControlOptions::decode(&[0, 0xFA, 0]).unwrap();
        assert_eq!(fc.st_min(), 0xFA);
        assert_eq!(fc.st_min_duration(), None);
        assert_eq!(fc.encode(), vec![0, 0xFA, 0]);
    }

    #[test]
    fn test_wrong_length_is_marshal_error() {
        assert_eq!(
            IsotpOptions::decode(&[0u8; 11]),
            Err(MarshalError::Length {
                structure: "can_isotp_options",
                expected: 12,
                actual: 11,
            })
        );
        assert!(IsotpFlowControlOptions::decode(&[0u8; 4]).is_err());
        assert!(IsotpLinkLayerOptions::decode(&[]).is_err());
        assert!(IsotpSocketAddress::decode(&[0u8; 16]).is_err());
    }

    #[test]
    fn test_sockaddr_layout() {
        let local = IsotpAddress::from_id(0x7DF).unwrap();
        let remote = IsotpAddress::from_id(0x18DA_F110).unwrap();
        let addr = IsotpSocketAddress::for_pair(7, &local, &remote).unwrap();
        let bytes = addr.encode();
        assert_eq!(bytes.len(), 24);
        assert_eq!(bytes[0..2], AF_CAN.to_ne_bytes());
        assert_eq!(bytes[2..4], [0, 0]);
        assert_eq!(bytes[4..8], ne32(7));
        assert_eq!(bytes[8..12], ne32(0x7DF));
        assert_eq!(bytes[12..16], ne32(0x98DA_F110));
        assert_eq!(bytes[16..24], [0u8; 8]);
        assert_eq!(IsotpSocketAddress::decode(&bytes), Ok(addr));

        let raw = RawCanAddress::new(7);
        let raw_bytes = raw.encode();
        assert_eq!(raw_bytes[8..24], [0u8; 16]);
        assert_eq!(RawCanAddress::decode(&raw_bytes), Ok(raw));
    }

    #[test]
    fn test_frame_layouts() {
        let id = CanId::standard(0x123).unwrap();
        let classic = ClassicFrame::new(id, &[1, 2, 3]).unwrap();
        let bytes = classic.encode();
        assert_eq!(bytes.len(), 16);
        assert_eq!(bytes[4], 3);
        assert_eq!(bytes[8..11], [1, 2, 3]);
        assert_eq!(CanFrame::decode(&bytes), Ok(CanFrame::Classic(classic)));

        let id = CanId::extended(0x1234).unwrap();
        let fd = FdFrame::new(id, &[9; 12], FdFlags::BRS).unwrap();
        let bytes = CanFrame::from(fd).encode();
        assert_eq!(bytes.len(), 72);
        assert_eq!(bytes[5], 0x01);
        assert_eq!(CanFrame::decode(&bytes), Ok(CanFrame::Fd(fd)));

        assert!(CanFrame::decode(&[0u8; 20]).is_err());
    }

    #[test]
    fn test_frame_decode_clamps_length() {
        let mut bytes = [0u8; 16];
        bytes[4] = 15;
        let frame = ClassicFrame::decode(&bytes).unwrap();
        assert_eq!(frame.len(), 8);
    }

    #[test]
    fn test_filter_array() {
        let filters = vec![
            CanFilter::exact(CanId::standard(0x7E8).unwrap()),
            CanFilter::masked(CanId::extended(0x18DA_F100).unwrap(), 0x1FFF_FF00).inverted(),
        ];
        let bytes = encode_array(&filters);
        assert_eq!(bytes.len(), 16);
        assert_eq!(decode_array::<CanFilter>(&bytes), Ok(filters));
        assert_eq!(
            decode_array::<CanFilter>(&bytes[..12]),
            Err(MarshalError::ArrayLength {
                structure: "can_filter",
                element: 8,
                actual: 12,
            })
        );
    }

    #[test]
    fn test_scalars() {
        assert_eq!(100i32.encode(), 100i32.to_ne_bytes().to_vec());
        assert_eq!(i32::decode(&0i32.to_ne_bytes()), Ok(0));
        assert_eq!(true.encode(), 1i32.to_ne_bytes().to_vec());
        assert_eq!(bool::decode(&7i32.to_ne_bytes()), Ok(true));
        assert!(u32::decode(&[0u8; 2]).is_err());
    }
}
