//! cansock-core - Value objects and kernel codec for CAN sockets
//!
//! This crate holds everything about CAN and ISO-TP sockets that does not
//! need an open file descriptor: identifiers, frames, filters, socket
//! addresses, ISO-TP option values and their exact kernel byte layouts.
//!
//! # Layering
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ cansock (Channel, NativeSocket, config)      │
//! └──────────────────────┬───────────────────────┘
//!                        │ bytes
//! ┌──────────────────────┴───────────────────────┐
//! │ codec: NativeStruct encode/decode            │
//! ├──────────────────────────────────────────────┤
//! │ options · address · frame · filter · id      │
//! │ (validated, immutable values)                │
//! └──────────────────────────────────────────────┘
//! ```

pub mod abi;
pub mod address;
pub mod codec;
pub mod error;
pub mod filter;
pub mod frame;
pub mod id;
pub mod options;

pub use address::{ExtendedAddressing, IsotpAddress, IsotpSocketAddress, RawCanAddress};
pub use codec::{decode_array, encode_array, NativeStruct};
pub use error::{MarshalError, ValidationError};
pub use filter::CanFilter;
pub use frame::{CanFrame, ClassicFrame, FdFlags, FdFrame};
pub use id::CanId;
pub use options::{
    IsotpFlags, IsotpFlowControlOptions, IsotpLinkLayerOptions, IsotpOptions,
};
