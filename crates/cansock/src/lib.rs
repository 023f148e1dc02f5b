//! cansock - CAN, CAN-FD and ISO-TP channels on Linux SocketCAN
//!
//! Segmentation, reassembly and flow control for ISO-TP run in the kernel;
//! this crate configures the kernel sockets with byte-exact option
//! structures and manages their lifecycle.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Channel<P, S>                            │
//! │  Created ──bind──> Bound ──close──> Closed                  │
//! │                                                             │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────┐  │
//! │  │ SocketOption │  │ Address      │  │ map_os_error     │  │
//! │  │ (typed keys) │  │ (bind args)  │  │ (errno -> error) │  │
//! │  └──────┬───────┘  └──────┬───────┘  └──────────────────┘  │
//! │         └──── codec ──────┘                                 │
//! │                   │                                         │
//! │           ┌───────┴────────┐                                │
//! │           │ NativeSocket   │                                │
//! │           │ OsSocket/Mock  │                                │
//! │           └────────────────┘                                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use cansock::{option::isotp, IsotpAddress, IsotpChannel, IsotpFlowControlOptions};
//!
//! # fn main() -> Result<(), cansock::ChannelError> {
//! let mut channel = IsotpChannel::open()?;
//! channel.set_option(isotp::RECV_FC, IsotpFlowControlOptions::DEFAULT.with_block_size(8))?;
//! channel.bind(
//!     "vcan0",
//!     &IsotpAddress::from_id(0x7E8)?,
//!     &IsotpAddress::from_id(0x7E0)?,
//! )?;
//! channel.write(&[0x22, 0xF1, 0x90])?;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod config;
pub mod error;
pub mod native;
pub mod option;

pub use channel::{Channel, ChannelState, IsotpChannel, RawCanChannel};
pub use config::{
    load_config, parse_can_id, ConfigError, IsotpChannelConfig, RawCanChannelConfig,
};
pub use error::{map_os_error, ChannelError, ChannelResult};
pub use native::{Interest, MockBus, MockSocket, NativeSocket};
#[cfg(target_os = "linux")]
pub use native::OsSocket;
pub use option::{Isotp, Phase, Protocol, RawCan, SocketOption};

// Re-export for convenience
pub use cansock_core::{
    CanFilter, CanFrame, CanId, ClassicFrame, FdFlags, FdFrame, IsotpAddress, IsotpFlags,
    IsotpFlowControlOptions, IsotpLinkLayerOptions, IsotpOptions, MarshalError, ValidationError,
};
