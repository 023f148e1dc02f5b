//! Integration tests for cansock
//!
//! The tests in `tests/` talk to the kernel over a virtual CAN interface.
//!
//! # Running Tests
//!
//! ```bash
//! # Set up vcan0 (requires sudo)
//! sudo modprobe vcan
//! sudo modprobe can-isotp
//! sudo ip link add dev vcan0 type vcan
//! sudo ip link set up vcan0
//!
//! # Use another interface with CANSOCK_TEST_IFACE=vcan1
//! cargo test -p cansock-tests
//! ```
//!
//! Tests print a skip notice and pass when the interface or the ISO-TP
//! protocol module is missing.

use std::path::Path;

use cansock::{CanId, IsotpAddress, IsotpChannel, ValidationError};

/// Environment variable selecting the test interface
pub const IFACE_ENV: &str = "CANSOCK_TEST_IFACE";
pub const DEFAULT_IFACE: &str = "vcan0";

/// Install a test subscriber honouring `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// The interface to test on, if it exists
pub fn test_interface() -> Option<String> {
    let iface = std::env::var(IFACE_ENV).unwrap_or_else(|_| DEFAULT_IFACE.to_string());
    if Path::new("/sys/class/net").join(&iface).exists() {
        Some(iface)
    } else {
        eprintln!("skipping: CAN interface {iface} not found (set {IFACE_ENV})");
        None
    }
}

/// Interface to test ISO-TP on, if both the interface and the protocol exist
pub fn isotp_interface() -> Option<String> {
    let iface = test_interface()?;
    match IsotpChannel::open() {
        Ok(_) => Some(iface),
        Err(e) => {
            eprintln!("skipping: ISO-TP sockets unavailable ({e})");
            None
        }
    }
}

/// Normal-addressing endpoint with a standard identifier
pub fn address(id: u16) -> Result<IsotpAddress, ValidationError> {
    Ok(IsotpAddress::new(CanId::standard(id)?))
}

/// Return from the calling test when `$check` yields no interface
#[macro_export]
macro_rules! require {
    ($check:expr) => {
        match $check {
            Some(iface) => iface,
            None => return,
        }
    };
}
