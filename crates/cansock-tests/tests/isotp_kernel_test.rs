//! ISO-TP channels against the kernel
//!
//! Run with: cargo test -p cansock-tests --test isotp_kernel_test

use std::time::Duration;

use cansock::option::isotp;
use cansock::{
    ChannelError, ChannelState, FdFlags, IsotpChannel, IsotpFlags, IsotpFlowControlOptions,
    IsotpLinkLayerOptions, IsotpOptions,
};
use cansock_tests::{address, init_tracing, isotp_interface, require};
use pretty_assertions::assert_eq;

// =============================================================================
// Options
// =============================================================================

#[test]
#[serial_test::serial]
fn test_fresh_channel_reports_kernel_defaults() {
    init_tracing();
    let _iface = require!(isotp_interface());

    let channel = IsotpChannel::open().unwrap();
    assert_eq!(channel.get_option(isotp::OPTS).unwrap(), IsotpOptions::DEFAULT);
    assert_eq!(
        channel.get_option(isotp::RECV_FC).unwrap(),
        IsotpFlowControlOptions::DEFAULT
    );
    assert_eq!(
        channel.get_option(isotp::LL_OPTS).unwrap(),
        IsotpLinkLayerOptions::DEFAULT
    );
    assert_eq!(channel.get_option(isotp::TX_STMIN).unwrap(), 0);
    assert_eq!(channel.get_option(isotp::RX_STMIN).unwrap(), 0);
}

#[test]
#[serial_test::serial]
fn test_option_round_trips() {
    init_tracing();
    let _iface = require!(isotp_interface());

    let mut channel = IsotpChannel::open().unwrap();

    let opts = IsotpOptions::DEFAULT
        .with_padding(0xAA)
        .with_flag(IsotpFlags::WAIT_TX_DONE)
        .unwrap();
    channel.set_option(isotp::OPTS, opts).unwrap();
    assert_eq!(channel.get_option(isotp::OPTS).unwrap(), opts);

    let fc = IsotpFlowControlOptions::DEFAULT.with_block_size(1);
    channel.set_option(isotp::RECV_FC, fc).unwrap();
    assert_eq!(channel.get_option(isotp::RECV_FC).unwrap(), fc);

    let ll = IsotpLinkLayerOptions::can_fd(64, FdFlags::BRS).unwrap();
    channel.set_option(isotp::LL_OPTS, ll).unwrap();
    assert_eq!(channel.get_option(isotp::LL_OPTS).unwrap(), ll);

    channel.set_option(isotp::TX_STMIN, 100).unwrap();
    channel.set_option(isotp::RX_STMIN, 100).unwrap();
    assert_eq!(channel.get_option(isotp::TX_STMIN).unwrap(), 100);
    assert_eq!(channel.get_option(isotp::RX_STMIN).unwrap(), 100);
}

#[test]
#[serial_test::serial]
fn test_options_refused_after_bind() {
    init_tracing();
    let iface = require!(isotp_interface());

    let mut channel = IsotpChannel::open().unwrap();
    channel
        .bind(&iface, &address(0x7E8).unwrap(), &address(0x7E0).unwrap())
        .unwrap();
    let err = channel
        .set_option(isotp::RECV_FC, IsotpFlowControlOptions::DEFAULT)
        .unwrap_err();
    assert!(matches!(err, ChannelError::AlreadyBound));
}

// =============================================================================
// Transfer
// =============================================================================

#[test]
#[serial_test::serial]
fn test_symmetric_transfer() {
    init_tracing();
    let iface = require!(isotp_interface());

    let mut a = IsotpChannel::open().unwrap();
    let mut b = IsotpChannel::open().unwrap();
    a.bind(&iface, &address(0x7DF).unwrap(), &address(0x7E0).unwrap()).unwrap();
    b.bind(&iface, &address(0x7E0).unwrap(), &address(0x7DF).unwrap()).unwrap();
    b.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

    let written = a.write(&[1, 2, 3, 4]).unwrap();
    let mut buf = [0u8; 64];
    let read = b.read(&mut buf).unwrap();
    assert_eq!(written, read);
    assert_eq!(&buf[..read], &[1, 2, 3, 4]);
}

#[test]
#[serial_test::serial]
fn test_multi_frame_transfer_with_flow_control() {
    init_tracing();
    let iface = require!(isotp_interface());

    let mut a = IsotpChannel::open().unwrap();
    let mut b = IsotpChannel::open().unwrap();
    let padded = IsotpOptions::DEFAULT.with_padding(0xAA);
    a.set_option(isotp::OPTS, padded).unwrap();
    b.set_option(isotp::OPTS, padded).unwrap();
    b.set_option(
        isotp::RECV_FC,
        IsotpFlowControlOptions::DEFAULT.with_block_size(1),
    )
    .unwrap();
    a.bind(&iface, &address(0x7DF).unwrap(), &address(0x7E0).unwrap()).unwrap();
    b.bind(&iface, &address(0x7E0).unwrap(), &address(0x7DF).unwrap()).unwrap();
    b.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

    let payload: Vec<u8> = (0..=200u8).collect();
    assert_eq!(a.write(&payload).unwrap(), payload.len());
    let mut buf = [0u8; 4096];
    let read = b.read(&mut buf).unwrap();
    assert_eq!(&buf[..read], payload.as_slice());
}

#[test]
#[serial_test::serial]
fn test_nonblocking_read_would_block() {
    init_tracing();
    let iface = require!(isotp_interface());

    let mut channel = IsotpChannel::open().unwrap();
    channel
        .bind(&iface, &address(0x7E8).unwrap(), &address(0x7E0).unwrap())
        .unwrap();
    channel.set_blocking(false).unwrap();
    assert!(!channel.is_blocking().unwrap());

    let mut buf = [0u8; 8];
    let err = channel.read(&mut buf).unwrap_err();
    assert!(err.is_would_block(), "unexpected error: {err}");
}

// =============================================================================
// Lifecycle
// =============================================================================

#[test]
#[serial_test::serial]
fn test_lifecycle() {
    init_tracing();
    let iface = require!(isotp_interface());

    let mut channel = IsotpChannel::open().unwrap();
    assert_eq!(channel.state(), ChannelState::Created);
    channel
        .bind(&iface, &address(0x7E8).unwrap(), &address(0x7E0).unwrap())
        .unwrap();
    assert!(matches!(
        channel.bind(&iface, &address(0x7E8).unwrap(), &address(0x7E0).unwrap()),
        Err(ChannelError::AlreadyBound)
    ));

    channel.close().unwrap();
    channel.close().unwrap();
    let mut buf = [0u8; 8];
    assert!(matches!(
        channel.read(&mut buf),
        Err(ChannelError::ChannelClosed)
    ));
}

#[test]
#[serial_test::serial]
fn test_unknown_interface() {
    init_tracing();
    let _iface = require!(isotp_interface());

    let mut channel = IsotpChannel::open().unwrap();
    let err = channel
        .bind("cansock-none", &address(0x7E8).unwrap(), &address(0x7E0).unwrap())
        .unwrap_err();
    assert!(
        matches!(err, ChannelError::InterfaceNotFound { .. }),
        "unexpected error: {err}"
    );
}
