//! Native socket seam
//!
//! [`NativeSocket`] is the boundary between channel logic and the OS. Every
//! method maps onto one system call and reports failures as raw
//! `std::io::Error`s; classification happens in the channel through
//! [`crate::error::map_os_error`].
//!
//! Implementations:
//! - [`OsSocket`] - kernel `AF_CAN` sockets (Linux only)
//! - [`MockSocket`] - in-memory bus for tests

pub mod mock;
#[cfg(target_os = "linux")]
mod os;

pub use mock::{MockBus, MockHandle, MockSocket};
#[cfg(target_os = "linux")]
pub use os::OsSocket;

use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

use bitflags::bitflags;

bitflags! {
    /// Readiness interest for [`NativeSocket::poll`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Interest: u8 {
        const READABLE = 0x01;
        const WRITABLE = 0x02;
        /// Error or hang-up condition; reported, never requested
        const ERROR = 0x04;
    }
}

/// One OS socket, exclusively owned
pub trait NativeSocket {
    /// Resolve an interface name to its index (`if_nametoindex`)
    fn interface_index(&self, name: &str) -> io::Result<u32>;

    /// `bind` with an encoded `sockaddr_can`
    fn bind(&mut self, addr: &[u8]) -> io::Result<()>;

    /// `setsockopt` with an encoded option value
    fn set_option(&mut self, level: i32, name: i32, value: &[u8]) -> io::Result<()>;

    /// `getsockopt` into `buf`; returns the length reported by the OS
    fn get_option(&self, level: i32, name: i32, buf: &mut [u8]) -> io::Result<usize>;

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    fn set_nonblocking(&mut self, nonblocking: bool) -> io::Result<()>;

    fn is_nonblocking(&self) -> io::Result<bool>;

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()>;

    fn read_timeout(&self) -> io::Result<Option<Duration>>;

    fn set_write_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()>;

    fn write_timeout(&self) -> io::Result<Option<Duration>>;

    /// Wait until the socket is ready for `interest`. `None` waits forever;
    /// an empty result means the timeout expired.
    fn poll(&self, interest: Interest, timeout: Option<Duration>) -> io::Result<Interest>;

    fn raw_fd(&self) -> RawFd;

    /// Release the descriptor, reporting the result of `close`
    fn close(self) -> io::Result<()>
    where
        Self: Sized;
}
