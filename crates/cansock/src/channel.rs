//! Channel lifecycle
//!
//! ```text
//! Created --bind--> Bound --close--> Closed
//!    |                                  ^
//!    +------------------close-----------+
//! ```
//!
//! A channel owns exactly one socket. `Closed` is terminal: every operation
//! after `close` fails with [`ChannelError::ChannelClosed`], while `close`
//! itself may be repeated. Dropping an open channel closes it.

use std::fmt;
use std::marker::PhantomData;
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::Duration;

use cansock_core::abi::{CANFD_MTU, CAN_MTU};
use cansock_core::{
    CanFrame, ExtendedAddressing, IsotpAddress, IsotpSocketAddress, MarshalError, NativeStruct,
    RawCanAddress,
};

use crate::error::{map_os_error, ChannelError, ChannelResult};
use crate::native::{Interest, NativeSocket};
use crate::option::{isotp, Isotp, OptionValue, Phase, Protocol, RawCan, SocketOption};

#[cfg(target_os = "linux")]
use crate::native::OsSocket;

/// Lifecycle state of a [`Channel`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Created,
    Bound,
    Closed,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Bound => write!(f, "bound"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// A CAN socket of protocol `P` on native socket `S`
pub struct Channel<P: Protocol, S: NativeSocket> {
    /// `None` once closed
    socket: Option<S>,
    bound: bool,
    interface: Option<String>,
    _protocol: PhantomData<P>,
}

/// ISO-TP channel on a kernel socket
#[cfg(target_os = "linux")]
pub type IsotpChannel<S = OsSocket> = Channel<Isotp, S>;
/// Raw CAN channel on a kernel socket
#[cfg(target_os = "linux")]
pub type RawCanChannel<S = OsSocket> = Channel<RawCan, S>;

#[cfg(not(target_os = "linux"))]
pub type IsotpChannel<S> = Channel<Isotp, S>;
#[cfg(not(target_os = "linux"))]
pub type RawCanChannel<S> = Channel<RawCan, S>;

#[cfg(target_os = "linux")]
impl<P: Protocol> Channel<P, OsSocket> {
    /// Open a new kernel socket
    pub fn open() -> ChannelResult<Self> {
        let socket =
            OsSocket::open(P::SOCK_TYPE, P::PROTOCOL).map_err(|e| map_os_error("socket", e))?;
        Ok(Self::from_socket(socket))
    }
}

impl<P: Protocol, S: NativeSocket> Channel<P, S> {
    /// Wrap a freshly created, unbound socket
    pub fn from_socket(socket: S) -> Self {
        tracing::debug!(
            protocol = P::NAME,
            fd = socket.raw_fd(),
            "Opened CAN socket"
        );
        Self {
            socket: Some(socket),
            bound: false,
            interface: None,
            _protocol: PhantomData,
        }
    }

    pub fn state(&self) -> ChannelState {
        match (&self.socket, self.bound) {
            (None, _) => ChannelState::Closed,
            (Some(_), false) => ChannelState::Created,
            (Some(_), true) => ChannelState::Bound,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.socket.is_none()
    }

    /// Interface the channel is bound to
    pub fn interface(&self) -> Option<&str> {
        self.interface.as_deref()
    }

    fn socket(&self) -> ChannelResult<&S> {
        self.socket.as_ref().ok_or(ChannelError::ChannelClosed)
    }

    fn socket_mut(&mut self) -> ChannelResult<&mut S> {
        self.socket.as_mut().ok_or(ChannelError::ChannelClosed)
    }

    fn bound_socket_mut(&mut self) -> ChannelResult<&mut S> {
        let bound = self.bound;
        let socket = self.socket_mut()?;
        if !bound {
            return Err(ChannelError::NotBound);
        }
        Ok(socket)
    }

    fn ensure_unbound(&self) -> ChannelResult<()> {
        self.socket()?;
        if self.bound {
            return Err(ChannelError::AlreadyBound);
        }
        Ok(())
    }

    fn resolve_interface(&self, interface: &str) -> ChannelResult<u32> {
        self.socket()?
            .interface_index(interface)
            .map_err(|e| map_os_error("if_nametoindex", e))
    }

    fn bind_native(&mut self, interface: &str, ifindex: u32, addr: &[u8]) -> ChannelResult<()> {
        self.socket_mut()?
            .bind(addr)
            .map_err(|e| map_os_error("bind", e))?;
        self.bound = true;
        self.interface = Some(interface.to_string());
        tracing::debug!(
            protocol = P::NAME,
            interface,
            ifindex,
            fd = self.as_raw_fd(),
            "Bound CAN socket"
        );
        Ok(())
    }

    /// Read a socket option
    pub fn get_option<T: OptionValue>(&self, option: SocketOption<P, T>) -> ChannelResult<T> {
        let socket = self.socket()?;
        let mut buf = vec![0u8; T::CAPACITY];
        let len = socket
            .get_option(option.level(), option.name(), &mut buf)
            .map_err(|e| map_os_error("getsockopt", e))?;
        Ok(T::from_bytes(&buf[..len.min(buf.len())])?)
    }

    /// Change a socket option.
    ///
    /// Options that the kernel only accepts before bind fail with
    /// [`ChannelError::AlreadyBound`] on a bound channel.
    pub fn set_option<T: OptionValue>(
        &mut self,
        option: SocketOption<P, T>,
        value: T,
    ) -> ChannelResult<()> {
        self.socket()?;
        if option.phase() == Phase::PreBind && self.bound {
            return Err(ChannelError::AlreadyBound);
        }
        value.validate(option.label())?;
        let bytes = value.to_bytes();
        let fd = self.as_raw_fd();
        self.socket_mut()?
            .set_option(option.level(), option.name(), &bytes)
            .map_err(|e| map_os_error("setsockopt", e))?;
        tracing::debug!(
            protocol = P::NAME,
            option = option.label(),
            value = ?value,
            fd,
            "Set socket option"
        );
        Ok(())
    }

    /// Receive into `buf`; returns the number of bytes received
    pub fn read(&mut self, buf: &mut [u8]) -> ChannelResult<usize> {
        let len = self
            .bound_socket_mut()?
            .read(buf)
            .map_err(|e| map_os_error("read", e))?;
        tracing::trace!(protocol = P::NAME, data = %hex::encode(&buf[..len]), "Read");
        Ok(len)
    }

    /// Send `buf`; returns the number of bytes accepted
    pub fn write(&mut self, buf: &[u8]) -> ChannelResult<usize> {
        let len = self
            .bound_socket_mut()?
            .write(buf)
            .map_err(|e| map_os_error("write", e))?;
        tracing::trace!(protocol = P::NAME, data = %hex::encode(buf), written = len, "Write");
        Ok(len)
    }

    pub fn set_blocking(&mut self, blocking: bool) -> ChannelResult<()> {
        self.socket_mut()?
            .set_nonblocking(!blocking)
            .map_err(|e| map_os_error("fcntl", e))
    }

    pub fn is_blocking(&self) -> ChannelResult<bool> {
        self.socket()?
            .is_nonblocking()
            .map(|nonblocking| !nonblocking)
            .map_err(|e| map_os_error("fcntl", e))
    }

    /// Timeout for blocking reads (`SO_RCVTIMEO`); `None` waits forever
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) -> ChannelResult<()> {
        self.socket_mut()?
            .set_read_timeout(timeout)
            .map_err(|e| map_os_error("setsockopt", e))
    }

    pub fn read_timeout(&self) -> ChannelResult<Option<Duration>> {
        self.socket()?
            .read_timeout()
            .map_err(|e| map_os_error("getsockopt", e))
    }

    /// Timeout for blocking writes (`SO_SNDTIMEO`); `None` waits forever
    pub fn set_write_timeout(&mut self, timeout: Option<Duration>) -> ChannelResult<()> {
        self.socket_mut()?
            .set_write_timeout(timeout)
            .map_err(|e| map_os_error("setsockopt", e))
    }

    pub fn write_timeout(&self) -> ChannelResult<Option<Duration>> {
        self.socket()?
            .write_timeout()
            .map_err(|e| map_os_error("getsockopt", e))
    }

    /// Wait for readiness. An empty result means the timeout expired.
    pub fn poll(&self, interest: Interest, timeout: Option<Duration>) -> ChannelResult<Interest> {
        self.socket()?
            .poll(interest, timeout)
            .map_err(|e| map_os_error("poll", e))
    }

    /// Release the socket. Closing a closed channel does nothing.
    pub fn close(&mut self) -> ChannelResult<()> {
        let Some(socket) = self.socket.take() else {
            return Ok(());
        };
        let fd = socket.raw_fd();
        let state = if self.bound {
            ChannelState::Bound
        } else {
            ChannelState::Created
        };
        self.bound = false;
        socket.close().map_err(|e| map_os_error("close", e))?;
        tracing::debug!(protocol = P::NAME, fd, from = %state, "Closed CAN socket");
        Ok(())
    }
}

impl<S: NativeSocket> Channel<Isotp, S> {
    /// Bind to `interface`, receiving on `local` and transmitting to `remote`.
    ///
    /// With extended addressing the address bytes are merged into the
    /// socket's ISO-TP options first; a normal-addressing pair clears them.
    /// If the bind fails the previous options are restored.
    pub fn bind(
        &mut self,
        interface: &str,
        local: &IsotpAddress,
        remote: &IsotpAddress,
    ) -> ChannelResult<()> {
        self.ensure_unbound()?;
        let addressing = ExtendedAddressing::of_pair(local, remote)?;
        let ifindex = self.resolve_interface(interface)?;
        let addr = IsotpSocketAddress::for_pair(ifindex, local, remote)?;

        let previous = self.get_option(isotp::OPTS)?;
        let opts = match addressing {
            Some(addressing) => addressing.apply(previous),
            None => previous.without_extended_address(),
        };
        if opts != previous {
            self.set_option(isotp::OPTS, opts)?;
        }

        tracing::debug!(local = %local, remote = %remote, "Binding ISO-TP socket");
        let result = self.bind_native(interface, ifindex, &addr.encode());
        if result.is_err() && opts != previous {
            if let Err(e) = self.set_option(isotp::OPTS, previous) {
                tracing::warn!(error = %e, "Failed to restore ISO-TP options after bind");
            }
        }
        result
    }
}

impl<S: NativeSocket> Channel<RawCan, S> {
    /// Bind to `interface`
    pub fn bind(&mut self, interface: &str) -> ChannelResult<()> {
        self.ensure_unbound()?;
        let ifindex = self.resolve_interface(interface)?;
        self.bind_native(interface, ifindex, &RawCanAddress::new(ifindex).encode())
    }

    /// Bind to every CAN interface. Frames can be received but not sent.
    pub fn bind_any(&mut self) -> ChannelResult<()> {
        self.ensure_unbound()?;
        self.bind_native("any", 0, &RawCanAddress::any().encode())
    }

    /// Receive one classic or FD frame
    pub fn read_frame(&mut self) -> ChannelResult<CanFrame> {
        let mut buf = [0u8; CANFD_MTU as usize];
        let len = self.read(&mut buf)?;
        Ok(CanFrame::decode(&buf[..len])?)
    }

    /// Send one frame. FD frames need `raw::FD_FRAMES` enabled.
    pub fn write_frame(&mut self, frame: &CanFrame) -> ChannelResult<()> {
        let bytes = frame.encode();
        let len = self.write(&bytes)?;
        if len != bytes.len() {
            let expected = if frame.is_fd() { CANFD_MTU } else { CAN_MTU };
            return Err(MarshalError::Length {
                structure: "written frame",
                expected: usize::from(expected),
                actual: len,
            }
            .into());
        }
        Ok(())
    }
}

impl<P: Protocol, S: NativeSocket> AsRawFd for Channel<P, S> {
    /// The socket descriptor, or -1 once closed
    fn as_raw_fd(&self) -> RawFd {
        self.socket.as_ref().map_or(-1, |socket| socket.raw_fd())
    }
}

impl<P: Protocol, S: NativeSocket> fmt::Debug for Channel<P, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("protocol", &P::NAME)
            .field("state", &self.state())
            .field("interface", &self.interface)
            .field("fd", &self.as_raw_fd())
            .finish()
    }
}

impl<P: Protocol, S: NativeSocket> Drop for Channel<P, S> {
    fn drop(&mut self) {
        let fd = self.as_raw_fd();
        if let Err(e) = self.close() {
            tracing::warn!(protocol = P::NAME, fd, error = %e, "Failed to close CAN socket");
        }
    }
}
