//! Kernel `AF_CAN` sockets

use std::ffi::CString;
use std::io::{self, Read, Write};
use std::os::unix::io::{AsRawFd, IntoRawFd, RawFd};
use std::time::Duration;

use socket2::{Domain, Protocol as SockProtocol, Socket, Type};

use super::{Interest, NativeSocket};

/// A kernel CAN socket
#[derive(Debug)]
pub struct OsSocket {
    socket: Socket,
}

impl OsSocket {
    /// Create an `AF_CAN` socket (`SOCK_RAW` + `CAN_RAW`, `SOCK_DGRAM` + `CAN_ISOTP`)
    pub fn open(sock_type: i32, protocol: i32) -> io::Result<Self> {
        let socket = Socket::new(
            Domain::from(libc::AF_CAN),
            Type::from(sock_type),
            Some(SockProtocol::from(protocol)),
        )?;
        Ok(Self { socket })
    }

    fn fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }
}

impl NativeSocket for OsSocket {
    fn interface_index(&self, name: &str) -> io::Result<u32> {
        let c_name = CString::new(name).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "interface name contains NUL")
        })?;
        let index = unsafe { libc::if_nametoindex(c_name.as_ptr()) };
        if index == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(index)
    }

    fn bind(&mut self, addr: &[u8]) -> io::Result<()> {
        let res = unsafe {
            libc::bind(
                self.fd(),
                addr.as_ptr().cast::<libc::sockaddr>(),
                addr.len() as libc::socklen_t,
            )
        };
        if res < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn set_option(&mut self, level: i32, name: i32, value: &[u8]) -> io::Result<()> {
        let res = unsafe {
            libc::setsockopt(
                self.fd(),
                level,
                name,
                value.as_ptr().cast::<libc::c_void>(),
                value.len() as libc::socklen_t,
            )
        };
        if res < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn get_option(&self, level: i32, name: i32, buf: &mut [u8]) -> io::Result<usize> {
        let mut len = buf.len() as libc::socklen_t;
        let res = unsafe {
            libc::getsockopt(
                self.fd(),
                level,
                name,
                buf.as_mut_ptr().cast::<libc::c_void>(),
                &mut len,
            )
        };
        if res < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(len as usize)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.socket.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.socket.write(buf)
    }

    fn set_nonblocking(&mut self, nonblocking: bool) -> io::Result<()> {
        self.socket.set_nonblocking(nonblocking)
    }

    fn is_nonblocking(&self) -> io::Result<bool> {
        let flags = unsafe { libc::fcntl(self.fd(), libc::F_GETFL) };
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(flags & libc::O_NONBLOCK != 0)
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.socket.set_read_timeout(timeout)
    }

    fn read_timeout(&self) -> io::Result<Option<Duration>> {
        self.socket.read_timeout()
    }

    fn set_write_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.socket.set_write_timeout(timeout)
    }

    fn write_timeout(&self) -> io::Result<Option<Duration>> {
        self.socket.write_timeout()
    }

    fn poll(&self, interest: Interest, timeout: Option<Duration>) -> io::Result<Interest> {
        let mut events = 0;
        if interest.contains(Interest::READABLE) {
            events |= libc::POLLIN;
        }
        if interest.contains(Interest::WRITABLE) {
            events |= libc::POLLOUT;
        }
        let mut fds = libc::pollfd {
            fd: self.fd(),
            events,
            revents: 0,
        };
        let timeout_ms = timeout.map_or(-1, duration_to_poll_timeout);
        loop {
            let res = unsafe { libc::poll(&mut fds, 1, timeout_ms) };
            if res >= 0 {
                break;
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }

        let mut ready = Interest::empty();
        if fds.revents & libc::POLLIN != 0 {
            ready |= Interest::READABLE;
        }
        if fds.revents & libc::POLLOUT != 0 {
            ready |= Interest::WRITABLE;
        }
        if fds.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
            ready |= Interest::ERROR;
        }
        Ok(ready)
    }

    fn raw_fd(&self) -> RawFd {
        self.fd()
    }

    fn close(self) -> io::Result<()> {
        let fd = self.socket.into_raw_fd();
        if unsafe { libc::close(fd) } < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

/// Round up so that a sub-millisecond timeout does not turn into a busy poll
fn duration_to_poll_timeout(timeout: Duration) -> i32 {
    let mut ms = timeout.as_millis();
    if Duration::from_millis(ms as u64) < timeout {
        ms += 1;
    }
    i32::try_from(ms).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_timeout_rounding() {
        assert_eq!(duration_to_poll_timeout(Duration::ZERO), 0);
        assert_eq!(duration_to_poll_timeout(Duration::from_micros(10)), 1);
        assert_eq!(duration_to_poll_timeout(Duration::from_millis(250)), 250);
        assert_eq!(duration_to_poll_timeout(Duration::from_secs(u64::MAX / 2)), i32::MAX);
    }
}
