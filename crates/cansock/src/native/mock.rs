//! In-memory CAN bus for testing
//!
//! A [`MockBus`] models one host with a set of CAN interfaces. Sockets
//! created from it behave like their kernel counterparts where channel
//! logic can observe it:
//! - option storage seeded with kernel defaults
//! - ISO-TP delivery from `tx_id` to sockets bound with a matching `rx_id`
//! - raw frame fan-out honouring filters, loopback and receive-own-messages
//!
//! Reads never block: an empty queue reports `EAGAIN`.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::os::unix::io::RawFd;
use std::sync::Arc;
use std::time::Duration;

use cansock_core::abi::{self, isotp, raw, CAN_ISOTP, CAN_RAW, SOL_CAN_ISOTP, SOL_CAN_RAW};
use cansock_core::{
    decode_array, CanFilter, IsotpFlowControlOptions, IsotpLinkLayerOptions, IsotpOptions,
    IsotpSocketAddress, NativeStruct, RawCanAddress,
};
use parking_lot::Mutex;

use super::{Interest, NativeSocket};

/// Descriptor numbers handed out by the mock start here
const FIRST_FD: RawFd = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Binding {
    Raw { ifindex: u32 },
    Isotp { ifindex: u32, rx_id: u32, tx_id: u32 },
}

#[derive(Debug)]
struct Endpoint {
    protocol: i32,
    binding: Option<Binding>,
    options: HashMap<(i32, i32), Vec<u8>>,
    queue: VecDeque<Vec<u8>>,
    nonblocking: bool,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    faults: HashMap<&'static str, i32>,
    calls: Vec<&'static str>,
    closed: bool,
}

impl Endpoint {
    fn new(protocol: i32) -> Self {
        Self {
            protocol,
            binding: None,
            options: default_options(protocol),
            queue: VecDeque::new(),
            nonblocking: false,
            read_timeout: None,
            write_timeout: None,
            faults: HashMap::new(),
            calls: Vec::new(),
            closed: false,
        }
    }

    /// Record a native call and return an injected failure, if any
    fn enter(&mut self, op: &'static str) -> io::Result<()> {
        self.calls.push(op);
        match self.faults.remove(op) {
            Some(code) => Err(io::Error::from_raw_os_error(code)),
            None => Ok(()),
        }
    }

    fn flag(&self, name: i32) -> bool {
        self.options
            .get(&(SOL_CAN_RAW, name))
            .and_then(|bytes| bool::decode(bytes).ok())
            .unwrap_or(false)
    }

    fn accepts(&self, can_id: u32) -> bool {
        let filters = self
            .options
            .get(&(SOL_CAN_RAW, raw::FILTER))
            .and_then(|bytes| decode_array::<CanFilter>(bytes).ok())
            .unwrap_or_default();
        let mut hits = filters.iter().map(|filter| filter.matches(can_id));
        if self.flag(raw::JOIN_FILTERS) {
            !filters.is_empty() && hits.all(|hit| hit)
        } else {
            hits.any(|hit| hit)
        }
    }
}

fn default_options(protocol: i32) -> HashMap<(i32, i32), Vec<u8>> {
    let mut options = HashMap::new();
    if protocol == CAN_ISOTP {
        options.insert((SOL_CAN_ISOTP, isotp::OPTS), IsotpOptions::DEFAULT.encode());
        options.insert(
            (SOL_CAN_ISOTP, isotp::RECV_FC),
            IsotpFlowControlOptions::DEFAULT.encode(),
        );
        options.insert((SOL_CAN_ISOTP, isotp::TX_STMIN), 0u32.encode());
        options.insert((SOL_CAN_ISOTP, isotp::RX_STMIN), 0u32.encode());
        options.insert(
            (SOL_CAN_ISOTP, isotp::LL_OPTS),
            IsotpLinkLayerOptions::DEFAULT.encode(),
        );
    } else {
        options.insert((SOL_CAN_RAW, raw::FILTER), CanFilter::ALL.encode());
        options.insert((SOL_CAN_RAW, raw::ERR_FILTER), 0u32.encode());
        options.insert((SOL_CAN_RAW, raw::LOOPBACK), true.encode());
        options.insert((SOL_CAN_RAW, raw::RECV_OWN_MSGS), false.encode());
        options.insert((SOL_CAN_RAW, raw::FD_FRAMES), false.encode());
        options.insert((SOL_CAN_RAW, raw::JOIN_FILTERS), false.encode());
    }
    options
}

#[derive(Debug, Default)]
struct BusState {
    interfaces: Vec<(String, u32)>,
    endpoints: Vec<Endpoint>,
}

impl BusState {
    fn ifindex(&self, name: &str) -> Option<u32> {
        self.interfaces
            .iter()
            .find(|(iface, _)| iface == name)
            .map(|(_, index)| *index)
    }

    fn has_ifindex(&self, ifindex: u32) -> bool {
        self.interfaces.iter().any(|(_, index)| *index == ifindex)
    }

    fn bind(&mut self, id: usize, addr: &[u8]) -> io::Result<()> {
        let einval = || io::Error::from_raw_os_error(libc::EINVAL);
        if self.endpoints[id].binding.is_some() {
            return Err(einval());
        }
        let binding = if self.endpoints[id].protocol == CAN_ISOTP {
            let addr = IsotpSocketAddress::decode(addr).map_err(|_| einval())?;
            let binding = Binding::Isotp {
                ifindex: addr.ifindex(),
                rx_id: addr.rx_id().raw(),
                tx_id: addr.tx_id().raw(),
            };
            if !self.has_ifindex(addr.ifindex()) {
                return Err(io::Error::from_raw_os_error(libc::ENODEV));
            }
            let taken = self.endpoints.iter().any(|other| {
                matches!(other.binding, Some(Binding::Isotp { ifindex, rx_id, .. })
                    if ifindex == addr.ifindex() && rx_id == addr.rx_id().raw())
            });
            if taken {
                return Err(io::Error::from_raw_os_error(libc::EADDRINUSE));
            }
            binding
        } else {
            let addr = RawCanAddress::decode(addr).map_err(|_| einval())?;
            if addr.ifindex() != 0 && !self.has_ifindex(addr.ifindex()) {
                return Err(io::Error::from_raw_os_error(libc::ENODEV));
            }
            Binding::Raw {
                ifindex: addr.ifindex(),
            }
        };
        self.endpoints[id].binding = Some(binding);
        Ok(())
    }

    fn write(&mut self, id: usize, buf: &[u8]) -> io::Result<usize> {
        match self.endpoints[id].binding {
            Some(Binding::Isotp { ifindex, tx_id, .. }) => {
                if buf.is_empty() {
                    return Err(io::Error::from_raw_os_error(libc::EINVAL));
                }
                for peer in self.endpoints.iter_mut() {
                    if matches!(peer.binding, Some(Binding::Isotp { ifindex: i, rx_id, .. })
                        if i == ifindex && rx_id == tx_id)
                    {
                        peer.queue.push_back(buf.to_vec());
                    }
                }
                Ok(buf.len())
            }
            Some(Binding::Raw { ifindex }) => {
                let sender = &self.endpoints[id];
                let fd_frame = match buf.len() {
                    n if n == usize::from(abi::CAN_MTU) => false,
                    n if n == usize::from(abi::CANFD_MTU) && sender.flag(raw::FD_FRAMES) => true,
                    _ => return Err(io::Error::from_raw_os_error(libc::EINVAL)),
                };
                // Transmitting on "any" interface is not possible
                if ifindex == 0 {
                    return Err(io::Error::from_raw_os_error(libc::ENXIO));
                }
                let loopback = sender.flag(raw::LOOPBACK);
                let can_id = u32::decode_from(&buf[..4]);
                for (index, peer) in self.endpoints.iter_mut().enumerate() {
                    let Some(Binding::Raw { ifindex: i }) = peer.binding else {
                        continue;
                    };
                    let own = index == id;
                    let wanted = if own {
                        loopback && peer.flag(raw::RECV_OWN_MSGS)
                    } else {
                        loopback
                    };
                    if wanted
                        && (i == 0 || i == ifindex)
                        && (!fd_frame || peer.flag(raw::FD_FRAMES))
                        && peer.accepts(can_id)
                    {
                        peer.queue.push_back(buf.to_vec());
                    }
                }
                Ok(buf.len())
            }
            None => Err(io::Error::from_raw_os_error(libc::ENOTCONN)),
        }
    }
}

/// Shared in-memory bus; cloning yields another handle to the same bus
#[derive(Debug, Clone)]
pub struct MockBus {
    state: Arc<Mutex<BusState>>,
}

impl Default for MockBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBus {
    /// A bus with a single interface, `vcan0` (index 1)
    pub fn new() -> Self {
        Self::with_interfaces(&["vcan0"])
    }

    /// A bus with the given interfaces, indexed from 1
    pub fn with_interfaces(names: &[&str]) -> Self {
        let interfaces = names
            .iter()
            .zip(1u32..)
            .map(|(name, index)| (name.to_string(), index))
            .collect();
        Self {
            state: Arc::new(Mutex::new(BusState {
                interfaces,
                endpoints: Vec::new(),
            })),
        }
    }

    pub fn isotp_socket(&self) -> MockSocket {
        self.socket(CAN_ISOTP)
    }

    pub fn raw_socket(&self) -> MockSocket {
        self.socket(CAN_RAW)
    }

    fn socket(&self, protocol: i32) -> MockSocket {
        let mut state = self.state.lock();
        state.endpoints.push(Endpoint::new(protocol));
        MockSocket {
            bus: self.clone(),
            id: state.endpoints.len() - 1,
        }
    }
}

/// A socket on a [`MockBus`]
#[derive(Debug)]
pub struct MockSocket {
    bus: MockBus,
    id: usize,
}

impl MockSocket {
    /// Inspection handle that stays valid after the socket is moved or closed
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            bus: self.bus.clone(),
            id: self.id,
        }
    }

    fn with<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(&mut BusState, usize) -> io::Result<T>,
    ) -> io::Result<T> {
        let mut state = self.bus.state.lock();
        state.endpoints[self.id].enter(op)?;
        f(&mut *state, self.id)
    }
}

impl NativeSocket for MockSocket {
    fn interface_index(&self, name: &str) -> io::Result<u32> {
        self.with("if_nametoindex", |state, _| {
            state
                .ifindex(name)
                .ok_or_else(|| io::Error::from_raw_os_error(libc::ENODEV))
        })
    }

    fn bind(&mut self, addr: &[u8]) -> io::Result<()> {
        self.with("bind", |state, id| state.bind(id, addr))
    }

    fn set_option(&mut self, level: i32, name: i32, value: &[u8]) -> io::Result<()> {
        self.with("setsockopt", |state, id| {
            let endpoint = &mut state.endpoints[id];
            if !endpoint.options.contains_key(&(level, name)) {
                return Err(io::Error::from_raw_os_error(libc::ENOPROTOOPT));
            }
            endpoint.options.insert((level, name), value.to_vec());
            Ok(())
        })
    }

    fn get_option(&self, level: i32, name: i32, buf: &mut [u8]) -> io::Result<usize> {
        self.with("getsockopt", |state, id| {
            let stored = state.endpoints[id]
                .options
                .get(&(level, name))
                .ok_or_else(|| io::Error::from_raw_os_error(libc::ENOPROTOOPT))?;
            let len = stored.len().min(buf.len());
            buf[..len].copy_from_slice(&stored[..len]);
            Ok(len)
        })
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.with("read", |state, id| {
            let endpoint = &mut state.endpoints[id];
            if endpoint.binding.is_none() {
                return Err(io::Error::from_raw_os_error(libc::ENOTCONN));
            }
            let msg = endpoint
                .queue
                .pop_front()
                .ok_or_else(|| io::Error::from_raw_os_error(libc::EAGAIN))?;
            let len = msg.len().min(buf.len());
            buf[..len].copy_from_slice(&msg[..len]);
            Ok(len)
        })
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.with("write", |state, id| state.write(id, buf))
    }

    fn set_nonblocking(&mut self, nonblocking: bool) -> io::Result<()> {
        self.with("fcntl", |state, id| {
            state.endpoints[id].nonblocking = nonblocking;
            Ok(())
        })
    }

    fn is_nonblocking(&self) -> io::Result<bool> {
        self.with("fcntl", |state, id| Ok(state.endpoints[id].nonblocking))
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.with("setsockopt", |state, id| {
            state.endpoints[id].read_timeout = timeout;
            Ok(())
        })
    }

    fn read_timeout(&self) -> io::Result<Option<Duration>> {
        self.with("getsockopt", |state, id| Ok(state.endpoints[id].read_timeout))
    }

    fn set_write_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.with("setsockopt", |state, id| {
            state.endpoints[id].write_timeout = timeout;
            Ok(())
        })
    }

    fn write_timeout(&self) -> io::Result<Option<Duration>> {
        self.with("getsockopt", |state, id| Ok(state.endpoints[id].write_timeout))
    }

    fn poll(&self, interest: Interest, _timeout: Option<Duration>) -> io::Result<Interest> {
        self.with("poll", |state, id| {
            let endpoint = &state.endpoints[id];
            let mut ready = Interest::WRITABLE;
            if !endpoint.queue.is_empty() {
                ready |= Interest::READABLE;
            }
            Ok(ready & interest)
        })
    }

    fn raw_fd(&self) -> RawFd {
        FIRST_FD + self.id as RawFd
    }

    fn close(self) -> io::Result<()> {
        let mut state = self.bus.state.lock();
        let endpoint = &mut state.endpoints[self.id];
        endpoint.closed = true;
        endpoint.binding = None;
        endpoint.queue.clear();
        endpoint.enter("close")
    }
}

/// Test-side view of a [`MockSocket`]
#[derive(Debug, Clone)]
pub struct MockHandle {
    bus: MockBus,
    id: usize,
}

impl MockHandle {
    /// Fail the next call of native operation `op` with `errno`
    pub fn fail_next(&self, op: &'static str, errno: i32) {
        self.bus.state.lock().endpoints[self.id]
            .faults
            .insert(op, errno);
    }

    /// Replace a stored option value verbatim, bypassing any checks
    pub fn store_option(&self, level: i32, name: i32, value: &[u8]) {
        self.bus.state.lock().endpoints[self.id]
            .options
            .insert((level, name), value.to_vec());
    }

    /// Stored option bytes, as the kernel would report them
    pub fn option(&self, level: i32, name: i32) -> Option<Vec<u8>> {
        self.bus.state.lock().endpoints[self.id]
            .options
            .get(&(level, name))
            .cloned()
    }

    /// Native operations issued so far, in order
    pub fn calls(&self) -> Vec<&'static str> {
        self.bus.state.lock().endpoints[self.id].calls.clone()
    }

    pub fn call_count(&self, op: &str) -> usize {
        self.bus.state.lock().endpoints[self.id]
            .calls
            .iter()
            .filter(|call| **call == op)
            .count()
    }

    pub fn is_bound(&self) -> bool {
        self.bus.state.lock().endpoints[self.id].binding.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.bus.state.lock().endpoints[self.id].closed
    }

    /// Queue an incoming message as if received from the bus
    pub fn inject(&self, data: &[u8]) {
        self.bus.state.lock().endpoints[self.id]
            .queue
            .push_back(data.to_vec());
    }

    pub fn pending(&self) -> usize {
        self.bus.state.lock().endpoints[self.id].queue.len()
    }
}
