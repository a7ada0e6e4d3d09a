use std::cell::RefCell;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::rc::Rc;

use super::*;

pub(crate) const RESOLVE_ERROR: i32 = 11001;

#[derive(Debug, Clone)]
pub(crate) struct SentPacket {
    pub(crate) local: SocketAddr,
    pub(crate) remote: SocketAddr,
    pub(crate) data: Vec<u8>,
    pub(crate) options: PacketOptions,
}

#[derive(Debug)]
pub(crate) struct FakeSocketState {
    pub(crate) local: SocketAddr,
    pub(crate) state: SocketState,
    pub(crate) options: HashMap<SocketOption, i32>,
}

/// Shared state behind the fake sockets and resolvers a test hands out.
#[derive(Default, Debug)]
pub(crate) struct FakeNetwork {
    pub(crate) sockets: Vec<FakeSocketState>,
    pub(crate) sent: Vec<SentPacket>,
    pub(crate) resolutions: HashMap<String, Vec<IpAddr>>,
    pub(crate) resolve_starts: Vec<CandidateAddress>,
    pub(crate) resolvers_destroyed: usize,
    pub(crate) fail_socket_creation: bool,
    pub(crate) fail_resolver_creation: bool,
    pub(crate) bind_later: bool,
    pub(crate) send_error: Option<i32>,
    pub(crate) next_port: u16,
}

impl FakeNetwork {
    pub(crate) fn bind_all(&mut self) {
        for socket in self.sockets.iter_mut() {
            if socket.state == SocketState::Binding {
                socket.state = SocketState::Bound;
            }
        }
    }

    pub(crate) fn take_sent(&mut self) -> Vec<SentPacket> {
        std::mem::take(&mut self.sent)
    }
}

pub(crate) type SharedNetwork = Rc<RefCell<FakeNetwork>>;

pub(crate) struct FakeSocket {
    net: SharedNetwork,
    index: usize,
    last_error: i32,
}

impl PacketSocket for FakeSocket {
    fn local_address(&self) -> Option<SocketAddr> {
        let net = self.net.borrow();
        let socket = &net.sockets[self.index];
        (socket.state == SocketState::Bound).then_some(socket.local)
    }

    fn state(&self) -> SocketState {
        self.net.borrow().sockets[self.index].state
    }

    fn send_to(
        &mut self,
        data: &[u8],
        remote: SocketAddr,
        options: &PacketOptions,
    ) -> Result<usize> {
        let mut net = self.net.borrow_mut();
        if let Some(code) = net.send_error {
            self.last_error = code;
            return Err(Error::ErrSocketSend(code));
        }
        let local = net.sockets[self.index].local;
        net.sent.push(SentPacket {
            local,
            remote,
            data: data.to_vec(),
            options: *options,
        });
        Ok(data.len())
    }

    fn set_option(&mut self, option: SocketOption, value: i32) -> Result<()> {
        self.net.borrow_mut().sockets[self.index]
            .options
            .insert(option, value);
        Ok(())
    }

    fn get_option(&self, option: SocketOption) -> Result<i32> {
        self.net.borrow().sockets[self.index]
            .options
            .get(&option)
            .copied()
            .ok_or_else(|| Error::ErrSocketOptionNotSupported(option.to_string()))
    }

    fn last_error(&self) -> i32 {
        self.last_error
    }

    fn close(&mut self) -> Result<()> {
        self.net.borrow_mut().sockets[self.index].state = SocketState::Closed;
        Ok(())
    }
}

pub(crate) struct FakeResolver {
    net: SharedNetwork,
    address: Option<CandidateAddress>,
}

impl AsyncResolver for FakeResolver {
    fn start(&mut self, address: &CandidateAddress) {
        self.net.borrow_mut().resolve_starts.push(address.clone());
        self.address = Some(address.clone());
    }

    fn error(&self) -> i32 {
        let Some(address) = &self.address else {
            return RESOLVE_ERROR;
        };
        match self.net.borrow().resolutions.get(address.hostname()) {
            Some(ips) if !ips.is_empty() => 0,
            _ => RESOLVE_ERROR,
        }
    }

    fn resolved_address(&self, family: AddressFamily) -> Option<SocketAddr> {
        let address = self.address.as_ref()?;
        let net = self.net.borrow();
        net.resolutions
            .get(address.hostname())?
            .iter()
            .find(|ip| AddressFamily::of(ip) == family)
            .map(|ip| SocketAddr::new(*ip, address.port()))
    }

    fn destroy(&mut self) {
        self.net.borrow_mut().resolvers_destroyed += 1;
    }
}

pub(crate) struct FakeSocketFactory {
    pub(crate) net: SharedNetwork,
}

impl FakeSocketFactory {
    pub(crate) fn new() -> Self {
        FakeSocketFactory {
            net: Rc::new(RefCell::new(FakeNetwork {
                next_port: 50000,
                ..Default::default()
            })),
        }
    }

    /// add_socket hands out a bound socket outside of any factory call, the
    /// way a shared socket arrives.
    pub(crate) fn add_socket(&self, local: SocketAddr) -> Box<dyn PacketSocket> {
        let mut net = self.net.borrow_mut();
        net.sockets.push(FakeSocketState {
            local,
            state: SocketState::Bound,
            options: HashMap::new(),
        });
        Box::new(FakeSocket {
            net: Rc::clone(&self.net),
            index: net.sockets.len() - 1,
            last_error: 0,
        })
    }
}

impl PacketSocketFactory for FakeSocketFactory {
    fn create_udp_socket(
        &self,
        address: SocketAddr,
        min_port: u16,
        max_port: u16,
    ) -> Result<Box<dyn PacketSocket>> {
        let mut net = self.net.borrow_mut();
        if net.fail_socket_creation {
            return Err(Error::ErrSocketCreationFailed);
        }

        let port = if min_port != 0 {
            min_port
        } else {
            net.next_port += 1;
            net.next_port
        };
        debug_assert!(max_port == 0 || port <= max_port);

        let state = if net.bind_later {
            SocketState::Binding
        } else {
            SocketState::Bound
        };
        net.sockets.push(FakeSocketState {
            local: SocketAddr::new(address.ip(), port),
            state,
            options: HashMap::new(),
        });

        Ok(Box::new(FakeSocket {
            net: Rc::clone(&self.net),
            index: net.sockets.len() - 1,
            last_error: 0,
        }))
    }

    fn create_async_resolver(&self) -> Result<Box<dyn AsyncResolver>> {
        if self.net.borrow().fail_resolver_creation {
            return Err(Error::ErrResolverCreationFailed);
        }
        Ok(Box::new(FakeResolver {
            net: Rc::clone(&self.net),
            address: None,
        }))
    }
}
