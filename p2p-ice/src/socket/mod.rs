#[cfg(test)]
pub(crate) mod socket_fake;

use shared::PacketOptions;
use shared::error::*;
use std::fmt;
use std::net::SocketAddr;

use crate::candidate::CandidateAddress;
use crate::network::AddressFamily;

/// Socket lifecycle as seen by the port that owns it.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum SocketState {
    #[default]
    Binding,
    Bound,
    Closed,
}

impl fmt::Display for SocketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            SocketState::Binding => "binding",
            SocketState::Bound => "bound",
            SocketState::Closed => "closed",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SocketOption {
    DontFragment,
    RcvBuf,
    SndBuf,
    Dscp,
}

impl fmt::Display for SocketOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            SocketOption::DontFragment => "dont-fragment",
            SocketOption::RcvBuf => "rcvbuf",
            SocketOption::SndBuf => "sndbuf",
            SocketOption::Dscp => "dscp",
        };
        write!(f, "{s}")
    }
}

/// PacketSocket is the datagram socket capability a port sends through.
///
/// Received datagrams do not come through this trait; the owner feeds them
/// to the port.
pub trait PacketSocket {
    /// local_address is None until the socket is bound.
    fn local_address(&self) -> Option<SocketAddr>;
    fn state(&self) -> SocketState;
    fn send_to(&mut self, data: &[u8], remote: SocketAddr, options: &PacketOptions)
    -> Result<usize>;
    fn set_option(&mut self, option: SocketOption, value: i32) -> Result<()>;
    fn get_option(&self, option: SocketOption) -> Result<i32>;
    /// last_error is the OS error code of the most recent failure, 0 if none.
    fn last_error(&self) -> i32;
    fn close(&mut self) -> Result<()>;
}

/// AsyncResolver looks up one hostname. Completion is reported to the port
/// by its owner through `on_resolve_result`.
pub trait AsyncResolver {
    fn start(&mut self, address: &CandidateAddress);
    /// error is 0 on success.
    fn error(&self) -> i32;
    fn resolved_address(&self, family: AddressFamily) -> Option<SocketAddr>;
    fn destroy(&mut self);
}

/// PacketSocketFactory creates sockets and resolvers for ports.
pub trait PacketSocketFactory {
    fn create_udp_socket(
        &self,
        address: SocketAddr,
        min_port: u16,
        max_port: u16,
    ) -> Result<Box<dyn PacketSocket>>;

    fn create_async_resolver(&self) -> Result<Box<dyn AsyncResolver>>;
}
