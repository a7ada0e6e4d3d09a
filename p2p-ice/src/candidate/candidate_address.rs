use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::{IpAddr, SocketAddr};

use crate::network::AddressFamily;

/// CandidateAddress is a transport address that may still be a hostname
/// awaiting resolution.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub struct CandidateAddress {
    hostname: String,
    ip: Option<IpAddr>,
    port: u16,
}

impl CandidateAddress {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        CandidateAddress {
            hostname: String::new(),
            ip: Some(ip),
            port,
        }
    }

    /// from_hostname keeps `hostname` unresolved unless it is an IP literal.
    pub fn from_hostname(hostname: &str, port: u16) -> Self {
        match hostname.parse::<IpAddr>() {
            Ok(ip) => CandidateAddress::new(ip, port),
            Err(_) => CandidateAddress {
                hostname: hostname.to_owned(),
                ip: None,
                port,
            },
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn ip(&self) -> Option<IpAddr> {
        self.ip
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn set_port(&mut self, port: u16) {
        self.port = port;
    }

    /// set_resolved_ip records the result of a lookup, keeping the hostname.
    pub fn set_resolved_ip(&mut self, ip: IpAddr) {
        self.ip = Some(ip);
    }

    pub fn is_unresolved(&self) -> bool {
        self.ip.is_none()
    }

    /// is_any reports the wildcard address, which is never a usable peer.
    pub fn is_any(&self) -> bool {
        match self.ip {
            Some(ip) => ip.is_unspecified(),
            None => self.hostname.is_empty(),
        }
    }

    pub fn is_private_ip(&self) -> bool {
        match self.ip {
            Some(IpAddr::V4(ip)) => ip.is_private() || ip.is_loopback() || ip.is_link_local(),
            Some(IpAddr::V6(ip)) => {
                let first = ip.segments()[0];
                ip.is_loopback() || (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
            }
            None => false,
        }
    }

    pub fn family(&self) -> Option<AddressFamily> {
        self.ip.as_ref().map(AddressFamily::of)
    }

    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.ip.map(|ip| SocketAddr::new(ip, self.port))
    }
}

impl From<SocketAddr> for CandidateAddress {
    fn from(addr: SocketAddr) -> Self {
        CandidateAddress::new(addr.ip(), addr.port())
    }
}

impl PartialEq for CandidateAddress {
    fn eq(&self, other: &Self) -> bool {
        if self.ip != other.ip || self.port != other.port {
            return false;
        }
        // Hostnames only tell unresolved addresses apart.
        match self.ip {
            Some(ip) if !ip.is_unspecified() => true,
            _ => self.hostname == other.hostname,
        }
    }
}

impl Eq for CandidateAddress {}

impl Hash for CandidateAddress {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ip.hash(state);
        self.port.hash(state);
    }
}

impl fmt::Display for CandidateAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ip {
            Some(ip) if !self.hostname.is_empty() && ip.is_unspecified() => {
                write!(f, "{}:{}", self.hostname, self.port)
            }
            Some(ip) => write!(f, "{}", SocketAddr::new(ip, self.port)),
            None => write!(f, "{}:{}", self.hostname, self.port),
        }
    }
}
