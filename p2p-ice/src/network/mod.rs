use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

/// Address family of an IP address.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

impl AddressFamily {
    pub fn of(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => AddressFamily::Ipv4,
            IpAddr::V6(_) => AddressFamily::Ipv6,
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            AddressFamily::Ipv4 => "ipv4",
            AddressFamily::Ipv6 => "ipv6",
        };
        write!(f, "{s}")
    }
}

/// Network is a local interface a port can be bound on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    name: String,
    description: String,
    ip: IpAddr,
    prefix_length: u8,
}

impl Default for Network {
    fn default() -> Self {
        Network {
            name: String::new(),
            description: String::new(),
            ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            prefix_length: 0,
        }
    }
}

impl Network {
    pub fn new(name: &str, description: &str, ip: IpAddr, prefix_length: u8) -> Self {
        Network {
            name: name.to_owned(),
            description: description.to_owned(),
            ip,
            prefix_length,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    pub fn prefix_length(&self) -> u8 {
        self.prefix_length
    }

    pub fn family(&self) -> AddressFamily {
        AddressFamily::of(&self.ip)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Net[{}:{}/{}]",
            self.description, self.ip, self.prefix_length
        )
    }
}
