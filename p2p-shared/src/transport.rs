use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Instant;

/// Differentiated services codepoint to set on outgoing packets
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DiffServCodePoint {
    /// Leave whatever the socket already carries
    #[default]
    NoChange,
    Default,
    Cs1,
    Cs2,
    Cs3,
    Cs4,
    Cs5,
    Cs6,
    Cs7,
    Af11,
    Af21,
    Af31,
    Af41,
    Af42,
    Ef,
}

impl DiffServCodePoint {
    /// Returns the 6-bit codepoint, or `None` for [DiffServCodePoint::NoChange]
    pub fn value(&self) -> Option<u8> {
        use self::DiffServCodePoint::*;
        Some(match *self {
            NoChange => return None,
            Default => 0,
            Cs1 => 8,
            Cs2 => 16,
            Cs3 => 24,
            Cs4 => 32,
            Cs5 => 40,
            Cs6 => 48,
            Cs7 => 56,
            Af11 => 10,
            Af21 => 18,
            Af31 => 26,
            Af41 => 34,
            Af42 => 36,
            Ef => 46,
        })
    }

    /// Create new object from the given 6-bit codepoint
    pub fn from_value(x: u8) -> Option<Self> {
        use self::DiffServCodePoint::*;
        Some(match x {
            0 => Default,
            8 => Cs1,
            16 => Cs2,
            24 => Cs3,
            32 => Cs4,
            40 => Cs5,
            48 => Cs6,
            56 => Cs7,
            10 => Af11,
            18 => Af21,
            26 => Af31,
            34 => Af41,
            36 => Af42,
            46 => Ef,
            _ => {
                return None;
            }
        })
    }
}

/// Per-packet options handed to a socket together with the payload
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub struct PacketOptions {
    pub dscp: DiffServCodePoint,
    /// Identifier the caller may use to correlate send notifications
    pub packet_id: Option<u64>,
}

impl PacketOptions {
    pub fn new(dscp: DiffServCodePoint) -> Self {
        Self {
            dscp,
            packet_id: None,
        }
    }
}

/// Type of transport protocol, either UDP or TCP
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TransportProtocol {
    /// UDP
    #[default]
    UDP,
    /// TCP
    TCP,
}

/// Transport Context with local address, peer address, DSCP, protocol, etc.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransportContext {
    /// Local socket address, either IPv4 or IPv6
    pub local_addr: SocketAddr,
    /// Peer socket address, either IPv4 or IPv6
    pub peer_addr: SocketAddr,
    /// Type of transport protocol, either UDP or TCP
    pub transport_protocol: TransportProtocol,
    /// Differentiated services codepoint to set on the packet
    pub dscp: DiffServCodePoint,
}

impl Default for TransportContext {
    fn default() -> Self {
        let unspecified = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0);
        Self {
            local_addr: unspecified,
            peer_addr: unspecified,
            transport_protocol: TransportProtocol::UDP,
            dscp: DiffServCodePoint::NoChange,
        }
    }
}

/// A generic transmit with [TransportContext]
#[derive(Debug)]
pub struct TransportMessage<T> {
    /// Received/Sent time
    pub now: Instant,
    /// A transport context with [local_addr](TransportContext::local_addr) and [peer_addr](TransportContext::peer_addr)
    pub transport: TransportContext,
    /// Message body with generic type
    pub message: T,
}

/// BytesMut type transmit with [TransportContext]
pub type TaggedBytesMut = TransportMessage<BytesMut>;
