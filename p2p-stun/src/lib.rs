#![warn(rust_2018_idioms)]
#![allow(dead_code)]

use bytes::BytesMut;
use std::net::SocketAddr;
use std::time::Instant;

pub mod addr;
pub mod attributes;
pub mod error_code;
pub mod message;
pub mod request;
pub mod textattrs;

// IANA assigned ports for "stun" protocol.
pub const DEFAULT_PORT: u16 = 3478;

/// Outgoing Transmit
#[derive(Debug)]
pub struct Transmit {
    /// Sent time
    pub now: Instant,
    /// The socket this datagram should be sent to
    pub remote: SocketAddr,
    /// Payload of the datagram
    pub payload: BytesMut,
}
