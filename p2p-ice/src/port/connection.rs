use std::net::SocketAddr;
use std::time::Instant;

use crate::candidate::Candidate;

/// Connection is a port's view of one remote candidate.
#[derive(Debug, Clone)]
pub struct Connection {
    remote_candidate: Candidate,
    remote_address: SocketAddr,
    created: Instant,
    last_received: Option<Instant>,
    last_sent: Option<Instant>,
    sent_total_bytes: u64,
    recv_total_bytes: u64,
    sent_packets: u64,
    recv_packets: u64,
}

impl Connection {
    pub(crate) fn new(remote_candidate: Candidate, remote_address: SocketAddr, now: Instant) -> Self {
        Connection {
            remote_candidate,
            remote_address,
            created: now,
            last_received: None,
            last_sent: None,
            sent_total_bytes: 0,
            recv_total_bytes: 0,
            sent_packets: 0,
            recv_packets: 0,
        }
    }

    pub fn remote_candidate(&self) -> &Candidate {
        &self.remote_candidate
    }

    pub fn remote_address(&self) -> SocketAddr {
        self.remote_address
    }

    /// received is true once any datagram arrived from the remote address.
    pub fn received(&self) -> bool {
        self.last_received.is_some()
    }

    pub fn last_received(&self) -> Option<Instant> {
        self.last_received
    }

    pub fn last_sent(&self) -> Option<Instant> {
        self.last_sent
    }

    /// last_activity is the last receive, or creation if nothing arrived yet.
    pub fn last_activity(&self) -> Instant {
        self.last_received.unwrap_or(self.created)
    }

    pub fn sent_total_bytes(&self) -> u64 {
        self.sent_total_bytes
    }

    pub fn recv_total_bytes(&self) -> u64 {
        self.recv_total_bytes
    }

    pub fn sent_packets(&self) -> u64 {
        self.sent_packets
    }

    pub fn recv_packets(&self) -> u64 {
        self.recv_packets
    }

    pub(crate) fn on_read_packet(&mut self, len: usize, now: Instant) {
        self.last_received = Some(now);
        self.recv_packets += 1;
        self.recv_total_bytes += len as u64;
    }

    pub(crate) fn on_sent_packet(&mut self, len: usize, now: Instant) {
        self.last_sent = Some(now);
        self.sent_packets += 1;
        self.sent_total_bytes += len as u64;
    }
}
