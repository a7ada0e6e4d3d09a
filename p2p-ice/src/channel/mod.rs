pub mod port_channel;

use sansio::Protocol;
use serde::{Deserialize, Serialize};
use shared::TaggedBytesMut;
use shared::error::*;
use std::net::SocketAddr;
use std::time::Instant;

use crate::candidate::Candidate;
use crate::description::IceMode;
use crate::role::IceRole;

pub use port_channel::{PortChannelConfig, PortChannelFactory, PortTransportChannel};

/// Events a channel reports to the transport that owns it.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    ReadableState,
    WritableState,
    CandidateReady(Candidate),
    /// Every port of the channel finished gathering.
    CandidatesAllocationDone,
    ConnectionRemoved,
}

/// ConnectionInfo describes one connection of a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub local_address: Option<SocketAddr>,
    pub remote_candidate: Candidate,
    pub readable: bool,
    pub writable: bool,
    pub sent_total_bytes: u64,
    pub recv_total_bytes: u64,
    pub sent_packets: u64,
    pub recv_packets: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportChannelStats {
    pub component: u16,
    pub connection_infos: Vec<ConnectionInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportStats {
    pub content_name: String,
    pub channel_stats: Vec<TransportChannelStats>,
}

/// TransportChannelImpl is what a transport needs from one component's
/// channel. Datagrams flow through the [Protocol] half; the rest carries
/// ICE parameters down from the transport.
pub trait TransportChannelImpl:
    Protocol<
        TaggedBytesMut,
        TaggedBytesMut,
        (),
        Rout = TaggedBytesMut,
        Wout = (),
        Eout = ChannelEvent,
        Error = Error,
        Time = Instant,
    >
{
    fn component(&self) -> u16;

    fn set_ice_role(&mut self, role: IceRole);
    fn ice_role(&self) -> IceRole;
    fn set_ice_tiebreaker(&mut self, tiebreaker: u64);
    fn ice_tiebreaker(&self) -> u64;

    fn set_ice_credentials(&mut self, ice_ufrag: &str, ice_pwd: &str);
    fn set_remote_ice_credentials(&mut self, ice_ufrag: &str, ice_pwd: &str);
    fn set_remote_ice_mode(&mut self, mode: IceMode);
    fn remote_ice_mode(&self) -> IceMode;

    /// connect starts gathering local candidates.
    fn connect(&mut self, now: Instant) -> Result<()>;
    /// on_candidate adds a remote candidate.
    fn on_candidate(&mut self, candidate: &Candidate, now: Instant) -> Result<()>;

    fn readable(&self) -> bool;
    fn writable(&self) -> bool;
    fn connection_count(&self) -> usize;
    fn get_stats(&self) -> Vec<ConnectionInfo>;
}

/// ChannelFactory builds the channels a transport asks for.
pub trait ChannelFactory {
    type Channel: TransportChannelImpl;

    fn create_channel(&mut self, content_name: &str, component: u16) -> Result<Self::Channel>;
}
