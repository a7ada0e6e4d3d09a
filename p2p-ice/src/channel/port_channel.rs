#[cfg(test)]
mod port_channel_test;

use log::{debug, trace, warn};
use sansio::Protocol;
use shared::TaggedBytesMut;
use shared::error::*;
use std::collections::VecDeque;
use std::fmt;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::{Duration, Instant};
use stun::message::Message;

use super::*;
use crate::candidate::*;
use crate::network::Network;
use crate::port::{PortEvent, UdpPort, UdpPortConfig};
use crate::rand::{generate_cand_id, generate_pwd, generate_tiebreaker, generate_ufrag};
use crate::socket::PacketSocketFactory;

/// Connections that have received nothing for this long are pruned.
pub const DEAD_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default)]
pub struct PortChannelConfig {
    /// One port is allocated per network.
    pub networks: Vec<Network>,
    /// Template for every port. Network, credentials, content name and
    /// component are filled in by the channel.
    pub port_config: UdpPortConfig,
    pub dead_connection_timeout: Option<Duration>,
}

/// PortChannelFactory builds [PortTransportChannel]s sharing one socket
/// factory.
pub struct PortChannelFactory {
    config: PortChannelConfig,
    socket_factory: Rc<dyn PacketSocketFactory>,
}

impl PortChannelFactory {
    pub fn new(config: PortChannelConfig, socket_factory: Rc<dyn PacketSocketFactory>) -> Self {
        PortChannelFactory {
            config,
            socket_factory,
        }
    }
}

impl ChannelFactory for PortChannelFactory {
    type Channel = PortTransportChannel;

    fn create_channel(&mut self, content_name: &str, component: u16) -> Result<Self::Channel> {
        Ok(PortTransportChannel::new(
            content_name,
            component,
            self.config.clone(),
            Rc::clone(&self.socket_factory),
        ))
    }
}

struct PortEntry {
    port: UdpPort,
    done: bool,
}

/// PortTransportChannel is a channel backed by one UDP port per network.
///
/// Readable and writable are reported from received traffic: a channel is
/// both once any connection heard from its remote.
pub struct PortTransportChannel {
    content_name: String,
    component: u16,
    config: PortChannelConfig,
    dead_connection_timeout: Duration,
    socket_factory: Rc<dyn PacketSocketFactory>,

    ice_role: IceRole,
    tiebreaker: u64,
    ice_ufrag: String,
    ice_pwd: String,
    remote_ice_ufrag: String,
    remote_ice_pwd: String,
    remote_ice_mode: IceMode,

    ports: Vec<PortEntry>,
    remote_candidates: Vec<Candidate>,
    connecting: bool,
    allocation_done: bool,
    readable: bool,
    writable: bool,
    closed: bool,

    events: VecDeque<ChannelEvent>,
    reads: VecDeque<TaggedBytesMut>,
}

impl PortTransportChannel {
    pub fn new(
        content_name: &str,
        component: u16,
        config: PortChannelConfig,
        socket_factory: Rc<dyn PacketSocketFactory>,
    ) -> Self {
        let dead_connection_timeout = config
            .dead_connection_timeout
            .unwrap_or(DEAD_CONNECTION_TIMEOUT);
        let ice_ufrag = config.port_config.username.clone();
        let ice_pwd = config.port_config.password.clone();

        PortTransportChannel {
            content_name: content_name.to_owned(),
            component,
            config,
            dead_connection_timeout,
            socket_factory,

            ice_role: IceRole::Unknown,
            tiebreaker: generate_tiebreaker(),
            ice_ufrag,
            ice_pwd,
            remote_ice_ufrag: String::new(),
            remote_ice_pwd: String::new(),
            remote_ice_mode: IceMode::Full,

            ports: vec![],
            remote_candidates: vec![],
            connecting: false,
            allocation_done: false,
            readable: false,
            writable: false,
            closed: false,

            events: VecDeque::new(),
            reads: VecDeque::new(),
        }
    }

    pub fn content_name(&self) -> &str {
        &self.content_name
    }

    pub fn ice_ufrag(&self) -> &str {
        &self.ice_ufrag
    }

    pub fn ice_pwd(&self) -> &str {
        &self.ice_pwd
    }

    pub fn remote_ice_ufrag(&self) -> &str {
        &self.remote_ice_ufrag
    }

    pub fn remote_candidates(&self) -> &[Candidate] {
        &self.remote_candidates
    }

    pub fn ports(&self) -> impl Iterator<Item = &UdpPort> {
        self.ports.iter().map(|entry| &entry.port)
    }

    /// is_allocation_done is true once every port finished gathering.
    pub fn is_allocation_done(&self) -> bool {
        self.allocation_done
    }

    /// on_local_address_ready forwards a late socket bind to the port that
    /// owns the socket.
    pub fn on_local_address_ready(&mut self, address: SocketAddr, now: Instant) {
        let Some(index) = self.ports.iter().position(|entry| {
            entry.port.local_address() == Some(address) && entry.port.candidates().is_empty()
        }) else {
            return;
        };
        self.ports[index].port.on_local_address_ready(address, now);
        self.process_port_events(index, now);
    }

    /// on_resolve_result forwards a finished lookup to every port; ports
    /// ignore lookups they did not start.
    pub fn on_resolve_result(&mut self, input: &CandidateAddress, now: Instant) {
        for index in 0..self.ports.len() {
            self.ports[index].port.on_resolve_result(input, now);
            self.process_port_events(index, now);
        }
    }

    fn process_port_events(&mut self, index: usize, now: Instant) {
        while let Some(event) = self.ports[index].port.poll_event() {
            match event {
                PortEvent::CandidateReady(candidate) => {
                    self.events.push_back(ChannelEvent::CandidateReady(candidate));
                }
                PortEvent::PortComplete | PortEvent::PortError => {
                    self.ports[index].done = true;
                    self.maybe_allocation_done();
                }
                PortEvent::ReadyToSend => {
                    trace!("{}: port {} ready to send", self, index);
                }
                PortEvent::UnknownAddress {
                    remote,
                    remote_username,
                    request,
                } => self.on_unknown_address(index, remote, &remote_username, &request, now),
            }
        }
    }

    fn maybe_allocation_done(&mut self) {
        if !self.connecting || self.allocation_done {
            return;
        }
        if self.ports.iter().all(|entry| entry.done) {
            self.allocation_done = true;
            self.events.push_back(ChannelEvent::CandidatesAllocationDone);
        }
    }

    // A binding request from an address we know nothing about names a peer
    // reflexive candidate of the remote side.
    fn on_unknown_address(
        &mut self,
        index: usize,
        remote: SocketAddr,
        remote_username: &str,
        request: &Message,
        now: Instant,
    ) {
        if !self.remote_ice_ufrag.is_empty() && remote_username != self.remote_ice_ufrag {
            debug!(
                "{}: ignoring binding request from {} with unknown ufrag {}",
                self, remote, remote_username
            );
            return;
        }

        let candidate_type = CandidateType::PeerReflexive;
        let candidate = CandidateConfig {
            id: generate_cand_id(),
            component: self.component,
            protocol: UDP_PROTOCOL_NAME.to_owned(),
            address: CandidateAddress::from(remote),
            priority: compute_priority(
                candidate_type.preference(),
                DEFAULT_LOCAL_PREFERENCE,
                self.component,
            ),
            username: remote_username.to_owned(),
            password: self.remote_ice_pwd.clone(),
            foundation: compute_foundation(&candidate_type, UDP_PROTOCOL_NAME, &remote.ip()),
            candidate_type,
            ..Default::default()
        }
        .new_candidate();

        let port = &mut self.ports[index].port;
        match port.create_connection(&candidate, now) {
            Ok(address) => {
                if let Some(conn) = port.get_connection_mut(&address) {
                    conn.on_read_packet(request.marshal().len(), now);
                }
                debug!("{}: learned peer reflexive {}", self, candidate);
                self.remote_candidates.push(candidate);
                self.update_state();
            }
            Err(err) => debug!("{}: no connection to {}: {}", self, remote, err),
        }
    }

    fn create_connection(&mut self, index: usize, candidate: &Candidate, now: Instant) {
        match self.ports[index].port.create_connection(candidate, now) {
            Ok(address) => trace!("{}: connection to {} on port {}", self, address, index),
            Err(Error::ErrConnectionExists) => {}
            Err(err) => debug!("{}: no connection to {}: {}", self, candidate, err),
        }
    }

    fn update_state(&mut self) {
        let received = self
            .ports
            .iter()
            .any(|entry| entry.port.connections().any(|conn| conn.received()));

        if received != self.readable {
            self.readable = received;
            self.events.push_back(ChannelEvent::ReadableState);
        }
        if received != self.writable {
            self.writable = received;
            self.events.push_back(ChannelEvent::WritableState);
        }
    }

    fn prune_connections(&mut self, now: Instant) {
        let timeout = self.dead_connection_timeout;
        let mut removed = 0;
        for entry in self.ports.iter_mut() {
            let dead: Vec<SocketAddr> = entry
                .port
                .connections()
                .filter(|conn| conn.last_activity() + timeout <= now)
                .map(|conn| conn.remote_address())
                .collect();
            for address in dead {
                debug!("{}: pruning connection to {}", entry.port, address);
                entry.port.destroy_connection(&address);
                removed += 1;
            }
        }
        for _ in 0..removed {
            self.events.push_back(ChannelEvent::ConnectionRemoved);
        }
    }
}

impl fmt::Display for PortTransportChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Channel[{}:{}]", self.content_name, self.component)
    }
}

impl Protocol<TaggedBytesMut, TaggedBytesMut, ()> for PortTransportChannel {
    type Rout = TaggedBytesMut;
    type Wout = ();
    type Eout = ChannelEvent;
    type Error = Error;
    type Time = Instant;

    /// Datagrams are routed to the port bound to `transport.local_addr`.
    fn handle_read(&mut self, msg: TaggedBytesMut) -> Result<()> {
        if self.closed {
            return Err(Error::ErrPortClosed);
        }
        let local = msg.transport.local_addr;
        let index = self
            .ports
            .iter()
            .position(|entry| entry.port.local_address() == Some(local))
            .ok_or(Error::ErrSocketNotBound)?;

        self.ports[index]
            .port
            .on_read_packet(&msg.message, msg.transport.peer_addr, msg.now)?;
        while let Some(read) = self.ports[index].port.poll_read() {
            self.reads.push_back(read);
        }
        self.process_port_events(index, msg.now);
        self.update_state();
        Ok(())
    }

    fn poll_read(&mut self) -> Option<Self::Rout> {
        self.reads.pop_front()
    }

    /// Sends through the port that holds a connection to `transport.peer_addr`.
    fn handle_write(&mut self, msg: TaggedBytesMut) -> Result<()> {
        let peer = msg.transport.peer_addr;
        let entry = self
            .ports
            .iter_mut()
            .find(|entry| entry.port.get_connection(&peer).is_some())
            .ok_or(Error::ErrNoConnection)?;
        entry.port.handle_write(msg)
    }

    fn poll_write(&mut self) -> Option<Self::Wout> {
        None
    }

    fn handle_event(&mut self, _evt: ()) -> Result<()> {
        Ok(())
    }

    fn poll_event(&mut self) -> Option<Self::Eout> {
        self.events.pop_front()
    }

    fn handle_timeout(&mut self, now: Instant) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let mut errs = vec![];
        for index in 0..self.ports.len() {
            if let Err(err) = self.ports[index].port.handle_timeout(now) {
                errs.push(err);
            }
            self.process_port_events(index, now);
        }
        self.prune_connections(now);
        self.update_state();

        flatten_errs(errs)
    }

    fn poll_timeout(&mut self) -> Option<Instant> {
        let timeout = self.dead_connection_timeout;
        let mut next: Option<Instant> = None;
        for entry in self.ports.iter_mut() {
            let port_timeout = entry.port.poll_timeout();
            let dead_timeout = entry
                .port
                .connections()
                .map(|conn| conn.last_activity() + timeout)
                .min();
            for deadline in [port_timeout, dead_timeout].into_iter().flatten() {
                next = Some(next.map_or(deadline, |next| next.min(deadline)));
            }
        }
        next
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut errs = vec![];
        for mut entry in self.ports.drain(..) {
            if let Err(err) = entry.port.close() {
                errs.push(err);
            }
        }
        self.events.clear();
        self.reads.clear();

        flatten_errs(errs)
    }
}

impl TransportChannelImpl for PortTransportChannel {
    fn component(&self) -> u16 {
        self.component
    }

    fn set_ice_role(&mut self, role: IceRole) {
        self.ice_role = role;
        for entry in self.ports.iter_mut() {
            entry.port.set_ice_role(role);
        }
    }

    fn ice_role(&self) -> IceRole {
        self.ice_role
    }

    fn set_ice_tiebreaker(&mut self, tiebreaker: u64) {
        self.tiebreaker = tiebreaker;
        for entry in self.ports.iter_mut() {
            entry.port.set_ice_tiebreaker(tiebreaker);
        }
    }

    fn ice_tiebreaker(&self) -> u64 {
        self.tiebreaker
    }

    fn set_ice_credentials(&mut self, ice_ufrag: &str, ice_pwd: &str) {
        self.ice_ufrag = ice_ufrag.to_owned();
        self.ice_pwd = ice_pwd.to_owned();
        for entry in self.ports.iter_mut() {
            entry.port.set_ice_credentials(ice_ufrag, ice_pwd);
        }
    }

    fn set_remote_ice_credentials(&mut self, ice_ufrag: &str, ice_pwd: &str) {
        self.remote_ice_ufrag = ice_ufrag.to_owned();
        self.remote_ice_pwd = ice_pwd.to_owned();
    }

    fn set_remote_ice_mode(&mut self, mode: IceMode) {
        self.remote_ice_mode = mode;
    }

    fn remote_ice_mode(&self) -> IceMode {
        self.remote_ice_mode
    }

    fn connect(&mut self, now: Instant) -> Result<()> {
        if self.closed {
            return Err(Error::ErrPortClosed);
        }
        if self.connecting {
            return Ok(());
        }

        if self.ice_ufrag.is_empty() || self.ice_pwd.is_empty() {
            self.ice_ufrag = generate_ufrag();
            self.ice_pwd = generate_pwd();
        }

        let remote_candidates = self.remote_candidates.clone();
        for network in self.config.networks.clone() {
            let port_config = UdpPortConfig {
                network,
                username: self.ice_ufrag.clone(),
                password: self.ice_pwd.clone(),
                content_name: self.content_name.clone(),
                component: self.component,
                ..self.config.port_config.clone()
            };
            let mut port = UdpPort::new(port_config, Rc::clone(&self.socket_factory));
            port.set_ice_role(self.ice_role);
            port.set_ice_tiebreaker(self.tiebreaker);
            if let Err(err) = port.init() {
                warn!("{}: no port on {}: {}", self, port.network().name(), err);
                continue;
            }

            self.ports.push(PortEntry { port, done: false });
            let index = self.ports.len() - 1;
            for candidate in &remote_candidates {
                self.create_connection(index, candidate, now);
            }
            self.ports[index].port.prepare_address(now)?;
            self.process_port_events(index, now);
        }

        // allocation is only done once every network has its port
        self.connecting = true;
        self.maybe_allocation_done();
        Ok(())
    }

    fn on_candidate(&mut self, candidate: &Candidate, now: Instant) -> Result<()> {
        if candidate.component() != self.component {
            return Err(Error::ErrUnknownComponent(candidate.component()));
        }
        if self
            .remote_candidates
            .iter()
            .any(|known| known.is_equivalent(candidate))
        {
            return Ok(());
        }

        self.remote_candidates.push(candidate.clone());
        for index in 0..self.ports.len() {
            self.create_connection(index, candidate, now);
        }
        Ok(())
    }

    fn readable(&self) -> bool {
        self.readable
    }

    fn writable(&self) -> bool {
        self.writable
    }

    fn connection_count(&self) -> usize {
        self.ports
            .iter()
            .map(|entry| entry.port.connection_count())
            .sum()
    }

    fn get_stats(&self) -> Vec<ConnectionInfo> {
        self.ports
            .iter()
            .flat_map(|entry| {
                let local_address = entry.port.local_address();
                entry.port.connections().map(move |conn| ConnectionInfo {
                    local_address,
                    remote_candidate: conn.remote_candidate().clone(),
                    readable: conn.received(),
                    writable: conn.received(),
                    sent_total_bytes: conn.sent_total_bytes(),
                    recv_total_bytes: conn.recv_total_bytes(),
                    sent_packets: conn.sent_packets(),
                    recv_packets: conn.recv_packets(),
                })
            })
            .collect()
    }
}
