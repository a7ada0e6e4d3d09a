
pub mod connection;

use bytes::BytesMut;
use log::{debug, error, trace, warn};
use sansio::Protocol;
use shared::error::*;
use shared::util::match_stun;
use shared::{
    DiffServCodePoint, PacketOptions, TaggedBytesMut, TransportContext, TransportProtocol,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::net::{IpAddr, SocketAddr};
use std::rc::Rc;
use std::time::{Duration, Instant};
use stun::addr::{MappedAddress, XorMappedAddress};
use stun::attributes::{ATTR_USERNAME, Getter};
use stun::error_code::{CODE_BAD_REQUEST, CODE_UNAUTHORIZED, ErrorCode, ErrorCodeAttribute};
use stun::message::{BINDING_ERROR, BINDING_REQUEST, Message};
use stun::request::{StunRequest, StunRequestEvent, StunRequestManager};

use crate::candidate::*;
use crate::network::{AddressFamily, Network};
use crate::rand::{generate_cand_id, generate_pwd, generate_tiebreaker, generate_ufrag};
use crate::resolver::AddressResolver;
use crate::role::IceRole;
use crate::socket::{PacketSocket, PacketSocketFactory, SocketOption, SocketState};

pub use connection::Connection;

/// Interval between binding requests that keep the NAT binding open.
pub const KEEPALIVE_DELAY: Duration = Duration::from_secs(10);
/// Pause before retrying a server whose binding request timed out.
pub const RETRY_DELAY: Duration = Duration::from_millis(50);
/// Budget for retrying a server that keeps failing.
pub const RETRY_TIMEOUT: Duration = Duration::from_secs(50);

/// ServerAddresses is the set of STUN servers a port binds against.
pub type ServerAddresses = HashSet<CandidateAddress>;

/// BindingRequestContext travels with every binding request sent to a server.
#[derive(Debug, Clone)]
pub struct BindingRequestContext {
    server: CandidateAddress,
    keep_alive: bool,
    start_time: Instant,
}

/// Events a port reports to its owner.
#[derive(Debug)]
pub enum PortEvent {
    CandidateReady(Candidate),
    /// Gathering finished with a usable set of candidates.
    PortComplete,
    /// Gathering finished and every STUN server failed.
    PortError,
    ReadyToSend,
    /// A binding request for our credentials arrived from an address with
    /// no connection.
    UnknownAddress {
        remote: SocketAddr,
        remote_username: String,
        request: Message,
    },
}

#[derive(Debug, Clone)]
pub struct UdpPortConfig {
    pub network: Network,
    /// Address to bind; defaults to the network's address.
    pub ip: Option<IpAddr>,
    pub min_port: u16,
    pub max_port: u16,
    /// Local ICE ufrag; generated when empty.
    pub username: String,
    /// Local ICE pwd; generated when empty.
    pub password: String,
    pub content_name: String,
    pub component: u16,
    pub generation: u32,
    pub server_addresses: ServerAddresses,
    pub keepalive_delay: Option<Duration>,
    pub dscp: DiffServCodePoint,
}

impl Default for UdpPortConfig {
    fn default() -> Self {
        UdpPortConfig {
            network: Network::default(),
            ip: None,
            min_port: 0,
            max_port: 0,
            username: String::new(),
            password: String::new(),
            content_name: String::new(),
            component: COMPONENT_RTP,
            generation: 0,
            server_addresses: ServerAddresses::new(),
            keepalive_delay: None,
            dscp: DiffServCodePoint::NoChange,
        }
    }
}

/// UdpPort gathers host and server reflexive candidates on one UDP socket
/// and demultiplexes what arrives on it.
pub struct UdpPort {
    network: Network,
    ip: IpAddr,
    min_port: u16,
    max_port: u16,
    username: String,
    password: String,
    content_name: String,
    component: u16,
    generation: u32,
    keepalive_delay: Duration,
    dscp: DiffServCodePoint,
    ice_role: IceRole,
    tiebreaker: u64,

    socket_factory: Rc<dyn PacketSocketFactory>,
    socket: Option<Box<dyn PacketSocket>>,
    shared_socket: bool,

    requests: StunRequestManager<BindingRequestContext>,
    resolver: Option<AddressResolver>,
    server_addresses: ServerAddresses,
    bind_request_succeeded_servers: ServerAddresses,
    bind_request_failed_servers: ServerAddresses,

    candidates: Vec<Candidate>,
    connections: HashMap<SocketAddr, Connection>,

    error: i32,
    ready: bool,
    closed: bool,
    events: VecDeque<PortEvent>,
    reads: VecDeque<TaggedBytesMut>,
}

impl UdpPort {
    pub fn new(config: UdpPortConfig, socket_factory: Rc<dyn PacketSocketFactory>) -> Self {
        let ip = config.ip.unwrap_or_else(|| config.network.ip());
        let username = if config.username.is_empty() {
            generate_ufrag()
        } else {
            config.username
        };
        let password = if config.password.is_empty() {
            generate_pwd()
        } else {
            config.password
        };

        UdpPort {
            network: config.network,
            ip,
            min_port: config.min_port,
            max_port: config.max_port,
            username,
            password,
            content_name: config.content_name,
            component: config.component,
            generation: config.generation,
            keepalive_delay: config.keepalive_delay.unwrap_or(KEEPALIVE_DELAY),
            dscp: config.dscp,
            ice_role: IceRole::Unknown,
            tiebreaker: generate_tiebreaker(),

            socket_factory,
            socket: None,
            shared_socket: false,

            requests: StunRequestManager::new(),
            resolver: None,
            server_addresses: config.server_addresses,
            bind_request_succeeded_servers: ServerAddresses::new(),
            bind_request_failed_servers: ServerAddresses::new(),

            candidates: vec![],
            connections: HashMap::new(),

            error: 0,
            ready: false,
            closed: false,
            events: VecDeque::new(),
            reads: VecDeque::new(),
        }
    }

    /// with_shared_socket builds a port on a socket owned by someone else.
    /// The port never closes it.
    pub fn with_shared_socket(
        config: UdpPortConfig,
        socket_factory: Rc<dyn PacketSocketFactory>,
        socket: Box<dyn PacketSocket>,
    ) -> Self {
        let mut port = UdpPort::new(config, socket_factory);
        if let Some(local) = socket.local_address() {
            port.ip = local.ip();
        }
        port.socket = Some(socket);
        port.shared_socket = true;
        port
    }

    /// init acquires the port's socket unless it was handed a shared one.
    pub fn init(&mut self) -> Result<()> {
        if self.shared_socket {
            return Ok(());
        }
        if self.socket.is_some() {
            return Err(Error::ErrPortAlreadyInitialized);
        }

        match self.socket_factory.create_udp_socket(
            SocketAddr::new(self.ip, 0),
            self.min_port,
            self.max_port,
        ) {
            Ok(socket) => {
                self.socket = Some(socket);
                Ok(())
            }
            Err(err) => {
                warn!("{}: UDP socket creation failed: {}", self, err);
                Err(Error::ErrSocketCreationFailed)
            }
        }
    }

    /// prepare_address starts gathering. A socket that is already bound is
    /// handled right away; otherwise the owner reports the bound address
    /// through [UdpPort::on_local_address_ready].
    pub fn prepare_address(&mut self, now: Instant) -> Result<()> {
        let socket = self.socket.as_ref().ok_or(Error::ErrPortNotInitialized)?;
        if socket.state() == SocketState::Bound {
            let local = socket.local_address().ok_or(Error::ErrSocketNotBound)?;
            self.on_local_address_ready(local, now);
        }
        Ok(())
    }

    /// on_local_address_ready registers the host candidate and moves on to
    /// the STUN servers.
    pub fn on_local_address_ready(&mut self, address: SocketAddr, now: Instant) {
        if self.closed {
            return;
        }
        self.add_address(address, address, None, CandidateType::Host);
        self.maybe_prepare_stun_candidate(now);
    }

    pub fn on_ready_to_send(&mut self) {
        self.events.push_back(PortEvent::ReadyToSend);
    }

    /// on_read_packet dispatches one datagram received on the port's socket.
    pub fn on_read_packet(&mut self, data: &[u8], remote: SocketAddr, now: Instant) -> Result<()> {
        if self.closed {
            return Err(Error::ErrPortClosed);
        }

        // Responses from a server are swallowed even if they match no
        // request; they may answer a retransmission we already settled.
        if self.server_addresses.contains(&CandidateAddress::from(remote)) {
            self.requests.check_response(data, now);
            self.process_request_events(now);
            return Ok(());
        }

        if let Some(conn) = self.connections.get_mut(&remote) {
            conn.on_read_packet(data.len(), now);
            let local_addr = self.local_address().unwrap_or(SocketAddr::new(self.ip, 0));
            self.reads.push_back(TaggedBytesMut {
                now,
                transport: TransportContext {
                    local_addr,
                    peer_addr: remote,
                    transport_protocol: TransportProtocol::UDP,
                    dscp: DiffServCodePoint::NoChange,
                },
                message: BytesMut::from(data),
            });
            return Ok(());
        }

        self.on_unknown_packet(data, remote)
    }

    /// on_resolve_result is called by the owner once a STUN server hostname
    /// lookup finishes.
    pub fn on_resolve_result(&mut self, input: &CandidateAddress, now: Instant) {
        let family = AddressFamily::of(&self.ip);
        let Some(resolver) = self.resolver.as_mut() else {
            return;
        };
        let Some((input, err)) = resolver.on_resolve_result(input) else {
            return;
        };

        let resolved = resolver.get_resolved_address(&input, family);
        let Some(resolved) = resolved.filter(|_| err == 0) else {
            warn!(
                "{}: StunPort: stun host lookup received error {}",
                self, err
            );
            self.on_stun_binding_or_resolve_request_failed(input);
            return;
        };

        self.server_addresses.remove(&input);

        let resolved = CandidateAddress::from(resolved);
        if self.server_addresses.insert(resolved.clone()) {
            self.send_stun_binding_request(resolved, now);
        } else {
            // the set shrank, which may be all that was missing
            self.maybe_set_port_complete_or_error();
        }
    }

    /// send_to puts `data` on the wire towards `remote`.
    pub fn send_to(
        &mut self,
        data: &[u8],
        remote: SocketAddr,
        options: &PacketOptions,
    ) -> Result<usize> {
        let socket = self.socket.as_mut().ok_or(Error::ErrPortNotInitialized)?;
        match socket.send_to(data, remote, options) {
            Ok(n) => Ok(n),
            Err(err) => {
                self.error = socket.last_error();
                error!(
                    "{}: UDP send of {} bytes failed with error {}",
                    self,
                    data.len(),
                    self.error
                );
                Err(err)
            }
        }
    }

    pub fn set_option(&mut self, option: SocketOption, value: i32) -> Result<()> {
        self.socket
            .as_mut()
            .ok_or(Error::ErrPortNotInitialized)?
            .set_option(option, value)
    }

    pub fn get_option(&self, option: SocketOption) -> Result<i32> {
        self.socket
            .as_ref()
            .ok_or(Error::ErrPortNotInitialized)?
            .get_option(option)
    }

    /// Last socket error recorded by a failed send, 0 if none.
    pub fn get_error(&self) -> i32 {
        self.error
    }

    /// create_connection starts tracking traffic with `remote`.
    pub fn create_connection(&mut self, remote: &Candidate, now: Instant) -> Result<SocketAddr> {
        if remote.protocol() != UDP_PROTOCOL_NAME {
            return Err(Error::ErrUnsupportedProtocol(remote.protocol().to_owned()));
        }
        let address = remote
            .address()
            .socket_addr()
            .ok_or(Error::ErrUnresolvedCandidateAddress)?;
        if !self.is_compatible_address(&address) {
            return Err(Error::ErrIncompatibleAddress);
        }
        if self.shared_socket
            && self
                .candidates
                .first()
                .is_some_and(|c| *c.candidate_type() != CandidateType::Host)
        {
            return Err(Error::ErrSharedSocketNotHost);
        }
        if self.connections.contains_key(&address) {
            return Err(Error::ErrConnectionExists);
        }

        trace!("{}: new connection to {}", self, address);
        self.connections
            .insert(address, Connection::new(remote.clone(), address, now));
        Ok(address)
    }

    pub fn get_connection(&self, remote: &SocketAddr) -> Option<&Connection> {
        self.connections.get(remote)
    }

    pub(crate) fn get_connection_mut(&mut self, remote: &SocketAddr) -> Option<&mut Connection> {
        self.connections.get_mut(remote)
    }

    pub fn destroy_connection(&mut self, remote: &SocketAddr) -> Option<Connection> {
        self.connections.remove(remote)
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn set_ice_credentials(&mut self, ufrag: &str, pwd: &str) {
        self.username = ufrag.to_owned();
        self.password = pwd.to_owned();
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn set_ice_role(&mut self, role: IceRole) {
        self.ice_role = role;
    }

    pub fn ice_role(&self) -> IceRole {
        self.ice_role
    }

    pub fn set_ice_tiebreaker(&mut self, tiebreaker: u64) {
        self.tiebreaker = tiebreaker;
    }

    pub fn ice_tiebreaker(&self) -> u64 {
        self.tiebreaker
    }

    /// DSCP value STUN traffic is tagged with.
    pub fn set_default_dscp(&mut self, dscp: DiffServCodePoint) {
        self.dscp = dscp;
    }

    pub fn default_dscp(&self) -> DiffServCodePoint {
        self.dscp
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    pub fn component(&self) -> u16 {
        self.component
    }

    pub fn content_name(&self) -> &str {
        &self.content_name
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn local_address(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|socket| socket.local_address())
    }

    pub fn shared_socket(&self) -> bool {
        self.shared_socket
    }

    /// is_ready is true once every STUN server has succeeded or failed.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn server_addresses(&self) -> &ServerAddresses {
        &self.server_addresses
    }

    pub fn bind_request_succeeded_servers(&self) -> &ServerAddresses {
        &self.bind_request_succeeded_servers
    }

    pub fn bind_request_failed_servers(&self) -> &ServerAddresses {
        &self.bind_request_failed_servers
    }

    /// is_compatible_address is true if `address` can be reached from the
    /// port's IP family.
    pub fn is_compatible_address(&self, address: &SocketAddr) -> bool {
        AddressFamily::of(&self.ip) == AddressFamily::of(&address.ip())
    }

    fn add_address(
        &mut self,
        address: SocketAddr,
        base_address: SocketAddr,
        related_address: Option<SocketAddr>,
        candidate_type: CandidateType,
    ) {
        let candidate = CandidateConfig {
            id: generate_cand_id(),
            component: self.component,
            protocol: UDP_PROTOCOL_NAME.to_owned(),
            address: CandidateAddress::from(address),
            priority: compute_priority(
                candidate_type.preference(),
                DEFAULT_LOCAL_PREFERENCE,
                self.component,
            ),
            username: self.username.clone(),
            password: self.password.clone(),
            foundation: compute_foundation(&candidate_type, UDP_PROTOCOL_NAME, &base_address.ip()),
            candidate_type,
            network_name: self.network.name().to_owned(),
            generation: self.generation,
            related_address: related_address.map(CandidateAddress::from),
        }
        .new_candidate();

        debug!("{}: gathered {}", self, candidate);
        self.candidates.push(candidate.clone());
        self.events.push_back(PortEvent::CandidateReady(candidate));
    }

    fn maybe_prepare_stun_candidate(&mut self, now: Instant) {
        if !self.server_addresses.is_empty() {
            self.send_stun_binding_requests(now);
        } else {
            self.maybe_set_port_complete_or_error();
        }
    }

    fn send_stun_binding_requests(&mut self, now: Instant) {
        let servers: Vec<CandidateAddress> = self.server_addresses.iter().cloned().collect();
        for server in servers {
            self.send_stun_binding_request(server, now);
        }
    }

    fn send_stun_binding_request(&mut self, server: CandidateAddress, now: Instant) {
        let Some(destination) = server.socket_addr() else {
            self.resolve_stun_address(server);
            return;
        };

        let bound = self
            .socket
            .as_ref()
            .is_some_and(|socket| socket.state() == SocketState::Bound);
        if !bound {
            return;
        }

        if self.is_compatible_address(&destination) {
            let context = BindingRequestContext {
                server,
                keep_alive: true,
                start_time: now,
            };
            let request = StunRequest::new(Message::new(BINDING_REQUEST), destination, context, now);
            if let Err(err) = self.requests.send(request) {
                error!("{}: failed to send binding request: {}", self, err);
            }
            self.flush_requests();
        } else {
            warn!("STUN server address is incompatible.");
            self.on_stun_binding_or_resolve_request_failed(server);
        }
    }

    fn resolve_stun_address(&mut self, server: CandidateAddress) {
        let resolver = self.resolver.get_or_insert_with(AddressResolver::new);
        if let Err(err) = resolver.resolve(&server, self.socket_factory.as_ref()) {
            warn!("{}: failed to resolve {}: {}", self, server, err);
            self.on_stun_binding_or_resolve_request_failed(server);
        }
    }

    fn on_stun_binding_request_succeeded(
        &mut self,
        server: CandidateAddress,
        reflected: SocketAddr,
    ) {
        if self.bind_request_succeeded_servers.contains(&server) {
            return;
        }
        self.bind_request_succeeded_servers.insert(server);

        let local = self.local_address();
        if !self.shared_socket || Some(reflected) != local {
            // a shared socket that sees its own address has no NAT to report
            let base = local.unwrap_or(SocketAddr::new(self.ip, 0));
            self.add_address(reflected, base, Some(base), CandidateType::ServerReflexive);
        }
        self.maybe_set_port_complete_or_error();
    }

    fn on_stun_binding_or_resolve_request_failed(&mut self, server: CandidateAddress) {
        if self.bind_request_failed_servers.contains(&server)
            || self.bind_request_succeeded_servers.contains(&server)
        {
            return;
        }
        self.bind_request_failed_servers.insert(server);
        self.maybe_set_port_complete_or_error();
    }

    fn maybe_set_port_complete_or_error(&mut self) {
        if self.ready {
            return;
        }

        // still waiting for bind responses; a server that failed before
        // succeeding is counted once
        let failed_only = self
            .bind_request_failed_servers
            .difference(&self.bind_request_succeeded_servers)
            .count();
        let servers_done = failed_only + self.bind_request_succeeded_servers.len();
        if self.server_addresses.len() != servers_done {
            return;
        }

        self.ready = true;

        if self.server_addresses.is_empty()
            || !self.bind_request_succeeded_servers.is_empty()
            || self.shared_socket
        {
            self.events.push_back(PortEvent::PortComplete);
        } else {
            self.events.push_back(PortEvent::PortError);
        }
    }

    fn process_request_events(&mut self, now: Instant) {
        while let Some(event) = self.requests.poll_event() {
            match event {
                StunRequestEvent::Response {
                    context, response, ..
                } => self.on_binding_response(context, &response, now),
                StunRequestEvent::ErrorResponse {
                    context, response, ..
                } => self.on_binding_error_response(context, &response, now),
                StunRequestEvent::Timeout { context, .. } => {
                    self.on_binding_timeout(context, now)
                }
            }
        }
        self.flush_requests();
    }

    fn on_binding_response(
        &mut self,
        context: BindingRequestContext,
        response: &Message,
        now: Instant,
    ) {
        match mapped_address(response) {
            Ok(reflected) => self.on_stun_binding_request_succeeded(context.server.clone(), reflected),
            Err(Error::ErrInvalidFamily(family)) => {
                error!("Binding address has bad family {family}");
                self.on_stun_binding_or_resolve_request_failed(context.server.clone());
            }
            Err(err) => {
                error!("Binding response missing mapped address: {err}");
                self.on_stun_binding_or_resolve_request_failed(context.server.clone());
            }
        }

        // keep-alive regardless of the outcome
        if context.keep_alive {
            self.send_keep_alive(context.server, now, now, self.keepalive_delay);
        }
    }

    fn on_binding_error_response(
        &mut self,
        context: BindingRequestContext,
        response: &Message,
        now: Instant,
    ) {
        let mut code = ErrorCodeAttribute::default();
        match code.get_from(response) {
            Ok(()) => error!(
                "Binding error response: class={} number={} reason='{}'",
                code.class(),
                code.number(),
                String::from_utf8_lossy(&code.reason)
            ),
            Err(_) => error!("Bad allocate response error code"),
        }

        self.on_stun_binding_or_resolve_request_failed(context.server.clone());

        if context.keep_alive && now.saturating_duration_since(context.start_time) <= RETRY_TIMEOUT
        {
            self.send_keep_alive(context.server, context.start_time, now, self.keepalive_delay);
        }
    }

    fn on_binding_timeout(&mut self, context: BindingRequestContext, now: Instant) {
        error!(
            "Binding request timed out from {} ({})",
            self.local_address()
                .map(|a| a.to_string())
                .unwrap_or_default(),
            self.network.name()
        );

        self.on_stun_binding_or_resolve_request_failed(context.server.clone());

        if context.keep_alive && now.saturating_duration_since(context.start_time) <= RETRY_TIMEOUT
        {
            self.send_keep_alive(context.server, context.start_time, now, RETRY_DELAY);
        }
    }

    fn send_keep_alive(
        &mut self,
        server: CandidateAddress,
        start_time: Instant,
        now: Instant,
        delay: Duration,
    ) {
        let Some(destination) = server.socket_addr() else {
            return;
        };
        let context = BindingRequestContext {
            server,
            keep_alive: true,
            start_time,
        };
        let request = StunRequest::new(Message::new(BINDING_REQUEST), destination, context, now);
        if let Err(err) = self.requests.send_delayed(request, delay) {
            debug!("{}: keep-alive not scheduled: {}", self, err);
        }
    }

    fn flush_requests(&mut self) {
        let options = PacketOptions::new(self.dscp);
        while let Some(transmit) = self.requests.poll_write() {
            let Some(socket) = self.socket.as_mut() else {
                return;
            };
            if let Err(err) = socket.send_to(&transmit.payload, transmit.remote, &options) {
                self.error = socket.last_error();
                error!("sendto {}: {} ({})", transmit.remote, err, self.error);
            }
        }
    }

    fn on_unknown_packet(&mut self, data: &[u8], remote: SocketAddr) -> Result<()> {
        if !match_stun(data) {
            debug!("{}: dropping non-STUN packet from unknown address {}", self, remote);
            return Ok(());
        }

        let request = match Message::unmarshal(data) {
            Ok(request) => request,
            Err(err) => {
                debug!("{}: dropping malformed STUN packet from {}: {}", self, remote, err);
                return Ok(());
            }
        };
        if request.typ != BINDING_REQUEST {
            debug!("{}: dropping {} from unknown address {}", self, request.typ, remote);
            return Ok(());
        }

        let username = match request.get(ATTR_USERNAME) {
            Ok(raw) => String::from_utf8_lossy(raw).into_owned(),
            Err(_) => {
                warn!("{}: binding request from {} has no USERNAME", self, remote);
                return self.send_binding_error_response(&request, remote, CODE_BAD_REQUEST);
            }
        };

        // USERNAME is "<receiver ufrag>:<sender ufrag>"
        let remote_username = match username.split_once(':') {
            Some((local, remote_ufrag)) if local == self.username => remote_ufrag.to_owned(),
            _ => {
                warn!(
                    "{}: binding request from {} has bad USERNAME {}",
                    self, remote, username
                );
                return self.send_binding_error_response(&request, remote, CODE_UNAUTHORIZED);
            }
        };

        self.events.push_back(PortEvent::UnknownAddress {
            remote,
            remote_username,
            request,
        });
        Ok(())
    }

    fn send_binding_error_response(
        &mut self,
        request: &Message,
        remote: SocketAddr,
        code: ErrorCode,
    ) -> Result<()> {
        let mut response = Message::new_response(BINDING_ERROR, request);
        response.build(&[&code])?;
        let options = PacketOptions::new(self.dscp);
        self.send_to(&response.marshal(), remote, &options)?;
        Ok(())
    }
}

// mapped_address prefers XOR-MAPPED-ADDRESS and falls back to MAPPED-ADDRESS.
fn mapped_address(response: &Message) -> Result<SocketAddr> {
    let mut xor_addr = XorMappedAddress::default();
    match xor_addr.get_from(response) {
        Ok(()) => return Ok(SocketAddr::new(xor_addr.ip, xor_addr.port)),
        Err(Error::ErrAttributeNotFound) => {}
        Err(err) => return Err(err),
    }

    let mut addr = MappedAddress::default();
    addr.get_from(response)?;
    Ok(SocketAddr::new(addr.ip, addr.port))
}

impl std::fmt::Display for UdpPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Port[{}:{}:{}:{}",
            self.content_name,
            self.component,
            self.generation,
            self.network.name()
        )?;
        match self.local_address() {
            Some(local) => write!(f, ":{local}]"),
            None => write!(f, ":{}]", self.ip),
        }
    }
}

impl Protocol<TaggedBytesMut, TaggedBytesMut, ()> for UdpPort {
    type Rout = TaggedBytesMut;
    /// Outbound datagrams go straight to the socket.
    type Wout = ();
    type Eout = PortEvent;
    type Error = Error;
    type Time = Instant;

    fn handle_read(&mut self, msg: TaggedBytesMut) -> Result<()> {
        self.on_read_packet(&msg.message, msg.transport.peer_addr, msg.now)
    }

    /// Datagrams received on a connection.
    fn poll_read(&mut self) -> Option<Self::Rout> {
        self.reads.pop_front()
    }

    fn handle_write(&mut self, msg: TaggedBytesMut) -> Result<()> {
        let dscp = match msg.transport.dscp {
            DiffServCodePoint::NoChange => self.dscp,
            dscp => dscp,
        };
        let remote = msg.transport.peer_addr;
        self.send_to(&msg.message, remote, &PacketOptions::new(dscp))?;
        if let Some(conn) = self.connections.get_mut(&remote) {
            conn.on_sent_packet(msg.message.len(), msg.now);
        }
        Ok(())
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
        self.requests.handle_timeout(now)?;
        self.process_request_events(now);
        Ok(())
    }

    fn poll_timeout(&mut self) -> Option<Instant> {
        if self.closed {
            return None;
        }
        self.requests.poll_timeout()
    }

    /// close cancels outstanding requests and lookups without reporting
    /// their outcome, and releases the socket unless it is shared.
    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut errs = vec![];
        if let Err(err) = self.requests.close() {
            errs.push(err);
        }
        self.resolver = None;
        self.connections.clear();
        self.events.clear();
        self.reads.clear();

        if !self.shared_socket {
            if let Some(mut socket) = self.socket.take() {
                if let Err(err) = socket.close() {
                    errs.push(err);
                }
            }
        }

        flatten_errs(errs)
    }
}
