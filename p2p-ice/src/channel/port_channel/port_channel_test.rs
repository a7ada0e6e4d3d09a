use super::*;
use crate::port::KEEPALIVE_DELAY;
use crate::socket::SocketState;
use crate::socket::socket_fake::FakeSocketFactory;
use bytes::BytesMut;
use shared::{TransportContext, TransportProtocol};
use std::net::{IpAddr, Ipv4Addr};
use stun::addr::XorMappedAddress;
use stun::attributes::ATTR_USERNAME;
use stun::message::{BINDING_REQUEST, BINDING_SUCCESS};

const LOCAL_UFRAG: &str = "TESTICEUFRAG0001";
const LOCAL_PWD: &str = "TESTICEPWD00000000000001";
const REMOTE_UFRAG: &str = "TESTICEUFRAG0002";
const REMOTE_PWD: &str = "TESTICEPWD00000000000002";

fn network(name: &str, ip: [u8; 4]) -> Network {
    Network::new(name, "", IpAddr::V4(Ipv4Addr::from(ip)), 24)
}

fn new_channel(networks: Vec<Network>, servers: &[&str]) -> (PortTransportChannel, Rc<FakeSocketFactory>) {
    let factory = Rc::new(FakeSocketFactory::new());
    let config = PortChannelConfig {
        networks,
        port_config: UdpPortConfig {
            server_addresses: servers
                .iter()
                .map(|s| CandidateAddress::from(s.parse::<SocketAddr>().unwrap()))
                .collect(),
            ..Default::default()
        },
        ..Default::default()
    };
    let mut channel_factory =
        PortChannelFactory::new(config, Rc::clone(&factory) as Rc<dyn PacketSocketFactory>);
    let mut channel = channel_factory.create_channel("audio", COMPONENT_RTP).unwrap();
    channel.set_ice_credentials(LOCAL_UFRAG, LOCAL_PWD);
    channel.set_remote_ice_credentials(REMOTE_UFRAG, REMOTE_PWD);
    (channel, factory)
}

fn drain_events(channel: &mut PortTransportChannel) -> Vec<ChannelEvent> {
    let mut events = vec![];
    while let Some(event) = channel.poll_event() {
        events.push(event);
    }
    events
}

fn remote_candidate(address: &str) -> Candidate {
    CandidateConfig {
        component: COMPONENT_RTP,
        protocol: UDP_PROTOCOL_NAME.to_owned(),
        address: CandidateAddress::from(address.parse::<SocketAddr>().unwrap()),
        username: REMOTE_UFRAG.to_owned(),
        password: REMOTE_PWD.to_owned(),
        ..Default::default()
    }
    .new_candidate()
}

fn datagram(local: SocketAddr, peer: SocketAddr, data: &[u8], now: Instant) -> TaggedBytesMut {
    TaggedBytesMut {
        now,
        transport: TransportContext {
            local_addr: local,
            peer_addr: peer,
            transport_protocol: TransportProtocol::UDP,
            ..Default::default()
        },
        message: BytesMut::from(data),
    }
}

fn local_address(channel: &PortTransportChannel) -> SocketAddr {
    channel.ports().next().unwrap().local_address().unwrap()
}

#[test]
fn test_channel_gathers_on_every_network() -> Result<()> {
    let (mut channel, _factory) = new_channel(
        vec![network("eth0", [192, 168, 1, 2]), network("wlan0", [10, 0, 0, 2])],
        &[],
    );
    channel.set_ice_role(IceRole::Controlling);
    channel.set_ice_tiebreaker(99);
    channel.connect(Instant::now())?;

    let events = drain_events(&mut channel);
    let candidates: Vec<&Candidate> = events
        .iter()
        .filter_map(|e| match e {
            ChannelEvent::CandidateReady(c) => Some(c),
            _ => None,
        })
        .collect();
    assert_eq!(candidates.len(), 2);
    for candidate in &candidates {
        assert_eq!(candidate.username(), LOCAL_UFRAG);
        assert_eq!(candidate.password(), LOCAL_PWD);
        assert_eq!(candidate.component(), COMPONENT_RTP);
    }
    assert_eq!(candidates[0].network_name(), "eth0");
    assert_eq!(candidates[1].network_name(), "wlan0");

    assert_eq!(
        events.last(),
        Some(&ChannelEvent::CandidatesAllocationDone)
    );
    assert_eq!(
        events
            .iter()
            .filter(|e| **e == ChannelEvent::CandidatesAllocationDone)
            .count(),
        1
    );
    assert!(channel.is_allocation_done());

    for port in channel.ports() {
        assert_eq!(port.ice_role(), IceRole::Controlling);
        assert_eq!(port.ice_tiebreaker(), 99);
        assert_eq!(port.content_name(), "audio");
    }

    // connecting twice does not allocate again
    channel.connect(Instant::now())?;
    assert_eq!(channel.ports().count(), 2);
    assert!(drain_events(&mut channel).is_empty());
    Ok(())
}

#[test]
fn test_channel_skips_networks_without_socket() -> Result<()> {
    let (mut channel, factory) = new_channel(vec![network("eth0", [192, 168, 1, 2])], &[]);
    factory.net.borrow_mut().fail_socket_creation = true;
    channel.connect(Instant::now())?;

    assert_eq!(channel.ports().count(), 0);
    assert_eq!(
        drain_events(&mut channel),
        vec![ChannelEvent::CandidatesAllocationDone]
    );
    Ok(())
}

#[test]
fn test_channel_allocation_waits_for_stun() -> Result<()> {
    let (mut channel, factory) =
        new_channel(vec![network("eth0", [192, 168, 1, 2])], &["1.2.3.4:3478"]);
    let now = Instant::now();
    channel.connect(now)?;

    let events = drain_events(&mut channel);
    assert_eq!(events.len(), 1, "only the host candidate: {events:?}");
    assert!(!channel.is_allocation_done());

    let sent = factory.net.borrow_mut().take_sent();
    let request = Message::unmarshal(&sent[0].data)?;
    let mut response = Message::new_response(BINDING_SUCCESS, &request);
    response.build(&[&XorMappedAddress {
        ip: IpAddr::V4(Ipv4Addr::new(5, 6, 7, 8)),
        port: 9999,
    }])?;

    let local = local_address(&channel);
    channel.handle_read(datagram(local, sent[0].remote, &response.marshal(), now))?;

    let events = drain_events(&mut channel);
    assert_eq!(events.len(), 2);
    match &events[0] {
        ChannelEvent::CandidateReady(c) => {
            assert_eq!(c.candidate_type(), &CandidateType::ServerReflexive)
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(events[1], ChannelEvent::CandidatesAllocationDone);
    assert!(channel.poll_read().is_none());

    // the keep-alive is the next thing due
    assert_eq!(channel.poll_timeout(), Some(now + KEEPALIVE_DELAY));
    Ok(())
}

#[test]
fn test_channel_remote_candidates() -> Result<()> {
    let (mut channel, _factory) = new_channel(vec![network("eth0", [192, 168, 1, 2])], &[]);
    let now = Instant::now();

    // candidates that arrive before connect are kept for later
    channel.on_candidate(&remote_candidate("192.168.1.9:5000"), now)?;
    assert_eq!(channel.connection_count(), 0);

    channel.connect(now)?;
    assert_eq!(channel.connection_count(), 1);

    channel.on_candidate(&remote_candidate("192.168.1.9:5000"), now)?;
    assert_eq!(channel.remote_candidates().len(), 1);

    channel.on_candidate(&remote_candidate("192.168.1.9:5001"), now)?;
    assert_eq!(channel.connection_count(), 2);

    let mut rtcp = remote_candidate("192.168.1.9:5002");
    rtcp.set_component(COMPONENT_RTCP);
    assert_eq!(
        channel.on_candidate(&rtcp, now),
        Err(Error::ErrUnknownComponent(COMPONENT_RTCP))
    );

    // an address family the ports cannot reach is remembered but unused
    channel.on_candidate(&remote_candidate("[2001:db8::9]:5000"), now)?;
    assert_eq!(channel.connection_count(), 2);
    Ok(())
}

#[test]
fn test_channel_readable_on_traffic() -> Result<()> {
    let (mut channel, factory) = new_channel(vec![network("eth0", [192, 168, 1, 2])], &[]);
    let now = Instant::now();
    channel.connect(now)?;
    drain_events(&mut channel);

    let peer: SocketAddr = "192.168.1.9:5000".parse().unwrap();
    channel.on_candidate(&remote_candidate("192.168.1.9:5000"), now)?;
    assert!(!channel.readable());
    assert!(!channel.writable());

    let local = local_address(&channel);
    channel.handle_read(datagram(local, peer, b"\x80media", now))?;
    assert_eq!(
        drain_events(&mut channel),
        vec![ChannelEvent::ReadableState, ChannelEvent::WritableState]
    );
    assert!(channel.readable());
    assert!(channel.writable());

    let read = channel.poll_read().unwrap();
    assert_eq!(&read.message[..], b"\x80media");
    assert_eq!(read.transport.peer_addr, peer);

    channel.handle_write(datagram(local, peer, b"reply", now))?;
    let sent = factory.net.borrow_mut().take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].remote, peer);

    let stats = channel.get_stats();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].local_address, Some(local));
    assert_eq!(stats[0].recv_total_bytes, 6);
    assert_eq!(stats[0].sent_total_bytes, 5);
    assert!(stats[0].readable);

    let stranger: SocketAddr = "192.168.1.10:5000".parse().unwrap();
    assert_eq!(
        channel.handle_write(datagram(local, stranger, b"reply", now)),
        Err(Error::ErrNoConnection)
    );
    assert_eq!(
        channel.handle_read(datagram("192.168.1.2:1".parse().unwrap(), peer, b"x", now)),
        Err(Error::ErrSocketNotBound)
    );
    Ok(())
}

#[test]
fn test_channel_prunes_dead_connections() -> Result<()> {
    let (mut channel, _factory) = new_channel(vec![network("eth0", [192, 168, 1, 2])], &[]);
    let now = Instant::now();
    channel.connect(now)?;
    channel.on_candidate(&remote_candidate("192.168.1.9:5000"), now)?;
    channel.on_candidate(&remote_candidate("192.168.1.9:5001"), now)?;

    let local = local_address(&channel);
    let later = now + Duration::from_secs(10);
    channel.handle_read(datagram(local, "192.168.1.9:5000".parse().unwrap(), b"\x80", later))?;
    drain_events(&mut channel);

    // the silent connection dies first
    assert_eq!(channel.poll_timeout(), Some(now + DEAD_CONNECTION_TIMEOUT));
    channel.handle_timeout(now + DEAD_CONNECTION_TIMEOUT)?;
    assert_eq!(
        drain_events(&mut channel),
        vec![ChannelEvent::ConnectionRemoved]
    );
    assert_eq!(channel.connection_count(), 1);
    assert!(channel.writable());

    channel.handle_timeout(later + DEAD_CONNECTION_TIMEOUT)?;
    assert_eq!(
        drain_events(&mut channel),
        vec![
            ChannelEvent::ConnectionRemoved,
            ChannelEvent::ReadableState,
            ChannelEvent::WritableState
        ]
    );
    assert_eq!(channel.connection_count(), 0);
    assert!(!channel.readable());
    assert_eq!(channel.poll_timeout(), None);
    Ok(())
}

#[test]
fn test_channel_timeout_drives_every_port() -> Result<()> {
    let (mut channel, factory) = new_channel(
        vec![network("eth0", [192, 168, 1, 2]), network("wlan0", [10, 0, 0, 2])],
        &["1.2.3.4:3478"],
    );
    let now = Instant::now();
    channel.connect(now)?;
    channel.on_candidate(&remote_candidate("192.168.1.9:5000"), now)?;
    assert_eq!(channel.connection_count(), 2);
    assert_eq!(factory.net.borrow_mut().take_sent().len(), 2);
    drain_events(&mut channel);

    // one tick retransmits on both ports and prunes on both
    channel.handle_timeout(now + DEAD_CONNECTION_TIMEOUT)?;
    let sent = factory.net.borrow_mut().take_sent();
    let locals: Vec<SocketAddr> = channel.ports().filter_map(|p| p.local_address()).collect();
    assert_eq!(locals.len(), 2);
    for local in &locals {
        assert!(
            sent.iter().any(|packet| packet.local == *local),
            "nothing sent from {local}"
        );
    }
    assert_eq!(
        drain_events(&mut channel),
        vec![ChannelEvent::ConnectionRemoved, ChannelEvent::ConnectionRemoved]
    );
    assert_eq!(channel.connection_count(), 0);
    Ok(())
}

#[test]
fn test_channel_late_bind() -> Result<()> {
    let (mut channel, factory) = new_channel(
        vec![network("eth0", [192, 168, 1, 2]), network("wlan0", [10, 0, 0, 2])],
        &[],
    );
    factory.net.borrow_mut().bind_later = true;
    let now = Instant::now();
    channel.connect(now)?;
    assert!(drain_events(&mut channel).is_empty());
    assert!(!channel.is_allocation_done());

    factory.net.borrow_mut().bind_all();
    let locals: Vec<SocketAddr> = channel.ports().filter_map(|p| p.local_address()).collect();
    assert_eq!(locals.len(), 2);

    // an address no port owns is ignored
    channel.on_local_address_ready("192.168.1.2:1".parse().unwrap(), now);
    assert!(drain_events(&mut channel).is_empty());

    channel.on_local_address_ready(locals[0], now);
    let events = drain_events(&mut channel);
    assert_eq!(events.len(), 1);
    match &events[0] {
        ChannelEvent::CandidateReady(c) => {
            assert_eq!(c.candidate_type(), &CandidateType::Host);
            assert_eq!(c.address().socket_addr(), Some(locals[0]));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(!channel.is_allocation_done());

    channel.on_local_address_ready(locals[1], now);
    let events = drain_events(&mut channel);
    assert_eq!(events.len(), 2);
    match &events[0] {
        ChannelEvent::CandidateReady(c) => {
            assert_eq!(c.address().socket_addr(), Some(locals[1]));
            assert_eq!(c.network_name(), "wlan0");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(events[1], ChannelEvent::CandidatesAllocationDone);
    assert!(channel.is_allocation_done());

    // the port already has its host candidate
    channel.on_local_address_ready(locals[0], now);
    assert!(drain_events(&mut channel).is_empty());
    Ok(())
}

#[test]
fn test_channel_learns_peer_reflexive() -> Result<()> {
    let (mut channel, _factory) = new_channel(vec![network("eth0", [192, 168, 1, 2])], &[]);
    let now = Instant::now();
    channel.connect(now)?;
    drain_events(&mut channel);

    let local = local_address(&channel);
    let peer: SocketAddr = "192.168.1.9:6000".parse().unwrap();

    let mut request = Message::new(BINDING_REQUEST);
    request.add(ATTR_USERNAME, b"TESTICEUFRAG0001:someoneelse");
    channel.handle_read(datagram(local, peer, &request.marshal(), now))?;
    assert_eq!(channel.connection_count(), 0);

    let mut request = Message::new(BINDING_REQUEST);
    request.add(
        ATTR_USERNAME,
        format!("{LOCAL_UFRAG}:{REMOTE_UFRAG}").as_bytes(),
    );
    channel.handle_read(datagram(local, peer, &request.marshal(), now))?;

    assert_eq!(channel.connection_count(), 1);
    let prflx = &channel.remote_candidates()[0];
    assert_eq!(prflx.candidate_type(), &CandidateType::PeerReflexive);
    assert_eq!(prflx.address().socket_addr(), Some(peer));
    assert_eq!(prflx.username(), REMOTE_UFRAG);
    assert_eq!(prflx.password(), REMOTE_PWD);
    assert!(channel.readable());
    assert_eq!(
        drain_events(&mut channel),
        vec![ChannelEvent::ReadableState, ChannelEvent::WritableState]
    );
    Ok(())
}

#[test]
fn test_channel_credentials_reach_ports() -> Result<()> {
    let (mut channel, _factory) = new_channel(vec![network("eth0", [192, 168, 1, 2])], &[]);
    channel.connect(Instant::now())?;

    channel.set_ice_credentials(REMOTE_UFRAG, REMOTE_PWD);
    let port = channel.ports().next().unwrap();
    assert_eq!(port.username(), REMOTE_UFRAG);
    assert_eq!(port.password(), REMOTE_PWD);

    channel.set_remote_ice_mode(IceMode::Lite);
    assert_eq!(channel.remote_ice_mode(), IceMode::Lite);
    Ok(())
}

#[test]
fn test_channel_generates_missing_credentials() -> Result<()> {
    let factory = Rc::new(FakeSocketFactory::new());
    let mut channel = PortTransportChannel::new(
        "video",
        COMPONENT_RTP,
        PortChannelConfig {
            networks: vec![network("eth0", [192, 168, 1, 2])],
            ..Default::default()
        },
        factory as Rc<dyn PacketSocketFactory>,
    );
    channel.connect(Instant::now())?;
    assert_eq!(channel.ice_ufrag().len(), 16);
    assert_eq!(channel.ice_pwd().len(), 32);
    assert_eq!(
        channel.ports().next().unwrap().username(),
        channel.ice_ufrag()
    );
    Ok(())
}

#[test]
fn test_channel_close() -> Result<()> {
    let (mut channel, factory) = new_channel(
        vec![network("eth0", [192, 168, 1, 2]), network("wlan0", [10, 0, 0, 2])],
        &["1.2.3.4:3478"],
    );
    let now = Instant::now();
    channel.connect(now)?;
    channel.close()?;

    assert!(
        factory
            .net
            .borrow()
            .sockets
            .iter()
            .all(|s| s.state == SocketState::Closed)
    );
    assert!(channel.poll_event().is_none());
    assert_eq!(channel.poll_timeout(), None);
    assert_eq!(channel.connect(now), Err(Error::ErrPortClosed));
    Ok(())
}
