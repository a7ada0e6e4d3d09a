use bytes::BytesMut;
use clap::Parser;
use sansio::Protocol;
use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{ErrorKind, Write};
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::rc::Rc;
use std::str::FromStr;
use std::time::{Duration, Instant};

use p2p_ice::candidate::CandidateAddress;
use p2p_ice::network::{AddressFamily, Network};
use p2p_ice::port::{PortEvent, ServerAddresses, UdpPort, UdpPortConfig};
use p2p_ice::socket::{AsyncResolver, PacketSocket, PacketSocketFactory, SocketOption, SocketState};
use shared::error::*;
use shared::util::lookup_host;
use shared::{DiffServCodePoint, PacketOptions, TaggedBytesMut, TransportContext, TransportProtocol};

#[derive(Parser)]
#[command(name = "ICE Gather")]
#[command(author = "Rain Liu <yliu@webrtc.rs>")]
#[command(version = "0.1.0")]
#[command(about = "An example of gathering host and server reflexive candidates", long_about = None)]
struct Cli {
    #[arg(long, default_value_t = format!("stun.l.google.com:19302"))]
    server: String,
    /// Give up after this many seconds.
    #[arg(long, default_value_t = 15)]
    timeout: u64,

    #[arg(short, long)]
    debug: bool,
    #[arg(long, default_value_t = format!("INFO"))]
    log_level: String,
}

struct StdUdpSocket {
    socket: UdpSocket,
    options: HashMap<SocketOption, i32>,
    last_error: i32,
}

impl PacketSocket for StdUdpSocket {
    fn local_address(&self) -> Option<SocketAddr> {
        self.socket.local_addr().ok()
    }

    fn state(&self) -> SocketState {
        SocketState::Bound
    }

    fn send_to(
        &mut self,
        data: &[u8],
        remote: SocketAddr,
        _options: &PacketOptions,
    ) -> Result<usize> {
        self.socket.send_to(data, remote).map_err(|err| {
            self.last_error = err.raw_os_error().unwrap_or(-1);
            err.into()
        })
    }

    fn set_option(&mut self, option: SocketOption, value: i32) -> Result<()> {
        // std sockets expose none of these, remember them for get_option
        self.options.insert(option, value);
        Ok(())
    }

    fn get_option(&self, option: SocketOption) -> Result<i32> {
        self.options
            .get(&option)
            .copied()
            .ok_or_else(|| Error::Other(format!("{option} not set")))
    }

    fn last_error(&self) -> i32 {
        self.last_error
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Looks hostnames up synchronously and queues them for the driver loop to
/// report back to the port.
struct BlockingResolver {
    finished: Rc<RefCell<Vec<CandidateAddress>>>,
    result: Option<SocketAddr>,
    error: i32,
}

impl AsyncResolver for BlockingResolver {
    fn start(&mut self, address: &CandidateAddress) {
        let host = (address.hostname(), address.port());
        match lookup_host(true, host) {
            Ok(resolved) => self.result = Some(resolved),
            Err(err) => {
                log::warn!("lookup of {} failed: {}", address.hostname(), err);
                self.error = -1;
            }
        }
        self.finished.borrow_mut().push(address.clone());
    }

    fn error(&self) -> i32 {
        self.error
    }

    fn resolved_address(&self, family: AddressFamily) -> Option<SocketAddr> {
        self.result
            .filter(|addr| AddressFamily::of(&addr.ip()) == family)
    }

    fn destroy(&mut self) {}
}

#[derive(Default)]
struct StdSocketFactory {
    // a clone of every socket handed out, for the receive side
    sockets: RefCell<Vec<UdpSocket>>,
    finished: Rc<RefCell<Vec<CandidateAddress>>>,
}

impl PacketSocketFactory for StdSocketFactory {
    fn create_udp_socket(
        &self,
        address: SocketAddr,
        _min_port: u16,
        _max_port: u16,
    ) -> Result<Box<dyn PacketSocket>> {
        let socket = UdpSocket::bind(address)?;
        self.sockets.borrow_mut().push(socket.try_clone()?);
        Ok(Box::new(StdUdpSocket {
            socket,
            options: HashMap::new(),
            last_error: 0,
        }))
    }

    fn create_async_resolver(&self) -> Result<Box<dyn AsyncResolver>> {
        Ok(Box::new(BlockingResolver {
            finished: Rc::clone(&self.finished),
            result: None,
            error: 0,
        }))
    }
}

// The address the OS would route towards `server` from.
fn local_ip_towards(server: SocketAddr) -> Result<IpAddr> {
    let probe = UdpSocket::bind("0.0.0.0:0")?;
    probe.connect(server)?;
    Ok(probe.local_addr()?.ip())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.debug {
        let log_level = log::LevelFilter::from_str(&cli.log_level)
            .map_err(|err| Error::Other(err.to_string()))?;
        env_logger::Builder::new()
            .format(|buf, record| {
                writeln!(
                    buf,
                    "{}:{} [{}] {} - {}",
                    record.file().unwrap_or("unknown"),
                    record.line().unwrap_or(0),
                    record.level(),
                    buf.timestamp_micros(),
                    record.args()
                )
            })
            .filter(None, log_level)
            .init();
    }

    let (host, port) = cli
        .server
        .rsplit_once(':')
        .ok_or_else(|| Error::Other(format!("{} is not host:port", cli.server)))?;
    let port = port
        .parse::<u16>()
        .map_err(|err| Error::Other(err.to_string()))?;
    let local_ip = local_ip_towards(lookup_host(true, (host, port))?)?;
    println!("Local IP: {local_ip}");

    let factory = Rc::new(StdSocketFactory::default());
    let mut servers = ServerAddresses::new();
    servers.insert(CandidateAddress::from_hostname(host, port));
    let mut udp_port = UdpPort::new(
        UdpPortConfig {
            network: Network::new("default", "default route", local_ip, 32),
            content_name: "gather".to_owned(),
            server_addresses: servers,
            dscp: DiffServCodePoint::NoChange,
            ..Default::default()
        },
        Rc::clone(&factory) as Rc<dyn PacketSocketFactory>,
    );

    udp_port.init()?;
    let socket = factory
        .sockets
        .borrow_mut()
        .pop()
        .ok_or_else(|| Error::Other("no socket was created".to_owned()))?;
    let local_addr = socket.local_addr()?;
    udp_port.prepare_address(Instant::now())?;

    let deadline = Instant::now() + Duration::from_secs(cli.timeout);
    let mut buf = vec![0u8; 1500];
    'gather: loop {
        let finished: Vec<CandidateAddress> = factory.finished.borrow_mut().drain(..).collect();
        for address in finished {
            udp_port.on_resolve_result(&address, Instant::now());
        }

        while let Some(event) = udp_port.poll_event() {
            match event {
                PortEvent::CandidateReady(candidate) => {
                    println!(
                        "Candidate: {} {} priority {}",
                        candidate.candidate_type(),
                        candidate.address(),
                        candidate.priority()
                    );
                }
                PortEvent::PortComplete => {
                    println!("Gathering complete");
                    break 'gather;
                }
                PortEvent::PortError => {
                    println!("Gathering failed, no STUN server answered");
                    break 'gather;
                }
                _ => {}
            }
        }

        let now = Instant::now();
        if now >= deadline {
            println!("Gathering timed out");
            break;
        }
        let wait = udp_port
            .poll_timeout()
            .map_or(Duration::from_millis(100), |eto| eto.saturating_duration_since(now))
            .min(deadline - now)
            .max(Duration::from_millis(1));
        socket.set_read_timeout(Some(wait))?;

        match socket.recv_from(&mut buf) {
            Ok((n, peer_addr)) => {
                udp_port.handle_read(TaggedBytesMut {
                    now: Instant::now(),
                    transport: TransportContext {
                        local_addr,
                        peer_addr,
                        transport_protocol: TransportProtocol::UDP,
                        dscp: DiffServCodePoint::NoChange,
                    },
                    message: BytesMut::from(&buf[..n]),
                })?;
            }
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(err) => return Err(err.into()),
        }
        udp_port.handle_timeout(Instant::now())?;
    }

    udp_port.close()?;

    Ok(())
}
