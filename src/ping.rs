use std::io::{self, ErrorKind};
use std::net::{Ipv4Addr, SocketAddr};
use std::thread;
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, SockAddr, Socket};
use tracing::{debug, trace, warn};

use crate::config::Session;
use crate::error::{PingError, Result};
use crate::packet::{self, ReplyType};

/// Largest datagram a raw IPv4 socket can hand us
const RECV_BUFFER_LEN: usize = 65535;

/// Where echo requests go out and datagrams come back in.
pub trait Channel {
    /// Bound the next blocking send/recv to `timeout` (never zero)
    fn set_deadline(&mut self, timeout: Duration) -> io::Result<()>;
    fn send(&mut self, packet: &[u8]) -> io::Result<usize>;
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Raw ICMPv4 socket aimed at the target. Closed when dropped.
///
/// The socket stays unconnected so ICMP errors sent by routers along the path reach us
/// too; the engine sorts out which datagrams belong to the probe in flight.
pub struct RawChannel {
    socket: Socket,
    sock_addr: SockAddr,
}

impl RawChannel {
    pub fn open(address: Ipv4Addr, ttl: Option<u32>) -> io::Result<Self> {
        let stype = socket2::Type::raw().cloexec();
        let socket = Socket::new(Domain::ipv4(), stype, Some(Protocol::icmpv4()))?;

        if let Some(t) = ttl {
            socket.set_ttl(t)?;
        }

        Ok(RawChannel {
            socket,
            sock_addr: SockAddr::from(SocketAddr::from((address, 0))),
        })
    }
}

impl Channel for RawChannel {
    fn set_deadline(&mut self, timeout: Duration) -> io::Result<()> {
        self.socket.set_read_timeout(Some(timeout))?;
        self.socket.set_write_timeout(Some(timeout))
    }

    fn send(&mut self, packet: &[u8]) -> io::Result<usize> {
        self.socket.send_to(packet, &self.sock_addr)
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let (len, _from) = self.socket.recv_from(buf)?;
        Ok(len)
    }
}

/// A reply to one of our echo requests.
#[derive(Debug, Clone, PartialEq)]
pub struct PongResult {
    pub address: Ipv4Addr,
    pub sequence: u16,
    pub ttl: u8,
    pub size: usize,
    pub rtt: Duration,
}

/// How one probe of the sequence ended.
#[derive(Debug)]
pub struct ProbeOutcome {
    pub sequence: u16,
    pub result: Result<PongResult>,
}

impl ProbeOutcome {
    pub fn is_reply(&self) -> bool {
        self.result.is_ok()
    }
}

pub struct Pinger<C> {
    channel: C,
}

impl Pinger<RawChannel> {
    /// Open the raw socket. Needs CAP_NET_RAW (or root).
    pub fn open(address: Ipv4Addr, ttl: Option<u32>) -> Result<Self> {
        let channel = RawChannel::open(address, ttl).map_err(PingError::Connect)?;
        debug!(%address, "raw ICMP socket open");
        Ok(Pinger { channel })
    }
}

impl<C: Channel> Pinger<C> {
    pub fn with_channel(channel: C) -> Self {
        Pinger { channel }
    }

    /// Send `session.count` probes in order, handing each outcome to `on_outcome` as it
    /// arrives. A failed probe never stops the sequence.
    pub fn run_sequence<F>(&mut self, session: &Session, mut on_outcome: F) -> Vec<ProbeOutcome>
    where
        F: FnMut(&ProbeOutcome),
    {
        let mut outcomes = Vec::with_capacity(usize::from(session.count));

        for i in 0..session.count {
            let result = self.probe(session, i);
            if let Err(e) = &result {
                match e {
                    PingError::Io(_) => warn!(sequence = i, error = %e, "probe failed"),
                    _ => debug!(sequence = i, error = %e, "probe failed"),
                }
            }

            let outcome = ProbeOutcome { sequence: i, result };
            on_outcome(&outcome);
            outcomes.push(outcome);

            if i + 1 < session.count && session.interval > Duration::from_secs(0) {
                thread::sleep(session.interval);
            }
        }

        outcomes
    }

    /// One request/reply exchange. Identifier and sequence are both `index`.
    pub fn probe(&mut self, session: &Session, index: u16) -> Result<PongResult> {
        let request = packet::encode_echo_request(index, index, session.payload_size, session.fill);

        let begin_time = Instant::now();
        let end_time = begin_time + session.timeout;

        self.channel.set_deadline(session.timeout).map_err(PingError::Io)?;
        self.channel.send(&request).map_err(PingError::Io)?;
        trace!(sequence = index, bytes = request.len(), "echo request sent");

        let mut buf = vec![0; RECV_BUFFER_LEN];
        loop {
            let relative_timeout = end_time.saturating_duration_since(Instant::now());
            if relative_timeout == Duration::from_secs(0) {
                return Err(PingError::Timeout(session.timeout));
            }

            self.channel.set_deadline(relative_timeout).map_err(PingError::Io)?;
            let len = match self.channel.recv(&mut buf) {
                Ok(n) => n,
                Err(e) if is_timeout(&e) => return Err(PingError::Timeout(session.timeout)),
                Err(e) => return Err(PingError::Io(e)),
            };
            let rtt = begin_time.elapsed();

            let reply = packet::decode_reply(&buf[..len])?;
            if !reply.checksum_ok {
                debug!(sequence = index, from = %reply.source, "dropping reply with bad checksum");
                continue;
            }

            match reply.mtype {
                ReplyType::EchoReply
                    if reply.source == session.target && reply.identifier == index && reply.sequence == index =>
                {
                    return Ok(PongResult {
                        address: reply.source,
                        sequence: reply.sequence,
                        ttl: reply.ttl,
                        size: reply.payload_len(),
                        rtt,
                    });
                }
                ReplyType::DestinationUnreachable if quotes(&reply, index) => {
                    return Err(PingError::Unreachable { from: reply.source, code: reply.code });
                }
                ReplyType::TimeExceeded if quotes(&reply, index) => {
                    return Err(PingError::TimeExceeded { from: reply.source });
                }
                _ => {
                    // Our own request looped back, a stale reply, another host's reply, or unrelated traffic
                    trace!(sequence = index, mtype = ?reply.mtype, id = reply.identifier,
                        seq = reply.sequence, "ignoring datagram");
                    continue;
                }
            }
        }
    }
}

/// An error message is ours only if it quotes this probe. The socket sees every ICMP
/// message the host receives, so anything else belongs to someone else.
fn quotes(reply: &packet::EchoReply, index: u16) -> bool {
    reply.quoted == Some((index, index))
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}
