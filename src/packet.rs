use std::net::Ipv4Addr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{PingError, Result};
use crate::util;

pub const ICMP_HEADER_LEN: usize = 8;
pub const MIN_IPV4_HEADER_LEN: usize = 20;

/// Largest echo payload that still fits in one IPv4 datagram
pub const MAX_PAYLOAD: usize = 65535 - MIN_IPV4_HEADER_LEN - ICMP_HEADER_LEN;

pub const ECHO_REPLY: u8 = 0;
pub const DEST_UNREACHABLE: u8 = 3;
pub const ECHO_REQUEST: u8 = 8;
pub const TIME_EXCEEDED: u8 = 11;

/// Byte offset of the checksum inside the ICMP header
const CHECKSUM_OFFSET: usize = 2;

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct ICMPEchoPacket {
    pub message_type: u8,
    pub message_code: u8,
    pub checksum: u16,
    pub identifier: u16,
    pub sequence_num: u16,
}

impl ICMPEchoPacket {
    /// Network byte order, same layout the big endian coder produces
    pub fn to_bytes(&self) -> [u8; ICMP_HEADER_LEN] {
        let mut bytes = [0u8; ICMP_HEADER_LEN];
        bytes[0] = self.message_type;
        bytes[1] = self.message_code;
        bytes[2..4].copy_from_slice(&self.checksum.to_be_bytes());
        bytes[4..6].copy_from_slice(&self.identifier.to_be_bytes());
        bytes[6..8].copy_from_slice(&self.sequence_num.to_be_bytes());
        bytes
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct IPv4Header {
    pub version_and_header_len: u8,
    pub type_of_service: u8,
    pub datagram_length: u16,
    pub ip_identifier: u16,
    pub flags_and_5frag_offset: u8, // flags are u3
    pub rest_of_frag_offset: u8,
    pub ttl: u8,
    pub protocol: u8,
    pub checksum: u16,
    pub source_ip: u32,
    pub destination_ip: u32,
}

impl IPv4Header {
    /// Header length in bytes, from the IHL nibble (counted in 32 bit words)
    pub fn header_len(&self) -> usize {
        4 * usize::from(self.version_and_header_len & 0x0F)
    }
}

/// What goes into the echo payload. The receiver never interprets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFill {
    Zeros,
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyType {
    EchoReply,
    EchoRequest,
    DestinationUnreachable,
    TimeExceeded,
    Other(u8),
}

impl From<u8> for ReplyType {
    fn from(t: u8) -> Self {
        match t {
            ECHO_REPLY => ReplyType::EchoReply,
            ECHO_REQUEST => ReplyType::EchoRequest,
            DEST_UNREACHABLE => ReplyType::DestinationUnreachable,
            TIME_EXCEEDED => ReplyType::TimeExceeded,
            other => ReplyType::Other(other),
        }
    }
}

/// The fields we care about from a datagram read off the raw socket.
#[derive(Debug, Clone, PartialEq)]
pub struct EchoReply {
    pub source: Ipv4Addr,
    pub ttl: u8,
    pub ip_header_len: usize,
    pub total_len: usize,

    pub mtype: ReplyType,
    pub code: u8,
    pub identifier: u16,
    pub sequence: u16,
    pub checksum_ok: bool,

    /// Identifier and sequence of the echo request quoted by an ICMP error message
    pub quoted: Option<(u16, u16)>,
}

impl EchoReply {
    /// Bytes of echoed data, i.e. everything past the IP and ICMP headers
    pub fn payload_len(&self) -> usize {
        self.total_len - self.ip_header_len - ICMP_HEADER_LEN
    }
}

fn coder() -> bincode::Config {
    let mut coder = bincode::config();
    coder.big_endian(); // Network byte order
    coder
}

/// Build a checksummed echo request of `ICMP_HEADER_LEN + payload_size` bytes.
pub fn encode_echo_request(identifier: u16, sequence: u16, payload_size: usize, fill: PayloadFill) -> Vec<u8> {
    let pack = ICMPEchoPacket {
        message_type: ECHO_REQUEST,
        message_code: 0,
        checksum: 0,
        identifier,
        sequence_num: sequence,
    };

    let mut data = pack.to_bytes().to_vec();
    data.resize(ICMP_HEADER_LEN + payload_size, 0);
    if fill == PayloadFill::Random {
        rand::thread_rng().fill(&mut data[ICMP_HEADER_LEN..]);
    }

    util::set_checksum(&mut data, CHECKSUM_OFFSET);
    data
}

/// Decode the ICMP header at the start of `icmp` (no IP header in front).
pub fn decode_echo_header(icmp: &[u8]) -> Result<ICMPEchoPacket> {
    if icmp.len() < ICMP_HEADER_LEN {
        return Err(PingError::TruncatedPacket { len: icmp.len(), needed: ICMP_HEADER_LEN });
    }
    Ok(coder().deserialize(&icmp[..ICMP_HEADER_LEN])?)
}

/// Decode a datagram as delivered by a raw IPv4 socket: IP header, then the ICMP message.
pub fn decode_reply(buf: &[u8]) -> Result<EchoReply> {
    let min_len = MIN_IPV4_HEADER_LEN + ICMP_HEADER_LEN;
    if buf.len() < min_len {
        return Err(PingError::TruncatedPacket { len: buf.len(), needed: min_len });
    }

    let ip_packet: IPv4Header = coder().deserialize(&buf[..MIN_IPV4_HEADER_LEN])?;
    if ip_packet.version_and_header_len >> 4 != 4 {
        return Err(PingError::Malformed(format!(
            "IP version {} is not 4", ip_packet.version_and_header_len >> 4)));
    }

    let data_offset = ip_packet.header_len();
    if data_offset < MIN_IPV4_HEADER_LEN {
        return Err(PingError::Malformed(format!("IP header length {} is below 20", data_offset)));
    }
    if buf.len() < data_offset + ICMP_HEADER_LEN {
        return Err(PingError::TruncatedPacket { len: buf.len(), needed: data_offset + ICMP_HEADER_LEN });
    }

    // The ICMP portion will be located after the IP header, options included
    let icmp = &buf[data_offset..];
    let icmp_packet = decode_echo_header(icmp)?;
    let mtype = ReplyType::from(icmp_packet.message_type);

    let quoted = match mtype {
        ReplyType::DestinationUnreachable | ReplyType::TimeExceeded => quoted_echo(&icmp[ICMP_HEADER_LEN..]),
        _ => None,
    };

    Ok(EchoReply {
        source: Ipv4Addr::from(ip_packet.source_ip),
        ttl: ip_packet.ttl,
        ip_header_len: data_offset,
        total_len: buf.len(),

        mtype,
        code: icmp_packet.message_code,
        identifier: icmp_packet.identifier,
        sequence: icmp_packet.sequence_num,
        checksum_ok: util::verify_checksum(icmp),
        quoted,
    })
}

/// ICMP errors carry the offending IP header plus the first 8 bytes of its payload.
/// If that payload is one of our echo requests, return its identifier and sequence.
fn quoted_echo(body: &[u8]) -> Option<(u16, u16)> {
    let inner: IPv4Header = coder().deserialize(body.get(..MIN_IPV4_HEADER_LEN)?).ok()?;
    let offset = inner.header_len();
    if offset < MIN_IPV4_HEADER_LEN {
        return None;
    }

    let echo = decode_echo_header(body.get(offset..)?).ok()?;
    if echo.message_type != ECHO_REQUEST {
        return None;
    }
    Some((echo.identifier, echo.sequence_num))
}
