use crate::checksum::{internet_checksum, recompute};
use crate::error::PacketError;
use crate::ipv4;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use icmp_lab_abstract::packet::{HEADER_LEN, PAYLOAD_LEN};
use icmp_lab_abstract::{EchoHeader, PayloadPolicy};
use std::net::Ipv4Addr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

const TIMESTAMP_PREFIX: &str = "Timestamp: ";

/// Parsed view of an inbound ICMP message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoReply {
    pub header: EchoHeader,
    pub payload: Vec<u8>,
    /// Length of the IPv4 header that preceded the ICMP message
    pub ip_header_len: usize,
    /// Size of the whole datagram as handed over by the transport
    pub received_len: usize,
    pub source: Ipv4Addr,
}

impl EchoReply {
    /// Bytes of ICMP data, i.e. the datagram without its network header.
    pub fn icmp_len(&self) -> usize {
        self.received_len - self.ip_header_len
    }

    /// Send time carried in the payload, if the request used a timestamp payload.
    pub fn embedded_timestamp(&self) -> Option<SystemTime> {
        parse_timestamp(&self.payload)
    }
}

/// Serializes an ICMP header and payload, filling in the checksum.
pub fn encode(header: &EchoHeader, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    buf.put_u8(header.icmp_type);
    buf.put_u8(header.code);
    buf.put_u16(0);
    buf.put_u16(header.identifier);
    buf.put_u16(header.sequence);
    buf.put_slice(payload);

    let checksum = internet_checksum(&buf);
    buf[2..4].copy_from_slice(&checksum.to_be_bytes());
    buf.freeze()
}

/// Builds a complete echo request for `sequence`.
pub fn encode_request(
    identifier: u16,
    sequence: u16,
    policy: PayloadPolicy,
    now: SystemTime,
) -> Bytes {
    let header = EchoHeader::request(identifier, sequence);
    encode(&header, &request_payload(policy, now))
}

pub fn request_payload(policy: PayloadPolicy, now: SystemTime) -> [u8; PAYLOAD_LEN] {
    let mut payload = [0u8; PAYLOAD_LEN];
    match policy {
        PayloadPolicy::Filler(byte) => payload.fill(byte),
        PayloadPolicy::Timestamp => {
            let since_epoch = now.duration_since(UNIX_EPOCH).unwrap_or_default();
            let text = format!(
                "{TIMESTAMP_PREFIX}{}.{:06}",
                since_epoch.as_secs(),
                since_epoch.subsec_micros()
            );
            let len = text.len().min(PAYLOAD_LEN);
            payload[..len].copy_from_slice(&text.as_bytes()[..len]);
        }
    }
    payload
}

/// Reads a `seconds.microseconds` timestamp from the start of a payload.
///
/// The text may carry the `Timestamp: ` prefix and ends at the first NUL byte.
pub fn parse_timestamp(payload: &[u8]) -> Option<SystemTime> {
    let end = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
    let text = std::str::from_utf8(&payload[..end]).ok()?;
    let text = text.strip_prefix(TIMESTAMP_PREFIX).unwrap_or(text);

    let (secs, micros) = text.split_once('.')?;
    if micros.is_empty() || micros.len() > 6 || !micros.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let digits = micros.len() as u32;
    let secs: u64 = secs.parse().ok()?;
    let micros: u32 = micros.parse().ok()?;
    // "5.25" means 250000 microseconds
    let scale = 10u32.pow(6 - digits);
    UNIX_EPOCH.checked_add(Duration::new(secs, micros * scale * 1000))
}

/// Parses an inbound datagram: IPv4 header followed by an ICMP message.
///
/// The header length is taken from the IHL field, never assumed to be 20.
pub fn decode(datagram: &[u8], source: Ipv4Addr) -> Result<EchoReply, PacketError> {
    let ip_header_len = ipv4::header_len(datagram)?;
    let ip_header = &datagram[..ip_header_len];
    if !ipv4::header_checksum_valid(ip_header) {
        debug!("IPv4 header checksum from {} does not verify", source);
    }
    let source = if source.is_unspecified() {
        ipv4::source_address(ip_header).unwrap_or(source)
    } else {
        source
    };

    let icmp = &datagram[ip_header_len..];
    if icmp.len() < HEADER_LEN {
        return Err(PacketError::Truncated {
            needed: ip_header_len + HEADER_LEN,
            actual: datagram.len(),
        });
    }

    if let Some((carried, computed)) = recompute(icmp, 2) {
        if carried != computed {
            return Err(PacketError::ChecksumMismatch { carried, computed });
        }
    }

    let mut cursor = icmp;
    let header = EchoHeader {
        icmp_type: cursor.get_u8(),
        code: cursor.get_u8(),
        checksum: cursor.get_u16(),
        identifier: cursor.get_u16(),
        sequence: cursor.get_u16(),
    };

    Ok(EchoReply {
        header,
        payload: cursor.to_vec(),
        ip_header_len,
        received_len: datagram.len(),
        source,
    })
}
