use crate::checksum::internet_checksum;
use crate::error::PacketError;
use std::net::Ipv4Addr;

pub const MIN_HEADER_LEN: usize = 20;
pub const PROTOCOL_ICMP: u8 = 1;
const DEFAULT_TTL: u8 = 64;
const OPTION_NOP: u8 = 0x01;

/// Length in bytes of the IPv4 header that starts `datagram`.
///
/// Reads the IHL nibble (32-bit words) and checks the buffer actually holds
/// that many bytes, so callers can slice past the header without panicking.
pub fn header_len(datagram: &[u8]) -> Result<usize, PacketError> {
    let first = *datagram.first().ok_or(PacketError::Truncated {
        needed: MIN_HEADER_LEN,
        actual: 0,
    })?;

    let version = first >> 4;
    if version != 4 {
        return Err(PacketError::NotIpv4(version));
    }

    let len = usize::from(first & 0x0F) * 4;
    if len < MIN_HEADER_LEN {
        return Err(PacketError::BadHeaderLength(len));
    }
    if datagram.len() < len {
        return Err(PacketError::Truncated {
            needed: len,
            actual: datagram.len(),
        });
    }
    Ok(len)
}

/// A header with a correct checksum sums (checksum field included) to zero.
pub fn header_checksum_valid(header: &[u8]) -> bool {
    internet_checksum(header) == 0
}

/// Source address field of a header already validated by [`header_len`].
pub fn source_address(header: &[u8]) -> Option<Ipv4Addr> {
    let octets: [u8; 4] = header.get(12..16)?.try_into().ok()?;
    Some(Ipv4Addr::from(octets))
}

/// Builds an IPv4 header carrying ICMP, padded with `option_words` words of NOP options.
pub fn build_header(
    source: Ipv4Addr,
    destination: Ipv4Addr,
    payload_len: usize,
    option_words: u8,
) -> Vec<u8> {
    let ihl = 5 + option_words.min(10);
    let header_len = usize::from(ihl) * 4;
    let total_len = u16::try_from(header_len + payload_len).unwrap_or(u16::MAX);

    let mut header = Vec::with_capacity(header_len);
    header.push(0x40 | ihl);
    header.push(0); // DSCP/ECN
    header.extend_from_slice(&total_len.to_be_bytes());
    header.extend_from_slice(&0u16.to_be_bytes()); // identification
    header.extend_from_slice(&0x4000u16.to_be_bytes()); // don't fragment
    header.push(DEFAULT_TTL);
    header.push(PROTOCOL_ICMP);
    header.extend_from_slice(&[0, 0]);
    header.extend_from_slice(&source.octets());
    header.extend_from_slice(&destination.octets());
    header.resize(header_len, OPTION_NOP);

    let checksum = internet_checksum(&header);
    header[10..12].copy_from_slice(&checksum.to_be_bytes());
    header
}
