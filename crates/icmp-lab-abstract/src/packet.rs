use serde::{Deserialize, Serialize};

/// ICMP message types this client cares about
pub mod icmp_type {
    pub const ECHO_REPLY: u8 = 0;
    pub const DEST_UNREACHABLE: u8 = 3;
    pub const ECHO_REQUEST: u8 = 8;
    pub const TIME_EXCEEDED: u8 = 11;
}

/// Size of the ICMP echo header on the wire.
pub const HEADER_LEN: usize = 8;
/// Size of the echo payload carried by every request.
pub const PAYLOAD_LEN: usize = 56;
/// Full ICMP record: header plus payload.
pub const PACKET_LEN: usize = HEADER_LEN + PAYLOAD_LEN;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct EchoHeader {
    /// ICMP type (8 for requests, 0 for replies)
    pub icmp_type: u8,
    pub code: u8,
    /// Internet checksum over header and payload, zero while it is being computed
    pub checksum: u16,
    /// Session tag, derived from the process id
    pub identifier: u16,
    /// Per-packet counter used to match replies
    pub sequence: u16,
}

impl EchoHeader {
    pub fn request(identifier: u16, sequence: u16) -> Self {
        Self {
            icmp_type: icmp_type::ECHO_REQUEST,
            identifier,
            sequence,
            ..Default::default()
        }
    }

    pub fn reply(identifier: u16, sequence: u16) -> Self {
        Self {
            icmp_type: icmp_type::ECHO_REPLY,
            identifier,
            sequence,
            ..Default::default()
        }
    }

    pub fn is_echo_reply(&self) -> bool {
        self.icmp_type == icmp_type::ECHO_REPLY
    }

    pub fn is_echo_request(&self) -> bool {
        self.icmp_type == icmp_type::ECHO_REQUEST
    }
}

/// What the 56 payload bytes of an echo request carry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PayloadPolicy {
    /// `Timestamp: <seconds>.<microseconds>` taken at encode time, zero padded
    #[default]
    Timestamp,
    /// Every payload byte set to the given value
    Filler(u8),
}
