use std::io;
use std::net::Ipv4Addr;
use thiserror::Error;

/// Failures of the raw network endpoint.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("permission denied opening raw ICMP socket (run as root or grant CAP_NET_RAW)")]
    Permission(#[source] io::Error),

    #[error("failed to open raw ICMP socket")]
    Resource(#[source] io::Error),

    #[error("failed to transmit echo request to {destination}")]
    Transmit {
        destination: Ipv4Addr,
        #[source]
        source: io::Error,
    },

    #[error("failed to receive from raw ICMP socket")]
    Receive(#[source] io::Error),

    #[error("transport is closed")]
    Closed,
}

/// Reasons an inbound datagram could not be read as an ICMP message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("datagram too short: need {needed} bytes, got {actual}")]
    Truncated { needed: usize, actual: usize },

    #[error("not an IPv4 datagram (version {0})")]
    NotIpv4(u8),

    #[error("IPv4 header length {0} is below the 20 byte minimum")]
    BadHeaderLength(usize),

    #[error("ICMP checksum mismatch: carried {carried:#06x}, computed {computed:#06x}")]
    ChecksumMismatch { carried: u16, computed: u16 },
}

/// Errors that end a ping run before or while it starts.
#[derive(Debug, Error)]
pub enum PingError {
    #[error("invalid destination '{0}': expected a numeric IPv4 address")]
    InvalidDestination(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl PingError {
    /// True when the failure is the missing raw-socket privilege.
    pub fn is_permission(&self) -> bool {
        matches!(self, PingError::Transport(TransportError::Permission(_)))
    }
}
