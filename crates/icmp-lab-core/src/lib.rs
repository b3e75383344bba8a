//! ICMP echo engine: packet codec, raw-socket transport, request/reply
//! exchange and the session loop that ties them together.

pub mod cancel;
pub mod checksum;
pub mod codec;
pub mod console;
pub mod error;
pub mod exchange;
pub mod interface;
pub mod ipv4;
pub mod raw_socket;
pub mod session;
pub mod statistics;

pub use cancel::CancelFlag;
pub use codec::EchoReply;
pub use console::{Console, SharedBuffer};
pub use error::{PacketError, PingError, TransportError};
pub use exchange::{Exchange, ExchangeOutcome};
pub use interface::{IcmpTransport, Received};
pub use raw_socket::RawSocketTransport;
pub use session::PingSession;
pub use statistics::{Statistics, StatisticsSummary};

pub use icmp_lab_abstract::{EchoHeader, PayloadPolicy, PingConfig};
