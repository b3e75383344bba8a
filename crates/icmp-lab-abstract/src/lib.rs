pub mod config;
pub mod packet;
pub mod scenario;

pub use packet::{EchoHeader, PayloadPolicy};
// Re-export the ICMP type numbers so callers can match on `icmp_type::ECHO_REPLY`
pub use packet::icmp_type;

pub use config::{LinkConfig, PingConfig, PingConfigOverride};
pub use scenario::{ScenarioAction, ScenarioAssertion, TestScenario};
