use crate::config::{LinkConfig, PingConfigOverride};
use serde::Deserialize;

fn default_destination() -> String {
    "192.0.2.1".to_string()
}

#[derive(Deserialize, Debug, Clone)]
pub struct TestScenario {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Address pinged by the session; only used for output in simulation
    #[serde(default = "default_destination")]
    pub destination: String,
    #[serde(default)]
    pub config: PingConfigOverride,
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub actions: Vec<ScenarioAction>,
    #[serde(default)]
    pub assertions: Vec<ScenarioAssertion>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScenarioAction {
    /// Never answer the request with the given sequence
    DropReply { seq: u16 },
    /// Answer the request only after its wait has expired, so it shows up as stale
    LateReply { seq: u16 },
    /// Fail the transmission of the request with the given sequence
    FailSend { seq: u16 },
    /// Deliver an ICMP message of another type ahead of the reply
    InjectType { seq: u16, icmp_type: u8 },
    /// Deliver an echo reply carrying a different identifier ahead of the reply
    InjectForeignReply { seq: u16 },
    /// Deliver a truncated datagram ahead of the reply
    InjectGarbage { seq: u16, len: usize },
    /// Request cancellation once this many requests have been transmitted
    CancelAfterSends { sends: u32 },
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScenarioAssertion {
    /// Assert the number of transmitted requests
    Transmitted { count: u32 },
    /// Assert the number of matched replies
    Received { count: u32 },
    /// Assert that the console output contains the text
    OutputContains { text: String },
    /// Assert that the console output does not contain the text
    OutputLacks { text: String },
}
