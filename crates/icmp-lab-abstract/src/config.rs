use crate::packet::PayloadPolicy;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PingConfig {
    /// Number of echo requests to send
    pub count: u32,
    /// Seconds to wait between two requests
    pub interval_secs: f64,
    /// Upper bound for a single reply wait, in milliseconds
    pub timeout_ms: f64,
    pub payload: PayloadPolicy,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            count: 4,
            interval_secs: 1.0,
            timeout_ms: 1000.0,
            payload: PayloadPolicy::Timestamp,
        }
    }
}

/// Longest accepted reply wait or inter-request interval (one day).
const MAX_WAIT_SECS: f64 = 86_400.0;

impl PingConfig {
    /// Checks the numeric fields, returning a description of the first bad one.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=MAX_WAIT_SECS).contains(&self.interval_secs) {
            return Err(format!(
                "interval must be between 0 and {MAX_WAIT_SECS} seconds, got {}",
                self.interval_secs
            ));
        }
        if !(self.timeout_ms > 0.0 && self.timeout_ms <= MAX_WAIT_SECS * 1000.0) {
            return Err(format!(
                "timeout must be positive and at most {} ms, got {}",
                MAX_WAIT_SECS * 1000.0,
                self.timeout_ms
            ));
        }
        Ok(())
    }
}

/// Behaviour of the simulated link used by tests and scenario runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LinkConfig {
    pub loss_rate: f64,
    /// Bounds of the per-reply delay, sampled uniformly; receivers really wait it out
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
    pub seed: u64,
    /// Extra 32-bit words of IPv4 options prepended to every reply
    pub ip_option_words: u8,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            min_latency_ms: 1,
            max_latency_ms: 5,
            seed: 0,
            ip_option_words: 0,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct PingConfigOverride {
    pub count: Option<u32>,
    pub interval_secs: Option<f64>,
    pub timeout_ms: Option<f64>,
    pub payload: Option<PayloadPolicy>,
}

impl PingConfigOverride {
    pub fn apply_to(&self, config: &mut PingConfig) {
        if let Some(v) = self.count {
            config.count = v;
        }
        if let Some(v) = self.interval_secs {
            config.interval_secs = v;
        }
        if let Some(v) = self.timeout_ms {
            config.timeout_ms = v;
        }
        if let Some(v) = self.payload {
            config.payload = v;
        }
    }
}
