use serde::Serialize;
use std::fmt::Write;

/// Running totals for one ping session.
#[derive(Debug, Clone)]
pub struct Statistics {
    sent: u32,
    received: u32,
    total_ms: f64,
    min_ms: f64,
    max_ms: f64,
}

/// Snapshot of [`Statistics`] for machine-readable reports.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatisticsSummary {
    pub transmitted: u32,
    pub received: u32,
    pub loss_percent: f64,
    pub min_ms: Option<f64>,
    pub avg_ms: Option<f64>,
    pub max_ms: Option<f64>,
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new()
    }
}

impl Statistics {
    pub fn new() -> Self {
        Self {
            sent: 0,
            received: 0,
            total_ms: 0.0,
            // Sentinel larger than any real round trip
            min_ms: f64::MAX,
            max_ms: 0.0,
        }
    }

    pub fn record_sent(&mut self) {
        self.sent += 1;
    }

    /// Counts a matched reply. Ignored if it would make `received` exceed `sent`.
    pub fn record_received(&mut self, rtt_ms: f64) {
        if self.received >= self.sent {
            return;
        }
        self.received += 1;
        self.total_ms += rtt_ms;
        self.min_ms = self.min_ms.min(rtt_ms);
        self.max_ms = self.max_ms.max(rtt_ms);
    }

    pub fn sent(&self) -> u32 {
        self.sent
    }

    pub fn received(&self) -> u32 {
        self.received
    }

    pub fn lost(&self) -> u32 {
        self.sent - self.received
    }

    /// Percentage of transmitted requests that got no reply; 0 when nothing was sent.
    pub fn loss_rate(&self) -> f64 {
        if self.sent == 0 {
            return 0.0;
        }
        f64::from(self.lost()) / f64::from(self.sent) * 100.0
    }

    pub fn average(&self) -> f64 {
        if self.received == 0 {
            return 0.0;
        }
        self.total_ms / f64::from(self.received)
    }

    pub fn min(&self) -> Option<f64> {
        (self.received > 0).then_some(self.min_ms)
    }

    pub fn max(&self) -> Option<f64> {
        (self.received > 0).then_some(self.max_ms)
    }

    pub fn summary(&self) -> StatisticsSummary {
        StatisticsSummary {
            transmitted: self.sent,
            received: self.received,
            loss_percent: self.loss_rate(),
            min_ms: self.min(),
            avg_ms: (self.received > 0).then(|| self.average()),
            max_ms: self.max(),
        }
    }

    /// Final report printed when the session ends.
    pub fn render(&self, destination: &str) -> String {
        let mut out = String::new();
        let _ = writeln!(out);
        let _ = writeln!(out, "--- {destination} ping statistics ---");
        let _ = writeln!(
            out,
            "{} packets transmitted, {} received, {:.0}% packet loss",
            self.sent,
            self.received,
            self.loss_rate()
        );
        if let (Some(min), Some(max)) = (self.min(), self.max()) {
            let _ = writeln!(
                out,
                "round-trip min/avg/max = {:.3}/{:.3}/{:.3} ms",
                min,
                self.average(),
                max
            );
        }
        out
    }
}
