use crate::codec::{self, EchoReply};
use crate::console::Console;
use crate::interface::{IcmpTransport, Received};
use crate::statistics::Statistics;
use icmp_lab_abstract::PayloadPolicy;
use serde::Serialize;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, trace, warn};

/// Large enough for an Ethernet-MTU datagram.
const RECV_BUF_LEN: usize = 1500;

/// Slack allowed between the wall-clock (payload) and monotonic round-trip measurements.
const CLOCK_SLACK: Duration = Duration::from_millis(1);

/// How a single request/reply cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExchangeOutcome {
    Matched {
        sequence: u16,
        rtt_ms: f64,
        bytes: usize,
    },
    TimedOut {
        sequence: u16,
    },
    SendFailed {
        sequence: u16,
    },
}

impl ExchangeOutcome {
    pub fn sequence(&self) -> u16 {
        match *self {
            ExchangeOutcome::Matched { sequence, .. }
            | ExchangeOutcome::TimedOut { sequence }
            | ExchangeOutcome::SendFailed { sequence } => sequence,
        }
    }

    pub fn is_matched(&self) -> bool {
        matches!(self, ExchangeOutcome::Matched { .. })
    }
}

/// What to do with one decoded inbound message.
enum Verdict {
    Match,
    /// Not an echo reply at all
    WrongType(u8),
    /// Echo reply for another process
    ForeignIdentifier(u16),
    /// Echo reply for an earlier (already timed out) request
    Stale(u16),
}

/// Runs request/reply cycles against one destination.
pub struct Exchange {
    destination: Ipv4Addr,
    identifier: u16,
    payload: PayloadPolicy,
    timeout: Duration,
}

impl Exchange {
    pub fn new(
        destination: Ipv4Addr,
        identifier: u16,
        payload: PayloadPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            destination,
            identifier,
            payload,
            timeout,
        }
    }

    /// Sends the request for `sequence` and waits for its reply.
    ///
    /// `sent` is counted only once the transport accepted the packet; `received`
    /// only for an echo reply carrying our identifier and this sequence.
    pub fn run<T: IcmpTransport + ?Sized>(
        &self,
        transport: &mut T,
        sequence: u16,
        stats: &mut Statistics,
        console: &mut Console,
    ) -> ExchangeOutcome {
        let started = Instant::now();
        let packet =
            codec::encode_request(self.identifier, sequence, self.payload, SystemTime::now());

        if let Err(e) = transport.send(self.destination, &packet) {
            warn!("icmp_seq={}: {}: {}", sequence, e, error_cause(&e));
            return ExchangeOutcome::SendFailed { sequence };
        }
        stats.record_sent();

        let deadline = started + self.timeout;
        let mut buf = [0u8; RECV_BUF_LEN];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            let (len, source) = match transport.poll_receive(&mut buf, remaining) {
                Ok(Received::Datagram { len, source }) => (len.min(buf.len()), source),
                Ok(Received::Timeout) => break,
                Err(e) => {
                    warn!("icmp_seq={}: {}: {}", sequence, e, error_cause(&e));
                    break;
                }
            };
            let received_at = SystemTime::now();

            let reply = match codec::decode(&buf[..len], source) {
                Ok(reply) => reply,
                Err(e) => {
                    debug!("Discarding {} byte datagram from {}: {}", len, source, e);
                    continue;
                }
            };

            match self.judge(&reply, sequence) {
                Verdict::Match => {
                    let rtt_ms = round_trip_ms(&reply, received_at, started);
                    stats.record_received(rtt_ms);
                    console.line(format_args!(
                        "{} bytes from {}: icmp_seq={} time={:.3} ms",
                        reply.icmp_len(),
                        reply.source,
                        sequence,
                        rtt_ms
                    ));
                    return ExchangeOutcome::Matched {
                        sequence,
                        rtt_ms,
                        bytes: reply.icmp_len(),
                    };
                }
                Verdict::WrongType(icmp_type) => {
                    console.line(format_args!(
                        "Received ICMP packet with type {icmp_type} (not Echo Reply)"
                    ));
                }
                Verdict::ForeignIdentifier(identifier) => {
                    trace!("Ignoring echo reply for identifier {}", identifier);
                }
                Verdict::Stale(stale) => {
                    debug!(
                        "Draining stale reply icmp_seq={} while waiting for {}",
                        stale, sequence
                    );
                }
            }
        }

        console.line(format_args!("Request timeout for icmp_seq={sequence}"));
        ExchangeOutcome::TimedOut { sequence }
    }

    fn judge(&self, reply: &EchoReply, sequence: u16) -> Verdict {
        let header = &reply.header;
        if !header.is_echo_reply() {
            Verdict::WrongType(header.icmp_type)
        } else if header.identifier != self.identifier {
            Verdict::ForeignIdentifier(header.identifier)
        } else if header.sequence != sequence {
            Verdict::Stale(header.sequence)
        } else {
            Verdict::Match
        }
    }
}

/// Round trip in milliseconds, preferring the send time echoed in the payload.
///
/// The monotonic clock started before sending bounds the result; an embedded
/// timestamp that is missing, in the future, or beyond that bound is ignored.
fn round_trip_ms(reply: &EchoReply, received_at: SystemTime, started: Instant) -> f64 {
    let elapsed = started.elapsed();
    reply
        .embedded_timestamp()
        .and_then(|sent_at| received_at.duration_since(sent_at).ok())
        .filter(|rtt| *rtt <= elapsed + CLOCK_SLACK)
        .unwrap_or(elapsed)
        .as_secs_f64()
        * 1000.0
}

fn error_cause(e: &dyn std::error::Error) -> String {
    e.source().map(|s| s.to_string()).unwrap_or_default()
}
