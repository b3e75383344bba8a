use icmp_lab_abstract::packet::HEADER_LEN;
use icmp_lab_abstract::{EchoHeader, LinkConfig, ScenarioAction};
use icmp_lab_core::checksum::internet_checksum;
use icmp_lab_core::{CancelFlag, IcmpTransport, Received, TransportError, codec, ipv4};
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::VecDeque;
use std::io;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};
use tracing::debug;

/// A compact textual summary of what the simulated link did, for reports.
#[derive(Debug, Clone, Serialize)]
pub struct LinkEventSummary {
    pub sequence: u16,
    pub description: String,
}

/// Extra traffic delivered ahead of the reply to a given request.
#[derive(Debug, Clone, Copy)]
enum Injection {
    Type(u8),
    ForeignReply,
    Garbage(usize),
}

/// A datagram waiting to be picked up by `poll_receive`.
#[derive(Debug)]
struct InFlight {
    datagram: Vec<u8>,
    source: Ipv4Addr,
    /// Arrival time; `None` holds it back until the current wait has expired
    due: Option<Instant>,
}

/// In-process stand-in for the raw socket.
///
/// Echo requests are answered after a latency sampled from the link config
/// unless loss or a deterministic fault says otherwise. `poll_receive` blocks
/// until the next datagram is due or the caller's wait runs out, so measured
/// round trips reflect the configured latency. A reply that misses the wait is
/// handed out on the next poll, where it shows up as stale.
pub struct SimulatedTransport {
    config: LinkConfig,
    rng: rand::rngs::StdRng,
    local: Ipv4Addr,
    inbound: VecDeque<InFlight>,
    closed: bool,

    /// Requests accepted for transmission
    pub sent_count: u32,
    pub link_events: Vec<LinkEventSummary>,

    // Deterministic fault injection, each entry consumed once
    drop_reply_once: Vec<u16>,
    late_reply_once: Vec<u16>,
    fail_send_once: Vec<u16>,
    injections: Vec<(u16, Injection)>,
    cancel_after: Option<(u32, CancelFlag)>,
}

impl SimulatedTransport {
    pub fn new(config: LinkConfig) -> Self {
        let rng = rand::rngs::StdRng::seed_from_u64(config.seed);
        Self {
            config,
            rng,
            local: Ipv4Addr::new(192, 0, 2, 100),
            inbound: VecDeque::new(),
            closed: false,
            sent_count: 0,
            link_events: Vec::new(),
            drop_reply_once: Vec::new(),
            late_reply_once: Vec::new(),
            fail_send_once: Vec::new(),
            injections: Vec::new(),
            cancel_after: None,
        }
    }

    /// Register a deterministic fault: never answer the request with `seq`.
    pub fn add_drop_reply(&mut self, seq: u16) {
        self.drop_reply_once.push(seq);
    }

    /// Register a deterministic fault: answer `seq` only after its wait expired.
    pub fn add_late_reply(&mut self, seq: u16) {
        self.late_reply_once.push(seq);
    }

    /// Register a deterministic fault: refuse to transmit `seq`.
    pub fn add_fail_send(&mut self, seq: u16) {
        self.fail_send_once.push(seq);
    }

    /// Deliver an ICMP message of `icmp_type` ahead of the reply to `seq`.
    pub fn inject_type(&mut self, seq: u16, icmp_type: u8) {
        self.injections.push((seq, Injection::Type(icmp_type)));
    }

    /// Deliver an echo reply for another identifier ahead of the reply to `seq`.
    pub fn inject_foreign_reply(&mut self, seq: u16) {
        self.injections.push((seq, Injection::ForeignReply));
    }

    /// Deliver `len` bytes of truncated junk ahead of the reply to `seq`.
    pub fn inject_garbage(&mut self, seq: u16, len: usize) {
        self.injections.push((seq, Injection::Garbage(len)));
    }

    /// Set `flag` once `sends` requests have been transmitted.
    pub fn cancel_after(&mut self, sends: u32, flag: CancelFlag) {
        self.cancel_after = Some((sends, flag));
    }

    pub fn apply_action(&mut self, action: &ScenarioAction, flag: &CancelFlag) {
        match *action {
            ScenarioAction::DropReply { seq } => self.add_drop_reply(seq),
            ScenarioAction::LateReply { seq } => self.add_late_reply(seq),
            ScenarioAction::FailSend { seq } => self.add_fail_send(seq),
            ScenarioAction::InjectType { seq, icmp_type } => self.inject_type(seq, icmp_type),
            ScenarioAction::InjectForeignReply { seq } => self.inject_foreign_reply(seq),
            ScenarioAction::InjectGarbage { seq, len } => self.inject_garbage(seq, len),
            ScenarioAction::CancelAfterSends { sends } => self.cancel_after(sends, flag.clone()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Datagrams delivered but never read.
    pub fn pending(&self) -> usize {
        self.inbound.len()
    }

    fn record(&mut self, sequence: u16, description: String) {
        debug!("[link] icmp_seq={} {}", sequence, description);
        self.link_events.push(LinkEventSummary {
            sequence,
            description,
        });
    }

    fn take_once(list: &mut Vec<u16>, seq: u16) -> bool {
        match list.iter().position(|s| *s == seq) {
            Some(pos) => {
                list.remove(pos);
                true
            }
            None => false,
        }
    }

    fn deliver(&mut self, source: Ipv4Addr, icmp: &[u8], due: Option<Instant>) {
        let mut datagram =
            ipv4::build_header(source, self.local, icmp.len(), self.config.ip_option_words);
        datagram.extend_from_slice(icmp);
        self.inbound.push_back(InFlight {
            datagram,
            source,
            due,
        });
    }

    fn inject(&mut self, destination: Ipv4Addr, request: &EchoHeader, injection: Injection) {
        match injection {
            Injection::Type(icmp_type) => {
                let header = EchoHeader {
                    icmp_type,
                    ..Default::default()
                };
                // Error messages quote the offending IPv4 header and 8 bytes of ICMP
                let icmp = codec::encode(&header, &[0u8; 28]);
                self.deliver(destination, &icmp, Some(Instant::now()));
                self.record(request.sequence, format!("injected ICMP type {icmp_type}"));
            }
            Injection::ForeignReply => {
                let foreign =
                    EchoHeader::reply(request.identifier.wrapping_add(1), request.sequence);
                let icmp = codec::encode(&foreign, &[0u8; 56]);
                self.deliver(destination, &icmp, Some(Instant::now()));
                self.record(request.sequence, "injected foreign echo reply".to_string());
            }
            Injection::Garbage(len) => {
                let mut datagram = vec![0u8; len];
                if let Some(first) = datagram.first_mut() {
                    *first = 0x45;
                }
                self.inbound.push_back(InFlight {
                    datagram,
                    source: destination,
                    due: Some(Instant::now()),
                });
                self.record(request.sequence, format!("injected {len} garbage bytes"));
            }
        }
    }

    fn sample_latency(&mut self) -> Duration {
        let min = self.config.min_latency_ms;
        let max = self.config.max_latency_ms.max(min);
        Duration::from_millis(self.rng.random_range(min..=max))
    }
}

impl IcmpTransport for SimulatedTransport {
    fn send(&mut self, destination: Ipv4Addr, packet: &[u8]) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }

        if packet.len() < HEADER_LEN || internet_checksum(packet) != 0 {
            // A real network drops corrupt packets without telling anyone
            debug!("[link] dropping malformed request of {} bytes", packet.len());
            return Ok(());
        }
        let request = EchoHeader {
            icmp_type: packet[0],
            code: packet[1],
            checksum: u16::from_be_bytes([packet[2], packet[3]]),
            identifier: u16::from_be_bytes([packet[4], packet[5]]),
            sequence: u16::from_be_bytes([packet[6], packet[7]]),
        };
        let seq = request.sequence;

        if Self::take_once(&mut self.fail_send_once, seq) {
            self.record(seq, "transmit failed".to_string());
            return Err(TransportError::Transmit {
                destination,
                source: io::Error::new(
                    io::ErrorKind::NetworkUnreachable,
                    "simulated send failure",
                ),
            });
        }

        self.sent_count += 1;
        self.record(seq, format!("sent {} bytes to {}", packet.len(), destination));
        if let Some((sends, flag)) = &self.cancel_after {
            if self.sent_count >= *sends {
                flag.cancel();
            }
        }

        let pending: Vec<Injection> = self
            .injections
            .iter()
            .filter(|(s, _)| *s == seq)
            .map(|(_, injection)| *injection)
            .collect();
        self.injections.retain(|(s, _)| *s != seq);
        for injection in pending {
            self.inject(destination, &request, injection);
        }

        if !request.is_echo_request() {
            return Ok(());
        }
        if Self::take_once(&mut self.drop_reply_once, seq) {
            self.record(seq, "reply dropped (deterministic)".to_string());
            return Ok(());
        }
        if self.rng.random::<f64>() < self.config.loss_rate {
            self.record(seq, "reply lost".to_string());
            return Ok(());
        }

        let due = if Self::take_once(&mut self.late_reply_once, seq) {
            self.record(seq, "reply delayed past the wait".to_string());
            None
        } else {
            Some(Instant::now() + self.sample_latency())
        };
        let reply = codec::encode(
            &EchoHeader::reply(request.identifier, seq),
            &packet[HEADER_LEN..],
        );
        self.deliver(destination, &reply, due);
        Ok(())
    }

    fn poll_receive(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<Received, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }

        let now = Instant::now();
        let wait_end = now.checked_add(timeout);
        let Some(front) = self.inbound.front_mut() else {
            std::thread::sleep(timeout);
            return Ok(Received::Timeout);
        };
        let arrival = match (front.due, wait_end) {
            (Some(due), Some(end)) if due <= end => Some(due),
            // Unbounded wait: even a held-back reply arrives eventually
            (due, None) => Some(due.unwrap_or(now)),
            _ => None,
        };
        let due = match arrival {
            Some(due) => due,
            None => {
                // Still in flight when the caller gives up; it lands before the next poll
                front.due = wait_end;
                std::thread::sleep(timeout);
                return Ok(Received::Timeout);
            }
        };
        std::thread::sleep(due.saturating_duration_since(Instant::now()));

        let Some(in_flight) = self.inbound.pop_front() else {
            return Ok(Received::Timeout);
        };
        let len = in_flight.datagram.len().min(buf.len());
        buf[..len].copy_from_slice(&in_flight.datagram[..len]);
        Ok(Received::Datagram {
            len,
            source: in_flight.source,
        })
    }

    fn close(&mut self) {
        if !self.closed {
            debug!("[link] closed after {} requests", self.sent_count);
            self.closed = true;
        }
    }
}
