use crate::cancel::CancelFlag;
use crate::console::Console;
use crate::error::PingError;
use crate::exchange::{Exchange, ExchangeOutcome};
use crate::interface::IcmpTransport;
use crate::statistics::{Statistics, StatisticsSummary};
use icmp_lab_abstract::PingConfig;
use icmp_lab_abstract::packet::PAYLOAD_LEN;
use serde::Serialize;
use std::net::Ipv4Addr;
use std::time::Duration;
use tracing::info;

/// Parses a numeric dotted-quad destination. Hostnames are rejected.
pub fn parse_destination(text: &str) -> Result<Ipv4Addr, PingError> {
    text.trim()
        .parse()
        .map_err(|_| PingError::InvalidDestination(text.to_string()))
}

/// Identifier used when none is set explicitly: the low 16 bits of the process id.
pub fn process_identifier() -> u16 {
    (std::process::id() & 0xFFFF) as u16
}

/// Everything a finished session produced.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub destination: Ipv4Addr,
    pub identifier: u16,
    pub config: PingConfig,
    pub cancelled: bool,
    pub exchanges: Vec<ExchangeOutcome>,
    pub statistics: StatisticsSummary,
}

/// One ping run against a single destination.
///
/// The transport is closed when the run ends or the session is dropped,
/// whichever comes first.
pub struct PingSession<T: IcmpTransport> {
    destination: Ipv4Addr,
    config: PingConfig,
    identifier: u16,
    transport: T,
    console: Console,
    cancel: CancelFlag,
    stats: Statistics,
    exchanges: Vec<ExchangeOutcome>,
}

impl<T: IcmpTransport> PingSession<T> {
    pub fn new(
        destination: Ipv4Addr,
        config: PingConfig,
        transport: T,
        console: Console,
    ) -> Result<Self, PingError> {
        config.validate().map_err(PingError::InvalidConfig)?;
        Ok(Self {
            destination,
            config,
            identifier: process_identifier(),
            transport,
            console,
            cancel: CancelFlag::new(),
            stats: Statistics::new(),
            exchanges: Vec::new(),
        })
    }

    pub fn with_identifier(mut self, identifier: u16) -> Self {
        self.identifier = identifier;
        self
    }

    /// Shares an externally owned flag, e.g. one set from an interrupt handler.
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Runs all exchanges, prints the summary once and closes the transport.
    pub fn run(mut self) -> SessionReport {
        let exchange = Exchange::new(
            self.destination,
            self.identifier,
            self.config.payload,
            Duration::from_secs_f64(self.config.timeout_ms / 1000.0),
        );
        let interval = Duration::from_secs_f64(self.config.interval_secs);

        self.console.line(format_args!(
            "PING {}: {} data bytes",
            self.destination, PAYLOAD_LEN
        ));

        for index in 0..self.config.count {
            // Sequence numbers start at 1 and wrap at 16 bits
            let sequence = index.wrapping_add(1) as u16;
            if self.cancel.is_cancelled() {
                info!("Cancelled before icmp_seq={}", sequence);
                break;
            }

            let outcome = exchange.run(
                &mut self.transport,
                sequence,
                &mut self.stats,
                &mut self.console,
            );
            self.exchanges.push(outcome);

            if index + 1 == self.config.count || self.cancel.is_cancelled() {
                break;
            }
            if !self.cancel.sleep(interval) {
                info!("Cancelled while waiting after icmp_seq={}", sequence);
                break;
            }
        }

        self.transport.close();
        let summary = self.stats.render(&self.destination.to_string());
        self.console.write_raw(&summary);

        SessionReport {
            destination: self.destination,
            identifier: self.identifier,
            config: self.config.clone(),
            cancelled: self.cancel.is_cancelled(),
            exchanges: std::mem::take(&mut self.exchanges),
            statistics: self.stats.summary(),
        }
    }
}

impl<T: IcmpTransport> Drop for PingSession<T> {
    fn drop(&mut self) {
        self.transport.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::SharedBuffer;
    use crate::exchange::tests::{DESTINATION, ScriptedTransport, reply_datagram};
    use crate::interface::Received;
    use crate::error::TransportError;
    use std::cell::Cell;
    use std::rc::Rc;

    fn config(count: u32) -> PingConfig {
        PingConfig {
            count,
            interval_secs: 0.0,
            timeout_ms: 100.0,
            ..Default::default()
        }
    }

    /// Counts `close` calls on a transport that lives inside the session.
    struct CloseCounter {
        inner: ScriptedTransport,
        closes: Rc<Cell<usize>>,
    }

    impl IcmpTransport for CloseCounter {
        fn send(&mut self, destination: Ipv4Addr, packet: &[u8]) -> Result<(), TransportError> {
            self.inner.send(destination, packet)
        }

        fn poll_receive(
            &mut self,
            buf: &mut [u8],
            timeout: Duration,
        ) -> Result<Received, TransportError> {
            self.inner.poll_receive(buf, timeout)
        }

        fn close(&mut self) {
            self.closes.set(self.closes.get() + 1);
        }
    }

    #[test]
    fn destination_must_be_numeric() {
        assert_eq!(parse_destination("10.1.2.3").unwrap(), Ipv4Addr::new(10, 1, 2, 3));
        assert!(matches!(
            parse_destination("example.com"),
            Err(PingError::InvalidDestination(_))
        ));
        assert!(parse_destination("300.1.1.1").is_err());
        assert!(parse_destination("::1").is_err());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut bad = config(1);
        bad.timeout_ms = -5.0;
        let result = PingSession::new(
            DESTINATION,
            bad,
            ScriptedTransport::silent(),
            SharedBuffer::new().console(),
        );
        assert!(matches!(result, Err(PingError::InvalidConfig(_))));
    }

    #[test]
    fn partial_replies_are_summarised() {
        // Answer sequences 1 and 3 only
        let transport = ScriptedTransport::with(|request, nth| {
            if nth == 2 {
                Vec::new()
            } else {
                vec![reply_datagram(request)]
            }
        });
        let buffer = SharedBuffer::new();
        let report = PingSession::new(DESTINATION, config(3), transport, buffer.console())
            .unwrap()
            .run();

        let output = buffer.contents();
        assert!(output.starts_with("PING 192.0.2.7: 56 data bytes\n"));
        assert!(output.contains("Request timeout for icmp_seq=2"));
        assert!(output.contains("3 packets transmitted, 2 received, 33% packet loss"));
        assert!(output.contains("round-trip min/avg/max = "));
        assert_eq!(report.statistics.received, 2);
        assert_eq!(
            report
                .exchanges
                .iter()
                .map(|e| e.sequence())
                .collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn total_loss_omits_round_trip_line() {
        let buffer = SharedBuffer::new();
        PingSession::new(
            DESTINATION,
            config(2),
            ScriptedTransport::silent(),
            buffer.console(),
        )
        .unwrap()
        .run();

        let output = buffer.contents();
        assert!(output.contains("2 packets transmitted, 0 received, 100% packet loss"));
        assert!(!output.contains("round-trip"));
        assert_eq!(output.matches("ping statistics").count(), 1);
    }

    #[test]
    fn cancellation_stops_new_sends() {
        let flag = CancelFlag::new();
        let handle = flag.clone();
        let transport = ScriptedTransport::with(move |request, nth| {
            if nth == 1 {
                handle.cancel();
            }
            vec![reply_datagram(request)]
        });
        let buffer = SharedBuffer::new();
        let mut cfg = config(5);
        cfg.interval_secs = 5.0;

        let session = PingSession::new(DESTINATION, cfg, transport, buffer.console())
            .unwrap()
            .with_cancel_flag(flag);
        let report = session.run();

        assert!(report.cancelled);
        assert!(report.exchanges.len() <= 2);
        assert_eq!(report.statistics.transmitted, 1);
        let output = buffer.contents();
        assert_eq!(output.matches("ping statistics").count(), 1);
        assert!(output.contains("1 packets transmitted, 1 received, 0% packet loss"));
    }

    #[test]
    fn cancelled_before_start_sends_nothing() {
        let buffer = SharedBuffer::new();
        let session = PingSession::new(
            DESTINATION,
            config(3),
            ScriptedTransport::echoing(),
            buffer.console(),
        )
        .unwrap();
        session.cancel_flag().cancel();
        let report = session.run();

        assert!(report.exchanges.is_empty());
        assert!(buffer.contents().contains("0 packets transmitted, 0 received, 0% packet loss"));
    }

    #[test]
    fn transport_is_closed_on_every_path() {
        let closes = Rc::new(Cell::new(0));
        let transport = CloseCounter {
            inner: ScriptedTransport::echoing(),
            closes: closes.clone(),
        };
        PingSession::new(DESTINATION, config(1), transport, SharedBuffer::new().console())
            .unwrap()
            .run();
        assert!(closes.get() >= 1);

        let closes = Rc::new(Cell::new(0));
        let transport = CloseCounter {
            inner: ScriptedTransport::echoing(),
            closes: closes.clone(),
        };
        let session =
            PingSession::new(DESTINATION, config(1), transport, SharedBuffer::new().console())
                .unwrap();
        drop(session);
        assert_eq!(closes.get(), 1);
    }

    #[test]
    fn identifier_tags_every_request() {
        let buffer = SharedBuffer::new();
        let session = PingSession::new(
            DESTINATION,
            config(2),
            ScriptedTransport::echoing(),
            buffer.console(),
        )
        .unwrap()
        .with_identifier(0xBEEF);
        assert_eq!(session.transport().sent.len(), 0);
        let report = session.run();

        assert_eq!(report.identifier, 0xBEEF);
        assert_eq!(report.statistics.received, 2);
    }
}
