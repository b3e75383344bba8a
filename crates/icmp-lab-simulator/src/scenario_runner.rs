use crate::engine::SimulatedTransport;
use crate::trace::ScenarioReport;
use anyhow::{Context, anyhow};
use icmp_lab_abstract::{PingConfig, ScenarioAssertion, TestScenario};
use icmp_lab_core::session::parse_destination;
use icmp_lab_core::{CancelFlag, PingSession, SharedBuffer};
use std::fs;
use std::path::Path;
use tracing::info;

/// Identifier used for simulated sessions so reports are reproducible.
const SCENARIO_IDENTIFIER: u16 = 0x1CAB;

pub fn load_scenario(path: &Path) -> anyhow::Result<TestScenario> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
    parse_scenario(&content)
}

pub fn parse_scenario(content: &str) -> anyhow::Result<TestScenario> {
    toml::from_str(content).context("Failed to parse scenario")
}

/// Loads a scenario file, runs it and checks its assertions.
pub fn run_scenario_file(path: &Path) -> anyhow::Result<ScenarioReport> {
    let scenario = load_scenario(path)?;
    run_scenario(&scenario)
}

/// Runs a ping session over the simulated link described by `scenario`.
///
/// Fails if the session cannot be set up or any assertion does not hold.
pub fn run_scenario(scenario: &TestScenario) -> anyhow::Result<ScenarioReport> {
    info!("Running Scenario: {}", scenario.name);
    if !scenario.description.is_empty() {
        info!("Description: {}", scenario.description);
    }

    let destination = parse_destination(&scenario.destination)?;
    let mut config = PingConfig::default();
    scenario.config.apply_to(&mut config);

    let cancel = CancelFlag::new();
    let mut link = SimulatedTransport::new(scenario.link.clone());
    for action in &scenario.actions {
        link.apply_action(action, &cancel);
    }

    let output = SharedBuffer::new();
    let session = PingSession::new(destination, config, &mut link, output.console())?
        .with_identifier(SCENARIO_IDENTIFIER)
        .with_cancel_flag(cancel);
    let session_report = session.run();

    let report = ScenarioReport {
        name: scenario.name.clone(),
        link: scenario.link.clone(),
        session: session_report,
        output: output.contents(),
        link_events: std::mem::take(&mut link.link_events),
    };
    check_assertions(&scenario.assertions, &report)?;

    info!("Scenario Passed!");
    Ok(report)
}

fn check_assertions(
    assertions: &[ScenarioAssertion],
    report: &ScenarioReport,
) -> anyhow::Result<()> {
    let stats = &report.session.statistics;
    for assertion in assertions {
        match assertion {
            ScenarioAssertion::Transmitted { count } => {
                if stats.transmitted != *count {
                    return Err(anyhow!(
                        "Assertion Failed: {} requests transmitted, expected {}",
                        stats.transmitted,
                        count
                    ));
                }
            }
            ScenarioAssertion::Received { count } => {
                if stats.received != *count {
                    return Err(anyhow!(
                        "Assertion Failed: {} replies received, expected {}",
                        stats.received,
                        count
                    ));
                }
            }
            ScenarioAssertion::OutputContains { text } => {
                if !report.output.contains(text.as_str()) {
                    return Err(anyhow!(
                        "Assertion Failed: output does not contain {:?}",
                        text
                    ));
                }
            }
            ScenarioAssertion::OutputLacks { text } => {
                if report.output.contains(text.as_str()) {
                    return Err(anyhow!(
                        "Assertion Failed: output unexpectedly contains {:?}",
                        text
                    ));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(toml: &str) -> ScenarioReport {
        let scenario = parse_scenario(toml).unwrap();
        run_scenario(&scenario).unwrap()
    }

    #[test]
    fn replies_for_first_and_third_only() {
        let report = run(r#"
            name = "partial loss"
            config = { count = 3, interval_secs = 0.0, timeout_ms = 100.0 }
            actions = [{ type = "drop_reply", seq = 2 }]
            assertions = [
                { type = "transmitted", count = 3 },
                { type = "received", count = 2 },
                { type = "output_contains", text = "3 packets transmitted, 2 received, 33% packet loss" },
                { type = "output_contains", text = "round-trip min/avg/max = " },
            ]
        "#);

        assert!(report.output.starts_with("PING 192.0.2.1: 56 data bytes\n"));
        assert!(report.output.contains("Request timeout for icmp_seq=2\n"));
        assert!(
            report
                .output
                .contains("64 bytes from 192.0.2.1: icmp_seq=3 time=")
        );
    }

    #[test]
    fn no_replies_at_all() {
        let report = run(r#"
            name = "blackhole"
            config = { count = 2, interval_secs = 0.0, timeout_ms = 100.0 }
            link = { loss_rate = 1.0 }
            assertions = [
                { type = "output_contains", text = "2 packets transmitted, 0 received, 100% packet loss" },
                { type = "output_lacks", text = "round-trip" },
            ]
        "#);
        assert_eq!(report.session.statistics.min_ms, None);
    }

    #[test]
    fn cancellation_after_first_cycle() {
        let report = run(r#"
            name = "interrupted"
            config = { count = 5, interval_secs = 0.0, timeout_ms = 100.0 }
            actions = [{ type = "cancel_after_sends", sends = 1 }]
        "#);

        assert!(report.session.cancelled);
        assert!(report.session.statistics.transmitted <= 2);
        assert_eq!(report.output.matches("ping statistics").count(), 1);
    }

    #[test]
    fn stale_reply_is_not_counted_for_the_next_request() {
        let report = run(r#"
            name = "late reply"
            config = { count = 2, interval_secs = 0.0, timeout_ms = 100.0 }
            actions = [{ type = "late_reply", seq = 1 }]
            assertions = [
                { type = "transmitted", count = 2 },
                { type = "received", count = 1 },
                { type = "output_contains", text = "Request timeout for icmp_seq=1" },
                { type = "output_contains", text = "icmp_seq=2 time=" },
            ]
        "#);
        assert!(!report.session.exchanges[0].is_matched());
        assert!(report.session.exchanges[1].is_matched());
    }

    #[test]
    fn transmit_failure_skips_the_cycle() {
        run(r#"
            name = "unreachable route"
            config = { count = 3, interval_secs = 0.0, timeout_ms = 100.0 }
            actions = [{ type = "fail_send", seq = 2 }]
            assertions = [
                { type = "transmitted", count = 2 },
                { type = "received", count = 2 },
                { type = "output_contains", text = "2 packets transmitted, 2 received, 0% packet loss" },
                { type = "output_lacks", text = "icmp_seq=2" },
            ]
        "#);
    }

    #[test]
    fn noise_and_ip_options_are_handled() {
        let report = run(r#"
            name = "noisy link"
            config = { count = 1, interval_secs = 0.0, timeout_ms = 100.0 }
            link = { ip_option_words = 3 }
            actions = [
                { type = "inject_type", seq = 1, icmp_type = 11 },
                { type = "inject_foreign_reply", seq = 1 },
                { type = "inject_garbage", seq = 1, len = 12 },
            ]
            assertions = [
                { type = "received", count = 1 },
                { type = "output_contains", text = "Received ICMP packet with type 11 (not Echo Reply)" },
                { type = "output_contains", text = "64 bytes from 192.0.2.1: icmp_seq=1" },
            ]
        "#);
        assert_eq!(report.link_events.len(), 4);
    }

    #[test]
    fn round_trip_reflects_link_latency() {
        let report = run(r#"
            name = "slow link"
            config = { count = 1, interval_secs = 0.0, timeout_ms = 200.0 }
            link = { min_latency_ms = 30, max_latency_ms = 30 }
            assertions = [{ type = "received", count = 1 }]
        "#);
        match report.session.exchanges[0] {
            icmp_lab_core::ExchangeOutcome::Matched { rtt_ms, .. } => {
                assert!(rtt_ms >= 29.0, "rtt {rtt_ms} below link latency");
                assert!(rtt_ms < 200.0);
            }
            other => panic!("expected a match, got {other:?}"),
        }
    }

    #[test]
    fn failing_assertion_is_reported() {
        let scenario = parse_scenario(
            r#"
            name = "wrong expectation"
            config = { count = 1, interval_secs = 0.0, timeout_ms = 50.0 }
            assertions = [{ type = "received", count = 0 }]
        "#,
        )
        .unwrap();
        let err = run_scenario(&scenario).unwrap_err();
        assert!(err.to_string().contains("Assertion Failed"));
    }

    #[test]
    fn invalid_destination_is_rejected() {
        let scenario = parse_scenario(
            r#"
            name = "hostname"
            destination = "localhost"
        "#,
        )
        .unwrap();
        assert!(run_scenario(&scenario).is_err());
    }
}
