use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::PathBuf;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::info;
use tracing_subscriber::EnvFilter;

use icmp_lab_abstract::{PayloadPolicy, PingConfig};
use icmp_lab_core::session::{SessionReport, parse_destination};
use icmp_lab_core::{CancelFlag, Console, PingError, PingSession, RawSocketTransport};
use icmp_lab_simulator::scenario_runner::run_scenario_file;
use icmp_lab_simulator::trace::write_json;

#[derive(Parser, Debug)]
#[command(
    name = "icmp-ping",
    author,
    version,
    about = "Send ICMP ECHO_REQUEST packets to network hosts.",
    after_help = "DESTINATION must be an IP address.\n\n\
                  Examples:\n  icmp-ping 192.168.0.1\n  icmp-ping -c 10 -i 2 223.5.5.5"
)]
struct Args {
    /// Stop after sending COUNT packets.
    #[arg(short = 'c', value_name = "COUNT", default_value_t = 4)]
    count: u32,

    /// Wait INTERVAL seconds between sending packets.
    #[arg(short = 'i', value_name = "INTERVAL", default_value_t = 1.0)]
    interval: f64,

    /// Wait at most TIMEOUT_MS milliseconds for each reply.
    #[arg(short = 't', value_name = "TIMEOUT_MS", default_value_t = 1000.0)]
    timeout: f64,

    /// Fill the payload with BYTE instead of a send timestamp.
    #[arg(long, value_name = "BYTE")]
    filler: Option<u8>,

    /// Ping over the simulated link described by a scenario file.
    #[arg(long, value_name = "FILE")]
    scenario: Option<PathBuf>,

    /// Write a JSON report of the run.
    #[arg(long, value_name = "FILE")]
    trace_out: Option<PathBuf>,

    /// Log protocol diagnostics to stderr.
    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    /// Numeric IPv4 address to ping.
    #[arg(
        value_name = "DESTINATION",
        required_unless_present = "scenario",
        conflicts_with = "scenario"
    )]
    destination: Option<String>,
}

impl Args {
    fn ping_config(&self) -> PingConfig {
        PingConfig {
            count: self.count,
            interval_secs: self.interval,
            timeout_ms: self.timeout,
            payload: self
                .filler
                .map(PayloadPolicy::Filler)
                .unwrap_or(PayloadPolicy::Timestamp),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args();
    init_logging(args.verbose);
    info!("icmp-ping starting…");

    if let Some(path) = &args.scenario {
        let report = run_scenario_file(path)?;
        print!("{}", report.output);
        if let Some(trace_path) = &args.trace_out {
            write_json(trace_path, &report)?;
        }
        return Ok(());
    }

    let destination = args
        .destination
        .as_deref()
        .context("DESTINATION is required")?;
    let report = run_live(destination, args.ping_config()).await?;
    if let Some(trace_path) = &args.trace_out {
        write_json(trace_path, &report)?;
    }
    Ok(())
}

/// Usage errors exit with status 1; `-h` and `-V` exit with 0.
fn parse_args() -> Args {
    match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run_live(destination: &str, config: PingConfig) -> Result<SessionReport> {
    // Both checks happen before the socket is opened
    let destination = parse_destination(destination)?;
    config.validate().map_err(PingError::InvalidConfig)?;

    let transport = match RawSocketTransport::open().map_err(PingError::from) {
        Ok(transport) => transport,
        Err(e) if e.is_permission() => {
            bail!("{e}; e.g. `sudo setcap cap_net_raw+ep $(command -v icmp-ping)`")
        }
        Err(e) => return Err(e.into()),
    };
    let session = PingSession::new(destination, config, transport, Console::stdout())?;

    let signal_task = watch_interrupt(session.cancel_flag()).await;
    let report = tokio::task::spawn_blocking(move || session.run())
        .await
        .context("Ping session terminated abnormally")?;
    signal_task.abort();
    Ok(report)
}

/// Sets `cancel` on the first Ctrl-C.
///
/// Returns once the handler is installed, so an interrupt arriving after this
/// point can no longer kill the process before the summary is printed.
async fn watch_interrupt(cancel: CancelFlag) -> JoinHandle<()> {
    let (installed_tx, installed_rx) = oneshot::channel();
    let task = tokio::spawn(async move {
        let mut interrupt = std::pin::pin!(tokio::signal::ctrl_c());
        // The first poll registers the handler
        let early = tokio::select! {
            biased;
            result = &mut interrupt => Some(result),
            _ = std::future::ready(()) => None,
        };
        let _ = installed_tx.send(());
        let result = match early {
            Some(result) => result,
            None => interrupt.await,
        };
        if result.is_ok() {
            info!("Interrupt received, finishing the current request");
            cancel.cancel();
        }
    });
    let _ = installed_rx.await;
    task
}
