//! devsession-daemon - watch devices come and go.
//!
//! Drives a device registry from a scripted discovery feed and reports
//! lifecycle events on the console. Devices are named `<prefix><slot>` and
//! keep their name across reconnects.

mod console;
mod scenario;

use clap::Parser;
use devsession_core::feed::DEFAULT_FEED_CAPACITY;
use devsession_core::sink::{FanoutSink, JournalError, JournalSink};
use devsession_core::{
    discovery_channel, run_feed, DeviceHandle, DeviceRegistry, DiscoveryFilter,
    PhysicalIdentity, RegistryBuilder, ShutdownToken, DEFAULT_NAME_PREFIX,
};
use scenario::{Scenario, ScenarioError, SimulatedDevice};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use thiserror::Error;

#[derive(Parser, Debug)]
#[command(name = "devsession-daemon", version, about = "Track hot-pluggable devices by stable name")]
struct Args {
    /// Prefix of device names (dev0, dev1, ...)
    #[arg(long, default_value = DEFAULT_NAME_PREFIX)]
    prefix: String,

    /// Only attach devices with this serial number (hex). Repeatable.
    #[arg(long = "serial-number", value_name = "HEX")]
    serial_numbers: Vec<PhysicalIdentity>,

    /// JSON-lines script that simulates devices attaching and breaking
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Append lifecycle events to this JSONL file
    #[arg(long)]
    journal: Option<PathBuf>,

    /// Exit once the scenario has played instead of waiting for Ctrl-C
    #[arg(long)]
    exit_when_done: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Error, Debug)]
enum DaemonError {
    #[error(transparent)]
    Scenario(#[from] ScenarioError),

    #[error(transparent)]
    Journal(#[from] JournalError),

    #[error("Failed to listen for Ctrl-C: {0}")]
    Signal(#[source] std::io::Error),
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), DaemonError> {
    let scenario = match &args.scenario {
        Some(path) => Scenario::load(path).await?,
        None => Scenario::default(),
    };
    log::debug!("Scenario has {} step(s)", scenario.steps().len());

    let shutdown = ShutdownToken::new();
    let mut sink = FanoutSink::new().with(Arc::new(console::ConsoleSink::new(&args.prefix)));
    if let Some(path) = &args.journal {
        sink.push(Arc::new(JournalSink::open(path)?));
    }

    let registry: DeviceRegistry<SimulatedDevice> = RegistryBuilder::new()
        .sink(Arc::new(sink))
        .shutdown_token(shutdown.clone())
        .name_prefix(args.prefix.as_str())
        .build();

    let filter = if args.serial_numbers.is_empty() {
        DiscoveryFilter::any()
    } else {
        DiscoveryFilter::only(args.serial_numbers.iter().copied())
    };

    println!("{}", console::help_text(&args.prefix, !registry.is_empty()));
    log::debug!("Waiting for device...");

    let (tx, rx) = discovery_channel(DEFAULT_FEED_CAPACITY);
    let feed = {
        let registry = registry.clone();
        tokio::spawn(async move { run_feed(&registry, rx, &filter).await })
    };
    let player = tokio::spawn(scenario.play(tx));

    if args.exit_when_done {
        tokio::select! {
            played = player => {
                if let Ok(attached) = played {
                    log::debug!("Scenario finished after {} attach step(s)", attached);
                }
                // Let the feed drain what the scenario queued.
                if let Ok(registered) = feed.await {
                    log::debug!("Registered {} device(s)", registered);
                }
            }
            signal = tokio::signal::ctrl_c() => signal.map_err(DaemonError::Signal)?,
        }
    } else {
        tokio::signal::ctrl_c().await.map_err(DaemonError::Signal)?;
    }

    shutdown.set();
    close_all(&registry);

    log::debug!(
        "{} device session(s), {} still connected at exit",
        registry.len(),
        registry.connected_count()
    );
    Ok(())
}

/// Break every live channel, as the transport does when the process exits.
/// The shutdown token is already set, so nothing is reported.
fn close_all(registry: &DeviceRegistry<SimulatedDevice>) {
    for info in registry.sessions() {
        if let Ok(handle) = registry.handle(info.slot) {
            handle.channel_health().fire();
        }
    }
}
