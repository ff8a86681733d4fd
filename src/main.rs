//! wmibeat - instrumentation polling daemon.
//!
//! Runs the configured class and namespace queries once per period and
//! writes one JSON event per tick.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

use wmibeat::config::{BeatConfig, CONFIG_SECTION};
use wmibeat::poller::Poller;
use wmibeat::provider::MockProvider;
use wmibeat::sink::{JsonLinesSink, Sink};
use wmibeat::util::parse_duration;

/// Instrumentation polling daemon.
#[derive(Parser)]
#[command(name = "wmibeat", about = "Instrumentation polling daemon", version)]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "wmibeat.yml", env = "WMIBEAT_CONFIG")]
    config: PathBuf,

    /// JSON fixture with provider data (namespace -> class -> rows).
    #[arg(long, env = "WMIBEAT_FIXTURE")]
    fixture: PathBuf,

    /// Append events to this file instead of writing them to stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Override the configured poll period (e.g. "10s", "500ms").
    #[arg(long, value_parser = parse_duration)]
    period: Option<std::time::Duration>,

    /// Value of the event `type` field.
    #[arg(long, default_value = CONFIG_SECTION)]
    name: String,

    /// Poll once, publish the event and exit.
    #[arg(long)]
    once: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Logs go to stderr so stdout stays a clean event stream.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("wmibeat={}", level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    info!("wmibeat {} starting", env!("CARGO_PKG_VERSION"));

    let mut config = match BeatConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("{}: {}", args.config.display(), e);
            process::exit(1);
        }
    };
    if let Some(period) = args.period {
        if period.is_zero() {
            error!("--period must be positive");
            process::exit(1);
        }
        config.period = period;
    }
    info!(
        "Config: period={:?}, classes={}, namespaces={}",
        config.period,
        config.classes.len(),
        config.namespaces.len()
    );

    let provider = match MockProvider::from_fixture(&args.fixture) {
        Ok(provider) => provider,
        Err(e) => {
            error!("cannot load provider fixture {}: {}", args.fixture.display(), e);
            process::exit(1);
        }
    };
    info!("Provider: fixture {}", args.fixture.display());

    let sink: Box<dyn Sink> = match &args.output {
        Some(path) => match JsonLinesSink::append(path) {
            Ok(sink) => {
                info!("Publishing events to {}", path.display());
                Box::new(sink)
            }
            Err(e) => {
                error!("cannot open {}: {}", path.display(), e);
                process::exit(1);
            }
        },
        None => Box::new(JsonLinesSink::stdout()),
    };

    let mut poller = Poller::new(provider, sink, &config, args.name.as_str());

    if args.once {
        if let Err(e) = poller.tick() {
            error!("{}", e);
            process::exit(1);
        }
        return;
    }

    // Setup graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    let mut poller = poller.with_running_flag(running);
    if let Err(e) = poller.run() {
        error!("Poll loop terminated: {}", e);
        process::exit(1);
    }

    info!("Shutdown complete");
}
