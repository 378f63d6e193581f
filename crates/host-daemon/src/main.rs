//! Script host entry point.
//!
//! Wires the host services, the console interpreter, the background
//! scheduler thread, and the foreground loop reading stdin.

use anyhow::{Context, Result};
use clap::Parser;
use host_common::config::{HostConfig, TimeSourceKind};
use host_console::Console;
use host_runtime::foreground::{ForegroundLoop, LoopSummary};
use host_runtime::scheduler::{BackgroundScheduler, SchedulerHandle};
use host_runtime::{ExecutionLock, FunctionTable, Host};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

const CONFIG_ENV: &str = "SCRIPT_HOST_CONFIG";
const LOCAL_CONFIG: &str = "script-host.toml";

/// Script host command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "script-host",
    about = "Run the script interpreter on stdin with background tasks",
    version,
    long_about = None
)]
struct Args {
    /// Path to a configuration file (TOML).
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,

    /// Clock source (overrides config file).
    #[arg(long, value_enum)]
    clock: Option<ClockArg>,

    /// Dispatch every line of FILE before reading stdin.
    #[arg(long, value_name = "FILE")]
    load: Option<PathBuf>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ClockArg {
    Monotonic,
    Wall,
}

impl From<ClockArg> for TimeSourceKind {
    fn from(arg: ClockArg) -> Self {
        match arg {
            ClockArg::Monotonic => TimeSourceKind::Monotonic,
            ClockArg::Wall => TimeSourceKind::Wall,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting script host");

    let mut config = load_config(&args)?;
    if let Some(clock) = args.clock {
        config.clock.source = clock.into();
    }
    info!(
        clock = %config.clock.source,
        storage = config.storage.size,
        pins = config.pins.count,
        "Configuration loaded"
    );

    let host = Arc::new(Host::from_config(&config));
    let (lock, scheduler) = start_runtime(Arc::clone(&host), &config)?;

    if let Some(path) = &args.load {
        let lines = replay_file(&lock, path, config.console.max_line_len)?;
        info!(path = %path.display(), lines, "Startup file loaded");
    }

    let stdin = std::io::stdin();
    let summary = run_foreground(stdin.lock(), lock, config.console.max_line_len);

    let stats = scheduler.stats();
    info!(
        lines = summary.lines_dispatched,
        ended_by = ?summary.ended_by,
        background_runs = stats.iterations(),
        backoffs = stats.backoffs(),
        "Script host finished"
    );
    Ok(())
}

/// Initialize logging on stderr with the specified log level.
fn init_logging(level: &str) {
    let filter = format!(
        "script_host={level},host_daemon={level},host_runtime={level},host_console={level},host_common={level}"
    );

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(true)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Resolution priority (first existing file wins):
/// 1. Command-line `--config` argument
/// 2. `SCRIPT_HOST_CONFIG` environment variable
/// 3. `script-host.toml` in the working directory
/// 4. Built-in defaults
fn load_config(args: &Args) -> Result<HostConfig> {
    if let Some(config_path) = &args.config {
        info!(?config_path, "Loading config from command-line argument");
        return HostConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {config_path:?}"));
    }

    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        let config_path = PathBuf::from(&env_path);
        if config_path.exists() {
            info!(?config_path, "Loading config from {}", CONFIG_ENV);
            return HostConfig::from_file(&config_path)
                .with_context(|| format!("Failed to load config from {CONFIG_ENV}={env_path:?}"));
        }
        warn!(
            path = %env_path,
            "{} set but file does not exist, checking other locations", CONFIG_ENV
        );
    }

    let local_path = PathBuf::from(LOCAL_CONFIG);
    if local_path.exists() {
        info!(?local_path, "Loading config from working directory");
        return HostConfig::from_file(&local_path)
            .with_context(|| format!("Failed to load config from {local_path:?}"));
    }

    info!("No config file found, using built-in defaults");
    Ok(HostConfig::default())
}

/// Build the interpreter behind its lock and start the background thread.
fn start_runtime(
    host: Arc<Host>,
    config: &HostConfig,
) -> Result<(ExecutionLock<Console>, SchedulerHandle)> {
    let functions = FunctionTable::standard();
    info!(functions = functions.names().count(), "Function table ready");

    let console = Console::new(host, functions, &config.console);
    let lock = ExecutionLock::new(console);
    let scheduler = BackgroundScheduler::new(lock.clone(), &config.scheduler)
        .spawn()
        .context("Failed to start background scheduler")?;
    Ok((lock, scheduler))
}

/// Dispatch each line of `path` as if typed at the console.
fn replay_file(lock: &ExecutionLock<Console>, path: &Path, max_line_len: usize) -> Result<u64> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open startup file {path:?}"))?;
    let summary = run_foreground(std::io::BufReader::new(file), lock.clone(), max_line_len);
    Ok(summary.lines_dispatched)
}

fn run_foreground<R: BufRead>(
    reader: R,
    lock: ExecutionLock<Console>,
    max_line_len: usize,
) -> LoopSummary {
    ForegroundLoop::new(reader, lock, max_line_len).run()
}
