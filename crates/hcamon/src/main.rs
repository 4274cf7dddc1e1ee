//! hcamon - live dashboard for adapter counters.
//!
//! Usage:
//!   hcamon              # refresh every second
//!   hcamon 5            # refresh every 5 seconds
//!   hcamon --optical    # include optical module readings

use tikv_jemallocator::Jemalloc;
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use hcamon_core::collector::Collector;
#[cfg(not(target_os = "linux"))]
use hcamon_core::collector::{MockFs, MockRunner};
#[cfg(target_os = "linux")]
use hcamon_core::collector::{RealFs, RealRunner};
use hcamon_core::config::CollectorConfig;
use hcamon_core::provider::{CycleProvider, LiveProvider};
use hcamon_core::tui::App;

/// Live dashboard for adapter counters.
#[derive(Parser)]
#[command(name = "hcamon", about = "Adapter counter dashboard", version = hcamon_core::VERSION)]
struct Args {
    /// Update interval in seconds (default: 1).
    #[arg(value_name = "INTERVAL")]
    interval: Option<u64>,

    /// Adapter class directory.
    #[arg(long, env = "HCAMON_SYSFS_ROOT", default_value = "/sys/class/infiniband")]
    sysfs_root: PathBuf,

    /// mlx5 debugfs root.
    #[arg(long, env = "HCAMON_DEBUGFS_ROOT", default_value = "/sys/kernel/debug/mlx5")]
    debugfs_root: PathBuf,

    /// Collect optical module diagnostics on physical functions.
    #[arg(long)]
    optical: bool,

    /// Skip the PCIe Max Read Request Size override.
    #[arg(long)]
    no_mrrs: bool,

    /// Write logs to this file. The terminal belongs to the dashboard, so
    /// nothing is logged without it.
    #[arg(long, env = "HCAMON_LOG_FILE")]
    log_file: Option<PathBuf>,
}

fn init_logging(path: &PathBuf) {
    let file = match OpenOptions::new().create(true).append(true).open(path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening log file '{}': {}", path.display(), e);
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
}

fn main() {
    let args = Args::parse();

    if let Some(ref path) = args.log_file {
        init_logging(path);
    }

    let config = CollectorConfig {
        sysfs_root: args.sysfs_root.clone(),
        debugfs_root: args.debugfs_root.clone(),
        optical: args.optical,
        tune_mrrs: !args.no_mrrs,
        ..CollectorConfig::default()
    };

    #[cfg(target_os = "linux")]
    let collector = Collector::new(RealFs::new(), Arc::new(RealRunner::new()), config);
    #[cfg(not(target_os = "linux"))]
    let collector = Collector::new(MockFs::roce_host(), Arc::new(MockRunner::roce_host()), config);

    let provider: Box<dyn CycleProvider> = Box::new(LiveProvider::new(collector));

    let tick_rate = Duration::from_secs(args.interval.unwrap_or(1).max(1));
    let app = App::new(provider);

    if let Err(e) = app.run(tick_rate) {
        eprintln!("Error running TUI: {}", e);
        std::process::exit(1);
    }
}
