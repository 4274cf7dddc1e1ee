//! hcamond - high-precision adapter counter recorder.
//!
//! Archives the data directory if it has grown past the threshold, then
//! samples every adapter counter at a fixed interval for a bounded duration
//! and appends the samples to a new raw log file.

use tikv_jemallocator::Jemalloc;
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

/// mallctl name that purges every arena (MALLCTL_ARENAS_ALL = 4096).
/// `arena.0` alone misses the arenas of the collector threads.
const PURGE_ALL_ARENAS: &std::ffi::CStr = c"arena.4096.purge";

/// Releases unused memory back to the operating system.
/// Uses jemalloc's arena purge to reduce RSS after archival.
/// Returns false if jemalloc rejected the request.
fn release_memory_to_os() -> bool {
    // SAFETY: We're calling jemalloc's mallctl with valid arguments.
    // The purge command takes no input and produces no output.
    let rc = unsafe {
        tikv_jemalloc_sys::mallctl(
            PURGE_ALL_ARENAS.as_ptr().cast(),
            std::ptr::null_mut(),
            std::ptr::null_mut(),
            std::ptr::null_mut(),
            0,
        )
    };
    if rc != 0 {
        debug!("arena purge failed with code {}", rc);
    }
    rc == 0
}

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[cfg(not(target_os = "linux"))]
use hcamon_core::collector::{MockFs, MockRunner};
#[cfg(target_os = "linux")]
use hcamon_core::collector::{RealFs, RealRunner};
use hcamon_core::collector::Collector;
use hcamon_core::config::CollectorConfig;
use hcamon_core::fmt::{MB, format_size, parse_size};
use hcamon_core::model::Cycle;
use hcamon_core::storage::archive::{DEFAULT_KEEP, DEFAULT_PREFIX};
use hcamon_core::storage::{ArchiveManager, RawLogWriter};

/// High-precision adapter counter recorder.
#[derive(Parser)]
#[command(name = "hcamond", about = "High-precision adapter counter recorder", version = hcamon_core::VERSION)]
struct Args {
    /// Directory for raw log files.
    #[arg(long, env = "HCAMON_DATA_PATH", default_value = "/var/log/ibtestdata")]
    data_path: PathBuf,

    /// Directory for archives. Defaults to the parent of the data directory.
    #[arg(long, env = "HCAMON_ARCHIVE_DIR")]
    archive_dir: Option<PathBuf>,

    /// Total recording time in seconds.
    #[arg(short = 't', long, default_value = "5")]
    duration: u64,

    /// Data directory size that triggers archival (e.g. "5M", "512K"; a bare number is megabytes).
    #[arg(short = 'r', long, default_value = "5", value_parser = parse_threshold)]
    archive_threshold: u64,

    /// Name prefix of the archives this recorder creates and prunes.
    #[arg(long, default_value = DEFAULT_PREFIX)]
    archive_prefix: String,

    /// Number of newest archives kept after a rotation.
    #[arg(long, default_value_t = DEFAULT_KEEP)]
    archive_keep: usize,

    /// Sampling interval in milliseconds.
    #[arg(long, default_value = "100")]
    interval_ms: u64,

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

    /// Deadline for each external tool invocation, in seconds.
    #[arg(long, default_value = "60")]
    command_timeout: u64,

    /// Also write logs to this file.
    #[arg(long, env = "HCAMON_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

fn parse_threshold(s: &str) -> Result<u64, String> {
    parse_size(s, MB)
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool, log_file: Option<&PathBuf>) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["hcamond", "hcamon_core"] {
        if let Ok(directive) = format!("{}={}", target, level).parse() {
            filter = filter.add_directive(directive);
        }
    }

    let file = log_file.and_then(|path| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| eprintln!("cannot open log file {}: {}", path.display(), e))
            .ok()
    });

    match file {
        Some(file) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init(),
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init(),
    }
}

/// Describes the contents of a cycle for logging.
fn describe_cycle(cycle: &Cycle) -> String {
    let devices: Vec<&str> = cycle.snapshots.iter().map(|s| s.name()).collect();
    format!(
        "{} devices [{}], {} samples",
        devices.len(),
        devices.join(", "),
        cycle.sample_count()
    )
}

fn collector_config(args: &Args) -> CollectorConfig {
    CollectorConfig {
        sysfs_root: args.sysfs_root.clone(),
        debugfs_root: args.debugfs_root.clone(),
        command_timeout: Duration::from_secs(args.command_timeout),
        optical: args.optical,
        tune_mrrs: !args.no_mrrs,
        ..CollectorConfig::default()
    }
}

fn main() {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet, args.log_file.as_ref());

    info!("hcamond {} starting", hcamon_core::VERSION);
    info!(
        "Config: data={}, duration={}s, interval={}ms, threshold={}",
        args.data_path.display(),
        args.duration,
        args.interval_ms,
        format_size(args.archive_threshold)
    );

    let archive = match &args.archive_dir {
        Some(dir) => ArchiveManager::new(&args.data_path, dir),
        None => ArchiveManager::for_data_dir(&args.data_path),
    }
    .with_prefix(args.archive_prefix.as_str())
    .with_keep(args.archive_keep);

    // The data directory must exist before it can be measured.
    if let Err(e) = std::fs::create_dir_all(&args.data_path) {
        error!("Cannot create data directory {}: {}", args.data_path.display(), e);
        std::process::exit(1);
    }

    info!("Checking data directory for archival...");
    match archive.rotate(args.archive_threshold) {
        Ok(result) if result.rotated() => {
            info!(
                "Archived {} files ({}) into {}, removed {} old archives",
                result.files_archived,
                format_size(result.bytes_archived),
                result
                    .archive
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
                result.archives_removed
            );
            if result.files_skipped > 0 {
                warn!("{} log files could not be archived", result.files_skipped);
            }
            release_memory_to_os();
        }
        Ok(result) => debug!(
            "Data directory holds {}, no archival needed",
            format_size(result.total_size)
        ),
        Err(e) => error!("Archival failed: {}", e),
    }

    let mut writer = match RawLogWriter::create(&args.data_path) {
        Ok(w) => w,
        Err(e) => {
            error!("Cannot create raw log in {}: {}", args.data_path.display(), e);
            std::process::exit(1);
        }
    };

    #[cfg(target_os = "linux")]
    let mut collector = Collector::new(
        RealFs::new(),
        Arc::new(RealRunner::new()),
        collector_config(&args),
    );
    #[cfg(not(target_os = "linux"))]
    let mut collector = Collector::new(
        MockFs::roce_host(),
        Arc::new(MockRunner::roce_host()),
        collector_config(&args),
    );

    // Setup graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    let interval = Duration::from_millis(args.interval_ms.max(1));
    let deadline = Instant::now() + Duration::from_secs(args.duration);
    let mut next_tick = Instant::now();
    let mut cycles: u64 = 0;

    info!("Recording to {}", writer.path().display());

    while running.load(Ordering::SeqCst) && Instant::now() < deadline {
        match collector.collect_cycle() {
            Ok(cycle) => {
                cycles += 1;
                let lines = writer.write_cycle(&cycle);
                debug!("Cycle #{}: {}, {} lines", cycles, describe_cycle(&cycle), lines);
                if let Some(timing) = collector.last_timing() {
                    debug!(
                        "Timing: total={:?}, discovery={:?}, mrrs={:?}",
                        timing.total, timing.discovery, timing.mrrs
                    );
                }
            }
            Err(e) => error!("Collection failed: {}", e),
        }

        next_tick += interval;
        let now = Instant::now();
        if next_tick < now {
            // a slow cycle drops the ticks it overran
            next_tick = now;
        }
        let wake = next_tick.min(deadline);
        if let Some(wait) = wake.checked_duration_since(now) {
            std::thread::sleep(wait);
        }
    }

    info!(
        "Done: {} cycles, {} lines written to {}",
        cycles,
        writer.lines_written(),
        writer.path().display()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use hcamon_core::model::{CounterSample, Device, DeviceSnapshot};

    #[test]
    fn describe_cycle_counts_devices_and_samples() {
        let mut snap = DeviceSnapshot::new(Device::new("mlx5_0"), 0);
        for s in [
            CounterSample::count("mlx5_0", "QPNum", 1),
            CounterSample::count("mlx5_0", "MRNum", 2),
        ] {
            snap.counters.insert(s.counter.clone(), s);
        }
        let cycle = Cycle {
            timestamp_ns: 0,
            snapshots: vec![snap, DeviceSnapshot::new(Device::new("mlx5_1"), 0)],
        };

        let desc = describe_cycle(&cycle);
        assert_eq!(desc, "2 devices [mlx5_0, mlx5_1], 2 samples");
    }

    #[test]
    fn purge_covers_all_arenas() {
        assert_eq!(PURGE_ALL_ARENAS.to_str().unwrap(), "arena.4096.purge");
        let scratch: Vec<Vec<u8>> = (0..64).map(|_| vec![0u8; 64 * 1024]).collect();
        drop(scratch);
        assert!(release_memory_to_os());
    }

    #[test]
    fn threshold_defaults_to_megabytes() {
        assert_eq!(parse_threshold("5"), Ok(5 * MB));
        assert_eq!(parse_threshold("512K"), Ok(512 * 1024));
    }

    #[test]
    fn args_defaults() {
        let args = Args::parse_from(["hcamond"]);
        assert_eq!(args.data_path, PathBuf::from("/var/log/ibtestdata"));
        assert_eq!(args.duration, 5);
        assert_eq!(args.archive_threshold, 5 * MB);
        assert_eq!(args.interval_ms, 100);
        assert_eq!(args.archive_prefix, "ibtestdata");
        assert_eq!(args.archive_keep, 5);
        let config = collector_config(&args);
        assert!(config.tune_mrrs);
        assert!(!config.optical);
    }
}
