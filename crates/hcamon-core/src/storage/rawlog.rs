//! Append-only raw sample log.
//!
//! One file per run, named `data_<YYYYMMDD_HHMMSS>.log`, one line per sample:
//!
//! ```text
//! <timestamp_ns>,<device>,<net_dev>,<link_type>,<counter>,<value>
//! ```

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{info, warn};

use crate::model::{CounterSample, Cycle, DeviceSnapshot};

/// Formats one sample as a raw log line, without the trailing newline.
pub fn format_line(snapshot: &DeviceSnapshot, sample: &CounterSample) -> String {
    format!(
        "{},{},{},{},{},{:.6}",
        snapshot.timestamp_ns,
        snapshot.device.name,
        snapshot.device.net_dev.as_deref().unwrap_or(""),
        snapshot.device.link_layer,
        sample.counter,
        sample.value.as_f64()
    )
}

/// Writer for one raw log file.
///
/// Owned by the mode that opened it; never shared across threads.
pub struct RawLogWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    lines_written: u64,
}

impl RawLogWriter {
    /// Creates `dir` if needed and opens a new timestamped log file in it.
    pub fn create(dir: impl AsRef<Path>) -> io::Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let name = format!("data_{}.log", Local::now().format("%Y%m%d_%H%M%S"));
        Self::create_at(dir.join(name))
    }

    /// Opens (truncating) a log file at an explicit path.
    pub fn create_at(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = File::create(&path)?;
        info!("writing raw samples to {}", path.display());
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            lines_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }

    /// Appends every sample of `cycle` and flushes.
    ///
    /// A failed line is logged and skipped. Returns the number of lines written.
    pub fn write_cycle(&mut self, cycle: &Cycle) -> usize {
        let mut written = 0;
        for snapshot in &cycle.snapshots {
            for sample in snapshot.counters.values() {
                match writeln!(self.writer, "{}", format_line(snapshot, sample)) {
                    Ok(()) => written += 1,
                    Err(e) => warn!("error writing to {}: {}", self.path.display(), e),
                }
            }
        }
        if let Err(e) = self.writer.flush() {
            warn!("error flushing {}: {}", self.path.display(), e);
        }
        self.lines_written += written as u64;
        written
    }
}
