//! Collectors that read sysfs and debugfs directly.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::collector::parser::{parse_counter_value, parse_port_speed};
use crate::collector::traits::{CounterSource, FileSystem};
use crate::model::{CounterSample, Device};
use crate::util::TaskGroup;

/// Counter directories under `ports/1`, read concurrently.
pub const COUNTER_DIRS: [&str; 2] = ["counters", "hw_counters"];

/// Reads every file in one counter directory as an unsigned integer.
///
/// Unreadable or non-numeric files are skipped.
pub fn read_counter_dir<F: FileSystem>(fs: &F, dir: &Path, device: &str) -> Vec<CounterSample> {
    let mut entries = match fs.read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("{}: cannot list {}: {}", device, dir.display(), e);
            return Vec::new();
        }
    };
    entries.sort();

    entries
        .iter()
        .filter_map(|path| {
            let name = path.file_name()?.to_str()?;
            let content = fs
                .read_to_string(path)
                .map_err(|e| debug!("{}: skip {}: {}", device, path.display(), e))
                .ok()?;
            let value = parse_counter_value(&content)
                .map_err(|e| debug!("{}: skip {}: {}", device, name, e))
                .ok()?;
            Some(CounterSample::count(device, name, value))
        })
        .collect()
}

/// Plain-file counters from `ports/1/counters` and `ports/1/hw_counters`.
pub struct PlainFileCollector<F: FileSystem> {
    fs: F,
    root: PathBuf,
}

impl<F: FileSystem> PlainFileCollector<F> {
    pub fn new(fs: F, root: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            root: root.into(),
        }
    }
}

impl<F: FileSystem> CounterSource for PlainFileCollector<F> {
    fn name(&self) -> &'static str {
        "plain_file"
    }

    fn collect(&self, devices: &[Device]) -> Vec<CounterSample> {
        let mut group = TaskGroup::new();
        for dir in COUNTER_DIRS {
            group.spawn(dir, move || {
                devices
                    .iter()
                    .flat_map(|d| {
                        let path = self.root.join(&d.name).join("ports/1").join(dir);
                        read_counter_dir(&self.fs, &path, &d.name)
                    })
                    .collect()
            });
        }
        group.join()
    }
}

/// Queue-pair count: number of entries in the mlx5 debugfs `QPs` directory.
pub struct QueuePairCollector<F: FileSystem> {
    fs: F,
    debugfs_root: PathBuf,
}

impl<F: FileSystem> QueuePairCollector<F> {
    pub fn new(fs: F, debugfs_root: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            debugfs_root: debugfs_root.into(),
        }
    }
}

impl<F: FileSystem> CounterSource for QueuePairCollector<F> {
    fn name(&self) -> &'static str {
        "queue_pairs"
    }

    fn collect(&self, devices: &[Device]) -> Vec<CounterSample> {
        devices
            .iter()
            .filter_map(|d| {
                let Some(slot) = d.pci_slot.as_deref() else {
                    warn!("{}: no PCI slot, skipping QP count", d.name);
                    return None;
                };
                let dir = self.debugfs_root.join(slot).join("QPs");
                match self.fs.read_dir(&dir) {
                    Ok(entries) => {
                        let count = entries.iter().filter(|p| self.fs.is_dir(p)).count();
                        Some(CounterSample::count(&d.name, "QPNum", count as u64))
                    }
                    Err(e) => {
                        warn!("{}: cannot list {}: {}", d.name, dir.display(), e);
                        None
                    }
                }
            })
            .collect()
    }
}

/// Link speed derived from `ports/1/rate`.
pub struct PortSpeedCollector<F: FileSystem> {
    fs: F,
    root: PathBuf,
}

impl<F: FileSystem> PortSpeedCollector<F> {
    pub fn new(fs: F, root: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            root: root.into(),
        }
    }
}

impl<F: FileSystem> CounterSource for PortSpeedCollector<F> {
    fn name(&self) -> &'static str {
        "port_speed"
    }

    fn collect(&self, devices: &[Device]) -> Vec<CounterSample> {
        devices
            .iter()
            .filter_map(|d| {
                let path = self.root.join(&d.name).join("ports/1/rate");
                match self.fs.read_to_string(&path) {
                    Ok(rate) => Some(CounterSample::count(
                        &d.name,
                        "portSpeed",
                        parse_port_speed(&rate),
                    )),
                    Err(e) => {
                        warn!("{}: cannot read {}: {}", d.name, path.display(), e);
                        None
                    }
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::discovery::Discoverer;
    use crate::collector::mock::MockFs;
    use crate::collector::mock::scenarios::{DEBUGFS_ROOT, SYSFS_ROOT};
    use crate::model::CounterValue;

    fn devices(fs: &MockFs) -> Vec<Device> {
        Discoverer::new(fs.clone(), SYSFS_ROOT, vec!["mezz".into(), "mlx5_5".into()])
            .devices()
            .unwrap()
    }

    fn find<'a>(samples: &'a [CounterSample], dev: &str, counter: &str) -> Option<&'a CounterSample> {
        samples
            .iter()
            .find(|s| s.device == dev && s.counter == counter)
    }

    #[test]
    fn test_plain_file_reads_both_dirs() {
        let fs = MockFs::roce_host();
        let devs = devices(&fs);
        let samples = PlainFileCollector::new(fs, SYSFS_ROOT).collect(&devs);

        assert_eq!(samples.len(), 10);
        assert_eq!(
            find(&samples, "mlx5_0", "port_rcv_data").unwrap().value,
            CounterValue::Count(1_000_000)
        );
        assert_eq!(
            find(&samples, "mlx5_0", "np_cnp_sent").unwrap().value,
            CounterValue::Count(10)
        );
        // counters dir first, then hw_counters
        assert_eq!(samples[0].counter, "port_rcv_data");
        assert_eq!(samples.last().unwrap().counter, "rp_cnp_handled");
    }

    #[test]
    fn test_plain_file_skips_bad_values() {
        let mut fs = MockFs::roce_host();
        fs.add_file(
            "/sys/class/infiniband/mlx5_0/ports/1/counters/link_downed",
            "garbage\n",
        );
        let devs = devices(&fs);
        let samples = PlainFileCollector::new(fs, SYSFS_ROOT).collect(&devs);
        assert!(find(&samples, "mlx5_0", "link_downed").is_none());
        assert!(find(&samples, "mlx5_0", "port_xmit_data").is_some());
    }

    #[test]
    fn test_queue_pair_count() {
        let fs = MockFs::roce_host();
        let devs = devices(&fs);
        let samples = QueuePairCollector::new(fs, DEBUGFS_ROOT).collect(&devs);
        assert_eq!(
            find(&samples, "mlx5_0", "QPNum").unwrap().value,
            CounterValue::Count(3)
        );
        assert_eq!(
            find(&samples, "mlx5_1", "QPNum").unwrap().value,
            CounterValue::Count(1)
        );
    }

    #[test]
    fn test_queue_pair_missing_debugfs() {
        let fs = MockFs::roce_host();
        let devs = devices(&fs);
        let samples = QueuePairCollector::new(fs, "/nonexistent").collect(&devs);
        assert!(samples.is_empty());
    }

    #[test]
    fn test_port_speed() {
        let fs = MockFs::roce_host();
        let devs = devices(&fs);
        let samples = PortSpeedCollector::new(fs, SYSFS_ROOT).collect(&devs);
        assert_eq!(
            find(&samples, "mlx5_0", "portSpeed").unwrap().value,
            CounterValue::Count(200_000)
        );
        assert_eq!(
            find(&samples, "mlx5_1", "portSpeed").unwrap().value,
            CounterValue::Count(400_000)
        );
    }
}
