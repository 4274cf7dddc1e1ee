//! Main collector that runs one full collection cycle.
//!
//! The `Collector` discovers adapters, applies the PCIe override, fans the
//! counter sources out over a [`TaskGroup`] and merges their output into one
//! [`Cycle`].

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

use crate::aggregate::normalize;
use crate::collector::discovery::Discoverer;
use crate::collector::pcie::tune_max_read_request;
use crate::collector::sysfs::{PlainFileCollector, PortSpeedCollector, QueuePairCollector};
use crate::collector::tools::{NicStatsCollector, OpticalCollector, ResourceCollector};
use crate::collector::traits::{CommandRunner, CounterSource, FileSystem};
use crate::config::CollectorConfig;
use crate::model::{CounterSample, Cycle, Device};
use crate::util::{TaskGroup, now_ns};

/// Failure that aborts a whole cycle.
///
/// Device-scoped failures never surface here; they are logged and that
/// device's contribution is dropped.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("cannot enumerate adapters: {0}")]
    Discovery(#[source] io::Error),
}

/// Timing information for each collection phase.
///
/// Used for debugging and performance monitoring.
#[derive(Debug, Clone, Default)]
pub struct CollectorTiming {
    /// Total cycle time.
    pub total: Duration,
    /// Time to enumerate and classify adapters.
    pub discovery: Duration,
    /// Time spent on PCIe register tuning.
    pub mrrs: Duration,
    /// Wall time of each counter source, in registration order.
    pub sources: Vec<(&'static str, Duration)>,
}

struct SourceOutput {
    name: &'static str,
    elapsed: Duration,
    samples: Vec<CounterSample>,
}

/// Gathers every counter source into one cycle.
pub struct Collector<F: FileSystem + Clone + 'static, R: CommandRunner + 'static> {
    discoverer: Discoverer<F>,
    runner: Arc<R>,
    config: CollectorConfig,
    sources: Vec<Box<dyn CounterSource>>,
    last_timing: Option<CollectorTiming>,
}

impl<F: FileSystem + Clone + 'static, R: CommandRunner + 'static> Collector<F, R> {
    /// Creates a new collector.
    ///
    /// # Arguments
    /// * `fs` - Filesystem implementation (real or mock)
    /// * `runner` - Command runner for external tools (real or mock)
    /// * `config` - Paths and knobs
    pub fn new(fs: F, runner: Arc<R>, config: CollectorConfig) -> Self {
        let timeout = config.command_timeout;
        let mut sources: Vec<Box<dyn CounterSource>> = vec![
            Box::new(PlainFileCollector::new(fs.clone(), &config.sysfs_root)),
            Box::new(QueuePairCollector::new(fs.clone(), &config.debugfs_root)),
            Box::new(PortSpeedCollector::new(fs.clone(), &config.sysfs_root)),
            Box::new(ResourceCollector::new(runner.clone(), timeout)),
            Box::new(NicStatsCollector::new(runner.clone(), timeout)),
        ];
        if config.optical {
            sources.push(Box::new(OpticalCollector::new(
                runner.clone(),
                timeout,
                config.host_namespaces,
            )));
        }

        Self {
            discoverer: Discoverer::new(
                fs,
                &config.sysfs_root,
                config.exclude_markers.clone(),
            ),
            runner,
            config,
            sources,
            last_timing: None,
        }
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Names of the registered counter sources.
    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Returns timing information from the last `collect_cycle` call.
    pub fn last_timing(&self) -> Option<&CollectorTiming> {
        self.last_timing.as_ref()
    }

    fn tune_devices(&self, devices: &[Device]) {
        for d in devices {
            let Some(slot) = d.pci_slot.as_deref() else {
                debug!("{}: no PCI slot, skipping register tuning", d.name);
                continue;
            };
            if let Err(e) = tune_max_read_request(
                self.runner.as_ref(),
                slot,
                &self.config.mrrs_offset,
                self.config.mrrs_nibble,
                self.config.command_timeout,
            ) {
                warn!("{}: max read request tuning failed: {}", d.name, e);
            }
        }
    }

    /// Runs one collection cycle.
    ///
    /// Every snapshot in the returned cycle carries the same timestamp,
    /// taken after all sources have finished. Also records timing
    /// information accessible via `last_timing()`.
    pub fn collect_cycle(&mut self) -> Result<Cycle, CollectError> {
        let total_start = Instant::now();
        let mut timing = CollectorTiming::default();

        let start = Instant::now();
        let devices = self.discoverer.devices().map_err(CollectError::Discovery)?;
        timing.discovery = start.elapsed();
        debug!("discovered {} active adapters", devices.len());

        if self.config.tune_mrrs {
            let start = Instant::now();
            self.tune_devices(&devices);
            timing.mrrs = start.elapsed();
        }

        let mut group = TaskGroup::new();
        for source in &self.sources {
            let devices = devices.as_slice();
            group.spawn(source.name(), move || {
                let start = Instant::now();
                let samples = source.collect(devices);
                vec![SourceOutput {
                    name: source.name(),
                    elapsed: start.elapsed(),
                    samples,
                }]
            });
        }

        let mut samples = Vec::new();
        for output in group.join() {
            debug!(
                "source {} produced {} samples in {:?}",
                output.name,
                output.samples.len(),
                output.elapsed
            );
            timing.sources.push((output.name, output.elapsed));
            samples.extend(output.samples);
        }

        let timestamp_ns = now_ns();
        let normalized = normalize(&devices, samples, timestamp_ns);

        timing.total = total_start.elapsed();
        self.last_timing = Some(timing);

        Ok(Cycle {
            timestamp_ns,
            snapshots: normalized.snapshots,
        })
    }
}
