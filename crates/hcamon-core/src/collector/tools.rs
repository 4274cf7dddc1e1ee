//! Collectors backed by external diagnostic tools.
//!
//! Each invocation is bounded by the configured timeout. A failed, timed-out
//! or empty run drops that device's contribution for the cycle.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::collector::parser::{parse_colon_fields, parse_optical, parse_resource_summary};
use crate::collector::traits::{CommandRunner, CounterSource, with_host_namespaces};
use crate::model::{CounterSample, Device};
use crate::profile::LinkProfile;

/// Memory-region count from `rdma resource show <dev>`.
pub struct ResourceCollector<R: CommandRunner> {
    runner: Arc<R>,
    timeout: Duration,
}

impl<R: CommandRunner> ResourceCollector<R> {
    pub fn new(runner: Arc<R>, timeout: Duration) -> Self {
        Self { runner, timeout }
    }
}

impl<R: CommandRunner> CounterSource for ResourceCollector<R> {
    fn name(&self) -> &'static str {
        "rdma_resource"
    }

    fn collect(&self, devices: &[Device]) -> Vec<CounterSample> {
        devices
            .iter()
            .filter_map(|d| {
                let output = self
                    .runner
                    .run_checked("rdma", &["resource", "show", &d.name], self.timeout)
                    .map_err(|e| warn!("{}: {}", d.name, e))
                    .ok()?;
                match parse_resource_summary(&output) {
                    Some(summary) => {
                        debug!("{}: qp {} mr {}", d.name, summary.qp, summary.mr);
                        Some(CounterSample::count(&d.name, "MRNum", summary.mr))
                    }
                    None => {
                        warn!("{}: unrecognized rdma resource output", d.name);
                        None
                    }
                }
            })
            .collect()
    }
}

/// NIC statistics from `ethtool -S <netdev>`, filtered by the link profile.
pub struct NicStatsCollector<R: CommandRunner> {
    runner: Arc<R>,
    timeout: Duration,
}

impl<R: CommandRunner> NicStatsCollector<R> {
    pub fn new(runner: Arc<R>, timeout: Duration) -> Self {
        Self { runner, timeout }
    }
}

impl<R: CommandRunner> CounterSource for NicStatsCollector<R> {
    fn name(&self) -> &'static str {
        "ethtool"
    }

    fn collect(&self, devices: &[Device]) -> Vec<CounterSample> {
        let mut samples = Vec::new();
        for d in devices {
            let profile = LinkProfile::for_link(d.link_layer);
            if profile.ethtool_fields.is_empty() {
                continue;
            }
            let Some(net_dev) = d.net_dev.as_deref() else {
                debug!("{}: no network interface, skipping ethtool", d.name);
                continue;
            };
            let output = match self.runner.run_checked("ethtool", &["-S", net_dev], self.timeout) {
                Ok(output) => output,
                Err(e) => {
                    warn!("{}: {}", d.name, e);
                    continue;
                }
            };
            samples.extend(
                parse_colon_fields(&output, profile.ethtool_fields)
                    .into_iter()
                    .map(|(key, value)| CounterSample::count(&d.name, key, value)),
            );
        }
        samples
    }
}

/// Optical module diagnostics from `mlxlink -d <dev> -m`, physical functions only.
pub struct OpticalCollector<R: CommandRunner> {
    runner: Arc<R>,
    timeout: Duration,
    host_namespaces: bool,
}

impl<R: CommandRunner> OpticalCollector<R> {
    pub fn new(runner: Arc<R>, timeout: Duration, host_namespaces: bool) -> Self {
        Self {
            runner,
            timeout,
            host_namespaces,
        }
    }
}

impl<R: CommandRunner> CounterSource for OpticalCollector<R> {
    fn name(&self) -> &'static str {
        "mlxlink"
    }

    fn collect(&self, devices: &[Device]) -> Vec<CounterSample> {
        let mut samples = Vec::new();
        for d in devices.iter().filter(|d| d.physical) {
            let args = ["-d", d.name.as_str(), "-m"];
            let result = if self.host_namespaces {
                self.runner
                    .run_checked("nsenter", &with_host_namespaces("mlxlink", &args), self.timeout)
            } else {
                self.runner.run_checked("mlxlink", &args, self.timeout)
            };
            let output = match result {
                Ok(output) => output,
                Err(e) => {
                    warn!("{}: {}", d.name, e);
                    continue;
                }
            };
            let report = parse_optical(&output);
            if let Some(cable) = &report.cable_type {
                debug!("{}: cable type {}", d.name, cable);
            }
            samples.extend(
                report
                    .readings
                    .into_iter()
                    .map(|r| CounterSample::gauge(&d.name, r.name, r.value, r.lane)),
            );
        }
        samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::discovery::Discoverer;
    use crate::collector::mock::scenarios::SYSFS_ROOT;
    use crate::collector::mock::{MockFs, MockRunner};
    use crate::config::CollectorConfig;
    use crate::model::CounterValue;

    const T: Duration = Duration::from_secs(60);

    fn roce() -> (Vec<Device>, Arc<MockRunner>) {
        let devices = Discoverer::new(
            MockFs::roce_host(),
            SYSFS_ROOT,
            CollectorConfig::default().exclude_markers,
        )
        .devices()
        .unwrap();
        (devices, Arc::new(MockRunner::roce_host()))
    }

    #[test]
    fn test_resource_collector() {
        let (devices, runner) = roce();
        let samples = ResourceCollector::new(runner, T).collect(&devices);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].counter, "MRNum");
        assert_eq!(samples[0].value, CounterValue::Count(7));
        assert_eq!(samples[1].value, CounterValue::Count(2));
    }

    #[test]
    fn test_resource_collector_drops_unmatched_output() {
        let (devices, _) = roce();
        let mut runner = MockRunner::new();
        runner.ok("rdma resource show mlx5_0", "0: mlx5_0: pd 4 cq 12\n");
        let samples = ResourceCollector::new(Arc::new(runner), T).collect(&devices);
        assert!(samples.is_empty());
    }

    #[test]
    fn test_nic_stats_uses_ethernet_allow_list() {
        let (devices, runner) = roce();
        let samples = NicStatsCollector::new(runner, T).collect(&devices);

        // eth1 fails; only eth0 contributes
        assert!(samples.iter().all(|s| s.device == "mlx5_0"));
        let names: Vec<_> = samples.iter().map(|s| s.counter.as_str()).collect();
        assert!(names.contains(&"rx_prio0_bytes"));
        assert!(names.contains(&"rx_prio5_pause"));
        assert!(!names.contains(&"rx_packets"));
        assert!(!names.contains(&"ch0_arm"));
        assert_eq!(samples.len(), 9);
    }

    #[test]
    fn test_nic_stats_infiniband() {
        let devices = Discoverer::new(MockFs::infiniband_host(), SYSFS_ROOT, Vec::new())
            .devices()
            .unwrap();
        let runner = Arc::new(MockRunner::infiniband_host());
        let samples = NicStatsCollector::new(runner, T).collect(&devices);
        let names: Vec<_> = samples.iter().map(|s| s.counter.as_str()).collect();
        assert_eq!(
            names,
            vec!["rx_vport_rdma_unicast_bytes", "tx_vport_rdma_unicast_bytes"]
        );
    }

    #[test]
    fn test_optical_physical_only_and_timeout_dropped() {
        let (devices, runner) = roce();
        let samples = OpticalCollector::new(runner.clone(), T, true).collect(&devices);

        assert!(samples.iter().all(|s| s.device == "mlx5_0"));
        let temp = samples
            .iter()
            .find(|s| s.counter == "module_temperature")
            .unwrap();
        assert_eq!(temp.value, CounterValue::Gauge(45.2));
        let bias: Vec<_> = samples
            .iter()
            .filter(|s| s.counter.starts_with("module_bias_current_lane"))
            .collect();
        assert_eq!(bias.len(), 4);
        assert_eq!(bias[2].value, CounterValue::Gauge(6500.0));
        // N/A lane skipped
        assert!(
            !samples
                .iter()
                .any(|s| s.counter == "module_rx_power_lane3")
        );
        assert!(
            runner
                .calls()
                .contains(&"nsenter -t 1 -m -u -n -i -p -- mlxlink -d mlx5_1 -m".to_string())
        );
    }

    #[test]
    fn test_optical_skips_virtual_functions() {
        let devices = Discoverer::new(MockFs::infiniband_host(), SYSFS_ROOT, Vec::new())
            .devices()
            .unwrap();
        let runner = Arc::new(MockRunner::new());
        OpticalCollector::new(runner.clone(), T, false).collect(&devices);
        assert_eq!(runner.calls(), vec!["mlxlink -d mlx5_0 -m".to_string()]);
    }
}
