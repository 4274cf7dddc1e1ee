//! Collector configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Paths and knobs for one collector instance.
///
/// `Default` matches a production host.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Adapter class directory.
    pub sysfs_root: PathBuf,
    /// mlx5 debugfs root, keyed by PCI address.
    pub debugfs_root: PathBuf,
    /// Adapters whose name contains any of these are skipped.
    pub exclude_markers: Vec<String>,
    /// Deadline for every external tool invocation.
    pub command_timeout: Duration,
    /// Run the optical diagnostics tool on physical functions.
    pub optical: bool,
    /// Enter the host namespaces of PID 1 before running the optical tool.
    pub host_namespaces: bool,
    /// Apply the Max Read Request Size override before collection.
    pub tune_mrrs: bool,
    /// PCI config-space offset of the device control register.
    pub mrrs_offset: String,
    /// New high nibble of the device control register.
    pub mrrs_nibble: u16,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            sysfs_root: PathBuf::from("/sys/class/infiniband"),
            debugfs_root: PathBuf::from("/sys/kernel/debug/mlx5"),
            exclude_markers: ["mezz", "mlx5_5", "mlx5_6", "mlx5_7", "mlx5_8"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            command_timeout: Duration::from_secs(60),
            optical: false,
            host_namespaces: true,
            tune_mrrs: true,
            mrrs_offset: "68".to_string(),
            mrrs_nibble: 5,
        }
    }
}
