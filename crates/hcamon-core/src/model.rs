//! Data model shared by collectors, the rate computer and every sink.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// Link layer reported by `ports/1/link_layer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum LinkLayer {
    Ethernet,
    InfiniBand,
    #[default]
    Unknown,
}

impl LinkLayer {
    /// Classifies the raw file content by substring.
    pub fn from_sysfs(content: &str) -> Self {
        if content.contains("InfiniBand") {
            LinkLayer::InfiniBand
        } else if content.contains("Ethernet") {
            LinkLayer::Ethernet
        } else {
            LinkLayer::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LinkLayer::Ethernet => "Ethernet",
            LinkLayer::InfiniBand => "InfiniBand",
            LinkLayer::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for LinkLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An active adapter, with attributes resolved once per collection cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Device {
    /// Adapter name, e.g. `mlx5_0`.
    pub name: String,
    /// Associated network interface (first entry of `device/net`).
    pub net_dev: Option<String>,
    pub link_layer: LinkLayer,
    /// Physical function (has `device/sriov_numvfs`).
    pub physical: bool,
    /// PCI bus-device-function address from `device/uevent`.
    pub pci_slot: Option<String>,
}

impl Device {
    /// Creates a device with no resolved attributes.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            net_dev: None,
            link_layer: LinkLayer::Unknown,
            physical: false,
            pci_slot: None,
        }
    }
}

/// Value of one counter.
///
/// Hardware counters are cumulative unsigned integers; optical diagnostics
/// carry scaled floating-point readings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CounterValue {
    Count(u64),
    Gauge(f64),
}

impl CounterValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            CounterValue::Count(v) => v as f64,
            CounterValue::Gauge(v) => v,
        }
    }

    /// Integer view; gauges are truncated.
    pub fn as_u64(&self) -> u64 {
        match *self {
            CounterValue::Count(v) => v,
            CounterValue::Gauge(v) if v > 0.0 => v as u64,
            CounterValue::Gauge(_) => 0,
        }
    }
}

/// One counter reading produced by a collector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CounterSample {
    pub device: String,
    pub counter: String,
    pub value: CounterValue,
    /// Lane index for multi-lane optical readings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lane: Option<u8>,
}

impl CounterSample {
    pub fn count(device: &str, counter: impl Into<String>, value: u64) -> Self {
        Self {
            device: device.to_string(),
            counter: counter.into(),
            value: CounterValue::Count(value),
            lane: None,
        }
    }

    pub fn gauge(device: &str, counter: impl Into<String>, value: f64, lane: Option<u8>) -> Self {
        Self {
            device: device.to_string(),
            counter: counter.into(),
            value: CounterValue::Gauge(value),
            lane,
        }
    }
}

/// Every counter of one device captured in one collection pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSnapshot {
    pub device: Device,
    /// Capture time in nanoseconds since the Unix epoch.
    pub timestamp_ns: i64,
    pub counters: BTreeMap<String, CounterSample>,
}

impl DeviceSnapshot {
    pub fn new(device: Device, timestamp_ns: i64) -> Self {
        Self {
            device,
            timestamp_ns,
            counters: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.device.name
    }

    pub fn value(&self, counter: &str) -> Option<CounterValue> {
        self.counters.get(counter).map(|s| s.value)
    }
}

/// Unit of a derived metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RateUnit {
    /// Gigabits per second.
    Gbps,
    /// Plain counter increase since the previous snapshot.
    Delta,
}

impl RateUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateUnit::Gbps => "gbps",
            RateUnit::Delta => "delta",
        }
    }
}

/// Derived per-interval metric for one (device, counter) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateRecord {
    pub device: String,
    pub counter: String,
    pub value: f64,
    pub unit: RateUnit,
    /// The counter went backwards (device reset); `value` was clamped to zero.
    pub counter_reset: bool,
}

/// Output of one full collection pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Cycle {
    /// Capture time shared by every snapshot of the pass.
    pub timestamp_ns: i64,
    /// One snapshot per device, ordered by device name.
    pub snapshots: Vec<DeviceSnapshot>,
}

impl Cycle {
    pub fn sample_count(&self) -> usize {
        self.snapshots.iter().map(|s| s.counters.len()).sum()
    }
}
