//! Rate computation between successive snapshots.
//!
//! This module is the single place where throughput and delta metrics are
//! derived. The dashboard, the exporter and the recorder all delegate here.

use std::collections::HashMap;

use tracing::debug;

use crate::model::{DeviceSnapshot, RateRecord, RateUnit};
use crate::profile::{LinkProfile, RateKind};

/// Previous snapshot per device name.
pub type History = HashMap<String, DeviceSnapshot>;

/// Compute u64 delta, returning `None` on counter regression (device reset).
pub fn du64(curr: u64, prev: u64) -> Option<u64> {
    (curr >= prev).then_some(curr - prev)
}

/// Seconds between two nanosecond timestamps; `None` unless strictly positive.
pub fn elapsed_secs(current_ns: i64, previous_ns: i64) -> Option<f64> {
    match current_ns.checked_sub(previous_ns) {
        Some(delta) if delta > 0 => Some(delta as f64 / 1e9),
        _ => None,
    }
}

/// Gigabits per second for a byte delta over `elapsed` seconds.
pub fn gbps(delta: u64, multiplier: f64, elapsed: f64) -> f64 {
    delta as f64 * 8.0 * multiplier / elapsed / 1e9
}

fn unit(kind: RateKind) -> RateUnit {
    match kind {
        RateKind::Throughput { .. } => RateUnit::Gbps,
        RateKind::Delta => RateUnit::Delta,
    }
}

/// Derives rate records for one device.
///
/// Without a previous snapshot, with a non-positive interval, or when a
/// counter is missing on either side, the record is zero. A counter that
/// went backwards yields zero with `counter_reset` set.
pub fn device_rates(previous: Option<&DeviceSnapshot>, current: &DeviceSnapshot) -> Vec<RateRecord> {
    let profile = LinkProfile::for_link(current.device.link_layer);
    let elapsed = previous.and_then(|p| elapsed_secs(current.timestamp_ns, p.timestamp_ns));

    profile
        .rates
        .iter()
        .map(|spec| {
            let mut record = RateRecord {
                device: current.device.name.clone(),
                counter: spec.counter.to_string(),
                value: 0.0,
                unit: unit(spec.kind),
                counter_reset: false,
            };
            let (Some(prev), Some(elapsed)) = (previous, elapsed) else {
                return record;
            };
            let (Some(curr_v), Some(prev_v)) =
                (current.value(spec.counter), prev.value(spec.counter))
            else {
                return record;
            };
            match du64(curr_v.as_u64(), prev_v.as_u64()) {
                Some(delta) => {
                    record.value = match spec.kind {
                        RateKind::Throughput { multiplier } => gbps(delta, multiplier, elapsed),
                        RateKind::Delta => delta as f64,
                    };
                }
                None => {
                    debug!(
                        "{}: {} went backwards ({} -> {}), treating as reset",
                        record.device,
                        spec.counter,
                        prev_v.as_u64(),
                        curr_v.as_u64()
                    );
                    record.counter_reset = true;
                }
            }
            record
        })
        .collect()
}

/// Diffs `current` against `previous`.
///
/// Returns the derived records and the table to use as `previous` next time,
/// which holds exactly the devices in `current`.
pub fn compute(previous: &History, current: &[DeviceSnapshot]) -> (Vec<RateRecord>, History) {
    let records = current
        .iter()
        .flat_map(|snap| device_rates(previous.get(snap.name()), snap))
        .collect();
    let next = current
        .iter()
        .map(|snap| (snap.name().to_string(), snap.clone()))
        .collect();
    (records, next)
}

/// Owns the previous-snapshot table of one consumer.
///
/// The table is swapped as a whole after each cycle.
#[derive(Debug, Default)]
pub struct RateComputer {
    previous: History,
}

impl RateComputer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derives rates for `current` and makes it the new history.
    pub fn update(&mut self, current: &[DeviceSnapshot]) -> Vec<RateRecord> {
        let (records, next) = compute(&self.previous, current);
        self.previous = next;
        records
    }

    pub fn previous(&self) -> &History {
        &self.previous
    }

    pub fn reset(&mut self) {
        self.previous.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CounterSample, Device, LinkLayer};

    const SEC: i64 = 1_000_000_000;

    fn snap(name: &str, link: LinkLayer, ts: i64, counters: &[(&str, u64)]) -> DeviceSnapshot {
        let mut device = Device::new(name);
        device.link_layer = link;
        let mut s = DeviceSnapshot::new(device, ts);
        for (c, v) in counters {
            s.counters
                .insert(c.to_string(), CounterSample::count(name, *c, *v));
        }
        s
    }

    fn value(records: &[RateRecord], dev: &str, counter: &str) -> f64 {
        records
            .iter()
            .find(|r| r.device == dev && r.counter == counter)
            .map(|r| r.value)
            .unwrap()
    }

    #[test]
    fn test_first_sample_is_zero() {
        let current = vec![snap(
            "mlx5_0",
            LinkLayer::Ethernet,
            SEC,
            &[("rx_prio0_bytes", 5_000), ("out_of_sequence", 9)],
        )];
        let (records, next) = compute(&History::new(), &current);
        assert_eq!(records.len(), LinkProfile::for_link(LinkLayer::Ethernet).rates.len());
        assert!(records.iter().all(|r| r.value == 0.0 && !r.counter_reset));
        assert!(next.contains_key("mlx5_0"));
    }

    #[test]
    fn test_throughput_and_delta() {
        let mut rc = RateComputer::new();
        rc.update(&[snap(
            "mlx5_0",
            LinkLayer::Ethernet,
            10 * SEC,
            &[("rx_prio0_bytes", 1_000), ("rx_prio0_discards", 4)],
        )]);
        let records = rc.update(&[snap(
            "mlx5_0",
            LinkLayer::Ethernet,
            12 * SEC,
            &[("rx_prio0_bytes", 1_000 + 2_000_000_000), ("rx_prio0_discards", 10)],
        )]);

        // 2e9 bytes over 2 s
        assert!((value(&records, "mlx5_0", "rx_prio0_bytes") - 8.0).abs() < 1e-9);
        assert_eq!(value(&records, "mlx5_0", "rx_prio0_discards"), 6.0);
        // missing on both sides
        assert_eq!(value(&records, "mlx5_0", "tx_prio5_bytes"), 0.0);
    }

    #[test]
    fn test_infiniband_multiplier() {
        let prev = snap("mlx5_0", LinkLayer::InfiniBand, 0, &[("port_rcv_data", 0)]);
        let curr = snap(
            "mlx5_0",
            LinkLayer::InfiniBand,
            SEC,
            &[("port_rcv_data", 250_000_000)],
        );
        let records = device_rates(Some(&prev), &curr);
        assert!((value(&records, "mlx5_0", "port_rcv_data") - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_non_positive_elapsed_is_zero() {
        let prev = snap("mlx5_0", LinkLayer::Ethernet, 5 * SEC, &[("rx_prio0_bytes", 0)]);
        for ts in [5 * SEC, 4 * SEC] {
            let curr = snap("mlx5_0", LinkLayer::Ethernet, ts, &[("rx_prio0_bytes", 100)]);
            let records = device_rates(Some(&prev), &curr);
            assert!(records.iter().all(|r| r.value == 0.0));
        }
    }

    #[test]
    fn test_counter_regression_flags_reset() {
        let prev = snap("mlx5_0", LinkLayer::Ethernet, 0, &[("out_of_sequence", 100)]);
        let curr = snap("mlx5_0", LinkLayer::Ethernet, SEC, &[("out_of_sequence", 3)]);
        let records = device_rates(Some(&prev), &curr);
        let oos = records
            .iter()
            .find(|r| r.counter == "out_of_sequence")
            .unwrap();
        assert_eq!(oos.value, 0.0);
        assert!(oos.counter_reset);
        assert_eq!(oos.unit, RateUnit::Delta);
    }

    #[test]
    fn test_history_replaced_wholesale() {
        let mut rc = RateComputer::new();
        rc.update(&[
            snap("mlx5_0", LinkLayer::Ethernet, 0, &[]),
            snap("mlx5_1", LinkLayer::Ethernet, 0, &[]),
        ]);
        rc.update(&[snap("mlx5_1", LinkLayer::Ethernet, SEC, &[])]);
        assert_eq!(rc.previous().len(), 1);
        assert!(rc.previous().contains_key("mlx5_1"));
    }

    #[test]
    fn test_du64() {
        assert_eq!(du64(10, 4), Some(6));
        assert_eq!(du64(4, 10), None);
    }
}
