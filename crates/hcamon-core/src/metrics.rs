//! Exposition registry for the pull endpoint.
//!
//! The registry is an explicit object owned by whoever serves it; nothing in
//! the collection pipeline touches a process-wide default registry.

use std::string::FromUtf8Error;

use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use thiserror::Error;

use crate::model::{CounterSample, DeviceSnapshot, RateRecord};

/// Raw counter gauge.
pub const COUNTER_METRIC: &str = "ib_hca_counter";
/// Derived rate gauge.
pub const RATE_METRIC: &str = "ib_hca_rate";

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus: {0}")]
    Prometheus(#[from] prometheus::Error),
    #[error("exposition is not UTF-8: {0}")]
    Utf8(#[from] FromUtf8Error),
}

/// `<metric>{device="<dev>", counter_name="<name>"} <value>`
pub fn format_exposition_line(metric: &str, sample: &CounterSample) -> String {
    format!(
        "{}{{device=\"{}\", counter_name=\"{}\"}} {}",
        metric,
        sample.device,
        sample.counter,
        sample.value.as_f64()
    )
}

/// Gauges keyed by `(device, counter_name)`.
pub struct MetricsRegistry {
    registry: Registry,
    counters: GaugeVec,
    rates: GaugeVec,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();
        let counters = GaugeVec::new(
            Opts::new(COUNTER_METRIC, "Raw adapter counter value"),
            &["device", "counter_name"],
        )?;
        let rates = GaugeVec::new(
            Opts::new(RATE_METRIC, "Counter rate since the previous scrape"),
            &["device", "counter_name", "unit"],
        )?;
        registry.register(Box::new(counters.clone()))?;
        registry.register(Box::new(rates.clone()))?;
        Ok(Self {
            registry,
            counters,
            rates,
        })
    }

    /// Sets one gauge per counter. Setting the same key twice keeps the last value.
    pub fn upsert_counters(&self, snapshots: &[DeviceSnapshot]) {
        for snap in snapshots {
            for sample in snap.counters.values() {
                self.counters
                    .with_label_values(&[sample.device.as_str(), sample.counter.as_str()])
                    .set(sample.value.as_f64());
            }
        }
    }

    pub fn upsert_rates(&self, records: &[RateRecord]) {
        for r in records {
            self.rates
                .with_label_values(&[r.device.as_str(), r.counter.as_str(), r.unit.as_str()])
                .set(r.value);
        }
    }

    /// Drops every series, then publishes the given cycle.
    ///
    /// Series of adapters that disappeared are not carried over.
    pub fn replace(&self, snapshots: &[DeviceSnapshot], records: &[RateRecord]) {
        self.counters.reset();
        self.rates.reset();
        self.upsert_counters(snapshots);
        self.upsert_rates(records);
    }

    /// Text exposition of every registered series.
    pub fn render(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }

    /// Content type of [`render`](Self::render) output.
    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Device, RateUnit};

    fn snapshot(name: &str, counters: &[(&str, u64)]) -> DeviceSnapshot {
        let mut snap = DeviceSnapshot::new(Device::new(name), 0);
        for (c, v) in counters {
            snap.counters
                .insert(c.to_string(), CounterSample::count(name, *c, *v));
        }
        snap
    }

    #[test]
    fn test_format_exposition_line() {
        let sample = CounterSample::count("mlx5_0", "port_rcv_data", 1234);
        assert_eq!(
            format_exposition_line(COUNTER_METRIC, &sample),
            "ib_hca_counter{device=\"mlx5_0\", counter_name=\"port_rcv_data\"} 1234"
        );
        let gauge = CounterSample::gauge("mlx5_0", "module_temperature", 45.2, None);
        assert!(format_exposition_line(COUNTER_METRIC, &gauge).ends_with("} 45.2"));
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let registry = MetricsRegistry::new().unwrap();
        registry.upsert_counters(&[snapshot("mlx5_0", &[("out_of_sequence", 1)])]);
        registry.upsert_counters(&[snapshot("mlx5_0", &[("out_of_sequence", 5)])]);

        let text = registry.render().unwrap();
        let lines: Vec<_> = text
            .lines()
            .filter(|l| l.starts_with("ib_hca_counter{"))
            .collect();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("counter_name=\"out_of_sequence\""));
        assert!(lines[0].contains("device=\"mlx5_0\""));
        assert!(lines[0].ends_with(" 5"));
    }

    #[test]
    fn test_rates_carry_unit() {
        let registry = MetricsRegistry::new().unwrap();
        registry.upsert_rates(&[RateRecord {
            device: "mlx5_0".into(),
            counter: "port_rcv_data".into(),
            value: 8.0,
            unit: RateUnit::Gbps,
            counter_reset: false,
        }]);
        let text = registry.render().unwrap();
        assert!(text.contains("# TYPE ib_hca_rate gauge"));
        assert!(text.lines().any(|l| l.starts_with("ib_hca_rate{") && l.contains("unit=\"gbps\"")));
    }

    #[test]
    fn test_replace_drops_stale_devices() {
        let registry = MetricsRegistry::new().unwrap();
        registry.upsert_counters(&[snapshot("mlx5_0", &[("QPNum", 1)])]);
        registry.replace(&[snapshot("mlx5_1", &[("QPNum", 2)])], &[]);

        let text = registry.render().unwrap();
        assert!(!text.contains("mlx5_0"));
        assert!(text.contains("mlx5_1"));
    }

    #[test]
    fn test_content_type() {
        let registry = MetricsRegistry::new().unwrap();
        assert!(registry.content_type().starts_with("text/plain"));
    }
}
