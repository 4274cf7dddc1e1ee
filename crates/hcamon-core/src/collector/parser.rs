//! Parsers for sysfs attributes and external tool output.
//!
//! Every function here is pure: collectors hand in the captured text, so the
//! grammars are tested without touching a real host.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Error while parsing a single value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Parses a plain counter file holding one unsigned integer.
pub fn parse_counter_value(content: &str) -> Result<u64, ParseError> {
    let trimmed = content.trim();
    trimmed
        .parse::<u64>()
        .map_err(|e| ParseError::new(format!("invalid counter value '{}': {}", trimmed, e)))
}

/// Returns true if `ports/<n>/state` reports the port as active.
pub fn is_port_active(state: &str) -> bool {
    state.contains("ACTIVE")
}

/// Extracts `PCI_SLOT_NAME` from a `uevent` file.
pub fn parse_uevent_slot(uevent: &str) -> Option<String> {
    uevent
        .lines()
        .find_map(|line| line.trim().strip_prefix("PCI_SLOT_NAME="))
        .map(|slot| slot.trim().to_string())
        .filter(|slot| !slot.is_empty())
}

/// Maps `ports/<n>/rate` content to a link speed in Mb/s.
///
/// Only substring matches are recognized; anything else is 0.
pub fn parse_port_speed(rate: &str) -> u64 {
    if rate.contains("400") {
        400_000
    } else if rate.contains("200") {
        200_000
    } else {
        0
    }
}

/// Splits `key: value` lines on the first colon, trimming both sides.
///
/// Lines without a colon are skipped.
pub fn colon_pairs(output: &str) -> impl Iterator<Item = (&str, &str)> {
    output.lines().filter_map(|line| {
        let (key, value) = line.split_once(':')?;
        Some((key.trim(), value.trim()))
    })
}

/// Parses NIC statistics, keeping only keys from `allow`.
///
/// Values that are not unsigned integers are skipped.
pub fn parse_colon_fields(output: &str, allow: &[&str]) -> Vec<(String, u64)> {
    colon_pairs(output)
        .filter(|(key, _)| allow.contains(key))
        .filter_map(|(key, value)| value.parse::<u64>().ok().map(|v| (key.to_string(), v)))
        .collect()
}

/// One scaled optical reading.
#[derive(Debug, Clone, PartialEq)]
pub struct LaneReading {
    pub name: String,
    pub value: f64,
    pub lane: Option<u8>,
}

/// Optical module diagnostics from `mlxlink -m`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpticalReport {
    pub cable_type: Option<String>,
    pub readings: Vec<LaneReading>,
}

/// Known optical keys, their metric names and scale factors.
const OPTICAL_FIELDS: &[(&str, &str, f64)] = &[
    ("Temperature [C]", "module_temperature", 1.0),
    ("Voltage [mV]", "module_voltage", 1.0),
    ("Bias Current [mA]", "module_bias_current", 1000.0),
    ("Rx Power Current [dBm]", "module_rx_power", 1000.0),
    ("Tx Power Current [dBm]", "module_tx_power", 1000.0),
];

/// Parses one multi-lane value such as `1.446,1.581 [10.0]`.
///
/// The threshold annotation from the first `[` on is dropped. With more than
/// one comma-separated part every reading is named `<base>_lane<i>`, where
/// `i` is the position among all parts, including unparseable ones.
pub fn parse_lane_values(value: &str, base: &str, multiplier: f64) -> Vec<LaneReading> {
    let value = match value.find('[') {
        Some(idx) => &value[..idx],
        None => value,
    };
    let parts: Vec<&str> = value.trim().split(',').collect();
    let multi = parts.len() > 1;

    parts
        .iter()
        .enumerate()
        .filter_map(|(i, part)| {
            let v = part.trim().parse::<f64>().ok()?;
            let lane = u8::try_from(i).ok();
            Some(LaneReading {
                name: if multi {
                    format!("{}_lane{}", base, i)
                } else {
                    base.to_string()
                },
                value: v * multiplier,
                lane: if multi { lane } else { None },
            })
        })
        .collect()
}

/// Parses the module section of `mlxlink -m` output.
pub fn parse_optical(output: &str) -> OpticalReport {
    let mut report = OpticalReport::default();
    for (key, value) in colon_pairs(output) {
        if key == "Cable Type" {
            report.cable_type = Some(value.to_string());
            continue;
        }
        if let Some((_, base, multiplier)) = OPTICAL_FIELDS.iter().find(|(k, _, _)| *k == key) {
            report
                .readings
                .extend(parse_lane_values(value, base, *multiplier));
        }
    }
    report
}

static RESOURCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\w+_\d+):\s+.*?qp\s+(\d+)\s+.*?mr\s+(\d+)").expect("static regex is valid")
});

/// Resource counts from `rdma resource show <dev>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSummary {
    pub device: String,
    pub qp: u64,
    pub mr: u64,
}

/// Extracts the first `<name>: ... qp <N> ... mr <M>` match.
pub fn parse_resource_summary(output: &str) -> Option<ResourceSummary> {
    let caps = RESOURCE_RE.captures(output)?;
    Some(ResourceSummary {
        device: caps.get(1)?.as_str().to_string(),
        qp: caps.get(2)?.as_str().parse().ok()?,
        mr: caps.get(3)?.as_str().parse().ok()?,
    })
}

/// Parses a 16-bit register value printed by `setpci` in hex.
pub fn parse_hex_register(output: &str) -> Result<u16, ParseError> {
    let trimmed = output.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    u16::from_str_radix(digits, 16)
        .map_err(|e| ParseError::new(format!("invalid register value '{}': {}", trimmed, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_counter_value() {
        assert_eq!(parse_counter_value("123456\n").unwrap(), 123456);
        assert!(parse_counter_value("N/A\n").is_err());
        assert!(parse_counter_value("").is_err());
    }

    #[test]
    fn test_port_state() {
        assert!(is_port_active("4: ACTIVE\n"));
        assert!(!is_port_active("1: DOWN\n"));
    }

    #[test]
    fn test_parse_uevent_slot() {
        let uevent = "DRIVER=mlx5_core\nPCI_CLASS=20000\nPCI_SLOT_NAME=0000:1a:00.0\n";
        assert_eq!(parse_uevent_slot(uevent).as_deref(), Some("0000:1a:00.0"));
        assert_eq!(parse_uevent_slot("DRIVER=mlx5_core\n"), None);
    }

    #[test]
    fn test_parse_port_speed() {
        assert_eq!(parse_port_speed("200 Gb/sec (4X HDR)"), 200_000);
        assert_eq!(parse_port_speed("400 Gb/sec (4X NDR)"), 400_000);
        assert_eq!(parse_port_speed("100 Gb/sec (4X EDR)"), 0);
        // "400" wins when both substrings appear.
        assert_eq!(parse_port_speed("400 Gb/sec (2X 200)"), 400_000);
    }

    #[test]
    fn test_parse_colon_fields_allow_list() {
        let output = "NIC statistics:\n     rx_prio0_bytes: 100\n     tx_prio0_bytes: oops\n     rx_packets: 5\n";
        let fields = parse_colon_fields(output, &["rx_prio0_bytes", "tx_prio0_bytes"]);
        assert_eq!(fields, vec![("rx_prio0_bytes".to_string(), 100)]);
    }

    #[test]
    fn test_parse_single_lane_temperature() {
        let report = parse_optical("Temperature [C] : 45.2 [70.0]");
        assert_eq!(report.readings.len(), 1);
        assert_eq!(report.readings[0].name, "module_temperature");
        assert!((report.readings[0].value - 45.2).abs() < 1e-9);
        assert_eq!(report.readings[0].lane, None);
    }

    #[test]
    fn test_parse_multi_lane_bias_current() {
        let report = parse_optical("Bias Current [mA] : 1.446,1.581 [10.0]");
        assert_eq!(report.readings.len(), 2);
        assert_eq!(report.readings[0].name, "module_bias_current_lane0");
        assert!((report.readings[0].value - 1446.0).abs() < 1e-6);
        assert_eq!(report.readings[1].name, "module_bias_current_lane1");
        assert!((report.readings[1].value - 1581.0).abs() < 1e-6);
        assert_eq!(report.readings[1].lane, Some(1));
    }

    #[test]
    fn test_parse_lane_values_skips_garbage() {
        let readings = parse_lane_values("0.1,N/A,-0.2", "module_rx_power", 1000.0);
        let names: Vec<_> = readings.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["module_rx_power_lane0", "module_rx_power_lane2"]);
        assert!((readings[1].value + 200.0).abs() < 1e-6);
    }

    #[test]
    fn test_parse_optical_cable_type() {
        let report = parse_optical(
            "Cable Type                      : Optical Module (separated)\nVoltage [mV]  : 3295.5 [3135..3465]\nSpeed : 200G\n",
        );
        assert_eq!(report.cable_type.as_deref(), Some("Optical Module (separated)"));
        assert_eq!(report.readings.len(), 1);
        assert_eq!(report.readings[0].name, "module_voltage");
    }

    #[test]
    fn test_parse_resource_summary() {
        let out = "0: mlx5_0: pd 4 cq 12 qp 3 cm_id 0 mr 7 ctx 2 srq 0\n";
        let summary = parse_resource_summary(out).unwrap();
        assert_eq!(summary.device, "mlx5_0");
        assert_eq!(summary.qp, 3);
        assert_eq!(summary.mr, 7);
        assert!(parse_resource_summary("0: mlx5_0: pd 4 cq 12 qp 3\n").is_none());
    }

    #[test]
    fn test_parse_hex_register() {
        assert_eq!(parse_hex_register("2930\n").unwrap(), 0x2930);
        assert_eq!(parse_hex_register("0x5930").unwrap(), 0x5930);
        assert!(parse_hex_register("zz").is_err());
    }
}
