//! Shared formatting helpers.

use chrono::{Local, TimeZone};

pub const KB: u64 = 1024;
pub const MB: u64 = 1024 * 1024;
pub const GB: u64 = 1024 * 1024 * 1024;

/// Parses a size like `5M`, `512K` or `1G`.
///
/// A bare number is multiplied by `bare_unit`, so `parse_size("5", MB)`
/// is five megabytes.
pub fn parse_size(s: &str, bare_unit: u64) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty size string".to_string());
    }

    let (num_str, multiplier) = if let Some(num) = s.strip_suffix('G') {
        (num, GB)
    } else if let Some(num) = s.strip_suffix('M') {
        (num, MB)
    } else if let Some(num) = s.strip_suffix('K') {
        (num, KB)
    } else if let Some(num) = s.strip_suffix('B') {
        (num, 1)
    } else {
        (s, bare_unit)
    };

    num_str
        .trim()
        .parse::<u64>()
        .map_err(|e| format!("invalid size '{}': {}", s, e))?
        .checked_mul(multiplier)
        .ok_or_else(|| format!("size '{}' is too large", s))
}

/// Formats bytes as human-readable size string.
pub fn format_size(bytes: u64) -> String {
    if bytes >= GB {
        format!("{:.1}G", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1}M", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1}K", bytes as f64 / KB as f64)
    } else {
        format!("{}B", bytes)
    }
}

/// Local wall-clock `HH:MM:SS` of a nanosecond timestamp.
pub fn format_time(timestamp_ns: i64) -> String {
    Local
        .timestamp_nanos(timestamp_ns)
        .format("%H:%M:%S")
        .to_string()
}
