//! hcamon-core — shared library for the hcamon tools.
//!
//! Provides:
//! - `collector` — adapter discovery and counter collection (sysfs, debugfs, external tools)
//! - `model` — devices, counter samples, per-device snapshots, rate records
//! - `profile` — per-link-layer counter selection and rate rules
//! - `aggregate` — merging collector output into one snapshot per device
//! - `rates` — throughput/delta derivation between successive snapshots
//! - `storage` — raw sample log and size-triggered zip archival
//! - `metrics` — exposition registry for the pull endpoint
//! - `config` — collector paths and knobs
//! - `fmt` — shared formatting helpers
//! - `util` — task group for parallel collection
//!
//! With `tui` feature (default):
//! - `tui` — live dashboard (ratatui/crossterm)

pub mod aggregate;
pub mod collector;
pub mod config;
pub mod fmt;
pub mod metrics;
pub mod model;
pub mod profile;
pub mod provider;
pub mod rates;
pub mod storage;
pub mod util;

#[cfg(feature = "tui")]
pub mod tui;

/// Crate version with the git revision it was built from.
pub const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("HCAMON_GIT_SHA"),
    ")"
);
