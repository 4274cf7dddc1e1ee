//! Adapter counter collector for Linux.
//!
//! This module discovers RDMA adapters under sysfs and gathers their counters
//! from sysfs, debugfs and a handful of diagnostic tools, with support for
//! mocking both the filesystem and the tools in tests.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                            Collector                             │
//! │  ┌────────────┐  ┌────────────┐  ┌─────────────────────────────┐ │
//! │  │ Discoverer │  │ MRRS tune  │  │     TaskGroup (join)        │ │
//! │  │ ports/1/*  │  │  setpci    │  │ plain files │ QPs │ speed   │ │
//! │  └─────┬──────┘  └─────┬──────┘  │ rdma │ ethtool │ mlxlink   │ │
//! │        │               │         └──────┬───────────┬──────────┘ │
//! │  ┌─────▼──────┐        └────────────────┼───────┐   │            │
//! │  │ FileSystem │◄────────────────────────┘ ┌─────▼───▼─────┐      │
//! │  │  (trait)   │                           │ CommandRunner │      │
//! │  └─────┬──────┘                           │    (trait)    │      │
//! └────────┼──────────────────────────────────┴───────┬───────┴──────┘
//!          │                                          │
//!   ┌──────▼──────┐ ┌─────────────┐          ┌────────▼─────────┐
//!   │ RealFs      │ │ MockFs      │          │ RealRunner       │
//!   │ (Linux)     │ │ (Testing)   │          │ MockRunner       │
//!   └─────────────┘ └─────────────┘          └──────────────────┘
//! ```
//!
//! # Usage
//!
//! ## Production (Linux)
//!
//! ```ignore
//! use std::sync::Arc;
//! use hcamon_core::collector::{Collector, RealFs, RealRunner};
//! use hcamon_core::config::CollectorConfig;
//!
//! let mut collector = Collector::new(RealFs::new(), Arc::new(RealRunner::new()), CollectorConfig::default());
//! let cycle = collector.collect_cycle().unwrap();
//! ```
//!
//! ## Testing (with MockFs)
//!
//! ```
//! use std::sync::Arc;
//! use hcamon_core::collector::{Collector, MockFs, MockRunner};
//! use hcamon_core::collector::mock::scenarios::{DEBUGFS_ROOT, SYSFS_ROOT};
//! use hcamon_core::config::CollectorConfig;
//!
//! let config = CollectorConfig {
//!     sysfs_root: SYSFS_ROOT.into(),
//!     debugfs_root: DEBUGFS_ROOT.into(),
//!     ..CollectorConfig::default()
//! };
//! let mut collector = Collector::new(MockFs::roce_host(), Arc::new(MockRunner::roce_host()), config);
//! let cycle = collector.collect_cycle().unwrap();
//! assert_eq!(cycle.snapshots.len(), 2);
//! ```

#[allow(clippy::module_inception)]
mod collector;
pub mod discovery;
mod exec;
pub mod mock;
pub mod parser;
pub mod pcie;
pub mod sysfs;
pub mod tools;
pub mod traits;

pub use collector::{CollectError, Collector, CollectorTiming};
pub use discovery::Discoverer;
pub use exec::RealRunner;
pub use mock::{MockFs, MockRunner};
pub use traits::{CommandRunner, CounterSource, FileSystem, RealFs};
