//! Provider abstraction for cycle data sources.
//!
//! The dashboard pulls cycles through `CycleProvider`, so it runs the same
//! way against live hardware and against mocked hosts.

use thiserror::Error;

use crate::collector::traits::{CommandRunner, FileSystem};
use crate::collector::{Collector, CollectorTiming};
use crate::model::Cycle;

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Error during data collection.
    #[error("Collection error: {0}")]
    Collection(String),
}

/// Abstraction for cycle data sources.
///
/// The trait is object-safe and designed to be used with `Box<dyn CycleProvider>`.
pub trait CycleProvider {
    /// Returns the current cycle, if available.
    fn current(&self) -> Option<&Cycle>;

    /// Runs the next cycle.
    ///
    /// Returns `None` if collection failed (check `last_error()` for details).
    /// The previous cycle stays available through `current()`.
    fn advance(&mut self) -> Option<&Cycle>;

    /// Returns the last error that occurred, if any.
    fn last_error(&self) -> Option<&ProviderError>;

    /// Returns timing information from the last collection.
    fn collector_timing(&self) -> Option<&CollectorTiming> {
        None
    }
}

/// Provider for real-time collection.
pub struct LiveProvider<F: FileSystem + Clone + 'static, R: CommandRunner + 'static> {
    collector: Collector<F, R>,
    current: Option<Cycle>,
    last_error: Option<ProviderError>,
}

impl<F: FileSystem + Clone + 'static, R: CommandRunner + 'static> LiveProvider<F, R> {
    pub fn new(collector: Collector<F, R>) -> Self {
        Self {
            collector,
            current: None,
            last_error: None,
        }
    }
}

impl<F: FileSystem + Clone + 'static, R: CommandRunner + 'static> CycleProvider
    for LiveProvider<F, R>
{
    fn current(&self) -> Option<&Cycle> {
        self.current.as_ref()
    }

    fn advance(&mut self) -> Option<&Cycle> {
        self.last_error = None;

        match self.collector.collect_cycle() {
            Ok(cycle) => {
                self.current = Some(cycle);
                self.current.as_ref()
            }
            Err(e) => {
                self.last_error = Some(ProviderError::Collection(e.to_string()));
                None
            }
        }
    }

    fn last_error(&self) -> Option<&ProviderError> {
        self.last_error.as_ref()
    }

    fn collector_timing(&self) -> Option<&CollectorTiming> {
        self.collector.last_timing()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::scenarios::{DEBUGFS_ROOT, SYSFS_ROOT};
    use crate::collector::mock::{MockFs, MockRunner};
    use crate::config::CollectorConfig;
    use std::sync::Arc;

    fn config() -> CollectorConfig {
        CollectorConfig {
            sysfs_root: SYSFS_ROOT.into(),
            debugfs_root: DEBUGFS_ROOT.into(),
            ..CollectorConfig::default()
        }
    }

    #[test]
    fn test_live_provider_advance() {
        let collector = Collector::new(
            MockFs::infiniband_host(),
            Arc::new(MockRunner::infiniband_host()),
            config(),
        );
        let mut provider = LiveProvider::new(collector);

        assert!(provider.current().is_none());
        let cycle = provider.advance().unwrap();
        assert_eq!(cycle.snapshots.len(), 2);
        assert!(provider.current().is_some());
        assert!(provider.last_error().is_none());
        assert!(provider.collector_timing().is_some());
    }

    #[test]
    fn test_live_provider_error() {
        let collector = Collector::new(MockFs::new(), Arc::new(MockRunner::new()), config());
        let mut provider = LiveProvider::new(collector);

        assert!(provider.advance().is_none());
        assert!(matches!(
            provider.last_error(),
            Some(ProviderError::Collection(_))
        ));
    }
}
