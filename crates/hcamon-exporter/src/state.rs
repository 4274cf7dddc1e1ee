//! Shared exporter state: the cycle provider, the scrape-to-scrape rate
//! history and the metrics registry.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::{Level, debug, trace};

use hcamon_core::metrics::{COUNTER_METRIC, MetricsError, MetricsRegistry, format_exposition_line};
use hcamon_core::model::{DeviceSnapshot, RateRecord};
use hcamon_core::provider::CycleProvider;
use hcamon_core::rates::RateComputer;

#[derive(Debug, Error)]
pub(crate) enum ScrapeError {
    #[error("{0}")]
    Collection(String),
    #[error("metrics encoding failed: {0}")]
    Metrics(#[from] MetricsError),
}

/// Last published cycle, as served by `/api/snapshot`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct SnapshotView {
    pub(crate) timestamp_ns: i64,
    pub(crate) snapshots: Vec<DeviceSnapshot>,
    pub(crate) rates: Vec<RateRecord>,
}

struct ScrapeInner {
    provider: Box<dyn CycleProvider + Send>,
    rates: RateComputer,
    last: Option<Arc<SnapshotView>>,
    scrapes: u64,
}

pub(crate) struct ExporterState {
    // one cycle at a time; the rate history swap and the render both happen under this lock
    inner: Mutex<ScrapeInner>,
    registry: MetricsRegistry,
}

pub(crate) type SharedState = Arc<ExporterState>;

impl ExporterState {
    pub(crate) fn new(provider: Box<dyn CycleProvider + Send>) -> Result<Self, MetricsError> {
        Ok(Self {
            inner: Mutex::new(ScrapeInner {
                provider,
                rates: RateComputer::new(),
                last: None,
                scrapes: 0,
            }),
            registry: MetricsRegistry::new()?,
        })
    }

    /// Runs one collection cycle and returns the refreshed exposition.
    ///
    /// Blocks for as long as the cycle takes.
    pub(crate) fn scrape(&self) -> Result<String, ScrapeError> {
        let mut inner = self.inner.lock();

        let cycle = match inner.provider.advance() {
            Some(cycle) => cycle.clone(),
            None => {
                let message = inner
                    .provider
                    .last_error()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "collection failed".to_string());
                return Err(ScrapeError::Collection(message));
            }
        };

        let records = inner.rates.update(&cycle.snapshots);
        self.registry.replace(&cycle.snapshots, &records);

        inner.scrapes += 1;
        debug!(
            scrape = inner.scrapes,
            devices = cycle.snapshots.len(),
            samples = cycle.sample_count(),
            "scrape collected"
        );
        if tracing::enabled!(Level::TRACE) {
            for sample in cycle.snapshots.iter().flat_map(|s| s.counters.values()) {
                trace!("{}", format_exposition_line(COUNTER_METRIC, sample));
            }
        }

        inner.last = Some(Arc::new(SnapshotView {
            timestamp_ns: cycle.timestamp_ns,
            snapshots: cycle.snapshots,
            rates: records,
        }));

        // rendered under the lock so a concurrent replace() cannot empty the page
        let body = self.registry.render()?;
        drop(inner);
        Ok(body)
    }

    pub(crate) fn last(&self) -> Option<Arc<SnapshotView>> {
        self.inner.lock().last.clone()
    }

    pub(crate) fn content_type(&self) -> String {
        self.registry.content_type()
    }
}
