//! Merging collector output into one snapshot per device.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::model::{CounterSample, Device, DeviceSnapshot};

/// Snapshots of one cycle plus the keys that were written more than once.
#[derive(Debug, Default)]
pub struct Normalized {
    pub snapshots: Vec<DeviceSnapshot>,
    /// `(device, counter)` pairs produced by more than one sample.
    pub collisions: Vec<(String, String)>,
}

/// Groups `samples` by device, keyed by counter name.
///
/// Every device gets a snapshot stamped with `timestamp_ns`, even if no
/// collector produced anything for it. A later sample for the same
/// `(device, counter)` replaces the earlier one. Collectors own disjoint
/// counter names, so collisions are reported rather than expected.
pub fn normalize(devices: &[Device], samples: Vec<CounterSample>, timestamp_ns: i64) -> Normalized {
    let mut by_device: BTreeMap<&str, DeviceSnapshot> = devices
        .iter()
        .map(|d| (d.name.as_str(), DeviceSnapshot::new(d.clone(), timestamp_ns)))
        .collect();
    let mut collisions = Vec::new();

    for sample in samples {
        let Some(snapshot) = by_device.get_mut(sample.device.as_str()) else {
            debug!("dropping sample {} for undiscovered device {}", sample.counter, sample.device);
            continue;
        };
        let key = sample.counter.clone();
        if let Some(previous) = snapshot.counters.insert(key, sample) {
            if cfg!(debug_assertions) {
                warn!(
                    "counter {} of {} produced twice in one cycle",
                    previous.counter, previous.device
                );
            }
            collisions.push((previous.device, previous.counter));
        }
    }

    Normalized {
        snapshots: by_device.into_values().collect(),
        collisions,
    }
}
