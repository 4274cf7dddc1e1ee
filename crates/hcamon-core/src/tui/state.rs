//! Dashboard state.

use crate::model::{Cycle, DeviceSnapshot, LinkLayer, RateRecord};
use crate::profile::LinkProfile;
use crate::rates::RateComputer;

/// Devices of one link layer, rendered as one table.
pub struct DeviceGroup<'a> {
    pub profile: &'static LinkProfile,
    pub snapshots: Vec<&'a DeviceSnapshot>,
}

/// Mutable state of the dashboard between frames.
pub struct AppState {
    pub paused: bool,
    /// Index into the flattened device list across all groups.
    pub selected: usize,
    pub current: Option<Cycle>,
    /// Rates derived for `current`.
    pub rates: Vec<RateRecord>,
    pub last_error: Option<String>,
    rate_computer: RateComputer,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            paused: false,
            selected: 0,
            current: None,
            rates: Vec::new(),
            last_error: None,
            rate_computer: RateComputer::new(),
        }
    }

    /// Installs a new cycle and derives its rates against the previous one.
    pub fn apply_cycle(&mut self, cycle: Cycle) {
        self.rates = self.rate_computer.update(&cycle.snapshots);
        self.current = Some(cycle);
        self.last_error = None;
        let count = self.device_count();
        if count == 0 {
            self.selected = 0;
        } else if self.selected >= count {
            self.selected = count - 1;
        }
    }

    pub fn device_count(&self) -> usize {
        self.current.as_ref().map_or(0, |c| c.snapshots.len())
    }

    pub fn select_next(&mut self) {
        if self.selected + 1 < self.device_count() {
            self.selected += 1;
        }
    }

    pub fn select_prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn toggle_pause(&mut self) {
        self.paused = !self.paused;
    }

    /// Devices grouped by link layer: Ethernet, then InfiniBand, then unknown.
    ///
    /// Flattening the groups in order gives the indexing used by `selected`.
    pub fn groups(&self) -> Vec<DeviceGroup<'_>> {
        let Some(cycle) = &self.current else {
            return Vec::new();
        };
        [LinkLayer::Ethernet, LinkLayer::InfiniBand, LinkLayer::Unknown]
            .into_iter()
            .filter_map(|link| {
                let snapshots: Vec<_> = cycle
                    .snapshots
                    .iter()
                    .filter(|s| s.device.link_layer == link)
                    .collect();
                (!snapshots.is_empty()).then(|| DeviceGroup {
                    profile: LinkProfile::for_link(link),
                    snapshots,
                })
            })
            .collect()
    }

    /// Link layers present in the current cycle.
    pub fn link_layers(&self) -> Vec<LinkLayer> {
        self.groups().iter().map(|g| g.profile.link_layer).collect()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
