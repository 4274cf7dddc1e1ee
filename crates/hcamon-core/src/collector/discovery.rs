//! Adapter discovery and classification.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::collector::parser::{is_port_active, parse_uevent_slot};
use crate::collector::traits::FileSystem;
use crate::model::{Device, LinkLayer};

/// Enumerates active adapters under the adapter class directory.
pub struct Discoverer<F: FileSystem> {
    fs: F,
    root: PathBuf,
    exclude: Vec<String>,
}

impl<F: FileSystem> Discoverer<F> {
    /// Creates a discoverer.
    ///
    /// # Arguments
    /// * `fs` - Filesystem implementation (real or mock)
    /// * `root` - Adapter class directory (usually `/sys/class/infiniband`)
    /// * `exclude` - Name markers of mezzanine and virtual-function adapters to skip
    pub fn new(fs: F, root: impl Into<PathBuf>, exclude: Vec<String>) -> Self {
        Self {
            fs,
            root: root.into(),
            exclude,
        }
    }

    fn port_file(&self, name: &str, file: &str) -> PathBuf {
        self.root.join(name).join("ports/1").join(file)
    }

    fn is_excluded(&self, name: &str) -> bool {
        self.exclude.iter().any(|marker| name.contains(marker.as_str()))
    }

    /// Lists active, non-excluded adapter names in sorted order.
    ///
    /// An unreadable port state file marks that adapter inactive. Failing to
    /// list the class directory itself is returned to the caller.
    pub fn discover(&self) -> std::io::Result<Vec<String>> {
        let mut names: Vec<String> = self
            .fs
            .read_dir(&self.root)?
            .iter()
            .filter_map(|p| p.file_name()?.to_str().map(str::to_string))
            .filter(|name| !self.is_excluded(name))
            .filter(|name| match self.fs.read_to_string(&self.port_file(name, "state")) {
                Ok(state) => {
                    let active = is_port_active(&state);
                    debug!("{}: port state {}", name, state.trim());
                    active
                }
                Err(e) => {
                    warn!("{}: cannot read port state: {}", name, e);
                    false
                }
            })
            .collect();
        names.sort();
        Ok(names)
    }

    /// Reads the link layer; a missing file yields `Unknown`.
    pub fn link_layer(&self, name: &str) -> LinkLayer {
        match self.fs.read_to_string(&self.port_file(name, "link_layer")) {
            Ok(content) => LinkLayer::from_sysfs(&content),
            Err(e) => {
                debug!("{}: no link layer: {}", name, e);
                LinkLayer::Unknown
            }
        }
    }

    /// Physical functions expose `device/sriov_numvfs`.
    pub fn is_physical(&self, name: &str) -> bool {
        self.fs
            .exists(&self.root.join(name).join("device/sriov_numvfs"))
    }

    /// Name of the first network interface under `device/net`.
    pub fn net_dev(&self, name: &str) -> Option<String> {
        let mut entries = self
            .fs
            .read_dir(&self.root.join(name).join("device/net"))
            .ok()?;
        entries.sort();
        if entries.len() > 1 {
            warn!("{}: {} network interfaces, using the first", name, entries.len());
        }
        entries
            .first()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .map(str::to_string)
    }

    /// PCI bus-device-function address from `device/uevent`.
    pub fn pci_slot(&self, name: &str) -> Option<String> {
        let uevent = self
            .fs
            .read_to_string(&self.root.join(name).join("device/uevent"))
            .ok()?;
        parse_uevent_slot(&uevent)
    }

    /// Resolves every attribute of one adapter.
    pub fn describe(&self, name: &str) -> Device {
        Device {
            name: name.to_string(),
            net_dev: self.net_dev(name),
            link_layer: self.link_layer(name),
            physical: self.is_physical(name),
            pci_slot: self.pci_slot(name),
        }
    }

    /// Discovers and describes all active adapters.
    pub fn devices(&self) -> std::io::Result<Vec<Device>> {
        Ok(self
            .discover()?
            .iter()
            .map(|name| self.describe(name))
            .collect())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
