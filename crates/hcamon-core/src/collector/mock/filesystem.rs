//! In-memory mock filesystem for testing collectors without adapters.
//!
//! Simulates the sysfs and debugfs trees a host with mlx5 adapters exposes,
//! so tests run in CI without hardware.

use crate::collector::traits::FileSystem;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

/// In-memory filesystem for testing.
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    /// Map from path to file contents.
    files: HashMap<PathBuf, String>,
    /// Set of directories (for read_dir support).
    directories: HashSet<PathBuf>,
}

impl MockFs {
    /// Creates a new empty mock filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    fn add_parents(&mut self, path: &Path) {
        let mut parent = path.parent();
        while let Some(p) = parent {
            if !p.as_os_str().is_empty() {
                self.directories.insert(p.to_path_buf());
            }
            parent = p.parent();
        }
    }

    /// Adds a file with the given content.
    ///
    /// Parent directories are automatically created.
    pub fn add_file(&mut self, path: impl AsRef<Path>, content: impl Into<String>) {
        let path = path.as_ref().to_path_buf();
        self.add_parents(&path);
        self.files.insert(path, content.into());
    }

    /// Adds an empty directory.
    pub fn add_dir(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        self.add_parents(&path);
        self.directories.insert(path);
    }

    /// Removes a file, simulating a counter that disappeared mid-cycle.
    pub fn remove_file(&mut self, path: impl AsRef<Path>) {
        self.files.remove(path.as_ref());
    }

    /// Adds an adapter under `root` with its port, link layer and counters.
    ///
    /// # Arguments
    /// * `root` - Adapter class directory (usually `/sys/class/infiniband`)
    /// * `name` - Adapter name, e.g. `mlx5_0`
    /// * `state` - Content of `ports/1/state`
    /// * `link_layer` - Content of `ports/1/link_layer`
    /// * `counters` - `(name, value)` pairs written to `ports/1/counters`
    /// * `hw_counters` - `(name, value)` pairs written to `ports/1/hw_counters`
    pub fn add_adapter(
        &mut self,
        root: &Path,
        name: &str,
        state: &str,
        link_layer: &str,
        counters: &[(&str, u64)],
        hw_counters: &[(&str, u64)],
    ) {
        let base = root.join(name);
        let port = base.join("ports/1");
        self.add_file(port.join("state"), state);
        self.add_file(port.join("link_layer"), link_layer);
        self.add_dir(port.join("counters"));
        self.add_dir(port.join("hw_counters"));
        for (counter, value) in counters {
            self.add_file(port.join("counters").join(counter), format!("{}\n", value));
        }
        for (counter, value) in hw_counters {
            self.add_file(
                port.join("hw_counters").join(counter),
                format!("{}\n", value),
            );
        }
    }
}

impl FileSystem for MockFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.files.get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("file not found: {:?}", path),
            )
        })
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path) || self.directories.contains(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.directories.contains(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        if !self.directories.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("directory not found: {:?}", path),
            ));
        }

        let mut entries = HashSet::new();

        for file_path in self.files.keys() {
            if file_path.parent().is_some_and(|parent| parent == path) {
                entries.insert(file_path.clone());
            }
        }

        for dir_path in &self.directories {
            if dir_path.parent().is_some_and(|parent| parent == path) && dir_path != path {
                entries.insert(dir_path.clone());
            }
        }

        Ok(entries.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_fs_add_file() {
        let mut fs = MockFs::new();
        fs.add_file("/sys/class/infiniband/mlx5_0/ports/1/state", "4: ACTIVE\n");

        assert!(fs.exists(Path::new("/sys/class/infiniband/mlx5_0/ports/1/state")));
        assert!(fs.is_dir(Path::new("/sys/class/infiniband/mlx5_0")));

        let content = fs
            .read_to_string(Path::new("/sys/class/infiniband/mlx5_0/ports/1/state"))
            .unwrap();
        assert_eq!(content, "4: ACTIVE\n");
    }

    #[test]
    fn test_mock_fs_read_dir() {
        let mut fs = MockFs::new();
        fs.add_file("/ib/mlx5_0/ports/1/state", "ACTIVE");
        fs.add_file("/ib/mlx5_0/ports/1/rate", "200 Gb/sec");
        fs.add_dir("/ib/mlx5_1");

        let entries = fs.read_dir(Path::new("/ib")).unwrap();
        assert_eq!(entries.len(), 2);

        let port = fs.read_dir(Path::new("/ib/mlx5_0/ports/1")).unwrap();
        assert_eq!(port.len(), 2);
    }

    #[test]
    fn test_mock_fs_missing() {
        let fs = MockFs::new();
        assert!(fs.read_to_string(Path::new("/nope")).is_err());
        assert!(fs.read_dir(Path::new("/nope")).is_err());
    }

    #[test]
    fn test_add_adapter() {
        let mut fs = MockFs::new();
        let root = Path::new("/sys/class/infiniband");
        fs.add_adapter(
            root,
            "mlx5_0",
            "4: ACTIVE",
            "Ethernet",
            &[("port_rcv_data", 10)],
            &[("out_of_sequence", 1)],
        );
        let counters = fs
            .read_dir(&root.join("mlx5_0/ports/1/counters"))
            .unwrap();
        assert_eq!(counters.len(), 1);
        assert_eq!(
            fs.read_to_string(&root.join("mlx5_0/ports/1/hw_counters/out_of_sequence"))
                .unwrap(),
            "1\n"
        );
    }
}
