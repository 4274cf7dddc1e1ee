//! Size-triggered archival of raw log files.
//!
//! When the data directory grows past a threshold, every `*.log` file directly
//! under it is packed into one `<prefix>_<YYYYMMDD_HHMMSS>.zip` in the archive
//! directory and removed. Only the newest archives are kept.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;
use thiserror::Error;
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Archive name prefix.
pub const DEFAULT_PREFIX: &str = "ibtestdata";
/// Number of archives kept after rotation.
pub const DEFAULT_KEEP: usize = 5;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("cannot scan {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot create archive {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot write {entry} into archive {path}: {source}")]
    Write {
        path: PathBuf,
        entry: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot finalize archive {path}: {source}")]
    Finish {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
}

/// Result of a rotation pass.
#[derive(Debug, Default)]
pub struct ArchiveResult {
    /// Size of the data directory before rotation.
    pub total_size: u64,
    /// The new archive, if the threshold was reached.
    pub archive: Option<PathBuf>,
    /// Log files packed and removed.
    pub files_archived: usize,
    /// Log files that could not be packed and were left in place.
    pub files_skipped: usize,
    /// Uncompressed bytes packed.
    pub bytes_archived: u64,
    /// Old archives deleted by retention.
    pub archives_removed: usize,
}

impl ArchiveResult {
    pub fn rotated(&self) -> bool {
        self.archive.is_some()
    }
}

/// Total size of all regular files under `path`, recursively.
pub fn dir_size(path: &Path) -> io::Result<u64> {
    let mut total = 0;
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if meta.is_dir() {
            total += dir_size(&entry.path())?;
        } else {
            total += meta.len();
        }
    }
    Ok(total)
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension().is_some_and(|e| e == ext)
}

/// Owns the data and archive directories during rotation.
pub struct ArchiveManager {
    data_dir: PathBuf,
    archive_dir: PathBuf,
    prefix: String,
    keep: usize,
    lock: Mutex<()>,
}

impl ArchiveManager {
    pub fn new(data_dir: impl Into<PathBuf>, archive_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            archive_dir: archive_dir.into(),
            prefix: DEFAULT_PREFIX.to_string(),
            keep: DEFAULT_KEEP,
            lock: Mutex::new(()),
        }
    }

    /// Archives next to the data directory, i.e. in its parent.
    pub fn for_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        let archive_dir = data_dir
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| data_dir.clone());
        Self::new(data_dir, archive_dir)
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_keep(mut self, keep: usize) -> Self {
        self.keep = keep;
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    /// Archives the data directory once it reaches `threshold` bytes.
    ///
    /// Concurrent calls on the same manager are serialized. A log file that
    /// cannot be opened is left in place and does not abort the pass. A write
    /// failure abandons the archive and keeps every log file.
    pub fn rotate(&self, threshold: u64) -> Result<ArchiveResult, ArchiveError> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut result = ArchiveResult::default();

        let scan_err = |source| ArchiveError::Scan {
            path: self.data_dir.clone(),
            source,
        };
        result.total_size = dir_size(&self.data_dir).map_err(scan_err)?;
        if result.total_size < threshold {
            debug!(
                "{} holds {} bytes, under the {} byte threshold",
                self.data_dir.display(),
                result.total_size,
                threshold
            );
            return Ok(result);
        }
        info!(
            "{} holds {} bytes, archiving",
            self.data_dir.display(),
            result.total_size
        );

        let logs = self.log_files().map_err(scan_err)?;

        fs::create_dir_all(&self.archive_dir).map_err(|source| ArchiveError::Create {
            path: self.archive_dir.clone(),
            source,
        })?;
        let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let archive_path = self.archive_path(&stamp);
        let sources = logs.into_iter().map(|path| {
            let file = File::open(&path);
            (path, file)
        });
        let packed = pack(&archive_path, sources, &mut result)?;

        for path in packed {
            match fs::remove_file(&path) {
                Ok(()) => result.files_archived += 1,
                Err(e) => warn!("archived {} but cannot remove it: {}", path.display(), e),
            }
        }
        info!(
            "created {} with {} files",
            archive_path.display(),
            result.files_archived
        );
        result.archive = Some(archive_path);

        result.archives_removed = self.apply_retention();
        Ok(result)
    }

    /// `*.log` files directly under the data directory, sorted by name.
    fn log_files(&self) -> io::Result<Vec<PathBuf>> {
        let mut logs = Vec::new();
        for entry in fs::read_dir(&self.data_dir)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_file() && has_extension(&path, "log") {
                logs.push(path);
            }
        }
        logs.sort();
        Ok(logs)
    }

    /// Archive path for `stamp`, with `_<n>` appended if the name is taken.
    pub fn archive_path(&self, stamp: &str) -> PathBuf {
        let base = format!("{}_{}", self.prefix, stamp);
        let mut path = self.archive_dir.join(format!("{}.zip", base));
        let mut n = 1;
        while path.exists() {
            path = self.archive_dir.join(format!("{}_{}.zip", base, n));
            n += 1;
        }
        path
    }

    /// Archives created by this manager, oldest first.
    pub fn archives(&self) -> io::Result<Vec<PathBuf>> {
        let marker = format!("{}_", self.prefix);
        let mut archives = Vec::new();
        for entry in fs::read_dir(&self.archive_dir)? {
            let path = entry?.path();
            let matches = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&marker));
            if matches && has_extension(&path, "zip") {
                archives.push(path);
            }
        }
        archives.sort_by_cached_key(|p| archive_order_key(p, &marker));
        Ok(archives)
    }

    /// Deletes all but the newest `keep` archives. Returns how many were removed.
    fn apply_retention(&self) -> usize {
        let archives = match self.archives() {
            Ok(archives) => archives,
            Err(e) => {
                warn!("cannot list archives in {}: {}", self.archive_dir.display(), e);
                return 0;
            }
        };
        if archives.len() <= self.keep {
            return 0;
        }
        let excess = archives.len() - self.keep;
        let mut removed = 0;
        for old in &archives[..excess] {
            info!("deleting old archive {}", old.display());
            match fs::remove_file(old) {
                Ok(()) => removed += 1,
                Err(e) => warn!("cannot delete {}: {}", old.display(), e),
            }
        }
        removed
    }
}

/// Sort key of an archive: its `YYYYMMDD_HHMMSS` stamp, then the numeric
/// same-second suffix, so `_10` orders after `_9`.
fn archive_order_key(path: &Path, marker: &str) -> (String, u32) {
    let rest = path
        .file_stem()
        .and_then(|n| n.to_str())
        .and_then(|n| n.strip_prefix(marker))
        .unwrap_or_default();
    let mut parts = rest.splitn(3, '_');
    let stamp = match (parts.next(), parts.next()) {
        (Some(date), Some(time)) => format!("{}_{}", date, time),
        (Some(other), None) => other.to_string(),
        _ => String::new(),
    };
    let suffix = parts.next().and_then(|n| n.parse().ok()).unwrap_or(0);
    (stamp, suffix)
}

/// Writes every readable source into a new archive at `path`.
///
/// Sources that failed to open are skipped. Once an entry has been started,
/// any error removes the unfinished archive, so no truncated entry survives.
/// Returns the paths that were packed.
fn pack<R: Read>(
    path: &Path,
    sources: impl IntoIterator<Item = (PathBuf, io::Result<R>)>,
    result: &mut ArchiveResult,
) -> Result<Vec<PathBuf>, ArchiveError> {
    let file = File::create(path).map_err(|source| ArchiveError::Create {
        path: path.to_path_buf(),
        source,
    })?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut packed = Vec::new();
    for (entry, source) in sources {
        let mut src = match source {
            Ok(src) => src,
            Err(e) => {
                warn!("skipping {}: {}", entry.display(), e);
                result.files_skipped += 1;
                continue;
            }
        };
        match add_entry(&mut zip, &entry, &mut src, options) {
            Ok(bytes) => {
                debug!("archived {} ({} bytes)", entry.display(), bytes);
                result.bytes_archived += bytes;
                packed.push(entry);
            }
            Err(source) => {
                drop(zip);
                discard(path);
                return Err(ArchiveError::Write {
                    path: path.to_path_buf(),
                    entry,
                    source,
                });
            }
        }
    }

    if let Err(source) = zip.finish() {
        discard(path);
        return Err(ArchiveError::Finish {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(packed)
}

fn add_entry<R: Read>(
    zip: &mut ZipWriter<File>,
    path: &Path,
    src: &mut R,
    options: SimpleFileOptions,
) -> io::Result<u64> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "non UTF-8 file name"))?;
    zip.start_file(name, options).map_err(io::Error::other)?;
    io::copy(src, zip)
}

fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!("cannot remove unfinished archive {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, PathBuf) {
        let dir = tempdir().unwrap();
        let data = dir.path().join("ibtestdata");
        fs::create_dir_all(&data).unwrap();
        (dir, data)
    }

    #[test]
    fn test_under_threshold_is_noop() {
        let (dir, data) = setup();
        fs::write(data.join("data_1.log"), vec![b'a'; 100]).unwrap();

        let manager = ArchiveManager::for_data_dir(&data);
        assert_eq!(manager.archive_dir(), dir.path());
        let result = manager.rotate(1_000).unwrap();

        assert!(!result.rotated());
        assert_eq!(result.total_size, 100);
        assert!(data.join("data_1.log").exists());
        assert!(manager.archives().unwrap().is_empty());
    }

    #[test]
    fn test_rotation_packs_and_removes_logs() {
        let (_dir, data) = setup();
        fs::write(data.join("data_1.log"), vec![b'a'; 600]).unwrap();
        fs::write(data.join("data_2.log"), vec![b'b'; 600]).unwrap();
        fs::write(data.join("notes.txt"), b"keep me").unwrap();
        fs::create_dir_all(data.join("nested")).unwrap();
        fs::write(data.join("nested/old.log"), vec![b'c'; 10]).unwrap();

        let manager = ArchiveManager::for_data_dir(&data);
        let result = manager.rotate(1_000).unwrap();

        assert!(result.rotated());
        assert_eq!(result.total_size, 1_217);
        assert_eq!(result.files_archived, 2);
        assert_eq!(result.bytes_archived, 1_200);
        assert!(!data.join("data_1.log").exists());
        assert!(!data.join("data_2.log").exists());
        assert!(data.join("notes.txt").exists());
        assert!(data.join("nested/old.log").exists());

        let archive = result.archive.unwrap();
        let name = archive.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("ibtestdata_") && name.ends_with(".zip"));

        let zip = zip::ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        let mut names: Vec<_> = zip.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(names, vec!["data_1.log", "data_2.log"]);
    }

    #[test]
    fn test_retention_keeps_newest() {
        let (dir, data) = setup();
        for day in 1..=6 {
            fs::write(dir.path().join(format!("ibtestdata_2020010{}_000000.zip", day)), b"z").unwrap();
        }
        fs::write(dir.path().join("other_20200101_000000.zip"), b"z").unwrap();
        fs::write(data.join("data_1.log"), vec![b'a'; 64]).unwrap();

        let manager = ArchiveManager::for_data_dir(&data);
        let result = manager.rotate(10).unwrap();

        assert_eq!(result.archives_removed, 2);
        let archives = manager.archives().unwrap();
        assert_eq!(archives.len(), DEFAULT_KEEP);
        assert!(!dir.path().join("ibtestdata_20200101_000000.zip").exists());
        assert!(!dir.path().join("ibtestdata_20200102_000000.zip").exists());
        assert_eq!(archives.last(), result.archive.as_ref());
        assert!(dir.path().join("other_20200101_000000.zip").exists());
    }

    #[test]
    fn test_same_second_name_gets_suffix() {
        let (dir, data) = setup();
        let manager = ArchiveManager::for_data_dir(&data);
        let first = manager.archive_path("20260101_120000");
        assert_eq!(first, dir.path().join("ibtestdata_20260101_120000.zip"));
        fs::write(&first, b"z").unwrap();

        let second = manager.archive_path("20260101_120000");
        assert_eq!(second, dir.path().join("ibtestdata_20260101_120000_1.zip"));
        fs::write(&second, b"z").unwrap();

        // suffixed names still sort after the base name
        let archives = manager.archives().unwrap();
        assert_eq!(archives, vec![first, second]);
    }

    #[test]
    fn test_many_same_second_archives_order_numerically() {
        let (dir, data) = setup();
        let manager = ArchiveManager::for_data_dir(&data).with_keep(3);
        for _ in 0..12 {
            let path = manager.archive_path("20260101_120000");
            fs::write(&path, b"z").unwrap();
        }
        fs::write(dir.path().join("ibtestdata_20260101_120001.zip"), b"z").unwrap();

        let archives = manager.archives().unwrap();
        let names: Vec<_> = archives
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names[0], "ibtestdata_20260101_120000.zip");
        assert_eq!(names[1], "ibtestdata_20260101_120000_1.zip");
        assert_eq!(names[10], "ibtestdata_20260101_120000_10.zip");
        assert_eq!(names[11], "ibtestdata_20260101_120000_11.zip");
        assert_eq!(names[12], "ibtestdata_20260101_120001.zip");

        assert_eq!(manager.apply_retention(), 10);
        assert!(dir.path().join("ibtestdata_20260101_120000_10.zip").exists());
        assert!(dir.path().join("ibtestdata_20260101_120000_11.zip").exists());
        assert!(!dir.path().join("ibtestdata_20260101_120000_9.zip").exists());
        assert!(!dir.path().join("ibtestdata_20260101_120000_2.zip").exists());
    }

    /// Yields `limit` bytes, then fails.
    struct BrokenReader {
        limit: usize,
    }

    impl Read for BrokenReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.limit == 0 {
                return Err(io::Error::other("device went away"));
            }
            let n = buf.len().min(self.limit);
            buf[..n].fill(b'x');
            self.limit -= n;
            Ok(n)
        }
    }

    #[test]
    fn test_write_failure_discards_archive() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ibtestdata_20260101_120000.zip");
        let sources = vec![
            (PathBuf::from("data_1.log"), Ok(BrokenReader { limit: 4096 })),
            (PathBuf::from("data_2.log"), Ok(BrokenReader { limit: 16 })),
        ];
        let mut result = ArchiveResult::default();

        let err = pack(&path, sources, &mut result).unwrap_err();
        match err {
            ArchiveError::Write { entry, .. } => assert_eq!(entry, PathBuf::from("data_1.log")),
            other => panic!("unexpected error: {}", other),
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_unopenable_source_is_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ibtestdata_20260101_120000.zip");
        let sources: Vec<(PathBuf, io::Result<&[u8]>)> = vec![
            (PathBuf::from("gone.log"), Err(io::Error::from(io::ErrorKind::NotFound))),
            (PathBuf::from("data_1.log"), Ok(&b"1700000000,mlx5_0\n"[..])),
        ];
        let mut result = ArchiveResult::default();

        let packed = pack(&path, sources, &mut result).unwrap();
        assert_eq!(packed, vec![PathBuf::from("data_1.log")]);
        assert_eq!(result.files_skipped, 1);

        let zip = zip::ZipArchive::new(File::open(&path).unwrap()).unwrap();
        assert_eq!(zip.file_names().collect::<Vec<_>>(), vec!["data_1.log"]);
    }

    #[test]
    fn test_missing_data_dir_is_error() {
        let dir = tempdir().unwrap();
        let manager = ArchiveManager::new(dir.path().join("absent"), dir.path());
        assert!(matches!(manager.rotate(0), Err(ArchiveError::Scan { .. })));
    }

    #[test]
    fn test_dir_size_recurses() {
        let (_dir, data) = setup();
        fs::write(data.join("a"), vec![0u8; 5]).unwrap();
        fs::create_dir_all(data.join("sub")).unwrap();
        fs::write(data.join("sub/b"), vec![0u8; 7]).unwrap();
        assert_eq!(dir_size(&data).unwrap(), 12);
    }
}
