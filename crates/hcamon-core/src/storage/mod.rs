//! Raw sample log and its size-triggered archival.

pub mod archive;
pub mod rawlog;

pub use archive::{ArchiveError, ArchiveManager, ArchiveResult, dir_size};
pub use rawlog::{RawLogWriter, format_line};
