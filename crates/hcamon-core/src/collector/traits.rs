//! Abstractions over the filesystem and external processes.
//!
//! Collectors only talk to the host through `FileSystem` and `CommandRunner`,
//! so they run unchanged against sysfs on a real host and against
//! [`MockFs`](super::mock::MockFs) / [`MockRunner`](super::mock::MockRunner) in tests.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::model::{CounterSample, Device};

/// Abstraction for filesystem operations.
pub trait FileSystem: Send + Sync {
    /// Reads the entire contents of a file as a string.
    ///
    /// # Arguments
    /// * `path` - Path to the file to read
    ///
    /// # Returns
    /// The file contents as a string, or an I/O error if the file cannot be read.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Checks if a path exists.
    fn exists(&self, path: &Path) -> bool;

    /// Checks if a path is a directory.
    fn is_dir(&self, path: &Path) -> bool;

    /// Lists entries in a directory.
    ///
    /// # Returns
    /// A vector of paths to entries in the directory, or an I/O error.
    /// Order is unspecified.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;
}

/// Real filesystem implementation that delegates to `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl RealFs {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for RealFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(path)?;
        let mut paths = Vec::new();
        for entry in entries {
            paths.push(entry?.path());
        }
        Ok(paths)
    }
}

/// Captured result of an external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when terminated by a signal.
    pub status: Option<i32>,
    /// Stdout followed by stderr.
    pub output: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Failure of one external command invocation.
///
/// Always device-scoped: the caller drops that device's contribution.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },
    #[error("{program} exited with {status:?}: {output}")]
    Failed {
        program: String,
        status: Option<i32>,
        output: String,
    },
    #[error("{program} produced no output")]
    Empty { program: String },
}

/// Abstraction for running external diagnostic tools.
pub trait CommandRunner: Send + Sync {
    /// Runs `program` with `args`, killing it once `timeout` elapses.
    ///
    /// Returns the combined output regardless of exit status.
    fn run(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<CommandOutput, CommandError>;

    /// Runs a command and returns its output only if it exited successfully
    /// with something to parse.
    fn run_checked(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<String, CommandError> {
        let out = self.run(program, args, timeout)?;
        if !out.success() {
            return Err(CommandError::Failed {
                program: program.to_string(),
                status: out.status,
                output: out.output.trim().to_string(),
            });
        }
        if out.output.trim().is_empty() {
            return Err(CommandError::Empty {
                program: program.to_string(),
            });
        }
        Ok(out.output)
    }
}

/// A source of counter samples for a set of devices.
///
/// Implementations never fail as a whole: a device whose data cannot be read
/// is logged and left out of the returned samples.
pub trait CounterSource: Send + Sync {
    /// Short name used in logs and timing.
    fn name(&self) -> &'static str;

    /// Collects samples for `devices`.
    fn collect(&self, devices: &[Device]) -> Vec<CounterSample>;
}

/// Builds the argument vector that runs `program` inside the namespaces of PID 1.
pub fn with_host_namespaces<'a>(program: &'a str, args: &[&'a str]) -> Vec<&'a str> {
    let mut full = vec!["-t", "1", "-m", "-u", "-n", "-i", "-p", "--", program];
    full.extend_from_slice(args);
    full
}
