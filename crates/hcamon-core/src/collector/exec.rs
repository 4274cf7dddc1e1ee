//! Process-backed [`CommandRunner`].

use std::io::{self, Read};
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::traits::{CommandError, CommandOutput, CommandRunner};

/// Poll interval while waiting for a child to exit.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long output is still collected after the child exits. A descendant
/// that inherited the pipes (the target of `nsenter`, a backgrounded job)
/// can keep them open indefinitely.
const PIPE_GRACE: Duration = Duration::from_millis(500);

/// Runs commands as real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealRunner;

impl RealRunner {
    pub fn new() -> Self {
        Self
    }
}

/// Streams a pipe to a channel in chunks until EOF or a read error.
fn drain<R: Read + Send + 'static>(name: &'static str, pipe: Option<R>) -> Option<Receiver<Vec<u8>>> {
    pipe.map(|mut p| {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut buf = [0u8; 8192];
            loop {
                match p.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        debug!("reading {} failed: {}", name, e);
                        break;
                    }
                }
            }
        });
        rx
    })
}

/// Gathers what a drain thread produced until it finishes or `deadline` passes.
fn collect(name: &str, program: &str, rx: Receiver<Vec<u8>>, deadline: Instant) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let wait = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(wait) {
            Ok(chunk) => out.extend_from_slice(&chunk),
            Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                debug!("{}: {} still open after exit, keeping partial output", program, name);
                break;
            }
        }
    }
    out
}

impl CommandRunner for RealRunner {
    fn run(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<CommandOutput, CommandError> {
        debug!("exec: {} {}", program, args.join(" "));
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| CommandError::Spawn {
                program: program.to_string(),
                source,
            })?;

        // Pipes are drained concurrently so a chatty child never blocks on a full buffer.
        let stdout = drain("stdout", child.stdout.take());
        let stderr = drain("stderr", child.stderr.take());

        let deadline = Instant::now() + timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    if let Err(e) = child.kill() {
                        warn!("failed to kill {}: {}", program, e);
                    }
                    if let Err(e) = child.wait() {
                        debug!("reaping {} after kill failed: {}", program, e);
                    }
                    return Err(CommandError::Timeout {
                        program: program.to_string(),
                        timeout,
                    });
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(source) => {
                    return Err(CommandError::Spawn {
                        program: program.to_string(),
                        source,
                    });
                }
            }
        };

        let grace = Instant::now() + PIPE_GRACE;
        let mut output = Vec::new();
        for (name, rx) in [("stdout", stdout), ("stderr", stderr)] {
            if let Some(rx) = rx {
                output.extend(collect(name, program, rx, grace));
            }
        }

        Ok(CommandOutput {
            status: status.code(),
            output: String::from_utf8_lossy(&output).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_captures_output() {
        let out = RealRunner::new()
            .run("sh", &["-c", "echo hello; echo oops >&2"], Duration::from_secs(5))
            .unwrap();
        assert!(out.success());
        assert!(out.output.contains("hello"));
        assert!(out.output.contains("oops"));
    }

    #[test]
    fn test_run_checked_reports_exit_status() {
        let err = RealRunner::new()
            .run_checked("sh", &["-c", "exit 3"], Duration::from_secs(5))
            .unwrap_err();
        assert!(matches!(err, CommandError::Failed { status: Some(3), .. }));
    }

    #[test]
    fn test_run_kills_on_timeout() {
        let start = Instant::now();
        let err = RealRunner::new()
            .run("sleep", &["5"], Duration::from_millis(100))
            .unwrap_err();
        assert!(matches!(err, CommandError::Timeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_descendant_holding_pipes_does_not_block() {
        let start = Instant::now();
        let out = RealRunner::new()
            .run("sh", &["-c", "sleep 5 & echo hi"], Duration::from_secs(10))
            .unwrap();
        assert!(out.success());
        assert!(out.output.contains("hi"));
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn test_missing_program() {
        let err = RealRunner::new()
            .run("/nonexistent/tool-12345", &[], Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }
}
