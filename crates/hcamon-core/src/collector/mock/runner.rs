//! Scripted command runner for testing external-tool collectors.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use crate::collector::traits::{CommandError, CommandOutput, CommandRunner};

/// Canned result for one command line.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Exit 0 with this output.
    Output(String),
    /// Non-zero exit with this output.
    Fail(i32, String),
    /// Deadline exceeded.
    Timeout,
}

/// Command runner answering from a table keyed by the full command line.
///
/// Responses registered for the same command line are returned in order; the
/// last one repeats. Unknown command lines fail to spawn, as a missing binary
/// would.
#[derive(Debug, Default)]
pub struct MockRunner {
    responses: Mutex<HashMap<String, VecDeque<MockResponse>>>,
    calls: Mutex<Vec<String>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(program: &str, args: &[&str]) -> String {
        let mut key = program.to_string();
        for arg in args {
            key.push(' ');
            key.push_str(arg);
        }
        key
    }

    /// Registers the output of `command_line` (program and args joined by spaces).
    pub fn on(&mut self, command_line: &str, response: MockResponse) -> &mut Self {
        if let Ok(responses) = self.responses.get_mut() {
            responses
                .entry(command_line.to_string())
                .or_default()
                .push_back(response);
        }
        self
    }

    fn next_response(&self, key: &str) -> Option<MockResponse> {
        let mut responses = self.responses.lock().ok()?;
        let queue = responses.get_mut(key)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }

    /// Shorthand for a successful command.
    pub fn ok(&mut self, command_line: &str, output: &str) -> &mut Self {
        self.on(command_line, MockResponse::Output(output.to_string()))
    }

    /// Command lines run so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl CommandRunner for MockRunner {
    fn run(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<CommandOutput, CommandError> {
        let key = Self::key(program, args);
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(key.clone());
        }
        match self.next_response(&key) {
            Some(MockResponse::Output(output)) => Ok(CommandOutput {
                status: Some(0),
                output,
            }),
            Some(MockResponse::Fail(code, output)) => Ok(CommandOutput {
                status: Some(code),
                output,
            }),
            Some(MockResponse::Timeout) => Err(CommandError::Timeout {
                program: program.to_string(),
                timeout,
            }),
            None => Err(CommandError::Spawn {
                program: program.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, key),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_runner_responses() {
        let mut runner = MockRunner::new();
        runner
            .ok("ethtool -S eth0", "NIC statistics:\n")
            .on("ethtool -S eth1", MockResponse::Fail(1, "no such device".into()))
            .on("rdma resource show mlx5_0", MockResponse::Timeout);

        let t = Duration::from_secs(1);
        assert!(runner.run_checked("ethtool", &["-S", "eth0"], t).is_ok());
        assert!(matches!(
            runner.run_checked("ethtool", &["-S", "eth1"], t),
            Err(CommandError::Failed { status: Some(1), .. })
        ));
        assert!(matches!(
            runner.run("rdma", &["resource", "show", "mlx5_0"], t),
            Err(CommandError::Timeout { .. })
        ));
        assert!(matches!(
            runner.run("mlxlink", &[], t),
            Err(CommandError::Spawn { .. })
        ));
        assert_eq!(runner.calls().len(), 4);
    }

    #[test]
    fn test_mock_runner_sequence() {
        let mut runner = MockRunner::new();
        runner.ok("setpci -s 0000:1a:00.0 68.w", "2930\n");
        runner.ok("setpci -s 0000:1a:00.0 68.w", "5930\n");

        let t = Duration::from_secs(1);
        let read = |r: &MockRunner| r.run_checked("setpci", &["-s", "0000:1a:00.0", "68.w"], t);
        assert_eq!(read(&runner).unwrap(), "2930\n");
        assert_eq!(read(&runner).unwrap(), "5930\n");
        assert_eq!(read(&runner).unwrap(), "5930\n");
    }
}
