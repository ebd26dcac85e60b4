//! Tool invocation and out-of-process execution.

use async_trait::async_trait;
use hdlforge_core::ToolName;
use serde::Serialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::debug;

use crate::stage::Stage;

/// Exit code recorded when no real exit code exists (timeout, spawn error, signal).
pub const SENTINEL_EXIT_CODE: i32 = -1;

/// One external process call, built fresh for every run.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ToolInvocation {
    pub stage: Stage,

    pub tool: ToolName,

    /// Resolved executable.
    pub program: PathBuf,

    pub args: Vec<String>,

    pub working_dir: PathBuf,

    /// Hard wall-clock timeout in seconds.
    pub timeout_secs: u64,
}

impl ToolInvocation {
    /// Command line for display.
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            if arg.contains(char::is_whitespace) {
                line.push('"');
                line.push_str(arg);
                line.push('"');
            } else {
                line.push_str(arg);
            }
        }
        line
    }
}

/// How the process ended.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InvocationStatus {
    Exited,
    TimedOut,
    SpawnFailed,
}

/// Captured result of an invocation.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct InvocationResult {
    pub status: InvocationStatus,

    /// Exit code (0 = success).
    pub exit_code: i32,

    pub stdout: String,

    pub stderr: String,

    pub duration_ms: u64,
}

impl InvocationResult {
    /// Whether the process ran and exited with code 0.
    pub fn passed(&self) -> bool {
        self.status == InvocationStatus::Exited && self.exit_code == 0
    }

    pub fn timed_out(duration: Duration) -> Self {
        Self {
            status: InvocationStatus::TimedOut,
            exit_code: SENTINEL_EXIT_CODE,
            stdout: String::new(),
            stderr: "timeout".to_string(),
            duration_ms: duration.as_millis() as u64,
        }
    }

    pub fn spawn_failed(error: &std::io::Error) -> Self {
        Self {
            status: InvocationStatus::SpawnFailed,
            exit_code: SENTINEL_EXIT_CODE,
            stdout: String::new(),
            stderr: error.to_string(),
            duration_ms: 0,
        }
    }
}

/// An invocation paired with its result. Never mutated after execution.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CompletedInvocation {
    pub invocation: ToolInvocation,
    pub result: InvocationResult,
}

/// Executes tool invocations.
#[async_trait]
pub trait Runner: Send + Sync {
    /// Run the invocation to completion, timeout or spawn failure.
    async fn run(&self, invocation: ToolInvocation) -> CompletedInvocation;
}

/// Runs invocations as child processes via `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl Runner for ProcessRunner {
    async fn run(&self, invocation: ToolInvocation) -> CompletedInvocation {
        let start = Instant::now();
        let timeout = Duration::from_secs(invocation.timeout_secs);

        debug!(
            stage = %invocation.stage,
            command = %invocation.command_line(),
            "spawning tool"
        );

        // The child is killed if the timeout drops the wait future.
        let child = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                return CompletedInvocation {
                    invocation,
                    result: InvocationResult::spawn_failed(&e),
                }
            }
        };

        let result = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Err(_) => InvocationResult::timed_out(start.elapsed()),
            Ok(Err(e)) => InvocationResult::spawn_failed(&e),
            Ok(Ok(output)) => InvocationResult {
                status: InvocationStatus::Exited,
                exit_code: output.status.code().unwrap_or(SENTINEL_EXIT_CODE),
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                duration_ms: start.elapsed().as_millis() as u64,
            },
        };

        CompletedInvocation { invocation, result }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation(program: &str, args: &[&str], timeout_secs: u64) -> ToolInvocation {
        ToolInvocation {
            stage: Stage::Lint,
            tool: ToolName::Lint,
            program: PathBuf::from(program),
            args: args.iter().map(|a| a.to_string()).collect(),
            working_dir: std::env::temp_dir(),
            timeout_secs,
        }
    }

    #[test]
    fn test_result_passed() {
        let result = InvocationResult {
            status: InvocationStatus::Exited,
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 5,
        };
        assert!(result.passed());
        assert!(!InvocationResult::timed_out(Duration::from_secs(1)).passed());
    }

    #[test]
    fn test_command_line_quotes_spaced_args() {
        let inv = invocation("yosys", &["-p", "read_verilog a.v; stat"], 60);
        assert_eq!(inv.command_line(), "yosys -p \"read_verilog a.v; stat\"");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_simple_command() {
        let done = ProcessRunner.run(invocation("echo", &["hello"], 60)).await;
        assert!(done.result.passed());
        assert_eq!(done.result.exit_code, 0);
        assert!(done.result.stdout.contains("hello"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_failing_command() {
        let done = ProcessRunner.run(invocation("false", &[], 60)).await;
        assert_eq!(done.result.status, InvocationStatus::Exited);
        assert_ne!(done.result.exit_code, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_and_returns_sentinel() {
        let start = Instant::now();
        let done = ProcessRunner.run(invocation("sleep", &["30"], 1)).await;
        assert_eq!(done.result.status, InvocationStatus::TimedOut);
        assert_eq!(done.result.exit_code, SENTINEL_EXIT_CODE);
        assert_eq!(done.result.stderr, "timeout");
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_captured() {
        let done = ProcessRunner
            .run(invocation("/nonexistent/hdlforge-tool", &[], 60))
            .await;
        assert_eq!(done.result.status, InvocationStatus::SpawnFailed);
        assert!(!done.result.stderr.is_empty());
    }
}
