//! Executor abstraction for task handoff.
//!
//! The [`Executor`] trait decouples the pipeline from the backend that
//! actually performs the task (an external command by default). Tests use
//! recording executors that return scripted reports without spawning
//! processes.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::io::config::ExecutorSettings;
use crate::io::process::run_command_with_timeout;

/// Parameters for one executor invocation.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    /// Working directory for the executor process.
    pub workdir: PathBuf,
    /// Request text fed on stdin.
    pub request_text: String,
    /// Complete environment of the child; nothing is inherited.
    pub env: BTreeMap<String, String>,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

/// What the executor reported back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl ExecutionReport {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Abstraction over execution backends.
pub trait Executor {
    fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionReport>;
}

impl<E: Executor + ?Sized> Executor for &E {
    fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionReport> {
        (**self).execute(request)
    }
}

/// Executor that spawns the configured command.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    command: Vec<String>,
}

impl CommandExecutor {
    pub fn new(command: Vec<String>) -> Result<Self> {
        match command.first() {
            Some(program) if !program.trim().is_empty() => Ok(Self { command }),
            _ => Err(anyhow!("executor command must be a non-empty array")),
        }
    }

    pub fn from_settings(settings: &ExecutorSettings) -> Result<Self> {
        Self::new(settings.command.clone())
    }
}

impl Executor for CommandExecutor {
    #[instrument(skip_all, fields(program = %self.command[0], timeout_secs = request.timeout.as_secs()))]
    fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionReport> {
        info!(workdir = %request.workdir.display(), "handing task to executor");
        let mut cmd = Command::new(&self.command[0]);
        cmd.args(&self.command[1..])
            .current_dir(&request.workdir)
            .env_clear()
            .envs(&request.env);

        let output = run_command_with_timeout(
            cmd,
            Some(request.request_text.as_bytes()),
            request.timeout,
            request.output_limit_bytes,
        )?;

        let mut stderr = output.stderr_text();
        stderr.push_str(&output.truncation_notice("executor"));
        let report = ExecutionReport {
            exit_code: output.status.code(),
            stdout: output.stdout_text(),
            stderr,
            timed_out: output.timed_out,
        };
        if report.succeeded() {
            debug!("executor finished");
        } else {
            warn!(exit_code = ?report.exit_code, timed_out = report.timed_out, "executor failed");
        }
        Ok(report)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn request(text: &str) -> ExecutionRequest {
        ExecutionRequest {
            workdir: std::env::temp_dir(),
            request_text: text.to_string(),
            env: BTreeMap::from([("DUNE_ENVIRONMENT".to_string(), "testing".to_string())]),
            timeout: Duration::from_secs(10),
            output_limit_bytes: 10_000,
        }
    }

    #[test]
    fn command_receives_request_and_explicit_env_only() {
        let executor = CommandExecutor::new(vec![
            "/bin/sh".to_string(),
            "-c".to_string(),
            "printf '%s|' \"$DUNE_ENVIRONMENT\" \"${HOME:-unset}\"; cat".to_string(),
        ])
        .expect("executor");

        let report = executor.execute(&request("fetch mail")).expect("execute");
        assert!(report.succeeded());
        assert_eq!(report.stdout, "testing|unset|fetch mail");
    }

    #[test]
    fn failing_command_is_reported_not_raised() {
        let executor = CommandExecutor::new(vec![
            "/bin/sh".to_string(),
            "-c".to_string(),
            "echo broken >&2; exit 4".to_string(),
        ])
        .expect("executor");

        let report = executor.execute(&request("x")).expect("execute");
        assert!(!report.succeeded());
        assert_eq!(report.exit_code, Some(4));
        assert_eq!(report.stderr, "broken\n");
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(CommandExecutor::new(Vec::new()).is_err());
        assert!(CommandExecutor::new(vec![" ".to_string()]).is_err());
    }
}
