//! Command execution abstraction for vhostctl.
//!
//! This module provides:
//! - [`CommandSpec`]: Specification for commands to execute
//! - [`ExecutionResult`]: Exit status plus captured output
//! - [`CommandExecutor`]: Trait for command execution strategies
//! - [`RealCommandExecutor`]: Production implementation using `std::process::Command`
//!
//! Provisioning logic never spawns processes directly; every external
//! command goes through a `CommandExecutor`, so tests substitute a recorder.

mod pipe;
mod real;

use std::process::ExitStatus;
use std::time::Duration;

use anyhow::Result;

use crate::error::VhostError;
use crate::privilege::PrivilegeMethod;

pub use real::RealCommandExecutor;

/// Formats string arguments into a space-separated, debug-quoted string.
///
/// Used by error messages and dry-run output to consistently format
/// command arguments (e.g., `"-f" "/tmp/vhost.conf"`).
pub(crate) fn format_command_args(args: &[String]) -> String {
    args.iter()
        .map(|a| format!("{:?}", a))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Specification for a command to be executed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// The command to execute (e.g., "systemctl")
    pub command: String,
    /// Command arguments
    pub args: Vec<String>,
    /// Privilege escalation method to wrap the command
    pub privilege: Option<PrivilegeMethod>,
    /// When true, a non-zero exit is returned as a result instead of an error
    pub allow_failure: bool,
    /// Upper bound on run time; the process group is killed when exceeded
    pub timeout: Option<Duration>,
    /// Leaves the host unchanged, so it also runs in dry-run mode
    pub read_only: bool,
}

impl CommandSpec {
    /// Creates a new CommandSpec with command and args
    #[must_use]
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            privilege: None,
            allow_failure: false,
            timeout: None,
            read_only: false,
        }
    }

    /// Sets the privilege escalation method
    #[must_use]
    pub fn with_privilege(mut self, privilege: Option<PrivilegeMethod>) -> Self {
        self.privilege = privilege;
        self
    }

    /// Tolerates a non-zero exit status.
    #[must_use]
    pub fn allow_failure(mut self) -> Self {
        self.allow_failure = true;
        self
    }

    /// Sets the timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Marks the command as having no side effects on the host.
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Returns the program and arguments actually spawned, with the
    /// privilege wrapper (`sudo -n ...`) applied.
    pub fn argv(&self) -> (String, Vec<String>) {
        match self.privilege {
            Some(method) => {
                let mut args = Vec::with_capacity(self.args.len() + 2);
                args.push("-n".to_string());
                args.push(self.command.clone());
                args.extend(self.args.iter().cloned());
                (method.command_name().to_string(), args)
            }
            None => (self.command.clone(), self.args.clone()),
        }
    }

    /// Renders the command line for logs and hints.
    pub fn display(&self) -> String {
        let (program, args) = self.argv();
        if args.is_empty() {
            program
        } else {
            format!("{} {}", program, args.join(" "))
        }
    }
}

/// Result of command execution
#[derive(Debug, Default)]
pub struct ExecutionResult {
    /// Exit status of the command (None in dry-run mode)
    pub status: Option<ExitStatus>,
    /// Captured stdout followed by stderr
    pub output: String,
}

impl ExecutionResult {
    /// Returns true if the command executed successfully.
    ///
    /// In dry-run mode (status is None), this always returns true.
    pub fn success(&self) -> bool {
        self.status.is_none_or(|s| s.success())
    }

    /// Returns the exit code if available
    pub fn code(&self) -> Option<i32> {
        self.status.and_then(|s| s.code())
    }
}

/// Trait for command execution.
///
/// `execute` reports the exit status as data; only failures to run the
/// command at all (not found, spawn error) are errors. [`run`](Self::run)
/// layers the `allow_failure` policy on top.
pub trait CommandExecutor: Send + Sync {
    /// Executes a command with the given specification.
    fn execute(&self, spec: &CommandSpec) -> Result<ExecutionResult>;

    /// Executes a command and turns a non-zero exit into an error unless
    /// the spec tolerates failure.
    fn run(&self, spec: &CommandSpec) -> Result<ExecutionResult> {
        let result = self.execute(spec)?;
        if !result.success() && !spec.allow_failure {
            let status = match result.code() {
                Some(code) => format!("exit status: {}", code),
                None => "terminated by signal".to_string(),
            };
            let (program, args) = spec.argv();
            return Err(VhostError::Execution {
                command: format!("{} {}", program, format_command_args(&args)),
                status,
            }
            .into());
        }
        Ok(result)
    }
}
