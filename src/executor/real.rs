//! Real command executor implementation.
//!
//! This module provides [`RealCommandExecutor`], which executes commands
//! using `std::process::Command` with real-time output streaming and
//! an optional timeout.

use std::os::unix::process::CommandExt;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use rustix::process::{Pid, Signal, kill_process_group};
use which::which;

use super::pipe::{StreamType, panic_message, read_pipe_to_log};
use super::{CommandExecutor, CommandSpec, ExecutionResult};
use crate::error::VhostError;

/// Polling interval while waiting on a command with a timeout.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Cleans up a child process and its associated reader threads.
///
/// Called from error paths in [`RealCommandExecutor::execute()`] to ensure
/// proper cleanup when thread spawning or process waiting fails.
fn cleanup_child_process<I>(child: &mut Child, handles: I)
where
    I: IntoIterator<Item = JoinHandle<String>>,
{
    let pid = child.id();
    if let Err(e) = child.kill() {
        tracing::debug!(pid = pid, "kill returned error (process may have already exited): {}", e);
    }
    if let Err(e) = child.wait() {
        tracing::warn!(pid = pid, "failed to wait for child process after kill: {}", e);
    }
    for handle in handles {
        if let Err(e) = handle.join() {
            tracing::warn!("reader thread panicked during cleanup: {}", panic_message(&*e));
        }
    }
}

/// Time a timed-out process group gets to exit after SIGTERM before SIGKILL.
const TERM_GRACE: Duration = Duration::from_secs(2);

/// How long reader threads are awaited once a timed-out command was killed.
const READER_GRACE: Duration = Duration::from_secs(1);

/// Exit status of a waited-on child and whether it hit its timeout.
struct Waited {
    status: ExitStatus,
    timed_out: bool,
}

/// Sends `signal` to the child's process group.
///
/// Only valid for children spawned with `process_group(0)`, whose group id
/// is their pid.
fn signal_group(child: &Child, signal: Signal) {
    if let Err(e) = kill_process_group(Pid::from_child(child), signal) {
        tracing::debug!(pid = child.id(), "signalling process group failed (group may be gone): {}", e);
    }
}

/// Polls the child until `deadline`, returning its status if it exited.
fn poll_until(child: &mut Child, deadline: Instant) -> std::io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(WAIT_POLL_INTERVAL);
    }
}

/// Waits for the child, terminating its process group once `timeout` has
/// elapsed.
///
/// The group receives SIGTERM first (`sudo` and `doas` relay it to the
/// wrapped command), then SIGKILL after [`TERM_GRACE`]. A killed child
/// yields its signal exit status, which reports failure.
fn wait_with_timeout(child: &mut Child, timeout: Option<Duration>) -> std::io::Result<Waited> {
    let Some(timeout) = timeout else {
        return Ok(Waited {
            status: child.wait()?,
            timed_out: false,
        });
    };

    if let Some(status) = poll_until(child, Instant::now() + timeout)? {
        return Ok(Waited {
            status,
            timed_out: false,
        });
    }

    tracing::warn!(pid = child.id(), "command timed out after {:?}, terminating it", timeout);
    signal_group(child, Signal::TERM);
    let status = match poll_until(child, Instant::now() + TERM_GRACE)? {
        Some(status) => status,
        None => {
            tracing::warn!(pid = child.id(), "command ignored SIGTERM, killing it");
            signal_group(child, Signal::KILL);
            child.wait()?
        }
    };
    Ok(Waited {
        status,
        timed_out: true,
    })
}

/// Waits for a reader thread to finish, giving up at `deadline`.
fn reader_finished(handle: &JoinHandle<String>, deadline: Instant) -> bool {
    loop {
        if handle.is_finished() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(WAIT_POLL_INTERVAL);
    }
}

/// Command executor that runs actual system commands.
///
/// When `dry_run` is true, commands are logged but not executed,
/// and `execute()` returns a result without exit status. Specs marked
/// [`read_only`](CommandSpec::read_only) still run.
pub struct RealCommandExecutor {
    pub dry_run: bool,
}

impl CommandExecutor for RealCommandExecutor {
    fn execute(&self, spec: &CommandSpec) -> Result<ExecutionResult> {
        if self.dry_run && !spec.read_only {
            tracing::info!("dry run: {}", spec.display());
            return Ok(ExecutionResult::default());
        }

        let (program, args) = spec.argv();
        let cmd = which(&program).map_err(|_| VhostError::CommandNotFound {
            command: program.clone(),
        })?;
        tracing::trace!("command found: {}: {}", program, cmd.to_string_lossy());

        let mut command = Command::new(cmd);
        command.args(&args);
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        if spec.timeout.is_some() {
            // Own group, so a timeout can signal every process the command started.
            command.process_group(0);
        }

        let mut child = command
            .spawn()
            .with_context(|| format!("failed to spawn command `{}` with args {:?}", program, args))?;

        tracing::debug!("spawned command: {}: pid={}", spec.display(), child.id());

        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();

        let stdout_handle = match thread::Builder::new()
            .name("stdout-reader".to_string())
            .spawn(move || read_pipe_to_log(stdout_pipe, StreamType::Stdout))
        {
            Ok(handle) => handle,
            Err(e) => {
                cleanup_child_process(&mut child, []);
                return Err(VhostError::Execution {
                    command: spec.display(),
                    status: format!("failed to spawn stdout reader thread: {}", e),
                }
                .into());
            }
        };

        let stderr_handle = match thread::Builder::new()
            .name("stderr-reader".to_string())
            .spawn(move || read_pipe_to_log(stderr_pipe, StreamType::Stderr))
        {
            Ok(handle) => handle,
            Err(e) => {
                cleanup_child_process(&mut child, [stdout_handle]);
                return Err(VhostError::Execution {
                    command: spec.display(),
                    status: format!("failed to spawn stderr reader thread: {}", e),
                }
                .into());
            }
        };

        let waited = match wait_with_timeout(&mut child, spec.timeout) {
            Ok(w) => w,
            Err(e) => {
                cleanup_child_process(&mut child, [stdout_handle, stderr_handle]);
                return Err(VhostError::Execution {
                    command: spec.display(),
                    status: format!("failed to wait for command: {}", e),
                }
                .into());
            }
        };

        let mut output = String::new();
        let mut panicked_streams = Vec::new();
        let handles = [("stdout", stdout_handle), ("stderr", stderr_handle)];
        let reader_deadline = waited.timed_out.then(|| Instant::now() + READER_GRACE);
        for (name, handle) in handles {
            if let Some(deadline) = reader_deadline
                && !reader_finished(&handle, deadline)
            {
                tracing::warn!(stream = name, "output pipe still held open after timeout, not waiting for it");
                continue;
            }
            match handle.join() {
                Ok(captured) => output.push_str(&captured),
                Err(e) => {
                    let msg = panic_message(&*e);
                    tracing::error!(stream = name, panic = msg, "reader thread panicked");
                    panicked_streams.push(format!("{}: {}", name, msg));
                }
            }
        }

        if !panicked_streams.is_empty() {
            return Err(VhostError::Execution {
                command: spec.display(),
                status: format!(
                    "reader thread(s) panicked during command execution: {}",
                    panicked_streams.join(", ")
                ),
            }
            .into());
        }

        tracing::trace!(
            "executed command: {}: success={} timed_out={}",
            program,
            waited.status.success(),
            waited.timed_out
        );

        Ok(ExecutionResult {
            status: Some(waited.status),
            output,
        })
    }
}
