//! Domain-specific error types for vhostctl.
//!
//! This module defines `VhostError`, a `thiserror`-based enum covering every
//! terminal outcome of a provisioning run. Public API functions return
//! `Result<T, VhostError>` for programmatic error handling, while trait
//! boundaries (command execution, prompting) use `anyhow::Result`.
//!
//! `VhostError` implements `Into<anyhow::Error>`, so the `?` operator
//! converts it automatically; callers recover the typed variant with
//! `anyhow::Error::downcast_ref`.

use std::io;

/// Formats an IO error kind into a human-readable message.
///
/// Provides consistent, user-friendly messages for common IO error kinds
/// (e.g., "I/O error: not found") instead of the OS-level messages
/// (e.g., "No such file or directory (os error 2)"). For unrecognized
/// error kinds, falls back to including the OS-level error message.
pub(crate) fn io_error_kind_message(err: &io::Error) -> String {
    match err.kind() {
        io::ErrorKind::NotFound => "I/O error: not found".to_string(),
        io::ErrorKind::PermissionDenied => "I/O error: permission denied".to_string(),
        io::ErrorKind::IsADirectory => "I/O error: is a directory".to_string(),
        _ => format!("I/O error: {}", err),
    }
}

/// Domain-specific error type for vhostctl.
///
/// Every variant is terminal for the current run; nothing is retried.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum VhostError {
    /// The settings document does not exist.
    #[error("configuration file not found: {0}")]
    ConfigMissing(String),

    /// The settings document parsed but has no vhost section.
    #[error("vhost configuration missing: no `castor.vhost` section in {0}")]
    SectionMissing(String),

    /// Passwordless privilege escalation is not available.
    #[error("{0} rights are required to create the virtual host (`{0} -n true` failed)")]
    PrivilegeRequired(String),

    /// The configured web server is not supported.
    #[error("unsupported web server: {0:?} (expected apache2 or nginx)")]
    UnsupportedServer(String),

    /// The operator declined to overwrite an existing configuration file.
    #[error("virtual host creation cancelled: {0} already exists")]
    CancelledByOperator(String),

    /// The configuration was installed but the service did not reload.
    #[error("failed to reload {service}; inspect the logs with: {hint}")]
    ReloadFailed {
        /// The service that failed to reload (e.g. `nginx`).
        service: String,
        /// Variant-specific log inspection command.
        hint: String,
    },

    /// Another provisioning run holds the lock.
    #[error("another provisioning run is in progress (lock held on {0})")]
    Busy(String),

    /// A validation constraint was violated.
    #[error("validation error: {0}")]
    Validation(String),

    /// A configuration file could not be loaded or parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// The command was not found in PATH.
    #[error("command not found in PATH: {command}")]
    CommandNotFound {
        /// The command that could not be resolved.
        command: String,
    },

    /// A command execution failed (non-zero exit, spawn failure, timeout, etc.).
    #[error("command execution failed: {command}: {status}")]
    Execution {
        /// The command that was executed.
        command: String,
        /// Human-readable reason for the failure.
        status: String,
    },

    /// An I/O operation failed with contextual information.
    #[error("{context}: {message}")]
    Io {
        /// What was being done when the error occurred.
        context: String,
        /// Derived from [`io_error_kind_message`].
        message: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl VhostError {
    /// Creates an `Io` variant with the `message` field derived from `source`.
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            message: io_error_kind_message(&source),
            source,
        }
    }

    /// Returns true for the clean, operator-initiated stop.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::CancelledByOperator(_))
    }
}
