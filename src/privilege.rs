//! Privilege escalation for the host-mutating steps.
//!
//! Installing a virtual host touches root-owned directories and restarts a
//! system service. Those steps run through a non-interactive privilege
//! wrapper (`sudo -n` or `doas -n`), and [`check_privilege`] verifies up
//! front that the wrapper works without a password prompt.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::executor::{CommandExecutor, CommandSpec};

/// Privilege escalation method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivilegeMethod {
    /// Use `sudo` for privilege escalation.
    #[default]
    Sudo,
    /// Use `doas` for privilege escalation.
    Doas,
}

impl PrivilegeMethod {
    /// Returns the command name for this privilege method.
    pub fn command_name(&self) -> &'static str {
        match self {
            Self::Sudo => "sudo",
            Self::Doas => "doas",
        }
    }

    /// The no-op command used to probe for passwordless escalation.
    ///
    /// Read-only, so a dry run still reports missing privileges.
    pub fn probe_spec(&self) -> CommandSpec {
        CommandSpec::new(self.command_name(), vec!["-n".to_string(), "true".to_string()])
            .allow_failure()
            .read_only()
    }
}

impl std::fmt::Display for PrivilegeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.command_name())
    }
}

/// Probes whether `method` can run a privileged no-op without a password.
///
/// A non-zero exit is the expected "no" answer. A command that cannot be
/// run at all (e.g. `doas` not installed) is also treated as "no".
pub fn check_privilege(executor: &dyn CommandExecutor, method: PrivilegeMethod) -> bool {
    let spec = method.probe_spec();
    match executor.run(&spec) {
        Ok(result) => {
            debug!("privilege probe `{}` success={}", spec.display(), result.success());
            result.success()
        }
        Err(e) => {
            warn!("privilege probe `{}` could not run: {:#}", spec.display(), e);
            false
        }
    }
}
