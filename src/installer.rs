//! Virtual host installation.
//!
//! [`Installer::install`] walks a fixed sequence of steps for one vhost:
//!
//! 1. **Check existing**: is there already a file at the live path?
//! 2. **Confirm**: if so, ask before overwriting; "no" cancels the run
//! 3. **Render**: HTTP block, plus HTTPS when certificates are configured
//! 4. **Stage**: write the document to the unprivileged staging path
//! 5. **Move**: privileged `mv` into the server's configuration directory,
//!    then `chown root:root` so the live file is not owned by the caller
//! 6. **Activate**: `a2ensite` (Debian-family Apache only)
//! 7. **Reload**: restart/reload the service, bounded by a timeout
//!
//! All steps run while holding the [`ProvisionLock`]s for the staging path
//! and for the host name.
//! The move is the only irreversible step. A failed reload leaves the new
//! file in place and reports how to inspect the service logs.
//!
//! Per-variant differences live in the [`ServerLayout`] table.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, error, info, warn};

use crate::config::{OsFamily, ServerVariant, VhostSettings};
use crate::error::VhostError;
use crate::executor::{CommandExecutor, CommandSpec};
use crate::lock::{DEFAULT_LOCK_DIR, ProvisionLock, host_lock_path, lock_path_for};
use crate::privilege::PrivilegeMethod;
use crate::prompt::Prompt;
use crate::template::{VhostDocument, render_vhost};

/// Default staging location for the rendered document.
pub const DEFAULT_STAGING_PATH: &str = "/tmp/vhost.conf";

/// Default upper bound for the service reload.
pub const DEFAULT_RELOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Mode of the staged (and therefore the installed) file.
const STAGED_FILE_MODE: u32 = 0o644;

/// Owner given to the live configuration file after the move.
pub const LIVE_FILE_OWNER: &str = "root:root";

/// How the service picks up the new configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadAction {
    Restart,
    Reload,
}

impl ReloadAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Restart => "restart",
            Self::Reload => "reload",
        }
    }
}

/// Filesystem layout and service wiring for one server variant / OS pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerLayout {
    pub variant: ServerVariant,
    /// Configuration directory, relative to the system root.
    pub config_dir: &'static str,
    /// Whether the site must be enabled with `a2ensite`.
    pub enable_site: bool,
    /// systemd unit name
    pub service: &'static str,
    pub reload: ReloadAction,
    /// Server-wide error log, named in the failure hint.
    pub error_log: &'static str,
}

impl ServerLayout {
    /// Dispatch table from (variant, OS family) to layout.
    pub fn for_variant(variant: ServerVariant, os: OsFamily) -> Self {
        match variant {
            ServerVariant::Apache2 if os.is_debian_based() => Self {
                variant,
                config_dir: "etc/apache2/sites-available",
                enable_site: true,
                service: "apache2",
                reload: ReloadAction::Restart,
                error_log: "/var/log/apache2/error.log",
            },
            ServerVariant::Apache2 => Self {
                variant,
                config_dir: "etc/httpd/conf.d",
                enable_site: false,
                service: "httpd",
                reload: ReloadAction::Restart,
                error_log: "/var/log/httpd/error_log",
            },
            ServerVariant::Nginx => Self {
                variant,
                config_dir: "etc/nginx/conf.d",
                enable_site: false,
                service: "nginx",
                reload: ReloadAction::Reload,
                error_log: "/var/log/nginx/error.log",
            },
        }
    }

    /// Configuration directory under `root`.
    pub fn config_dir_under(&self, root: &Utf8Path) -> Utf8PathBuf {
        root.join(self.config_dir)
    }

    /// Live configuration file for `host_name` under `root`.
    pub fn config_path(&self, root: &Utf8Path, host_name: &str) -> Utf8PathBuf {
        self.config_dir_under(root).join(format!("{}.conf", host_name))
    }

    /// `a2ensite {host}.conf`, when this layout needs activation.
    pub fn activation_spec(&self, host_name: &str, privilege: PrivilegeMethod) -> Option<CommandSpec> {
        self.enable_site.then(|| {
            CommandSpec::new("a2ensite", vec![format!("{}.conf", host_name)])
                .with_privilege(Some(privilege))
        })
    }

    /// `systemctl restart|reload {service}`, failure-tolerant and bounded.
    pub fn reload_spec(&self, privilege: PrivilegeMethod, timeout: Duration) -> CommandSpec {
        CommandSpec::new(
            "systemctl",
            vec![self.reload.as_str().to_string(), self.service.to_string()],
        )
        .with_privilege(Some(privilege))
        .allow_failure()
        .with_timeout(timeout)
    }

    /// Log inspection commands for a failed reload.
    pub fn log_hint(&self, privilege: PrivilegeMethod) -> String {
        format!(
            "{method} journalctl -xeu {service}.service (or {method} tail -n 50 {log})",
            method = privilege.command_name(),
            service = self.service,
            log = self.error_log,
        )
    }
}

/// Knobs that are not part of the project settings.
#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// System root the live paths are resolved under (`/` in production).
    pub root: Utf8PathBuf,
    pub staging_path: Utf8PathBuf,
    /// Directory holding the per-host lock files.
    pub lock_dir: Utf8PathBuf,
    pub reload_timeout: Duration,
    /// Log host mutations instead of performing them.
    pub dry_run: bool,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            root: Utf8PathBuf::from("/"),
            staging_path: Utf8PathBuf::from(DEFAULT_STAGING_PATH),
            lock_dir: Utf8PathBuf::from(DEFAULT_LOCK_DIR),
            reload_timeout: DEFAULT_RELOAD_TIMEOUT,
            dry_run: false,
        }
    }
}

/// Summary of a successful installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub host_name: String,
    pub config_path: Utf8PathBuf,
    pub https: bool,
    pub activated: bool,
    pub service: &'static str,
}

/// Removes the staging file unless it has been moved into place.
struct StagingGuard<'a> {
    path: &'a Utf8Path,
}

impl Drop for StagingGuard<'_> {
    fn drop(&mut self) {
        match fs::remove_file(self.path) {
            Ok(()) => debug!("removed leftover staging file: {}", self.path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                error!(
                    path = %self.path,
                    error_kind = ?e.kind(),
                    "failed to remove staging file: {}",
                    e,
                );
            }
        }
    }
}

/// Sets Unix file permissions on the given file.
fn set_file_mode(file: &fs::File, path: &Utf8Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(mode))
        .with_context(|| format!("failed to set permissions on {}", path))
}

/// Writes `contents` to a fresh file at `path`.
///
/// Any previous file (or symlink) at `path` is removed first and the new
/// file is created with `O_EXCL`, so a planted symlink is never followed.
fn write_staging_file(path: &Utf8Path, contents: &str) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => debug!("removed stale staging file: {}", path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(VhostError::io(format!("failed to remove {}", path), e).into()),
    }

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| VhostError::io(format!("failed to create staging file {}", path), e))?;
    set_file_mode(&file, path, STAGED_FILE_MODE)?;
    file.write_all(contents.as_bytes())
        .and_then(|()| file.sync_all())
        .map_err(|e| VhostError::io(format!("failed to write staging file {}", path), e))?;
    Ok(())
}

/// Runs the installation steps against the command runner and prompt.
pub struct Installer<'a> {
    executor: &'a dyn CommandExecutor,
    prompt: &'a dyn Prompt,
    options: &'a InstallOptions,
}

impl<'a> Installer<'a> {
    pub fn new(
        executor: &'a dyn CommandExecutor,
        prompt: &'a dyn Prompt,
        options: &'a InstallOptions,
    ) -> Self {
        Self {
            executor,
            prompt,
            options,
        }
    }

    /// Installs the vhost for `host_name`.
    ///
    /// Must only be called after the privilege probe succeeded.
    ///
    /// # Errors
    ///
    /// - `VhostError::Busy` if another run holds the staging or host lock
    /// - `VhostError::CancelledByOperator` if the operator refuses to overwrite
    /// - `VhostError::ReloadFailed` if the service did not reload
    /// - `VhostError::Execution` / `Io` for failures in the other steps
    pub fn install(
        &self,
        settings: &VhostSettings,
        os: OsFamily,
        host_name: &str,
        document_root: &Utf8Path,
    ) -> Result<InstallReport> {
        let layout = ServerLayout::for_variant(settings.server, os);
        let privilege = settings.privilege;
        let target = layout.config_path(&self.options.root, host_name);

        let _locks = if self.options.dry_run {
            None
        } else {
            let staging = ProvisionLock::acquire(&lock_path_for(&self.options.staging_path))?;
            let host = ProvisionLock::acquire(&host_lock_path(&self.options.lock_dir, host_name))?;
            Some((staging, host))
        };

        self.check_config_dir(&layout)?;
        self.confirm_overwrite(&target)?;

        let document = render_vhost(settings, os, host_name, document_root);
        debug!("rendered {} vhost for {} (https={})", layout.variant, host_name, document.has_https());

        self.stage_and_move(&document, &target, privilege)?;

        let activated = self.activate(&layout, host_name, privilege)?;
        self.reload(&layout, &target, privilege)?;

        Ok(InstallReport {
            host_name: host_name.to_string(),
            config_path: target,
            https: document.has_https(),
            activated,
            service: layout.service,
        })
    }

    /// Fails early when the server's configuration directory is absent.
    fn check_config_dir(&self, layout: &ServerLayout) -> Result<()> {
        let dir = layout.config_dir_under(&self.options.root);
        if dir.is_dir() {
            return Ok(());
        }
        if self.options.dry_run {
            warn!("{} does not exist; is {} installed?", dir, layout.service);
            return Ok(());
        }
        Err(VhostError::Validation(format!(
            "{} does not exist; is {} installed on this host?",
            dir, layout.service
        ))
        .into())
    }

    fn confirm_overwrite(&self, target: &Utf8Path) -> Result<()> {
        if !target.exists() {
            debug!("no existing configuration at {}", target);
            return Ok(());
        }

        if self.options.dry_run {
            info!("dry run: {} already exists and would need overwrite confirmation", target);
            return Ok(());
        }

        let question = format!("The file {} already exists. Do you want to replace it?", target);
        if self.prompt.confirm(&question, false)? {
            info!("overwriting existing configuration {}", target);
            return Ok(());
        }

        self.prompt.warning("Virtual host creation cancelled.");
        Err(VhostError::CancelledByOperator(target.to_string()).into())
    }

    fn stage_and_move(
        &self,
        document: &VhostDocument,
        target: &Utf8Path,
        privilege: PrivilegeMethod,
    ) -> Result<()> {
        let staging = self.options.staging_path.as_path();
        let move_spec = CommandSpec::new(
            "mv",
            vec!["-f".to_string(), staging.to_string(), target.to_string()],
        )
        .with_privilege(Some(privilege));
        let chown_spec = CommandSpec::new(
            "chown",
            vec![LIVE_FILE_OWNER.to_string(), target.to_string()],
        )
        .with_privilege(Some(privilege));

        if self.options.dry_run {
            info!("dry run: would write {} bytes to {}", document.contents().len(), staging);
            self.executor.run(&move_spec)?;
            self.executor.run(&chown_spec)?;
            return Ok(());
        }

        let _guard = StagingGuard { path: staging };
        write_staging_file(staging, &document.contents())?;
        debug!("staged vhost at {}", staging);

        self.executor
            .run(&move_spec)
            .with_context(|| format!("failed to move {} to {}", staging, target))?;
        self.executor
            .run(&chown_spec)
            .with_context(|| format!("failed to set owner of {} to {}", target, LIVE_FILE_OWNER))?;
        info!("installed {}", target);
        Ok(())
    }

    fn activate(&self, layout: &ServerLayout, host_name: &str, privilege: PrivilegeMethod) -> Result<bool> {
        let Some(spec) = layout.activation_spec(host_name, privilege) else {
            debug!("{} reads {} directly, no activation needed", layout.service, layout.config_dir);
            return Ok(false);
        };
        self.executor
            .run(&spec)
            .with_context(|| format!("failed to enable site {}", host_name))?;
        info!("enabled site {}", host_name);
        Ok(true)
    }

    fn reload(&self, layout: &ServerLayout, target: &Utf8Path, privilege: PrivilegeMethod) -> Result<()> {
        let spec = layout.reload_spec(privilege, self.options.reload_timeout);
        let result = self.executor.run(&spec)?;

        if result.success() {
            info!("{} {}ed", layout.service, layout.reload.as_str());
            return Ok(());
        }

        let hint = layout.log_hint(privilege);
        error!(
            service = layout.service,
            code = ?result.code(),
            "`{}` failed: {}",
            spec.display(),
            result.output.trim()
        );
        self.prompt.warning(&format!(
            "The configuration was left in place at {}; fix it and reload {} manually.",
            target, layout.service
        ));
        Err(VhostError::ReloadFailed {
            service: layout.service.to_string(),
            hint,
        }
        .into())
    }
}
