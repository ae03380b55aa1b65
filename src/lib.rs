pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod hostname;
pub mod installer;
pub mod lock;
pub mod privilege;
pub mod prompt;
pub mod template;

pub use error::VhostError;

use std::time::Duration;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, info};
use tracing_subscriber::{FmtSubscriber, filter::LevelFilter};

use crate::config::{OsFamily, VhostSettings};
use crate::executor::CommandExecutor;
use crate::installer::{InstallOptions, InstallReport, Installer};
use crate::prompt::Prompt;

pub fn init_logging(log_level: cli::LogLevel) -> Result<()> {
    let filter = match log_level {
        cli::LogLevel::Trace => LevelFilter::TRACE,
        cli::LogLevel::Debug => LevelFilter::DEBUG,
        cli::LogLevel::Info => LevelFilter::INFO,
        cli::LogLevel::Warn => LevelFilter::WARN,
        cli::LogLevel::Error => LevelFilter::ERROR,
    };

    tracing::subscriber::set_global_default(
        FmtSubscriber::builder()
            .with_max_level(filter)
            .with_writer(std::io::stderr)
            .finish(),
    )
    .context("failed to set global default tracing subscriber")
}

/// Project directory and settings file resolved from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectContext {
    pub dir: Utf8PathBuf,
    pub settings_path: Utf8PathBuf,
}

impl ProjectContext {
    /// Resolves relative paths against the current working directory.
    pub fn resolve(common: &cli::CommonArgs) -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to read current directory")?;
        let cwd = Utf8PathBuf::from_path_buf(cwd).map_err(|p| {
            VhostError::Validation(format!("current directory is not valid UTF-8: {}", p.display()))
        })?;
        Ok(Self::resolve_from(common, &cwd))
    }

    pub fn resolve_from(common: &cli::CommonArgs, cwd: &Utf8Path) -> Self {
        let dir = match &common.project_dir {
            Some(dir) => cwd.join(dir),
            None => cwd.to_owned(),
        };
        let settings_path = match &common.file {
            Some(file) => cwd.join(file),
            None => dir.join(config::DEFAULT_SETTINGS_PATH),
        };
        Self { dir, settings_path }
    }

    /// Last component of the project directory, the fallback project name.
    pub fn basename(&self) -> &str {
        self.dir.file_name().unwrap_or_default()
    }

    /// `document_root` from the settings, else `{dir}/public`.
    pub fn document_root(&self, settings: &VhostSettings) -> Utf8PathBuf {
        match &settings.document_root {
            Some(root) => self.dir.join(root),
            None => self.dir.join("public"),
        }
    }
}

/// Settings plus everything derived from them, before any host mutation.
#[derive(Debug)]
struct Plan {
    settings: VhostSettings,
    host_name: String,
    document_root: Utf8PathBuf,
}

fn load_plan(project: &ProjectContext) -> Result<Plan> {
    let settings = config::load_settings(&project.settings_path)?;
    settings.validate()?;
    plan_from_settings(project, settings)
}

fn plan_from_settings(project: &ProjectContext, settings: VhostSettings) -> Result<Plan> {
    let host_name = hostname::build_host_name(
        settings.project_name.as_deref(),
        settings.domain.as_deref(),
        project.basename(),
    );
    hostname::validate_host_name(&host_name)?;

    let document_root = project.document_root(&settings);
    config::validate_directive_path("document root", document_root.as_str())?;

    debug!("planned vhost {} serving {}", host_name, document_root);
    Ok(Plan {
        settings,
        host_name,
        document_root,
    })
}

/// Creates the virtual host: load settings, check privilege, build the
/// host name, install, report.
///
/// Every failure aborts the run. A refused overwrite surfaces as
/// [`VhostError::CancelledByOperator`].
pub fn run_create(
    opts: &cli::CreateArgs,
    executor: &dyn CommandExecutor,
    prompt: &dyn Prompt,
) -> Result<InstallReport> {
    let project = ProjectContext::resolve(&opts.common)?;
    create_vhost(&project, opts, executor, prompt)
}

/// [`run_create`] with an explicit project context.
pub fn create_vhost(
    project: &ProjectContext,
    opts: &cli::CreateArgs,
    executor: &dyn CommandExecutor,
    prompt: &dyn Prompt,
) -> Result<InstallReport> {
    let settings = config::load_settings(&project.settings_path)?;
    settings.validate()?;

    if !privilege::check_privilege(executor, settings.privilege) {
        return Err(VhostError::PrivilegeRequired(settings.privilege.to_string()).into());
    }

    let plan = plan_from_settings(project, settings)?;
    let os = plan
        .settings
        .os
        .unwrap_or_else(|| OsFamily::detect(&opts.root));

    debug!("os={}, document root {}", os, plan.document_root);
    prompt.info(&format!(
        "Creating {} virtual host {}",
        plan.settings.server, plan.host_name
    ));

    let options = InstallOptions {
        root: opts.root.clone(),
        staging_path: opts.staging_path.clone(),
        lock_dir: opts.lock_dir.clone(),
        reload_timeout: Duration::from_secs(opts.reload_timeout),
        dry_run: opts.dry_run,
    };
    let report = Installer::new(executor, prompt, &options).install(
        &plan.settings,
        os,
        &plan.host_name,
        &plan.document_root,
    )?;

    prompt.success(&format!("Virtual host created for {}", report.host_name));
    Ok(report)
}

/// Renders the configuration document without privilege checks or host mutation.
pub fn run_render(opts: &cli::RenderArgs) -> Result<String> {
    let project = ProjectContext::resolve(&opts.common)?;
    let plan = load_plan(&project)?;
    let os = plan
        .settings
        .os
        .unwrap_or_else(|| OsFamily::detect(&opts.root));
    let document =
        template::render_vhost(&plan.settings, os, &plan.host_name, &plan.document_root);
    Ok(document.contents())
}

pub fn run_validate(opts: &cli::ValidateArgs) -> Result<VhostSettings> {
    let project = ProjectContext::resolve(&opts.common)?;
    let plan = load_plan(&project).context("vhost configuration validation failed")?;
    info!(
        "validation successful for {} ({}):\n{:#?}",
        plan.host_name, project.settings_path, plan.settings
    );
    Ok(plan.settings)
}
