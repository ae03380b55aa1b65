use anyhow::Result;
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

use crate::installer::DEFAULT_STAGING_PATH;
use crate::lock::DEFAULT_LOCK_DIR;

#[derive(Parser, Debug)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version = env!("CARGO_PKG_VERSION"),
    about = env!("CARGO_PKG_DESCRIPTION"),
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the virtual host for the project and reload the web server
    Create(CreateArgs),

    /// Print the virtual host configuration without touching the host
    Render(RenderArgs),

    /// Validate the project's vhost configuration
    Validate(ValidateArgs),

    /// Generate shell completion scripts
    Completions(CompletionsArgs),
}

impl Commands {
    /// Returns the log level requested by the subcommand, if it has one.
    pub fn log_level(&self) -> Option<LogLevel> {
        match self {
            Self::Create(opts) => Some(opts.common.log_level),
            Self::Render(opts) => Some(opts.common.log_level),
            Self::Validate(opts) => Some(opts.common.log_level),
            Self::Completions(_) => None,
        }
    }
}

/// Arguments shared by every subcommand that reads the project configuration.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Path to the YAML settings file [default: <project-dir>/config/packages/castor.yaml]
    #[arg(short, long)]
    pub file: Option<Utf8PathBuf>,

    /// Project directory [default: current directory]
    #[arg(short = 'C', long)]
    pub project_dir: Option<Utf8PathBuf>,

    /// Set the log level
    #[arg(short, long, default_value = "info")]
    pub log_level: LogLevel,
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Do not modify the host, just show what would be done
    #[arg(long)]
    pub dry_run: bool,

    /// Overwrite an existing virtual host without asking
    #[arg(short, long)]
    pub yes: bool,

    /// Unprivileged location the configuration is written to before being moved
    #[arg(long, default_value = DEFAULT_STAGING_PATH)]
    pub staging_path: Utf8PathBuf,

    /// Directory for the per-host lock that serializes runs for one virtual host
    #[arg(long, default_value = DEFAULT_LOCK_DIR)]
    pub lock_dir: Utf8PathBuf,

    /// System root the web server configuration lives under
    #[arg(long, default_value = "/")]
    pub root: Utf8PathBuf,

    /// Seconds to wait for the web server reload before giving up
    #[arg(long, default_value_t = 60)]
    pub reload_timeout: u64,
}

#[derive(Args, Debug)]
pub struct RenderArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// System root used to detect the OS family when the settings omit it
    #[arg(long, default_value = "/")]
    pub root: Utf8PathBuf,
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: Shell,
}

/// Represents log levels for controlling the verbosity of logging output.
///
/// This enum maps directly to the log levels used by the `tracing` crate.
/// For example, specifying `--log-level debug` will enable debug-level
/// logging output, including every command line that is executed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

pub fn parse_args() -> Result<Cli> {
    Ok(Cli::parse())
}
