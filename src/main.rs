use std::io;
use std::process::ExitCode;

use anyhow::Result;
use clap::CommandFactory;
use clap_complete::generate;
use tracing::{error, info};

use vhostctl::VhostError;
use vhostctl::cli::{self, Cli, Commands};
use vhostctl::executor::RealCommandExecutor;
use vhostctl::prompt::select_prompt;

/// Exit status for a run the operator cancelled.
const EXIT_CANCELLED: u8 = 2;

fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{:#}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Some(log_level) = args.command.log_level()
        && let Err(e) = vhostctl::init_logging(log_level)
    {
        eprintln!("{:#}", e);
        return ExitCode::FAILURE;
    }

    match &args.command {
        Commands::Create(opts) => {
            let executor = RealCommandExecutor {
                dry_run: opts.dry_run,
            };
            let prompt = select_prompt(opts.yes);
            match vhostctl::run_create(opts, &executor, prompt.as_ref()) {
                Ok(report) => {
                    info!(
                        "installed {} (https={}, activated={})",
                        report.config_path, report.https, report.activated
                    );
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    if e.downcast_ref::<VhostError>().is_some_and(VhostError::is_cancellation) {
                        info!("{:#}", e);
                        return ExitCode::from(EXIT_CANCELLED);
                    }
                    prompt.error(&format!("{:#}", e));
                    ExitCode::FAILURE
                }
            }
        }
        Commands::Render(opts) => report(vhostctl::run_render(opts).map(|contents| print!("{}", contents))),
        Commands::Validate(opts) => report(vhostctl::run_validate(opts).map(|_| ())),
        Commands::Completions(opts) => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(opts.shell, &mut cmd, name, &mut io::stdout());
            ExitCode::SUCCESS
        }
    }
}

fn report(result: Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
