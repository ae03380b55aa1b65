//! Operator-facing prompts and status messages.
//!
//! The installer only needs a yes/no confirmation and four kinds of
//! status line, expressed by the [`Prompt`] trait. [`TerminalPrompt`]
//! talks to a human through `dialoguer`; [`NonInteractivePrompt`] answers
//! confirmations from a fixed policy for scripted runs.

use anyhow::{Context, Result};
use console::{Term, style};
use dialoguer::Confirm;
use dialoguer::theme::ColorfulTheme;

/// Interactive-prompt collaborator.
pub trait Prompt {
    /// Asks a yes/no question; `default` is used on plain Enter.
    fn confirm(&self, message: &str, default: bool) -> Result<bool>;
    fn info(&self, message: &str);
    fn success(&self, message: &str);
    fn warning(&self, message: &str);
    fn error(&self, message: &str);
}

/// Writes a tagged status line to stderr. Write errors are only logged.
fn write_status(tag: console::StyledObject<&str>, message: &str) {
    let line = format!("{} {}", tag, message);
    if let Err(e) = Term::stderr().write_line(&line) {
        tracing::debug!("failed to write status line: {}", e);
    }
}

fn print_info(message: &str) {
    write_status(style("[INFO]").cyan().bold(), message);
}

fn print_success(message: &str) {
    write_status(style("[OK]").green().bold(), message);
}

fn print_warning(message: &str) {
    write_status(style("[WARNING]").yellow().bold(), message);
}

fn print_error(message: &str) {
    write_status(style("[ERROR]").red().bold(), message);
}

/// Prompt backed by the controlling terminal.
pub struct TerminalPrompt {
    theme: ColorfulTheme,
}

impl TerminalPrompt {
    pub fn new() -> Self {
        Self {
            theme: ColorfulTheme::default(),
        }
    }
}

impl Default for TerminalPrompt {
    fn default() -> Self {
        Self::new()
    }
}

impl Prompt for TerminalPrompt {
    fn confirm(&self, message: &str, default: bool) -> Result<bool> {
        Confirm::with_theme(&self.theme)
            .with_prompt(message)
            .default(default)
            .interact_on(&Term::stderr())
            .context("failed to read confirmation from terminal")
    }

    fn info(&self, message: &str) {
        print_info(message);
    }

    fn success(&self, message: &str) {
        print_success(message);
    }

    fn warning(&self, message: &str) {
        print_warning(message);
    }

    fn error(&self, message: &str) {
        print_error(message);
    }
}

/// Prompt for unattended runs.
///
/// Confirmations return `true` when `assume_yes` is set, otherwise the
/// question's default.
pub struct NonInteractivePrompt {
    pub assume_yes: bool,
}

impl Prompt for NonInteractivePrompt {
    fn confirm(&self, message: &str, default: bool) -> Result<bool> {
        let answer = self.assume_yes || default;
        tracing::info!("{} -> {}", message, if answer { "yes" } else { "no" });
        Ok(answer)
    }

    fn info(&self, message: &str) {
        print_info(message);
    }

    fn success(&self, message: &str) {
        print_success(message);
    }

    fn warning(&self, message: &str) {
        print_warning(message);
    }

    fn error(&self, message: &str) {
        print_error(message);
    }
}

/// Picks the prompt for this process: `--yes` or an unattended session
/// never blocks on input.
pub fn select_prompt(assume_yes: bool) -> Box<dyn Prompt> {
    if assume_yes || !console::user_attended_stderr() {
        Box::new(NonInteractivePrompt { assume_yes })
    } else {
        Box::new(TerminalPrompt::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_interactive_uses_default_answer() {
        let prompt = NonInteractivePrompt { assume_yes: false };
        assert!(!prompt.confirm("overwrite?", false).unwrap());
        assert!(prompt.confirm("overwrite?", true).unwrap());
    }

    #[test]
    fn assume_yes_overrides_default() {
        let prompt = NonInteractivePrompt { assume_yes: true };
        assert!(prompt.confirm("overwrite?", false).unwrap());
    }
}
