//! Interactive yes/no confirmation.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};

/// Asks the user to approve a destructive action.
pub trait Confirm {
    /// Show `details` then `question`; true only on an explicit yes.
    fn confirm(&self, question: &str, details: &[String]) -> Result<bool>;
}

/// Prompts on stdout and reads one line from stdin.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&self, question: &str, details: &[String]) -> Result<bool> {
        let mut out = io::stdout().lock();
        for line in details {
            writeln!(out, "  - {line}").context("write prompt")?;
        }
        write!(out, "{question} [y/N] ").context("write prompt")?;
        out.flush().context("flush prompt")?;

        let mut answer = String::new();
        io::stdin()
            .lock()
            .read_line(&mut answer)
            .context("read confirmation")?;
        Ok(is_yes(&answer))
    }
}

pub fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
