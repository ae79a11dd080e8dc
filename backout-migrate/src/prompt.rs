//! Interactive confirmation before touching the database

use std::io::{self, BufRead, IsTerminal, Write};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("stdin is not a terminal; pass --yes to run without confirmation")]
    NotInteractive,
    #[error("aborted by user")]
    Declined,
    #[error("failed to read confirmation: {0}")]
    Io(#[from] io::Error),
}

/// Check whether an answer confirms (`y` or `yes`, any case)
#[must_use]
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Ask `question` on stdout and read one line of `input`
///
/// # Errors
///
/// `PromptError::Declined` unless the answer is affirmative.
pub fn ask<R: BufRead, W: Write>(question: &str, input: &mut R, output: &mut W) -> Result<(), PromptError> {
    write!(output, "{question} [y/N] ")?;
    output.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;

    if is_affirmative(&answer) {
        Ok(())
    } else {
        Err(PromptError::Declined)
    }
}

/// Confirm on the terminal unless `assume_yes`
///
/// # Errors
///
/// `PromptError::NotInteractive` when stdin is not a terminal, otherwise as [`ask`].
pub fn confirm(question: &str, assume_yes: bool) -> Result<(), PromptError> {
    if assume_yes {
        return Ok(());
    }
    let stdin = io::stdin();
    if !stdin.is_terminal() {
        return Err(PromptError::NotInteractive);
    }
    ask(question, &mut stdin.lock(), &mut io::stdout())
}
