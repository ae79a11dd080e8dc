//! External migration-apply command
//!
//! The forward migration is owned by Prisma; this module only starts the
//! command and collects its exit status and output streams.

use crate::project::project_root;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Exit status and captured streams of one migrate command run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    /// Exit code, `None` when terminated by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Diagnostic text for a failed run: stderr, or the exit status when stderr is blank
    #[must_use]
    pub fn failure_message(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        match self.code {
            Some(code) => format!("Migration command exited with status {code}"),
            None => "Migration command was terminated by a signal".to_string(),
        }
    }
}

/// Runner error type
#[derive(Debug)]
pub enum RunnerError {
    /// No program configured
    EmptyCommand,
    /// The program could not be started
    Spawn {
        program: String,
        source: std::io::Error,
    },
}

impl fmt::Display for RunnerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunnerError::EmptyCommand => write!(f, "No migration command configured"),
            RunnerError::Spawn { program, source } => {
                write!(f, "Failed to start migration command `{program}`: {source}")
            }
        }
    }
}

impl std::error::Error for RunnerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RunnerError::Spawn { source, .. } => Some(source),
            RunnerError::EmptyCommand => None,
        }
    }
}

/// Applies pending migrations
pub trait MigrationRunner {
    /// Apply every pending migration under `migrations_root`
    ///
    /// # Errors
    ///
    /// Returns `RunnerError` if the command cannot be invoked at all. A
    /// command that runs and fails is an `Ok` with `success == false`.
    fn apply(&self, migrations_root: &Path) -> Result<CommandOutput, RunnerError>;
}

/// Runs the migrate command as a subprocess
#[derive(Debug, Clone)]
pub struct CommandRunner {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    envs: Vec<(String, String)>,
}

impl CommandRunner {
    /// Create a runner from an argument vector, e.g. `["npx", "prisma", "migrate", "deploy"]`
    ///
    /// # Errors
    ///
    /// Returns `RunnerError::EmptyCommand` if `command` is empty.
    pub fn new(command: &[String]) -> Result<Self, RunnerError> {
        let (program, args) = command.split_first().ok_or(RunnerError::EmptyCommand)?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            working_dir: None,
            envs: Vec::new(),
        })
    }

    /// Run in `dir` instead of the project root derived from the migrations root
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set an environment variable for the command
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// The command line, for logging
    #[must_use]
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl MigrationRunner for CommandRunner {
    fn apply(&self, migrations_root: &Path) -> Result<CommandOutput, RunnerError> {
        let cwd = self
            .working_dir
            .clone()
            .unwrap_or_else(|| project_root(migrations_root));

        log::info!("Running `{}` in {}", self.display(), cwd.display());

        let output = Command::new(&self.program)
            .args(&self.args)
            .current_dir(&cwd)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .output()
            .map_err(|source| RunnerError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let result = CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        for line in result.stdout.lines().filter(|l| !l.trim().is_empty()) {
            log::info!("{line}");
        }

        Ok(result)
    }
}
