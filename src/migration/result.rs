//! Deploy outcome types

use serde::{Serialize, Serializer};
use std::path::PathBuf;

/// `rollbackError` reported when the fallback scan finds no script at all
pub const NO_ROLLBACK_FILES: &str = "No rollback files found";

/// What happened when a compensating rollback was looked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// The script ran to the end
    Completed {
        migration: String,
        script: PathBuf,
        statements: usize,
    },
    /// The failed migration is known but ships no rollback script
    ScriptNotFound { migration: String },
    /// The failed migration is unknown and none of the recent candidates ships a script
    NoCandidates { scanned: Vec<String> },
    /// The script was found but could not be read or a statement failed
    Failed {
        migration: String,
        script: PathBuf,
        error: String,
    },
}

impl RollbackOutcome {
    /// Migration whose script was (or would have been) run
    #[must_use]
    pub fn migration(&self) -> Option<&str> {
        match self {
            RollbackOutcome::Completed { migration, .. }
            | RollbackOutcome::ScriptNotFound { migration }
            | RollbackOutcome::Failed { migration, .. } => Some(migration),
            RollbackOutcome::NoCandidates { .. } => None,
        }
    }
}

/// Terminal state of a single `migrate()` run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    FailedNoRollbackAttempted,
    FailedRollbackSucceeded,
    FailedRollbackFailed,
}

/// Outcome of one deploy run
///
/// Serializes to `{success, error?, rolledBack?, rollbackError?}` with absent
/// fields omitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationResult {
    /// The command succeeded and no history record was left unfinished
    Succeeded,
    /// The deploy failed; `error` is the original diagnostic, never replaced
    /// by a rollback failure
    Failed {
        error: String,
        rollback: Option<RollbackOutcome>,
    },
}

impl MigrationResult {
    #[must_use]
    pub fn success(&self) -> bool {
        matches!(self, MigrationResult::Succeeded)
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            MigrationResult::Succeeded => None,
            MigrationResult::Failed { error, .. } => Some(error),
        }
    }

    #[must_use]
    pub fn rollback(&self) -> Option<&RollbackOutcome> {
        match self {
            MigrationResult::Succeeded => None,
            MigrationResult::Failed { rollback, .. } => rollback.as_ref(),
        }
    }

    /// `Some(true)` only when a rollback script ran cleanly
    #[must_use]
    pub fn rolled_back(&self) -> Option<bool> {
        self.rollback()
            .map(|outcome| matches!(outcome, RollbackOutcome::Completed { .. }))
    }

    #[must_use]
    pub fn rollback_error(&self) -> Option<&str> {
        match self.rollback()? {
            RollbackOutcome::Failed { error, .. } => Some(error),
            RollbackOutcome::NoCandidates { .. } => Some(NO_ROLLBACK_FILES),
            RollbackOutcome::Completed { .. } | RollbackOutcome::ScriptNotFound { .. } => None,
        }
    }

    #[must_use]
    pub fn outcome(&self) -> Outcome {
        match self {
            MigrationResult::Succeeded => Outcome::Succeeded,
            MigrationResult::Failed { rollback, .. } => match rollback {
                None
                | Some(RollbackOutcome::ScriptNotFound { .. })
                | Some(RollbackOutcome::NoCandidates { .. }) => Outcome::FailedNoRollbackAttempted,
                Some(RollbackOutcome::Completed { .. }) => Outcome::FailedRollbackSucceeded,
                Some(RollbackOutcome::Failed { .. }) => Outcome::FailedRollbackFailed,
            },
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Report<'a> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rolled_back: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rollback_error: Option<&'a str>,
}

impl Serialize for MigrationResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Report {
            success: self.success(),
            error: self.error(),
            rolled_back: self.rolled_back(),
            rollback_error: self.rollback_error(),
        }
        .serialize(serializer)
    }
}
