//! Migration-specific error types

use crate::connection::ConnectionError;
use crate::migration::runner::RunnerError;
use std::fmt;

/// Errors that escape `Migrator::migrate()`
///
/// Everything that goes wrong while applying or rolling back is reported in
/// the returned `MigrationResult`; these cover misconfiguration and misuse.
#[derive(Debug)]
pub enum MigrateError {
    /// Migrations root could not be located
    Discovery(String),
    /// `migrate()` was already called on this migrator
    AlreadyRun,
    /// `migrate()` was called after `disconnect()`
    Disconnected,
    /// The database could not be reached when building the migrator
    Connection(ConnectionError),
    /// The migrate command is misconfigured
    Command(RunnerError),
    /// The coroutine driving the run panicked
    Aborted(String),
}

impl fmt::Display for MigrateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrateError::Discovery(msg) => {
                write!(
                    f,
                    "Migrations directory not found: {msg}\n\
                     Suggestion: run from the project root or pass --migrations-dir"
                )
            }
            MigrateError::AlreadyRun => {
                write!(
                    f,
                    "This migrator has already run; create a new one for another deploy"
                )
            }
            MigrateError::Disconnected => {
                write!(f, "Cannot migrate: the database connection was already released")
            }
            MigrateError::Connection(e) => write!(f, "Database connection failed: {e}"),
            MigrateError::Command(e) => write!(f, "{e}"),
            MigrateError::Aborted(msg) => write!(f, "Deploy aborted: {msg}"),
        }
    }
}

impl std::error::Error for MigrateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MigrateError::Connection(e) => Some(e),
            MigrateError::Command(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConnectionError> for MigrateError {
    fn from(error: ConnectionError) -> Self {
        MigrateError::Connection(error)
    }
}

impl From<RunnerError> for MigrateError {
    fn from(error: RunnerError) -> Self {
        MigrateError::Command(error)
    }
}

/// Why a deploy is considered failed
///
/// Internal classification; both variants end up as `MigrationResult::error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FailureSignal {
    /// The migrate command failed at the process level; the failing migration is unknown
    Apply { message: String },
    /// The command exited cleanly but left an unfinished history record
    InconsistentHistory {
        migration_name: String,
        checksum: String,
        message: String,
    },
}

impl FailureSignal {
    pub(crate) fn message(&self) -> &str {
        match self {
            FailureSignal::Apply { message } | FailureSignal::InconsistentHistory { message, .. } => {
                message
            }
        }
    }
}
