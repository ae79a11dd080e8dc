//! History Inspector
//!
//! Reads `_prisma_migrations`, the history table owned by Prisma's migration
//! runner. This crate never writes to it. A row with `started_at` set and
//! `finished_at` NULL is the in-database signal of a failed or interrupted
//! migration.

use crate::executor::DbError;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Name of the history table maintained by the external runner
pub const HISTORY_TABLE: &str = "_prisma_migrations";

/// Most recent unfinished record, newest `started_at` first
pub const LATEST_UNFINISHED_SQL: &str = r#"
    SELECT id, checksum, migration_name, started_at, finished_at, logs,
           rolled_back_at, applied_steps_count
    FROM _prisma_migrations
    WHERE finished_at IS NULL
    ORDER BY started_at DESC
    LIMIT 1
"#;

/// A row of `_prisma_migrations` whose migration did not finish
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedMigrationRecord {
    pub id: String,
    /// `SHA-256` of the migration's `migration.sql` as recorded by the runner
    pub checksum: String,
    /// Directory name of the migration under the migrations root
    pub migration_name: String,
    pub started_at: DateTime<Utc>,
    /// Always `None` for records returned by the inspector
    pub finished_at: Option<DateTime<Utc>>,
    /// Runner's failure output, if any
    pub logs: Option<String>,
    pub rolled_back_at: Option<DateTime<Utc>>,
    pub applied_steps_count: i32,
}

impl FailedMigrationRecord {
    /// Create a `FailedMigrationRecord` from a database row
    ///
    /// Expected columns: `id`, `checksum`, `migration_name`, `started_at`,
    /// `finished_at`, `logs`, `rolled_back_at`, `applied_steps_count`
    ///
    /// # Errors
    ///
    /// Returns `DbError::ParseError` if a column is missing or has an unexpected type.
    pub fn from_row(row: &may_postgres::Row) -> Result<Self, DbError> {
        fn column<'a, T: may_postgres::types::FromSql<'a>>(
            row: &'a may_postgres::Row,
            name: &str,
        ) -> Result<T, DbError> {
            row.try_get(name)
                .map_err(|e| DbError::ParseError(format!("column `{name}`: {e}")))
        }

        Ok(Self {
            id: column(row, "id")?,
            checksum: column(row, "checksum")?,
            migration_name: column(row, "migration_name")?,
            started_at: column(row, "started_at")?,
            finished_at: column(row, "finished_at")?,
            logs: column(row, "logs")?,
            rolled_back_at: column(row, "rolled_back_at")?,
            applied_steps_count: column(row, "applied_steps_count")?,
        })
    }

    /// Failure text for the run result: the runner's logs, or a generated message
    #[must_use]
    pub fn failure_message(&self) -> String {
        match self.logs.as_deref().map(str::trim) {
            Some(logs) if !logs.is_empty() => logs.to_string(),
            _ => format!(
                "Migration `{}` started at {} but never finished",
                self.migration_name,
                self.started_at.format("%Y-%m-%d %H:%M:%S")
            ),
        }
    }
}

/// Source of migration-history records
pub trait MigrationHistory {
    /// Most recent record with `finished_at` absent
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the query fails, including when the table does not exist yet.
    fn latest_unfinished(&self) -> Result<Option<FailedMigrationRecord>, DbError>;
}

impl<T: MigrationHistory + ?Sized> MigrationHistory for &T {
    fn latest_unfinished(&self) -> Result<Option<FailedMigrationRecord>, DbError> {
        (**self).latest_unfinished()
    }
}

/// Find the most recent unfinished migration, if one can be determined
///
/// The check is advisory: a failing query (no connection, history table not
/// created yet on a fresh database) is logged and reported as `None`.
pub fn find_latest_unfinished<H: MigrationHistory + ?Sized>(
    history: &H,
) -> Option<FailedMigrationRecord> {
    match history.latest_unfinished() {
        Ok(Some(record)) => {
            log::warn!(
                "Found unfinished migration `{}` (started {})",
                record.migration_name,
                record.started_at
            );
            Some(record)
        }
        Ok(None) => {
            log::debug!("No unfinished migrations in {HISTORY_TABLE}");
            None
        }
        Err(e) => {
            log::warn!("Could not inspect {HISTORY_TABLE}, assuming no unfinished migration: {e}");
            None
        }
    }
}
