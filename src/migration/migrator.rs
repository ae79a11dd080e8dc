//! Migrator - deploy orchestration with compensating rollback
//!
//! One run: resolve the migrations root, apply pending migrations with the
//! external command, decide whether the deploy failed, and if so run the
//! rollback script of the failed migration.
//!
//! Failure is detected two ways:
//! - the command fails at the process level. Prisma does not say which of the
//!   pending migrations broke, so the most recent migration directories are
//!   scanned and the first rollback script found is run. This is a heuristic:
//!   with several migrations pending at once it may pick the wrong one.
//! - the command exits cleanly but `_prisma_migrations` still holds an
//!   unfinished record. The migration is known, so its own script is run.

use crate::config::BackoutConfig;
use crate::connection::PgConnection;
use crate::executor::{execute_script, SqlExecutor};
use crate::history::{find_latest_unfinished, MigrationHistory};
use crate::migration::checksum::{verify_migration_checksum, ChecksumCheck};
use crate::migration::error::FailureSignal;
use crate::migration::locator::locate_rollback;
use crate::migration::runner::{CommandRunner, MigrationRunner};
use crate::migration::scanner::recent_candidates;
use crate::migration::{MigrateError, MigrationResult, Outcome, RollbackOutcome};
use crate::project::resolve_migrations_root;
use std::fs;
use std::path::{Path, PathBuf};

#[cfg(feature = "tracing")]
use crate::tracing_helpers;

/// Default number of recent migrations the fallback rollback considers
pub const DEFAULT_CANDIDATE_LIMIT: usize = 3;

/// Where to find migrations and how far the fallback scan reaches
#[derive(Debug, Clone)]
pub struct MigratorSettings {
    /// Explicit migrations root (relative paths resolve against `search_from`)
    pub migrations_dir: Option<PathBuf>,
    /// Start of the upward `prisma/migrations` search
    pub search_from: PathBuf,
    pub candidate_limit: usize,
}

impl MigratorSettings {
    pub fn new(search_from: impl Into<PathBuf>) -> Self {
        Self {
            migrations_dir: None,
            search_from: search_from.into(),
            candidate_limit: DEFAULT_CANDIDATE_LIMIT,
        }
    }

    #[must_use]
    pub fn migrations_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.migrations_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn candidate_limit(mut self, limit: usize) -> Self {
        self.candidate_limit = limit;
        self
    }
}

/// Lifecycle of a migrator; a migrator runs at most once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigratorState {
    Uninitialized,
    Running,
    Finished(Outcome),
}

/// Deploy orchestrator
///
/// Owns the database connection for its whole lifetime. Call
/// [`Migrator::disconnect`] when done; dropping the migrator releases the
/// connection as well.
pub struct Migrator<C, R> {
    connection: Option<C>,
    runner: R,
    settings: MigratorSettings,
    state: MigratorState,
}

impl MigratorSettings {
    /// Settings from the `[migrations]` section
    ///
    /// Discovery starts from the current directory unless `search_from` is set.
    ///
    /// # Errors
    ///
    /// Returns `MigrateError::Discovery` if the current directory cannot be determined.
    pub fn from_config(config: &BackoutConfig) -> Result<Self, MigrateError> {
        let search_from = match &config.migrations.search_from {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().map_err(|e| {
                MigrateError::Discovery(format!("Cannot determine current directory: {e}"))
            })?,
        };

        let mut settings = Self::new(search_from).candidate_limit(config.migrations.candidate_limit);
        settings.migrations_dir = config.migrations.dir.clone();
        Ok(settings)
    }

    /// Resolve the migrations root these settings point at
    ///
    /// # Errors
    ///
    /// Returns `MigrateError::Discovery` as [`resolve_migrations_root`] does.
    pub fn resolve_root(&self) -> Result<PathBuf, MigrateError> {
        resolve_migrations_root(self.migrations_dir.as_deref(), &self.search_from)
    }
}

impl Migrator<PgConnection, CommandRunner> {
    /// Build the Prisma command runner around an established connection
    ///
    /// The command receives the database URL as `DATABASE_URL`.
    ///
    /// # Errors
    ///
    /// Returns `MigrateError` if the command is empty or the current
    /// directory cannot be determined.
    pub fn from_config(config: &BackoutConfig, connection: PgConnection) -> Result<Self, MigrateError> {
        let runner = CommandRunner::new(&config.migrations.command)?
            .env("DATABASE_URL", config.database.url.clone());
        let settings = MigratorSettings::from_config(config)?;
        Ok(Self::new(connection, runner, settings))
    }
}

impl<C, R> Migrator<C, R> {
    #[must_use]
    pub fn state(&self) -> MigratorState {
        self.state
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Release the database connection
    ///
    /// Safe to call more than once, and whether or not `migrate()` ran.
    pub fn disconnect(&mut self) {
        if self.connection.take().is_some() {
            log::debug!("Database connection released");
        }
    }
}

impl<C, R> Drop for Migrator<C, R> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl<C, R> Migrator<C, R>
where
    C: SqlExecutor + MigrationHistory,
    R: MigrationRunner,
{
    /// Create a migrator that owns `connection`
    pub fn new(connection: C, runner: R, settings: MigratorSettings) -> Self {
        Self {
            connection: Some(connection),
            runner,
            settings,
            state: MigratorState::Uninitialized,
        }
    }

    /// Apply pending migrations, rolling back on failure
    ///
    /// Apply and rollback failures are reported in the returned
    /// `MigrationResult`, never as `Err`.
    ///
    /// # Errors
    ///
    /// - `MigrateError::Discovery` if the migrations root cannot be found
    /// - `MigrateError::AlreadyRun` on a second call
    /// - `MigrateError::Disconnected` after `disconnect()`
    pub fn migrate(&mut self) -> Result<MigrationResult, MigrateError> {
        if self.state != MigratorState::Uninitialized {
            return Err(MigrateError::AlreadyRun);
        }
        let Some(connection) = self.connection.as_ref() else {
            return Err(MigrateError::Disconnected);
        };
        self.state = MigratorState::Running;

        let migrations_root = match self.settings.resolve_root() {
            Ok(root) => root,
            Err(e) => {
                self.state = MigratorState::Finished(Outcome::FailedNoRollbackAttempted);
                return Err(e);
            }
        };

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::deploy_span(&migrations_root).entered();

        let result = match detect_failure(connection, &self.runner, &migrations_root) {
            None => MigrationResult::Succeeded,
            Some(signal) => {
                log::error!("Migration failed: {}", signal.message());
                let rollback = roll_back(
                    connection,
                    &migrations_root,
                    &signal,
                    self.settings.candidate_limit,
                );
                MigrationResult::Failed {
                    error: signal.message().to_string(),
                    rollback: Some(rollback),
                }
            }
        };

        self.state = MigratorState::Finished(result.outcome());
        log::info!("Deploy finished: {:?}", result.outcome());
        Ok(result)
    }
}

/// Run the migrate command and classify the outcome
fn detect_failure<H, R>(history: &H, runner: &R, migrations_root: &Path) -> Option<FailureSignal>
where
    H: MigrationHistory + ?Sized,
    R: MigrationRunner + ?Sized,
{
    match runner.apply(migrations_root) {
        Ok(output) if output.success => {
            // A clean exit can still leave an unfinished history row behind
            find_latest_unfinished(history).map(|record| FailureSignal::InconsistentHistory {
                message: record.failure_message(),
                migration_name: record.migration_name,
                checksum: record.checksum,
            })
        }
        Ok(output) => Some(FailureSignal::Apply {
            message: output.failure_message(),
        }),
        Err(e) => Some(FailureSignal::Apply {
            message: e.to_string(),
        }),
    }
}

/// Resolve the rollback target for `signal` and run its script
fn roll_back<E>(
    executor: &E,
    migrations_root: &Path,
    signal: &FailureSignal,
    candidate_limit: usize,
) -> RollbackOutcome
where
    E: SqlExecutor + ?Sized,
{
    match signal {
        FailureSignal::Apply { .. } => {
            let candidates = recent_candidates(migrations_root, candidate_limit);
            log::info!(
                "Failed migration is unknown, checking recent migrations: {candidates:?}"
            );

            for candidate in &candidates {
                if let Some(script) = locate_rollback(migrations_root, candidate) {
                    return run_rollback(executor, candidate, script);
                }
            }

            log::warn!("No rollback files found among recent migrations");
            RollbackOutcome::NoCandidates {
                scanned: candidates,
            }
        }
        FailureSignal::InconsistentHistory {
            migration_name,
            checksum,
            ..
        } => {
            let Some(script) = locate_rollback(migrations_root, migration_name) else {
                log::warn!("Migration `{migration_name}` has no rollback script");
                return RollbackOutcome::ScriptNotFound {
                    migration: migration_name.clone(),
                };
            };

            if let ChecksumCheck::Mismatch { stored, current } =
                verify_migration_checksum(&migrations_root.join(migration_name), checksum)
            {
                log::warn!(
                    "migration.sql of `{migration_name}` changed since it ran \
                     (recorded {stored}, on disk {current}); rolling back anyway"
                );
            }

            run_rollback(executor, migration_name, script)
        }
    }
}

/// Locate and run the rollback script of a named migration
///
/// Used for manual rollbacks where the migration is given by the operator.
pub fn rollback_migration<E>(
    executor: &E,
    migrations_root: &Path,
    migration_name: &str,
) -> RollbackOutcome
where
    E: SqlExecutor + ?Sized,
{
    match locate_rollback(migrations_root, migration_name) {
        Some(script) => run_rollback(executor, migration_name, script),
        None => RollbackOutcome::ScriptNotFound {
            migration: migration_name.to_string(),
        },
    }
}

fn run_rollback<E>(executor: &E, migration: &str, script: PathBuf) -> RollbackOutcome
where
    E: SqlExecutor + ?Sized,
{
    #[cfg(feature = "tracing")]
    let _span = tracing_helpers::rollback_span(migration).entered();

    log::info!("Rolling back `{migration}` using {}", script.display());

    let sql = match fs::read_to_string(&script) {
        Ok(sql) => sql,
        Err(e) => {
            let error = format!("Failed to read rollback script {}: {e}", script.display());
            log::error!("{error}");
            return RollbackOutcome::Failed {
                migration: migration.to_string(),
                script,
                error,
            };
        }
    };

    match execute_script(executor, &sql) {
        Ok(statements) => {
            log::info!("Rolled back `{migration}` ({statements} statement(s))");
            RollbackOutcome::Completed {
                migration: migration.to_string(),
                script,
                statements,
            }
        }
        Err(e) => {
            log::error!("Rollback of `{migration}` failed: {e}");
            RollbackOutcome::Failed {
                migration: migration.to_string(),
                script,
                error: e.to_string(),
            }
        }
    }
}
