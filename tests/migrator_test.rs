//! Deploy orchestration tests
//!
//! The database and the Prisma command are replaced by in-memory fakes; the
//! migrations directory is a real temporary Prisma project layout.

use backout::migration::{
    CommandOutput, MigrateError, MigrationRunner, Migrator, MigratorSettings, MigratorState,
    Outcome, RollbackOutcome, RunnerError,
};
use backout::{DbError, FailedMigrationRecord, MigrationHistory, MigrationResult, SqlExecutor};
use chrono::{TimeZone, Utc};
use serde_json::json;
use std::cell::{Cell, RefCell};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::TempDir;

enum History {
    Clean,
    Unfinished(FailedMigrationRecord),
    Broken,
}

/// Shared view of what the fake database saw
#[derive(Default, Clone)]
struct Observed {
    executed: Rc<RefCell<Vec<String>>>,
    history_queries: Rc<Cell<usize>>,
    released: Rc<Cell<bool>>,
    applied_in: Rc<RefCell<Option<PathBuf>>>,
}

struct FakeDatabase {
    history: History,
    fail_on: Option<&'static str>,
    observed: Observed,
}

impl SqlExecutor for FakeDatabase {
    fn execute(&self, sql: &str) -> Result<u64, DbError> {
        self.observed.executed.borrow_mut().push(sql.to_string());
        match self.fail_on {
            Some(marker) if sql.contains(marker) => Err(DbError::QueryError(format!(
                "relation \"{marker}\" does not exist"
            ))),
            _ => Ok(0),
        }
    }
}

impl MigrationHistory for FakeDatabase {
    fn latest_unfinished(&self) -> Result<Option<FailedMigrationRecord>, DbError> {
        self.observed
            .history_queries
            .set(self.observed.history_queries.get() + 1);
        match &self.history {
            History::Clean => Ok(None),
            History::Unfinished(record) => Ok(Some(record.clone())),
            History::Broken => Err(DbError::QueryError(
                "relation \"_prisma_migrations\" does not exist".to_string(),
            )),
        }
    }
}

impl Drop for FakeDatabase {
    fn drop(&mut self) {
        self.observed.released.set(true);
    }
}

enum FakeRunner {
    Exit { success: bool, stderr: &'static str },
    SpawnFailure,
}

struct RecordingRunner {
    behaviour: FakeRunner,
    observed: Observed,
}

impl MigrationRunner for RecordingRunner {
    fn apply(&self, migrations_root: &Path) -> Result<CommandOutput, RunnerError> {
        *self.observed.applied_in.borrow_mut() = Some(migrations_root.to_path_buf());
        match &self.behaviour {
            FakeRunner::Exit { success, stderr } => Ok(CommandOutput {
                success: *success,
                code: Some(if *success { 0 } else { 1 }),
                stdout: "Applying migrations".to_string(),
                stderr: (*stderr).to_string(),
            }),
            FakeRunner::SpawnFailure => Err(RunnerError::Spawn {
                program: "npx".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "program not found"),
            }),
        }
    }
}

/// Temporary Prisma project with `prisma/migrations`
struct Project {
    dir: TempDir,
}

impl Project {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("prisma").join("migrations")).unwrap();
        fs::write(
            dir.path().join("prisma").join("migrations").join("migration_lock.toml"),
            "provider = \"postgresql\"\n",
        )
        .unwrap();
        Self { dir }
    }

    fn migrations_root(&self) -> PathBuf {
        self.dir.path().join("prisma").join("migrations")
    }

    fn migration(&self, name: &str, rollback: Option<&str>) -> &Self {
        let dir = self.migrations_root().join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("migration.sql"), "ALTER TABLE users ADD COLUMN age int;").unwrap();
        if let Some(sql) = rollback {
            fs::write(dir.join("down.rollback.sql"), sql).unwrap();
        }
        self
    }

    fn migrator(
        &self,
        history: History,
        behaviour: FakeRunner,
        fail_on: Option<&'static str>,
    ) -> (Migrator<FakeDatabase, RecordingRunner>, Observed) {
        let observed = Observed::default();
        let database = FakeDatabase {
            history,
            fail_on,
            observed: observed.clone(),
        };
        let runner = RecordingRunner {
            behaviour,
            observed: observed.clone(),
        };
        let migrator = Migrator::new(database, runner, MigratorSettings::new(self.dir.path()));
        (migrator, observed)
    }
}

fn unfinished(name: &str, logs: Option<&str>) -> FailedMigrationRecord {
    FailedMigrationRecord {
        id: "2b0a6c7e-5d1f-4c1e-9b7a-0d6f3e8c1a42".to_string(),
        checksum: "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08".to_string(),
        migration_name: name.to_string(),
        started_at: Utc.with_ymd_and_hms(2024, 1, 5, 9, 30, 0).unwrap(),
        finished_at: None,
        logs: logs.map(str::to_string),
        rolled_back_at: None,
        applied_steps_count: 0,
    }
}

fn command_fails(stderr: &'static str) -> FakeRunner {
    FakeRunner::Exit {
        success: false,
        stderr,
    }
}

fn command_succeeds() -> FakeRunner {
    FakeRunner::Exit {
        success: true,
        stderr: "",
    }
}

#[test]
fn test_clean_deploy_reports_only_success() {
    let project = Project::new();
    project.migration("20240101000000_init", Some("DROP TABLE users;"));
    let (mut migrator, observed) = project.migrator(History::Clean, command_succeeds(), None);

    let result = migrator.migrate().unwrap();

    assert_eq!(result, MigrationResult::Succeeded);
    assert_eq!(serde_json::to_value(&result).unwrap(), json!({ "success": true }));
    assert!(observed.executed.borrow().is_empty());
    assert_eq!(observed.history_queries.get(), 1);
    assert_eq!(
        observed.applied_in.borrow().as_deref(),
        Some(project.migrations_root().as_path())
    );
    assert_eq!(migrator.state(), MigratorState::Finished(Outcome::Succeeded));
}

#[test]
fn test_command_failure_without_conforming_directories() {
    let project = Project::new();
    fs::create_dir_all(project.migrations_root().join("readme")).unwrap();
    let (mut migrator, observed) = project.migrator(History::Clean, command_fails("P3009"), None);

    let result = migrator.migrate().unwrap();

    assert_eq!(
        serde_json::to_value(&result).unwrap(),
        json!({
            "success": false,
            "error": "P3009",
            "rolledBack": false,
            "rollbackError": "No rollback files found"
        })
    );
    assert!(observed.executed.borrow().is_empty());
    assert_eq!(
        migrator.state(),
        MigratorState::Finished(Outcome::FailedNoRollbackAttempted)
    );
}

#[test]
fn test_unfinished_history_rolls_back_named_migration() {
    let project = Project::new();
    project
        .migration(
            "20240105_add_col",
            Some("ALTER TABLE users DROP COLUMN age;\nDROP INDEX users_age_idx;"),
        )
        .migration("20240106_later", Some("DROP TABLE later;"));
    let history = History::Unfinished(unfinished("20240105_add_col", Some("constraint violation")));
    let (mut migrator, observed) = project.migrator(history, command_succeeds(), None);

    let result = migrator.migrate().unwrap();

    assert_eq!(
        serde_json::to_value(&result).unwrap(),
        json!({ "success": false, "error": "constraint violation", "rolledBack": true })
    );
    // Targeted path: the newer migration's script is not considered
    assert_eq!(
        *observed.executed.borrow(),
        vec!["ALTER TABLE users DROP COLUMN age", "DROP INDEX users_age_idx"]
    );
    match result.rollback() {
        Some(RollbackOutcome::Completed {
            migration,
            statements,
            ..
        }) => {
            assert_eq!(migration, "20240105_add_col");
            assert_eq!(*statements, 2);
        }
        other => panic!("expected completed rollback, got {other:?}"),
    }
    assert_eq!(
        migrator.state(),
        MigratorState::Finished(Outcome::FailedRollbackSucceeded)
    );
}

#[test]
fn test_unfinished_history_without_script_reports_no_rollback_error() {
    let project = Project::new();
    project
        .migration("20240105_add_col", None)
        .migration("20240104_other", Some("DROP TABLE other;"));
    let history = History::Unfinished(unfinished("20240105_add_col", Some("constraint violation")));
    let (mut migrator, observed) = project.migrator(history, command_succeeds(), None);

    let result = migrator.migrate().unwrap();

    assert!(!result.success());
    assert_eq!(result.error(), Some("constraint violation"));
    assert_eq!(result.rolled_back(), Some(false));
    assert_eq!(result.rollback_error(), None);
    assert!(observed.executed.borrow().is_empty());
}

#[test]
fn test_unfinished_history_without_logs_names_migration() {
    let project = Project::new();
    project.migration("20240105_add_col", Some("SELECT 1;"));
    let history = History::Unfinished(unfinished("20240105_add_col", None));
    let (mut migrator, _observed) = project.migrator(history, command_succeeds(), None);

    let result = migrator.migrate().unwrap();

    let error = result.error().unwrap();
    assert!(error.contains("20240105_add_col"));
    assert_eq!(result.rolled_back(), Some(true));
}

#[test]
fn test_command_failure_runs_newest_available_rollback() {
    let project = Project::new();
    project
        .migration("20240101000000_a", Some("DROP TABLE a;"))
        .migration("20240102000000_b", None);
    let (mut migrator, observed) = project.migrator(History::Clean, command_fails("P3018"), None);

    let result = migrator.migrate().unwrap();

    assert_eq!(result.error(), Some("P3018"));
    assert_eq!(result.rolled_back(), Some(true));
    assert_eq!(result.rollback().and_then(|r| r.migration()), Some("20240101000000_a"));
    assert_eq!(*observed.executed.borrow(), vec!["DROP TABLE a"]);
}

#[test]
fn test_command_failure_does_not_consult_history() {
    let project = Project::new();
    project.migration("20240102000000_b", Some("DROP TABLE b;"));
    let history = History::Unfinished(unfinished("20240101000000_a", Some("boom")));
    let (mut migrator, observed) = project.migrator(history, command_fails("P3009"), None);

    let result = migrator.migrate().unwrap();

    assert_eq!(result.error(), Some("P3009"));
    assert_eq!(observed.history_queries.get(), 0);
    assert_eq!(*observed.executed.borrow(), vec!["DROP TABLE b"]);
}

#[test]
fn test_fallback_scan_is_bounded() {
    let project = Project::new();
    project
        .migration("20240101000000_a", Some("DROP TABLE a;"))
        .migration("20240102000000_b", None)
        .migration("20240103000000_c", None)
        .migration("20240104000000_d", None);
    let (mut migrator, observed) = project.migrator(History::Clean, command_fails("P3009"), None);

    let result = migrator.migrate().unwrap();

    assert_eq!(result.rolled_back(), Some(false));
    assert_eq!(result.rollback_error(), Some("No rollback files found"));
    match result.rollback() {
        Some(RollbackOutcome::NoCandidates { scanned }) => assert_eq!(
            scanned,
            &vec![
                "20240104000000_d".to_string(),
                "20240103000000_c".to_string(),
                "20240102000000_b".to_string()
            ]
        ),
        other => panic!("expected no candidates, got {other:?}"),
    }
    assert!(observed.executed.borrow().is_empty());
}

#[test]
fn test_failed_rollback_preserves_original_error() {
    let project = Project::new();
    project.migration(
        "20240105_add_col",
        Some("ALTER TABLE users DROP COLUMN age; DROP TABLE missing_table; DROP TABLE never_run;"),
    );
    let history = History::Unfinished(unfinished("20240105_add_col", Some("constraint violation")));
    let (mut migrator, observed) =
        project.migrator(history, command_succeeds(), Some("missing_table"));

    let result = migrator.migrate().unwrap();

    assert_eq!(result.error(), Some("constraint violation"));
    assert_eq!(result.rolled_back(), Some(false));
    let rollback_error = result.rollback_error().unwrap();
    assert!(rollback_error.contains("missing_table"));
    // No transaction: the first statement stays applied, the third never runs
    assert_eq!(
        *observed.executed.borrow(),
        vec!["ALTER TABLE users DROP COLUMN age", "DROP TABLE missing_table"]
    );
    assert_eq!(
        migrator.state(),
        MigratorState::Finished(Outcome::FailedRollbackFailed)
    );
}

#[test]
fn test_spawn_failure_is_treated_as_command_failure() {
    let project = Project::new();
    project.migration("20240101000000_a", Some("DROP TABLE a;"));
    let (mut migrator, observed) = project.migrator(History::Clean, FakeRunner::SpawnFailure, None);

    let result = migrator.migrate().unwrap();

    assert!(!result.success());
    assert!(result.error().unwrap().contains("program not found"));
    assert_eq!(result.rolled_back(), Some(true));
    assert_eq!(*observed.executed.borrow(), vec!["DROP TABLE a"]);
}

#[test]
fn test_history_query_failure_does_not_fail_deploy() {
    let project = Project::new();
    let (mut migrator, _observed) = project.migrator(History::Broken, command_succeeds(), None);

    assert_eq!(migrator.migrate().unwrap(), MigrationResult::Succeeded);
}

#[test]
fn test_migrator_is_single_use() {
    let project = Project::new();
    let (mut migrator, _observed) = project.migrator(History::Clean, command_succeeds(), None);

    migrator.migrate().unwrap();
    assert!(matches!(migrator.migrate(), Err(MigrateError::AlreadyRun)));
}

#[test]
fn test_disconnect_is_idempotent_and_blocks_migrate() {
    let project = Project::new();
    let (mut migrator, observed) = project.migrator(History::Clean, command_succeeds(), None);

    migrator.disconnect();
    assert!(observed.released.get());
    assert!(!migrator.is_connected());
    migrator.disconnect();

    assert!(matches!(migrator.migrate(), Err(MigrateError::Disconnected)));
    assert!(observed.applied_in.borrow().is_none());
}

#[test]
fn test_connection_released_on_drop() {
    let project = Project::new();
    let (mut migrator, observed) = project.migrator(History::Clean, command_fails("P3009"), None);

    migrator.migrate().unwrap();
    assert!(!observed.released.get());
    drop(migrator);
    assert!(observed.released.get());
}

#[test]
fn test_missing_migrations_directory_is_discovery_error() {
    let dir = TempDir::new().unwrap();
    let observed = Observed::default();
    let database = FakeDatabase {
        history: History::Clean,
        fail_on: None,
        observed: observed.clone(),
    };
    let runner = RecordingRunner {
        behaviour: command_succeeds(),
        observed: observed.clone(),
    };
    let settings = MigratorSettings::new(dir.path()).migrations_dir("prisma/migrations");
    let mut migrator = Migrator::new(database, runner, settings);

    assert!(matches!(migrator.migrate(), Err(MigrateError::Discovery(_))));
    assert!(observed.applied_in.borrow().is_none());
    assert!(observed.executed.borrow().is_empty());
    assert!(matches!(migrator.migrate(), Err(MigrateError::AlreadyRun)));
}
