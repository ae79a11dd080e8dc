//! Human-readable rendering of deploy, rollback and status results

use backout::migration::{MigrationResult, RollbackOutcome};
use backout::FailedMigrationRecord;
use colored::Colorize;
use std::fmt::Write;
use std::path::Path;

/// Render the outcome of `deploy`
#[must_use]
pub fn deploy(result: &MigrationResult) -> String {
    let mut out = String::new();
    match result {
        MigrationResult::Succeeded => {
            let _ = writeln!(out, "{}", "✅ Migrations applied successfully".green());
        }
        MigrationResult::Failed {
            error,
            rollback: attempt,
        } => {
            let _ = writeln!(out, "{}", "❌ Migration failed".red().bold());
            for line in error.lines() {
                let _ = writeln!(out, "   {line}");
            }
            match attempt {
                Some(outcome) => out.push_str(&rollback(outcome)),
                None => {
                    let _ = writeln!(out, "{}", "⚠️  No rollback was attempted".yellow());
                }
            }
        }
    }
    out
}

/// Render one rollback attempt
#[must_use]
pub fn rollback(outcome: &RollbackOutcome) -> String {
    let mut out = String::new();
    match outcome {
        RollbackOutcome::Completed {
            migration,
            script,
            statements,
        } => {
            let _ = writeln!(
                out,
                "{} {} ({} statement(s) from {})",
                "↩️  Rolled back".green(),
                migration.bold(),
                statements,
                script.display()
            );
        }
        RollbackOutcome::ScriptNotFound { migration } => {
            let _ = writeln!(
                out,
                "{} {}",
                "⚠️  No rollback script for".yellow(),
                migration.bold()
            );
        }
        RollbackOutcome::NoCandidates { scanned } => {
            let _ = writeln!(out, "{}", "⚠️  No rollback files found".yellow());
            if !scanned.is_empty() {
                let _ = writeln!(out, "   Checked: {}", scanned.join(", "));
            }
        }
        RollbackOutcome::Failed {
            migration,
            script,
            error,
        } => {
            let _ = writeln!(
                out,
                "{} {} ({})",
                "❌ Rollback failed for".red().bold(),
                migration.bold(),
                script.display()
            );
            let _ = writeln!(out, "   {error}");
        }
    }
    out
}

/// Render the latest unfinished history record, if any
#[must_use]
pub fn status(migrations_root: &Path, record: Option<&FailedMigrationRecord>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "📋 Migration Status");
    let _ = writeln!(out, "   Migrations: {}", migrations_root.display());

    let Some(record) = record else {
        let _ = writeln!(out, "{}", "✅ No unfinished migrations".green());
        return out;
    };

    let _ = writeln!(
        out,
        "{} {}",
        "❌ Unfinished migration:".red().bold(),
        record.migration_name.bold()
    );
    let _ = writeln!(out, "   Started: {}", record.started_at.to_rfc3339());
    let _ = writeln!(out, "   Applied steps: {}", record.applied_steps_count);
    if let Some(rolled_back_at) = record.rolled_back_at {
        let _ = writeln!(out, "   Marked rolled back: {}", rolled_back_at.to_rfc3339());
    }
    let _ = writeln!(out, "   {}", record.failure_message());
    out
}

/// Render the fallback candidates with whether each ships a rollback script
#[must_use]
pub fn candidates(migrations_root: &Path, names: &[String]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "📋 Rollback candidates (newest first)");
    if names.is_empty() {
        let _ = writeln!(out, "   No migration directories found");
        return out;
    }
    for name in names {
        match backout::migration::locate_rollback(migrations_root, name) {
            Some(script) => {
                let file = script
                    .file_name()
                    .map(|f| f.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let _ = writeln!(out, "   {} {name} ({file})", "✓".green());
            }
            None => {
                let _ = writeln!(out, "   {} {name}", "✗".red());
            }
        }
    }
    out
}
