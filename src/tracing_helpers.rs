//! Span constructors used when the `tracing` feature is enabled.

use tracing::{info_span, Span};

/// Span covering one `Migrator::migrate()` run
pub fn deploy_span(migrations_root: &std::path::Path) -> Span {
    info_span!("backout.deploy", migrations_root = %migrations_root.display())
}

/// Span covering a rollback attempt for one migration
pub fn rollback_span(migration: &str) -> Span {
    info_span!("backout.rollback", migration = migration)
}

/// Span covering a single rollback statement
pub fn rollback_statement_span(index: usize, statement: &str) -> Span {
    // Keep span fields small; statements can be arbitrarily long.
    let preview: String = statement.chars().take(80).collect();
    info_span!("backout.rollback_statement", index = index, statement = %preview)
}
