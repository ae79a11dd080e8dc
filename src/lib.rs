//! # Backout
//!
//! Unattended Prisma migration deploys with automatic compensating rollback.
//!
//! The engine runs `prisma migrate deploy`, decides whether the deploy left the
//! database in a failed state (non-zero exit, or an unfinished row in
//! `_prisma_migrations`), and if so runs the author-provided `*rollback.sql`
//! script for the offending migration. See [`migration::Migrator`].

pub mod config;
pub mod connection;
pub mod executor;
pub mod history;
pub mod migration;
pub mod project;
#[cfg(feature = "tracing")]
pub mod tracing_helpers;

pub use config::BackoutConfig;
pub use connection::{connect, ConnectionError, PgConnection};
pub use executor::{execute_script, split_statements, DbError, ExecutionError, SqlExecutor};
pub use history::{find_latest_unfinished, FailedMigrationRecord, MigrationHistory};
pub use migration::{
    deploy_with_rollback, MigrateError, MigrationResult, Migrator, Outcome, RollbackOutcome,
};
