//! One-call deploy helper for pipelines and application startup

use crate::config::BackoutConfig;
use crate::connection::connect;
use crate::migration::{MigrateError, MigrationResult, Migrator, MigratorSettings};
use std::any::Any;

/// Deploy pending migrations with automatic rollback
///
/// Resolves the migrations root, connects, runs one `migrate()` inside a
/// `may` coroutine and always releases the connection before returning,
/// whatever the outcome.
///
/// An unreachable database is a failed deploy: the result carries the
/// connection error and no rollback is attempted.
///
/// # Errors
///
/// Returns `MigrateError` for configuration and discovery problems. A failed
/// deploy is an `Ok` result with `success() == false`.
///
/// # Example
///
/// ```rust,no_run
/// use backout::{deploy_with_rollback, BackoutConfig};
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = BackoutConfig::load()?;
///     let result = deploy_with_rollback(&config)?;
///     if !result.success() {
///         std::process::exit(1);
///     }
///     Ok(())
/// }
/// ```
pub fn deploy_with_rollback(config: &BackoutConfig) -> Result<MigrationResult, MigrateError> {
    let config = config.clone();

    let handle = may::go!(move || -> Result<MigrationResult, MigrateError> {
        let migrations_root = MigratorSettings::from_config(&config)?.resolve_root()?;

        let connection = match connect(&config.database.url) {
            Ok(connection) => connection,
            Err(e) => {
                log::error!("Cannot reach the database: {e}");
                return Ok(MigrationResult::Failed {
                    error: e.to_string(),
                    rollback: None,
                });
            }
        };

        let mut migrator = Migrator::from_config(&config, connection)?;
        log::debug!("Deploying migrations from {}", migrations_root.display());
        let result = migrator.migrate();
        migrator.disconnect();
        result
    });

    match handle.join() {
        Ok(result) => {
            if let Ok(result) = &result {
                if result.success() {
                    log::info!("Migrations applied");
                } else {
                    log::error!("Deploy failed, rollback outcome: {:?}", result.rollback());
                }
            }
            result
        }
        Err(panic) => Err(MigrateError::Aborted(panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "deploy coroutine panicked".to_string()
    }
}
