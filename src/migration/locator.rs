//! Rollback Locator
//!
//! A migration directory may ship a compensating script named `rollback.sql`
//! or `<anything>.rollback.sql`.

use std::fs;
use std::path::{Path, PathBuf};

/// File name suffix identifying a rollback script
pub const ROLLBACK_SUFFIX: &str = "rollback.sql";

/// Find the rollback script of a migration
///
/// Looks in `migrations_root/migration_name` for regular files whose name ends
/// with `rollback.sql` (case-sensitive). When several match, the
/// lexicographically smallest name wins, independent of directory listing
/// order. A missing or unreadable directory yields `None`.
#[must_use]
pub fn locate_rollback(migrations_root: &Path, migration_name: &str) -> Option<PathBuf> {
    let migration_dir = migrations_root.join(migration_name);

    let entries = match fs::read_dir(&migration_dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::debug!("Cannot read {}: {e}", migration_dir.display());
            return None;
        }
    };

    let mut scripts: Vec<(String, PathBuf)> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|entry| {
            let name = entry.file_name().to_str()?.to_string();
            name.ends_with(ROLLBACK_SUFFIX).then(|| (name, entry.path()))
        })
        .collect();

    scripts.sort_by(|a, b| a.0.cmp(&b.0));

    if scripts.len() > 1 {
        log::warn!(
            "Migration `{migration_name}` has {} rollback scripts, using {}",
            scripts.len(),
            scripts[0].0
        );
    }

    scripts.into_iter().next().map(|(_, path)| path)
}
