//! Recent-Migration Scanner
//!
//! Used when the migrate command fails without saying which migration broke.
//! Migration directories are named `<timestamp>_<description>`, so sorting
//! names in descending order lists the newest migrations first.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::Path;

/// Leading digit run followed by `_`
static MIGRATION_DIR_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+_").expect("migration directory pattern is a valid regex"));

/// Check whether a directory name follows the migration naming convention
#[must_use]
pub fn is_migration_dir_name(name: &str) -> bool {
    MIGRATION_DIR_NAME.is_match(name)
}

/// The `limit` most recent migration directories, newest first
///
/// Non-conforming names (`readme`, `migration_lock.toml`) and plain files are
/// skipped. Any read failure yields an empty list.
#[must_use]
pub fn recent_candidates(migrations_root: &Path, limit: usize) -> Vec<String> {
    let entries = match fs::read_dir(migrations_root) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!(
                "Cannot list migrations in {}: {e}",
                migrations_root.display()
            );
            return Vec::new();
        }
    };

    let mut names: Vec<String> = Vec::new();
    for entry in entries {
        let Ok(entry) = entry else {
            return Vec::new();
        };
        if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if is_migration_dir_name(name) {
                names.push(name.to_string());
            }
        }
    }

    names.sort_unstable_by(|a, b| b.cmp(a));
    names.truncate(limit);
    names
}
