//! Migrations root discovery
//!
//! Prisma keeps migrations in `<project>/prisma/migrations`. When no explicit
//! directory is configured, the walk starts at a given directory and checks it
//! and each ancestor for that layout.

use crate::migration::MigrateError;
use std::path::{Path, PathBuf};

/// Relative location of the migrations root inside a Prisma project
const PRISMA_MIGRATIONS: &[&str] = &["prisma", "migrations"];

/// Resolve the migrations root
///
/// An explicit directory wins and must exist. Otherwise `start` and its
/// ancestors are searched for `prisma/migrations`.
///
/// # Errors
///
/// Returns `MigrateError::Discovery` if the explicit directory is missing or
/// no ancestor contains a Prisma migrations directory.
pub fn resolve_migrations_root(
    explicit: Option<&Path>,
    start: &Path,
) -> Result<PathBuf, MigrateError> {
    if let Some(dir) = explicit {
        let dir = if dir.is_relative() {
            start.join(dir)
        } else {
            dir.to_path_buf()
        };
        if dir.is_dir() {
            log::debug!("Using configured migrations root {}", dir.display());
            return Ok(dir);
        }
        return Err(MigrateError::Discovery(format!(
            "Configured migrations directory {} does not exist",
            dir.display()
        )));
    }

    for ancestor in start.ancestors() {
        let candidate = PRISMA_MIGRATIONS
            .iter()
            .fold(ancestor.to_path_buf(), |path, part| path.join(part));
        if candidate.is_dir() {
            log::debug!("Discovered migrations root {}", candidate.display());
            return Ok(candidate);
        }
    }

    Err(MigrateError::Discovery(format!(
        "No prisma/migrations directory found in {} or any parent directory",
        start.display()
    )))
}

/// Project root for a migrations root: the directory the migrate command runs in
///
/// `<project>/prisma/migrations` maps to `<project>`; any other layout maps to
/// the migrations root's parent.
#[must_use]
pub fn project_root(migrations_root: &Path) -> PathBuf {
    let parent = migrations_root.parent().unwrap_or(migrations_root);
    if parent.file_name().and_then(|n| n.to_str()) == Some("prisma") {
        if let Some(project) = parent.parent() {
            return project.to_path_buf();
        }
    }
    parent.to_path_buf()
}
