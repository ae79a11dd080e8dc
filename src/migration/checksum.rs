//! Checksum cross-check for migration files
//!
//! Prisma records the SHA-256 of each migration's `migration.sql` in
//! `_prisma_migrations.checksum`. Comparing it with the file on disk tells
//! whether the directory we are about to roll back is the one that ran.

use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

/// Name of the forward script inside a migration directory
pub const MIGRATION_FILE: &str = "migration.sql";

/// Calculate the SHA-256 checksum of a file's content as lowercase hex
///
/// # Errors
///
/// Returns `std::io::Error` if the file cannot be read
pub fn calculate_checksum(path: &Path) -> std::io::Result<String> {
    let content = fs::read(path)?;

    let mut hasher = Sha256::new();
    hasher.update(&content);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Result of comparing a recorded checksum with the file on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChecksumCheck {
    Match,
    Mismatch { stored: String, current: String },
    /// `migration.sql` is missing or unreadable
    Unavailable,
}

/// Compare `stored` with the checksum of `<migration_dir>/migration.sql`
#[must_use]
pub fn verify_migration_checksum(migration_dir: &Path, stored: &str) -> ChecksumCheck {
    match calculate_checksum(&migration_dir.join(MIGRATION_FILE)) {
        Ok(current) if current.eq_ignore_ascii_case(stored) => ChecksumCheck::Match,
        Ok(current) => ChecksumCheck::Mismatch {
            stored: stored.to_string(),
            current,
        },
        Err(e) => {
            log::debug!(
                "Cannot checksum {}: {e}",
                migration_dir.join(MIGRATION_FILE).display()
            );
            ChecksumCheck::Unavailable
        }
    }
}
