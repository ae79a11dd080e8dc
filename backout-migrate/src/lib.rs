//! Backout Migration CLI Library
//!
//! Console pieces of the `backout-migrate` binary: the confirmation prompt
//! and result rendering. The CLI tool (main.rs) uses this library.

pub mod prompt;
pub mod report;

/// Process exit codes
pub mod exit_code {
    /// Deploy (or rollback) succeeded
    pub const SUCCESS: i32 = 0;
    /// The migration failed; see the rollback outcome
    pub const MIGRATION_FAILED: i32 = 1;
    /// Configuration, discovery or connection problem, or the operator declined
    pub const USAGE: i32 = 2;
}
