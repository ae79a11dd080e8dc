//! SQL Executor
//!
//! Provides the [`SqlExecutor`] trait, the raw-execution primitive every
//! database adapter implements, and [`execute_script`], which runs a rollback
//! script one statement at a time.
//!
//! Scripts are split on `;` and executed in source order. No transaction is
//! opened around the script: if a statement fails, the statements before it
//! stay applied.

use std::fmt;

#[cfg(feature = "tracing")]
use crate::tracing_helpers;

/// Database error type
#[derive(Debug)]
pub enum DbError {
    /// `PostgreSQL` error from `may_postgres`
    PostgresError(may_postgres::Error),
    /// Query execution error
    QueryError(String),
    /// Row parsing/conversion error
    ParseError(String),
    /// Connection already released
    Disconnected,
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbError::PostgresError(e) => write!(f, "PostgreSQL error: {e}"),
            DbError::QueryError(s) => write!(f, "Query error: {s}"),
            DbError::ParseError(s) => write!(f, "Parse error: {s}"),
            DbError::Disconnected => write!(f, "Database connection has been released"),
        }
    }
}

impl std::error::Error for DbError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DbError::PostgresError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<may_postgres::Error> for DbError {
    fn from(err: may_postgres::Error) -> Self {
        DbError::PostgresError(err)
    }
}

/// Trait for executing raw SQL statements
///
/// One call carries exactly one statement. Rollback scripts are static,
/// author-provided SQL, so there is no parameter binding.
pub trait SqlExecutor {
    /// Execute a single SQL statement and return the number of rows affected
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the statement fails.
    fn execute(&self, sql: &str) -> Result<u64, DbError>;
}

impl<T: SqlExecutor + ?Sized> SqlExecutor for &T {
    fn execute(&self, sql: &str) -> Result<u64, DbError> {
        (**self).execute(sql)
    }
}

/// A rollback statement that failed
#[derive(Debug)]
pub struct ExecutionError {
    /// Zero-based position of the statement within the script
    pub index: usize,
    /// The statement text, trimmed
    pub statement: String,
    /// Underlying database error
    pub source: DbError,
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Statement {} failed: {}\nStatement: {}",
            self.index + 1,
            self.source,
            self.statement
        )
    }
}

impl std::error::Error for ExecutionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Split a SQL script into statements
///
/// Splits on `;`, trims each fragment and drops empty ones.
///
/// # Example
///
/// ```
/// use backout::split_statements;
///
/// let statements = split_statements("   ;  ; DROP TABLE x;");
/// assert_eq!(statements, vec!["DROP TABLE x"]);
/// ```
#[must_use]
pub fn split_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|statement| !statement.is_empty())
        .collect()
}

/// Execute every statement of a script sequentially
///
/// Returns the number of statements executed.
///
/// # Errors
///
/// Returns `ExecutionError` wrapping the first statement that failed. Statements
/// after it are not executed, statements before it are not undone.
pub fn execute_script<E: SqlExecutor + ?Sized>(
    executor: &E,
    sql: &str,
) -> Result<usize, ExecutionError> {
    let statements = split_statements(sql);

    for (index, statement) in statements.iter().enumerate() {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::rollback_statement_span(index, statement).entered();

        log::debug!("Executing rollback statement {}: {}", index + 1, statement);
        executor.execute(statement).map_err(|source| ExecutionError {
            index,
            statement: (*statement).to_string(),
            source,
        })?;
    }

    Ok(statements.len())
}
