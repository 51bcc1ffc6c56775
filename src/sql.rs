//! Offline SQL validation
//!
//! Uses the PostgreSQL parser (via `pg_query`) to check migration bodies
//! without a database. Nothing here executes SQL.

use serde::Serialize;

use crate::error::{MigrateError, Result};
use crate::repository::MigrationFile;

/// Number of statements in `source`, or the parser's error message.
///
/// Comment-only and whitespace-only input has zero statements.
pub fn statement_count(source: &str) -> std::result::Result<usize, String> {
    pg_query::parse(source)
        .map(|result| result.protobuf.stmts.len())
        .map_err(|e| e.to_string())
}

/// True when `source` contains nothing to execute.
///
/// Input the parser rejects is never blank: the database gets to report it.
pub fn is_blank(source: &str) -> bool {
    source.trim().is_empty() || statement_count(source) == Ok(0)
}

/// Parse outcome for one migration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileCheck {
    pub file_name: String,
    pub sequence: u64,
    pub up_statements: usize,
    /// `None` for up-only files.
    pub down_statements: Option<usize>,
}

/// Parse both sections of every file, stopping at the first parse error.
pub fn check_files(files: &[MigrationFile]) -> Result<Vec<FileCheck>> {
    files.iter().map(check_file).collect()
}

pub fn check_file(file: &MigrationFile) -> Result<FileCheck> {
    let up_statements = statement_count(&file.up)
        .map_err(|e| MigrateError::malformed(&file.path, format!("up section: {e}")))?;
    let down_statements = file
        .down
        .as_deref()
        .map(statement_count)
        .transpose()
        .map_err(|e| MigrateError::malformed(&file.path, format!("down section: {e}")))?;

    Ok(FileCheck {
        file_name: file.file_name.clone(),
        sequence: file.sequence,
        up_statements,
        down_statements,
    })
}
