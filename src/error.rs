//! Engine error taxonomy
//!
//! Every failure the engine can report is a [`MigrateError`]. The binary maps
//! these to exit code 1; nothing here prints or exits.

use std::path::PathBuf;
use thiserror::Error;

use crate::executor::StepStage;
use crate::planner::Direction;

pub type Result<T, E = MigrateError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum MigrateError {
    /// Bad file name or body. Raised before the database is touched.
    #[error("Malformed migration file {path}: {reason}")]
    MalformedMigrationFile { path: PathBuf, reason: String },

    /// Forward run over an empty repository.
    #[error("No migration files found")]
    NoMigrationsFound,

    /// Two files share a sequence number; one of them must be renamed.
    #[error(
        "Ambiguous ordering: {first} and {second} share sequence {sequence}; rename one of them"
    )]
    AmbiguousOrdering {
        sequence: u64,
        first: String,
        second: String,
    },

    /// Backward step over a file without a down section.
    #[error(
        "Cannot roll back {file} (sequence {sequence}): it has no down section \
         ({committed} step(s) committed before it in this run)"
    )]
    UnsupportedRollback {
        file: String,
        sequence: u64,
        committed: usize,
    },

    #[error("Ledger error during {operation}: {source}")]
    LedgerIo {
        operation: &'static str,
        #[source]
        source: sqlx::Error,
    },

    /// A step's transaction failed and was rolled back.
    #[error(
        "Step {file} (sequence {sequence}, {direction}) failed during {stage} \
         after {committed} committed step(s): {source}"
    )]
    StepExecution {
        file: String,
        sequence: u64,
        direction: Direction,
        stage: StepStage,
        committed: usize,
        #[source]
        source: sqlx::Error,
    },

    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl MigrateError {
    pub(crate) fn ledger(operation: &'static str) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| Self::LedgerIo { operation, source }
    }

    pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::MalformedMigrationFile {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
