//! Migration planning
//!
//! Pure functions from (files on disk, ledger rows) to an [`ExecutionPlan`]
//! or a [`StatusReport`]. Nothing in this module touches the filesystem or
//! the database, so every rule here is checked before a connection exists.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum_macros::{Display, EnumString};

use crate::error::{MigrateError, Result};
use crate::ledger::LedgerEntry;
use crate::repository::MigrationFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Backward,
}

/// How many applied migrations a backward run reverts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackCount {
    Steps(usize),
    /// Every applied migration. Only ever chosen explicitly.
    All,
}

impl Default for RollbackCount {
    fn default() -> Self {
        Self::Steps(1)
    }
}

/// Ordered, directioned list of migrations for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan<'a> {
    pub direction: Direction,
    pub steps: Vec<&'a MigrationFile>,
}

impl ExecutionPlan<'_> {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// File names in execution order.
    pub fn file_names(&self) -> Vec<&str> {
        self.steps.iter().map(|f| f.file_name.as_str()).collect()
    }
}

/// Reject two files sharing a sequence number.
pub fn verify_ordering(files: &[MigrationFile]) -> Result<()> {
    let mut seen: HashMap<u64, &str> = HashMap::with_capacity(files.len());
    for file in files {
        if let Some(first) = seen.insert(file.sequence, &file.file_name) {
            let (first, second) = if first <= file.file_name.as_str() {
                (first, file.file_name.as_str())
            } else {
                (file.file_name.as_str(), first)
            };
            return Err(MigrateError::AmbiguousOrdering {
                sequence: file.sequence,
                first: first.to_string(),
                second: second.to_string(),
            });
        }
    }
    Ok(())
}

/// Checks that need only the repository, run before connecting.
pub fn preflight(files: &[MigrationFile], direction: Direction) -> Result<()> {
    verify_ordering(files)?;
    if direction == Direction::Forward && files.is_empty() {
        return Err(MigrateError::NoMigrationsFound);
    }
    Ok(())
}

/// Plan a run in either direction. `count` only applies to backward runs.
pub fn plan<'a>(
    files: &'a [MigrationFile],
    applied: &[LedgerEntry],
    direction: Direction,
    count: Option<RollbackCount>,
) -> Result<ExecutionPlan<'a>> {
    match direction {
        Direction::Forward => plan_forward(files, applied),
        Direction::Backward => plan_backward(files, applied, count.unwrap_or_default()),
    }
}

/// Every file not yet in the ledger, ascending by sequence.
pub fn plan_forward<'a>(
    files: &'a [MigrationFile],
    applied: &[LedgerEntry],
) -> Result<ExecutionPlan<'a>> {
    preflight(files, Direction::Forward)?;
    let applied = applied_names(applied);

    let mut steps: Vec<&MigrationFile> = files
        .iter()
        .filter(|f| !applied.contains(f.file_name.as_str()))
        .collect();
    steps.sort_by_key(|f| f.sequence);

    Ok(ExecutionPlan {
        direction: Direction::Forward,
        steps,
    })
}

/// The most recently applied files, descending by sequence, up to `count`.
pub fn plan_backward<'a>(
    files: &'a [MigrationFile],
    applied: &[LedgerEntry],
    count: RollbackCount,
) -> Result<ExecutionPlan<'a>> {
    verify_ordering(files)?;
    let applied = applied_names(applied);

    let mut steps: Vec<&MigrationFile> = files
        .iter()
        .filter(|f| applied.contains(f.file_name.as_str()))
        .collect();
    steps.sort_by_key(|f| std::cmp::Reverse(f.sequence));

    if let RollbackCount::Steps(n) = count {
        steps.truncate(n);
    }

    Ok(ExecutionPlan {
        direction: Direction::Backward,
        steps,
    })
}

fn applied_names(applied: &[LedgerEntry]) -> HashSet<&str> {
    applied.iter().map(|e| e.name.as_str()).collect()
}

/// An applied migration as seen by `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedMigration {
    pub file_name: String,
    pub sequence: u64,
    pub applied_at: DateTime<Utc>,
}

/// A migration on disk that the ledger does not know about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingMigration {
    pub file_name: String,
    pub sequence: u64,
}

/// Applied vs pending, computed without mutating anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub applied: Vec<AppliedMigration>,
    pub pending: Vec<PendingMigration>,
    /// Ledger rows whose file is no longer on disk.
    pub orphaned: Vec<LedgerEntry>,
}

/// Resolve every file against the ledger.
pub fn status(files: &[MigrationFile], applied: &[LedgerEntry]) -> Result<StatusReport> {
    verify_ordering(files)?;

    let by_name: HashMap<&str, &LedgerEntry> =
        applied.iter().map(|e| (e.name.as_str(), e)).collect();
    let mut sorted: Vec<&MigrationFile> = files.iter().collect();
    sorted.sort_by_key(|f| f.sequence);

    let mut report = StatusReport::default();
    for file in sorted {
        match by_name.get(file.file_name.as_str()) {
            Some(entry) => report.applied.push(AppliedMigration {
                file_name: file.file_name.clone(),
                sequence: file.sequence,
                applied_at: entry.applied_at,
            }),
            None => report.pending.push(PendingMigration {
                file_name: file.file_name.clone(),
                sequence: file.sequence,
            }),
        }
    }

    let on_disk: HashSet<&str> = files.iter().map(|f| f.file_name.as_str()).collect();
    report.orphaned = applied
        .iter()
        .filter(|e| !on_disk.contains(e.name.as_str()))
        .cloned()
        .collect();

    Ok(report)
}
