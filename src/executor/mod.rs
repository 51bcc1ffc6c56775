//! Plan execution
//!
//! Runs an [`ExecutionPlan`] one step at a time. Each step is one database
//! transaction holding both the migration SQL and the ledger write, so a
//! step either commits completely or leaves no trace. The first failing step
//! halts the run; steps committed before it stay committed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use strum_macros::Display;
use tracing::{debug, info, warn};

use crate::error::{MigrateError, Result};
use crate::ledger::LedgerEntry;
use crate::planner::{Direction, ExecutionPlan};
use crate::repository::MigrationFile;
use crate::sql;

pub mod postgres;

pub use postgres::PgBackend;

/// Where inside a step's transaction a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStage {
    #[strum(serialize = "begin")]
    Begin,
    #[strum(serialize = "statements")]
    Statements,
    #[strum(serialize = "ledger write")]
    LedgerWrite,
    #[strum(serialize = "commit")]
    Commit,
}

/// Per-step lifecycle. `Committed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum StepState {
    Pending,
    Executing,
    Committed,
    Failed,
}

/// A rolled-back step, as reported by a [`Backend`].
#[derive(Debug)]
pub struct StepFailure {
    pub stage: StepStage,
    pub source: sqlx::Error,
}

impl StepFailure {
    pub fn at(stage: StepStage) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| Self { stage, source }
    }
}

/// One step handed to a backend.
#[derive(Debug, Clone, Copy)]
pub struct StepRequest<'a> {
    /// Ledger key of the migration.
    pub file_name: &'a str,
    pub direction: Direction,
    /// `None` when the section has nothing to execute.
    pub sql: Option<&'a str>,
}

/// Database seam used by the executor and the migrator.
#[async_trait]
pub trait Backend: Send {
    /// Create the ledger table if needed.
    async fn ensure_ledger(&mut self) -> std::result::Result<(), sqlx::Error>;

    async fn ledger_exists(&mut self) -> std::result::Result<bool, sqlx::Error>;

    /// Ledger rows, oldest first.
    async fn applied(&mut self) -> std::result::Result<Vec<LedgerEntry>, sqlx::Error>;

    /// Run the step's SQL and its ledger write in a single transaction and
    /// commit. On error nothing of the step may remain.
    ///
    /// Returns the time recorded for the step.
    async fn apply_step(
        &mut self,
        step: &StepRequest<'_>,
    ) -> std::result::Result<DateTime<Utc>, StepFailure>;
}

/// A committed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedStep {
    pub file_name: String,
    pub sequence: u64,
    pub direction: Direction,
    pub at: DateTime<Utc>,
}

/// Outcome of a fully successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub direction: Direction,
    pub steps: Vec<AppliedStep>,
}

impl RunSummary {
    pub fn is_noop(&self) -> bool {
        self.steps.is_empty()
    }
}

pub struct Executor<'b, B: Backend> {
    backend: &'b mut B,
}

impl<'b, B: Backend> Executor<'b, B> {
    pub fn new(backend: &'b mut B) -> Self {
        Self { backend }
    }

    /// Execute every step of `plan` in order, halting at the first failure.
    pub async fn execute(&mut self, plan: &ExecutionPlan<'_>) -> Result<RunSummary> {
        let direction = plan.direction;
        let mut committed: Vec<AppliedStep> = Vec::with_capacity(plan.len());

        for file in &plan.steps {
            transition(file, StepState::Pending, StepState::Executing);

            let request = StepRequest {
                file_name: &file.file_name,
                direction,
                sql: section_to_run(file, direction, committed.len())?,
            };

            match self.backend.apply_step(&request).await {
                Ok(at) => {
                    transition(file, StepState::Executing, StepState::Committed);
                    info!(
                        file = %file.file_name,
                        %direction,
                        "Committed migration"
                    );
                    committed.push(AppliedStep {
                        file_name: file.file_name.clone(),
                        sequence: file.sequence,
                        direction,
                        at,
                    });
                }
                Err(failure) => {
                    transition(file, StepState::Executing, StepState::Failed);
                    return Err(MigrateError::StepExecution {
                        file: file.file_name.clone(),
                        sequence: file.sequence,
                        direction,
                        stage: failure.stage,
                        committed: committed.len(),
                        source: failure.source,
                    });
                }
            }
        }

        Ok(RunSummary {
            direction,
            steps: committed,
        })
    }
}

/// The SQL a step runs, or `None` when the section is blank.
fn section_to_run(
    file: &MigrationFile,
    direction: Direction,
    committed: usize,
) -> Result<Option<&str>> {
    let section = match direction {
        Direction::Forward => file.up.as_str(),
        Direction::Backward => match file.down.as_deref() {
            Some(down) => down,
            None => {
                transition(file, StepState::Executing, StepState::Failed);
                return Err(MigrateError::UnsupportedRollback {
                    file: file.file_name.clone(),
                    sequence: file.sequence,
                    committed,
                });
            }
        },
    };

    if sql::is_blank(section) {
        if direction == Direction::Backward {
            warn!(file = %file.file_name, "Down section is empty; only the ledger row is removed");
        } else {
            debug!(file = %file.file_name, "Up section is empty");
        }
        return Ok(None);
    }
    Ok(Some(section))
}

fn transition(file: &MigrationFile, from: StepState, to: StepState) {
    debug!(file = %file.file_name, sequence = file.sequence, %from, %to, "Step state");
}
