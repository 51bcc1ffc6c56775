//! Shared test fixtures: migration builders and an in-memory [`Backend`].

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::executor::{Backend, StepFailure, StepRequest, StepStage};
use crate::ledger::LedgerEntry;
use crate::planner::Direction;
use crate::repository::{DELIMITER, MigrationFile};

/// A reversible migration named `file_name`.
pub fn migration(file_name: &str, up: &str, down: &str) -> MigrationFile {
    let body = format!("{up}\n{DELIMITER}\n{down}\n");
    MigrationFile::parse(Path::new(file_name), &body).expect("valid migration fixture")
}

/// A migration without a down section.
pub fn up_only(file_name: &str, up: &str) -> MigrationFile {
    MigrationFile::parse(Path::new(file_name), up).expect("valid migration fixture")
}

/// Backend that keeps the ledger in memory and records every committed
/// statement batch, trimmed, instead of executing it.
///
/// A step whose SQL contains one of the `failing_on` fragments fails at the
/// statements stage and changes nothing.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    /// `None` until the ledger table is created.
    ledger: Option<Vec<LedgerEntry>>,
    /// SQL of committed steps, in commit order.
    pub executed: Vec<String>,
    failing_on: Vec<String>,
    next_id: i32,
    ticks: i64,
    pub step_calls: usize,
}

impl MemoryBackend {
    /// No ledger table yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger table already present and empty.
    pub fn with_ledger() -> Self {
        Self {
            ledger: Some(Vec::new()),
            ..Self::default()
        }
    }

    pub fn failing_on(mut self, fragment: &str) -> Self {
        self.failing_on.push(fragment.to_string());
        self
    }

    pub fn clear_failures(&mut self) {
        self.failing_on.clear();
    }

    pub fn has_ledger(&self) -> bool {
        self.ledger.is_some()
    }

    /// Record `name` as applied without running anything.
    pub fn insert_ledger_row(&mut self, name: &str) {
        let applied_at = self.tick();
        self.next_id += 1;
        let id = self.next_id;
        self.ledger
            .get_or_insert_with(Vec::new)
            .push(LedgerEntry {
                id,
                name: name.to_string(),
                applied_at,
            });
    }

    pub fn ledger_rows(&self) -> Vec<LedgerEntry> {
        self.ledger.clone().unwrap_or_default()
    }

    pub fn ledger_names(&self) -> Vec<String> {
        self.ledger_rows().into_iter().map(|e| e.name).collect()
    }

    fn tick(&mut self) -> DateTime<Utc> {
        self.ticks += 1;
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(self.ticks)
    }
}

fn failure(stage: StepStage, message: &str) -> StepFailure {
    StepFailure {
        stage,
        source: sqlx::Error::Protocol(message.to_string()),
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn ensure_ledger(&mut self) -> Result<(), sqlx::Error> {
        self.ledger.get_or_insert_with(Vec::new);
        Ok(())
    }

    async fn ledger_exists(&mut self) -> Result<bool, sqlx::Error> {
        Ok(self.ledger.is_some())
    }

    async fn applied(&mut self) -> Result<Vec<LedgerEntry>, sqlx::Error> {
        match &self.ledger {
            Some(rows) => Ok(rows.clone()),
            None => Err(sqlx::Error::Protocol(
                "relation \"migrations\" does not exist".to_string(),
            )),
        }
    }

    async fn apply_step(&mut self, step: &StepRequest<'_>) -> Result<DateTime<Utc>, StepFailure> {
        self.step_calls += 1;

        if let Some(sql) = step.sql {
            if self.failing_on.iter().any(|f| sql.contains(f.as_str())) {
                return Err(failure(StepStage::Statements, "syntax error"));
            }
        }

        let Some(rows) = self.ledger.as_ref() else {
            return Err(failure(
                StepStage::LedgerWrite,
                "relation \"migrations\" does not exist",
            ));
        };
        let position = rows.iter().position(|e| e.name == step.file_name);
        match (step.direction, position) {
            (Direction::Forward, Some(_)) => {
                return Err(failure(
                    StepStage::LedgerWrite,
                    "duplicate key value violates unique constraint",
                ));
            }
            (Direction::Backward, None) => {
                return Err(StepFailure {
                    stage: StepStage::LedgerWrite,
                    source: sqlx::Error::RowNotFound,
                });
            }
            _ => {}
        }

        // Commit.
        let at = self.tick();
        if let Some(sql) = step.sql {
            self.executed.push(sql.trim().to_string());
        }
        match (step.direction, position) {
            (Direction::Forward, _) => {
                self.next_id += 1;
                let id = self.next_id;
                if let Some(rows) = self.ledger.as_mut() {
                    rows.push(LedgerEntry {
                        id,
                        name: step.file_name.to_string(),
                        applied_at: at,
                    });
                }
            }
            (Direction::Backward, Some(index)) => {
                if let Some(rows) = self.ledger.as_mut() {
                    rows.remove(index);
                }
            }
            (Direction::Backward, None) => unreachable!("checked above"),
        }
        Ok(at)
    }
}
