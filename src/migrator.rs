//! Migration operations
//!
//! [`Migrator`] owns the loaded repository and a [`Backend`] and exposes the
//! three operations: `run_forward`, `run_backward` and `status`. Every
//! repository-only check runs before the backend is asked for anything.

use tracing::{info, warn};

use crate::error::{MigrateError, Result};
use crate::executor::{Backend, Executor, RunSummary};
use crate::ledger::LedgerEntry;
use crate::planner::{self, Direction, RollbackCount, StatusReport};
use crate::repository::MigrationFile;

pub struct Migrator<B: Backend> {
    files: Vec<MigrationFile>,
    backend: B,
}

impl<B: Backend> Migrator<B> {
    /// `files` as returned by the repository; order does not matter.
    pub fn new(files: Vec<MigrationFile>, backend: B) -> Self {
        Self { files, backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    /// Apply every pending migration, oldest first.
    ///
    /// Creates the ledger table on first use. A run with nothing pending
    /// succeeds with an empty summary.
    pub async fn run_forward(&mut self) -> Result<RunSummary> {
        planner::preflight(&self.files, Direction::Forward)?;

        self.backend
            .ensure_ledger()
            .await
            .map_err(MigrateError::ledger("ensure ledger table"))?;
        let applied = self.applied().await?;

        let plan = planner::plan_forward(&self.files, &applied)?;
        if plan.is_empty() {
            info!("Database is up to date");
        } else {
            info!(steps = plan.len(), "Applying pending migrations");
        }
        Executor::new(&mut self.backend).execute(&plan).await
    }

    /// Revert the most recently applied migrations, newest first.
    ///
    /// A missing ledger table means nothing was ever applied, so the run is a
    /// no-op and the table is not created.
    pub async fn run_backward(&mut self, count: RollbackCount) -> Result<RunSummary> {
        planner::preflight(&self.files, Direction::Backward)?;

        let applied = if self.ledger_exists().await? {
            self.applied().await?
        } else {
            Vec::new()
        };

        let plan = planner::plan_backward(&self.files, &applied, count)?;
        if plan.is_empty() {
            info!("Nothing to roll back");
        } else {
            info!(steps = plan.len(), "Rolling back migrations");
        }
        Executor::new(&mut self.backend).execute(&plan).await
    }

    /// Applied vs pending migrations. Never writes to the database.
    pub async fn status(&mut self) -> Result<StatusReport> {
        planner::verify_ordering(&self.files)?;

        let applied = if self.ledger_exists().await? {
            self.applied().await?
        } else {
            Vec::new()
        };
        planner::status(&self.files, &applied)
    }

    async fn ledger_exists(&mut self) -> Result<bool> {
        self.backend
            .ledger_exists()
            .await
            .map_err(MigrateError::ledger("check ledger table"))
    }

    async fn applied(&mut self) -> Result<Vec<LedgerEntry>> {
        let applied = self
            .backend
            .applied()
            .await
            .map_err(MigrateError::ledger("read ledger"))?;
        self.warn_orphans(&applied);
        Ok(applied)
    }

    fn warn_orphans(&self, applied: &[LedgerEntry]) {
        for entry in applied {
            if !self.files.iter().any(|f| f.file_name == entry.name) {
                warn!(
                    name = %entry.name,
                    "Ledger row has no matching migration file; it is ignored"
                );
            }
        }
    }
}
