//! PostgreSQL backend
//!
//! Owns a single connection for the whole run. A step is one
//! `sqlx::Transaction`: migration SQL, then the ledger write, then commit.
//! Reading the ledger first checks that the table has the expected columns.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{Connection, Postgres, Transaction};
use tracing::{debug, warn};

use crate::error::{MigrateError, Result};
use crate::executor::{Backend, StepFailure, StepRequest, StepStage};
use crate::ledger::{Ledger, LedgerEntry};
use crate::planner::Direction;

pub struct PgBackend {
    conn: PgConnection,
    ledger: Ledger,
}

impl PgBackend {
    /// Open the run's connection. Failure is a `LedgerIo` error.
    pub async fn connect(options: &PgConnectOptions, ledger: Ledger) -> Result<Self> {
        debug!(
            host = options.get_host(),
            port = options.get_port(),
            database = options.get_database().unwrap_or_default(),
            "Connecting"
        );
        let conn = PgConnection::connect_with(options)
            .await
            .map_err(MigrateError::ledger("connect"))?;
        Ok(Self::new(conn, ledger))
    }

    pub fn new(conn: PgConnection, ledger: Ledger) -> Self {
        Self { conn, ledger }
    }

    /// Terminate the connection cleanly.
    pub async fn close(self) -> Result<()> {
        self.conn
            .close()
            .await
            .map_err(MigrateError::ledger("disconnect"))
    }
}

#[async_trait]
impl Backend for PgBackend {
    async fn ensure_ledger(&mut self) -> std::result::Result<(), sqlx::Error> {
        self.ledger.ensure_schema(&mut self.conn).await
    }

    async fn ledger_exists(&mut self) -> std::result::Result<bool, sqlx::Error> {
        self.ledger.exists(&mut self.conn).await
    }

    async fn applied(&mut self) -> std::result::Result<Vec<LedgerEntry>, sqlx::Error> {
        self.ledger.verify_layout(&mut self.conn).await?;
        self.ledger.list_applied(&mut self.conn).await
    }

    async fn apply_step(
        &mut self,
        step: &StepRequest<'_>,
    ) -> std::result::Result<DateTime<Utc>, StepFailure> {
        let mut tx = self
            .conn
            .begin()
            .await
            .map_err(StepFailure::at(StepStage::Begin))?;

        match run_step(&self.ledger, &mut tx, step).await {
            Ok(at) => {
                tx.commit().await.map_err(StepFailure::at(StepStage::Commit))?;
                Ok(at)
            }
            Err(failure) => {
                if let Err(e) = tx.rollback().await {
                    // The server discards the transaction when the
                    // connection goes away, so the step still leaves no trace.
                    warn!(file = step.file_name, "Explicit rollback failed: {}", e);
                }
                Err(failure)
            }
        }
    }
}

async fn run_step(
    ledger: &Ledger,
    tx: &mut Transaction<'_, Postgres>,
    step: &StepRequest<'_>,
) -> std::result::Result<DateTime<Utc>, StepFailure> {
    if let Some(sql) = step.sql {
        // A bare &str goes over the simple-query protocol, so multi-statement
        // bodies run as one batch inside the transaction.
        sqlx::Executor::execute(&mut **tx, sql)
            .await
            .map_err(StepFailure::at(StepStage::Statements))?;
    }

    let recorded = match step.direction {
        Direction::Forward => ledger.record_applied(&mut **tx, step.file_name).await,
        Direction::Backward => ledger.record_reverted(&mut **tx, step.file_name).await,
    };
    recorded.map_err(StepFailure::at(StepStage::LedgerWrite))
}
