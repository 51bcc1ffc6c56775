//! Ledger of applied migrations
//!
//! One row per applied migration, stored in a table inside the target
//! database. Every method takes the connection explicitly so the executor can
//! hand in the step's transaction.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgConnection, Row};
use tracing::warn;

/// Table used when the configuration does not name one.
pub const DEFAULT_TABLE: &str = "migrations";

/// Columns every ledger read and write relies on.
const COLUMNS: [&str; 3] = ["id", "name", "applied_at"];

/// One applied migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub id: i32,
    /// File name of the migration, e.g. `1700000000000-create_users.sql`.
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Ledger {
    /// Already quoted, e.g. `"public"."migrations"`.
    table: String,
}

impl Ledger {
    /// `table` must satisfy [`is_valid_table_name`]; config validation
    /// enforces that before a ledger is built.
    pub fn new(table: &str) -> Self {
        Self {
            table: quote_table_name(table),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    \
                id SERIAL PRIMARY KEY,\n    \
                name VARCHAR(255) NOT NULL UNIQUE,\n    \
                applied_at TIMESTAMPTZ NOT NULL DEFAULT now()\n\
            )",
            self.table
        )
    }

    /// Create the ledger table if it is absent. Idempotent.
    pub async fn ensure_schema(&self, conn: &mut PgConnection) -> Result<(), sqlx::Error> {
        let sql = self.create_table_sql();
        sqlx::query(&sql).execute(&mut *conn).await?;
        Ok(())
    }

    /// Whether the ledger table exists. Never creates anything.
    pub async fn exists(&self, conn: &mut PgConnection) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT to_regclass($1) IS NOT NULL")
            .bind(&self.table)
            .fetch_one(&mut *conn)
            .await?;
        row.try_get(0)
    }

    /// Fail with `ColumnNotFound` when an existing table lacks one of the
    /// ledger columns, e.g. a `migrations` table with a `timestamp` column
    /// left behind by another tool. Such a table is never altered.
    pub async fn verify_layout(&self, conn: &mut PgConnection) -> Result<(), sqlx::Error> {
        let present: Vec<String> = sqlx::query_scalar(
            "SELECT attname::text FROM pg_attribute \
             WHERE attrelid = to_regclass($1)::oid AND attnum > 0 AND NOT attisdropped",
        )
        .bind(&self.table)
        .fetch_all(&mut *conn)
        .await?;

        match first_missing_column(&present) {
            Some(column) => {
                warn!(
                    table = %self.table,
                    column,
                    found = ?present,
                    "Ledger table has an unexpected layout; rename or migrate it by hand"
                );
                Err(sqlx::Error::ColumnNotFound(column.to_string()))
            }
            None => Ok(()),
        }
    }

    /// All applied migrations, oldest first.
    pub async fn list_applied(
        &self,
        conn: &mut PgConnection,
    ) -> Result<Vec<LedgerEntry>, sqlx::Error> {
        let sql = format!(
            "SELECT id, name, applied_at FROM {} ORDER BY applied_at ASC, id ASC",
            self.table
        );
        let rows = sqlx::query(&sql).fetch_all(&mut *conn).await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            entries.push(LedgerEntry {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                applied_at: row.try_get("applied_at")?,
            });
        }
        Ok(entries)
    }

    /// Insert a row for `name`. Call only inside the step's transaction.
    pub async fn record_applied(
        &self,
        tx: &mut PgConnection,
        name: &str,
    ) -> Result<DateTime<Utc>, sqlx::Error> {
        let sql = format!(
            "INSERT INTO {} (name) VALUES ($1) RETURNING applied_at",
            self.table
        );
        let row = sqlx::query(&sql).bind(name).fetch_one(&mut *tx).await?;
        row.try_get("applied_at")
    }

    /// Delete the row for `name`. Call only inside the step's transaction.
    ///
    /// A missing row is `RowNotFound`, which rolls the step back.
    pub async fn record_reverted(
        &self,
        tx: &mut PgConnection,
        name: &str,
    ) -> Result<DateTime<Utc>, sqlx::Error> {
        let sql = format!(
            "DELETE FROM {} WHERE name = $1 RETURNING now() AS reverted_at",
            self.table
        );
        let row = sqlx::query(&sql)
            .bind(name)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;
        row.try_get("reverted_at")
    }
}

fn first_missing_column(present: &[String]) -> Option<&'static str> {
    COLUMNS
        .into_iter()
        .find(|column| !present.iter().any(|p| p == column))
}

/// `[A-Za-z_][A-Za-z0-9_]*`, optionally qualified by one schema.
pub fn is_valid_table_name(table: &str) -> bool {
    let parts: Vec<&str> = table.split('.').collect();
    parts.len() <= 2 && parts.iter().all(|p| is_identifier(p))
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn quote_table_name(table: &str) -> String {
    table
        .split('.')
        .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}
