//! strap: schema migrations for PostgreSQL
//!
//! This library loads `<sequence>-<slug>.sql` migration files, compares them
//! against a ledger table in the target database, and applies or reverts
//! them one transaction per file.

pub mod config;
pub mod error;
pub mod executor;
pub mod ledger;
pub mod migrator;
pub mod output;
pub mod planner;
pub mod repository;
pub mod scaffold;
pub mod sql;

#[cfg(test)]
mod test_helpers;

// Re-export commonly used types
pub use config::Config;
pub use error::{MigrateError, Result};
pub use executor::{Backend, PgBackend, RunSummary};
pub use ledger::{Ledger, LedgerEntry};
pub use migrator::Migrator;
pub use planner::{Direction, ExecutionPlan, RollbackCount, StatusReport};
pub use repository::{MigrationFile, SqlRepository};
