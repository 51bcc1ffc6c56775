//! Configuration file parsing
//!
//! Reads strap.toml configuration files.

use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use strum::IntoEnumIterator;
use strum_macros::{EnumIter, EnumString, IntoStaticStr};
use thiserror::Error;

use crate::ledger::{DEFAULT_TABLE, Ledger, is_valid_table_name};
use crate::repository::SqlRepository;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Connection settings. Unset or empty values fall back to the libpq
/// environment (`PGHOST`, `PGUSER`, ...) and then to libpq defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Database name
    pub name: Option<String>,
    /// disable, allow, prefer, require, verify-ca or verify-full
    pub sslmode: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MigrationConfig {
    /// Directory holding the migration files
    #[serde(default = "default_directory")]
    pub directory: PathBuf,

    /// Ledger table, optionally schema-qualified
    #[serde(default = "default_table")]
    pub table: String,

    /// Reject unrecognized entries in the migration directory instead of
    /// skipping them
    #[serde(default)]
    pub strict: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            table: default_table(),
            strict: false,
        }
    }
}

/// libpq `sslmode` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, EnumString, IntoStaticStr)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum SslMode {
    Disable,
    Allow,
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl From<SslMode> for PgSslMode {
    fn from(mode: SslMode) -> Self {
        match mode {
            SslMode::Disable => PgSslMode::Disable,
            SslMode::Allow => PgSslMode::Allow,
            SslMode::Prefer => PgSslMode::Prefer,
            SslMode::Require => PgSslMode::Require,
            SslMode::VerifyCa => PgSslMode::VerifyCa,
            SslMode::VerifyFull => PgSslMode::VerifyFull,
        }
    }
}

fn default_directory() -> PathBuf {
    PathBuf::from("db/migrations")
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

impl DatabaseConfig {
    /// Connection options for this configuration.
    pub fn connect_options(&self) -> Result<PgConnectOptions, ConfigError> {
        let mut options = PgConnectOptions::new();
        if let Some(host) = non_empty(&self.host) {
            options = options.host(host);
        }
        if let Some(port) = self.port {
            options = options.port(port);
        }
        if let Some(user) = non_empty(&self.user) {
            options = options.username(user);
        }
        if let Some(password) = non_empty(&self.password) {
            options = options.password(password);
        }
        if let Some(name) = non_empty(&self.name) {
            options = options.database(name);
        }
        if let Some(mode) = self.ssl_mode()? {
            options = options.ssl_mode(mode.into());
        }
        Ok(options)
    }

    pub fn ssl_mode(&self) -> Result<Option<SslMode>, ConfigError> {
        non_empty(&self.sslmode)
            .map(|mode| {
                SslMode::from_str(mode).map_err(|_| {
                    let valid: Vec<&'static str> = SslMode::iter().map(Into::into).collect();
                    ConfigError::Validation(format!(
                        "invalid sslmode '{}'. Valid values: {}",
                        mode,
                        valid.join(", ")
                    ))
                })
            })
            .transpose()
    }
}

impl MigrationConfig {
    pub fn repository(&self) -> SqlRepository {
        SqlRepository::new(&self.directory).strict(self.strict)
    }

    pub fn ledger(&self) -> Ledger {
        Ledger::new(&self.table)
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.migration.directory.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "migration directory must not be empty".to_string(),
            ));
        }
        if !is_valid_table_name(&self.migration.table) {
            return Err(ConfigError::Validation(format!(
                "invalid ledger table name '{}'. Use an identifier, optionally schema-qualified (e.g. public.migrations)",
                self.migration.table
            )));
        }
        self.database.ssl_mode()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper: parse TOML into Config and run validation.
    fn parse_and_validate(toml_str: &str) -> Result<Config, ConfigError> {
        let config: Config = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = parse_and_validate("").expect("empty config");
        assert_eq!(config.migration.directory, PathBuf::from("db/migrations"));
        assert_eq!(config.migration.table, "migrations");
        assert!(!config.migration.strict);
        assert!(config.database.host.is_none());
    }

    #[test]
    fn test_full_file() {
        let toml = r#"
[database]
host = "db.internal"
port = 6543
user = "deploy"
password = "secret"
name = "app"
sslmode = "require"

[migration]
directory = "migrations"
table = "ops.schema_log"
strict = true
"#;
        let config = parse_and_validate(toml).expect("valid config");
        assert_eq!(config.migration.directory, PathBuf::from("migrations"));
        assert!(config.migration.strict);

        let options = config.database.connect_options().expect("options");
        assert_eq!(options.get_host(), "db.internal");
        assert_eq!(options.get_port(), 6543);
        assert_eq!(options.get_username(), "deploy");
        assert_eq!(options.get_database(), Some("app"));
        assert!(matches!(options.get_ssl_mode(), PgSslMode::Require));
    }

    #[test]
    fn test_empty_strings_are_ignored() {
        let toml = r#"
[database]
host = "db.internal"
user = ""
password = ""
name = ""
"#;
        let config = parse_and_validate(toml).expect("valid config");
        let options = config.database.connect_options().expect("options");
        assert_eq!(options.get_host(), "db.internal");
        assert!(config.database.ssl_mode().expect("sslmode").is_none());
    }

    #[test]
    fn test_invalid_sslmode_rejected() {
        let err = parse_and_validate("[database]\nsslmode = \"sometimes\"").unwrap_err();
        assert!(
            err.to_string().contains(
                "invalid sslmode 'sometimes'. Valid values: disable, allow, prefer, require, verify-ca, verify-full"
            ),
            "Expected validation error, got: {}",
            err
        );
    }

    #[test]
    fn test_sslmode_names() {
        for mode in SslMode::iter() {
            let name: &'static str = mode.into();
            assert_eq!(SslMode::from_str(name).ok(), Some(mode));
            assert_eq!(SslMode::from_str(&name.to_uppercase()).ok(), Some(mode));
        }
    }

    #[test]
    fn test_invalid_table_rejected() {
        for table in ["", "drop table x;", "a.b.c", "2fast"] {
            let toml = format!("[migration]\ntable = \"{}\"", table);
            let err = parse_and_validate(&toml).unwrap_err();
            assert!(
                err.to_string().contains("invalid ledger table name"),
                "table '{}': got {}",
                table,
                err
            );
        }
    }

    #[test]
    fn test_empty_directory_rejected() {
        let err = parse_and_validate("[migration]\ndirectory = \"\"").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)), "got: {err:?}");
    }

    #[test]
    fn test_unknown_port_type_is_parse_error() {
        let err = parse_and_validate("[database]\nport = \"fast\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)), "got: {err:?}");
    }

    #[test]
    fn test_from_file_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = Config::from_file(&dir.path().join("strap.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)), "got: {err:?}");
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }
}
