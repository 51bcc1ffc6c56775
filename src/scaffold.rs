//! Project and migration file templates
//!
//! `strap init` writes [`CONFIG_TEMPLATE`]; `strap create` writes a
//! timestamped [`MIGRATION_TEMPLATE`] into the migration directory.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::repository::DELIMITER;

pub const CONFIG_TEMPLATE: &str = r#"[database]
# Empty values fall back to the PGHOST, PGPORT, PGUSER, PGPASSWORD and
# PGDATABASE environment variables.
host = "localhost"
port = 5432
user = ""
password = ""
name = ""
sslmode = "prefer"

[migration]
# Relative to the working directory
directory = "db/migrations"
table = "migrations"
strict = false
"#;

pub const MIGRATION_TEMPLATE: &str = concat!(
    "-- Write your migrate up statements here\n",
    "\n",
    "---- create above / drop below ----\n",
    "\n",
    "-- Write your migrate down statements here\n",
);

#[derive(Debug, Error)]
pub enum ScaffoldError {
    #[error("{} already exists (use --force to overwrite)", .0.display())]
    AlreadyExists(PathBuf),

    #[error("Invalid migration name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("IO error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> ScaffoldError + '_ {
    move |source| ScaffoldError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Write the config template to `path`. An existing file is only replaced
/// when `force` is set.
pub fn init(path: &Path, force: bool) -> Result<(), ScaffoldError> {
    let mut options = OpenOptions::new();
    options.write(true);
    if force {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }

    let mut file = options.open(path).map_err(|e| match e.kind() {
        io::ErrorKind::AlreadyExists => ScaffoldError::AlreadyExists(path.to_path_buf()),
        _ => io_error(path)(e),
    })?;
    file.write_all(CONFIG_TEMPLATE.as_bytes())
        .map_err(io_error(path))?;

    info!(path = %path.display(), "Wrote config template");
    Ok(())
}

/// Normalize a user-supplied migration name into a file-name slug.
///
/// Surrounding whitespace is dropped and inner spaces become `_`; anything
/// other than ASCII letters, digits, `_` and `-` is rejected.
pub fn slugify(name: &str) -> Result<String, ScaffoldError> {
    let invalid = |reason: &str| ScaffoldError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let slug = name.trim().replace(' ', "_");
    if slug.is_empty() {
        return Err(invalid("name is empty"));
    }
    if let Some(c) = slug
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(invalid(&format!(
            "'{c}' is not allowed; use ASCII letters, digits, '_' or '-'"
        )));
    }
    Ok(slug)
}

/// Create `<millis>-<slug>.sql` in `dir` (creating `dir` if needed) and
/// return its path. Never overwrites.
pub fn create_migration(dir: &Path, name: &str, millis: i64) -> Result<PathBuf, ScaffoldError> {
    let slug = slugify(name)?;
    std::fs::create_dir_all(dir).map_err(io_error(dir))?;

    let path = dir.join(format!("{millis}-{slug}.sql"));
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .map_err(|e| match e.kind() {
            io::ErrorKind::AlreadyExists => ScaffoldError::AlreadyExists(path.clone()),
            _ => io_error(&path)(e),
        })?;
    file.write_all(MIGRATION_TEMPLATE.as_bytes())
        .map_err(io_error(&path))?;

    info!(path = %path.display(), "Created migration");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::repository::MigrationFile;

    #[test]
    fn test_template_contains_delimiter() {
        assert!(MIGRATION_TEMPLATE.lines().any(|l| l == DELIMITER));
    }

    #[test]
    fn test_init_writes_loadable_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("strap.toml");

        init(&path, false).expect("init");

        let config = Config::from_file(&path).expect("template should load");
        assert_eq!(config.migration.table, "migrations");
        assert_eq!(config.database.port, Some(5432));
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("strap.toml");
        std::fs::write(&path, "# mine\n").expect("write");

        match init(&path, false) {
            Err(ScaffoldError::AlreadyExists(p)) => assert_eq!(p, path),
            other => panic!("Expected AlreadyExists, got: {:?}", other),
        }
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "# mine\n");
    }

    #[test]
    fn test_init_force_overwrites() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("strap.toml");
        std::fs::write(&path, "# mine\n").expect("write");

        init(&path, true).expect("init --force");
        assert_eq!(std::fs::read_to_string(&path).expect("read"), CONFIG_TEMPLATE);
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("create_users").unwrap(), "create_users");
        assert_eq!(slugify("  add email index ").unwrap(), "add_email_index");
        assert_eq!(slugify("v2-backfill").unwrap(), "v2-backfill");
    }

    #[test]
    fn test_slugify_rejects() {
        for name in ["", "   ", "drop/table", "naïve", "a.sql"] {
            assert!(
                matches!(slugify(name), Err(ScaffoldError::InvalidName { .. })),
                "'{name}' should be rejected"
            );
        }
    }

    #[test]
    fn test_create_migration_writes_template() {
        let dir = tempfile::tempdir().expect("tempdir");
        let migrations = dir.path().join("db").join("migrations");

        let path = create_migration(&migrations, "create users", 1_700_000_000_000)
            .expect("create");

        assert_eq!(path, migrations.join("1700000000000-create_users.sql"));
        let body = std::fs::read_to_string(&path).expect("read");
        assert_eq!(body, MIGRATION_TEMPLATE);

        let file = MigrationFile::parse(&path, &body).expect("template should parse");
        assert_eq!(file.sequence, 1_700_000_000_000);
        assert_eq!(file.name, "create_users");
        assert!(file.down.is_some());
        assert!(crate::sql::is_blank(&file.up));
    }

    #[test]
    fn test_create_migration_never_overwrites() {
        let dir = tempfile::tempdir().expect("tempdir");
        create_migration(dir.path(), "a", 5).expect("first");
        assert!(matches!(
            create_migration(dir.path(), "a", 5),
            Err(ScaffoldError::AlreadyExists(_))
        ));
    }
}
