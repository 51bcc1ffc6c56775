//! Directory scanning
//!
//! Reads `<sequence>-<slug>.sql` files from the configured migration
//! directory and parses them into [`MigrationFile`]s.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{MigrateError, Result};
use crate::repository::MigrationFile;

/// Loader for a single directory of migration files.
///
/// Only regular `.sql` files are candidates. Anything else is skipped with a
/// warning, or rejected when strict mode is on. Dot-files are always skipped.
pub struct SqlRepository {
    dir: PathBuf,
    strict: bool,
}

impl SqlRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            strict: false,
        }
    }

    /// Treat unrecognized directory entries as fatal.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Scan the directory and parse every candidate file.
    ///
    /// The result is sorted by `(sequence, file_name)`. Duplicate sequences
    /// are returned as-is; rejecting them is the planner's job.
    pub fn load(&self) -> Result<Vec<MigrationFile>> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| MigrateError::Io {
            path: self.dir.clone(),
            source: e,
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| MigrateError::Io {
                path: self.dir.clone(),
                source: e,
            })?;
            let path = entry.path();

            if is_hidden(&path) {
                continue;
            }
            if !(path.is_file() && is_sql_file(&path)) {
                if self.strict {
                    return Err(MigrateError::malformed(
                        &path,
                        "unrecognized entry in migration directory (strict mode)",
                    ));
                }
                warn!(path = %path.display(), "Ignoring non-migration entry");
                continue;
            }

            files.push(self.load_file(&path)?);
        }

        files.sort_by(|a, b| {
            a.sequence
                .cmp(&b.sequence)
                .then_with(|| a.file_name.cmp(&b.file_name))
        });

        debug!(dir = %self.dir.display(), count = files.len(), "Loaded migration files");
        Ok(files)
    }

    /// Read and parse one migration file.
    pub fn load_file(&self, path: &Path) -> Result<MigrationFile> {
        let body = std::fs::read_to_string(path).map_err(|e| MigrateError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        MigrationFile::parse(path, &body)
    }
}

/// Check if a path has a `.sql` extension.
fn is_sql_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("sql"))
        .unwrap_or(false)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|f| f.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}
