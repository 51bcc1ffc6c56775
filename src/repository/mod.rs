//! Migration files on disk
//!
//! A migration is a single `<sequence>-<slug>.sql` file whose body holds the
//! forward SQL, a delimiter line, and the rollback SQL.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{MigrateError, Result};

pub mod sql;

pub use sql::SqlRepository;

/// Line separating the up-section from the down-section.
pub const DELIMITER: &str = "---- create above / drop below ----";

/// One parsed migration file. Built fresh on every scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationFile {
    /// Integer prefix of the file name; defines the total order.
    pub sequence: u64,
    /// Slug between the first `-` and `.sql`.
    pub name: String,
    /// Exact on-disk file name. This is the key stored in the ledger.
    pub file_name: String,
    #[serde(skip)]
    pub up: String,
    /// `None` when the file has no delimiter line.
    #[serde(skip)]
    pub down: Option<String>,
    #[serde(skip)]
    pub path: PathBuf,
}

impl MigrationFile {
    /// Build a migration from its file name and body.
    ///
    /// `path` is only used for identity and error messages; nothing is read.
    pub fn parse(path: &Path, body: &str) -> Result<Self> {
        let file_name = path
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .ok_or_else(|| MigrateError::malformed(path, "path has no file name"))?;

        let (sequence, name) =
            parse_file_name(&file_name).map_err(|reason| MigrateError::malformed(path, reason))?;
        let (up, down) =
            split_sections(body).map_err(|reason| MigrateError::malformed(path, reason))?;

        Ok(Self {
            sequence,
            name: name.to_string(),
            file_name,
            up,
            down,
            path: path.to_path_buf(),
        })
    }
}

/// Split `<digits>-<slug>.sql` into its sequence and slug.
pub(crate) fn parse_file_name(file_name: &str) -> std::result::Result<(u64, &str), String> {
    let stem = strip_sql_extension(file_name)
        .ok_or_else(|| format!("'{file_name}' does not end in .sql"))?;

    let (prefix, slug) = stem
        .split_once('-')
        .ok_or_else(|| format!("'{file_name}' has no '-' between sequence and name"))?;

    if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!(
            "sequence prefix '{prefix}' of '{file_name}' is not a non-negative integer"
        ));
    }
    let sequence = prefix
        .parse::<u64>()
        .map_err(|e| format!("sequence prefix '{prefix}' of '{file_name}': {e}"))?;

    if slug.is_empty() {
        return Err(format!("'{file_name}' has an empty name after the sequence"));
    }

    Ok((sequence, slug))
}

fn strip_sql_extension(file_name: &str) -> Option<&str> {
    let dot = file_name.rfind('.')?;
    file_name[dot + 1..]
        .eq_ignore_ascii_case("sql")
        .then(|| &file_name[..dot])
}

/// Split a body on the delimiter line.
///
/// Returns the up-section and, if the delimiter is present, the down-section.
pub(crate) fn split_sections(body: &str) -> std::result::Result<(String, Option<String>), String> {
    let mut up = String::new();
    let mut down: Option<String> = None;

    for line in body.split_inclusive('\n') {
        if line.trim() == DELIMITER {
            if down.is_some() {
                return Err(format!("delimiter '{DELIMITER}' appears more than once"));
            }
            down = Some(String::new());
            continue;
        }
        match down.as_mut() {
            Some(section) => section.push_str(line),
            None => up.push_str(line),
        }
    }

    Ok((up, down))
}
