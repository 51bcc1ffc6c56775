//! Output reporters for different formats
//!
//! Renders status reports, run summaries and check results as text or JSON.
//! Reporters write to any `io::Write`; the binary hands them stdout.

use std::io::Write;

use thiserror::Error;

use crate::executor::RunSummary;
use crate::planner::StatusReport;
use crate::sql::FileCheck;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("IO error writing report: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Trait for output format reporters.
pub trait Reporter {
    fn status(&self, report: &StatusReport, out: &mut dyn Write) -> Result<(), ReportError>;

    fn summary(&self, summary: &RunSummary, out: &mut dyn Write) -> Result<(), ReportError>;

    fn check(&self, checks: &[FileCheck], out: &mut dyn Write) -> Result<(), ReportError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl OutputFormat {
    pub fn reporter(self) -> Box<dyn Reporter> {
        match self {
            Self::Text => Box::new(TextReporter::new()),
            Self::Json => Box::new(JsonReporter::new()),
        }
    }
}

pub struct TextReporter;

impl TextReporter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TextReporter {
    fn default() -> Self {
        Self::new()
    }
}

pub struct JsonReporter;

impl JsonReporter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for JsonReporter {
    fn default() -> Self {
        Self::new()
    }
}

pub mod json;
pub mod text;
