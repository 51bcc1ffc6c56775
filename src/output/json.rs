//! JSON output reporter
//!
//! Pretty-printed `serde_json` of the report types, one document per call.

use std::io::Write;

use serde::Serialize;

use crate::executor::RunSummary;
use crate::output::{JsonReporter, ReportError, Reporter};
use crate::planner::StatusReport;
use crate::sql::FileCheck;

#[derive(Serialize)]
struct CheckReport<'a> {
    files: &'a [FileCheck],
}

fn write_json<T: Serialize>(value: &T, out: &mut dyn Write) -> Result<(), ReportError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| ReportError::Serialization(e.to_string()))?;
    out.write_all(json.as_bytes())?;
    out.write_all(b"\n")?;
    Ok(())
}

impl Reporter for JsonReporter {
    fn status(&self, report: &StatusReport, out: &mut dyn Write) -> Result<(), ReportError> {
        write_json(report, out)
    }

    fn summary(&self, summary: &RunSummary, out: &mut dyn Write) -> Result<(), ReportError> {
        write_json(summary, out)
    }

    fn check(&self, checks: &[FileCheck], out: &mut dyn Write) -> Result<(), ReportError> {
        write_json(&CheckReport { files: checks }, out)
    }
}
