//! Human-readable text output reporter
//!
//! One line per migration, for terminal use:
//! ```text
//! applied  1700000000000-create_users.sql  2026-01-01 00:00:01 UTC
//! pending  1700000000500-add_email.sql
//! ```

use std::fmt::Write as FmtWrite;
use std::io::Write;

use chrono::{DateTime, Utc};

use crate::executor::RunSummary;
use crate::output::{ReportError, Reporter, TextReporter};
use crate::planner::{Direction, StatusReport};
use crate::sql::FileCheck;

fn timestamp(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn format_status(report: &StatusReport) -> String {
    let width = report
        .applied
        .iter()
        .map(|m| m.file_name.len())
        .chain(report.pending.iter().map(|m| m.file_name.len()))
        .chain(report.orphaned.iter().map(|e| e.name.len()))
        .max()
        .unwrap_or(0);

    let mut buf = String::new();
    for m in &report.applied {
        let _ = writeln!(
            buf,
            "applied  {:<width$}  {}",
            m.file_name,
            timestamp(&m.applied_at)
        );
    }
    for m in &report.pending {
        let _ = writeln!(buf, "pending  {}", m.file_name);
    }
    for e in &report.orphaned {
        let _ = writeln!(
            buf,
            "orphaned {:<width$}  {}  (no matching file)",
            e.name,
            timestamp(&e.applied_at)
        );
    }
    if !buf.is_empty() {
        buf.push('\n');
    }
    let _ = writeln!(
        buf,
        "{} applied, {} pending",
        report.applied.len(),
        report.pending.len()
    );
    buf
}

fn format_summary(summary: &RunSummary) -> String {
    let (verb, noop) = match summary.direction {
        Direction::Forward => ("Applied", "Nothing to apply; database is up to date"),
        Direction::Backward => ("Reverted", "Nothing to roll back"),
    };
    if summary.is_noop() {
        return format!("{noop}\n");
    }

    let mut buf = String::new();
    for step in &summary.steps {
        let _ = writeln!(buf, "{verb} {}", step.file_name);
    }
    let _ = writeln!(
        buf,
        "{} migration(s) {}",
        summary.steps.len(),
        verb.to_lowercase()
    );
    buf
}

fn format_check(checks: &[FileCheck]) -> String {
    let width = checks.iter().map(|c| c.file_name.len()).max().unwrap_or(0);

    let mut buf = String::new();
    for c in checks {
        let down = match c.down_statements {
            Some(n) => format!("down: {n}"),
            None => "no rollback".to_string(),
        };
        let _ = writeln!(
            buf,
            "{:<width$}  up: {}  {}",
            c.file_name, c.up_statements, down
        );
    }
    let _ = writeln!(buf, "{} file(s) OK", checks.len());
    buf
}

impl Reporter for TextReporter {
    fn status(&self, report: &StatusReport, out: &mut dyn Write) -> Result<(), ReportError> {
        out.write_all(format_status(report).as_bytes())?;
        Ok(())
    }

    fn summary(&self, summary: &RunSummary, out: &mut dyn Write) -> Result<(), ReportError> {
        out.write_all(format_summary(summary).as_bytes())?;
        Ok(())
    }

    fn check(&self, checks: &[FileCheck], out: &mut dyn Write) -> Result<(), ReportError> {
        out.write_all(format_check(checks).as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::AppliedStep;
    use crate::ledger::LedgerEntry;
    use crate::planner::{AppliedMigration, PendingMigration};
    use chrono::TimeZone;

    fn at(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, secs).unwrap()
    }

    #[test]
    fn status_lists_applied_then_pending() {
        let report = StatusReport {
            applied: vec![AppliedMigration {
                file_name: "1-init.sql".to_string(),
                sequence: 1,
                applied_at: at(1),
            }],
            pending: vec![PendingMigration {
                file_name: "2-add-col.sql".to_string(),
                sequence: 2,
            }],
            orphaned: vec![],
        };

        insta::assert_snapshot!(format_status(&report), @r"
        applied  1-init.sql     2026-01-01 00:00:01 UTC
        pending  2-add-col.sql

        1 applied, 1 pending
        ");
    }

    #[test]
    fn status_marks_orphans() {
        let report = StatusReport {
            orphaned: vec![LedgerEntry {
                id: 4,
                name: "9-gone.sql".to_string(),
                applied_at: at(9),
            }],
            ..StatusReport::default()
        };

        let text = format_status(&report);
        assert!(text.starts_with("orphaned 9-gone.sql  2026-01-01 00:00:09 UTC  (no matching file)\n"));
        assert!(text.ends_with("0 applied, 0 pending\n"));
    }

    #[test]
    fn empty_status_is_single_line() {
        assert_eq!(
            format_status(&StatusReport::default()),
            "0 applied, 0 pending\n"
        );
    }

    #[test]
    fn summary_lists_steps() {
        let summary = RunSummary {
            direction: Direction::Backward,
            steps: vec![
                AppliedStep {
                    file_name: "2-b.sql".to_string(),
                    sequence: 2,
                    direction: Direction::Backward,
                    at: at(3),
                },
                AppliedStep {
                    file_name: "1-a.sql".to_string(),
                    sequence: 1,
                    direction: Direction::Backward,
                    at: at(4),
                },
            ],
        };

        insta::assert_snapshot!(format_summary(&summary), @r"
        Reverted 2-b.sql
        Reverted 1-a.sql
        2 migration(s) reverted
        ");
    }

    #[test]
    fn noop_summary() {
        let summary = RunSummary {
            direction: Direction::Forward,
            steps: vec![],
        };
        assert_eq!(
            format_summary(&summary),
            "Nothing to apply; database is up to date\n"
        );
    }

    #[test]
    fn check_flags_up_only_files() {
        let checks = vec![
            FileCheck {
                file_name: "1-init.sql".to_string(),
                sequence: 1,
                up_statements: 2,
                down_statements: Some(1),
            },
            FileCheck {
                file_name: "2-seed.sql".to_string(),
                sequence: 2,
                up_statements: 1,
                down_statements: None,
            },
        ];

        insta::assert_snapshot!(format_check(&checks), @r"
        1-init.sql  up: 2  down: 1
        2-seed.sql  up: 1  no rollback
        2 file(s) OK
        ");
    }

    #[test]
    fn reporter_writes_to_sink() {
        let mut out: Vec<u8> = Vec::new();
        TextReporter::new()
            .check(&[], &mut out)
            .expect("write report");
        assert_eq!(String::from_utf8(out).expect("utf8"), "0 file(s) OK\n");
    }
}
