use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use anyhow::Context;
use tracing::{debug, info, warn};

use memreport_domain::{localize, ProjectOracle};
use memreport_parse::{encoding_for_label, parse_report, Encoding, ReportError};
use memreport_types::{
    FailOn, IngestCounts, IngestReceipt, ProjectMeta, ReportKind, ReportStatus, ReportSummary,
    ToolMeta, VerdictStatus, INGEST_SCHEMA_V1,
};

use crate::sink::{IssueSink, UniqueIssues};

/// One report file to ingest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportInput {
    pub kind: ReportKind,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestPlan {
    pub reports: Vec<ReportInput>,
    /// Encoding label for text reports.
    pub encoding: String,
    /// Record failing reports in the receipt and keep going.
    pub error_recovery: bool,
    pub fail_on: FailOn,
    pub project: ProjectMeta,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestRun {
    pub receipt: IngestReceipt,
    pub markdown: String,
    pub exit_code: i32,
}

/// What one report contributed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportOutcome {
    pub records: u32,
    /// Issues the sink accepted.
    pub issues: u32,
    /// Accepted issues without a file anchor.
    pub project_issues: u32,
    /// Records with no frame in the project.
    pub unassigned: u32,
    /// Issues the sink already held.
    pub duplicates: u32,
}

/// Parse one report, localize its records and hand the issues to `sink`.
///
/// The report is parsed to completion before anything reaches the sink, so a
/// report that fails to parse contributes nothing.
pub fn ingest_report<R, O, S>(
    kind: ReportKind,
    reader: R,
    encoding: &'static Encoding,
    oracle: &O,
    sink: &mut S,
) -> Result<ReportOutcome, ReportError>
where
    R: BufRead,
    O: ProjectOracle + ?Sized,
    S: IssueSink + ?Sized,
{
    let records = parse_report(kind, reader, encoding)?;

    let mut outcome = ReportOutcome {
        records: records.len() as u32,
        ..ReportOutcome::default()
    };

    for record in &records {
        match localize(record, oracle) {
            Ok(issue) => {
                let project_wide = issue.is_project_wide();
                if sink.save(issue) {
                    outcome.issues += 1;
                    if project_wide {
                        outcome.project_issues += 1;
                    }
                } else {
                    outcome.duplicates += 1;
                }
            }
            Err(failure) => {
                warn!("{}", failure);
                outcome.unassigned += 1;
            }
        }
    }

    debug!(
        "{} report: {} record(s), {} new issue(s), {} unassigned, {} duplicate(s)",
        kind.as_str(),
        outcome.records,
        outcome.issues,
        outcome.unassigned,
        outcome.duplicates
    );
    Ok(outcome)
}

/// Ingest every report of `plan` into one deduplicated receipt.
pub fn run_ingest<O>(plan: &IngestPlan, oracle: &O) -> anyhow::Result<IngestRun>
where
    O: ProjectOracle + ?Sized,
{
    let encoding = encoding_for_label(&plan.encoding)
        .with_context(|| format!("resolve report encoding '{}'", plan.encoding))?;

    let mut sink = UniqueIssues::new();
    let mut reports = Vec::with_capacity(plan.reports.len());
    let mut counts = IngestCounts::default();

    for input in &plan.reports {
        info!("Reading {} report {}", input.kind.as_str(), input.path.display());

        let result = File::open(&input.path)
            .map_err(ReportError::Io)
            .and_then(|file| {
                ingest_report(input.kind, BufReader::new(file), encoding, oracle, &mut sink)
            });

        match result {
            Ok(outcome) => {
                counts.records += outcome.records;
                counts.project_issues += outcome.project_issues;
                counts.unassigned += outcome.unassigned;
                counts.duplicates += outcome.duplicates;
                reports.push(summary(input, ReportStatus::Parsed, outcome, None));
            }
            Err(e) if plan.error_recovery => {
                warn!(
                    "Skipping {} report {}: {}",
                    input.kind.as_str(),
                    input.path.display(),
                    e
                );
                counts.failed_reports += 1;
                reports.push(summary(
                    input,
                    ReportStatus::Failed,
                    ReportOutcome::default(),
                    Some(e.to_string()),
                ));
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!(
                        "ingest {} report '{}'",
                        input.kind.as_str(),
                        input.path.display()
                    )
                });
            }
        }
    }

    let issues = sink.into_issues();
    counts.issues = issues.len() as u32;

    let status = if counts.failed_reports > 0 {
        VerdictStatus::Error
    } else if counts.issues > 0 {
        VerdictStatus::Issues
    } else {
        VerdictStatus::Pass
    };

    let receipt = IngestReceipt {
        schema: INGEST_SCHEMA_V1.to_string(),
        tool: ToolMeta {
            name: "memreport".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        project: plan.project.clone(),
        reports,
        issues,
        counts,
        status,
        started_at: None,
    };

    let markdown = crate::render::render_markdown_for_receipt(&receipt);
    let exit_code = compute_exit_code(plan.fail_on, &receipt.counts);

    Ok(IngestRun {
        receipt,
        markdown,
        exit_code,
    })
}

fn summary(
    input: &ReportInput,
    status: ReportStatus,
    outcome: ReportOutcome,
    error: Option<String>,
) -> ReportSummary {
    ReportSummary {
        path: input.path.display().to_string(),
        kind: input.kind,
        status,
        records: outcome.records,
        issues: outcome.issues,
        unassigned: outcome.unassigned,
        duplicates: outcome.duplicates,
        error,
    }
}

/// `0` when clean or `fail_on = never`, `2` when issues were found, `3` when
/// a report failed and was skipped.
pub fn compute_exit_code(fail_on: FailOn, counts: &IngestCounts) -> i32 {
    if matches!(fail_on, FailOn::Never) {
        return 0;
    }

    if counts.failed_reports > 0 {
        return 3;
    }

    if counts.issues > 0 {
        return 2;
    }

    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use memreport_testkit::{DrMemoryReportBuilder, ValgrindErrorBuilder, ValgrindReportBuilder};
    use memreport_types::{Frame, Issue};

    fn in_src(path: &str) -> Option<String> {
        path.strip_prefix("/p/").map(str::to_string)
    }

    fn valgrind_report() -> String {
        ValgrindReportBuilder::new()
            .error(
                ValgrindErrorBuilder::new("InvalidRead")
                    .what("Invalid read of size 4")
                    .stack(vec![
                        Frame::new("/usr/lib/libc.c", Some(1)),
                        Frame::new("/p/src/a.c", Some(3)),
                    ]),
            )
            .error(
                ValgrindErrorBuilder::new("Leak_DefinitelyLost")
                    .xwhat("16 bytes in 1 blocks are definitely lost")
                    .stack(vec![Frame::new("/usr/lib/malloc.c", Some(9))]),
            )
            .error(
                ValgrindErrorBuilder::new("InvalidJump")
                    .what("Jump to the invalid address stated on the next line")
                    .unresolved_stack(),
            )
            .build()
    }

    #[test]
    fn counts_issues_unassigned_and_project_wide_records() {
        let mut sink = UniqueIssues::new();
        let outcome = ingest_report(
            ReportKind::Valgrind,
            valgrind_report().as_bytes(),
            utf8(),
            &in_src,
            &mut sink,
        )
        .unwrap();

        assert_eq!(
            outcome,
            ReportOutcome {
                records: 3,
                issues: 2,
                project_issues: 1,
                unassigned: 1,
                duplicates: 0,
            }
        );
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn ingesting_the_same_report_twice_only_counts_duplicates() {
        let mut sink = UniqueIssues::new();
        let xml = valgrind_report();
        ingest_report(ReportKind::Valgrind, xml.as_bytes(), utf8(), &in_src, &mut sink)
            .unwrap();
        let second = ingest_report(
            ReportKind::Valgrind,
            xml.as_bytes(),
            utf8(),
            &in_src,
            &mut sink,
        )
        .unwrap();

        assert_eq!(second.issues, 0);
        assert_eq!(second.duplicates, 2);
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn malformed_reports_emit_nothing() {
        let xml = ValgrindReportBuilder::new()
            .error(
                ValgrindErrorBuilder::new("InvalidRead")
                    .what("Invalid read of size 4")
                    .stack(vec![Frame::new("/p/src/a.c", Some(3))]),
            )
            .error(ValgrindErrorBuilder::new("InvalidWrite").what("Invalid write of size 4"))
            .build();

        let mut sink: Vec<Issue> = Vec::new();
        let err = ingest_report(ReportKind::Valgrind, xml.as_bytes(), utf8(), &in_src, &mut sink)
            .unwrap_err();
        assert!(err.is_malformed());
        assert!(sink.is_empty());
    }

    #[test]
    fn drmemory_reports_are_localized_in_file_order() {
        let text = DrMemoryReportBuilder::new()
            .error("LEAK 16 direct bytes", vec![Frame::new("/p/src/b.c", Some(4))])
            .error("UNINITIALIZED READ: reading register eax", vec![Frame::new("/p/src/a.c", Some(2))])
            .build();

        let mut sink: Vec<Issue> = Vec::new();
        let outcome =
            ingest_report(ReportKind::DrMemory, text.as_bytes(), utf8(), &in_src, &mut sink)
                .unwrap();

        assert_eq!(outcome.issues, 2);
        let rules: Vec<&str> = sink.iter().map(|i| i.rule_id.as_str()).collect();
        assert_eq!(rules, vec!["MemoryLeak", "UninitializedRead"]);
    }

    #[test]
    fn exit_codes_follow_fail_on() {
        let issues = IngestCounts {
            issues: 1,
            ..IngestCounts::default()
        };
        let failed = IngestCounts {
            issues: 1,
            failed_reports: 1,
            ..IngestCounts::default()
        };

        assert_eq!(compute_exit_code(FailOn::Issues, &IngestCounts::default()), 0);
        assert_eq!(compute_exit_code(FailOn::Issues, &issues), 2);
        assert_eq!(compute_exit_code(FailOn::Issues, &failed), 3);
        assert_eq!(compute_exit_code(FailOn::Never, &issues), 0);
        assert_eq!(compute_exit_code(FailOn::Never, &failed), 0);
    }

    fn utf8() -> &'static Encoding {
        encoding_for_label("utf-8").unwrap()
    }
}
