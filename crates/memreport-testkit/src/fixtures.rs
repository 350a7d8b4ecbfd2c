//! Common test fixtures for memreport.
//!
//! The report files under `fixtures/` are shaped after real memcheck and
//! Dr. Memory runs against a small C++ project rooted at
//! [`sample_project::ROOT`].

use memreport_types::{
    ConfigFile, Defaults, FailOn, IngestCounts, IngestReceipt, Issue, IssueLocation, ProjectMeta,
    ReportKind, ReportStatus, ReportSummary, ToolMeta, VerdictStatus, INGEST_SCHEMA_V1,
};

// =============================================================================
// Valgrind reports
// =============================================================================

/// Valgrind `--xml=yes` reports.
pub mod valgrind_reports {
    /// Number of `<error>` blocks in [`sample_1`].
    pub const SAMPLE_1_ERRORS: usize = 13;

    /// A full memcheck run with thirteen distinct errors, including two leaks
    /// reported through `<xwhat>` and one error without any source frame.
    pub fn sample_1() -> &'static str {
        include_str!("../fixtures/valgrind/valgrind-result-SAMPLE_1.xml")
    }

    /// One error with two `<stack>` blocks (access site and allocation site).
    pub fn multi_stack() -> &'static str {
        include_str!("../fixtures/valgrind/valgrind-result-SAMPLE_2.xml")
    }

    /// One error with a `<what>` and two `<auxwhat>` explanations.
    pub fn multi_auxwhat() -> &'static str {
        include_str!("../fixtures/valgrind/valgrind-result-SAMPLE_3.xml")
    }

    pub fn missing_kind() -> &'static str {
        include_str!("../fixtures/valgrind/incorrect-valgrind-result_1.xml")
    }

    pub fn missing_what() -> &'static str {
        include_str!("../fixtures/valgrind/incorrect-valgrind-result_2.xml")
    }

    pub fn missing_stack() -> &'static str {
        include_str!("../fixtures/valgrind/incorrect-valgrind-result_3.xml")
    }

    /// All three incomplete reports.
    pub fn incomplete() -> Vec<(&'static str, &'static str)> {
        vec![
            ("missing_kind", missing_kind()),
            ("missing_what", missing_what()),
            ("missing_stack", missing_stack()),
        ]
    }
}

// =============================================================================
// Dr. Memory reports
// =============================================================================

/// Dr. Memory `results.txt` reports.
pub mod drmemory_reports {
    /// Number of `Error #n:` blocks in [`results`].
    pub const RESULTS_ERRORS: usize = 6;

    /// A Windows run with six errors: access, uninitialized read, invalid heap
    /// argument, leak, possible leak (no project frame) and a handle leak
    /// without frames.
    pub fn results() -> &'static str {
        include_str!("../fixtures/drmemory/results.txt")
    }
}

// =============================================================================
// Sample project
// =============================================================================

/// The project the sample reports were captured from.
pub mod sample_project {
    /// Root of the project as seen by the Valgrind runs.
    pub const ROOT: &str = "/home/ci/project";

    /// Root of the same project on the Windows runner used by Dr. Memory.
    pub const WINDOWS_ROOT: &str = "C:\\ci\\project";

    /// Project-relative source files.
    pub const FILES: &[&str] = &[
        "src/main.cpp",
        "src/buffer.cpp",
        "src/parser.cpp",
        "src/writer.cpp",
        "src/checks.cpp",
        "include/buffer.hpp",
    ];

    pub fn files() -> Vec<String> {
        FILES.iter().map(|f| f.to_string()).collect()
    }
}

// =============================================================================
// Sample configs and receipts
// =============================================================================

/// Collection of sample configuration files for testing.
pub mod sample_configs {
    use super::*;

    pub fn empty() -> ConfigFile {
        ConfigFile::default()
    }

    /// A configuration touching every `[defaults]` key.
    pub fn full() -> ConfigFile {
        ConfigFile {
            includes: vec!["shared/memreport.toml".to_string()],
            defaults: Defaults {
                project_root: Some(super::sample_project::ROOT.to_string()),
                encoding: Some("windows-1252".to_string()),
                error_recovery: Some(true),
                fail_on: Some(FailOn::Never),
                exclude: vec!["third_party/**".to_string(), "**/*.generated.cpp".to_string()],
            },
        }
    }
}

/// Collection of sample ingest receipts for testing.
pub mod sample_receipts {
    use super::*;

    fn tool() -> ToolMeta {
        ToolMeta {
            name: "memreport".to_string(),
            version: "0.1.0".to_string(),
        }
    }

    /// A receipt for a run that found nothing.
    pub fn clean() -> IngestReceipt {
        IngestReceipt {
            schema: INGEST_SCHEMA_V1.to_string(),
            tool: tool(),
            project: ProjectMeta {
                root: super::sample_project::ROOT.to_string(),
                files: super::sample_project::FILES.len() as u32,
            },
            reports: vec![],
            issues: vec![],
            counts: IngestCounts::default(),
            status: VerdictStatus::Pass,
            started_at: None,
        }
    }

    /// A receipt with one anchored issue, one project-wide issue and a failed report.
    pub fn with_issues() -> IngestReceipt {
        IngestReceipt {
            reports: vec![
                ReportSummary {
                    path: "valgrind.xml".to_string(),
                    kind: ReportKind::Valgrind,
                    status: ReportStatus::Parsed,
                    records: 3,
                    issues: 2,
                    unassigned: 1,
                    duplicates: 0,
                    error: None,
                },
                ReportSummary {
                    path: "broken.xml".to_string(),
                    kind: ReportKind::Valgrind,
                    status: ReportStatus::Failed,
                    records: 0,
                    issues: 0,
                    unassigned: 0,
                    duplicates: 0,
                    error: Some("malformed report at byte 212: <error> has no <kind>".to_string()),
                },
            ],
            issues: vec![
                Issue {
                    rule_id: "InvalidRead".to_string(),
                    file: Some("src/buffer.cpp".to_string()),
                    line: Some(44),
                    message: "Invalid read of size 4".to_string(),
                    locations: vec![
                        IssueLocation {
                            file: "src/buffer.cpp".to_string(),
                            line: Some(44),
                            info: "#0 /home/ci/project/src/buffer.cpp:44".to_string(),
                        },
                        IssueLocation {
                            file: "src/main.cpp".to_string(),
                            line: Some(30),
                            info: "#1 /home/ci/project/src/main.cpp:30".to_string(),
                        },
                    ],
                },
                Issue {
                    rule_id: "InvalidJump".to_string(),
                    file: None,
                    line: None,
                    message: "Jump to the invalid address stated on the next line".to_string(),
                    locations: vec![],
                },
            ],
            counts: IngestCounts {
                records: 3,
                issues: 2,
                project_issues: 1,
                unassigned: 1,
                duplicates: 0,
                failed_reports: 1,
            },
            status: VerdictStatus::Error,
            started_at: Some("2026-10-18T12:00:00Z".to_string()),
            ..clean()
        }
    }
}
