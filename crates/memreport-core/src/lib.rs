//! Core engine: orchestrates report parsing + issue localization + reporting.

mod fingerprint;
mod ingest;
mod project;
mod render;
mod sarif;
mod sink;

pub use fingerprint::compute_fingerprint;
pub use ingest::{
    compute_exit_code, ingest_report, run_ingest, IngestPlan, IngestRun, ReportInput,
    ReportOutcome,
};
pub use project::{scan_project, ProjectScanError};
pub use render::render_markdown_for_receipt;
pub use sarif::{render_sarif_for_receipt, render_sarif_json, SarifReport};
pub use sink::{IssueSink, UniqueIssues};
