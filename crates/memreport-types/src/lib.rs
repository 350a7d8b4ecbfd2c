//! Data types (stack model + issues + receipts + config) for memreport.
//!
//! This crate is intentionally "dumb": pure DTOs with serde + schemars.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// ── Schema Identifiers ─────────────────────────────────────────
pub const INGEST_SCHEMA_V1: &str = "memreport.ingest.v1";

// ── Defaults ───────────────────────────────────────────────────
pub const DEFAULT_ENCODING: &str = "utf-8";

/// One stack entry: a source file and, when the tool knew it, a line.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub struct Frame {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

impl Frame {
    pub fn new(file: impl Into<String>, line: Option<u32>) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

/// One call/allocation trace, outermost call first.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub struct Stack {
    pub frames: Vec<Frame>,
}

impl Stack {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self { frames }
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// A parsed diagnostic before it is anchored to the project.
///
/// `stacks` keeps every trace the tool emitted for the error, in document
/// order. An empty list means a module-level error.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub struct ErrorRecord {
    pub kind: String,
    pub message: String,
    #[serde(default)]
    pub stacks: Vec<Stack>,
}

impl ErrorRecord {
    /// All frames, stack by stack, frame by frame.
    pub fn frames(&self) -> impl Iterator<Item = &Frame> + '_ {
        self.stacks.iter().flat_map(|s| s.frames.iter())
    }

    pub fn has_frames(&self) -> bool {
        self.stacks.iter().any(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    /// Valgrind `--xml=yes` output.
    Valgrind,
    /// Dr. Memory `results.txt`.
    DrMemory,
}

impl ReportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportKind::Valgrind => "valgrind",
            ReportKind::DrMemory => "drmemory",
        }
    }
}

/// A labeled secondary position attached to an issue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct IssueLocation {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    pub info: String,
}

/// A localized issue, ready for a sink.
///
/// `file == None` marks a project-wide issue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Issue {
    pub rule_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<IssueLocation>,
}

impl Issue {
    pub fn key(&self) -> IssueKey {
        IssueKey {
            rule_id: self.rule_id.clone(),
            file: self.file.clone(),
            line: self.line,
            message: self.message.clone(),
        }
    }

    pub fn is_project_wide(&self) -> bool {
        self.file.is_none()
    }
}

/// Identity under which sinks treat two issues as duplicates.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IssueKey {
    pub rule_id: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub message: String,
}

// ── Receipts ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ToolMeta {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ProjectMeta {
    pub root: String,
    pub files: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Parsed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ReportSummary {
    pub path: String,
    pub kind: ReportKind,
    pub status: ReportStatus,
    pub records: u32,
    pub issues: u32,
    /// Records with frames but none inside the project.
    pub unassigned: u32,
    pub duplicates: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum VerdictStatus {
    Pass,
    Issues,
    /// At least one report could not be parsed (error recovery enabled).
    Error,
}

impl VerdictStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            VerdictStatus::Pass => "pass",
            VerdictStatus::Issues => "issues",
            VerdictStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct IngestCounts {
    pub records: u32,
    pub issues: u32,
    /// Issues without a file anchor.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub project_issues: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub unassigned: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub duplicates: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub failed_reports: u32,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct IngestReceipt {
    pub schema: String,
    pub tool: ToolMeta,
    pub project: ProjectMeta,
    pub reports: Vec<ReportSummary>,
    pub issues: Vec<Issue>,
    pub counts: IngestCounts,
    pub status: VerdictStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
}

// ── Configuration ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailOn {
    Issues,
    Never,
}

impl FailOn {
    pub fn as_str(self) -> &'static str {
        match self {
            FailOn::Issues => "issues",
            FailOn::Never => "never",
        }
    }
}

/// The on-disk configuration file (`memreport.toml`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ConfigFile {
    /// Include other config files. Paths are relative to this config file's directory.
    /// Later files override earlier ones key by key.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub includes: Vec<String>,

    #[serde(default)]
    pub defaults: Defaults,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Defaults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_root: Option<String>,

    /// WHATWG label used to decode text reports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,

    /// Keep going when a report cannot be parsed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_recovery: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_on: Option<FailOn>,

    /// Globs (relative to the project root) treated as outside the project.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
}

impl Defaults {
    /// Overlay `other` on top of `self`; set keys in `other` win.
    pub fn merged_with(self, other: Defaults) -> Defaults {
        Defaults {
            project_root: other.project_root.or(self.project_root),
            encoding: other.encoding.or(self.encoding),
            error_recovery: other.error_recovery.or(self.error_recovery),
            fail_on: other.fail_on.or(self.fail_on),
            exclude: if other.exclude.is_empty() {
                self.exclude
            } else {
                other.exclude
            },
        }
    }
}
