//! SARIF (Static Analysis Results Interchange Format) output renderer.
//!
//! Converts an IngestReceipt to SARIF 2.1.0. The anchor frame becomes the
//! result location and every stack frame a related location, so code
//! scanning UIs can show the whole trace.

use serde::Serialize;
use std::collections::BTreeMap;

use memreport_types::{IngestReceipt, Issue, IssueLocation, VerdictStatus};

use crate::fingerprint::compute_fingerprint;

/// SARIF schema URL
const SARIF_SCHEMA: &str = "https://raw.githubusercontent.com/oasis-tcs/sarif-spec/master/Schemata/sarif-schema-2.1.0.json";

/// SARIF version
const SARIF_VERSION: &str = "2.1.0";

const MEMREPORT_INFO_URI: &str = "https://github.com/EffortlessMetrics/memreport";

/// Key under `partialFingerprints` holding [`compute_fingerprint`].
const FINGERPRINT_KEY: &str = "memreport/v1";

/// Root SARIF document structure.
#[derive(Debug, Clone, Serialize)]
pub struct SarifReport {
    #[serde(rename = "$schema")]
    pub schema: String,
    pub version: String,
    pub runs: Vec<SarifRun>,
}

/// A single SARIF run (analysis execution).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifRun {
    pub tool: SarifTool,
    pub results: Vec<SarifResult>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub invocations: Vec<SarifInvocation>,
}

/// Tool information (driver).
#[derive(Debug, Clone, Serialize)]
pub struct SarifTool {
    pub driver: SarifDriver,
}

/// Tool driver with rules.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifDriver {
    pub name: String,
    pub version: String,
    pub information_uri: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<SarifRule>,
}

/// Rule definition; one per error kind.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifRule {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_description: Option<SarifMessage>,
}

/// SARIF result (issue).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifResult {
    pub rule_id: String,
    pub level: SarifLevel,
    pub message: SarifMessage,
    /// Empty for project-wide issues.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<SarifLocation>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub related_locations: Vec<SarifRelatedLocation>,
    pub partial_fingerprints: BTreeMap<String, String>,
}

/// SARIF severity level.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SarifLevel {
    Error,
    Warning,
    Note,
    None,
}

/// Message with text.
#[derive(Debug, Clone, Serialize)]
pub struct SarifMessage {
    pub text: String,
}

/// Location of a result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifLocation {
    pub physical_location: SarifPhysicalLocation,
}

/// One stack frame of a result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifRelatedLocation {
    pub id: u32,
    pub physical_location: SarifPhysicalLocation,
    pub message: SarifMessage,
}

/// Physical location with file and region.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifPhysicalLocation {
    pub artifact_location: SarifArtifactLocation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<SarifRegion>,
}

/// Artifact (file) location.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifArtifactLocation {
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri_base_id: Option<String>,
}

/// Region within a file.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifRegion {
    pub start_line: u32,
}

/// Invocation information.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifInvocation {
    pub execution_successful: bool,
}

/// Renders an IngestReceipt as a SARIF 2.1.0 report.
pub fn render_sarif_for_receipt(receipt: &IngestReceipt) -> SarifReport {
    let rules = collect_rules(&receipt.issues);
    let results: Vec<SarifResult> = receipt.issues.iter().map(issue_to_sarif_result).collect();

    SarifReport {
        schema: SARIF_SCHEMA.to_string(),
        version: SARIF_VERSION.to_string(),
        runs: vec![SarifRun {
            tool: SarifTool {
                driver: SarifDriver {
                    name: receipt.tool.name.clone(),
                    version: receipt.tool.version.clone(),
                    information_uri: MEMREPORT_INFO_URI.to_string(),
                    rules,
                },
            },
            results,
            invocations: vec![SarifInvocation {
                execution_successful: receipt.status != VerdictStatus::Error,
            }],
        }],
    }
}

/// Renders a SARIF report as a JSON string.
pub fn render_sarif_json(receipt: &IngestReceipt) -> Result<String, serde_json::Error> {
    let report = render_sarif_for_receipt(receipt);
    serde_json::to_string_pretty(&report)
}

/// One rule per distinct error kind, described by its first message.
fn collect_rules(issues: &[Issue]) -> Vec<SarifRule> {
    let mut seen = BTreeMap::new();

    for issue in issues {
        seen.entry(issue.rule_id.clone()).or_insert_with(|| SarifRule {
            id: issue.rule_id.clone(),
            short_description: Some(SarifMessage {
                text: issue.message.clone(),
            }),
        });
    }

    seen.into_values().collect()
}

fn issue_to_sarif_result(issue: &Issue) -> SarifResult {
    let mut fingerprints = BTreeMap::new();
    fingerprints.insert(FINGERPRINT_KEY.to_string(), compute_fingerprint(issue));

    let locations = issue
        .file
        .as_deref()
        .map(|file| SarifLocation {
            physical_location: physical_location(file, issue.line),
        })
        .into_iter()
        .collect();

    let related_locations = issue
        .locations
        .iter()
        .enumerate()
        .map(|(id, location)| related_location(id as u32, location))
        .collect();

    SarifResult {
        rule_id: issue.rule_id.clone(),
        level: SarifLevel::Warning,
        message: SarifMessage {
            text: issue.message.clone(),
        },
        locations,
        related_locations,
        partial_fingerprints: fingerprints,
    }
}

fn related_location(id: u32, location: &IssueLocation) -> SarifRelatedLocation {
    SarifRelatedLocation {
        id,
        physical_location: physical_location(&location.file, location.line),
        message: SarifMessage {
            text: location.info.clone(),
        },
    }
}

fn physical_location(file: &str, line: Option<u32>) -> SarifPhysicalLocation {
    SarifPhysicalLocation {
        artifact_location: SarifArtifactLocation {
            uri: file.to_string(),
            uri_base_id: Some("%SRCROOT%".to_string()),
        },
        region: line.map(|start_line| SarifRegion { start_line }),
    }
}
