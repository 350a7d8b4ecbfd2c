//! Stable fingerprint computation for issues.
//!
//! Fingerprints identify an issue across runs, which lets SARIF consumers
//! track it even when the report order changes.

use memreport_types::Issue;
use sha2::{Digest, Sha256};

/// Computes a stable fingerprint for an issue.
///
/// The fingerprint is a SHA-256 hash of `rule_id:file:line:message`
/// (absent parts are empty), truncated to 16 hex characters (8 bytes).
pub fn compute_fingerprint(issue: &Issue) -> String {
    let line = issue.line.map(|l| l.to_string()).unwrap_or_default();
    let input = format!(
        "{}:{}:{}:{}",
        issue.rule_id,
        issue.file.as_deref().unwrap_or(""),
        line,
        issue.message
    );
    let hash = Sha256::digest(input.as_bytes());
    hex::encode(&hash[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use memreport_types::IssueLocation;

    fn test_issue() -> Issue {
        Issue {
            rule_id: "InvalidRead".to_string(),
            file: Some("src/buffer.cpp".to_string()),
            line: Some(44),
            message: "Invalid read of size 4".to_string(),
            locations: vec![IssueLocation {
                file: "src/buffer.cpp".to_string(),
                line: Some(44),
                info: "#0 /home/ci/project/src/buffer.cpp:44".to_string(),
            }],
        }
    }

    #[test]
    fn fingerprint_is_16_hex_chars() {
        let fp = compute_fingerprint(&test_issue());
        assert_eq!(fp.len(), 16);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn fingerprint_differs_for_different_line() {
        let mut other = test_issue();
        other.line = Some(45);
        assert_ne!(compute_fingerprint(&test_issue()), compute_fingerprint(&other));
    }

    #[test]
    fn fingerprint_ignores_secondary_locations() {
        let mut other = test_issue();
        other.locations.clear();
        assert_eq!(compute_fingerprint(&test_issue()), compute_fingerprint(&other));
    }

    #[test]
    fn snapshot_fingerprint_value() {
        let fp = compute_fingerprint(&test_issue());
        insta::assert_snapshot!(fp, @"7ce042c7317194ea");
    }

    #[test]
    fn snapshot_project_wide_fingerprint_value() {
        let issue = Issue {
            rule_id: "InvalidJump".to_string(),
            file: None,
            line: None,
            message: "Jump to the invalid address stated on the next line".to_string(),
            locations: vec![],
        };
        insta::assert_snapshot!(compute_fingerprint(&issue), @"b87875f068ea897e");
    }
}
