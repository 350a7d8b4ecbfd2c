use memreport_types::{IngestReceipt, Issue, ReportStatus, VerdictStatus};

pub fn render_markdown_for_receipt(receipt: &IngestReceipt) -> String {
    let status = match receipt.status {
        VerdictStatus::Pass => "PASS",
        VerdictStatus::Issues => "ISSUES",
        VerdictStatus::Error => "ERROR",
    };

    let mut out = String::new();
    out.push_str(&format!("## memreport: {status}\n\n"));

    out.push_str(&format!(
        "Ingested **{}** report(s) with **{}** error record(s) against `{}` ({} project file(s))\n\n",
        receipt.reports.len(),
        receipt.counts.records,
        escape_md(&receipt.project.root),
        receipt.project.files
    ));

    let failed: Vec<_> = receipt
        .reports
        .iter()
        .filter(|r| r.status == ReportStatus::Failed)
        .collect();
    if !failed.is_empty() {
        out.push_str("**Failed reports:**\n");
        for r in failed {
            out.push_str(&format!(
                "- `{}`: {}\n",
                escape_md(&r.path),
                escape_md(r.error.as_deref().unwrap_or("unknown error"))
            ));
        }
        out.push('\n');
    }

    if receipt.counts.unassigned > 0 {
        out.push_str(&format!(
            "**Note:** {} record(s) had no frame in the project and were skipped.\n\n",
            receipt.counts.unassigned
        ));
    }

    if receipt.issues.is_empty() {
        out.push_str("No issues.\n");
        return out;
    }

    out.push_str("| Rule | Location | Message | Frames |\n");
    out.push_str("|---|---|---|---|\n");

    for issue in &receipt.issues {
        out.push_str(&render_issue_row(issue));
    }

    out.push('\n');
    out
}

fn render_issue_row(issue: &Issue) -> String {
    let loc = match (&issue.file, issue.line) {
        (Some(file), Some(line)) => format!("`{}:{}`", escape_md(file), line),
        (Some(file), None) => format!("`{}`", escape_md(file)),
        (None, _) => "(project)".to_string(),
    };

    format!(
        "| `{rule}` | {loc} | {msg} | {frames} |\n",
        rule = escape_md(&issue.rule_id),
        loc = loc,
        msg = escape_md(&issue.message),
        frames = issue.locations.len()
    )
}

fn escape_md(s: &str) -> String {
    s.replace('|', "\\|").replace('`', "\\`")
}

#[cfg(test)]
mod tests {
    use super::*;
    use memreport_testkit::fixtures::sample_receipts;

    #[test]
    fn renders_markdown_table() {
        let md = render_markdown_for_receipt(&sample_receipts::with_issues());
        assert!(md.starts_with("## memreport: ERROR\n"));
        assert!(md.contains("| Rule | Location | Message | Frames |"));
        assert!(md.contains("| `InvalidRead` | `src/buffer.cpp:44` | Invalid read of size 4 | 2 |"));
        assert!(md.contains("| `InvalidJump` | (project) |"));
    }

    #[test]
    fn lists_failed_reports_and_unassigned_records() {
        let md = render_markdown_for_receipt(&sample_receipts::with_issues());
        assert!(md.contains("**Failed reports:**\n- `broken.xml`: malformed report at byte 212"));
        assert!(md.contains("**Note:** 1 record(s) had no frame in the project"));
    }

    #[test]
    fn clean_receipt_says_no_issues() {
        let md = render_markdown_for_receipt(&sample_receipts::clean());
        assert_eq!(
            md,
            "## memreport: PASS\n\n\
             Ingested **0** report(s) with **0** error record(s) against `/home/ci/project` (6 project file(s))\n\n\
             No issues.\n"
        );
    }

    #[test]
    fn escapes_pipes_in_messages() {
        let mut receipt = sample_receipts::with_issues();
        receipt.issues[0].message = "a | b".to_string();
        let md = render_markdown_for_receipt(&receipt);
        assert!(md.contains("a \\| b"));
    }
}
