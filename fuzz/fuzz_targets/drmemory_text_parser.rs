//! Fuzz target for the Dr. Memory text parser.
//!
//! The first byte picks the decoding; the rest is the report.

#![no_main]

use libfuzzer_sys::fuzz_target;

use memreport_parse::{encoding_for_label, parse_drmemory_report};

const LABELS: &[&str] = &["utf-8", "windows-1252", "shift_jis", "gbk"];

fuzz_target!(|data: &[u8]| {
    let Some((&selector, report)) = data.split_first() else {
        return;
    };
    let Ok(encoding) = encoding_for_label(LABELS[selector as usize % LABELS.len()]) else {
        return;
    };
    let Ok(records) = parse_drmemory_report(report, encoding) else {
        return;
    };
    for record in records.flatten() {
        // Text reports always carry exactly one implicit stack.
        assert_eq!(record.stacks.len(), 1);
    }
});
