#![no_main]

use libfuzzer_sys::fuzz_target;

use memreport_parse::{parse_valgrind_report, UTF_8};

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must produce records or a ReportError, never a panic.
    if let Ok(records) = parse_valgrind_report(data, UTF_8) {
        for record in &records {
            assert!(!record.stacks.is_empty(), "error without <stack> accepted");
        }
    }
});
