//! Memory-checker report parsing.
//!
//! This crate turns Valgrind `--xml=yes` output and Dr. Memory `results.txt`
//! files into [`ErrorRecord`]s. Neither parser touches the project: anchoring
//! records to source files happens in `memreport-domain`.

mod drmemory;
mod error;
mod valgrind;

use std::io::BufRead;

use memreport_types::{ErrorRecord, ReportKind};

pub use drmemory::{encoding_for_label, parse_drmemory_report, DrMemoryErrorKind, DrMemoryRecords};
pub use encoding_rs::{Encoding, UTF_8};
pub use error::{MalformedReason, ReportError};
pub use valgrind::parse_valgrind_report;

/// Parse a report of the given kind to completion.
///
/// Valgrind records come back in set order (duplicates collapsed); Dr. Memory
/// records come back in file order.
pub fn parse_report<R: BufRead>(
    kind: ReportKind,
    reader: R,
    encoding: &'static Encoding,
) -> Result<Vec<ErrorRecord>, ReportError> {
    match kind {
        ReportKind::Valgrind => Ok(parse_valgrind_report(reader, encoding)?
            .into_iter()
            .collect()),
        ReportKind::DrMemory => parse_drmemory_report(reader, encoding)?.collect(),
    }
}
