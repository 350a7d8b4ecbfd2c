//! Dr. Memory `results.txt` parsing.
//!
//! The text dialect has no grammar to speak of, so the parser is a two-state
//! line machine: it seeks an `Error #<n>: ...` header, then collects
//! `#<index> <file>:<line>` frame lines until any other line (or the end of
//! the stream) closes the record. Lines it does not recognise are skipped.

use std::io::BufRead;

use encoding_rs::Encoding;
use tracing::debug;

use memreport_types::{ErrorRecord, Frame, Stack};

use crate::error::ReportError;

/// Resolve a WHATWG encoding label (`utf-8`, `windows-1252`, `latin1`, ...).
///
/// Only ASCII-compatible encodings are accepted because lines are split on
/// raw `\n` bytes before decoding.
pub fn encoding_for_label(label: &str) -> Result<&'static Encoding, ReportError> {
    let encoding = Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| ReportError::UnknownEncoding(label.to_string()))?;
    ensure_ascii_compatible(encoding)?;
    Ok(encoding)
}

pub(crate) fn ensure_ascii_compatible(encoding: &'static Encoding) -> Result<(), ReportError> {
    if encoding.is_ascii_compatible() {
        Ok(())
    } else {
        Err(ReportError::UnsupportedEncoding(encoding.name().to_string()))
    }
}

/// Start parsing a Dr. Memory text report.
///
/// Records are produced lazily as the returned iterator is advanced.
pub fn parse_drmemory_report<R: BufRead>(
    reader: R,
    encoding: &'static Encoding,
) -> Result<DrMemoryRecords<R>, ReportError> {
    ensure_ascii_compatible(encoding)?;
    Ok(DrMemoryRecords {
        reader,
        encoding,
        raw: Vec::new(),
        first_line: true,
        current: None,
        done: false,
    })
}

/// Error categories Dr. Memory prints after `Error #<n>: `.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrMemoryErrorKind {
    UnaddressableAccess,
    UninitializedRead,
    InvalidHeapArgument,
    GdiUsageError,
    HandleLeak,
    Warning,
    PossibleLeak,
    Leak,
    Unrecognized,
}

impl DrMemoryErrorKind {
    const ALL: [DrMemoryErrorKind; 8] = [
        DrMemoryErrorKind::UnaddressableAccess,
        DrMemoryErrorKind::UninitializedRead,
        DrMemoryErrorKind::InvalidHeapArgument,
        DrMemoryErrorKind::GdiUsageError,
        DrMemoryErrorKind::HandleLeak,
        DrMemoryErrorKind::Warning,
        DrMemoryErrorKind::PossibleLeak,
        DrMemoryErrorKind::Leak,
    ];

    /// The rule id issues of this kind are reported under.
    pub fn id(self) -> &'static str {
        match self {
            DrMemoryErrorKind::UnaddressableAccess => "UnaddressableAccess",
            DrMemoryErrorKind::UninitializedRead => "UninitializedRead",
            DrMemoryErrorKind::InvalidHeapArgument => "InvalidHeapArgument",
            DrMemoryErrorKind::GdiUsageError => "GdiUsageError",
            DrMemoryErrorKind::HandleLeak => "HandleLeak",
            DrMemoryErrorKind::Warning => "DrMemoryWarning",
            DrMemoryErrorKind::PossibleLeak => "PossibleMemoryLeak",
            DrMemoryErrorKind::Leak => "MemoryLeak",
            DrMemoryErrorKind::Unrecognized => "DrMemoryUnrecognized",
        }
    }

    fn title(self) -> &'static str {
        match self {
            DrMemoryErrorKind::UnaddressableAccess => "UNADDRESSABLE ACCESS",
            DrMemoryErrorKind::UninitializedRead => "UNINITIALIZED READ",
            DrMemoryErrorKind::InvalidHeapArgument => "INVALID HEAP ARGUMENT",
            DrMemoryErrorKind::GdiUsageError => "GDI USAGE ERROR",
            DrMemoryErrorKind::HandleLeak => "HANDLE LEAK",
            DrMemoryErrorKind::Warning => "WARNING",
            DrMemoryErrorKind::PossibleLeak => "POSSIBLE LEAK",
            DrMemoryErrorKind::Leak => "LEAK",
            DrMemoryErrorKind::Unrecognized => "",
        }
    }

    pub fn from_message(message: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|kind| message.starts_with(kind.title()))
            .unwrap_or(DrMemoryErrorKind::Unrecognized)
    }
}

/// Lazy sequence of records read from a Dr. Memory report.
///
/// An I/O failure is yielded once and ends the sequence.
pub struct DrMemoryRecords<R> {
    reader: R,
    encoding: &'static Encoding,
    raw: Vec<u8>,
    first_line: bool,
    current: Option<RecordBuilder>,
    done: bool,
}

impl<R: BufRead> DrMemoryRecords<R> {
    fn read_line(&mut self) -> std::io::Result<Option<String>> {
        self.raw.clear();
        if self.reader.read_until(b'\n', &mut self.raw)? == 0 {
            return Ok(None);
        }

        let (text, had_errors) = if self.first_line {
            self.first_line = false;
            self.encoding.decode_with_bom_removal(&self.raw)
        } else {
            self.encoding.decode_without_bom_handling(&self.raw)
        };
        if had_errors {
            debug!(
                "Replaced undecodable bytes in a {} report line",
                self.encoding.name()
            );
        }

        Ok(Some(text.trim_end().to_string()))
    }
}

impl<R: BufRead> Iterator for DrMemoryRecords<R> {
    type Item = Result<ErrorRecord, ReportError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            let line = match self.read_line() {
                Ok(Some(line)) => line,
                Ok(None) => {
                    self.done = true;
                    return self.current.take().map(|b| Ok(b.finish()));
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(ReportError::Io(e)));
                }
            };

            if let Some(message) = parse_header_line(&line) {
                let finished = self.current.replace(RecordBuilder::new(message));
                if let Some(builder) = finished {
                    return Some(Ok(builder.finish()));
                }
                continue;
            }

            if let Some(frame) = parse_frame_line(&line) {
                // Frame lines outside a record are skipped.
                if let Some(builder) = self.current.as_mut() {
                    builder.frames.push(frame);
                }
                continue;
            }

            if let Some(builder) = self.current.take() {
                return Some(Ok(builder.finish()));
            }
        }
    }
}

#[derive(Debug)]
struct RecordBuilder {
    message: String,
    frames: Vec<Frame>,
}

impl RecordBuilder {
    fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
            frames: Vec::new(),
        }
    }

    fn finish(self) -> ErrorRecord {
        let kind = DrMemoryErrorKind::from_message(&self.message);
        ErrorRecord {
            kind: kind.id().to_string(),
            message: self.message,
            stacks: vec![Stack::new(self.frames)],
        }
    }
}

/// `Error #<n>: <message>`
fn parse_header_line(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("Error #")?;
    let (number, message) = rest.split_once(':')?;
    if !is_number(number) {
        return None;
    }
    Some(message.trim())
}

/// `#<index> <file>:<line>`
fn parse_frame_line(line: &str) -> Option<Frame> {
    let rest = line.strip_prefix('#')?;
    let (index, location) = rest.split_once(' ')?;
    if !is_number(index) {
        return None;
    }

    let (file, line_no) = location.rsplit_once(':')?;
    if file.is_empty() || !is_number(line_no) {
        return None;
    }
    let line_no: u32 = line_no.parse().ok()?;

    Some(Frame::new(file, (line_no > 0).then_some(line_no)))
}

fn is_number(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}
