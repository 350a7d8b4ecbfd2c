//! Anchoring error records to project files.
//!
//! The first frame the oracle recognises is the anchor: it becomes the
//! issue's primary location. Every frame also becomes a secondary location;
//! frames outside the project borrow the anchor's position but keep their own
//! label, so the stack still reads top to bottom.

use memreport_types::{ErrorRecord, Frame, Issue, IssueLocation};

use crate::oracle::ProjectOracle;

/// No frame of the record belongs to the project.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot find a project file to assign the {kind} error '{message}' to")]
pub struct LocalizationFailure {
    pub kind: String,
    pub message: String,
}

/// Build the issue for `record`.
///
/// A record without frames becomes a project-wide issue. A record whose
/// frames are all outside the project cannot be assigned.
pub fn localize<O>(record: &ErrorRecord, oracle: &O) -> Result<Issue, LocalizationFailure>
where
    O: ProjectOracle + ?Sized,
{
    let frames: Vec<&Frame> = record.frames().collect();
    if frames.is_empty() {
        return Ok(Issue {
            rule_id: record.kind.clone(),
            file: None,
            line: None,
            message: record.message.clone(),
            locations: Vec::new(),
        });
    }

    let resolved: Vec<Option<String>> = frames.iter().map(|f| oracle.lookup(&f.file)).collect();

    let Some((anchor_index, anchor_file)) = resolved
        .iter()
        .enumerate()
        .find_map(|(i, canonical)| canonical.as_deref().map(|file| (i, file)))
    else {
        return Err(LocalizationFailure {
            kind: record.kind.clone(),
            message: record.message.clone(),
        });
    };
    let anchor_line = frames[anchor_index].line;

    let locations = frames
        .iter()
        .zip(&resolved)
        .enumerate()
        .map(|(index, (frame, canonical))| {
            let (file, line) = match canonical {
                Some(file) => (file.clone(), frame.line),
                None => (anchor_file.to_string(), anchor_line),
            };
            IssueLocation {
                file,
                line,
                info: frame_label(index, frame),
            }
        })
        .collect();

    Ok(Issue {
        rule_id: record.kind.clone(),
        file: Some(anchor_file.to_string()),
        line: anchor_line,
        message: record.message.clone(),
        locations,
    })
}

/// `#<index> <file>:<line>`, or `#<index> <file>` when the line is unknown.
pub fn frame_label(index: usize, frame: &Frame) -> String {
    match frame.line {
        Some(line) => format!("#{} {}:{}", index, frame.file, line),
        None => format!("#{} {}", index, frame.file),
    }
}
