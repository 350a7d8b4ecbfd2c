//! Valgrind `--xml=yes` report parsing.
//!
//! The reader is a single forward pass over `quick_xml` pull events. Only the
//! elements below `<error>` matter; everything else (`<errorcounts>`,
//! `<suppcounts>`, `<status>`, ...) is skipped.
//!
//! The document must have a `<valgrindoutput>` root. An `<error>` must carry a
//! `<kind>`, at least one `<what>`/`<xwhat>` and at least one `<stack>`. Any
//! violation rejects the whole report.
//!
//! Character data is decoded with the encoding named in the XML declaration,
//! or with the caller's encoding when the document declares none.

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::io::BufRead;

use encoding_rs::Encoding;
use quick_xml::escape::unescape;
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::debug;

use memreport_types::{ErrorRecord, Frame, Stack};

use crate::drmemory::ensure_ascii_compatible;
use crate::error::{MalformedReason, ReportError};

const MESSAGE_SEPARATOR: &str = "; ";
const ROOT_ELEMENT: &[u8] = b"valgrindoutput";

/// Parse a Valgrind XML report into its set of error records.
///
/// `encoding` applies when the document has no `encoding=` declaration.
/// Identical `<error>` blocks collapse into a single record.
pub fn parse_valgrind_report<R: BufRead>(
    reader: R,
    encoding: &'static Encoding,
) -> Result<BTreeSet<ErrorRecord>, ReportError> {
    ensure_ascii_compatible(encoding)?;

    let mut xml = Reader::from_reader(reader);
    xml.config_mut().trim_text(true);

    let mut encoding = encoding;
    let mut state = ParseState::default();
    let mut buf = Vec::new();

    loop {
        let event = match xml.read_event_into(&mut buf) {
            Ok(event) => event,
            Err(e) => {
                return Err(ReportError::malformed(
                    xml.buffer_position() as u64,
                    MalformedReason::Xml(e),
                ))
            }
        };

        let step = match event {
            Event::Decl(decl) if !state.root_seen => match decl.encoding() {
                Some(label) => declared_encoding(label).map(|declared| encoding = declared),
                None => Ok(()),
            },
            Event::Start(e) => state.open(e.name().as_ref()),
            Event::Empty(e) => state.open(e.name().as_ref()).and_then(|()| state.close()),
            Event::End(_) => state.close(),
            Event::Text(t) if state.in_error() => decode(encoding, &t)
                .and_then(|text| Ok(unescape(&text)?.into_owned()))
                .map(|text| state.text.push_str(&text)),
            Event::CData(c) if state.in_error() => {
                decode(encoding, &c).map(|text| state.text.push_str(&text))
            }
            Event::Eof => break,
            _ => Ok(()),
        };

        step.map_err(|reason| ReportError::malformed(xml.buffer_position() as u64, reason))?;
        buf.clear();
    }

    if !state.root_seen {
        return Err(ReportError::malformed(
            xml.buffer_position() as u64,
            MalformedReason::MissingRoot,
        ));
    }

    if let Some(open) = state.open.last() {
        return Err(ReportError::malformed(
            xml.buffer_position() as u64,
            MalformedReason::UnexpectedEof(open.name.clone()),
        ));
    }

    debug!(
        "Parsed {} valgrind error record(s) as {}",
        state.records.len(),
        encoding.name()
    );
    Ok(state.records)
}

fn declared_encoding(
    label: Result<Cow<'_, [u8]>, quick_xml::Error>,
) -> Result<&'static Encoding, MalformedReason> {
    let label = label?;
    // The declaration was read as ASCII, so only ASCII-compatible encodings fit.
    Encoding::for_label(&label)
        .filter(|e| e.is_ascii_compatible())
        .ok_or_else(|| {
            MalformedReason::DeclaredEncoding(String::from_utf8_lossy(&label).into_owned())
        })
}

fn decode<'a>(
    encoding: &'static Encoding,
    raw: &'a [u8],
) -> Result<Cow<'a, str>, MalformedReason> {
    encoding
        .decode_without_bom_handling_and_without_replacement(raw)
        .ok_or(MalformedReason::Encoding(encoding.name()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Element {
    Error,
    Kind,
    What,
    AuxWhat,
    XWhat,
    XAuxWhat,
    Text,
    Stack,
    Frame,
    Dir,
    File,
    Line,
    Other,
}

impl Element {
    fn from_name(name: &[u8]) -> Self {
        match name {
            b"error" => Element::Error,
            b"kind" => Element::Kind,
            b"what" => Element::What,
            b"auxwhat" => Element::AuxWhat,
            b"xwhat" => Element::XWhat,
            b"xauxwhat" => Element::XAuxWhat,
            b"text" => Element::Text,
            b"stack" => Element::Stack,
            b"frame" => Element::Frame,
            b"dir" => Element::Dir,
            b"file" => Element::File,
            b"line" => Element::Line,
            _ => Element::Other,
        }
    }
}

#[derive(Debug)]
struct OpenElement {
    element: Element,
    name: String,
}

#[derive(Debug, Default)]
struct ParseState {
    root_seen: bool,
    open: Vec<OpenElement>,
    /// Character data of the innermost element inside the current `<error>`.
    text: String,
    current: Option<ErrorBuilder>,
    records: BTreeSet<ErrorRecord>,
}

impl ParseState {
    fn in_error(&self) -> bool {
        self.current.is_some()
    }

    fn parent(&self, depth: usize) -> Option<Element> {
        self.open
            .len()
            .checked_sub(depth + 1)
            .map(|i| self.open[i].element)
    }

    fn open(&mut self, name: &[u8]) -> Result<(), MalformedReason> {
        if self.open.is_empty() {
            if self.root_seen || name != ROOT_ELEMENT {
                return Err(MalformedReason::UnexpectedRoot(
                    String::from_utf8_lossy(name).into_owned(),
                ));
            }
            self.root_seen = true;
        }

        let mut element = Element::from_name(name);
        let parent = self.parent(0);
        self.text.clear();

        match (element, self.current.as_mut()) {
            (Element::Error, None) => self.current = Some(ErrorBuilder::default()),
            // A nested <error> is not part of the dialect.
            (Element::Error, Some(_)) => element = Element::Other,
            (Element::Stack, Some(cur)) if parent == Some(Element::Error) => cur.frames.clear(),
            (Element::Frame, Some(cur)) if parent == Some(Element::Stack) => {
                cur.frame = FrameBuilder::default()
            }
            _ => {}
        }

        self.open.push(OpenElement {
            element,
            name: String::from_utf8_lossy(name).into_owned(),
        });
        Ok(())
    }

    fn close(&mut self) -> Result<(), MalformedReason> {
        let Some(closed) = self.open.pop() else {
            return Ok(());
        };

        if closed.element == Element::Error {
            if let Some(builder) = self.current.take() {
                self.records.insert(builder.finish()?);
            }
            return Ok(());
        }

        let parent = self.parent(0);
        let grandparent = self.parent(1);
        let Some(cur) = self.current.as_mut() else {
            return Ok(());
        };
        let text = std::mem::take(&mut self.text);
        let text = text.trim();

        match (closed.element, parent) {
            (Element::Kind, Some(Element::Error)) => cur.kind = Some(text.to_string()),
            (Element::What, Some(Element::Error)) => cur.push_segment(text, true),
            (Element::AuxWhat, Some(Element::Error)) => cur.push_segment(text, false),
            (Element::Text, Some(Element::XWhat)) if grandparent == Some(Element::Error) => {
                cur.push_segment(text, true)
            }
            (Element::Text, Some(Element::XAuxWhat)) if grandparent == Some(Element::Error) => {
                cur.push_segment(text, false)
            }
            (Element::Stack, Some(Element::Error)) => {
                let frames = std::mem::take(&mut cur.frames);
                cur.stacks.push(Stack::new(frames));
            }
            (Element::Frame, Some(Element::Stack)) => {
                if let Some(frame) = std::mem::take(&mut cur.frame).build() {
                    cur.frames.push(frame);
                }
            }
            (Element::Dir, Some(Element::Frame)) => cur.frame.dir = Some(text.to_string()),
            (Element::File, Some(Element::Frame)) => cur.frame.file = Some(text.to_string()),
            (Element::Line, Some(Element::Frame)) => cur.frame.line = parse_line(text)?,
            _ => {}
        }

        Ok(())
    }
}

#[derive(Debug, Default)]
struct ErrorBuilder {
    kind: Option<String>,
    message: String,
    segments: usize,
    has_what: bool,
    stacks: Vec<Stack>,
    /// Frames of the `<stack>` being read.
    frames: Vec<Frame>,
    /// Fields of the `<frame>` being read.
    frame: FrameBuilder,
}

impl ErrorBuilder {
    fn push_segment(&mut self, text: &str, is_what: bool) {
        if self.segments > 0 {
            self.message.push_str(MESSAGE_SEPARATOR);
        }
        self.message.push_str(text);
        self.segments += 1;
        self.has_what |= is_what;
    }

    fn finish(self) -> Result<ErrorRecord, MalformedReason> {
        let kind = self.kind.ok_or(MalformedReason::MissingKind)?;
        if !self.has_what {
            return Err(MalformedReason::MissingWhat);
        }
        if self.stacks.is_empty() {
            return Err(MalformedReason::MissingStack);
        }

        Ok(ErrorRecord {
            kind,
            message: self.message,
            stacks: self.stacks,
        })
    }
}

#[derive(Debug, Default)]
struct FrameBuilder {
    dir: Option<String>,
    file: Option<String>,
    line: Option<u32>,
}

impl FrameBuilder {
    /// Frames without source information (binary-only) are dropped.
    fn build(self) -> Option<Frame> {
        let file = self.file.filter(|f| !f.is_empty())?;
        let path = match self.dir.filter(|d| !d.is_empty()) {
            Some(dir) => format!("{}/{}", dir.trim_end_matches(|c| c == '/' || c == '\\'), file),
            None => file,
        };
        Some(Frame::new(path, self.line))
    }
}

fn parse_line(text: &str) -> Result<Option<u32>, MalformedReason> {
    let line: u32 = text
        .parse()
        .map_err(|_| MalformedReason::InvalidLine(text.to_string()))?;
    Ok((line > 0).then_some(line))
}
