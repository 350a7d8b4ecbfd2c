//! Builders for memory-checker reports.
//!
//! [`ValgrindReportBuilder`] writes `--xml=yes` documents the way memcheck
//! lays them out (preamble, one `<error>` per finding, `<errorcounts>`).
//! [`DrMemoryReportBuilder`] writes a `results.txt` with the version banner,
//! numbered `Error #n:` blocks and the final summary.
//!
//! # Example
//!
//! ```rust
//! use memreport_testkit::report_builder::{ValgrindErrorBuilder, ValgrindReportBuilder};
//! use memreport_types::Frame;
//!
//! let xml = ValgrindReportBuilder::new()
//!     .error(
//!         ValgrindErrorBuilder::new("InvalidRead")
//!             .what("Invalid read of size 4")
//!             .stack(vec![Frame::new("/home/dev/app/src/main.c", Some(12))]),
//!     )
//!     .build();
//!
//! assert!(xml.contains("<kind>InvalidRead</kind>"));
//! assert!(xml.contains("<dir>/home/dev/app/src</dir>"));
//! ```

use std::fmt::Write as _;

use memreport_types::Frame;

/// A builder for Valgrind XML reports.
#[derive(Debug, Clone, Default)]
pub struct ValgrindReportBuilder {
    errors: Vec<ValgrindErrorBuilder>,
    truncated: bool,
}

impl ValgrindReportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an `<error>` block.
    pub fn error(mut self, error: ValgrindErrorBuilder) -> Self {
        self.errors.push(error);
        self
    }

    /// Stop the document inside the last `<error>`, as a killed run would.
    pub fn truncated(mut self) -> Self {
        self.truncated = true;
        self
    }

    /// Number of `<error>` blocks the document will contain.
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn build(self) -> String {
        let mut out = String::new();
        out.push_str("<?xml version=\"1.0\"?>\n\n<valgrindoutput>\n\n");
        out.push_str("<protocolversion>4</protocolversion>\n");
        out.push_str("<protocoltool>memcheck</protocoltool>\n\n");
        out.push_str("<preamble>\n  <line>Memcheck, a memory error detector</line>\n</preamble>\n\n");
        out.push_str("<pid>4242</pid>\n<ppid>4241</ppid>\n<tool>memcheck</tool>\n\n");

        for (unique, error) in self.errors.iter().enumerate() {
            error.write_to(&mut out, unique);
        }

        if self.truncated {
            // Drop the closing tag of the last error, and everything after it.
            if let Some(cut) = out.rfind("</error>") {
                out.truncate(cut);
            }
            return out;
        }

        out.push_str("<errorcounts>\n");
        for unique in 0..self.errors.len() {
            let _ = writeln!(
                out,
                "  <pair>\n    <count>1</count>\n    <unique>0x{unique:x}</unique>\n  </pair>"
            );
        }
        out.push_str("</errorcounts>\n\n<suppcounts>\n</suppcounts>\n\n</valgrindoutput>\n");
        out
    }
}

#[derive(Debug, Clone)]
enum Part {
    What(String),
    AuxWhat(String),
    XWhat(String),
    XAuxWhat(String),
    Stack(Vec<Frame>),
    /// A `<stack>` whose frames only carry object information.
    UnresolvedStack,
}

/// A builder for one `<error>` block.
///
/// Parts are written in the order the methods are called, so explanations and
/// stacks can be interleaved the way memcheck does.
#[derive(Debug, Clone)]
pub struct ValgrindErrorBuilder {
    kind: Option<String>,
    parts: Vec<Part>,
}

impl ValgrindErrorBuilder {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: Some(kind.to_string()),
            parts: Vec::new(),
        }
    }

    /// An error without a `<kind>` element.
    pub fn without_kind() -> Self {
        Self {
            kind: None,
            parts: Vec::new(),
        }
    }

    pub fn what(mut self, text: &str) -> Self {
        self.parts.push(Part::What(text.to_string()));
        self
    }

    pub fn auxwhat(mut self, text: &str) -> Self {
        self.parts.push(Part::AuxWhat(text.to_string()));
        self
    }

    /// `<xwhat><text>..</text></xwhat>`, used by leak errors.
    pub fn xwhat(mut self, text: &str) -> Self {
        self.parts.push(Part::XWhat(text.to_string()));
        self
    }

    pub fn xauxwhat(mut self, text: &str) -> Self {
        self.parts.push(Part::XAuxWhat(text.to_string()));
        self
    }

    /// A `<stack>` with one `<frame>` per entry, split into `<dir>` and `<file>`.
    pub fn stack(mut self, frames: Vec<Frame>) -> Self {
        self.parts.push(Part::Stack(frames));
        self
    }

    /// A `<stack>` holding a single frame without source information.
    pub fn unresolved_stack(mut self) -> Self {
        self.parts.push(Part::UnresolvedStack);
        self
    }

    fn write_to(&self, out: &mut String, unique: usize) {
        let _ = writeln!(out, "<error>\n  <unique>0x{unique:x}</unique>\n  <tid>1</tid>");
        if let Some(kind) = &self.kind {
            let _ = writeln!(out, "  <kind>{}</kind>", escape(kind));
        }

        for part in &self.parts {
            match part {
                Part::What(text) => {
                    let _ = writeln!(out, "  <what>{}</what>", escape(text));
                }
                Part::AuxWhat(text) => {
                    let _ = writeln!(out, "  <auxwhat>{}</auxwhat>", escape(text));
                }
                Part::XWhat(text) => {
                    let _ = writeln!(
                        out,
                        "  <xwhat>\n    <text>{}</text>\n    <leakedbytes>16</leakedbytes>\n    <leakedblocks>1</leakedblocks>\n  </xwhat>",
                        escape(text)
                    );
                }
                Part::XAuxWhat(text) => {
                    let _ = writeln!(out, "  <xauxwhat>\n    <text>{}</text>\n  </xauxwhat>", escape(text));
                }
                Part::Stack(frames) => {
                    out.push_str("  <stack>\n");
                    for (i, frame) in frames.iter().enumerate() {
                        write_frame(out, i, frame);
                    }
                    out.push_str("  </stack>\n");
                }
                Part::UnresolvedStack => {
                    out.push_str(
                        "  <stack>\n    <frame>\n      <ip>0x0</ip>\n      <obj>/usr/lib/libc.so.6</obj>\n    </frame>\n  </stack>\n",
                    );
                }
            }
        }

        out.push_str("</error>\n\n");
    }
}

fn write_frame(out: &mut String, index: usize, frame: &Frame) {
    let _ = writeln!(
        out,
        "    <frame>\n      <ip>0x{:X}</ip>\n      <obj>/home/dev/app/a.out</obj>\n      <fn>f{}</fn>",
        0x400000 + index * 0x10,
        index
    );
    match frame.file.rsplit_once('/') {
        Some((dir, file)) if !dir.is_empty() => {
            let _ = writeln!(out, "      <dir>{}</dir>", escape(dir));
            let _ = writeln!(out, "      <file>{}</file>", escape(file));
        }
        _ => {
            let _ = writeln!(out, "      <file>{}</file>", escape(&frame.file));
        }
    }
    if let Some(line) = frame.line {
        let _ = writeln!(out, "      <line>{line}</line>");
    }
    out.push_str("    </frame>\n");
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// A builder for Dr. Memory `results.txt` reports.
///
/// Frames without a line are written with line `0`.
#[derive(Debug, Clone, Default)]
pub struct DrMemoryReportBuilder {
    errors: Vec<(String, Vec<Frame>)>,
}

impl DrMemoryReportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an `Error #<n>: <message>` block with its frames.
    pub fn error(mut self, message: &str, frames: Vec<Frame>) -> Self {
        self.errors.push((message.to_string(), frames));
        self
    }

    pub fn build(self) -> String {
        let mut out = String::new();
        out.push_str("Dr. Memory version 2.5.0 build 0 built on Oct 18 2021 03:01:22\n");
        out.push_str("Dr. Memory results for pid 4242: \"app.exe\"\n");
        out.push_str("Application cmdline: \"app.exe\"\n\n");

        for (n, (message, frames)) in self.errors.iter().enumerate() {
            let _ = writeln!(out, "Error #{}: {}", n + 1, message);
            for (i, frame) in frames.iter().enumerate() {
                let _ = writeln!(out, "#{} {}:{}", i, frame.file, frame.line.unwrap_or(0));
            }
            out.push_str("Note: @0:00:00.125 in thread 4243\n\n");
        }

        out.push_str("===========================================================================\n");
        out.push_str("FINAL SUMMARY:\n\nERRORS FOUND:\n");
        let _ = writeln!(out, "      {} unique,     {} total", self.errors.len(), self.errors.len());
        out
    }
}
