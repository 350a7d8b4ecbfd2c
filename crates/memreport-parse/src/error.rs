#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("malformed report at byte {position}: {reason}")]
    Malformed {
        position: u64,
        reason: MalformedReason,
    },

    #[error("failed to read report: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown encoding label '{0}'")]
    UnknownEncoding(String),

    #[error("encoding '{0}' is not ASCII-compatible")]
    UnsupportedEncoding(String),
}

impl ReportError {
    pub fn malformed(position: u64, reason: MalformedReason) -> Self {
        ReportError::Malformed { position, reason }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, ReportError::Malformed { .. })
    }
}

/// Why a report was rejected.
#[derive(Debug, thiserror::Error)]
pub enum MalformedReason {
    #[error("<error> has no <kind>")]
    MissingKind,

    #[error("<error> has no <what> or <xwhat>")]
    MissingWhat,

    #[error("<error> has no <stack>")]
    MissingStack,

    #[error("invalid <line> value '{0}'")]
    InvalidLine(String),

    #[error("document ended inside <{0}>")]
    UnexpectedEof(String),

    #[error("document has no <valgrindoutput> element")]
    MissingRoot,

    #[error("unexpected root element <{0}>, expected <valgrindoutput>")]
    UnexpectedRoot(String),

    #[error("unsupported declared encoding '{0}'")]
    DeclaredEncoding(String),

    #[error("text is not valid {0}")]
    Encoding(&'static str),

    #[error("invalid XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("invalid attribute: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),

    #[error("invalid escape: {0}")]
    Escape(#[from] quick_xml::escape::EscapeError),
}
