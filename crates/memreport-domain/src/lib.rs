//! Domain logic: anchoring error records to project files.
//!
//! This crate is I/O-free. Project membership is answered by a
//! [`ProjectOracle`]; [`ProjectFiles`] is the in-memory implementation the
//! CLI builds from a directory scan.

pub mod localize;
pub mod oracle;

pub use localize::{frame_label, localize, LocalizationFailure};
pub use oracle::{ExcludeGlobError, ProjectFiles, ProjectOracle};
