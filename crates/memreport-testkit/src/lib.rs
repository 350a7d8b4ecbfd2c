//! Shared test utilities for the memreport workspace.
//!
//! This crate provides:
//! - **arb**: Proptest strategies for frames, stacks and error records
//! - **report_builder**: Builders for Valgrind XML and Dr. Memory text reports
//! - **schema**: JSON schema validators for receipts and config files
//! - **fixtures**: Hand-written sample reports in the tools' output formats and a matching project
//!
//! # Example
//!
//! ```rust,ignore
//! use memreport_testkit::arb;
//! use proptest::prelude::*;
//!
//! proptest! {
//!     fn records_have_a_kind(record in arb::arb_error_record()) {
//!         assert!(!record.kind.is_empty());
//!     }
//! }
//! ```

pub mod arb;
pub mod fixtures;
pub mod report_builder;
pub mod schema;

pub use arb::{arb_error_record, arb_frame, arb_project_path, arb_stack, arb_valgrind_kind};
pub use fixtures::{
    drmemory_reports, sample_configs, sample_project, sample_receipts, valgrind_reports,
};
pub use report_builder::{DrMemoryReportBuilder, ValgrindErrorBuilder, ValgrindReportBuilder};
pub use schema::{validate_config_file, validate_ingest_receipt};
