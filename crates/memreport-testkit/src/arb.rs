//! Proptest strategies for generating stack-model values.
//!
//! Strategies are constructive: every generated path, message and record can
//! be written into either report dialect and read back unchanged.
//!
//! # Bounds
//!
//! To keep tests fast, the following bounds are enforced:
//! - Max frames per stack: 8
//! - Max stacks per record: 3
//! - Max auxiliary explanations per record: 3

use memreport_types::{ErrorRecord, Frame, Stack};
use proptest::prelude::*;

/// Maximum number of frames in a generated stack
pub const MAX_FRAMES: usize = 8;

/// Maximum number of stacks in a generated record
pub const MAX_STACKS: usize = 3;

/// Maximum number of `<auxwhat>` explanations in a generated record
pub const MAX_AUXWHAT: usize = 3;

/// Project root used by [`arb_project_path`].
pub const PROJECT_ROOT: &str = "/work/project";

/// Memcheck error kinds.
pub fn arb_valgrind_kind() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("InvalidRead"),
        Just("InvalidWrite"),
        Just("InvalidFree"),
        Just("MismatchedFree"),
        Just("UninitCondition"),
        Just("UninitValue"),
        Just("SyscallParam"),
        Just("Overlap"),
        Just("Leak_DefinitelyLost"),
        Just("Leak_PossiblyLost"),
    ]
    .prop_map(str::to_string)
}

/// A lowercase identifier usable as a path component.
pub fn arb_identifier() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,11}"
}

/// A one-line explanation without leading or trailing whitespace.
///
/// Includes XML metacharacters so builders must escape them.
pub fn arb_message() -> impl Strategy<Value = String> {
    "[A-Za-z0-9][A-Za-z0-9 ()<>&'.,]{0,40}[A-Za-z0-9]"
}

/// An absolute path inside [`PROJECT_ROOT`].
pub fn arb_project_path() -> impl Strategy<Value = String> {
    (
        prop::collection::vec(arb_identifier(), 0..3),
        arb_identifier(),
        prop_oneof![Just("c"), Just("cpp"), Just("h")],
    )
        .prop_map(|(dirs, name, ext)| {
            let mut path = format!("{PROJECT_ROOT}/src");
            for dir in dirs {
                path.push('/');
                path.push_str(&dir);
            }
            format!("{path}/{name}.{ext}")
        })
}

/// An absolute path outside [`PROJECT_ROOT`] (system libraries, toolchain sources).
pub fn arb_foreign_path() -> impl Strategy<Value = String> {
    (
        prop_oneof![
            Just("/usr/include"),
            Just("/build/glibc/string"),
            Just("/build/valgrind/memcheck"),
        ],
        arb_identifier(),
    )
        .prop_map(|(dir, name)| format!("{dir}/{name}.c"))
}

pub fn arb_line() -> impl Strategy<Value = Option<u32>> {
    prop_oneof![
        1 => Just(None),
        6 => (1u32..5000).prop_map(Some),
    ]
}

/// A frame that is either in the project or outside it.
pub fn arb_frame() -> impl Strategy<Value = Frame> {
    (
        prop_oneof![arb_project_path(), arb_foreign_path()],
        arb_line(),
    )
        .prop_map(|(file, line)| Frame::new(file, line))
}

pub fn arb_stack() -> impl Strategy<Value = Stack> {
    prop::collection::vec(arb_frame(), 1..=MAX_FRAMES).prop_map(Stack::new)
}

/// An error record as the Valgrind parser produces it: a kind, a message
/// merged from one `what` and up to [`MAX_AUXWHAT`] `auxwhat`s, and at least
/// one stack.
pub fn arb_error_record() -> impl Strategy<Value = ErrorRecord> {
    (
        arb_valgrind_kind(),
        arb_message(),
        prop::collection::vec(arb_message(), 0..=MAX_AUXWHAT),
        prop::collection::vec(arb_stack(), 1..=MAX_STACKS),
    )
        .prop_map(|(kind, what, auxwhat, stacks)| {
            let message = std::iter::once(what)
                .chain(auxwhat)
                .collect::<Vec<_>>()
                .join("; ");
            ErrorRecord {
                kind,
                message,
                stacks,
            }
        })
}
