//! Fuzz target for the issue localizer.
//!
//! Frames are drawn from a small path alphabet so that a useful share of them
//! lands inside the fake project.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use memreport_domain::localize;
use memreport_types::{ErrorRecord, Frame, Stack};

const PATHS: &[&str] = &[
    "/work/project/src/main.c",
    "/work/project/src/../src/util.c",
    "/usr/lib/libc.c",
    "src/main.c",
    "C:\\work\\project\\src\\main.c",
    "",
];

#[derive(Arbitrary, Debug)]
struct FuzzFrame {
    path: u8,
    line: Option<u32>,
}

#[derive(Arbitrary, Debug)]
struct FuzzRecord {
    stacks: Vec<Vec<FuzzFrame>>,
}

fn in_project(path: &str) -> Option<String> {
    path.strip_prefix("/work/project/").map(str::to_string)
}

fuzz_target!(|input: FuzzRecord| {
    let record = ErrorRecord {
        kind: "InvalidRead".to_string(),
        message: "Invalid read of size 4".to_string(),
        stacks: input
            .stacks
            .iter()
            .map(|frames| {
                Stack::new(
                    frames
                        .iter()
                        .map(|f| Frame::new(PATHS[f.path as usize % PATHS.len()], f.line))
                        .collect(),
                )
            })
            .collect(),
    };

    let total = record.frames().count();
    match localize(&record, &in_project) {
        Ok(issue) if total == 0 => {
            assert!(issue.file.is_none());
            assert!(issue.locations.is_empty());
        }
        Ok(issue) => {
            assert_eq!(issue.locations.len(), total);
            let anchor = issue.file.as_deref().expect("anchored issue");
            assert!(issue.locations.iter().all(|l| !l.file.is_empty()));
            assert!(issue.locations.iter().any(|l| l.file == anchor));
        }
        Err(_) => assert!(record.frames().all(|f| in_project(&f.file).is_none())),
    }
});
