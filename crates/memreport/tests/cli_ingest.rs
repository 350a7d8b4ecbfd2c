//! End-to-end tests for the `memreport` binary.
//!
//! Each test builds a throwaway project in a temp dir, writes reports whose
//! frames point into it and checks exit codes and the written artifacts.

use std::path::{Path, PathBuf};

use assert_cmd::cargo;
use assert_cmd::Command;
use memreport_testkit::fixtures::valgrind_reports;
use memreport_testkit::schema::validate_ingest_json;
use memreport_testkit::{DrMemoryReportBuilder, ValgrindErrorBuilder, ValgrindReportBuilder};
use memreport_types::Frame;
use tempfile::TempDir;

fn memreport_cmd() -> Command {
    Command::new(cargo::cargo_bin!("memreport"))
}

/// A project with two sources below `<temp>/project`, returned canonicalized.
fn make_project(td: &TempDir) -> PathBuf {
    let root = td.path().join("project");
    std::fs::create_dir_all(root.join("src")).expect("create src");
    std::fs::write(root.join("src/buffer.c"), "/* buffer */\n").expect("write buffer.c");
    std::fs::write(root.join("src/main.c"), "/* main */\n").expect("write main.c");
    std::fs::canonicalize(root).expect("canonicalize project")
}

fn src(root: &Path, name: &str) -> String {
    root.join("src").join(name).display().to_string()
}

fn invalid_read_report(root: &Path) -> String {
    ValgrindReportBuilder::new()
        .error(
            ValgrindErrorBuilder::new("InvalidRead")
                .what("Invalid read of size 4")
                .auxwhat("Address 0x4a4b044 is 0 bytes after a block of size 4 alloc'd")
                .stack(vec![
                    Frame::new("/usr/lib/x86_64-linux-gnu/libc.c", Some(120)),
                    Frame::new(src(root, "buffer.c"), Some(44)),
                    Frame::new(src(root, "main.c"), Some(30)),
                ]),
        )
        .error(
            ValgrindErrorBuilder::new("Leak_PossiblyLost")
                .xwhat("32 bytes in 1 blocks are possibly lost")
                .stack(vec![Frame::new("/usr/lib/libstdc++.cc", Some(7))]),
        )
        .build()
}

fn clean_report() -> String {
    ValgrindReportBuilder::new()
        .error(
            ValgrindErrorBuilder::new("Leak_StillReachable")
                .xwhat("8 bytes in 1 blocks are still reachable")
                .stack(vec![Frame::new("/usr/lib/libc.c", Some(3))]),
        )
        .build()
}

fn write(td: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = td.path().join(name);
    std::fs::write(&path, contents).expect("write file");
    path
}

fn read_json(path: &Path) -> serde_json::Value {
    let text = std::fs::read_to_string(path).expect("read json");
    serde_json::from_str(&text).expect("valid json")
}

#[test]
fn ingest_without_project_issues_exits_zero() {
    let td = TempDir::new().expect("temp");
    let root = make_project(&td);
    let report = write(&td, "valgrind.xml", &clean_report());
    let out = td.path().join("out/report.json");

    memreport_cmd()
        .arg("ingest")
        .arg("--project-root")
        .arg(&root)
        .arg("--valgrind")
        .arg(&report)
        .arg("--out")
        .arg(&out)
        .assert()
        .code(0);

    let receipt = read_json(&out);
    validate_ingest_json(&receipt).expect("receipt matches schema");
    assert_eq!(receipt["schema"], "memreport.ingest.v1");
    assert_eq!(receipt["status"], "pass");
    assert_eq!(receipt["counts"]["records"], 1);
    assert_eq!(receipt["counts"]["unassigned"], 1);
    assert_eq!(receipt["project"]["files"], 2);
    assert!(receipt["started_at"].is_string());
}

#[test]
fn ingest_with_issues_exits_two_and_writes_all_artifacts() {
    let td = TempDir::new().expect("temp");
    let root = make_project(&td);
    let report = write(&td, "valgrind.xml", &invalid_read_report(&root));
    let out = td.path().join("report.json");
    let md = td.path().join("report.md");
    let sarif = td.path().join("report.sarif.json");

    memreport_cmd()
        .arg("ingest")
        .arg("--project-root")
        .arg(&root)
        .arg("--valgrind")
        .arg(&report)
        .arg("--out")
        .arg(&out)
        .arg("--md")
        .arg(&md)
        .arg("--sarif")
        .arg(&sarif)
        .assert()
        .code(2);

    let receipt = read_json(&out);
    validate_ingest_json(&receipt).expect("receipt matches schema");
    assert_eq!(receipt["status"], "issues");
    let issue = &receipt["issues"][0];
    assert_eq!(issue["rule_id"], "InvalidRead");
    assert_eq!(issue["file"], "src/buffer.c");
    assert_eq!(issue["line"], 44);
    assert_eq!(
        issue["message"],
        "Invalid read of size 4; Address 0x4a4b044 is 0 bytes after a block of size 4 alloc'd"
    );
    // The libc frame borrows the anchor position but keeps its own label.
    assert_eq!(issue["locations"][0]["file"], "src/buffer.c");
    assert_eq!(issue["locations"][0]["line"], 44);
    assert_eq!(
        issue["locations"][0]["info"],
        "#0 /usr/lib/x86_64-linux-gnu/libc.c:120"
    );
    assert_eq!(issue["locations"][2]["file"], "src/main.c");

    let markdown = std::fs::read_to_string(&md).expect("read markdown");
    assert!(markdown.starts_with("## memreport: ISSUES"));
    assert!(markdown.contains("`src/buffer.c:44`"));

    let sarif = read_json(&sarif);
    assert_eq!(sarif["version"], "2.1.0");
    assert_eq!(sarif["runs"][0]["results"][0]["ruleId"], "InvalidRead");
}

#[test]
fn fail_on_never_exits_zero_with_issues() {
    let td = TempDir::new().expect("temp");
    let root = make_project(&td);
    let report = write(&td, "valgrind.xml", &invalid_read_report(&root));
    let out = td.path().join("report.json");

    memreport_cmd()
        .arg("ingest")
        .arg("--project-root")
        .arg(&root)
        .arg("--valgrind")
        .arg(&report)
        .arg("--fail-on")
        .arg("never")
        .arg("--out")
        .arg(&out)
        .assert()
        .code(0);

    assert_eq!(read_json(&out)["status"], "issues");
}

#[test]
fn malformed_report_fails_the_run_without_error_recovery() {
    let td = TempDir::new().expect("temp");
    let root = make_project(&td);
    let report = write(&td, "broken.xml", valgrind_reports::missing_what());
    let out = td.path().join("report.json");

    let output = memreport_cmd()
        .arg("ingest")
        .arg("--project-root")
        .arg(&root)
        .arg("--valgrind")
        .arg(&report)
        .arg("--out")
        .arg(&out)
        .output()
        .expect("run ingest");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("broken.xml"), "{stderr}");
    assert!(!out.exists());
}

#[test]
fn text_report_passed_as_valgrind_fails_the_run() {
    let td = TempDir::new().expect("temp");
    let root = make_project(&td);
    let text = DrMemoryReportBuilder::new()
        .error(
            "LEAK 16 direct bytes 0x01 inside: 0x02-0x12",
            vec![Frame::new(src(&root, "buffer.c"), Some(3))],
        )
        .build();
    let report = write(&td, "results.txt", &text);

    let output = memreport_cmd()
        .arg("ingest")
        .arg("--project-root")
        .arg(&root)
        .arg("--valgrind")
        .arg(&report)
        .arg("--out")
        .arg(td.path().join("report.json"))
        .output()
        .expect("run ingest");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("<valgrindoutput>"), "{stderr}");
}

#[test]
fn malformed_report_is_recorded_with_error_recovery() {
    let td = TempDir::new().expect("temp");
    let root = make_project(&td);
    let broken = write(&td, "broken.xml", valgrind_reports::missing_stack());
    let good = write(&td, "good.xml", &invalid_read_report(&root));
    let out = td.path().join("report.json");

    memreport_cmd()
        .arg("ingest")
        .arg("--project-root")
        .arg(&root)
        .arg("--valgrind")
        .arg(&broken)
        .arg("--valgrind")
        .arg(&good)
        .arg("--error-recovery")
        .arg("--out")
        .arg(&out)
        .assert()
        .code(3);

    let receipt = read_json(&out);
    validate_ingest_json(&receipt).expect("receipt matches schema");
    assert_eq!(receipt["status"], "error");
    assert_eq!(receipt["counts"]["failed_reports"], 1);
    assert_eq!(receipt["reports"][0]["status"], "failed");
    assert_eq!(receipt["reports"][1]["status"], "parsed");
    assert_eq!(receipt["issues"].as_array().map(Vec::len), Some(1));
}

#[test]
fn drmemory_reports_are_ingested() {
    let td = TempDir::new().expect("temp");
    let root = make_project(&td);
    let text = DrMemoryReportBuilder::new()
        .error(
            "UNINITIALIZED READ: reading register eax",
            vec![
                Frame::new(src(&root, "main.c"), Some(12)),
                Frame::new("/usr/lib/libc.c", Some(90)),
            ],
        )
        .error("LEAK 16 direct bytes 0x00a0 + 0 indirect bytes", vec![])
        .build();
    let report = write(&td, "results.txt", &text);
    let out = td.path().join("report.json");

    memreport_cmd()
        .arg("ingest")
        .arg("--project-root")
        .arg(&root)
        .arg("--drmemory")
        .arg(&report)
        .arg("--out")
        .arg(&out)
        .assert()
        .code(2);

    let receipt = read_json(&out);
    assert_eq!(receipt["counts"]["records"], 2);
    assert_eq!(receipt["counts"]["project_issues"], 1);
    assert_eq!(receipt["issues"][0]["rule_id"], "UninitializedRead");
    assert_eq!(receipt["issues"][0]["file"], "src/main.c");
    assert_eq!(receipt["issues"][1]["rule_id"], "MemoryLeak");
    assert!(receipt["issues"][1].get("file").is_none());
}

#[test]
fn config_in_working_directory_supplies_defaults() {
    let td = TempDir::new().expect("temp");
    let root = make_project(&td);
    let broken = write(&td, "broken.xml", valgrind_reports::missing_kind());
    std::fs::write(
        td.path().join("memreport.toml"),
        r#"
[defaults]
project_root = "${MEMREPORT_CLI_TEST_ROOT}"
error_recovery = true
fail_on = "never"
"#,
    )
    .expect("write config");

    memreport_cmd()
        .current_dir(td.path())
        .env("MEMREPORT_CLI_TEST_ROOT", &root)
        .arg("ingest")
        .arg("--valgrind")
        .arg(&broken)
        .assert()
        .code(0);

    let receipt = read_json(&td.path().join("artifacts/memreport/report.json"));
    assert_eq!(receipt["status"], "error");
    assert_eq!(receipt["project"]["files"], 2);
}

#[test]
fn missing_project_root_is_an_error() {
    let td = TempDir::new().expect("temp");

    let output = memreport_cmd()
        .arg("ingest")
        .arg("--project-root")
        .arg(td.path().join("nope"))
        .arg("--out")
        .arg(td.path().join("report.json"))
        .output()
        .expect("run ingest");

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("scan project"));
}

#[test]
fn parse_prints_records_as_json() {
    let td = TempDir::new().expect("temp");
    let report = write(&td, "valgrind.xml", valgrind_reports::multi_stack());

    let output = memreport_cmd()
        .arg("parse")
        .arg("--kind")
        .arg("valgrind")
        .arg(&report)
        .output()
        .expect("run parse");
    assert!(output.status.success());

    let records: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("valid json");
    let records = records.as_array().expect("array");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["stacks"].as_array().map(Vec::len), Some(2));
}

#[test]
fn sarif_renders_a_receipt_to_stdout() {
    let td = TempDir::new().expect("temp");
    let root = make_project(&td);
    let report = write(&td, "valgrind.xml", &invalid_read_report(&root));
    let receipt = td.path().join("report.json");

    memreport_cmd()
        .arg("ingest")
        .arg("--project-root")
        .arg(&root)
        .arg("--valgrind")
        .arg(&report)
        .arg("--out")
        .arg(&receipt)
        .assert()
        .code(2);

    let output = memreport_cmd()
        .arg("sarif")
        .arg("--receipt")
        .arg(&receipt)
        .output()
        .expect("run sarif");
    assert!(output.status.success());

    let sarif: serde_json::Value = serde_json::from_slice(&output.stdout).expect("valid json");
    let related = &sarif["runs"][0]["results"][0]["relatedLocations"];
    assert_eq!(related.as_array().map(Vec::len), Some(3));
    assert!(sarif["runs"][0]["results"][0]["partialFingerprints"]["memreport/v1"].is_string());
}

#[test]
fn validate_accepts_a_good_config() {
    let td = TempDir::new().expect("temp");
    std::fs::write(
        td.path().join("memreport.toml"),
        r#"
[defaults]
encoding = "windows-1252"
exclude = ["third_party/**", "**/generated/*.c"]
"#,
    )
    .expect("write config");

    let output = memreport_cmd()
        .current_dir(td.path())
        .arg("validate")
        .output()
        .expect("run validate");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Configuration is valid!"));
}

#[test]
fn validate_reports_bad_globs_and_encodings_as_json() {
    let td = TempDir::new().expect("temp");
    let config = write(
        &td,
        "custom.toml",
        r#"
[defaults]
encoding = "utf-16le"
exclude = ["src/[oops"]
"#,
    );

    let output = memreport_cmd()
        .arg("validate")
        .arg("--config")
        .arg(&config)
        .arg("--format")
        .arg("json")
        .output()
        .expect("run validate");

    assert_eq!(output.status.code(), Some(1));
    let result: serde_json::Value = serde_json::from_slice(&output.stdout).expect("valid json");
    assert_eq!(result["valid"], false);
    assert_eq!(result["errors"].as_array().map(Vec::len), Some(2));
}

#[test]
fn validate_without_config_fails() {
    let td = TempDir::new().expect("temp");

    let output = memreport_cmd()
        .current_dir(td.path())
        .arg("validate")
        .output()
        .expect("run validate");

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("No configuration file found"));
}
