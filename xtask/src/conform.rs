//! Receipt conformance checks.
//!
//! These run the real `memreport` binary against generated reports and check
//! that the receipts it writes are stable, survive broken input and match the
//! published JSON schemas.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::OnceLock;

use anyhow::{anyhow, bail, Context, Result};
use memreport_testkit::fixtures::valgrind_reports;
use memreport_testkit::{ValgrindErrorBuilder, ValgrindReportBuilder};
use memreport_types::{Frame, IngestReceipt, INGEST_SCHEMA_V1};
use tempfile::TempDir;

use crate::{config_schema, ingest_schema, CONFIG_SCHEMA_FILE, INGEST_SCHEMA_FILE};

enum Outcome {
    Pass,
    Skip(&'static str),
}

type Check = (&'static str, fn(bool) -> Result<Outcome>);

static MEMREPORT_BIN: OnceLock<PathBuf> = OnceLock::new();

const CHECKS: &[Check] = &[
    ("Receipt shape", check_receipt_shape),
    ("Determinism", check_determinism),
    ("Survivability", check_survivability),
    ("JSON schema validation", check_json_schema),
    ("Schema drift", check_schema_drift),
];

/// Run all conformance checks.
pub fn run_conformance(quick: bool) -> Result<()> {
    println!("Running memreport conformance checks...\n");

    let binary = build_memreport()?;
    let _ = MEMREPORT_BIN.set(binary);

    let total = CHECKS.len();
    let mut passed = 0;
    let mut failed = 0;

    for (i, (name, check)) in CHECKS.iter().enumerate() {
        print!("  [{}/{}] {}... ", i + 1, total, name);
        match check(quick) {
            Ok(Outcome::Pass) => {
                println!("PASS");
                passed += 1;
            }
            Ok(Outcome::Skip(reason)) => println!("SKIP ({reason})"),
            Err(e) => {
                println!("FAIL: {e:#}");
                failed += 1;
            }
        }
    }

    println!();
    println!("Results: {passed}/{total} checks passed");

    if failed > 0 {
        bail!("{failed} conformance check(s) failed");
    }

    Ok(())
}

/// The receipt deserializes and carries the v1 schema id.
fn check_receipt_shape(_quick: bool) -> Result<Outcome> {
    let temp_dir = TempDir::new().context("create temp dir")?;
    let receipt_path = ingest_sample(temp_dir.path(), "report.json", &[])?;

    let text = std::fs::read_to_string(&receipt_path).context("read receipt")?;
    let receipt: IngestReceipt = serde_json::from_str(&text).context("deserialize receipt")?;

    if receipt.schema != INGEST_SCHEMA_V1 {
        bail!(
            "invalid schema field: expected '{}', got '{}'",
            INGEST_SCHEMA_V1,
            receipt.schema
        );
    }
    if receipt.issues.len() != 1 {
        bail!("expected 1 issue, got {}", receipt.issues.len());
    }
    Ok(Outcome::Pass)
}

/// Repeated runs produce identical receipts apart from the timestamp.
fn check_determinism(quick: bool) -> Result<Outcome> {
    if quick {
        return Ok(Outcome::Skip("quick mode"));
    }

    let temp_dir = TempDir::new().context("create temp dir")?;
    let mut outputs: Vec<String> = Vec::new();

    for i in 0..5 {
        let receipt_path = ingest_sample(temp_dir.path(), &format!("report_{i}.json"), &[])?;
        let mut value = read_json(&receipt_path)?;
        if let Some(o) = value.as_object_mut() {
            o.remove("started_at");
        }
        outputs.push(serde_json::to_string_pretty(&value)?);
    }

    let first = &outputs[0];
    for (i, output) in outputs.iter().enumerate().skip(1) {
        if output != first {
            bail!("Run {i} produced different output than run 0");
        }
    }
    Ok(Outcome::Pass)
}

/// A broken report under error recovery still yields a receipt and exit 3.
fn check_survivability(_quick: bool) -> Result<Outcome> {
    let temp_dir = TempDir::new().context("create temp dir")?;
    let broken = temp_dir.path().join("broken.xml");
    std::fs::write(&broken, valgrind_reports::missing_stack()).context("write broken report")?;

    let receipt_path = temp_dir.path().join("report.json");
    let output = run_memreport(
        temp_dir.path(),
        &[
            OsStr::new("ingest"),
            OsStr::new("--project-root"),
            temp_dir.path().as_os_str(),
            OsStr::new("--valgrind"),
            broken.as_os_str(),
            OsStr::new("--error-recovery"),
            OsStr::new("--out"),
            receipt_path.as_os_str(),
        ],
    )?;

    if output.status.code() != Some(3) {
        bail!("expected exit code 3, got {:?}", output.status.code());
    }

    let value = read_json(&receipt_path)?;
    if value["status"] != "error" {
        bail!("expected status 'error', got {}", value["status"]);
    }
    if value["reports"][0]["error"].as_str().is_none() {
        bail!("failed report carries no error message");
    }
    Ok(Outcome::Pass)
}

/// The receipt validates against the schema generated from the types.
fn check_json_schema(_quick: bool) -> Result<Outcome> {
    let temp_dir = TempDir::new().context("create temp dir")?;
    let receipt_path = ingest_sample(temp_dir.path(), "report.json", &["--error-recovery"])?;

    let schema_value = serde_json::to_value(ingest_schema()).context("serialize schema")?;
    let compiled = jsonschema::JSONSchema::compile(&schema_value).map_err(|e| anyhow!("{e}"))?;

    let receipt = read_json(&receipt_path)?;
    if let Err(errors) = compiled.validate(&receipt) {
        let messages: Vec<String> = errors
            .map(|e| format!("  - {e} at {}", e.instance_path))
            .collect();
        bail!("receipt failed schema validation:\n{}", messages.join("\n"));
    }
    Ok(Outcome::Pass)
}

/// Committed schemas under `schemas/` match the current types.
fn check_schema_drift(_quick: bool) -> Result<Outcome> {
    let dir = std::env::current_dir()?.join("schemas");
    if !dir.exists() {
        return Ok(Outcome::Skip("no schemas/ directory; run `cargo xtask schema`"));
    }

    let expected = [
        (INGEST_SCHEMA_FILE, serde_json::to_value(ingest_schema())?),
        (CONFIG_SCHEMA_FILE, serde_json::to_value(config_schema())?),
    ];

    for (file, generated) in expected {
        let path = dir.join(file);
        let committed = read_json(&path)
            .with_context(|| format!("read {}; run `cargo xtask schema`", path.display()))?;
        if committed != generated {
            bail!(
                "schema drift detected in schemas/{file}\n\
                 If the change is intentional, regenerate with `cargo xtask schema`"
            );
        }
    }
    Ok(Outcome::Pass)
}

/// Write a one-file project plus a Valgrind report into `dir` and ingest it.
fn ingest_sample(dir: &Path, receipt_name: &str, extra: &[&str]) -> Result<PathBuf> {
    let root = dir.join("project");
    std::fs::create_dir_all(root.join("src")).context("create project")?;
    std::fs::write(root.join("src/buffer.c"), "/* buffer */\n").context("write source")?;
    let root = std::fs::canonicalize(&root).context("canonicalize project")?;

    let report = ValgrindReportBuilder::new()
        .error(
            ValgrindErrorBuilder::new("InvalidWrite")
                .what("Invalid write of size 8")
                .stack(vec![
                    Frame::new("/usr/lib/libc.c", Some(10)),
                    Frame::new(root.join("src/buffer.c").display().to_string(), Some(21)),
                ]),
        )
        .build();
    let report_path = dir.join("valgrind.xml");
    std::fs::write(&report_path, report).context("write report")?;

    let receipt_path = dir.join(receipt_name);
    let mut args: Vec<&OsStr> = vec![
        OsStr::new("ingest"),
        OsStr::new("--project-root"),
        root.as_os_str(),
        OsStr::new("--valgrind"),
        report_path.as_os_str(),
        OsStr::new("--out"),
        receipt_path.as_os_str(),
    ];
    args.extend(extra.iter().map(OsStr::new));

    let output = run_memreport(dir, &args)?;
    if output.status.code() != Some(2) {
        bail!(
            "expected exit code 2, got {:?}: {}",
            output.status.code(),
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(receipt_path)
}

fn read_json(path: &Path) -> Result<serde_json::Value> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parse {}", path.display()))
}

fn build_memreport() -> Result<PathBuf> {
    let status = Command::new("cargo")
        .args(["build", "-p", "memreport"])
        .status()
        .context("build memreport")?;

    if !status.success() {
        bail!("failed to build memreport");
    }

    Ok(std::env::current_dir()?
        .join("target")
        .join("debug")
        .join(if cfg!(windows) {
            "memreport.exe"
        } else {
            "memreport"
        }))
}

fn run_memreport(dir: &Path, args: &[&OsStr]) -> Result<Output> {
    let binary = MEMREPORT_BIN.get().context("memreport binary not built")?;

    Command::new(binary)
        .args(args)
        .current_dir(dir)
        .output()
        .context("run memreport")
}
