use std::path::PathBuf;
use std::process::Command;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

mod conform;

pub(crate) const CONFIG_SCHEMA_FILE: &str = "memreport.config.schema.json";
pub(crate) const INGEST_SCHEMA_FILE: &str = "memreport.ingest.v1.schema.json";

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Repo automation tasks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run the "CI local" suite: fmt, clippy, test, conformance.
    Ci,

    /// Generate JSON Schemas for receipts/config into `schemas/`.
    Schema {
        #[arg(long, default_value = "schemas")]
        out_dir: PathBuf,
    },

    /// Run receipt conformance checks against the built binary.
    Conform {
        /// Skip the slow determinism check.
        #[arg(long)]
        quick: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.cmd {
        Cmd::Ci => ci(),
        Cmd::Schema { out_dir } => schema(out_dir),
        Cmd::Conform { quick } => conform::run_conformance(quick),
    }
}

fn ci() -> Result<()> {
    run("cargo", &["fmt", "--check"])?;
    run(
        "cargo",
        &[
            "clippy",
            "--workspace",
            "--all-targets",
            "--",
            "-D",
            "warnings",
        ],
    )?;
    run("cargo", &["test", "--workspace"])?;
    conform::run_conformance(true)?;
    Ok(())
}

fn schema(out_dir: PathBuf) -> Result<()> {
    std::fs::create_dir_all(&out_dir).context("create schema output dir")?;

    let cfg_path = out_dir.join(CONFIG_SCHEMA_FILE);
    let receipt_path = out_dir.join(INGEST_SCHEMA_FILE);

    write_pretty_json(&cfg_path, &config_schema())?;
    write_pretty_json(&receipt_path, &ingest_schema())?;

    eprintln!("wrote {}", cfg_path.display());
    eprintln!("wrote {}", receipt_path.display());
    Ok(())
}

pub(crate) fn config_schema() -> schemars::schema::RootSchema {
    schemars::schema_for!(memreport_types::ConfigFile)
}

pub(crate) fn ingest_schema() -> schemars::schema::RootSchema {
    schemars::schema_for!(memreport_types::IngestReceipt)
}

fn write_pretty_json(path: &std::path::Path, value: &impl serde::Serialize) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value).context("serialize json")?;
    std::fs::write(path, bytes).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

fn run(bin: &str, args: &[&str]) -> Result<()> {
    let status = Command::new(bin)
        .args(args)
        .status()
        .with_context(|| format!("run {bin} {args:?}"))?;
    if !status.success() {
        bail!("command failed: {bin} {args:?}");
    }
    Ok(())
}
