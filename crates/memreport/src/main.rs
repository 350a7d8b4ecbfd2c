use std::borrow::Cow;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{SecondsFormat, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, info, warn};

use memreport_core::{render_sarif_json, run_ingest, scan_project, IngestPlan, ReportInput};
use memreport_domain::ProjectFiles;
use memreport_parse::{encoding_for_label, parse_report};
use memreport_types::{
    ConfigFile, Defaults, FailOn, IngestReceipt, ProjectMeta, ReportKind, DEFAULT_ENCODING,
};

mod config_loader;
mod env_expand;

use config_loader::load_config_with_includes;
use env_expand::expand_env_vars;

const CONFIG_FILE_NAME: &str = "memreport.toml";

#[derive(Parser)]
#[command(name = "memreport")]
#[command(about = "Anchor Valgrind and Dr. Memory reports to project source files", long_about = None)]
struct Cli {
    /// Enable verbose (info-level) logging to stderr.
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Enable debug-level logging to stderr.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest memory-checker reports and write a receipt.
    Ingest(Box<IngestArgs>),

    /// Print the error records of one report as JSON.
    Parse(ParseArgs),

    /// Convert a JSON receipt to SARIF format (render-only mode).
    Sarif(SarifArgs),

    /// Validate the configuration file (encoding label and exclude globs).
    Validate(ValidateArgs),
}

#[derive(Parser, Debug)]
struct IngestArgs {
    /// Valgrind `--xml=yes` report (repeatable).
    #[arg(long, value_name = "PATH", action = clap::ArgAction::Append)]
    valgrind: Vec<PathBuf>,

    /// Dr. Memory `results.txt` report (repeatable).
    #[arg(long, value_name = "PATH", action = clap::ArgAction::Append)]
    drmemory: Vec<PathBuf>,

    /// Project root used to anchor stack frames.
    ///
    /// When omitted, defaults to config defaults, else the working directory.
    #[arg(long, value_name = "DIR")]
    project_root: Option<PathBuf>,

    /// Encoding label for text reports (defaults to config defaults, else utf-8).
    #[arg(long, value_name = "LABEL")]
    encoding: Option<String>,

    /// Path to a config file. If omitted, uses ./memreport.toml if present.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Record reports that fail to parse in the receipt and keep going.
    #[arg(long)]
    error_recovery: bool,

    /// Exit-code policy (defaults to config defaults, else issues).
    #[arg(long, value_enum)]
    fail_on: Option<FailOnArg>,

    /// Where to write the JSON receipt.
    #[arg(long, value_name = "PATH", default_value = "artifacts/memreport/report.json")]
    out: PathBuf,

    /// Write a Markdown summary.
    #[arg(
        long,
        value_name = "PATH",
        num_args = 0..=1,
        default_missing_value = "artifacts/memreport/report.md"
    )]
    md: Option<PathBuf>,

    /// Write a SARIF report.
    #[arg(
        long,
        value_name = "PATH",
        num_args = 0..=1,
        default_missing_value = "artifacts/memreport/report.sarif.json"
    )]
    sarif: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct ParseArgs {
    /// Report dialect.
    #[arg(long, value_enum)]
    kind: ReportKindArg,

    /// Encoding label for text reports.
    #[arg(long, value_name = "LABEL", default_value = DEFAULT_ENCODING)]
    encoding: String,

    /// Report file to parse.
    file: PathBuf,
}

#[derive(Parser, Debug)]
struct SarifArgs {
    /// Path to a JSON receipt file to convert.
    #[arg(long)]
    receipt: PathBuf,

    /// Output path for the SARIF file.
    ///
    /// If omitted, writes to stdout.
    #[arg(long, short)]
    out: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct ValidateArgs {
    /// Path to a config file. If omitted, uses ./memreport.toml if present.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output format for validation results.
    #[arg(long, value_enum, default_value_t = ValidateFormat::Text)]
    format: ValidateFormat,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ValidateFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FailOnArg {
    Issues,
    Never,
}

impl From<FailOnArg> for FailOn {
    fn from(v: FailOnArg) -> Self {
        match v {
            FailOnArg::Issues => FailOn::Issues,
            FailOnArg::Never => FailOn::Never,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ReportKindArg {
    Valgrind,
    Drmemory,
}

impl From<ReportKindArg> for ReportKind {
    fn from(v: ReportKindArg) -> Self {
        match v {
            ReportKindArg::Valgrind => ReportKind::Valgrind,
            ReportKindArg::Drmemory => ReportKind::DrMemory,
        }
    }
}

#[cfg(not(test))]
fn main() -> std::process::ExitCode {
    match run_with_args(std::env::args_os()) {
        Ok(code) => std::process::ExitCode::from(code as u8),
        Err(err) => {
            eprintln!("{err:?}");
            std::process::ExitCode::from(1)
        }
    }
}

fn run_with_args<I, T>(args: I) -> Result<i32>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    init_logging(cli.verbose, cli.debug);

    match cli.command {
        Commands::Ingest(args) => cmd_ingest(*args),
        Commands::Parse(args) => {
            cmd_parse(args)?;
            Ok(0)
        }
        Commands::Sarif(args) => {
            cmd_sarif(args)?;
            Ok(0)
        }
        Commands::Validate(args) => cmd_validate(args),
    }
}

/// Initialize tracing/logging based on CLI flags.
fn init_logging(verbose: bool, debug: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        "warn"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();

    debug!("Logging initialized at level: {}", level);
}

/// Ingest settings after CLI flags are laid over config defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
struct IngestSettings {
    project_root: PathBuf,
    encoding: String,
    error_recovery: bool,
    fail_on: FailOn,
    exclude: Vec<String>,
}

fn resolve_settings(args: &IngestArgs, defaults: Defaults) -> IngestSettings {
    IngestSettings {
        project_root: args
            .project_root
            .clone()
            .or_else(|| defaults.project_root.map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(".")),
        encoding: args
            .encoding
            .clone()
            .or(defaults.encoding)
            .unwrap_or_else(|| DEFAULT_ENCODING.to_string()),
        error_recovery: args.error_recovery || defaults.error_recovery.unwrap_or(false),
        fail_on: args
            .fail_on
            .map(FailOn::from)
            .or(defaults.fail_on)
            .unwrap_or(FailOn::Issues),
        exclude: defaults.exclude,
    }
}

fn report_inputs(args: &IngestArgs) -> Vec<ReportInput> {
    let valgrind = args.valgrind.iter().map(|path| ReportInput {
        kind: ReportKind::Valgrind,
        path: path.clone(),
    });
    let drmemory = args.drmemory.iter().map(|path| ReportInput {
        kind: ReportKind::DrMemory,
        path: path.clone(),
    });
    valgrind.chain(drmemory).collect()
}

fn cmd_ingest(args: IngestArgs) -> Result<i32> {
    let cfg = load_config(args.config.clone())?;
    let settings = resolve_settings(&args, cfg.defaults);

    let project = scan_project(&settings.project_root, &settings.exclude)
        .with_context(|| format!("scan project {}", settings.project_root.display()))?;
    info!(
        "Project root {} with {} file(s)",
        project.root(),
        project.len()
    );

    let reports = report_inputs(&args);
    if reports.is_empty() {
        warn!("No reports given; pass --valgrind or --drmemory");
    }

    let plan = IngestPlan {
        reports,
        encoding: settings.encoding,
        error_recovery: settings.error_recovery,
        fail_on: settings.fail_on,
        project: ProjectMeta {
            root: project.root().to_string(),
            files: project.len() as u32,
        },
    };

    let mut run = run_ingest(&plan, &project)?;
    run.receipt.started_at = Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));

    write_json(&args.out, &run.receipt)?;

    if let Some(path) = &args.md {
        write_text(path, &run.markdown)?;
    }

    if let Some(path) = &args.sarif {
        let sarif = render_sarif_json(&run.receipt).context("render SARIF")?;
        write_text(path, &sarif)?;
    }

    info!(
        "memreport {}: {} issue(s) from {} record(s), exit {}",
        run.receipt.status.as_str(),
        run.receipt.counts.issues,
        run.receipt.counts.records,
        run.exit_code
    );

    Ok(run.exit_code)
}

fn cmd_parse(args: ParseArgs) -> Result<()> {
    let encoding = encoding_for_label(&args.encoding)
        .with_context(|| format!("resolve report encoding '{}'", args.encoding))?;

    let file = File::open(&args.file)
        .with_context(|| format!("open report {}", args.file.display()))?;
    let records = parse_report(args.kind.into(), BufReader::new(file), encoding)
        .with_context(|| format!("parse report {}", args.file.display()))?;

    debug!("Parsed {} record(s)", records.len());

    let json = serde_json::to_string_pretty(&records).context("render json")?;
    println!("{json}");
    Ok(())
}

fn cmd_sarif(args: SarifArgs) -> Result<()> {
    let receipt_text = std::fs::read_to_string(&args.receipt)
        .with_context(|| format!("read receipt {}", args.receipt.display()))?;

    let receipt: IngestReceipt = serde_json::from_str(&receipt_text)
        .with_context(|| format!("parse receipt {}", args.receipt.display()))?;

    let sarif = render_sarif_json(&receipt).context("render SARIF")?;

    match args.out {
        Some(path) => write_text(&path, &sarif)?,
        None => print!("{sarif}"),
    }

    Ok(())
}

fn cmd_validate(args: ValidateArgs) -> Result<i32> {
    info!("Validating configuration file");

    let Some(path) = args.config.clone().or_else(default_config_path) else {
        bail!("No configuration file found. Specify --config or create {CONFIG_FILE_NAME}");
    };

    let cfg = load_config_with_includes(&path, expand_config_text)?;
    let defaults = &cfg.defaults;

    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<String> = Vec::new();

    if let Some(label) = &defaults.encoding {
        if let Err(e) = encoding_for_label(label) {
            errors.push(format!("defaults.encoding: {e}"));
        }
    }

    for glob in &defaults.exclude {
        let compiled =
            ProjectFiles::new(".", Vec::<String>::new()).with_excludes(std::slice::from_ref(glob));
        if let Err(e) = compiled {
            errors.push(format!("defaults.exclude: {e}"));
        }
    }

    if let Some(root) = &defaults.project_root {
        if !Path::new(root).is_dir() {
            warnings.push(format!(
                "defaults.project_root: '{root}' is not a directory from here"
            ));
        }
    }

    match args.format {
        ValidateFormat::Json => {
            let result = serde_json::json!({
                "valid": errors.is_empty(),
                "path": path.display().to_string(),
                "errors": errors,
                "warnings": warnings,
            });
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        ValidateFormat::Text => {
            println!("Validating {}...", path.display());
            println!();

            if !warnings.is_empty() {
                println!("Warnings ({}):", warnings.len());
                for (i, warn) in warnings.iter().enumerate() {
                    println!("  {}. {}", i + 1, warn);
                }
                println!();
            }

            if errors.is_empty() {
                println!("Configuration is valid!");
            } else {
                println!("Configuration has {} error(s):", errors.len());
                println!();
                for (i, err) in errors.iter().enumerate() {
                    println!("  {}. {}", i + 1, err);
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(0)
    } else {
        Ok(1)
    }
}

fn default_config_path() -> Option<PathBuf> {
    let p = PathBuf::from(CONFIG_FILE_NAME);
    if p.exists() {
        Some(p)
    } else {
        None
    }
}

fn expand_config_text(text: &str) -> Result<String> {
    expand_env_vars(text).map(Cow::into_owned)
}

fn load_config(path: Option<PathBuf>) -> Result<ConfigFile> {
    let Some(path) = path.or_else(default_config_path) else {
        debug!("No config file found, using defaults");
        return Ok(ConfigFile::default());
    };

    info!("Loading config from: {}", path.display());
    load_config_with_includes(&path, expand_config_text)
}

fn write_json(path: &Path, value: &impl serde::Serialize) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create dir {}", parent.display()))?;
        }
    }

    let bytes = serde_json::to_vec_pretty(value).context("serialize receipt")?;
    std::fs::write(path, bytes).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

fn write_text(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create dir {}", parent.display()))?;
        }
    }

    std::fs::write(path, text).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use memreport_testkit::fixtures::{sample_receipts, valgrind_reports};

    fn ingest_args(extra: &[&str]) -> IngestArgs {
        let mut argv = vec!["memreport", "ingest"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Commands::Ingest(args) => *args,
            _ => panic!("expected ingest"),
        }
    }

    #[test]
    fn fail_on_arg_converts() {
        assert_eq!(FailOn::from(FailOnArg::Issues), FailOn::Issues);
        assert_eq!(FailOn::from(FailOnArg::Never), FailOn::Never);
        assert_eq!(ReportKind::from(ReportKindArg::Drmemory), ReportKind::DrMemory);
    }

    #[test]
    fn optional_outputs_use_default_paths() {
        let args = ingest_args(&["--md", "--sarif"]);
        assert_eq!(args.out, PathBuf::from("artifacts/memreport/report.json"));
        assert_eq!(args.md, Some(PathBuf::from("artifacts/memreport/report.md")));
        assert_eq!(
            args.sarif,
            Some(PathBuf::from("artifacts/memreport/report.sarif.json"))
        );

        let args = ingest_args(&[]);
        assert_eq!(args.md, None);
        assert_eq!(args.sarif, None);
    }

    #[test]
    fn reports_keep_their_kind_valgrind_first() {
        let args = ingest_args(&[
            "--drmemory",
            "results.txt",
            "--valgrind",
            "a.xml",
            "--valgrind",
            "b.xml",
        ]);
        let inputs = report_inputs(&args);
        let kinds: Vec<(ReportKind, &Path)> =
            inputs.iter().map(|r| (r.kind, r.path.as_path())).collect();
        assert_eq!(
            kinds,
            vec![
                (ReportKind::Valgrind, Path::new("a.xml")),
                (ReportKind::Valgrind, Path::new("b.xml")),
                (ReportKind::DrMemory, Path::new("results.txt")),
            ]
        );
    }

    #[test]
    fn settings_fall_back_to_builtin_defaults() {
        let settings = resolve_settings(&ingest_args(&[]), Defaults::default());
        assert_eq!(
            settings,
            IngestSettings {
                project_root: PathBuf::from("."),
                encoding: "utf-8".to_string(),
                error_recovery: false,
                fail_on: FailOn::Issues,
                exclude: vec![],
            }
        );
    }

    #[test]
    fn cli_flags_override_config_defaults() {
        let defaults = Defaults {
            project_root: Some("from-config".to_string()),
            encoding: Some("windows-1252".to_string()),
            error_recovery: Some(false),
            fail_on: Some(FailOn::Never),
            exclude: vec!["third_party/**".to_string()],
        };
        let args = ingest_args(&[
            "--project-root",
            "from-cli",
            "--error-recovery",
            "--fail-on",
            "issues",
        ]);

        let settings = resolve_settings(&args, defaults);
        assert_eq!(settings.project_root, PathBuf::from("from-cli"));
        assert_eq!(settings.encoding, "windows-1252");
        assert!(settings.error_recovery);
        assert_eq!(settings.fail_on, FailOn::Issues);
        assert_eq!(settings.exclude, vec!["third_party/**".to_string()]);
    }

    #[test]
    fn config_error_recovery_is_honoured_without_the_flag() {
        let defaults = Defaults {
            error_recovery: Some(true),
            ..Defaults::default()
        };
        assert!(resolve_settings(&ingest_args(&[]), defaults).error_recovery);
    }

    #[test]
    fn write_json_and_text_create_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("a/b/report.json");
        let text_path = dir.path().join("c/report.md");

        write_json(&json_path, &sample_receipts::clean()).unwrap();
        write_text(&text_path, "## memreport: PASS\n").unwrap();

        let receipt: IngestReceipt =
            serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(receipt, sample_receipts::clean());
        assert_eq!(
            std::fs::read_to_string(&text_path).unwrap(),
            "## memreport: PASS\n"
        );
    }

    #[test]
    fn run_with_args_dispatches_ingest() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("project");
        std::fs::create_dir_all(project.join("src")).unwrap();
        std::fs::write(project.join("src/main.c"), "int main(void) { return 0; }\n").unwrap();
        let report = dir.path().join("valgrind.xml");
        std::fs::write(&report, valgrind_reports::missing_kind()).unwrap();
        let out = dir.path().join("out/report.json");

        let code = run_with_args([
            "memreport".to_string(),
            "--debug".to_string(),
            "ingest".to_string(),
            "--project-root".to_string(),
            project.display().to_string(),
            "--valgrind".to_string(),
            report.display().to_string(),
            "--error-recovery".to_string(),
            "--out".to_string(),
            out.display().to_string(),
        ])
        .unwrap();

        assert_eq!(code, 3);
        let receipt: IngestReceipt =
            serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(receipt.counts.failed_reports, 1);
        assert_eq!(receipt.project.files, 1);
        assert!(receipt.started_at.is_some());
    }

    #[test]
    fn run_with_args_dispatches_sarif_and_validate() {
        let dir = tempfile::tempdir().unwrap();
        let receipt = dir.path().join("receipt.json");
        write_json(&receipt, &sample_receipts::with_issues()).unwrap();
        let sarif = dir.path().join("report.sarif.json");

        let code = run_with_args([
            "memreport".to_string(),
            "sarif".to_string(),
            "--receipt".to_string(),
            receipt.display().to_string(),
            "--out".to_string(),
            sarif.display().to_string(),
        ])
        .unwrap();
        assert_eq!(code, 0);
        assert!(std::fs::read_to_string(&sarif).unwrap().contains("\"version\": \"2.1.0\""));

        let config = dir.path().join("memreport.toml");
        std::fs::write(&config, "[defaults]\nencoding = \"no-such-encoding\"\n").unwrap();
        let code = run_with_args([
            "memreport".to_string(),
            "validate".to_string(),
            "--config".to_string(),
            config.display().to_string(),
        ])
        .unwrap();
        assert_eq!(code, 1);
    }

    #[test]
    fn parse_rejects_unknown_encodings() {
        let dir = tempfile::tempdir().unwrap();
        let report = dir.path().join("results.txt");
        std::fs::write(&report, "").unwrap();

        let err = run_with_args([
            "memreport".to_string(),
            "parse".to_string(),
            "--kind".to_string(),
            "drmemory".to_string(),
            "--encoding".to_string(),
            "klingon".to_string(),
            report.display().to_string(),
        ])
        .unwrap_err();
        assert!(format!("{err:#}").contains("resolve report encoding 'klingon'"));
    }
}
