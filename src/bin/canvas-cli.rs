//! CLI binary for canvas-lms-cli.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ClientConfig` / `BatchConfig` and prints results.

use anyhow::{Context, Result};
use canvas_lms_cli::manifest::SourceFormat;
use canvas_lms_cli::{
    check_roster, convert_to_file, document::pdf_path_for, ensure_engine, load_manifest, run_batch, BatchConfig,
    BatchReport, BatchStats, BatchTarget, CanvasClient, CanvasError, CancellationToken,
    ClientConfig, DocumentStyle, Encoding, LmsGateway, ManifestOptions, Theme, UploadOutcome,
    UploadProgressCallback, UploadStatus,
};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per finished student. Records may
/// finish out of order when concurrency > 1.
struct CliProgressCallback {
    bar: ProgressBar,
    problems: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            problems: AtomicUsize::new(0),
        })
    }
}

impl UploadProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_records: usize) {
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>3}/{len} students  \
                 ⏱ {elapsed_precise}  ETA {eta_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
        );
        self.bar.set_length(total_records as u64);
        self.bar.set_prefix("Uploading");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Uploading grades for {total_records} students…"))
        ));
    }

    fn on_record_start(&self, _index: usize, _total: usize, student_id: &str) {
        self.bar.set_message(format!("student {student_id}"));
    }

    fn on_record_complete(&self, _index: usize, _total: usize, outcome: &UploadOutcome) {
        let mark = match outcome.status {
            UploadStatus::Success => green("✓"),
            UploadStatus::Partial => yellow("⚠"),
            UploadStatus::Failed => red("✗"),
        };
        if outcome.status != UploadStatus::Success {
            self.problems.fetch_add(1, Ordering::SeqCst);
        }
        let detail = outcome
            .error_detail
            .as_deref()
            .map(|d| {
                if d.chars().count() > 80 {
                    format!("{}\u{2026}", d.chars().take(79).collect::<String>())
                } else {
                    d.to_string()
                }
            })
            .unwrap_or_default();
        self.bar.println(format!(
            "  {} {:<12} {}  {}  {}",
            mark,
            outcome.student_id,
            dim(&format!(
                "{}/{} files",
                outcome.uploaded_count(),
                outcome.attachments.len()
            )),
            dim(&format!("{:.1}s", outcome.elapsed_ms as f64 / 1000.0)),
            red(&detail),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, stats: &BatchStats, cancelled: bool) {
        self.bar.finish_and_clear();
        if cancelled {
            eprintln!(
                "{} cancelled: {} student(s) not processed",
                yellow("⚠"),
                bold(&stats.skipped.to_string())
            );
        }
        if self.problems.load(Ordering::SeqCst) > 0 {
            eprintln!("{} see the summary below for students needing follow-up", cyan("ℹ"));
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Find the ids you need
  canvas-cli courses
  canvas-cli assignments --course 1234

  # Check a manifest without touching Canvas
  canvas-cli validate grades.csv

  # Preview a feedback file
  canvas-cli convert feedback/eval_12345.md -o preview.pdf

  # Upload grades and feedback
  canvas-cli upload-grades --course 1234 --assignment 5678 grades.csv

MANIFEST COLUMNS:
  student_id (alias canvas_id)   required
  grade                          required, numeric
  comment (alias comments)       optional text
  md_eval_file | pdf_eval_file   optional detailed feedback (one or the other)
  md_exam_file1, pdf_exam_file1  optional exam files, format 1
  md_exam_file2, pdf_exam_file2  optional exam files, format 2

  Relative paths resolve against the manifest's directory (or --root-dir).

EXIT CODES:
  0  every student succeeded
  1  at least one grade could not be posted
  2  some attachments failed, or the run was cancelled

ENVIRONMENT VARIABLES:
  CANVAS_BASE_URL   Institution URL, e.g. https://school.instructure.com
  CANVAS_TOKEN      Personal access token
  CANVAS_CLI_*      Defaults for the matching long options
"#;

/// Manage Canvas courses and bulk-upload grades with feedback files.
#[derive(Parser, Debug)]
#[command(
    name = "canvas-cli",
    version,
    about = "Manage Canvas courses and bulk-upload grades with feedback files",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Canvas institution URL.
    #[arg(long, env = "CANVAS_BASE_URL", global = true)]
    base_url: Option<String>,

    /// Canvas personal access token.
    #[arg(long, env = "CANVAS_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,

    /// Per-request timeout in seconds.
    #[arg(long, env = "CANVAS_CLI_TIMEOUT", default_value_t = 60, global = true)]
    timeout: u64,

    /// Minimum delay between API calls in milliseconds.
    #[arg(long, env = "CANVAS_CLI_REQUEST_INTERVAL_MS", default_value_t = 400, global = true)]
    request_interval_ms: u64,

    /// Retries on transient API failures.
    #[arg(long, env = "CANVAS_CLI_MAX_RETRIES", default_value_t = 3, global = true)]
    max_retries: u32,

    /// Output JSON instead of tables.
    #[arg(long, env = "CANVAS_CLI_JSON", global = true)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "CANVAS_CLI_NO_PROGRESS", global = true)]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "CANVAS_CLI_VERBOSE", global = true)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "CANVAS_CLI_QUIET", global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List active courses.
    Courses,
    /// List assignments in a course.
    Assignments {
        #[arg(long)]
        course: u64,
    },
    /// List students enrolled in a course.
    Students {
        #[arg(long)]
        course: u64,
    },
    /// List the course's file folders.
    Folders {
        #[arg(long)]
        course: u64,
    },
    /// Validate a grade manifest without contacting Canvas.
    Validate(ManifestArgs),
    /// Render a Markdown feedback file to PDF.
    Convert {
        input: PathBuf,
        /// Output path. Default: input with a .pdf extension.
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        style: StyleArgs,
    },
    /// Post grades and upload feedback files from a manifest.
    UploadGrades(UploadArgs),
}

#[derive(Args, Debug)]
struct ManifestArgs {
    /// CSV manifest.
    csv: PathBuf,

    /// Base directory for relative attachment paths.
    #[arg(long, env = "CANVAS_CLI_ROOT_DIR")]
    root_dir: Option<PathBuf>,

    /// Manifest encoding: utf-8 or latin-1.
    #[arg(long, env = "CANVAS_CLI_ENCODING", default_value = "utf-8")]
    encoding: Encoding,

    /// Field delimiter.
    #[arg(long, default_value_t = ',')]
    delimiter: char,
}

#[derive(Args, Debug)]
struct StyleArgs {
    /// Document theme: github, academic or minimal.
    #[arg(long, env = "CANVAS_CLI_THEME", default_value = "github")]
    theme: Theme,

    /// Base font size in points.
    #[arg(long, env = "CANVAS_CLI_FONT_SIZE")]
    font_size: Option<f32>,
}

#[derive(Args, Debug)]
struct UploadArgs {
    #[command(flatten)]
    manifest: ManifestArgs,

    #[arg(long)]
    course: u64,

    #[arg(long)]
    assignment: u64,

    /// Folder name override. Default: looked up from Canvas.
    #[arg(long)]
    assignment_name: Option<String>,

    /// Upload the valid rows even if some rows failed validation.
    #[arg(long)]
    proceed_with_valid: bool,

    /// Do not verify that every student is enrolled.
    #[arg(long)]
    skip_roster_check: bool,

    /// Students processed at once.
    #[arg(short, long, env = "CANVAS_CLI_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Top-level folder for feedback files.
    #[arg(long, env = "CANVAS_CLI_FOLDER_ROOT", default_value = "Grade_Feedback")]
    folder_root: String,

    #[command(flatten)]
    style: StyleArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs during uploads.
    let show_progress = !cli.quiet
        && !cli.no_progress
        && !cli.json
        && matches!(cli.command, Command::UploadGrades(_));
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let code = match &cli.command {
        Command::Courses => {
            let gw = gateway(&cli)?;
            let courses = gw.list_courses().await.context("Failed to list courses")?;
            print_rows(&cli, &courses, |c| {
                format!(
                    "{:>8}  {:<14}  {}",
                    c.id,
                    c.course_code.as_deref().unwrap_or("-"),
                    c.name
                )
            })?;
            0
        }
        Command::Assignments { course } => {
            let gw = gateway(&cli)?;
            let items = gw
                .list_assignments(*course)
                .await
                .context("Failed to list assignments")?;
            print_rows(&cli, &items, |a| {
                format!(
                    "{:>8}  {:>7}  {:<20}  {}",
                    a.id,
                    a.points_possible.map(|p| p.to_string()).unwrap_or_default(),
                    a.due_at.as_deref().unwrap_or("-"),
                    a.name
                )
            })?;
            0
        }
        Command::Students { course } => {
            let gw = gateway(&cli)?;
            let items = gw
                .list_students(*course)
                .await
                .context("Failed to list students")?;
            print_rows(&cli, &items, |s| {
                format!(
                    "{:>8}  {:<30}  {}",
                    s.id,
                    s.sortable_name.as_deref().unwrap_or(&s.name),
                    s.email.as_deref().unwrap_or("")
                )
            })?;
            0
        }
        Command::Folders { course } => {
            let gw = gateway(&cli)?;
            let items = gw
                .list_folders(*course)
                .await
                .context("Failed to list folders")?;
            print_rows(&cli, &items, |f| {
                format!(
                    "{:>8}  {}",
                    f.id,
                    f.full_name.as_deref().unwrap_or(&f.name)
                )
            })?;
            0
        }
        Command::Validate(args) => validate(&cli, args)?,
        Command::Convert {
            input,
            output,
            style,
        } => {
            prepare_pdf_engine(&cli)?;
            let output = output.clone().unwrap_or_else(|| pdf_path_for(input));
            let bytes = convert_to_file(input, &output, &document_style(style))
                .await
                .with_context(|| format!("Failed to convert {}", input.display()))?;
            if !cli.quiet {
                eprintln!(
                    "{}  {} bytes  →  {}",
                    green("✔"),
                    bytes,
                    bold(&output.display().to_string())
                );
            }
            0
        }
        Command::UploadGrades(args) => upload(&cli, args, show_progress).await?,
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

/// Make sure PDFium is on disk and loads before any conversion starts.
///
/// The first run downloads the library (~30 MB) into the user cache; later
/// runs only check the path.
fn prepare_pdf_engine(cli: &Cli) -> Result<()> {
    if !pdfium_auto::is_pdfium_cached() {
        if cli.quiet {
            tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
                .context("Failed to download PDFium engine")?;
        } else {
            let bar = ProgressBar::new(0);
            bar.set_style(
                ProgressStyle::with_template(
                    "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {bytes}/{total_bytes}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▉▊▋▌▍▎▏  ")
                .tick_strings(TICKS),
            );
            bar.set_prefix("PDF engine");
            bar.enable_steady_tick(Duration::from_millis(80));

            let progress = bar.clone();
            tokio::task::block_in_place(|| {
                pdfium_auto::ensure_pdfium_library(Some(&|downloaded, total| {
                    if let Some(t) = total {
                        if progress.length() != Some(t) {
                            progress.set_length(t);
                        }
                    }
                    progress.set_position(downloaded);
                }))
            })
            .context("Failed to download PDFium engine")?;
            bar.finish_with_message("ready ✓");
        }
    }
    tokio::task::block_in_place(ensure_engine).context("Failed to load PDFium engine")
}

fn client_config(cli: &Cli) -> Result<ClientConfig> {
    let base_url = cli
        .base_url
        .clone()
        .context("Canvas URL not set: pass --base-url or set CANVAS_BASE_URL")?;
    let token = cli
        .token
        .clone()
        .context("Canvas token not set: pass --token or set CANVAS_TOKEN")?;
    ClientConfig::builder(base_url, token)
        .request_timeout_secs(cli.timeout)
        .min_request_interval_ms(cli.request_interval_ms)
        .max_retries(cli.max_retries)
        .build()
        .context("Invalid configuration")
}

fn gateway(cli: &Cli) -> Result<Arc<CanvasClient>> {
    let config = client_config(cli)?;
    Ok(Arc::new(
        CanvasClient::from_config(&config).context("Failed to create Canvas client")?,
    ))
}

fn document_style(args: &StyleArgs) -> DocumentStyle {
    let mut style = DocumentStyle::with_theme(args.theme);
    if let Some(size) = args.font_size {
        style.font_size = size;
    }
    style.sanitized()
}

fn manifest_options(args: &ManifestArgs) -> Result<Option<ManifestOptions>> {
    if args.root_dir.is_none() && args.encoding == Encoding::Utf8 && args.delimiter == ',' {
        return Ok(None);
    }
    if !args.delimiter.is_ascii() {
        anyhow::bail!("Delimiter must be a single ASCII character");
    }
    let root = match &args.root_dir {
        Some(dir) => dir.clone(),
        None => args
            .csv
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    Ok(Some(
        ManifestOptions::new(root)
            .encoding(args.encoding)
            .delimiter(args.delimiter as u8),
    ))
}

fn print_rows<T: serde::Serialize>(cli: &Cli, rows: &[T], line: impl Fn(&T) -> String) -> Result<()> {
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(rows).context("Failed to serialise output")?
        );
    } else {
        for row in rows {
            println!("{}", line(row));
        }
        if !cli.quiet {
            eprintln!("{}", dim(&format!("{} item(s)", rows.len())));
        }
    }
    Ok(())
}

fn validate(cli: &Cli, args: &ManifestArgs) -> Result<i32> {
    let manifest = load_manifest(&args.csv, manifest_options(args)?)
        .with_context(|| format!("Invalid manifest {}", args.csv.display()))?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "records": manifest.records,
                "row_errors": manifest.row_errors,
            }))
            .context("Failed to serialise output")?
        );
    } else {
        for e in &manifest.row_errors {
            eprintln!("  {} {}", red("✗"), e);
        }
        eprintln!(
            "{} {} valid row(s), {} attachment(s), {} invalid row(s)",
            if manifest.is_clean() { green("✔") } else { yellow("⚠") },
            bold(&manifest.records.len().to_string()),
            manifest.attachment_count(),
            manifest.invalid_rows()
        );
    }
    Ok(if manifest.is_clean() { 0 } else { 1 })
}

async fn upload(cli: &Cli, args: &UploadArgs, show_progress: bool) -> Result<i32> {
    // ── Validate before any remote call ──────────────────────────────────
    let manifest = load_manifest(&args.manifest.csv, manifest_options(&args.manifest)?)
        .with_context(|| format!("Invalid manifest {}", args.manifest.csv.display()))?;
    for e in &manifest.row_errors {
        eprintln!("  {} {}", red("✗"), e);
    }
    let records = manifest
        .into_executable(args.proceed_with_valid)
        .context("Manifest validation failed")?;
    if records.is_empty() {
        anyhow::bail!("Manifest has no rows to upload");
    }
    let needs_pdf = records
        .iter()
        .flat_map(|r| &r.attachments)
        .any(|a| a.kind.format() == SourceFormat::Markdown);
    if needs_pdf {
        prepare_pdf_engine(cli)?;
    }

    let gw: Arc<dyn LmsGateway> = gateway(cli)?;

    // ── Assignment name for the feedback folder ──────────────────────────
    let assignment_name = match &args.assignment_name {
        Some(name) => Some(name.clone()),
        None => gw
            .list_assignments(args.course)
            .await
            .context("Failed to look up assignment")?
            .into_iter()
            .find(|a| a.id == args.assignment)
            .map(|a| a.name),
    };

    if !args.skip_roster_check {
        let unknown = check_roster(gw.as_ref(), args.course, &records)
            .await
            .context("Failed to fetch course roster")?;
        if !unknown.is_empty() {
            return Err(CanvasError::UnknownStudents {
                course_id: args.course,
                student_ids: unknown,
            })
            .context("Roster check failed (use --skip-roster-check to override)");
        }
    }

    // ── Cancellation on Ctrl-C ───────────────────────────────────────────
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!(
                    "{} Ctrl-C: finishing in-flight students, skipping the rest",
                    yellow("⚠")
                );
                cancel.cancel();
            }
        });
    }

    let mut builder = BatchConfig::builder()
        .concurrency(args.concurrency)
        .document_style(document_style(&args.style))
        .folder_root(args.folder_root.clone())
        .cancel_token(cancel);
    if show_progress {
        builder = builder.progress_callback(CliProgressCallback::new());
    }
    let config = builder.build().context("Invalid configuration")?;

    let mut target = BatchTarget::new(args.course, args.assignment);
    if let Some(name) = assignment_name {
        target = target.with_assignment_name(name);
    }

    let report = run_batch(gw, records, &target, &config).await;
    print_report(cli, &report)?;
    Ok(report.exit_code())
}

fn print_report(cli: &Cli, report: &BatchReport) -> Result<()> {
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(report).context("Failed to serialise report")?
        );
        return Ok(());
    }
    if cli.quiet {
        return Ok(());
    }

    for outcome in report.needs_follow_up() {
        eprintln!("  {}", outcome.summary());
    }
    let s = &report.stats;
    eprintln!(
        "{}  {} success  {} partial  {} failed  {} skipped  {}ms  →  {}",
        if report.is_complete_success() {
            green("✔")
        } else if s.failed > 0 {
            red("✘")
        } else {
            yellow("⚠")
        },
        bold(&s.success.to_string()),
        s.partial,
        s.failed,
        s.skipped,
        s.duration_ms,
        bold(&report.folder)
    );
    Ok(())
}
