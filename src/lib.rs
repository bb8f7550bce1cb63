//! # canvas-lms-cli
//!
//! Bulk-upload grades and feedback files to a Canvas LMS course.
//!
//! ## Why this crate?
//!
//! Posting a grade through the web UI is one click; posting a grade *plus*
//! a rendered feedback PDF, an exam scan and a comment linking them, for
//! 200 students, is an afternoon. This crate takes a CSV manifest, renders
//! Markdown feedback to PDF locally, files the uploads into a dated folder
//! per assignment, and posts each grade with a comment linking its files.
//! It keeps going when one student's attachment is broken and tells you
//! exactly who needs a second look.
//!
//! ## Pipeline Overview
//!
//! ```text
//! CSV manifest
//!  │
//!  ├─ 1. Validate  columns, numeric grades, paths, eval md/pdf exclusivity
//!  ├─ 2. Convert   Markdown → styled PDF via PDFium (spawn_blocking)
//!  ├─ 3. Folder    Grade_Feedback/<date>_<assignment>, created once per run
//!  ├─ 4. Upload    staged upload, shared rate limiter, exponential backoff
//!  ├─ 5. Grade     posted_grade + HTML comment with view/download links
//!  └─ 6. Report    success / partial / failed per student
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use canvas_lms_cli::{
//!     load_manifest, run_batch, BatchConfig, BatchTarget, CanvasClient, ClientConfig,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ClientConfig::builder("https://canvas.example.edu", "token").build()?;
//!     let gateway = Arc::new(CanvasClient::from_config(&client)?);
//!
//!     let records = load_manifest("grades.csv", None)?.into_executable(false)?;
//!     let target = BatchTarget::new(1234, 5678).with_assignment_name("Lab 1");
//!     let report = run_batch(gateway, records, &target, &BatchConfig::default()).await;
//!
//!     for outcome in report.needs_follow_up() {
//!         eprintln!("{}", outcome.summary());
//!     }
//!     std::process::exit(report.exit_code());
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `canvas-cli` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! canvas-lms-cli = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod document;
pub mod error;
pub mod gateway;
pub mod manifest;
pub mod progress;
pub mod report;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{check_roster, run_batch, BatchTarget};
pub use config::{BatchConfig, BatchConfigBuilder, ClientConfig, ClientConfigBuilder};
pub use document::{
    convert_file, convert_to_file, ensure_engine, DocumentStyle, MarkdownConverter, Theme,
};
pub use error::{
    AttachmentError, CanvasError, ConversionError, ManifestError, RemoteError, RowError,
    RowErrorKind,
};
pub use gateway::{CanvasClient, FolderPath, LmsGateway, RateLimiter, RetryPolicy};
pub use manifest::{
    load_manifest, parse_manifest, AttachmentKind, Encoding, GradeRecord, Manifest,
    ManifestOptions,
};
pub use progress::{subscribe, NoopProgressCallback, ProgressEvent, UploadProgressCallback};
pub use report::{AttachmentOutcome, BatchReport, BatchStats, UploadOutcome, UploadStatus};

// tokio-util's token is part of the public BatchConfig API.
pub use tokio_util::sync::CancellationToken;
