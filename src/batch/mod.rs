//! Upload Batch Engine.
//!
//! ## Per record
//!
//! ```text
//! GradeRecord
//!  │
//!  ├─ 1. Resolve   read PDFs, convert Markdown (spawn_blocking)
//!  ├─ 2. Folder    ensure the run's feedback folder (once per run)
//!  ├─ 3. Upload    staged upload of every resolved attachment
//!  ├─ 4. Grade     posted_grade + HTML comment with file links, one call
//!  └─ 5. Classify  success / partial / failed
//! ```
//!
//! Records run on a bounded pool (`buffer_unordered`) and are sorted back
//! into manifest order for the report. Every remote call goes through the
//! one gateway handed to [`run_batch`], and therefore through its single
//! rate limiter.
//!
//! A failed attachment never stops the grade from being posted. A failed
//! grade never stops the batch.

pub mod attachment;
pub mod comment;
pub mod folder;

pub use attachment::{resolve, ResolvedAttachment};
pub use comment::compose_comment;
pub use folder::{clean_assignment_name, feedback_folder, FolderCache};

use crate::config::BatchConfig;
use crate::error::{AttachmentError, RemoteError};
use crate::gateway::{FileRef, FolderPath, LmsGateway, RemoteFolder};
use crate::manifest::GradeRecord;
use crate::report::{AttachmentOutcome, BatchReport, UploadOutcome, UploadStatus};
use chrono::{Local, NaiveDate};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// The assignment a batch grades.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchTarget {
    pub course_id: u64,
    pub assignment_id: u64,
    /// Used to name the feedback folder. Falls back to the id when absent.
    pub assignment_name: Option<String>,
    /// Date stamped on the feedback folder. Defaults to today (local time).
    pub run_date: Option<NaiveDate>,
}

impl BatchTarget {
    pub fn new(course_id: u64, assignment_id: u64) -> Self {
        Self {
            course_id,
            assignment_id,
            assignment_name: None,
            run_date: None,
        }
    }

    pub fn with_assignment_name(mut self, name: impl Into<String>) -> Self {
        self.assignment_name = Some(name.into());
        self
    }

    pub fn with_run_date(mut self, date: NaiveDate) -> Self {
        self.run_date = Some(date);
        self
    }

    /// Feedback folder for this run under `root`.
    pub fn folder_path(&self, root: &str) -> FolderPath {
        let date = self.run_date.unwrap_or_else(|| Local::now().date_naive());
        feedback_folder(
            root,
            self.assignment_name.as_deref(),
            self.assignment_id,
            date,
        )
    }
}

/// Shared, read-only state for one run.
struct RunContext<'a> {
    gateway: Arc<dyn LmsGateway>,
    target: &'a BatchTarget,
    config: &'a BatchConfig,
    folder_path: FolderPath,
    folders: FolderCache,
    total: usize,
}

/// Upload grades and feedback for every record.
///
/// Never fails as a whole: every problem ends up in the returned report.
/// Cancelling `config.cancel` lets in-flight records finish and skips the
/// rest.
pub async fn run_batch(
    gateway: Arc<dyn LmsGateway>,
    records: Vec<GradeRecord>,
    target: &BatchTarget,
    config: &BatchConfig,
) -> BatchReport {
    let started = Instant::now();
    let total = records.len();
    let folder_path = target.folder_path(&config.folder_root);
    let ctx = RunContext {
        folders: FolderCache::new(Arc::clone(&gateway), target.course_id),
        gateway,
        target,
        config,
        folder_path,
        total,
    };

    info!(
        "Uploading {} record(s) to course {} assignment {} (folder '{}', concurrency {})",
        total, target.course_id, target.assignment_id, ctx.folder_path, config.concurrency
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    let ctx_ref = &ctx;
    let mut done: Vec<(usize, UploadOutcome)> =
        stream::iter(records.into_iter().enumerate().map(|(index, record)| async move {
            if ctx_ref.config.cancel.is_cancelled() {
                debug!("Skipping student {} (cancelled)", record.student_id);
                return None;
            }
            if let Some(ref cb) = ctx_ref.config.progress_callback {
                cb.on_record_start(index, ctx_ref.total, &record.student_id);
            }
            let outcome = process_record(ctx_ref, &record).await;
            if let Some(ref cb) = ctx_ref.config.progress_callback {
                cb.on_record_complete(index, ctx_ref.total, &outcome);
            }
            Some((index, outcome))
        }))
        .buffer_unordered(config.concurrency.max(1))
        .filter_map(|o| async move { o })
        .collect()
        .await;

    done.sort_by_key(|(index, _)| *index);
    let outcomes: Vec<UploadOutcome> = done.into_iter().map(|(_, o)| o).collect();
    let cancelled = outcomes.len() < total;

    let report = BatchReport::new(
        ctx.folder_path.to_string(),
        outcomes,
        total,
        started.elapsed().as_millis() as u64,
        cancelled,
    );

    info!(
        "Batch finished in {}ms: {} success, {} partial, {} failed, {} skipped",
        report.stats.duration_ms,
        report.stats.success,
        report.stats.partial,
        report.stats.failed,
        report.stats.skipped
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(&report.stats, report.cancelled);
    }
    report
}

async fn process_record(ctx: &RunContext<'_>, record: &GradeRecord) -> UploadOutcome {
    let started = Instant::now();
    let attachments = if record.attachments.is_empty() {
        Vec::new()
    } else {
        upload_attachments(ctx, record).await
    };

    let uploaded: Vec<_> = attachments
        .iter()
        .filter_map(|a| a.file.as_ref().map(|f| (a.kind, f)))
        .collect();
    let comment = compose_comment(record.comment.as_deref(), &uploaded);

    let grade = ctx
        .gateway
        .grade_submission(
            ctx.target.course_id,
            ctx.target.assignment_id,
            &record.student_id,
            &record.posted_grade(),
            comment.as_deref(),
        )
        .await
        .map_err(|e| e.to_string());

    let outcome = UploadOutcome::classify(
        record.student_id.clone(),
        record.line,
        grade,
        attachments,
        started.elapsed().as_millis() as u64,
    );
    match outcome.status {
        UploadStatus::Success => debug!("{}", outcome.summary()),
        UploadStatus::Partial | UploadStatus::Failed => warn!("{}", outcome.summary()),
    }
    outcome
}

/// Resolve every attachment, then upload the ones that resolved.
///
/// Conversions for one record run concurrently; uploads go one by one so a
/// single record never holds more than one upload slot.
async fn upload_attachments(ctx: &RunContext<'_>, record: &GradeRecord) -> Vec<AttachmentOutcome> {
    let style = &ctx.config.document_style;
    let resolved =
        futures::future::join_all(record.attachments.iter().map(|a| resolve(a, style))).await;

    let folder: Option<Result<RemoteFolder, RemoteError>> = if resolved.iter().any(Result::is_ok) {
        Some(ctx.folders.ensure(&ctx.folder_path).await)
    } else {
        None
    };

    let mut outcomes = Vec::with_capacity(resolved.len());
    for (attachment, result) in record.attachments.iter().zip(resolved) {
        let kind = attachment.kind;
        let path = attachment.path.clone();
        let ready = match result {
            Ok(ready) => ready,
            Err(e) => {
                warn!("Student {}: {} skipped: {}", record.student_id, kind, e);
                outcomes.push(AttachmentOutcome::failed(kind, path, e));
                continue;
            }
        };
        let folder = match &folder {
            Some(Ok(folder)) => folder,
            Some(Err(e)) => {
                outcomes.push(AttachmentOutcome::failed(
                    kind,
                    path,
                    AttachmentError::Folder {
                        folder: ctx.folder_path.to_string(),
                        detail: e.to_string(),
                    },
                ));
                continue;
            }
            None => continue,
        };
        match upload(ctx, folder, ready).await {
            Ok(file) => {
                debug!(
                    "Student {}: uploaded {} as file {}",
                    record.student_id, kind, file.id
                );
                outcomes.push(AttachmentOutcome::uploaded(kind, path, file));
            }
            Err(e) => {
                warn!("Student {}: {} upload failed: {}", record.student_id, kind, e);
                outcomes.push(AttachmentOutcome::failed(
                    kind,
                    path,
                    AttachmentError::Upload(e.to_string()),
                ));
            }
        }
    }
    outcomes
}

async fn upload(
    ctx: &RunContext<'_>,
    folder: &RemoteFolder,
    ready: ResolvedAttachment,
) -> Result<FileRef, RemoteError> {
    ctx.gateway
        .upload_file(ctx.target.course_id, folder.id, ready.file)
        .await
}

/// Student ids in `records` that are not enrolled in the course.
pub async fn check_roster(
    gateway: &dyn LmsGateway,
    course_id: u64,
    records: &[GradeRecord],
) -> Result<Vec<String>, RemoteError> {
    let enrolled: HashSet<String> = gateway
        .list_students(course_id)
        .await?
        .into_iter()
        .map(|s| s.id.to_string())
        .collect();
    Ok(records
        .iter()
        .filter(|r| !enrolled.contains(&r.student_id))
        .map(|r| r.student_id.clone())
        .collect())
}
