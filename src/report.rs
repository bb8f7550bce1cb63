//! Outcome types produced by a batch run.
//!
//! One [`UploadOutcome`] per record, rolled up into a [`BatchReport`]. The
//! report is the terminal artifact of [`crate::batch::run_batch`]; it is
//! serialisable so the CLI can emit it as JSON.

use crate::error::AttachmentError;
use crate::gateway::types::{FileRef, SubmissionRef};
use crate::manifest::AttachmentKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Final status of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    /// Grade posted and every requested attachment uploaded.
    Success,
    /// Grade posted but at least one attachment failed.
    Partial,
    /// The grade submission itself failed.
    Failed,
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            UploadStatus::Success => "success",
            UploadStatus::Partial => "partial",
            UploadStatus::Failed => "failed",
        })
    }
}

/// What happened to one requested attachment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentOutcome {
    pub kind: AttachmentKind,
    pub source_path: PathBuf,
    /// Remote file, when the upload succeeded.
    pub file: Option<FileRef>,
    pub error: Option<AttachmentError>,
}

impl AttachmentOutcome {
    pub fn uploaded(kind: AttachmentKind, source_path: PathBuf, file: FileRef) -> Self {
        Self {
            kind,
            source_path,
            file: Some(file),
            error: None,
        }
    }

    pub fn failed(kind: AttachmentKind, source_path: PathBuf, error: AttachmentError) -> Self {
        Self {
            kind,
            source_path,
            file: None,
            error: Some(error),
        }
    }

    pub fn is_uploaded(&self) -> bool {
        self.file.is_some()
    }
}

/// Result for a single manifest record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadOutcome {
    pub student_id: String,
    /// Manifest line the record came from (0 when not known).
    pub line: u64,
    pub status: UploadStatus,
    /// Reference returned by the grade submission call.
    pub submission: Option<SubmissionRef>,
    pub attachments: Vec<AttachmentOutcome>,
    /// Why the record is not a full success.
    pub error_detail: Option<String>,
    pub elapsed_ms: u64,
}

impl UploadOutcome {
    /// Classify a record from its grade result and attachment outcomes.
    pub fn classify(
        student_id: impl Into<String>,
        line: u64,
        grade: Result<SubmissionRef, String>,
        attachments: Vec<AttachmentOutcome>,
        elapsed_ms: u64,
    ) -> Self {
        let failed_attachments: Vec<String> = attachments
            .iter()
            .filter_map(|a| {
                a.error
                    .as_ref()
                    .map(|e| format!("{}: {}", a.kind.column(), e))
            })
            .collect();

        let (status, submission, error_detail) = match grade {
            Err(detail) => (UploadStatus::Failed, None, Some(detail)),
            Ok(sub) if failed_attachments.is_empty() => (UploadStatus::Success, Some(sub), None),
            Ok(sub) => (
                UploadStatus::Partial,
                Some(sub),
                Some(failed_attachments.join("; ")),
            ),
        };

        Self {
            student_id: student_id.into(),
            line,
            status,
            submission,
            attachments,
            error_detail,
            elapsed_ms,
        }
    }

    pub fn uploaded_count(&self) -> usize {
        self.attachments.iter().filter(|a| a.is_uploaded()).count()
    }

    /// One human-readable line describing this record.
    pub fn summary(&self) -> String {
        let mut line = format!(
            "{:<8} student {}  ({}/{} attachments)",
            self.status,
            self.student_id,
            self.uploaded_count(),
            self.attachments.len()
        );
        if let Some(ref detail) = self.error_detail {
            line.push_str("  ");
            line.push_str(detail);
        }
        line
    }
}

/// Per-status counts for a batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    /// Records handed to the engine.
    pub total: usize,
    pub success: usize,
    pub partial: usize,
    pub failed: usize,
    /// Records never started because the run was cancelled.
    pub skipped: usize,
    pub duration_ms: u64,
}

/// Aggregated result of one [`crate::batch::run_batch`] call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Remote folder used for attachments (`Grade_Feedback/2025-03-14_Lab_1`).
    pub folder: String,
    /// Outcomes in manifest order. Skipped records have no entry.
    pub outcomes: Vec<UploadOutcome>,
    pub stats: BatchStats,
    pub cancelled: bool,
}

impl BatchReport {
    /// Build a report, computing the per-status counts.
    pub fn new(
        folder: String,
        outcomes: Vec<UploadOutcome>,
        total: usize,
        duration_ms: u64,
        cancelled: bool,
    ) -> Self {
        let count = |s: UploadStatus| outcomes.iter().filter(|o| o.status == s).count();
        let stats = BatchStats {
            total,
            success: count(UploadStatus::Success),
            partial: count(UploadStatus::Partial),
            failed: count(UploadStatus::Failed),
            skipped: total.saturating_sub(outcomes.len()),
            duration_ms,
        };
        Self {
            folder,
            outcomes,
            stats,
            cancelled,
        }
    }

    /// Records that need manual follow-up (partial or failed).
    pub fn needs_follow_up(&self) -> impl Iterator<Item = &UploadOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status != UploadStatus::Success)
    }

    pub fn is_complete_success(&self) -> bool {
        !self.cancelled && self.stats.success == self.stats.total
    }

    /// Process exit code: 0 all success, 1 any failed, 2 partial or cancelled.
    pub fn exit_code(&self) -> i32 {
        if self.stats.failed > 0 {
            1
        } else if self.stats.partial > 0 || self.cancelled {
            2
        } else {
            0
        }
    }
}
