//! Error types for the canvas-lms-cli library.
//!
//! Errors come in two tiers:
//!
//! * **Fatal**: [`CanvasError`] and [`ManifestError`]. The operation cannot
//!   proceed at all (manifest has no `grade` column, client misconfigured).
//!   Returned as `Err(..)` from the top-level entry points.
//!
//! * **Non-fatal**: [`RowError`], [`AttachmentError`] and [`ConversionError`].
//!   One manifest row or one feedback file is bad but everything else is fine.
//!   These are stored inside [`crate::manifest::Manifest`] and
//!   [`crate::report::BatchReport`] so a run can report exactly which
//!   students need manual follow-up.
//!
//! [`RemoteError`] sits between the two: the gateway returns it for every
//! failed call, and the batch engine folds it into the per-record outcome.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// All fatal errors returned by the canvas-lms-cli library.
#[derive(Debug, Error)]
pub enum CanvasError {
    // ── Manifest ──────────────────────────────────────────────────────────
    /// The manifest is structurally unusable.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// The manifest has invalid rows and the caller did not opt into
    /// uploading the valid subset.
    #[error(
        "{invalid} manifest row(s) failed validation; fix them or proceed with the {valid} valid row(s)"
    )]
    InvalidRows { invalid: usize, valid: usize },

    /// Some students in the manifest are not enrolled in the course.
    #[error("{} student(s) not enrolled in course {course_id}: {}", .student_ids.len(), .student_ids.join(", "))]
    UnknownStudents {
        course_id: u64,
        student_ids: Vec<String>,
    },

    // ── Remote ────────────────────────────────────────────────────────────
    /// A remote call failed and the caller cannot continue without it.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    // ── Documents ─────────────────────────────────────────────────────────
    /// Standalone Markdown conversion failed.
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// Could not write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config ────────────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A structural manifest problem. Detected before any remote call is made
/// and aborts the whole run.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Manifest file could not be read.
    #[error("Cannot read manifest '{path}': {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Manifest bytes are not valid in the configured encoding.
    #[error("Manifest is not valid {encoding}: {detail}")]
    Encoding { encoding: String, detail: String },

    /// The manifest has no header row.
    #[error("Manifest is empty: a header row with at least 'student_id' and 'grade' is required")]
    Empty,

    /// A required column is absent.
    #[error("Manifest is missing required column '{column}'")]
    MissingColumn { column: String },

    /// A header names a column this tool does not understand.
    #[error("Unknown column '{column}' in manifest header\nKnown columns: {known}")]
    UnknownColumn { column: String, known: String },

    /// The same column appears twice (possibly through an alias).
    #[error("Column '{column}' appears more than once in the manifest header")]
    DuplicateColumn { column: String },

    /// The CSV reader rejected the file.
    #[error("Malformed CSV at line {line}: {detail}")]
    Csv { line: u64, detail: String },
}

/// A non-fatal validation error for one manifest row.
///
/// The row is excluded from execution; the rest of the manifest continues.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("line {line}, column '{column}': {kind}")]
pub struct RowError {
    /// 1-indexed line in the CSV file (the header is line 1).
    pub line: u64,
    /// Student identifier, when the row had one.
    pub student_id: Option<String>,
    /// Offending column name.
    pub column: String,
    pub kind: RowErrorKind,
}

/// What went wrong with a manifest row.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum RowErrorKind {
    #[error("student id is empty")]
    MissingStudentId,

    #[error("student id '{0}' already appeared on line {1}")]
    DuplicateStudent(String, u64),

    #[error("grade '{0}' is not a number")]
    InvalidGrade(String),

    #[error("file '{}' does not exist", .0.display())]
    FileNotFound(PathBuf),

    #[error("file '{}' is not a {expected} file", .path.display())]
    WrongExtension { path: PathBuf, expected: String },

    #[error("both md_eval_file and pdf_eval_file are set; the feedback format is ambiguous")]
    AmbiguousEvalFormat,
}

/// Markdown → PDF conversion failed for one document.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum ConversionError {
    /// Source could not be read or is not UTF-8.
    #[error("Cannot read '{path}': {detail}")]
    Read { path: PathBuf, detail: String },

    /// A `$…$` expression is malformed.
    #[error("Invalid math expression `{expr}`: {detail}")]
    Math { expr: String, detail: String },

    /// The PDFium library could not be located, downloaded or loaded.
    #[error("PDF engine unavailable: {0}")]
    Engine(String),

    /// PDFium rejected a drawing or save operation.
    #[error("PDF rendering failed: {0}")]
    Render(String),

    /// The conversion task panicked or was cancelled.
    #[error("Conversion task failed: {0}")]
    Task(String),
}

/// A non-fatal error for a single feedback attachment.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum AttachmentError {
    /// Source file could not be read or is not a PDF.
    #[error("cannot read '{}': {detail}", .path.display())]
    Read { path: PathBuf, detail: String },

    /// Markdown → PDF conversion failed.
    #[error("conversion failed: {0}")]
    Conversion(ConversionError),

    /// Destination folder could not be created.
    #[error("folder '{folder}' unavailable: {detail}")]
    Folder { folder: String, detail: String },

    /// Upload failed after retries.
    #[error("upload failed: {0}")]
    Upload(String),
}

/// A failed remote call, classified for the retry policy.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RemoteError {
    /// Connection refused, reset, DNS failure …
    #[error("{operation}: transport error: {detail}")]
    Transport { operation: String, detail: String },

    /// The call exceeded the configured per-request timeout.
    #[error("{operation}: timed out after {}s", .after.as_secs())]
    Timeout { operation: String, after: Duration },

    /// HTTP 5xx.
    #[error("{operation}: server error {status}: {detail}")]
    Server {
        operation: String,
        status: u16,
        detail: String,
    },

    /// HTTP 429: the whole process should back off.
    #[error("{operation}: rate limited")]
    RateLimited {
        operation: String,
        retry_after: Option<Duration>,
    },

    /// HTTP 4xx other than 429. Retrying cannot change the outcome.
    #[error("{operation}: request rejected with {status}: {detail}")]
    Client {
        operation: String,
        status: u16,
        detail: String,
    },

    /// The response body did not match the expected shape.
    #[error("{operation}: unexpected response: {detail}")]
    Decode { operation: String, detail: String },

    /// A local precondition failed before anything was sent.
    #[error("{operation}: {detail}")]
    Rejected { operation: String, detail: String },

    /// Every attempt failed with a retryable error.
    #[error("{operation}: gave up after {attempts} attempts; last error: {last}")]
    Exhausted {
        operation: String,
        attempts: u32,
        last: String,
    },
}

impl RemoteError {
    /// `true` for transport errors, timeouts, 5xx and 429.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RemoteError::Transport { .. }
                | RemoteError::Timeout { .. }
                | RemoteError::Server { .. }
                | RemoteError::RateLimited { .. }
        )
    }

    /// HTTP status associated with the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteError::Server { status, .. } | RemoteError::Client { status, .. } => {
                Some(*status)
            }
            RemoteError::RateLimited { .. } => Some(429),
            _ => None,
        }
    }

    /// Server-requested delay before the next call, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            RemoteError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        let server = RemoteError::Server {
            operation: "upload".into(),
            status: 503,
            detail: "busy".into(),
        };
        let client = RemoteError::Client {
            operation: "grade".into(),
            status: 404,
            detail: "not found".into(),
        };
        let timeout = RemoteError::Timeout {
            operation: "grade".into(),
            after: Duration::from_secs(30),
        };
        assert!(server.is_retryable());
        assert!(timeout.is_retryable());
        assert!(!client.is_retryable());
        assert_eq!(client.status(), Some(404));
    }

    #[test]
    fn rate_limit_carries_delay() {
        let e = RemoteError::RateLimited {
            operation: "list".into(),
            retry_after: Some(Duration::from_secs(7)),
        };
        assert!(e.is_retryable());
        assert_eq!(e.status(), Some(429));
        assert_eq!(e.retry_after(), Some(Duration::from_secs(7)));
    }

    #[test]
    fn row_error_display_names_line_and_column() {
        let e = RowError {
            line: 4,
            student_id: Some("12345".into()),
            column: "grade".into(),
            kind: RowErrorKind::InvalidGrade("N/A".into()),
        };
        let msg = e.to_string();
        assert!(msg.contains("line 4"), "got: {msg}");
        assert!(msg.contains("grade"), "got: {msg}");
        assert!(msg.contains("N/A"), "got: {msg}");
    }

    #[test]
    fn unknown_students_display() {
        let e = CanvasError::UnknownStudents {
            course_id: 77,
            student_ids: vec!["1".into(), "2".into()],
        };
        let msg = e.to_string();
        assert!(msg.starts_with("2 student(s)"), "got: {msg}");
        assert!(msg.contains("1, 2"));
    }
}
