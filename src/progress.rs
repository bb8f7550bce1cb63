//! Progress events for batch upload runs.
//!
//! The batch engine never prints. It reports through an
//! [`Arc<dyn UploadProgressCallback>`] injected via
//! [`crate::config::BatchConfigBuilder::progress_callback`]. Two ways to
//! consume events:
//!
//! * implement [`UploadProgressCallback`] directly (the CLI drives an
//!   `indicatif` bar this way), or
//! * call [`subscribe`] and read [`ProgressEvent`]s from a `Stream`.
//!
//! # Example
//!
//! ```rust
//! use canvas_lms_cli::{UploadOutcome, UploadProgressCallback};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct Counter(AtomicUsize);
//!
//! impl UploadProgressCallback for Counter {
//!     fn on_record_complete(&self, _index: usize, _total: usize, _outcome: &UploadOutcome) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//! ```

use crate::report::{BatchStats, UploadOutcome, UploadStatus};
use serde::Serialize;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::Stream;

/// Called by the batch engine as it processes records.
///
/// With `concurrency > 1`, record callbacks arrive from several tasks at
/// once and `on_record_complete` may fire out of manifest order.
/// All methods default to no-ops.
pub trait UploadProgressCallback: Send + Sync {
    /// Called once before any record is processed.
    fn on_batch_start(&self, total_records: usize) {
        let _ = total_records;
    }

    /// Called when a worker picks up a record (0-indexed manifest position).
    fn on_record_start(&self, index: usize, total: usize, student_id: &str) {
        let _ = (index, total, student_id);
    }

    /// Called once per finished record, whatever its status.
    fn on_record_complete(&self, index: usize, total: usize, outcome: &UploadOutcome) {
        let _ = (index, total, outcome);
    }

    /// Called once after the last record (or after cancellation).
    fn on_batch_complete(&self, stats: &BatchStats, cancelled: bool) {
        let _ = (stats, cancelled);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl UploadProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::BatchConfig`].
pub type ProgressCallback = Arc<dyn UploadProgressCallback>;

// ── Event stream ─────────────────────────────────────────────────────────

/// One progress event, as delivered by [`subscribe`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    BatchStarted {
        total: usize,
    },
    RecordCompleted {
        index: usize,
        total: usize,
        student_id: String,
        status: UploadStatus,
        elapsed_ms: u64,
        error: Option<String>,
    },
    BatchCompleted {
        stats: BatchStats,
        cancelled: bool,
    },
}

/// Boxed stream of progress events.
pub type ProgressStream = Pin<Box<dyn Stream<Item = ProgressEvent> + Send>>;

/// Forwards callbacks into an unbounded channel.
struct ChannelProgress {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelProgress {
    fn send(&self, event: ProgressEvent) {
        // Receiver gone means nobody is listening any more.
        let _ = self.tx.send(event);
    }
}

impl UploadProgressCallback for ChannelProgress {
    fn on_batch_start(&self, total_records: usize) {
        self.send(ProgressEvent::BatchStarted {
            total: total_records,
        });
    }

    fn on_record_complete(&self, index: usize, total: usize, outcome: &UploadOutcome) {
        self.send(ProgressEvent::RecordCompleted {
            index,
            total,
            student_id: outcome.student_id.clone(),
            status: outcome.status,
            elapsed_ms: outcome.elapsed_ms,
            error: outcome.error_detail.clone(),
        });
    }

    fn on_batch_complete(&self, stats: &BatchStats, cancelled: bool) {
        self.send(ProgressEvent::BatchCompleted {
            stats: stats.clone(),
            cancelled,
        });
    }
}

/// Create a callback/stream pair.
///
/// Pass the callback to [`crate::config::BatchConfigBuilder::progress_callback`];
/// the stream yields one event per record and ends once the callback (and
/// the config holding it) is dropped.
pub fn subscribe() -> (ProgressCallback, ProgressStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    let cb: ProgressCallback = Arc::new(ChannelProgress { tx });
    (cb, Box::pin(UnboundedReceiverStream::new(rx)))
}
