//! Batch engine behaviour against an in-memory gateway.

use async_trait::async_trait;
use canvas_lms_cli::gateway::{
    Assignment, Course, FileRef, Folder, FolderPath, RemoteFolder, Student, SubmissionRef,
    UploadFile,
};
use canvas_lms_cli::{
    check_roster, load_manifest, run_batch, subscribe, AttachmentError, AttachmentKind,
    BatchConfig, BatchTarget, CancellationToken, GradeRecord, LmsGateway, ProgressEvent,
    RemoteError, UploadOutcome, UploadProgressCallback, UploadStatus,
};
use chrono::NaiveDate;
use futures::StreamExt;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

// ── Stub gateway ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct GradeCall {
    student_id: String,
    posted_grade: String,
    comment: Option<String>,
}

#[derive(Default)]
struct StubGateway {
    ensure_calls: Mutex<Vec<FolderPath>>,
    uploads: Mutex<Vec<(u64, String)>>,
    grades: Mutex<Vec<GradeCall>>,
    fail_grades: HashSet<String>,
    fail_uploads: HashSet<String>,
    folder_unavailable: bool,
    /// Per-student delay before the grade call returns.
    grade_delay_ms: Vec<(String, u64)>,
    enrolled: Vec<u64>,
    next_file: AtomicU64,
}

impl StubGateway {
    fn ensure_count(&self) -> usize {
        self.ensure_calls.lock().unwrap().len()
    }

    fn upload_names(&self) -> Vec<String> {
        self.uploads.lock().unwrap().iter().map(|(_, n)| n.clone()).collect()
    }

    fn grade_calls(&self) -> Vec<GradeCall> {
        self.grades.lock().unwrap().clone()
    }
}

fn server_error(operation: &str) -> RemoteError {
    RemoteError::Exhausted {
        operation: operation.into(),
        attempts: 4,
        last: "503 Service Unavailable".into(),
    }
}

#[async_trait]
impl LmsGateway for StubGateway {
    async fn ensure_folder(&self, _course_id: u64, path: &FolderPath) -> Result<RemoteFolder, RemoteError> {
        // Long enough for concurrent records to overlap.
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.ensure_calls.lock().unwrap().push(path.clone());
        if self.folder_unavailable {
            return Err(RemoteError::Client {
                operation: "create folder".into(),
                status: 403,
                detail: "forbidden".into(),
            });
        }
        Ok(RemoteFolder {
            id: 42,
            path: path.clone(),
        })
    }

    async fn upload_file(&self, course_id: u64, folder_id: u64, file: UploadFile) -> Result<FileRef, RemoteError> {
        assert_eq!(folder_id, 42);
        assert!(file.bytes.starts_with(b"%PDF"));
        if self.fail_uploads.contains(&file.filename) {
            return Err(server_error("upload file"));
        }
        let id = 1000 + self.next_file.fetch_add(1, Ordering::SeqCst);
        self.uploads.lock().unwrap().push((folder_id, file.filename.clone()));
        let url = format!("https://canvas.test/courses/{course_id}/files/{id}");
        Ok(FileRef {
            id,
            display_name: file.filename,
            download_url: format!("{url}/download"),
            url,
            public_url: None,
        })
    }

    async fn grade_submission(
        &self,
        _course_id: u64,
        _assignment_id: u64,
        student_id: &str,
        posted_grade: &str,
        comment_html: Option<&str>,
    ) -> Result<SubmissionRef, RemoteError> {
        if let Some((_, ms)) = self.grade_delay_ms.iter().find(|(s, _)| s == student_id) {
            tokio::time::sleep(Duration::from_millis(*ms)).await;
        }
        if self.fail_grades.contains(student_id) {
            return Err(server_error("grade submission"));
        }
        self.grades.lock().unwrap().push(GradeCall {
            student_id: student_id.to_string(),
            posted_grade: posted_grade.to_string(),
            comment: comment_html.map(str::to_string),
        });
        Ok(SubmissionRef {
            id: Some(1),
            user_id: student_id.parse().ok(),
            grade: Some(posted_grade.to_string()),
            workflow_state: Some("graded".into()),
        })
    }

    async fn list_courses(&self) -> Result<Vec<Course>, RemoteError> {
        Ok(Vec::new())
    }

    async fn list_assignments(&self, _course_id: u64) -> Result<Vec<Assignment>, RemoteError> {
        Ok(Vec::new())
    }

    async fn list_students(&self, _course_id: u64) -> Result<Vec<Student>, RemoteError> {
        Ok(self
            .enrolled
            .iter()
            .map(|&id| Student {
                id,
                name: format!("Student {id}"),
                sortable_name: None,
                login_id: None,
                email: None,
            })
            .collect())
    }

    async fn list_folders(&self, _course_id: u64) -> Result<Vec<Folder>, RemoteError> {
        Ok(Vec::new())
    }

    async fn list_submissions(&self, _course_id: u64, _assignment_id: u64) -> Result<Vec<SubmissionRef>, RemoteError> {
        Ok(Vec::new())
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────────

struct Fixtures {
    _dir: TempDir,
    root: PathBuf,
}

impl Fixtures {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_path_buf();
        std::fs::write(
            root.join("eval_12345.md"),
            "# Feedback\n\nGood derivation of $E = mc^2$.\n\n| Part | Score |\n|---|---|\n| A | 10 |\n",
        )
        .unwrap();
        std::fs::write(root.join("broken.md"), "Answer: $\\frac{1}$\n").unwrap();
        std::fs::write(root.join("scan.pdf"), b"%PDF-1.4\n% exam scan\n").unwrap();
        Self { _dir: dir, root }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Markdown feedback needs PDFium; skip the test when it cannot be loaded.
macro_rules! require_pdf_engine {
    () => {
        if let Err(e) = canvas_lms_cli::ensure_engine() {
            println!("SKIP: {e}");
            return;
        }
    };
}

fn target() -> BatchTarget {
    BatchTarget::new(7, 55)
        .with_assignment_name("Lab 1")
        .with_run_date(NaiveDate::from_ymd_opt(2025, 3, 14).unwrap())
}

fn config() -> BatchConfig {
    BatchConfig::builder().concurrency(4).build().unwrap()
}

async fn run(gateway: &Arc<StubGateway>, records: Vec<GradeRecord>, config: &BatchConfig) -> canvas_lms_cli::BatchReport {
    let gw: Arc<dyn LmsGateway> = gateway.clone();
    run_batch(gw, records, &target(), config).await
}

// ── Properties ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn records_without_attachments_never_touch_files() {
    let gateway = Arc::new(StubGateway {
        fail_grades: ["2".to_string()].into(),
        ..Default::default()
    });
    let records = vec![GradeRecord::new("1", 90.0), GradeRecord::new("2", 75.5)];
    let report = run(&gateway, records, &config()).await;

    assert_eq!(report.outcomes[0].status, UploadStatus::Success);
    assert_eq!(report.outcomes[1].status, UploadStatus::Failed);
    assert!(report.outcomes[1].error_detail.as_deref().unwrap().contains("grade submission"));
    assert_eq!(gateway.ensure_count(), 0);
    assert!(gateway.upload_names().is_empty());
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test]
async fn markdown_feedback_scenario() {
    init_tracing();
    require_pdf_engine!();
    let fx = Fixtures::new();
    let gateway = Arc::new(StubGateway::default());
    let record = GradeRecord::new("12345", 85.0)
        .with_comment("Good work!")
        .with_attachment(AttachmentKind::MarkdownEval, fx.path("eval_12345.md"));

    let report = run(&gateway, vec![record], &config()).await;

    assert_eq!(report.stats.success, 1);
    assert_eq!(report.folder, "Grade_Feedback/2025-03-14_Lab_1");
    assert_eq!(gateway.ensure_count(), 1);
    assert_eq!(gateway.upload_names(), ["eval_12345.pdf"]);

    let grades = gateway.grade_calls();
    assert_eq!(grades.len(), 1);
    assert_eq!(grades[0].student_id, "12345");
    assert_eq!(grades[0].posted_grade, "85");
    let comment = grades[0].comment.as_deref().unwrap();
    assert!(comment.starts_with("Good work!<br>"));
    assert!(comment.contains("Detailed feedback"));
    assert!(comment.contains(r#"href="https://canvas.test/courses/7/files/1000""#));
    assert!(comment.contains("/files/1000/download"));
    assert_eq!(report.exit_code(), 0);
}

#[tokio::test]
async fn one_failed_conversion_makes_the_record_partial() {
    init_tracing();
    let fx = Fixtures::new();
    let gateway = Arc::new(StubGateway::default());
    let record = GradeRecord::new("12345", 70.0)
        .with_attachment(AttachmentKind::PdfExam1, fx.path("scan.pdf"))
        .with_attachment(AttachmentKind::MarkdownEval, fx.path("broken.md"));

    let report = run(&gateway, vec![record], &config()).await;
    let outcome = &report.outcomes[0];

    assert_eq!(outcome.status, UploadStatus::Partial);
    assert_eq!(gateway.upload_names(), ["scan.pdf"]);
    let failed: Vec<_> = outcome.attachments.iter().filter(|a| !a.is_uploaded()).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].kind, AttachmentKind::MarkdownEval);
    assert!(matches!(failed[0].error, Some(AttachmentError::Conversion(_))));

    let comment = gateway.grade_calls()[0].comment.clone().unwrap();
    assert!(comment.contains("Exam submission (Format 1)"));
    assert!(!comment.contains("Detailed feedback"));
    assert_eq!(report.exit_code(), 2);
}

#[tokio::test]
async fn upload_failure_keeps_the_grade() {
    require_pdf_engine!();
    let fx = Fixtures::new();
    let gateway = Arc::new(StubGateway {
        fail_uploads: ["eval_12345.pdf".to_string()].into(),
        ..Default::default()
    });
    let record = GradeRecord::new("12345", 88.0)
        .with_comment("See attached")
        .with_attachment(AttachmentKind::MarkdownEval, fx.path("eval_12345.md"));

    let report = run(&gateway, vec![record], &config()).await;
    let outcome = &report.outcomes[0];
    assert_eq!(outcome.status, UploadStatus::Partial);
    assert!(matches!(outcome.attachments[0].error, Some(AttachmentError::Upload(_))));
    assert_eq!(gateway.grade_calls()[0].comment.as_deref(), Some("See attached"));
}

#[tokio::test]
async fn unavailable_folder_fails_attachments_not_grades() {
    let fx = Fixtures::new();
    let gateway = Arc::new(StubGateway {
        folder_unavailable: true,
        ..Default::default()
    });
    let record =
        GradeRecord::new("12345", 60.0).with_attachment(AttachmentKind::PdfEval, fx.path("scan.pdf"));

    let report = run(&gateway, vec![record], &config()).await;
    let outcome = &report.outcomes[0];
    assert_eq!(outcome.status, UploadStatus::Partial);
    match &outcome.attachments[0].error {
        Some(AttachmentError::Folder { folder, .. }) => {
            assert_eq!(folder, "Grade_Feedback/2025-03-14_Lab_1")
        }
        other => panic!("expected folder error, got {other:?}"),
    }
    assert!(gateway.upload_names().is_empty());
    assert_eq!(gateway.grade_calls().len(), 1);
}

#[tokio::test]
async fn folder_is_ensured_once_per_run() {
    let fx = Fixtures::new();
    let gateway = Arc::new(StubGateway::default());
    let records: Vec<GradeRecord> = (0..8)
        .map(|i| {
            GradeRecord::new(format!("{}", 100 + i), 80.0)
                .with_attachment(AttachmentKind::PdfExam1, fx.path("scan.pdf"))
        })
        .collect();

    let report = run(&gateway, records, &config()).await;
    assert_eq!(report.stats.success, 8);
    assert_eq!(gateway.ensure_count(), 1);
    assert_eq!(gateway.upload_names().len(), 8);
}

#[tokio::test]
async fn rerunning_a_successful_manifest_succeeds_again() {
    require_pdf_engine!();
    let fx = Fixtures::new();
    let gateway = Arc::new(StubGateway::default());
    let records = vec![
        GradeRecord::new("1", 90.0).with_attachment(AttachmentKind::MarkdownEval, fx.path("eval_12345.md")),
        GradeRecord::new("2", 80.0).with_attachment(AttachmentKind::PdfExam2, fx.path("scan.pdf")),
    ];

    let first = run(&gateway, records.clone(), &config()).await;
    let second = run(&gateway, records, &config()).await;
    assert!(first.is_complete_success());
    assert!(second.is_complete_success());
    assert_eq!(first.folder, second.folder);
}

#[tokio::test]
async fn report_keeps_manifest_order_under_concurrency() {
    let gateway = Arc::new(StubGateway {
        grade_delay_ms: vec![("a".into(), 60), ("b".into(), 30), ("c".into(), 0)],
        ..Default::default()
    });
    let records = vec![
        GradeRecord::new("a", 1.0),
        GradeRecord::new("b", 2.0),
        GradeRecord::new("c", 3.0),
    ];
    let report = run(&gateway, records, &config()).await;
    let ids: Vec<&str> = report.outcomes.iter().map(|o| o.student_id.as_str()).collect();
    assert_eq!(ids, ["a", "b", "c"]);

    // Completion order differs from manifest order.
    let completed: Vec<String> = gateway.grade_calls().into_iter().map(|g| g.student_id).collect();
    assert_eq!(completed, ["c", "b", "a"]);
}

// ── Cancellation ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn cancelled_before_start_skips_everything() {
    let gateway = Arc::new(StubGateway::default());
    let token = CancellationToken::new();
    token.cancel();
    let config = BatchConfig::builder().cancel_token(token).build().unwrap();

    let report = run(&gateway, vec![GradeRecord::new("1", 1.0), GradeRecord::new("2", 2.0)], &config).await;
    assert!(report.cancelled);
    assert!(report.outcomes.is_empty());
    assert_eq!(report.stats.skipped, 2);
    assert!(gateway.grade_calls().is_empty());
    assert_eq!(report.exit_code(), 2);
}

struct CancelAfterFirst(CancellationToken);

impl UploadProgressCallback for CancelAfterFirst {
    fn on_record_complete(&self, _index: usize, _total: usize, _outcome: &UploadOutcome) {
        self.0.cancel();
    }
}

#[tokio::test]
async fn cancelling_mid_run_finishes_the_current_record() {
    let gateway = Arc::new(StubGateway::default());
    let token = CancellationToken::new();
    let config = BatchConfig::builder()
        .concurrency(1)
        .cancel_token(token.clone())
        .progress_callback(Arc::new(CancelAfterFirst(token)))
        .build()
        .unwrap();

    let records = (1..=5).map(|i| GradeRecord::new(i.to_string(), 50.0)).collect();
    let report = run(&gateway, records, &config).await;

    assert!(report.cancelled);
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].status, UploadStatus::Success);
    assert_eq!(report.stats.skipped, 4);
    assert_eq!(gateway.grade_calls().len(), 1);
}

// ── Progress ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn progress_stream_reports_each_record() {
    let gateway = Arc::new(StubGateway {
        fail_grades: ["2".to_string()].into(),
        ..Default::default()
    });
    let (cb, events) = subscribe();
    let config = BatchConfig::builder().progress_callback(cb).build().unwrap();

    let report = run(&gateway, vec![GradeRecord::new("1", 1.0), GradeRecord::new("2", 2.0)], &config).await;
    drop(config);

    let events: Vec<ProgressEvent> = events.collect().await;
    assert_eq!(events.len(), 4);
    assert!(matches!(events[0], ProgressEvent::BatchStarted { total: 2 }));
    let failed = events.iter().any(|e| {
        matches!(e, ProgressEvent::RecordCompleted { student_id, status: UploadStatus::Failed, .. } if student_id == "2")
    });
    assert!(failed);
    match &events[3] {
        ProgressEvent::BatchCompleted { stats, cancelled } => {
            assert_eq!(stats, &report.stats);
            assert!(!cancelled);
        }
        other => panic!("unexpected {other:?}"),
    }
}

// ── Roster and manifest integration ──────────────────────────────────────────

#[tokio::test]
async fn roster_check_lists_unenrolled_students() {
    let gateway = StubGateway {
        enrolled: vec![1, 2],
        ..Default::default()
    };
    let records = vec![
        GradeRecord::new("1", 1.0),
        GradeRecord::new("3", 1.0),
        GradeRecord::new("2", 1.0),
        GradeRecord::new("9", 1.0),
    ];
    let unknown = check_roster(&gateway, 7, &records).await.unwrap();
    assert_eq!(unknown, ["3", "9"]);
}

fn write_manifest(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("grades.csv");
    std::fs::write(&path, body).unwrap();
    path
}

#[tokio::test]
async fn invalid_rows_never_reach_the_gateway() {
    require_pdf_engine!();
    let fx = Fixtures::new();
    let csv = write_manifest(
        &fx.root,
        "student_id,grade,comment,md_eval_file\n\
         12345,85,Good work!,eval_12345.md\n\
         23456,N/A,,\n\
         34567,92,,\n",
    );
    let manifest = load_manifest(&csv, None).unwrap();
    assert_eq!(manifest.invalid_rows(), 1);
    assert!(manifest.clone().into_executable(false).is_err());

    let gateway = Arc::new(StubGateway::default());
    let records = manifest.into_executable(true).unwrap();
    let report = run(&gateway, records, &config()).await;

    assert_eq!(report.stats.total, 2);
    assert_eq!(report.stats.success, 2);
    let graded: Vec<String> = gateway.grade_calls().into_iter().map(|g| g.student_id).collect();
    assert!(!graded.contains(&"23456".to_string()));
    assert_eq!(gateway.upload_names(), ["eval_12345.pdf"]);
}
