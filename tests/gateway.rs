//! HTTP-level tests for `CanvasClient` against a local axum server that
//! mimics the Canvas endpoints the tool uses.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use canvas_lms_cli::gateway::{FolderPath, UploadFile};
use canvas_lms_cli::{CanvasClient, ClientConfig, LmsGateway, RemoteError};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

// ── Mock Canvas ──────────────────────────────────────────────────────────────

const TOKEN: &str = "secret-token";
const ROOT_FOLDER: u64 = 1;

#[derive(Default)]
struct Mock {
    base: OnceLock<String>,
    assignment_calls: AtomicUsize,
    student_calls: AtomicUsize,
    preflight_calls: AtomicUsize,
    body_posts: AtomicUsize,
    /// Fail the first file-body POST with a 500.
    fail_first_body_post: AtomicBool,
    body_post_had_auth: AtomicBool,
    upload_body: Mutex<Vec<u8>>,
    /// (parent, id, name)
    folders: Mutex<Vec<(u64, u64, String)>>,
    folder_creates: AtomicUsize,
    /// Answer folder creation with 409 after creating it anyway.
    conflict_on_create: AtomicBool,
    grades: Mutex<Vec<(String, Value)>>,
}

/// Course ids whose roster answers slower than the client timeout.
const SLOW_ONCE_COURSE: u64 = 408;
const ALWAYS_SLOW_COURSE: u64 = 504;
const SLOW_REPLY: Duration = Duration::from_millis(1500);

type Shared = Arc<Mock>;

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {TOKEN}"))
        .unwrap_or(false)
}

fn folder_json(id: u64, name: &str, parent: u64) -> Value {
    json!({ "id": id, "name": name, "full_name": format!("course files/{name}"), "parent_folder_id": parent })
}

async fn courses(
    State(mock): State<Shared>,
    headers: HeaderMap,
    Query(q): Query<HashMap<String, String>>,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let base = mock.base.get().cloned().unwrap_or_default();
    match q.get("page").map(String::as_str) {
        None | Some("1") => (
            [(
                header::LINK,
                format!("<{base}/api/v1/courses?page=2&per_page=100>; rel=\"next\", <{base}/api/v1/courses?page=2>; rel=\"last\""),
            )],
            Json(json!([{ "id": 10, "name": "Physics", "course_code": "PHY101" }])),
        )
            .into_response(),
        _ => Json(json!([{ "id": 11, "name": "Chemistry" }])).into_response(),
    }
}

async fn assignments(State(mock): State<Shared>) -> Response {
    let n = mock.assignment_calls.fetch_add(1, Ordering::SeqCst);
    if n < 2 {
        return (StatusCode::SERVICE_UNAVAILABLE, "try later").into_response();
    }
    Json(json!([{ "id": 55, "name": "Lab 1", "points_possible": 100.0 }])).into_response()
}

async fn students(State(mock): State<Shared>, Path(course): Path<u64>) -> Response {
    let n = mock.student_calls.fetch_add(1, Ordering::SeqCst);
    if course == ALWAYS_SLOW_COURSE || (course == SLOW_ONCE_COURSE && n == 0) {
        tokio::time::sleep(SLOW_REPLY).await;
    }
    if course == 404 {
        return (StatusCode::NOT_FOUND, r#"{"errors":[{"message":"not found"}]}"#).into_response();
    }
    if course == 429 && n == 0 {
        return (StatusCode::TOO_MANY_REQUESTS, [(header::RETRY_AFTER, "0")], "slow down")
            .into_response();
    }
    Json(json!([{ "id": 12345, "name": "Ada Lovelace" }])).into_response()
}

async fn root_folder() -> Json<Value> {
    Json(json!({ "id": ROOT_FOLDER, "name": "course files" }))
}

async fn by_path(State(mock): State<Shared>, Path((_course, path)): Path<(u64, String)>) -> Response {
    let folders = mock.folders.lock().unwrap();
    let mut chain = vec![json!({ "id": ROOT_FOLDER, "name": "course files" })];
    let mut parent = ROOT_FOLDER;
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        match folders.iter().find(|(p, _, n)| *p == parent && n == segment) {
            Some((p, id, n)) => {
                chain.push(folder_json(*id, n, *p));
                parent = *id;
            }
            None => return StatusCode::NOT_FOUND.into_response(),
        }
    }
    Json(Value::Array(chain)).into_response()
}

async fn list_children(State(mock): State<Shared>, Path(parent): Path<u64>) -> Json<Value> {
    let folders = mock.folders.lock().unwrap();
    Json(Value::Array(
        folders
            .iter()
            .filter(|(p, _, _)| *p == parent)
            .map(|(p, id, n)| folder_json(*id, n, *p))
            .collect(),
    ))
}

async fn create_child(
    State(mock): State<Shared>,
    Path(parent): Path<u64>,
    Json(body): Json<Value>,
) -> Response {
    mock.folder_creates.fetch_add(1, Ordering::SeqCst);
    let name = body["name"].as_str().unwrap_or_default().to_string();
    let mut folders = mock.folders.lock().unwrap();
    let id = 100 + folders.len() as u64;
    folders.push((parent, id, name.clone()));
    if mock.conflict_on_create.load(Ordering::SeqCst) {
        return (
            StatusCode::CONFLICT,
            r#"{"errors":[{"message":"folder already exists"}]}"#,
        )
            .into_response();
    }
    Json(folder_json(id, &name, parent)).into_response()
}

async fn preflight(State(mock): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    mock.preflight_calls.fetch_add(1, Ordering::SeqCst);
    assert_eq!(body["on_duplicate"], "rename");
    assert_eq!(body["content_type"], "application/pdf");
    let base = mock.base.get().cloned().unwrap_or_default();
    Json(json!({
        "upload_url": format!("{base}/upload-host/bucket"),
        "upload_params": { "key": "uploads/abc123", "Filename": body["name"] }
    }))
    .into_response()
}

async fn body_post(State(mock): State<Shared>, headers: HeaderMap, body: Bytes) -> Response {
    let n = mock.body_posts.fetch_add(1, Ordering::SeqCst);
    if headers.contains_key(header::AUTHORIZATION) {
        mock.body_post_had_auth.store(true, Ordering::SeqCst);
    }
    if n == 0 && mock.fail_first_body_post.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "storage hiccup").into_response();
    }
    *mock.upload_body.lock().unwrap() = body.to_vec();
    (StatusCode::SEE_OTHER, [(header::LOCATION, "/api/v1/files/99/create_success")]).into_response()
}

async fn confirm(headers: HeaderMap, Path(id): Path<u64>) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!({
        "id": id,
        "display_name": "eval_12345.pdf",
        "url": "https://files.canvas.test/signed/99"
    }))
    .into_response()
}

async fn grade(
    State(mock): State<Shared>,
    Path((_course, _assignment, student)): Path<(u64, u64, String)>,
    Json(body): Json<Value>,
) -> Response {
    if student == "00000" {
        return (StatusCode::NOT_FOUND, "user not found").into_response();
    }
    mock.grades.lock().unwrap().push((student.clone(), body.clone()));
    Json(json!({
        "id": 5,
        "user_id": student.parse::<u64>().unwrap_or(0),
        "grade": body["submission"]["posted_grade"],
        "workflow_state": "graded"
    }))
    .into_response()
}

async fn spawn_canvas(mock: Shared) -> String {
    let app = Router::new()
        .route("/api/v1/courses", get(courses))
        .route("/api/v1/courses/{course}/assignments", get(assignments))
        .route("/api/v1/courses/{course}/users", get(students))
        .route("/api/v1/courses/{course}/folders/root", get(root_folder))
        .route("/api/v1/courses/{course}/folders/by_path/{*path}", get(by_path))
        .route("/api/v1/folders/{parent}/folders", get(list_children).post(create_child))
        .route("/api/v1/courses/{course}/files", post(preflight))
        .route("/upload-host/bucket", post(body_post))
        .route("/api/v1/files/{id}/create_success", get(confirm))
        .route(
            "/api/v1/courses/{course}/assignments/{assignment}/submissions/{student}",
            put(grade),
        )
        .with_state(Arc::clone(&mock));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    let base = format!("http://{addr}");
    mock.base.set(base.clone()).unwrap();
    base
}

async fn setup() -> (Shared, CanvasClient) {
    setup_with(3, 5).await
}

async fn setup_with(max_retries: u32, timeout_secs: u64) -> (Shared, CanvasClient) {
    let mock: Shared = Arc::new(Mock::default());
    let base = spawn_canvas(Arc::clone(&mock)).await;
    let config = ClientConfig::builder(base, TOKEN)
        .min_request_interval_ms(0)
        .max_retries(max_retries)
        .retry_backoff_ms(1)
        .max_backoff_ms(5)
        .request_timeout_secs(timeout_secs)
        .build()
        .unwrap();
    (mock, CanvasClient::from_config(&config).unwrap())
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn list_follows_link_pagination() {
    let (_mock, client) = setup().await;
    let courses = client.list_courses().await.unwrap();
    let ids: Vec<u64> = courses.iter().map(|c| c.id).collect();
    assert_eq!(ids, [10, 11]);
    assert_eq!(courses[0].course_code.as_deref(), Some("PHY101"));
}

#[tokio::test]
async fn server_errors_are_retried_until_success() {
    let (mock, client) = setup().await;
    let items = client.list_assignments(7).await.unwrap();
    assert_eq!(items[0].name, "Lab 1");
    assert_eq!(mock.assignment_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let (mock, client) = setup().await;
    let err = client.list_students(404).await.unwrap_err();
    assert!(matches!(err, RemoteError::Client { status: 404, .. }), "got {err:?}");
    assert_eq!(mock.student_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn rate_limit_response_is_retried() {
    let (mock, client) = setup().await;
    let students = client.list_students(429).await.unwrap();
    assert_eq!(students[0].id, 12345);
    assert_eq!(mock.student_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn timed_out_request_is_retried() {
    let (mock, client) = setup_with(3, 1).await;
    let students = client.list_students(SLOW_ONCE_COURSE).await.unwrap();
    assert_eq!(students[0].id, 12345);
    assert_eq!(mock.student_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn persistent_timeouts_exhaust_retries() {
    let (mock, client) = setup_with(1, 1).await;
    let err = client.list_students(ALWAYS_SLOW_COURSE).await.unwrap_err();
    match &err {
        RemoteError::Exhausted { attempts, last, .. } => {
            assert_eq!(*attempts, 2);
            assert!(last.contains("timed out"), "got {last}");
        }
        other => panic!("expected exhausted retries, got {other:?}"),
    }
    assert_eq!(mock.student_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn ensure_folder_creates_missing_segments_then_reuses_them() {
    let (mock, client) = setup().await;
    let path = FolderPath::parse("Grade_Feedback/2025-03-14_Lab_1");

    let created = client.ensure_folder(7, &path).await.unwrap();
    assert_eq!(created.path, path);
    assert_eq!(mock.folder_creates.load(Ordering::SeqCst), 2);

    // Second call resolves through by_path without creating anything.
    let again = client.ensure_folder(7, &path).await.unwrap();
    assert_eq!(again.id, created.id);
    assert_eq!(mock.folder_creates.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn folder_already_exists_is_success() {
    let (mock, client) = setup().await;
    mock.conflict_on_create.store(true, Ordering::SeqCst);
    let folder = client
        .ensure_folder(7, &FolderPath::parse("Grade_Feedback"))
        .await
        .unwrap();
    let folders = mock.folders.lock().unwrap();
    assert_eq!(folders.len(), 1);
    assert_eq!(folder.id, folders[0].1);
}

#[tokio::test]
async fn root_path_resolves_to_course_root() {
    let (_mock, client) = setup().await;
    let folder = client.ensure_folder(7, &FolderPath::parse("/")).await.unwrap();
    assert_eq!(folder.id, ROOT_FOLDER);
}

#[tokio::test]
async fn staged_upload_posts_body_without_token_and_confirms() {
    let (mock, client) = setup().await;
    let file = UploadFile::pdf("eval_12345.pdf", b"%PDF-1.4 test body".to_vec());
    let file_ref = client.upload_file(7, 101, file).await.unwrap();

    assert_eq!(file_ref.id, 99);
    assert_eq!(file_ref.display_name, "eval_12345.pdf");
    assert!(file_ref.url.ends_with("/courses/7/files/99"), "{}", file_ref.url);
    assert_eq!(file_ref.download_url, format!("{}/download", file_ref.url));
    assert_eq!(
        file_ref.public_url.as_deref(),
        Some("https://files.canvas.test/signed/99")
    );

    assert!(!mock.body_post_had_auth.load(Ordering::SeqCst));
    let body = String::from_utf8_lossy(&mock.upload_body.lock().unwrap()).to_string();
    assert!(body.contains("uploads/abc123"));
    assert!(body.contains("%PDF-1.4 test body"));
}

#[tokio::test]
async fn failed_upload_restarts_the_whole_staged_sequence() {
    let (mock, client) = setup().await;
    mock.fail_first_body_post.store(true, Ordering::SeqCst);
    let file = UploadFile::pdf("scan.pdf", b"%PDF-1.7".to_vec());
    client.upload_file(7, 101, file).await.unwrap();
    assert_eq!(mock.preflight_calls.load(Ordering::SeqCst), 2);
    assert_eq!(mock.body_posts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn oversized_file_is_rejected_locally() {
    let (mock, client) = setup().await;
    let big = UploadFile::pdf("huge.pdf", vec![0u8; 51 * 1024 * 1024]);
    let err = client.upload_file(7, 101, big).await.unwrap_err();
    assert!(matches!(err, RemoteError::Rejected { .. }));
    assert!(!err.is_retryable());
    assert_eq!(mock.preflight_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn grade_and_comment_go_in_one_put() {
    let (mock, client) = setup().await;
    let sub = client
        .grade_submission(7, 55, "12345", "85", Some("Good work!<br><p>link</p>"))
        .await
        .unwrap();
    assert_eq!(sub.grade.as_deref(), Some("85"));
    assert_eq!(sub.user_id, Some(12345));

    let grades = mock.grades.lock().unwrap();
    assert_eq!(grades.len(), 1);
    let (student, body) = &grades[0];
    assert_eq!(student, "12345");
    assert_eq!(body["submission"]["posted_grade"], "85");
    assert_eq!(body["comment"]["text_comment"], "Good work!<br><p>link</p>");
}

#[tokio::test]
async fn grade_without_comment_omits_comment_field() {
    let (mock, client) = setup().await;
    client.grade_submission(7, 55, "12345", "9.5", None).await.unwrap();
    let grades = mock.grades.lock().unwrap();
    assert!(grades[0].1.get("comment").is_none());
}

#[tokio::test]
async fn unknown_student_grade_fails_without_retry() {
    let (mock, client) = setup().await;
    let err = client
        .grade_submission(7, 55, "00000", "85", None)
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert!(mock.grades.lock().unwrap().is_empty());
}
