//! Canvas REST client.
//!
//! Every call goes through the same three steps:
//!
//! 1. **Rate limit**: wait on the shared [`RateLimiter`] slot.
//! 2. **Send**: bearer-authenticated request with a bounded timeout.
//! 3. **Classify**: 2xx decoded, 429 → [`RemoteError::RateLimited`]
//!    (with `Retry-After` pushed into the limiter), 5xx →
//!    [`RemoteError::Server`], other 4xx → [`RemoteError::Client`].
//!
//! The whole sequence runs under the client's [`RetryPolicy`]. A staged
//! file upload (preflight, body POST, confirm) counts as one attempt, since
//! Canvas upload tickets are single-use.

use super::rate_limit::{IntervalLimiter, RateLimiter};
use super::retry::RetryPolicy;
use super::types::{
    Assignment, Course, FileRef, Folder, FolderPath, RemoteFolder, Student, SubmissionRef,
    UploadFile,
};
use super::LmsGateway;
use crate::config::ClientConfig;
use crate::error::{CanvasError, RemoteError};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderMap, LOCATION, RETRY_AFTER};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Upper bound on pages followed for one list call.
const MAX_PAGES: usize = 200;

static RE_NEXT_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<([^>]+)>\s*;\s*rel="?next"?"#).unwrap());

/// [`LmsGateway`] over the Canvas REST API.
pub struct CanvasClient {
    http: Client,
    api_base: Url,
    web_base: String,
    token: String,
    retry: RetryPolicy,
    limiter: Arc<dyn RateLimiter>,
    request_timeout: Duration,
    upload_timeout: Duration,
    max_file_size: u64,
    per_page: u32,
}

impl std::fmt::Debug for CanvasClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanvasClient")
            .field("api_base", &self.api_base.as_str())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct UploadTicket {
    upload_url: String,
    #[serde(default)]
    upload_params: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct UploadedFile {
    id: u64,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

impl CanvasClient {
    /// Build a client that shares `limiter` with every other caller.
    pub fn new(config: &ClientConfig, limiter: Arc<dyn RateLimiter>) -> Result<Self, CanvasError> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("canvas-lms-cli/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CanvasError::InvalidConfig(format!("HTTP client: {e}")))?;

        let api_base = Url::parse(&config.api_base())
            .map_err(|e| CanvasError::InvalidConfig(format!("Canvas base URL: {e}")))?;
        if api_base.cannot_be_a_base() {
            return Err(CanvasError::InvalidConfig(format!(
                "Canvas base URL cannot carry a path: {}",
                config.base_url
            )));
        }

        Ok(Self {
            http,
            api_base,
            web_base: config.web_base().to_string(),
            token: config.token.clone(),
            retry: config.retry_policy(),
            limiter,
            request_timeout: config.request_timeout(),
            upload_timeout: config.upload_timeout(),
            max_file_size: config.max_file_size_bytes(),
            per_page: config.per_page,
        })
    }

    /// Build a client with its own [`IntervalLimiter`] at the configured spacing.
    pub fn from_config(config: &ClientConfig) -> Result<Self, CanvasError> {
        let limiter: Arc<dyn RateLimiter> =
            Arc::new(IntervalLimiter::new(config.min_request_interval()));
        Self::new(config, limiter)
    }

    // ── Request plumbing ─────────────────────────────────────────────────

    fn endpoint(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::Rejected {
                operation: "build url".into(),
                detail: format!("'{}' cannot carry a path", self.api_base),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authed(&self, method: Method, url: Url) -> RequestBuilder {
        self.http.request(method, url).bearer_auth(&self.token)
    }

    fn transport_error(operation: &str, e: reqwest::Error, timeout: Duration) -> RemoteError {
        if e.is_timeout() {
            RemoteError::Timeout {
                operation: operation.to_string(),
                after: timeout,
            }
        } else if e.is_decode() {
            RemoteError::Decode {
                operation: operation.to_string(),
                detail: e.to_string(),
            }
        } else {
            RemoteError::Transport {
                operation: operation.to_string(),
                detail: e.to_string(),
            }
        }
    }

    async fn send(&self, operation: &str, request: RequestBuilder) -> Result<Response, RemoteError> {
        self.limiter.acquire().await;
        request
            .send()
            .await
            .map_err(|e| Self::transport_error(operation, e, self.request_timeout))
    }

    /// Map a non-2xx response to the error taxonomy.
    async fn check(&self, operation: &str, response: Response) -> Result<Response, RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = parse_retry_after(response.headers());
            if let Some(delay) = retry_after {
                self.limiter.penalize(delay);
            }
            warn!("{}: rate limited (retry after {:?})", operation, retry_after);
            return Err(RemoteError::RateLimited {
                operation: operation.to_string(),
                retry_after,
            });
        }

        let body = response.text().await.unwrap_or_default();
        let detail = snippet(&body);
        if status.is_server_error() {
            Err(RemoteError::Server {
                operation: operation.to_string(),
                status: status.as_u16(),
                detail,
            })
        } else {
            Err(RemoteError::Client {
                operation: operation.to_string(),
                status: status.as_u16(),
                detail,
            })
        }
    }

    async fn decode<T: DeserializeOwned>(&self, operation: &str, response: Response) -> Result<T, RemoteError> {
        response
            .json::<T>()
            .await
            .map_err(|e| Self::transport_error(operation, e, self.request_timeout))
    }

    /// One JSON call under the retry policy. `build` is invoked per attempt.
    async fn call<T, F>(&self, operation: &str, build: F) -> Result<T, RemoteError>
    where
        T: DeserializeOwned + Send,
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        let build = &build;
        self.retry
            .run(operation, move |attempt| {
                let request = build();
                async move {
                    debug!("{} (attempt {})", operation, attempt);
                    let response = self.send(operation, request).await?;
                    let response = self.check(operation, response).await?;
                    self.decode(operation, response).await
                }
            })
            .await
    }

    /// Follow `Link: rel="next"` headers until the last page.
    async fn paginated<T>(&self, operation: &str, mut url: Url) -> Result<Vec<T>, RemoteError>
    where
        T: DeserializeOwned + Send,
    {
        url.query_pairs_mut()
            .append_pair("per_page", &self.per_page.to_string());

        let mut items = Vec::new();
        let mut next = Some(url);
        let mut pages = 0usize;

        while let Some(page_url) = next.take() {
            let page_url = &page_url;
            let (page, link): (Vec<T>, Option<Url>) = self
                .retry
                .run(operation, move |_| {
                    let request = self.authed(Method::GET, page_url.clone());
                    async move {
                        let response = self.send(operation, request).await?;
                        let response = self.check(operation, response).await?;
                        let link = next_link(response.headers());
                        let page: Vec<T> = self.decode(operation, response).await?;
                        Ok((page, link))
                    }
                })
                .await?;

            items.extend(page);
            pages += 1;
            if pages >= MAX_PAGES && link.is_some() {
                warn!("{}: stopped after {} pages", operation, pages);
                break;
            }
            next = link;
        }

        debug!("{}: {} items over {} page(s)", operation, items.len(), pages);
        Ok(items)
    }

    // ── Folders ──────────────────────────────────────────────────────────

    async fn find_child(&self, list_url: &Url, name: &str) -> Result<Option<Folder>, RemoteError> {
        let children: Vec<Folder> = self.paginated("list folders", list_url.clone()).await?;
        Ok(children.into_iter().find(|f| f.name == name))
    }

    /// Id of child `name` under `parent`, creating it when missing.
    async fn ensure_child(&self, parent: u64, name: &str) -> Result<u64, RemoteError> {
        let list_url = self.endpoint(&["folders", &parent.to_string(), "folders"])?;
        if let Some(existing) = self.find_child(&list_url, name).await? {
            return Ok(existing.id);
        }

        let body = json!({ "name": name });
        let created = self
            .call::<Folder, _>("create folder", || {
                self.authed(Method::POST, list_url.clone()).json(&body)
            })
            .await;

        match created {
            Ok(folder) => {
                info!("Created folder '{}' (id {})", name, folder.id);
                Ok(folder.id)
            }
            Err(e) if is_already_exists(&e) => {
                debug!("Folder '{}' already exists; re-listing", name);
                self.find_child(&list_url, name)
                    .await?
                    .map(|f| f.id)
                    .ok_or_else(|| RemoteError::Decode {
                        operation: "create folder".into(),
                        detail: format!("'{name}' reported as existing but not listed"),
                    })
            }
            Err(e) => Err(e),
        }
    }

    // ── Uploads ──────────────────────────────────────────────────────────

    /// One pass of the staged upload protocol.
    async fn upload_once(
        &self,
        course_id: u64,
        folder_id: u64,
        file: &UploadFile,
    ) -> Result<FileRef, RemoteError> {
        const OP: &str = "upload file";

        let preflight_url = self.endpoint(&["courses", &course_id.to_string(), "files"])?;
        let preflight = json!({
            "name": file.filename,
            "size": file.size(),
            "content_type": file.content_type,
            "parent_folder_id": folder_id,
            "on_duplicate": "rename",
        });
        let response = self
            .send(OP, self.authed(Method::POST, preflight_url).json(&preflight))
            .await?;
        let response = self.check(OP, response).await?;
        let ticket: UploadTicket = self.decode(OP, response).await?;

        let upload_url = Url::parse(&ticket.upload_url).map_err(|e| RemoteError::Decode {
            operation: OP.into(),
            detail: format!("upload_url '{}': {e}", ticket.upload_url),
        })?;

        let mut form = Form::new();
        for (key, value) in ticket.upload_params {
            let value = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            form = form.text(key, value);
        }
        let part = Part::bytes(file.bytes.clone())
            .file_name(file.filename.clone())
            .mime_str(&file.content_type)
            .map_err(|e| RemoteError::Rejected {
                operation: OP.into(),
                detail: format!("content type '{}': {e}", file.content_type),
            })?;
        form = form.part("file", part);

        // The upload host is not the API host; no bearer token here.
        self.limiter.acquire().await;
        let response = self
            .http
            .post(upload_url)
            .multipart(form)
            .timeout(self.upload_timeout)
            .send()
            .await
            .map_err(|e| Self::transport_error(OP, e, self.upload_timeout))?;

        let response = if response.status().is_redirection() {
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| RemoteError::Decode {
                    operation: OP.into(),
                    detail: format!("{} redirect without Location", response.status()),
                })?;
            let confirm_url = response.url().join(location).map_err(|e| RemoteError::Decode {
                operation: OP.into(),
                detail: format!("confirm location '{location}': {e}"),
            })?;
            let confirm = self.send(OP, self.authed(Method::GET, confirm_url)).await?;
            self.check(OP, confirm).await?
        } else {
            self.check(OP, response).await?
        };

        let uploaded: UploadedFile = self.decode(OP, response).await?;
        Ok(self.file_ref(course_id, uploaded, &file.filename))
    }

    fn file_ref(&self, course_id: u64, uploaded: UploadedFile, fallback_name: &str) -> FileRef {
        let url = format!("{}/courses/{}/files/{}", self.web_base, course_id, uploaded.id);
        FileRef {
            id: uploaded.id,
            display_name: uploaded
                .display_name
                .or(uploaded.filename)
                .unwrap_or_else(|| fallback_name.to_string()),
            download_url: format!("{url}/download"),
            url,
            public_url: uploaded.url,
        }
    }
}

#[async_trait]
impl LmsGateway for CanvasClient {
    async fn ensure_folder(
        &self,
        course_id: u64,
        path: &FolderPath,
    ) -> Result<RemoteFolder, RemoteError> {
        let course = course_id.to_string();

        if path.is_root() {
            let root_url = self.endpoint(&["courses", &course, "folders", "root"])?;
            let root: Folder = self
                .call("resolve root folder", || self.authed(Method::GET, root_url.clone()))
                .await?;
            return Ok(RemoteFolder {
                id: root.id,
                path: path.clone(),
            });
        }

        let mut segments = vec!["courses", course.as_str(), "folders", "by_path"];
        segments.extend(path.segments().iter().map(String::as_str));
        let by_path = self.endpoint(&segments)?;

        match self
            .call::<Vec<Folder>, _>("resolve folder", || {
                self.authed(Method::GET, by_path.clone())
            })
            .await
        {
            Ok(chain) => {
                if let Some(last) = chain.last() {
                    debug!("Folder '{}' exists (id {})", path, last.id);
                    return Ok(RemoteFolder {
                        id: last.id,
                        path: path.clone(),
                    });
                }
            }
            Err(RemoteError::Client { status, .. }) => {
                debug!("Folder '{}' lookup returned {}; walking from root", path, status);
            }
            Err(e) => return Err(e),
        }

        let root_url = self.endpoint(&["courses", &course, "folders", "root"])?;
        let root: Folder = self
            .call("resolve root folder", || self.authed(Method::GET, root_url.clone()))
            .await?;

        let mut parent = root.id;
        for segment in path.segments() {
            parent = self.ensure_child(parent, segment).await?;
        }
        info!("Folder ready: {} (id {})", path, parent);
        Ok(RemoteFolder {
            id: parent,
            path: path.clone(),
        })
    }

    async fn upload_file(
        &self,
        course_id: u64,
        folder_id: u64,
        file: UploadFile,
    ) -> Result<FileRef, RemoteError> {
        if file.size() > self.max_file_size {
            return Err(RemoteError::Rejected {
                operation: "upload file".into(),
                detail: format!(
                    "'{}' is {:.1} MB, over the {} MB limit",
                    file.filename,
                    file.size() as f64 / (1024.0 * 1024.0),
                    self.max_file_size / (1024 * 1024)
                ),
            });
        }

        let file = &file;
        let uploaded = self
            .retry
            .run("upload file", move |_| {
                self.upload_once(course_id, folder_id, file)
            })
            .await?;
        info!(
            "Uploaded '{}' ({} bytes) as file {}",
            file.filename,
            file.size(),
            uploaded.id
        );
        Ok(uploaded)
    }

    async fn grade_submission(
        &self,
        course_id: u64,
        assignment_id: u64,
        student_id: &str,
        posted_grade: &str,
        comment_html: Option<&str>,
    ) -> Result<SubmissionRef, RemoteError> {
        let url = self.endpoint(&[
            "courses",
            &course_id.to_string(),
            "assignments",
            &assignment_id.to_string(),
            "submissions",
            student_id,
        ])?;

        let mut body = json!({ "submission": { "posted_grade": posted_grade } });
        if let Some(html) = comment_html {
            body["comment"] = json!({ "text_comment": html });
        }

        let submission: SubmissionRef = self
            .call("grade submission", || {
                self.authed(Method::PUT, url.clone()).json(&body)
            })
            .await?;
        debug!(
            "Graded student {} with {} (submission {:?})",
            student_id, posted_grade, submission.id
        );
        Ok(submission)
    }

    async fn list_courses(&self) -> Result<Vec<Course>, RemoteError> {
        let mut url = self.endpoint(&["courses"])?;
        url.query_pairs_mut().append_pair("enrollment_state", "active");
        self.paginated("list courses", url).await
    }

    async fn list_assignments(&self, course_id: u64) -> Result<Vec<Assignment>, RemoteError> {
        let url = self.endpoint(&["courses", &course_id.to_string(), "assignments"])?;
        self.paginated("list assignments", url).await
    }

    async fn list_students(&self, course_id: u64) -> Result<Vec<Student>, RemoteError> {
        let mut url = self.endpoint(&["courses", &course_id.to_string(), "users"])?;
        url.query_pairs_mut().append_pair("enrollment_type[]", "student");
        self.paginated("list students", url).await
    }

    async fn list_folders(&self, course_id: u64) -> Result<Vec<Folder>, RemoteError> {
        let url = self.endpoint(&["courses", &course_id.to_string(), "folders"])?;
        self.paginated("list folders", url).await
    }

    async fn list_submissions(
        &self,
        course_id: u64,
        assignment_id: u64,
    ) -> Result<Vec<SubmissionRef>, RemoteError> {
        let url = self.endpoint(&[
            "courses",
            &course_id.to_string(),
            "assignments",
            &assignment_id.to_string(),
            "submissions",
        ])?;
        self.paginated("list submissions", url).await
    }
}

// ── Response helpers ─────────────────────────────────────────────────────

fn next_link(headers: &HeaderMap) -> Option<Url> {
    headers
        .get_all(reqwest::header::LINK)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .find_map(|part| RE_NEXT_LINK.captures(part))
        .and_then(|caps| Url::parse(&caps[1]).ok())
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

fn is_already_exists(e: &RemoteError) -> bool {
    match e {
        RemoteError::Client { status: 409, .. } => true,
        RemoteError::Client {
            status: 400 | 422,
            detail,
            ..
        } => detail.to_ascii_lowercase().contains("already exists"),
        _ => false,
    }
}

/// First line of a response body, shortened for error messages.
fn snippet(body: &str) -> String {
    let line = body.trim().lines().next().unwrap_or_default();
    if line.chars().count() > 300 {
        let cut: String = line.chars().take(300).collect();
        format!("{cut}…")
    } else {
        line.to_string()
    }
}
