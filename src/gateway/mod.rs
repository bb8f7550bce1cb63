//! Remote API gateway.
//!
//! [`LmsGateway`] is the seam between the batch engine and the network:
//! the engine only ever talks to a `dyn LmsGateway`, so tests substitute an
//! in-memory stub while production uses [`CanvasClient`].
//!
//! Every implementation is expected to apply retries and rate limiting
//! itself; callers see one `Result` per logical operation.

pub mod canvas;
pub mod rate_limit;
pub mod retry;
pub mod types;

use crate::error::RemoteError;
use async_trait::async_trait;

pub use canvas::CanvasClient;
pub use rate_limit::{IntervalLimiter, NoopLimiter, RateLimiter};
pub use retry::{RetryPolicy, RetryState};
pub use types::{
    Assignment, Course, FileRef, Folder, FolderPath, RemoteFolder, Student, SubmissionRef,
    UploadFile,
};

/// Operations the tool needs from the learning-management service.
#[async_trait]
pub trait LmsGateway: Send + Sync {
    /// Look up `path` under the course's file root, creating missing
    /// segments. An "already exists" answer from the service is success.
    async fn ensure_folder(
        &self,
        course_id: u64,
        path: &FolderPath,
    ) -> Result<RemoteFolder, RemoteError>;

    /// Upload `file` into `folder_id`.
    async fn upload_file(
        &self,
        course_id: u64,
        folder_id: u64,
        file: UploadFile,
    ) -> Result<FileRef, RemoteError>;

    /// Post a grade, with an optional HTML comment, in one call.
    async fn grade_submission(
        &self,
        course_id: u64,
        assignment_id: u64,
        student_id: &str,
        posted_grade: &str,
        comment_html: Option<&str>,
    ) -> Result<SubmissionRef, RemoteError>;

    async fn list_courses(&self) -> Result<Vec<Course>, RemoteError>;

    async fn list_assignments(&self, course_id: u64) -> Result<Vec<Assignment>, RemoteError>;

    /// Students enrolled in the course.
    async fn list_students(&self, course_id: u64) -> Result<Vec<Student>, RemoteError>;

    async fn list_folders(&self, course_id: u64) -> Result<Vec<Folder>, RemoteError>;

    async fn list_submissions(
        &self,
        course_id: u64,
        assignment_id: u64,
    ) -> Result<Vec<SubmissionRef>, RemoteError>;
}
