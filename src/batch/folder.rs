//! Feedback folder naming and per-run folder memoization.

use crate::error::RemoteError;
use crate::gateway::{FolderPath, LmsGateway, RemoteFolder};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;
use tracing::debug;

const MAX_NAME_LEN: usize = 30;

/// Reduce an assignment name to a folder-safe fragment.
///
/// Keeps alphanumerics, spaces, `-` and `_`; spaces become `_`; the result
/// is cut to 30 characters.
pub fn clean_assignment_name(name: &str) -> String {
    let kept: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    kept.trim()
        .replace(' ', "_")
        .chars()
        .take(MAX_NAME_LEN)
        .collect()
}

/// `<root>/<YYYY-MM-DD>_<clean name>`, or `<root>/<YYYY-MM-DD>_Assignment_<id>`
/// when the name is unknown or cleans to nothing.
pub fn feedback_folder(
    root: &str,
    assignment_name: Option<&str>,
    assignment_id: u64,
    date: NaiveDate,
) -> FolderPath {
    let name = assignment_name
        .map(clean_assignment_name)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| format!("Assignment_{assignment_id}"));
    FolderPath::parse(root).join(&format!("{}_{}", date.format("%Y-%m-%d"), name))
}

/// Resolves each distinct folder path at most once per run.
///
/// Concurrent callers asking for the same path wait on a single
/// `ensure_folder` call. A failed lookup is not cached, so a later record
/// may try again.
pub struct FolderCache {
    gateway: Arc<dyn LmsGateway>,
    course_id: u64,
    cells: Mutex<HashMap<FolderPath, Arc<OnceCell<RemoteFolder>>>>,
}

impl FolderCache {
    pub fn new(gateway: Arc<dyn LmsGateway>, course_id: u64) -> Self {
        Self {
            gateway,
            course_id,
            cells: Mutex::new(HashMap::new()),
        }
    }

    pub async fn ensure(&self, path: &FolderPath) -> Result<RemoteFolder, RemoteError> {
        let cell = {
            let mut cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(cells.entry(path.clone()).or_default())
        };
        let folder = cell
            .get_or_try_init(|| async {
                debug!("Ensuring remote folder '{}'", path);
                self.gateway.ensure_folder(self.course_id, path).await
            })
            .await?;
        Ok(folder.clone())
    }
}
