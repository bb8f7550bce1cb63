//! Configuration types for the gateway and the batch engine.
//!
//! Two structs cover the two halves of an upload run:
//!
//! * [`ClientConfig`]: how to talk to Canvas (URL, token, timeouts, retry
//!   and rate-limit knobs). Consumed by [`crate::gateway::CanvasClient`].
//! * [`BatchConfig`]: how to drive a batch (concurrency, document style,
//!   progress callback, cancellation). Consumed by
//!   [`crate::batch::run_batch`].
//!
//! Both are built through builders that validate on `build()`.

use crate::document::DocumentStyle;
use crate::error::CanvasError;
use crate::gateway::retry::RetryPolicy;
use crate::progress::ProgressCallback;
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// ── ClientConfig ─────────────────────────────────────────────────────────

/// Connection settings for the Canvas REST API.
///
/// # Example
/// ```rust
/// use canvas_lms_cli::ClientConfig;
///
/// let config = ClientConfig::builder("https://school.instructure.com", "token")
///     .max_retries(5)
///     .min_request_interval_ms(250)
///     .build()
///     .unwrap();
/// assert_eq!(config.api_base(), "https://school.instructure.com/api/v1");
/// ```
#[derive(Clone)]
pub struct ClientConfig {
    /// Institution URL, e.g. `https://school.instructure.com`.
    pub base_url: String,

    /// Personal access token sent as `Authorization: Bearer …`.
    pub token: String,

    /// Per-request timeout in seconds. Default: 60.
    ///
    /// A request exceeding it is reported as a retryable timeout.
    pub request_timeout_secs: u64,

    /// Timeout for the file-body POST of a staged upload. Default: 60.
    pub upload_timeout_secs: u64,

    /// Minimum spacing between any two outbound calls, in milliseconds.
    /// Default: 400.
    ///
    /// Shared by every worker in the process through one
    /// [`crate::gateway::rate_limit::IntervalLimiter`].
    pub min_request_interval_ms: u64,

    /// Retries after the first attempt on a retryable failure. Default: 3.
    pub max_retries: u32,

    /// Initial backoff delay in milliseconds; doubles on each retry. Default: 500.
    pub retry_backoff_ms: u64,

    /// Upper bound for a single backoff delay. Default: 8000.
    pub max_backoff_ms: u64,

    /// Largest file the client will attempt to upload, in MiB. Default: 50.
    pub max_file_size_mb: u64,

    /// Page size for paginated list endpoints. Default: 100.
    pub per_page: u32,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("upload_timeout_secs", &self.upload_timeout_secs)
            .field("min_request_interval_ms", &self.min_request_interval_ms)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("max_backoff_ms", &self.max_backoff_ms)
            .field("max_file_size_mb", &self.max_file_size_mb)
            .field("per_page", &self.per_page)
            .finish()
    }
}

impl ClientConfig {
    /// Create a new builder with the required connection details.
    pub fn builder(base_url: impl Into<String>, token: impl Into<String>) -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: ClientConfig {
                base_url: base_url.into(),
                token: token.into(),
                request_timeout_secs: 60,
                upload_timeout_secs: 60,
                min_request_interval_ms: 400,
                max_retries: 3,
                retry_backoff_ms: 500,
                max_backoff_ms: 8000,
                max_file_size_mb: 50,
                per_page: 100,
            },
        }
    }

    /// `base_url` with any trailing slash removed and `/api/v1` appended.
    pub fn api_base(&self) -> String {
        format!("{}/api/v1", self.base_url.trim_end_matches('/'))
    }

    /// Institution URL without a trailing slash; used for human-facing links.
    pub fn web_base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }

    /// The retry policy described by this config.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries.saturating_add(1),
            Duration::from_millis(self.retry_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
        )
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(1024 * 1024)
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn upload_timeout_secs(mut self, secs: u64) -> Self {
        self.config.upload_timeout_secs = secs;
        self
    }

    pub fn min_request_interval_ms(mut self, ms: u64) -> Self {
        self.config.min_request_interval_ms = ms;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn max_backoff_ms(mut self, ms: u64) -> Self {
        self.config.max_backoff_ms = ms;
        self
    }

    pub fn max_file_size_mb(mut self, mb: u64) -> Self {
        self.config.max_file_size_mb = mb;
        self
    }

    pub fn per_page(mut self, n: u32) -> Self {
        self.config.per_page = n.clamp(1, 100);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ClientConfig, CanvasError> {
        let c = &self.config;
        if !(c.base_url.starts_with("http://") || c.base_url.starts_with("https://")) {
            return Err(CanvasError::InvalidConfig(format!(
                "Canvas base URL must start with http:// or https://, got '{}'",
                c.base_url
            )));
        }
        if c.token.trim().is_empty() {
            return Err(CanvasError::InvalidConfig(
                "Canvas API token is empty".into(),
            ));
        }
        if c.request_timeout_secs == 0 || c.upload_timeout_secs == 0 {
            return Err(CanvasError::InvalidConfig(
                "Timeouts must be ≥ 1 second".into(),
            ));
        }
        if c.max_backoff_ms < c.retry_backoff_ms {
            return Err(CanvasError::InvalidConfig(format!(
                "max backoff ({}ms) is smaller than the initial backoff ({}ms)",
                c.max_backoff_ms, c.retry_backoff_ms
            )));
        }
        Ok(self.config)
    }
}

// ── BatchConfig ──────────────────────────────────────────────────────────

/// Settings for one [`crate::batch::run_batch`] call.
#[derive(Clone)]
pub struct BatchConfig {
    /// Records processed at once. Default: 4.
    ///
    /// All workers share the gateway's single rate limiter, so raising this
    /// overlaps conversion and upload latency without raising the request
    /// rate.
    pub concurrency: usize,

    /// Styling for Markdown → PDF conversion.
    pub document_style: DocumentStyle,

    /// First segment of every feedback folder path. Default: `Grade_Feedback`.
    pub folder_root: String,

    /// Receives one event per completed record.
    pub progress_callback: Option<ProgressCallback>,

    /// Cancels the run between records.
    pub cancel: CancellationToken,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            document_style: DocumentStyle::default(),
            folder_root: "Grade_Feedback".to_string(),
            progress_callback: None,
            cancel: CancellationToken::new(),
        }
    }
}

impl fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfig")
            .field("concurrency", &self.concurrency)
            .field("document_style", &self.document_style)
            .field("folder_root", &self.folder_root)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn UploadProgressCallback>"),
            )
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl BatchConfig {
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`BatchConfig`].
#[derive(Debug)]
pub struct BatchConfigBuilder {
    config: BatchConfig,
}

impl BatchConfigBuilder {
    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn document_style(mut self, style: DocumentStyle) -> Self {
        self.config.document_style = style;
        self
    }

    pub fn folder_root(mut self, root: impl Into<String>) -> Self {
        self.config.folder_root = root.into();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.config.cancel = token;
        self
    }

    pub fn build(self) -> Result<BatchConfig, CanvasError> {
        let root = self.config.folder_root.trim_matches('/').to_string();
        if root.is_empty() {
            return Err(CanvasError::InvalidConfig(
                "Feedback folder root must not be empty".into(),
            ));
        }
        let mut config = self.config;
        config.folder_root = root;
        Ok(config)
    }
}
