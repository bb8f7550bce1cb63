//! Document Converter: Markdown → styled PDF.
//!
//! ## Pipeline
//!
//! ```text
//! Markdown ──markdown──▶ blocks ──layout──▶ pages ──pdf──▶ bytes
//!                                  │
//!                                  └─ math: $…$ → typeset runs
//! ```
//!
//! 1. [`markdown`]: fold `pulldown-cmark` events into a block tree
//! 2. [`layout`]: wrap text, stack blocks, break pages; the only stage
//!    that can fail (malformed math)
//! 3. [`pdf`]: draw pages with PDFium's base-14 fonts and save
//!
//! PDFium itself is loaded through `pdfium-auto`, which downloads and caches
//! the platform library on first use. [`ensure_engine`] forces that step up
//! front.
//!
//! Conversion is pure CPU work. [`convert_file`] runs it inside
//! `spawn_blocking` so a batch can convert many documents without stalling
//! the runtime's worker threads.

pub mod layout;
pub mod markdown;
pub mod math;
pub mod metrics;
pub mod pdf;
pub mod style;

pub use pdf::ensure_engine;
pub use style::{DocumentStyle, Theme};

use crate::error::{CanvasError, ConversionError};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Converts Markdown sources to PDF bytes with a fixed style.
///
/// # Example
/// ```rust,no_run
/// use canvas_lms_cli::document::{DocumentStyle, MarkdownConverter};
///
/// let pdf = MarkdownConverter::new(DocumentStyle::default())
///     .convert("# Feedback\n\nGood work, $x^2$ is right.")
///     .unwrap();
/// assert!(pdf.starts_with(b"%PDF-"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MarkdownConverter {
    style: DocumentStyle,
}

impl MarkdownConverter {
    pub fn new(style: DocumentStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> &DocumentStyle {
        &self.style
    }

    /// Render `source` to a PDF. The same source and style always yield
    /// the same bytes.
    ///
    /// Malformed math fails during layout, before PDFium is loaded.
    pub fn convert(&self, source: &str) -> Result<Vec<u8>, ConversionError> {
        let blocks = markdown::parse(source);
        let pages = layout::layout(&blocks, &self.style)?;
        let style = self.style.sanitized();
        let bytes = pdf::write_pdf(&pages, style.page_width, style.page_height)?;
        debug!(
            "Converted {:?} ({} bytes of Markdown) into {} page(s), {} bytes",
            markdown::title(&blocks).unwrap_or_default(),
            source.len(),
            pages.len(),
            bytes.len()
        );
        Ok(bytes)
    }
}

/// Read a Markdown file and convert it on the blocking pool.
pub async fn convert_file(
    path: impl AsRef<Path>,
    style: &DocumentStyle,
) -> Result<Vec<u8>, ConversionError> {
    let path = path.as_ref().to_path_buf();
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| ConversionError::Read {
            path: path.clone(),
            detail: e.to_string(),
        })?;
    let source = String::from_utf8(bytes).map_err(|e| ConversionError::Read {
        path: path.clone(),
        detail: format!("not valid UTF-8: {e}"),
    })?;

    let converter = MarkdownConverter::new(style.clone());
    tokio::task::spawn_blocking(move || converter.convert(&source))
        .await
        .map_err(|e| ConversionError::Task(format!("{}: {e}", path.display())))?
}

/// Convert `input` and write the PDF to `output`.
///
/// Uses atomic write (temp file in the destination directory + rename) to
/// prevent partial files. Returns the number of bytes written.
pub async fn convert_to_file(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    style: &DocumentStyle,
) -> Result<u64, CanvasError> {
    let pdf = convert_file(input, style).await?;
    let path = output.as_ref().to_path_buf();
    let len = pdf.len() as u64;

    tokio::task::spawn_blocking(move || write_atomic(&path, &pdf))
        .await
        .map_err(|e| CanvasError::Internal(format!("write task failed: {e}")))??;
    Ok(len)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CanvasError> {
    let fail = |source: std::io::Error| CanvasError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(fail)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(fail)?;
    tmp.write_all(bytes).map_err(fail)?;
    tmp.persist(path).map_err(|e| fail(e.error))?;
    Ok(())
}

/// Default output path for `input`: same directory, `.pdf` extension.
pub fn pdf_path_for(input: &Path) -> PathBuf {
    input.with_extension("pdf")
}
