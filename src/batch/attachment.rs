//! Turning manifest attachments into upload-ready PDF bytes.

use crate::document::{self, DocumentStyle};
use crate::error::{AttachmentError, ConversionError};
use crate::gateway::UploadFile;
use crate::manifest::{Attachment, AttachmentKind, SourceFormat};
use std::path::{Path, PathBuf};

const PDF_MAGIC: &[u8] = b"%PDF";

/// An attachment whose bytes are ready to upload. Lives only while its
/// record is being processed.
#[derive(Debug, Clone)]
pub struct ResolvedAttachment {
    pub kind: AttachmentKind,
    pub source_path: PathBuf,
    pub file: UploadFile,
}

/// Read (and for Markdown, convert) one attachment.
pub async fn resolve(
    attachment: &Attachment,
    style: &DocumentStyle,
) -> Result<ResolvedAttachment, AttachmentError> {
    let path = &attachment.path;
    let bytes = match attachment.kind.format() {
        SourceFormat::Markdown => document::convert_file(path, style)
            .await
            .map_err(|e| match e {
                ConversionError::Read { path, detail } => AttachmentError::Read { path, detail },
                other => AttachmentError::Conversion(other),
            })?,
        SourceFormat::Pdf => read_pdf(path).await?,
    };
    Ok(ResolvedAttachment {
        kind: attachment.kind,
        source_path: path.clone(),
        file: UploadFile::pdf(upload_name(path), bytes),
    })
}

async fn read_pdf(path: &Path) -> Result<Vec<u8>, AttachmentError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| AttachmentError::Read {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
    if !bytes.starts_with(PDF_MAGIC) {
        return Err(AttachmentError::Read {
            path: path.to_path_buf(),
            detail: "file does not start with %PDF".into(),
        });
    }
    Ok(bytes)
}

/// Remote file name: `<stem>.pdf`.
pub fn upload_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "feedback".to_string());
    format!("{stem}.pdf")
}
