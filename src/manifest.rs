//! Manifest validation: CSV grade sheet → typed [`GradeRecord`]s.
//!
//! ## Two failure tiers
//!
//! * A **structural** problem (no `grade` column, unknown column, unreadable
//!   CSV) returns `Err(ManifestError)`. Nothing can run.
//! * A **row** problem (grade `"N/A"`, missing feedback file, both eval
//!   formats given) is recorded as a [`RowError`] and the row is left out.
//!   Every other row is still validated, so one pass reports every problem
//!   in the sheet.
//!
//! [`Manifest::into_executable`] then decides whether an upload may start:
//! only when the manifest is clean, or when the operator explicitly opts to
//! proceed with the valid subset.
//!
//! ## Columns
//!
//! | Column | Required | Notes |
//! |--------|----------|-------|
//! | `student_id` (alias `canvas_id`) | yes | Canvas user id |
//! | `grade` | yes | any finite number |
//! | `comment` (alias `comments`) | no | plain text, may contain HTML |
//! | `md_eval_file` / `pdf_eval_file` | no | mutually exclusive |
//! | `md_exam_file1` / `pdf_exam_file1` | no | both may be set |
//! | `md_exam_file2` / `pdf_exam_file2` | no | both may be set |

use crate::error::{CanvasError, ManifestError, RowError, RowErrorKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

// ── Attachment kinds ─────────────────────────────────────────────────────

/// Source format of a feedback file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    /// Converted to PDF before upload.
    Markdown,
    /// Uploaded unchanged.
    Pdf,
}

/// The six attachment columns a manifest may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AttachmentKind {
    #[serde(rename = "markdown_exam_1")]
    MarkdownExam1,
    #[serde(rename = "pdf_exam_1")]
    PdfExam1,
    #[serde(rename = "markdown_exam_2")]
    MarkdownExam2,
    #[serde(rename = "pdf_exam_2")]
    PdfExam2,
    #[serde(rename = "markdown_eval")]
    MarkdownEval,
    #[serde(rename = "pdf_eval")]
    PdfEval,
}

impl AttachmentKind {
    /// Every kind, in the order attachments appear in a record and in the
    /// grade comment.
    pub const ALL: [AttachmentKind; 6] = [
        AttachmentKind::MarkdownExam1,
        AttachmentKind::PdfExam1,
        AttachmentKind::MarkdownExam2,
        AttachmentKind::PdfExam2,
        AttachmentKind::MarkdownEval,
        AttachmentKind::PdfEval,
    ];

    /// CSV column name.
    pub fn column(self) -> &'static str {
        match self {
            AttachmentKind::MarkdownExam1 => "md_exam_file1",
            AttachmentKind::PdfExam1 => "pdf_exam_file1",
            AttachmentKind::MarkdownExam2 => "md_exam_file2",
            AttachmentKind::PdfExam2 => "pdf_exam_file2",
            AttachmentKind::MarkdownEval => "md_eval_file",
            AttachmentKind::PdfEval => "pdf_eval_file",
        }
    }

    pub fn from_column(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.column() == name)
    }

    pub fn format(self) -> SourceFormat {
        match self {
            AttachmentKind::MarkdownExam1
            | AttachmentKind::MarkdownExam2
            | AttachmentKind::MarkdownEval => SourceFormat::Markdown,
            AttachmentKind::PdfExam1 | AttachmentKind::PdfExam2 | AttachmentKind::PdfEval => {
                SourceFormat::Pdf
            }
        }
    }

    pub fn is_eval(self) -> bool {
        matches!(self, AttachmentKind::MarkdownEval | AttachmentKind::PdfEval)
    }

    /// Heading used for this attachment in the grade comment.
    pub fn label(self) -> &'static str {
        match self {
            AttachmentKind::MarkdownExam1 => "Exam transcription (Format 1)",
            AttachmentKind::PdfExam1 => "Exam submission (Format 1)",
            AttachmentKind::MarkdownExam2 => "Exam transcription (Format 2)",
            AttachmentKind::PdfExam2 => "Exam submission (Format 2)",
            AttachmentKind::MarkdownEval | AttachmentKind::PdfEval => "Detailed feedback",
        }
    }

    fn extensions(self) -> &'static [&'static str] {
        match self.format() {
            SourceFormat::Markdown => &["md", "markdown"],
            SourceFormat::Pdf => &["pdf"],
        }
    }
}

impl fmt::Display for AttachmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

// ── Records ──────────────────────────────────────────────────────────────

/// One feedback file attached to a record. `path` is absolute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub path: PathBuf,
}

/// One validated manifest row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeRecord {
    /// 1-indexed CSV line (header is line 1).
    pub line: u64,
    pub student_id: String,
    pub grade: f64,
    pub comment: Option<String>,
    /// Ordered per [`AttachmentKind::ALL`]. At most one eval attachment.
    pub attachments: Vec<Attachment>,
}

impl GradeRecord {
    /// A record with no comment and no attachments.
    pub fn new(student_id: impl Into<String>, grade: f64) -> Self {
        Self {
            line: 0,
            student_id: student_id.into(),
            grade,
            comment: None,
            attachments: Vec::new(),
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_attachment(mut self, kind: AttachmentKind, path: impl Into<PathBuf>) -> Self {
        self.attachments.push(Attachment {
            kind,
            path: path.into(),
        });
        self.attachments.sort_by_key(|a| a.kind);
        self
    }

    /// Canvas expects `posted_grade` as a string; drop a trailing `.0`.
    pub fn posted_grade(&self) -> String {
        if self.grade.fract() == 0.0 && self.grade.abs() < 1e15 {
            format!("{}", self.grade as i64)
        } else {
            format!("{}", self.grade)
        }
    }
}

// ── Options ──────────────────────────────────────────────────────────────

/// Text encoding of the manifest file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Encoding {
    #[default]
    Utf8,
    /// ISO-8859-1, common for spreadsheets exported on older systems.
    Latin1,
}

impl Encoding {
    pub fn decode(self, bytes: &[u8]) -> Result<String, ManifestError> {
        let text = match self {
            Encoding::Utf8 => String::from_utf8(bytes.to_vec()).map_err(|e| {
                ManifestError::Encoding {
                    encoding: self.to_string(),
                    detail: e.to_string(),
                }
            })?,
            Encoding::Latin1 => bytes.iter().map(|&b| b as char).collect(),
        };
        Ok(match text.strip_prefix('\u{feff}') {
            Some(rest) => rest.to_string(),
            None => text,
        })
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Encoding::Utf8 => "utf-8",
            Encoding::Latin1 => "latin-1",
        })
    }
}

impl FromStr for Encoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" => Ok(Encoding::Utf8),
            "latin-1" | "latin1" | "iso-8859-1" => Ok(Encoding::Latin1),
            other => Err(format!("unsupported encoding '{other}' (use utf-8 or latin-1)")),
        }
    }
}

/// How to read and resolve a manifest.
#[derive(Debug, Clone)]
pub struct ManifestOptions {
    /// Base for relative attachment paths.
    pub root_dir: PathBuf,
    pub encoding: Encoding,
    pub delimiter: u8,
}

impl ManifestOptions {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            encoding: Encoding::Utf8,
            delimiter: b',',
        }
    }

    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }
}

// ── Manifest ─────────────────────────────────────────────────────────────

/// The result of validating a manifest.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    /// Valid rows, in file order.
    pub records: Vec<GradeRecord>,
    /// Rejected rows, in file order. A row may contribute several errors.
    pub row_errors: Vec<RowError>,
}

impl Manifest {
    pub fn is_clean(&self) -> bool {
        self.row_errors.is_empty()
    }

    /// Number of distinct lines that were rejected.
    pub fn invalid_rows(&self) -> usize {
        let mut lines: Vec<u64> = self.row_errors.iter().map(|e| e.line).collect();
        lines.dedup();
        lines.len()
    }

    pub fn attachment_count(&self) -> usize {
        self.records.iter().map(|r| r.attachments.len()).sum()
    }

    /// Records allowed to run.
    ///
    /// Fails with [`CanvasError::InvalidRows`] when the manifest has row
    /// errors and `proceed_with_valid` is `false`.
    pub fn into_executable(self, proceed_with_valid: bool) -> Result<Vec<GradeRecord>, CanvasError> {
        if !self.is_clean() && !proceed_with_valid {
            return Err(CanvasError::InvalidRows {
                invalid: self.invalid_rows(),
                valid: self.records.len(),
            });
        }
        if !self.is_clean() {
            warn!(
                "Proceeding with {} valid rows; {} rows excluded",
                self.records.len(),
                self.invalid_rows()
            );
        }
        Ok(self.records)
    }
}

/// Read and validate a manifest file.
///
/// When `options` is `None`, relative attachment paths resolve against the
/// manifest's own directory and the file is read as UTF-8.
pub fn load_manifest(
    path: impl AsRef<Path>,
    options: Option<ManifestOptions>,
) -> Result<Manifest, ManifestError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| ManifestError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;

    let options = options.unwrap_or_else(|| {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        ManifestOptions::new(dir)
    });

    let text = options.encoding.decode(&bytes)?;
    info!("Validating manifest {}", path.display());
    parse_manifest(&text, &options)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Column {
    StudentId,
    Grade,
    Comment,
    File(AttachmentKind),
}

impl Column {
    fn from_header(raw: &str) -> Option<Self> {
        let name = raw.trim().to_ascii_lowercase();
        match name.as_str() {
            "student_id" | "canvas_id" => Some(Column::StudentId),
            "grade" => Some(Column::Grade),
            "comment" | "comments" => Some(Column::Comment),
            other => AttachmentKind::from_column(other).map(Column::File),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Column::StudentId => "student_id",
            Column::Grade => "grade",
            Column::Comment => "comment",
            Column::File(kind) => kind.column(),
        }
    }
}

fn known_columns() -> String {
    let mut names = vec!["student_id", "canvas_id", "grade", "comment", "comments"];
    names.extend(AttachmentKind::ALL.iter().map(|k| k.column()));
    names.join(", ")
}

/// Column positions resolved from the header row.
struct ColumnMap {
    student_id: usize,
    grade: usize,
    comment: Option<usize>,
    files: Vec<(AttachmentKind, usize)>,
}

impl ColumnMap {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self, ManifestError> {
        if headers.iter().all(|h| h.trim().is_empty()) {
            return Err(ManifestError::Empty);
        }

        let mut seen: HashMap<Column, usize> = HashMap::new();
        for (idx, raw) in headers.iter().enumerate() {
            if raw.trim().is_empty() {
                continue;
            }
            let column = Column::from_header(raw).ok_or_else(|| ManifestError::UnknownColumn {
                column: raw.trim().to_string(),
                known: known_columns(),
            })?;
            if seen.insert(column, idx).is_some() {
                return Err(ManifestError::DuplicateColumn {
                    column: column.name().to_string(),
                });
            }
        }

        let required = |c: Column| {
            seen.get(&c).copied().ok_or_else(|| ManifestError::MissingColumn {
                column: c.name().to_string(),
            })
        };
        let student_id = required(Column::StudentId)?;
        let grade = required(Column::Grade)?;

        let mut files: Vec<(AttachmentKind, usize)> = AttachmentKind::ALL
            .iter()
            .filter_map(|k| seen.get(&Column::File(*k)).map(|idx| (*k, *idx)))
            .collect();
        files.sort_by_key(|(k, _)| *k);

        Ok(Self {
            student_id,
            grade,
            comment: seen.get(&Column::Comment).copied(),
            files,
        })
    }
}

/// Validate manifest text.
///
/// Returns `Err` only for structural problems; row problems are collected
/// in [`Manifest::row_errors`].
pub fn parse_manifest(text: &str, options: &ManifestOptions) -> Result<Manifest, ManifestError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(options.delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader.headers().map_err(csv_error)?.clone();
    let columns = ColumnMap::from_headers(&headers)?;

    let mut manifest = Manifest::default();
    let mut first_seen: HashMap<String, u64> = HashMap::new();

    for result in reader.records() {
        let row = result.map_err(csv_error)?;
        if row.iter().all(|f| f.is_empty()) {
            continue;
        }
        let line = row.position().map(|p| p.line()).unwrap_or(0);
        let field = |idx: usize| row.get(idx).map(str::trim).filter(|s| !s.is_empty());

        let mut errors: Vec<RowError> = Vec::new();
        let student_id = field(columns.student_id).map(str::to_string);
        let mut err = |column: &str, kind: RowErrorKind| {
            errors.push(RowError {
                line,
                student_id: student_id.clone(),
                column: column.to_string(),
                kind,
            })
        };

        match student_id.as_deref() {
            None => err("student_id", RowErrorKind::MissingStudentId),
            Some(id) => {
                if let Some(first) = first_seen.get(id) {
                    err(
                        "student_id",
                        RowErrorKind::DuplicateStudent(id.to_string(), *first),
                    );
                }
            }
        }

        let grade = match field(columns.grade) {
            None => {
                err("grade", RowErrorKind::InvalidGrade(String::new()));
                None
            }
            Some(raw) => match parse_grade(raw) {
                Some(g) => Some(g),
                None => {
                    err("grade", RowErrorKind::InvalidGrade(raw.to_string()));
                    None
                }
            },
        };

        let mut attachments = Vec::new();
        for &(kind, idx) in &columns.files {
            let Some(raw) = field(idx) else { continue };
            match resolve_attachment(kind, raw, &options.root_dir) {
                Ok(path) => attachments.push(Attachment { kind, path }),
                Err(kind_err) => err(kind.column(), kind_err),
            }
        }

        let eval_given = columns
            .files
            .iter()
            .filter(|(k, idx)| k.is_eval() && field(*idx).is_some())
            .count();
        if eval_given > 1 {
            err("pdf_eval_file", RowErrorKind::AmbiguousEvalFormat);
        }

        if let Some(ref id) = student_id {
            first_seen.entry(id.clone()).or_insert(line);
        }

        match (errors.is_empty(), student_id, grade) {
            (true, Some(student_id), Some(grade)) => {
                debug!(
                    "Line {}: student {} grade {} ({} attachments)",
                    line,
                    student_id,
                    grade,
                    attachments.len()
                );
                manifest.records.push(GradeRecord {
                    line,
                    student_id,
                    grade,
                    comment: columns.comment.and_then(field).map(str::to_string),
                    attachments,
                });
            }
            _ => {
                for e in &errors {
                    warn!("Manifest {}", e);
                }
                manifest.row_errors.extend(errors);
            }
        }
    }

    info!(
        "Manifest: {} valid rows, {} row errors",
        manifest.records.len(),
        manifest.row_errors.len()
    );
    Ok(manifest)
}

fn csv_error(e: csv::Error) -> ManifestError {
    ManifestError::Csv {
        line: e.position().map(|p| p.line()).unwrap_or(0),
        detail: e.to_string(),
    }
}

fn parse_grade(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|g| g.is_finite())
}

/// Resolve `raw` against `root`, then check existence and extension.
fn resolve_attachment(kind: AttachmentKind, raw: &str, root: &Path) -> Result<PathBuf, RowErrorKind> {
    let given = PathBuf::from(raw);
    let joined = if given.is_absolute() {
        given
    } else {
        root.join(given)
    };
    let path = std::path::absolute(&joined).unwrap_or(joined);

    if !path.is_file() {
        return Err(RowErrorKind::FileNotFound(path));
    }

    let ext_ok = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| kind.extensions().iter().any(|x| e.eq_ignore_ascii_case(x)))
        .unwrap_or(false);
    if !ext_ok {
        let expected = match kind.format() {
            SourceFormat::Markdown => "Markdown (.md)",
            SourceFormat::Pdf => "PDF (.pdf)",
        };
        return Err(RowErrorKind::WrongExtension {
            path,
            expected: expected.to_string(),
        });
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, ManifestOptions) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("eval.md"), "# Feedback\n").unwrap();
        fs::write(dir.path().join("eval.pdf"), b"%PDF-1.4\n%%EOF\n").unwrap();
        fs::write(dir.path().join("scan.pdf"), b"%PDF-1.4\n%%EOF\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();
        let opts = ManifestOptions::new(dir.path());
        (dir, opts)
    }

    #[test]
    fn parses_minimal_manifest() {
        let (_d, opts) = fixture();
        let m = parse_manifest("student_id,grade\n12345,85\n678,92.5\n", &opts).unwrap();
        assert!(m.is_clean());
        assert_eq!(m.records.len(), 2);
        assert_eq!(m.records[0].line, 2);
        assert_eq!(m.records[0].posted_grade(), "85");
        assert_eq!(m.records[1].posted_grade(), "92.5");
        assert!(m.records[0].attachments.is_empty());
    }

    #[test]
    fn missing_required_column_is_structural() {
        let (_d, opts) = fixture();
        let err = parse_manifest("student_id,comment\n1,hi\n", &opts).unwrap_err();
        assert!(matches!(err, ManifestError::MissingColumn { ref column } if column == "grade"));
    }

    #[test]
    fn unknown_and_duplicate_columns_are_structural() {
        let (_d, opts) = fixture();
        let err = parse_manifest("student_id,grade,score\n1,2,3\n", &opts).unwrap_err();
        assert!(matches!(err, ManifestError::UnknownColumn { .. }));

        let err = parse_manifest("student_id,canvas_id,grade\n1,1,2\n", &opts).unwrap_err();
        assert!(matches!(err, ManifestError::DuplicateColumn { .. }));
    }

    #[test]
    fn empty_manifest_is_structural() {
        let (_d, opts) = fixture();
        assert!(matches!(
            parse_manifest("", &opts).unwrap_err(),
            ManifestError::Empty
        ));
    }

    #[test]
    fn non_numeric_grade_is_row_error_and_rest_continues() {
        let (_d, opts) = fixture();
        let m = parse_manifest("student_id,grade\n1,N/A\n2,70\n", &opts).unwrap();
        assert_eq!(m.records.len(), 1);
        assert_eq!(m.records[0].student_id, "2");
        assert_eq!(m.row_errors.len(), 1);
        let e = &m.row_errors[0];
        assert_eq!(e.line, 2);
        assert_eq!(e.column, "grade");
        assert_eq!(e.kind, RowErrorKind::InvalidGrade("N/A".into()));
    }

    #[test]
    fn aliases_are_accepted() {
        let (_d, opts) = fixture();
        let m = parse_manifest("Canvas_ID,grade,comments\n7,10,Nice\n", &opts).unwrap();
        assert_eq!(m.records[0].student_id, "7");
        assert_eq!(m.records[0].comment.as_deref(), Some("Nice"));
    }

    #[test]
    fn relative_paths_resolve_against_root() {
        let (dir, opts) = fixture();
        let m = parse_manifest("student_id,grade,md_eval_file\n1,5,eval.md\n", &opts).unwrap();
        let att = &m.records[0].attachments[0];
        assert_eq!(att.kind, AttachmentKind::MarkdownEval);
        assert!(att.path.is_absolute());
        assert_eq!(att.path.file_name().unwrap(), "eval.md");
        assert!(att.path.starts_with(std::path::absolute(dir.path()).unwrap()));
    }

    #[test]
    fn missing_file_and_wrong_extension_are_row_errors() {
        let (_d, opts) = fixture();
        let m = parse_manifest(
            "student_id,grade,pdf_eval_file,md_exam_file1\n1,5,missing.pdf,\n2,5,,notes.txt\n",
            &opts,
        )
        .unwrap();
        assert!(m.records.is_empty());
        assert!(matches!(m.row_errors[0].kind, RowErrorKind::FileNotFound(_)));
        assert!(matches!(
            m.row_errors[1].kind,
            RowErrorKind::WrongExtension { .. }
        ));
    }

    #[test]
    fn both_eval_formats_is_row_error() {
        let (_d, opts) = fixture();
        let m = parse_manifest(
            "student_id,grade,md_eval_file,pdf_eval_file\n1,5,eval.md,eval.pdf\n",
            &opts,
        )
        .unwrap();
        assert!(m.records.is_empty());
        assert_eq!(m.row_errors[0].kind, RowErrorKind::AmbiguousEvalFormat);
    }

    #[test]
    fn exam_slots_are_independent() {
        let (_d, opts) = fixture();
        let m = parse_manifest(
            "student_id,grade,pdf_exam_file1,md_exam_file1,md_eval_file\n1,5,scan.pdf,eval.md,eval.md\n",
            &opts,
        )
        .unwrap();
        assert!(m.is_clean());
        let kinds: Vec<AttachmentKind> = m.records[0].attachments.iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![
                AttachmentKind::MarkdownExam1,
                AttachmentKind::PdfExam1,
                AttachmentKind::MarkdownEval
            ]
        );
    }

    #[test]
    fn duplicate_student_reported_on_later_row() {
        let (_d, opts) = fixture();
        let m = parse_manifest("student_id,grade\n1,5\n1,6\n", &opts).unwrap();
        assert_eq!(m.records.len(), 1);
        assert_eq!(
            m.row_errors[0].kind,
            RowErrorKind::DuplicateStudent("1".into(), 2)
        );
    }

    #[test]
    fn executable_gate() {
        let (_d, opts) = fixture();
        let m = parse_manifest("student_id,grade\n1,x\n2,5\n", &opts).unwrap();
        assert!(matches!(
            m.clone().into_executable(false),
            Err(CanvasError::InvalidRows {
                invalid: 1,
                valid: 1
            })
        ));
        assert_eq!(m.into_executable(true).unwrap().len(), 1);
    }

    #[test]
    fn latin1_and_bom_decoding() {
        let bytes = b"student_id,grade,comment\n1,5,Tr\xe8s bien\n";
        let text = Encoding::Latin1.decode(bytes).unwrap();
        assert!(text.contains("Très bien"));

        let with_bom = "\u{feff}student_id,grade\n1,5\n";
        let text = Encoding::Utf8.decode(with_bom.as_bytes()).unwrap();
        assert!(text.starts_with("student_id"));
        assert!(Encoding::Utf8.decode(b"\xff\xfe").is_err());
        assert_eq!("LATIN1".parse::<Encoding>().unwrap(), Encoding::Latin1);
    }
}
