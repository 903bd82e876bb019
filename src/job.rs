use crate::error::ErrorKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Output formats the pipeline can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Pdf,
    Docx,
    Csv,
    #[serde(rename = "txt")]
    #[value(name = "txt")]
    Text,
}

impl Format {
    pub fn extension(self) -> &'static str {
        match self {
            Format::Pdf => "pdf",
            Format::Docx => "docx",
            Format::Csv => "csv",
            Format::Text => "txt",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// What kind of document the input is, judged by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    Pdf,
    WordLike,
    Spreadsheet,
    Markup,
    PlainText,
}

impl SourceKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(SourceKind::Pdf),
            "doc" | "docx" | "odt" | "rtf" => Some(SourceKind::WordLike),
            "xls" | "xlsx" | "ods" | "csv" => Some(SourceKind::Spreadsheet),
            "html" | "htm" => Some(SourceKind::Markup),
            "txt" => Some(SourceKind::PlainText),
            _ => None,
        }
    }
}

/// A supported (source, target) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Conversion {
    RenderToPdf,
    PdfToWord,
    PdfToTable,
    PdfToText,
}

impl Conversion {
    pub fn resolve(source: SourceKind, target: Format) -> Option<Self> {
        match (source, target) {
            (SourceKind::Pdf, Format::Docx) => Some(Conversion::PdfToWord),
            (SourceKind::Pdf, Format::Csv) => Some(Conversion::PdfToTable),
            (SourceKind::Pdf, Format::Text) => Some(Conversion::PdfToText),
            (SourceKind::Pdf, Format::Pdf) => None,
            (_, Format::Pdf) => Some(Conversion::RenderToPdf),
            _ => None,
        }
    }

    /// Only PDF inputs are inspected for a text layer.
    pub fn needs_classification(self) -> bool {
        !matches!(self, Conversion::RenderToPdf)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocKind {
    Unknown,
    TextBased,
    ImageBased,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Running,
    /// `soft` marks a placeholder result: the job finished without error but
    /// carries no extracted content.
    Succeeded { soft: bool },
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionJob {
    pub job_id: String,
    pub input_path: PathBuf,
    pub target_format: Format,
    pub detected_kind: DocKind,
    pub status: JobStatus,
}

impl ConversionJob {
    pub fn new(job_id: String, input_path: &Path, target_format: Format) -> Self {
        Self {
            job_id,
            input_path: input_path.to_path_buf(),
            target_format,
            detected_kind: DocKind::Unknown,
            status: JobStatus::Pending,
        }
    }
}

/// What one engine invocation produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionResult {
    pub success: bool,
    pub output_path: Option<PathBuf>,
    pub error_kind: Option<ErrorKind>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl ConversionResult {
    pub fn produced(output_path: &Path) -> Self {
        Self {
            success: true,
            output_path: Some(output_path.to_path_buf()),
            error_kind: None,
            detail: None,
        }
    }

    pub fn failed(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            success: false,
            output_path: None,
            error_kind: Some(kind),
            detail: Some(detail.into()),
        }
    }

    /// Folds an internal engine error into the shared taxonomy.
    pub fn from_result(output_path: &Path, res: anyhow::Result<()>) -> Self {
        match res {
            Ok(()) => Self::produced(output_path),
            Err(err) => Self::failed(ErrorKind::EngineFailure, format!("{err:#}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded { bytes: u64 },
    Failed { kind: ErrorKind, detail: String },
}

/// Bookkeeping for one strategy attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineAttempt {
    pub strategy: crate::policy::Strategy,
    pub started_at: String,
    pub elapsed_ms: u64,
    pub outcome: AttemptOutcome,
}

impl EngineAttempt {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Succeeded { .. })
    }
}

/// Cooperative cancellation flag shared between a job and whoever drives it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
pub struct JobOptions {
    pub cancel: CancelToken,
    /// Overrides `engine.ocr_language` for this job.
    pub ocr_language: Option<String>,
    /// Base name of the delivered artifact; defaults to the input stem.
    pub output_name: Option<String>,
}
