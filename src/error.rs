//! Error taxonomy shared by the dispatcher, the engines and the caller.
//!
//! Engine and classification failures are recovered inside the pipeline and
//! only show up as [`ErrorKind`] tags on individual attempts. What escapes
//! to the caller is a [`ConvertError`].

use crate::job::Format;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Classification of a failure, attached to attempts and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    InputMissing,
    UnsupportedConversion,
    ClassificationFailure,
    EngineFailure,
    ValidationFailure,
    ExhaustedFailed,
    PageSpecInvalid,
    InvalidOption,
    Cancelled,
    ResourceFailure,
}

/// Errors surfaced to the caller of a job.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("input not found or empty: '{path}'")]
    InputMissing { path: PathBuf },

    #[error("unsupported conversion: {source_kind} -> {target}")]
    UnsupportedConversion { source_kind: String, target: Format },

    /// Every planned strategy failed or produced an invalid artifact.
    #[error("all {attempts} strategies failed ({kind:?}); last error: {detail}")]
    ExhaustedFailed {
        attempts: usize,
        kind: ErrorKind,
        detail: String,
    },

    #[error("page selection '{spec}' selects no usable pages (document has {total} pages)")]
    PageSpecInvalid { spec: String, total: u32 },

    #[error("invalid option: {0}")]
    InvalidOption(String),

    #[error("job {job_id} was cancelled")]
    Cancelled { job_id: String },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConvertError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConvertError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ConvertError::InputMissing { .. } => ErrorKind::InputMissing,
            ConvertError::UnsupportedConversion { .. } => ErrorKind::UnsupportedConversion,
            ConvertError::ExhaustedFailed { .. } => ErrorKind::ExhaustedFailed,
            ConvertError::PageSpecInvalid { .. } => ErrorKind::PageSpecInvalid,
            ConvertError::InvalidOption(_) => ErrorKind::InvalidOption,
            ConvertError::Cancelled { .. } => ErrorKind::Cancelled,
            ConvertError::Io { .. } => ErrorKind::ResourceFailure,
        }
    }
}
