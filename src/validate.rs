//! Post-conversion artifact checks.
//!
//! Engines can report success while leaving an empty or truncated file
//! behind, so every artifact is checked here before it is accepted.
//! Validation only reads the file.

use crate::{config::Validation, job::Format};
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationFailure {
    #[error("output missing: '{path}'")]
    Missing { path: PathBuf },

    #[error("output is not a regular file: '{path}'")]
    NotAFile { path: PathBuf },

    #[error("output too small: '{path}' is {size} bytes, {format} needs at least {min}")]
    TooSmall {
        path: PathBuf,
        format: Format,
        size: u64,
        min: u64,
    },

    #[error("output '{path}' does not look like {format}")]
    BadSignature { path: PathBuf, format: Format },
}

/// Returns the artifact size on success.
pub fn validate(path: &Path, format: Format, rules: &Validation) -> Result<u64, ValidationFailure> {
    let meta = std::fs::metadata(path).map_err(|_| ValidationFailure::Missing {
        path: path.to_path_buf(),
    })?;
    if !meta.is_file() {
        return Err(ValidationFailure::NotAFile {
            path: path.to_path_buf(),
        });
    }

    let size = meta.len();
    let min = rules.min_bytes(format);
    if size < min {
        return Err(ValidationFailure::TooSmall {
            path: path.to_path_buf(),
            format,
            size,
            min,
        });
    }

    if rules.check_signature {
        if let Some(magic) = signature(format) {
            if !starts_with(path, magic) {
                return Err(ValidationFailure::BadSignature {
                    path: path.to_path_buf(),
                    format,
                });
            }
        }
    }

    Ok(size)
}

fn signature(format: Format) -> Option<&'static [u8]> {
    match format {
        Format::Pdf => Some(b"%PDF"),
        Format::Docx => Some(b"PK\x03\x04"),
        Format::Csv | Format::Text => None,
    }
}

fn starts_with(path: &Path, magic: &[u8]) -> bool {
    let mut buf = vec![0u8; magic.len()];
    std::fs::File::open(path)
        .and_then(|mut f| f.read_exact(&mut buf))
        .map(|_| buf == magic)
        .unwrap_or(false)
}
