use crate::{config::Config, engine::Backend, job::DocKind, postprocess};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub kind: DocKind,
    /// Trimmed length of the extracted text layer.
    pub text_chars: usize,
    pub forced: bool,
    /// Set when the text layer could not be read; the verdict is then
    /// `ImageBased`.
    #[serde(default)]
    pub error: Option<String>,
}

/// Whole-document heuristic: a text layer longer than
/// `classification.min_text_chars` means text-based, anything else
/// (including an extraction error) means image-based.
pub fn classify(cfg: &Config, backend: &dyn Backend, input: &Path) -> Classification {
    if let Some(kind) = forced(cfg) {
        return Classification {
            kind,
            text_chars: 0,
            forced: true,
            error: None,
        };
    }

    match backend.extract_text(input) {
        Ok(text) => {
            let text_chars = postprocess::trimmed_char_count(&text);
            let kind = if text_chars > cfg.classification.min_text_chars {
                DocKind::TextBased
            } else {
                DocKind::ImageBased
            };
            info!("classified {} as {:?} ({} chars)", input.display(), kind, text_chars);
            Classification {
                kind,
                text_chars,
                forced: false,
                error: None,
            }
        }
        Err(err) => {
            warn!(
                "text layer extraction failed for {}; assuming image-based: {err:#}",
                input.display()
            );
            Classification {
                kind: DocKind::ImageBased,
                text_chars: 0,
                forced: false,
                error: Some(format!("{err:#}")),
            }
        }
    }
}

fn forced(cfg: &Config) -> Option<DocKind> {
    match cfg.classification.forced_kind.to_ascii_uppercase().as_str() {
        "TEXT" => Some(DocKind::TextBased),
        "IMAGE" => Some(DocKind::ImageBased),
        _ => None,
    }
}
