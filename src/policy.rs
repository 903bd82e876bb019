use crate::{
    config::Config,
    job::{Conversion, DocKind},
};
use serde::{Deserialize, Serialize};

/// One step of a fallback chain: an engine variant plus its mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    Structural,
    StructuralTables,
    Renderer,
    Ocr,
    OcrLines,
    Placeholder,
}

impl Strategy {
    pub fn slug(self) -> &'static str {
        match self {
            Strategy::Structural => "structural",
            Strategy::StructuralTables => "structural-tables",
            Strategy::Renderer => "renderer",
            Strategy::Ocr => "ocr",
            Strategy::OcrLines => "ocr-lines",
            Strategy::Placeholder => "placeholder",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyPlan {
    pub conversion: Conversion,
    pub kind: DocKind,
    pub strategies: Vec<Strategy>,
}

/// Ordered fallback chain for a conversion. Image-based (or unclassified)
/// PDFs never go through structural extraction for document output.
pub fn plan(cfg: &Config, conversion: Conversion, kind: DocKind) -> StrategyPlan {
    let text_based = kind == DocKind::TextBased;

    let strategies = match conversion {
        Conversion::RenderToPdf => vec![Strategy::Renderer],
        Conversion::PdfToWord if text_based => {
            if cfg.policy.word_fallback_to_renderer {
                vec![Strategy::Structural, Strategy::Renderer]
            } else {
                vec![Strategy::Structural]
            }
        }
        Conversion::PdfToWord => vec![Strategy::Ocr],
        Conversion::PdfToText if text_based => vec![Strategy::Structural, Strategy::Ocr],
        Conversion::PdfToText => vec![Strategy::Ocr],
        Conversion::PdfToTable => {
            let mut s = vec![Strategy::StructuralTables, Strategy::OcrLines];
            if cfg.policy.allow_placeholder {
                s.push(Strategy::Placeholder);
            }
            s
        }
    };

    StrategyPlan {
        conversion,
        kind,
        strategies,
    }
}
