use super::{
    ConversionEngine, EngineKind, EngineRequest,
    writer::{self, PageJoin},
};
use crate::job::{ConversionResult, Format};
use anyhow::{Result, anyhow};

pub const NOTICE: &str = "No structured tables or text could be extracted from this PDF. \
It may be scanned or use tables without borders; try the OCR text conversion first.";

/// Terminal fallback: writes a single explanatory row instead of failing.
pub struct PlaceholderNotice;

impl PlaceholderNotice {
    fn run(&self, req: &EngineRequest<'_>) -> Result<()> {
        let notice = vec![NOTICE.to_string()];
        match req.target {
            Format::Csv => writer::write_rows(req.output, &[notice]),
            Format::Docx => writer::write_docx(req.output, &notice, &PageJoin::HardBreak),
            Format::Text => writer::write_text(req.output, &notice, ""),
            Format::Pdf => Err(anyhow!("no placeholder for pdf output")),
        }
    }
}

impl ConversionEngine for PlaceholderNotice {
    fn kind(&self) -> EngineKind {
        EngineKind::PlaceholderNotice
    }

    fn convert(&self, req: &EngineRequest<'_>) -> ConversionResult {
        ConversionResult::from_result(req.output, self.run(req))
    }
}
