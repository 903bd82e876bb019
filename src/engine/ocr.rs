use super::{
    Backend, ConversionEngine, EngineKind, EngineRequest,
    writer::{self, PageJoin},
};
use crate::{config::Config, job::ConversionResult, job::Format, postprocess, util};
use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, info};

/// Rasterizes every page and runs OCR on each image once.
pub struct OcrReconstructor<'a, B: Backend> {
    cfg: &'a Config,
    backend: &'a B,
    lines: bool,
}

impl<'a, B: Backend> OcrReconstructor<'a, B> {
    pub fn document(cfg: &'a Config, backend: &'a B) -> Self {
        Self {
            cfg,
            backend,
            lines: false,
        }
    }

    /// Each recognized line becomes one row of a single-column table.
    pub fn lines(cfg: &'a Config, backend: &'a B) -> Self {
        Self {
            cfg,
            backend,
            lines: true,
        }
    }

    fn recognize_pages(&self, req: &EngineRequest<'_>) -> Result<Vec<String>> {
        let pages_dir = req.scratch.join("pages");
        util::ensure_dir(&pages_dir)?;

        let images = self
            .backend
            .rasterize(req.input, self.cfg.engine.ocr_dpi, &pages_dir)
            .context("rasterization failed")?;
        if images.is_empty() {
            bail!("no pages rasterized from {}", req.input.display());
        }
        info!("ocr: {} pages at {} dpi", images.len(), self.cfg.engine.ocr_dpi);

        let language = req
            .options
            .ocr_language
            .as_deref()
            .unwrap_or(&self.cfg.engine.ocr_language);

        let mut pages = Vec::with_capacity(images.len());
        for (i, image) in images.iter().enumerate() {
            let text = self
                .backend
                .recognize(image, language)
                .with_context(|| format!("ocr failed on page {}", i + 1))?;
            debug!("ocr page {} -> {} chars", i + 1, text.len());
            pages.push(postprocess::normalize_page(self.cfg, &text));
        }
        Ok(pages)
    }

    fn run(&self, req: &EngineRequest<'_>) -> Result<()> {
        let pages = self.recognize_pages(req)?;
        let marker = &self.cfg.engine.page_break_marker;

        if self.lines {
            let rows: Vec<Vec<String>> = pages
                .iter()
                .flat_map(|p| postprocess::text_lines(p))
                .map(|l| vec![l])
                .collect();
            if rows.is_empty() {
                bail!("ocr recognized no lines");
            }
            return writer::write_rows(req.output, &rows);
        }

        match req.target {
            Format::Docx => writer::write_docx(req.output, &pages, &PageJoin::Marker(marker.clone())),
            Format::Text => writer::write_text(req.output, &pages, marker),
            other => Err(anyhow!("ocr reconstruction cannot produce {other}")),
        }
    }
}

impl<B: Backend> ConversionEngine for OcrReconstructor<'_, B> {
    fn kind(&self) -> EngineKind {
        EngineKind::OcrReconstructor
    }

    fn convert(&self, req: &EngineRequest<'_>) -> ConversionResult {
        ConversionResult::from_result(req.output, self.run(req))
    }
}
