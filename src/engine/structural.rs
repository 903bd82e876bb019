use super::{
    Backend, ConversionEngine, EngineKind, EngineRequest, TextMode, tables::detect_tables,
    writer::{self, PageJoin},
};
use crate::{config::Config, job::ConversionResult, job::Format, postprocess};
use anyhow::{Context, Result, anyhow, bail};
use tracing::debug;

/// Rebuilds the output from the input's own text layer, without rendering.
pub struct StructuralExtractor<'a, B: Backend> {
    cfg: &'a Config,
    backend: &'a B,
    tables: bool,
}

impl<'a, B: Backend> StructuralExtractor<'a, B> {
    pub fn document(cfg: &'a Config, backend: &'a B) -> Self {
        Self {
            cfg,
            backend,
            tables: false,
        }
    }

    pub fn tables(cfg: &'a Config, backend: &'a B) -> Self {
        Self {
            cfg,
            backend,
            tables: true,
        }
    }

    fn convert_document(&self, req: &EngineRequest<'_>) -> Result<()> {
        let raw = self
            .backend
            .extract_pages(req.input, TextMode::Reading)
            .context("text layer extraction failed")?;
        let pages: Vec<String> = raw
            .iter()
            .map(|p| postprocess::normalize_page(self.cfg, p))
            .collect();
        if pages.iter().all(|p| p.trim().is_empty()) {
            bail!("document has no text layer");
        }
        debug!("structural: {} pages of text", pages.len());

        match req.target {
            Format::Docx => writer::write_docx(req.output, &pages, &PageJoin::HardBreak),
            Format::Text => writer::write_text(req.output, &pages, &self.cfg.engine.page_break_marker),
            other => Err(anyhow!("structural extraction cannot produce {other}")),
        }
    }

    fn convert_tables(&self, req: &EngineRequest<'_>) -> Result<()> {
        let pages = self
            .backend
            .extract_pages(req.input, TextMode::Layout)
            .context("layout text extraction failed")?;

        let mut rows = Vec::new();
        for (i, page) in pages.iter().enumerate() {
            let page_no = i + 1;
            for table in detect_tables(
                page,
                page_no,
                self.cfg.tables.min_columns,
                self.cfg.tables.min_rows,
            ) {
                for cells in table.rows {
                    let mut row = Vec::with_capacity(cells.len() + 1);
                    row.push(page_no.to_string());
                    row.extend(cells);
                    rows.push(row);
                }
            }
        }
        if rows.is_empty() {
            bail!("no tables found in {} pages", pages.len());
        }
        debug!("structural: {} table rows", rows.len());
        writer::write_rows(req.output, &rows)
    }
}

impl<B: Backend> ConversionEngine for StructuralExtractor<'_, B> {
    fn kind(&self) -> EngineKind {
        EngineKind::StructuralExtractor
    }

    fn convert(&self, req: &EngineRequest<'_>) -> ConversionResult {
        let res = if self.tables {
            self.convert_tables(req)
        } else {
            self.convert_document(req)
        };
        ConversionResult::from_result(req.output, res)
    }
}
