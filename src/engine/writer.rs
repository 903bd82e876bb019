//! Serializers for the artifacts the in-process engines produce.

use anyhow::{Context, Result};
use docx_rs::{BreakType, Docx, Paragraph, Run};
use std::path::Path;

/// How consecutive pages are separated in a written document.
#[derive(Debug, Clone)]
pub enum PageJoin {
    /// Native page break, for documents rebuilt from a text layer.
    HardBreak,
    /// A literal separator line, for OCR output.
    Marker(String),
}

pub fn write_docx(path: &Path, pages: &[String], join: &PageJoin) -> Result<()> {
    let mut docx = Docx::new();
    for (i, page) in pages.iter().enumerate() {
        if i > 0 {
            docx = match join {
                PageJoin::HardBreak => docx
                    .add_paragraph(Paragraph::new().add_run(Run::new().add_break(BreakType::Page))),
                PageJoin::Marker(marker) => {
                    docx.add_paragraph(Paragraph::new().add_run(Run::new().add_text(marker)))
                }
            };
        }
        for line in page.lines() {
            docx = docx.add_paragraph(Paragraph::new().add_run(Run::new().add_text(line)));
        }
    }

    let file = std::fs::File::create(path)
        .with_context(|| format!("create docx: {}", path.display()))?;
    docx.build()
        .pack(file)
        .with_context(|| format!("pack docx: {}", path.display()))?;
    Ok(())
}

pub fn write_text(path: &Path, pages: &[String], marker: &str) -> Result<()> {
    let mut body = crate::postprocess::join_pages(pages, marker);
    body.push('\n');
    std::fs::write(path, body).with_context(|| format!("write text: {}", path.display()))
}

/// Rows may differ in width; each is written as-is.
pub fn write_rows(path: &Path, rows: &[Vec<String>]) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("create csv: {}", path.display()))?;
    for row in rows {
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    Ok(())
}
