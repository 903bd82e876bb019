pub mod ocr;
pub mod placeholder;
pub mod renderer;
pub mod structural;
pub mod tables;
pub mod tools;
pub mod types;
pub mod writer;

use crate::job::{ConversionResult, Format, JobOptions};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use types::{TextMode, ToolDiag};

/// External capabilities the engines are built on: a text layer, a document
/// renderer, a page rasterizer and OCR.
pub trait Backend: Send + Sync {
    fn doctor(&self) -> Result<Vec<ToolDiag>> {
        Ok(Vec::new())
    }

    /// Text layer, one entry per page.
    fn extract_pages(&self, doc: &Path, mode: TextMode) -> Result<Vec<String>>;

    fn extract_text(&self, doc: &Path) -> Result<String> {
        Ok(self.extract_pages(doc, TextMode::Reading)?.join("\n"))
    }

    /// Renders `input` as `target` into `out_dir`. Any non-zero exit or a
    /// timeout is an error.
    fn render(&self, input: &Path, target: Format, out_dir: &Path, timeout: Duration)
    -> Result<()>;

    /// One image per page, in page order.
    fn rasterize(&self, doc: &Path, dpi: u32, out_dir: &Path) -> Result<Vec<PathBuf>>;

    fn recognize(&self, page_image: &Path, language: &str) -> Result<String>;
}

impl<B: Backend + ?Sized> Backend for &B {
    fn doctor(&self) -> Result<Vec<ToolDiag>> {
        (**self).doctor()
    }
    fn extract_pages(&self, doc: &Path, mode: TextMode) -> Result<Vec<String>> {
        (**self).extract_pages(doc, mode)
    }
    fn extract_text(&self, doc: &Path) -> Result<String> {
        (**self).extract_text(doc)
    }
    fn render(
        &self,
        input: &Path,
        target: Format,
        out_dir: &Path,
        timeout: Duration,
    ) -> Result<()> {
        (**self).render(input, target, out_dir, timeout)
    }
    fn rasterize(&self, doc: &Path, dpi: u32, out_dir: &Path) -> Result<Vec<PathBuf>> {
        (**self).rasterize(doc, dpi, out_dir)
    }
    fn recognize(&self, page_image: &Path, language: &str) -> Result<String> {
        (**self).recognize(page_image, language)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineKind {
    StructuralExtractor,
    ExternalRenderer,
    OcrReconstructor,
    PlaceholderNotice,
}

/// Everything an engine may touch for one attempt. Engines read `input`,
/// write `output`, and may use `scratch` for intermediates.
pub struct EngineRequest<'a> {
    pub input: &'a Path,
    pub output: &'a Path,
    pub scratch: &'a Path,
    pub target: Format,
    pub options: &'a JobOptions,
}

/// One conversion strategy. Implementations never delete their input, only
/// write under `output`/`scratch`, and can be re-run on the same job.
pub trait ConversionEngine {
    fn kind(&self) -> EngineKind;
    fn convert(&self, req: &EngineRequest<'_>) -> ConversionResult;
}
