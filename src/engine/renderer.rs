use super::{Backend, ConversionEngine, EngineKind, EngineRequest};
use crate::{config::Config, job::ConversionResult, util};
use anyhow::{Context, Result, anyhow};
use std::path::PathBuf;
use tracing::debug;

/// Delegates to the external document renderer.
pub struct ExternalRenderer<'a, B: Backend> {
    cfg: &'a Config,
    backend: &'a B,
}

impl<'a, B: Backend> ExternalRenderer<'a, B> {
    pub fn new(cfg: &'a Config, backend: &'a B) -> Self {
        Self { cfg, backend }
    }

    fn run(&self, req: &EngineRequest<'_>) -> Result<()> {
        let render_dir = req.scratch.join("render");
        util::ensure_dir(&render_dir)?;

        self.backend
            .render(req.input, req.target, &render_dir, self.cfg.engine.timeout())
            .with_context(|| format!("rendering {} as {}", req.input.display(), req.target))?;

        let produced = find_output(&render_dir, req.target.extension())?;
        debug!("renderer produced {}", produced.display());
        util::move_file(&produced, req.output)
            .with_context(|| format!("moving {} to {}", produced.display(), req.output.display()))
    }
}

/// The renderer names its output after the input; pick the first file with
/// the requested extension.
fn find_output(dir: &std::path::Path, ext: &str) -> Result<PathBuf> {
    let mut found: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("read_dir {}", dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|s| s.eq_ignore_ascii_case(ext))
        })
        .collect();
    found.sort();
    found
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("renderer exited cleanly but produced no .{ext} file"))
}

impl<B: Backend> ConversionEngine for ExternalRenderer<'_, B> {
    fn kind(&self) -> EngineKind {
        EngineKind::ExternalRenderer
    }

    fn convert(&self, req: &EngineRequest<'_>) -> ConversionResult {
        ConversionResult::from_result(req.output, self.run(req))
    }
}
