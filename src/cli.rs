use crate::{
    config::Config,
    engine::{Backend, tools::ToolBackend},
    job::{Format, JobOptions},
    pages::PageEdit,
    pipeline::{JobOutput, Pipeline},
    resources::ResourceManager,
    util::ensure_dir,
};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "docsmith")]
#[command(about = "Document conversion orchestrator with engine fallback and artifact validation")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./docsmith.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Report which external tools are reachable.
    Doctor {},
    /// Decide whether a PDF has a usable text layer.
    Classify {
        #[arg(long)]
        input: PathBuf,
    },
    /// Show the strategy chain a conversion would run.
    Plan {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, value_enum)]
        to: Format,
    },
    Convert {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, value_enum)]
        to: Format,
        /// Where to write the result; defaults to the input path with the
        /// target extension.
        #[arg(long)]
        out: Option<PathBuf>,
        /// Write the job report JSON here.
        #[arg(long)]
        report: Option<PathBuf>,
        #[arg(long)]
        ocr_language: Option<String>,
    },
    Pages {
        #[command(subcommand)]
        op: PagesOp,
    },
    /// Delete expired files under the work and output roots.
    Sweep {},
}

#[derive(Subcommand, Debug)]
pub enum PagesOp {
    Extract {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        pages: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    Remove {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        pages: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    Rotate {
        #[arg(long)]
        input: PathBuf,
        /// Pages to rotate; all when omitted.
        #[arg(long)]
        pages: Option<String>,
        #[arg(long, default_value_t = 90, allow_negative_numbers = true)]
        degrees: i64,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Rewrite pages in a new order, e.g. `--order 3,1,2`.
    Reorder {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        order: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// One PDF per page.
    Split {
        #[arg(long)]
        input: PathBuf,
        /// Defaults to `<input stem>-pages/` next to the input.
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Concatenate PDFs in the order given (repeat `--input`).
    Merge {
        #[arg(long = "input", required = true)]
        inputs: Vec<PathBuf>,
        #[arg(long)]
        out: PathBuf,
    },
}

impl PagesOp {
    /// Single-input edits; `None` for split and merge.
    fn as_edit(&self) -> Option<(&Path, PageEdit, Option<&Path>)> {
        let edit = match self {
            PagesOp::Extract { input, pages, out } => (
                input.as_path(),
                PageEdit::Extract {
                    pages: pages.clone(),
                },
                out.as_deref(),
            ),
            PagesOp::Remove { input, pages, out } => (
                input.as_path(),
                PageEdit::Remove {
                    pages: pages.clone(),
                },
                out.as_deref(),
            ),
            PagesOp::Rotate {
                input,
                pages,
                degrees,
                out,
            } => (
                input.as_path(),
                PageEdit::Rotate {
                    pages: pages.clone(),
                    degrees: *degrees,
                },
                out.as_deref(),
            ),
            PagesOp::Reorder { input, order, out } => (
                input.as_path(),
                PageEdit::Reorder {
                    order: order.clone(),
                },
                out.as_deref(),
            ),
            PagesOp::Split { .. } | PagesOp::Merge { .. } => return None,
        };
        Some(edit)
    }
}

pub fn dispatch(args: Args) -> Result<()> {
    let cfg = match resolve_config_path(args.config.as_deref())? {
        Some(path) => Config::load(&path)?,
        None => Config::default(),
    };
    let log_path = resolve_log_path(&cfg);
    let _guard = init_logging(&args, &cfg, log_path.as_deref())?;

    match &args.cmd {
        Command::Doctor {} => doctor(&cfg),
        Command::Classify { input } => classify(&cfg, input),
        Command::Plan { input, to } => plan(&cfg, input, *to),
        Command::Convert {
            input,
            to,
            out,
            report,
            ocr_language,
        } => {
            let options = JobOptions {
                ocr_language: ocr_language.clone(),
                ..JobOptions::default()
            };
            with_pipeline(&cfg, |pipeline| {
                let output = pipeline.submit(input, *to, &options)?;
                let dest = out
                    .clone()
                    .unwrap_or_else(|| input.with_extension(to.extension()));
                finish(pipeline, &output, &dest, report.as_deref())
            })
        }
        Command::Pages { op } => with_pipeline(&cfg, |pipeline| pages(pipeline, op)),
        Command::Sweep {} => {
            let resources = ResourceManager::from_config(&cfg)?;
            let report = resources.sweep();
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

/// `--config`, then ./docsmith.toml, then ./docsmith.example.toml, then
/// built-in defaults.
fn resolve_config_path(user: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(p) = user {
        if !p.exists() {
            return Err(anyhow!("config not found: {}", p.display()));
        }
        return Ok(Some(p.to_path_buf()));
    }
    for candidate in ["docsmith.toml", "docsmith.example.toml"] {
        let p = PathBuf::from(candidate);
        if p.exists() {
            return Ok(Some(p));
        }
    }
    Ok(None)
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries command output; logs go to stderr
    let stderr_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn resolve_log_path(cfg: &Config) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }
    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }
    Some(PathBuf::from(&cfg.paths.work_dir).join("docsmith.log"))
}

fn with_pipeline<F>(cfg: &Config, f: F) -> Result<()>
where
    F: FnOnce(&Pipeline<ToolBackend>) -> Result<()>,
{
    let backend = ToolBackend::new(cfg)?;
    let resources = ResourceManager::from_config(cfg)?;
    let _sweeper = if cfg.global.background_sweep {
        Some(resources.start_sweeper()?)
    } else {
        None
    };
    let pipeline = Pipeline::new(cfg, backend, resources);
    f(&pipeline)
}

fn doctor(cfg: &Config) -> Result<()> {
    let backend = ToolBackend::new(cfg)?;
    let diag = backend.doctor()?;
    println!("{}", serde_json::to_string_pretty(&diag)?);
    Ok(())
}

fn classify(cfg: &Config, input: &Path) -> Result<()> {
    with_pipeline(cfg, |pipeline| {
        let classification = pipeline.classify(input)?;
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "input": input,
                "classification": classification,
            }))?
        );
        Ok(())
    })
}

fn plan(cfg: &Config, input: &Path, to: Format) -> Result<()> {
    with_pipeline(cfg, |pipeline| {
        let plan = pipeline.plan(input, to)?;
        println!("{}", serde_json::to_string_pretty(&plan)?);
        Ok(())
    })
}

fn pages<B: Backend>(pipeline: &Pipeline<B>, op: &PagesOp) -> Result<()> {
    let options = JobOptions::default();
    match op {
        PagesOp::Merge { inputs, out } => {
            let output = pipeline.merge_pages(inputs, &options)?;
            finish(pipeline, &output, out, None)
        }
        PagesOp::Split { input, out_dir } => {
            let split = pipeline.split_pages(input, &options)?;
            let dir = out_dir.clone().unwrap_or_else(|| pages_dir(input));
            ensure_dir(&dir)?;
            let width = split.pages.len().to_string().len();
            let mut written = Vec::with_capacity(split.pages.len());
            for (i, page) in split.pages.iter().enumerate() {
                let dest = dir.join(format!("page-{:0width$}.pdf", i + 1));
                std::fs::copy(page, &dest)
                    .with_context(|| format!("copy {} -> {}", page.display(), dest.display()))?;
                written.push(dest);
            }
            info!("wrote {} pages to {}", written.len(), dir.display());
            if pipeline.config().global.print_summary {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "job_id": split.job.job_id,
                        "pages": written,
                        "status": split.job.status,
                    }))?
                );
            }
            Ok(())
        }
        other => {
            let (input, edit, out) = other
                .as_edit()
                .ok_or_else(|| anyhow!("not a page edit: {other:?}"))?;
            let output = pipeline.edit_pages(input, &edit, &options)?;
            let dest = out
                .map(Path::to_path_buf)
                .unwrap_or_else(|| edited_name(input));
            finish(pipeline, &output, &dest, None)
        }
    }
}

fn pages_dir(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document");
    input.with_file_name(format!("{stem}-pages"))
}

fn edited_name(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document");
    input.with_file_name(format!("{stem}-edited.pdf"))
}

/// The delivered artifact is scheduled for deletion, so it is copied to
/// `dest` before this returns.
fn finish<B: Backend>(
    pipeline: &Pipeline<B>,
    output: &JobOutput,
    dest: &Path,
    report: Option<&Path>,
) -> Result<()> {
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir(parent)?;
    }
    std::fs::copy(&output.output_path, dest).with_context(|| {
        format!(
            "copy {} -> {}",
            output.output_path.display(),
            dest.display()
        )
    })?;
    info!("wrote {}", dest.display());

    if let Some(path) = report {
        std::fs::write(path, serde_json::to_string_pretty(&output.report)?)
            .with_context(|| format!("write report: {}", path.display()))?;
    }

    if pipeline.config().global.print_summary {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "job_id": output.job.job_id,
                "output": dest,
                "engine": output.engine,
                "soft_failure": output.soft_failure,
                "status": output.job.status,
            }))?
        );
    }
    Ok(())
}
