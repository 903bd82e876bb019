use crate::{
    classify::{self, Classification},
    config::Config,
    engine::{
        Backend, ConversionEngine, EngineKind, EngineRequest, ocr::OcrReconstructor,
        placeholder::PlaceholderNotice, renderer::ExternalRenderer,
        structural::StructuralExtractor,
    },
    error::{ConvertError, ErrorKind},
    job::{
        AttemptOutcome, Conversion, ConversionJob, ConversionResult, DocKind, EngineAttempt,
        Format, JobOptions, JobStatus, SourceKind,
    },
    pages::{self, PageEdit, PageEditSummary},
    policy::{self, Strategy, StrategyPlan},
    report::JobReport,
    resources::{JobScope, ResourceManager},
    util::{new_job_id, now_rfc3339},
    validate,
};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, info_span, warn};

/// Owns the configuration, the capability backend and the resource manager,
/// and runs jobs against them. Jobs share nothing but the managed roots.
pub struct Pipeline<B: Backend> {
    cfg: Config,
    backend: B,
    resources: ResourceManager,
}

#[derive(Debug)]
pub struct JobOutput {
    pub job: ConversionJob,
    /// Delivered artifact; deleted after the configured delay.
    pub output_path: PathBuf,
    pub engine: Option<EngineKind>,
    /// The placeholder notice was all that could be produced.
    pub soft_failure: bool,
    pub report: JobReport,
}

/// Result of splitting a PDF: one delivered file per page, in page order.
#[derive(Debug)]
pub struct SplitOutput {
    pub job: ConversionJob,
    pub pages: Vec<PathBuf>,
    pub report: JobReport,
}

struct PageJob {
    job: ConversionJob,
    delivered: Vec<PathBuf>,
    report: JobReport,
}

struct Winner {
    strategy: Strategy,
    engine: EngineKind,
    path: PathBuf,
}

impl<B: Backend> Pipeline<B> {
    pub fn new(cfg: &Config, backend: B, resources: ResourceManager) -> Self {
        Self {
            cfg: cfg.clone(),
            backend,
            resources,
        }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn resources(&self) -> &ResourceManager {
        &self.resources
    }

    pub fn classify(&self, input: &Path) -> Result<Classification, ConvertError> {
        check_input(input)?;
        Ok(classify::classify(&self.cfg, &self.backend, input))
    }

    /// Strategy chain a job for `input` would run, without running it.
    pub fn plan(&self, input: &Path, target: Format) -> Result<StrategyPlan, ConvertError> {
        check_input(input)?;
        let conversion = resolve_conversion(input, target)?;
        let kind = if conversion.needs_classification() {
            classify::classify(&self.cfg, &self.backend, input).kind
        } else {
            DocKind::Unknown
        };
        Ok(policy::plan(&self.cfg, conversion, kind))
    }

    /// Converts `input` into `target`, trying each planned engine until one
    /// produces an artifact that passes validation.
    pub fn submit(
        &self,
        input: &Path,
        target: Format,
        options: &JobOptions,
    ) -> Result<JobOutput, ConvertError> {
        check_input(input)?;
        let conversion = resolve_conversion(input, target)?;

        let mut job = ConversionJob::new(new_job_id(), input, target);
        let span = info_span!("job", job_id = %job.job_id);
        let _enter = span.enter();
        let started = now_rfc3339();

        let mut scope = self.resources.acquire(&job.job_id)?;
        job.status = JobStatus::Running;
        info!("{:?} {} -> {}", conversion, input.display(), target);

        let classification = if conversion.needs_classification() {
            let c = classify::classify(&self.cfg, &self.backend, input);
            job.detected_kind = c.kind;
            Some(c)
        } else {
            None
        };

        let plan = policy::plan(&self.cfg, conversion, job.detected_kind);
        info!("strategies {:?}", plan.strategies);

        let mut attempts = Vec::new();
        let winner =
            match self.run_strategies(input, &plan, target, &mut scope, options, &mut attempts) {
                Ok(w) => w,
                Err(err) => {
                    job.status = JobStatus::Failed;
                    warn!("job failed after {} attempts: {err}", attempts.len());
                    return Err(err);
                }
            };

        let file_name = output_file_name(input, options, target);
        let delivered = self.resources.deliver(&scope, &winner.path, &file_name)?;
        scope.release();

        let soft = winner.strategy == Strategy::Placeholder;
        job.status = JobStatus::Succeeded { soft };
        info!(
            "delivered {} via {:?}{}",
            delivered.display(),
            winner.strategy,
            if soft { " (placeholder)" } else { "" }
        );

        let report = JobReport {
            job: job.clone(),
            conversion: Some(conversion),
            classification,
            strategies: plan.strategies,
            attempts,
            page_edit: None,
            output: Some(delivered.display().to_string()),
            parts: Vec::new(),
            soft_failure: soft,
            started,
            finished: now_rfc3339(),
        };

        Ok(JobOutput {
            job,
            output_path: delivered,
            engine: Some(winner.engine),
            soft_failure: soft,
            report,
        })
    }

    fn run_strategies(
        &self,
        input: &Path,
        plan: &StrategyPlan,
        target: Format,
        scope: &mut JobScope,
        options: &JobOptions,
        attempts: &mut Vec<EngineAttempt>,
    ) -> Result<Winner, ConvertError> {
        let mut last_kind = ErrorKind::EngineFailure;
        let mut last_detail = "no strategy planned".to_string();

        for (i, strategy) in plan.strategies.iter().copied().enumerate() {
            if options.cancel.is_cancelled() {
                return Err(ConvertError::Cancelled {
                    job_id: scope.job_id().to_string(),
                });
            }

            let output =
                scope.path(&format!("attempt-{i}-{}.{}", strategy.slug(), target.extension()));
            let scratch = scope.scratch_dir(&format!("attempt-{i}-scratch"))?;
            let req = EngineRequest {
                input,
                output: &output,
                scratch: &scratch,
                target,
                options,
            };

            let started_at = now_rfc3339();
            let clock = Instant::now();
            let (engine, result) = self.invoke(strategy, &req);

            let produced = result.output_path.clone().unwrap_or_else(|| output.clone());
            let outcome = if result.success {
                match validate::validate(&produced, target, &self.cfg.validation) {
                    Ok(bytes) => AttemptOutcome::Succeeded { bytes },
                    Err(failure) => AttemptOutcome::Failed {
                        kind: ErrorKind::ValidationFailure,
                        detail: failure.to_string(),
                    },
                }
            } else {
                AttemptOutcome::Failed {
                    kind: result.error_kind.unwrap_or(ErrorKind::EngineFailure),
                    detail: result.detail.clone().unwrap_or_default(),
                }
            };

            let attempt = EngineAttempt {
                strategy,
                started_at,
                elapsed_ms: clock.elapsed().as_millis() as u64,
                outcome,
            };
            scope.discard(&scratch);

            match &attempt.outcome {
                AttemptOutcome::Succeeded { bytes } => {
                    info!("{:?} succeeded ({} bytes)", strategy, bytes);
                    attempts.push(attempt);
                    return Ok(Winner {
                        strategy,
                        engine,
                        path: produced,
                    });
                }
                AttemptOutcome::Failed { kind, detail } => {
                    warn!("{:?} failed ({:?}): {}", strategy, kind, detail);
                    last_kind = *kind;
                    last_detail = detail.clone();
                    scope.discard(&produced);
                }
            }
            attempts.push(attempt);
        }

        Err(ConvertError::ExhaustedFailed {
            attempts: attempts.len(),
            kind: ErrorKind::EngineFailure,
            detail: format!("{last_kind:?}: {last_detail}"),
        })
    }

    fn engine_for(&self, strategy: Strategy) -> Box<dyn ConversionEngine + '_> {
        let cfg = &self.cfg;
        let backend = &self.backend;
        match strategy {
            Strategy::Structural => Box::new(StructuralExtractor::document(cfg, backend)),
            Strategy::StructuralTables => Box::new(StructuralExtractor::tables(cfg, backend)),
            Strategy::Renderer => Box::new(ExternalRenderer::new(cfg, backend)),
            Strategy::Ocr => Box::new(OcrReconstructor::document(cfg, backend)),
            Strategy::OcrLines => Box::new(OcrReconstructor::lines(cfg, backend)),
            Strategy::Placeholder => Box::new(PlaceholderNotice),
        }
    }

    /// Runs one engine, turning a panic inside it into an engine failure.
    fn invoke(&self, strategy: Strategy, req: &EngineRequest<'_>) -> (EngineKind, ConversionResult) {
        let engine = self.engine_for(strategy);
        let kind = engine.kind();
        debug!("{:?} runs on {:?}", strategy, kind);
        let result = catch_unwind(AssertUnwindSafe(|| engine.convert(req))).unwrap_or_else(|_| {
            ConversionResult::failed(ErrorKind::EngineFailure, format!("{strategy:?} panicked"))
        });
        (kind, result)
    }

    /// Applies a page edit to a PDF and delivers the result like a
    /// conversion.
    pub fn edit_pages(
        &self,
        input: &Path,
        edit: &PageEdit,
        options: &JobOptions,
    ) -> Result<JobOutput, ConvertError> {
        require_pdf(input)?;
        let file_name = output_file_name(input, options, Format::Pdf);
        let done = self.page_job(input, options, |scope| {
            let output = scope.path("edited.pdf");
            let summary = pages::apply(input, &output, edit)?;
            info!(
                "{:?}: {} of {} pages kept",
                edit, summary.pages_written, summary.pages_in
            );
            Ok((summary, vec![(output, file_name)]))
        })?;
        single_output(done)
    }

    /// Concatenates `inputs` into one PDF.
    pub fn merge_pages(
        &self,
        inputs: &[PathBuf],
        options: &JobOptions,
    ) -> Result<JobOutput, ConvertError> {
        for input in inputs {
            require_pdf(input)?;
        }
        let Some(first) = inputs.first() else {
            return Err(ConvertError::InvalidOption(
                "merge needs at least two PDFs, got 0".into(),
            ));
        };
        let file_name = output_file_name(Path::new("merged"), options, Format::Pdf);
        let done = self.page_job(first, options, |scope| {
            let output = scope.path("merged.pdf");
            let summary = pages::merge(inputs, &output)?;
            Ok((summary, vec![(output, file_name)]))
        })?;
        single_output(done)
    }

    /// Splits a PDF into one delivered file per page.
    pub fn split_pages(&self, input: &Path, options: &JobOptions) -> Result<SplitOutput, ConvertError> {
        require_pdf(input)?;
        let name = output_file_name(input, options, Format::Pdf);
        let stem = name.strip_suffix(".pdf").unwrap_or(&name).to_string();
        let done = self.page_job(input, options, |scope| {
            let dir = scope.scratch_dir("split")?;
            let files = pages::split(input, &dir)?;
            let total = files.len() as u32;
            let produced = files
                .into_iter()
                .map(|path| {
                    let page = path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .unwrap_or("page.pdf")
                        .to_string();
                    (path, format!("{stem}-{page}"))
                })
                .collect();
            let summary = PageEditSummary {
                pages_in: total,
                pages_written: total,
                selected: (1..=total).collect(),
            };
            Ok((summary, produced))
        })?;
        Ok(SplitOutput {
            job: done.job,
            pages: done.delivered,
            report: done.report,
        })
    }

    /// Shared shape of the page jobs: one scope, cancellation checked up
    /// front, every produced PDF validated before any is delivered.
    fn page_job<F>(&self, input: &Path, options: &JobOptions, work: F) -> Result<PageJob, ConvertError>
    where
        F: FnOnce(&mut JobScope) -> Result<(PageEditSummary, Vec<(PathBuf, String)>), ConvertError>,
    {
        let mut job = ConversionJob::new(new_job_id(), input, Format::Pdf);
        let span = info_span!("job", job_id = %job.job_id);
        let _enter = span.enter();
        let started = now_rfc3339();

        let mut scope = self.resources.acquire(&job.job_id)?;
        job.status = JobStatus::Running;
        if options.cancel.is_cancelled() {
            job.status = JobStatus::Failed;
            return Err(ConvertError::Cancelled {
                job_id: job.job_id.clone(),
            });
        }

        let (summary, produced) = match work(&mut scope) {
            Ok(r) => r,
            Err(err) => {
                job.status = JobStatus::Failed;
                warn!("page job failed: {err}");
                return Err(err);
            }
        };
        for (path, _) in &produced {
            if let Err(failure) = validate::validate(path, Format::Pdf, &self.cfg.validation) {
                job.status = JobStatus::Failed;
                return Err(ConvertError::ExhaustedFailed {
                    attempts: 1,
                    kind: ErrorKind::ValidationFailure,
                    detail: failure.to_string(),
                });
            }
        }

        let mut delivered = Vec::with_capacity(produced.len());
        for (path, name) in &produced {
            delivered.push(self.resources.deliver(&scope, path, name)?);
        }
        scope.release();
        job.status = JobStatus::Succeeded { soft: false };
        info!(
            "{} of {} pages written to {} file(s)",
            summary.pages_written,
            summary.pages_in,
            delivered.len()
        );

        let parts = if delivered.len() > 1 {
            delivered.iter().map(|p| p.display().to_string()).collect()
        } else {
            Vec::new()
        };
        let report = JobReport {
            job: job.clone(),
            conversion: None,
            classification: None,
            strategies: Vec::new(),
            attempts: Vec::new(),
            page_edit: Some(summary),
            output: delivered.first().map(|p| p.display().to_string()),
            parts,
            soft_failure: false,
            started,
            finished: now_rfc3339(),
        };

        Ok(PageJob {
            job,
            delivered,
            report,
        })
    }
}

fn single_output(done: PageJob) -> Result<JobOutput, ConvertError> {
    let Some(output_path) = done.delivered.into_iter().next() else {
        return Err(ConvertError::ExhaustedFailed {
            attempts: 1,
            kind: ErrorKind::EngineFailure,
            detail: "page job produced no file".into(),
        });
    };
    Ok(JobOutput {
        job: done.job,
        output_path,
        engine: None,
        soft_failure: false,
        report: done.report,
    })
}

fn require_pdf(input: &Path) -> Result<(), ConvertError> {
    check_input(input)?;
    if SourceKind::from_path(input) != Some(SourceKind::Pdf) {
        return Err(ConvertError::UnsupportedConversion {
            source_kind: source_label(input),
            target: Format::Pdf,
        });
    }
    Ok(())
}

fn check_input(input: &Path) -> Result<(), ConvertError> {
    match std::fs::metadata(input) {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(()),
        _ => Err(ConvertError::InputMissing {
            path: input.to_path_buf(),
        }),
    }
}

fn source_label(input: &Path) -> String {
    input
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_else(|| "unknown".into())
}

fn resolve_conversion(input: &Path, target: Format) -> Result<Conversion, ConvertError> {
    SourceKind::from_path(input)
        .and_then(|source| Conversion::resolve(source, target))
        .ok_or_else(|| ConvertError::UnsupportedConversion {
            source_kind: source_label(input),
            target,
        })
}

fn output_file_name(input: &Path, options: &JobOptions, target: Format) -> String {
    let stem = options
        .output_name
        .clone()
        .or_else(|| {
            input
                .file_stem()
                .and_then(|s| s.to_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "output".into());
    let stem: String = stem
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    format!("{stem}.{}", target.extension())
}
