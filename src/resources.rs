//! Temporary resource lifecycle.
//!
//! Three mechanisms share one idempotent delete:
//! * [`JobScope`] removes a job's scratch directory when the job ends, on
//!   every exit path (it is released on drop).
//! * [`ResourceManager::deliver`] hands an artifact to the caller and
//!   schedules its deletion after a short delay on the reaper thread.
//! * [`Sweeper`] periodically deletes anything under the managed roots older
//!   than the retention window, catching whatever the first two missed.

use crate::{config::Config, error::ConvertError, util};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub work_root: PathBuf,
    pub output_root: PathBuf,
    pub deferred_delay: Duration,
    pub sweep_interval: Duration,
    pub retention: Duration,
}

impl LifecycleSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            work_root: absolute_root(&cfg.paths.work_dir),
            output_root: absolute_root(&cfg.paths.output_dir),
            deferred_delay: Duration::from_secs(cfg.lifecycle.deferred_delete_seconds),
            sweep_interval: Duration::from_secs(cfg.lifecycle.sweep_interval_seconds.max(1)),
            retention: Duration::from_secs(cfg.lifecycle.retention_seconds),
        }
    }
}

/// Anchors a configured root at the current directory so paths handed to
/// external tools stay valid whatever their working directory.
fn absolute_root(raw: &str) -> PathBuf {
    let p = PathBuf::from(raw);
    std::path::absolute(&p).unwrap_or(p)
}

#[derive(Debug, Clone)]
pub struct TempResource {
    pub path: PathBuf,
    pub owning_job_id: String,
    pub created_at: SystemTime,
    pub scheduled_deletion_at: Option<SystemTime>,
}

impl TempResource {
    fn new(path: PathBuf, job_id: &str) -> Self {
        Self {
            path,
            owning_job_id: job_id.to_string(),
            created_at: SystemTime::now(),
            scheduled_deletion_at: None,
        }
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SweepReport {
    pub removed_files: usize,
    pub removed_dirs: usize,
    pub errors: usize,
}

#[derive(Clone)]
pub struct ResourceManager {
    inner: Arc<Inner>,
}

struct Inner {
    settings: LifecycleSettings,
    reaper: Option<Sender<TempResource>>,
    reaper_thread: Option<JoinHandle<()>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Closing the channel makes the reaper flush what is still pending.
        self.reaper.take();
        if let Some(handle) = self.reaper_thread.take() {
            let _ = handle.join();
        }
    }
}

impl ResourceManager {
    pub fn new(settings: LifecycleSettings) -> Result<Self, ConvertError> {
        for root in [&settings.work_root, &settings.output_root] {
            std::fs::create_dir_all(root).map_err(|e| ConvertError::io(root, e))?;
        }

        let (tx, rx) = mpsc::channel();
        let reaper_thread = std::thread::Builder::new()
            .name("docsmith-reaper".into())
            .spawn(move || reaper_loop(rx))
            .map_err(|e| ConvertError::io(&settings.output_root, e))?;

        Ok(Self {
            inner: Arc::new(Inner {
                settings,
                reaper: Some(tx),
                reaper_thread: Some(reaper_thread),
            }),
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self, ConvertError> {
        Self::new(LifecycleSettings::from_config(cfg))
    }

    pub fn settings(&self) -> &LifecycleSettings {
        &self.inner.settings
    }

    /// Creates `<work_root>/<job_id>/`, owned by the returned scope.
    pub fn acquire(&self, job_id: &str) -> Result<JobScope, ConvertError> {
        let dir = self.inner.settings.work_root.join(job_id);
        std::fs::create_dir_all(&dir).map_err(|e| ConvertError::io(&dir, e))?;
        debug!("acquired {}", dir.display());
        Ok(JobScope {
            job_id: job_id.to_string(),
            resources: vec![TempResource::new(dir.clone(), job_id)],
            dir,
            released: false,
        })
    }

    /// Moves a finished artifact out of the job scope into the output root
    /// and schedules it for deferred deletion.
    pub fn deliver(
        &self,
        scope: &JobScope,
        produced: &Path,
        file_name: &str,
    ) -> Result<PathBuf, ConvertError> {
        let dest = self
            .inner
            .settings
            .output_root
            .join(format!("{}-{}", scope.job_id(), file_name));
        util::move_file(produced, &dest).map_err(|e| ConvertError::io(&dest, e))?;
        self.schedule_deletion(&dest, scope.job_id());
        Ok(dest)
    }

    pub fn schedule_deletion(&self, path: &Path, job_id: &str) -> TempResource {
        let mut res = TempResource::new(path.to_path_buf(), job_id);
        res.scheduled_deletion_at = Some(SystemTime::now() + self.inner.settings.deferred_delay);

        let sent = self
            .inner
            .reaper
            .as_ref()
            .map(|tx| tx.send(res.clone()).is_ok())
            .unwrap_or(false);
        if !sent {
            delete_logged(path);
        }
        res
    }

    /// One pass over both managed roots.
    pub fn sweep(&self) -> SweepReport {
        let s = &self.inner.settings;
        let now = SystemTime::now();
        let mut report = SweepReport::default();
        for root in [&s.work_root, &s.output_root] {
            sweep_dir(root, s.retention, now, &mut report);
        }
        if report.removed_files + report.removed_dirs > 0 {
            info!(
                "sweep removed {} files, {} dirs ({} errors)",
                report.removed_files, report.removed_dirs, report.errors
            );
        }
        report
    }

    /// Starts the periodic sweep on its own thread: once immediately, then
    /// every `sweep_interval`. Dropping the handle stops it.
    pub fn start_sweeper(&self) -> Result<Sweeper, ConvertError> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let mgr = self.clone();
        let interval = self.inner.settings.sweep_interval;
        let handle = std::thread::Builder::new()
            .name("docsmith-sweeper".into())
            .spawn(move || {
                loop {
                    mgr.sweep();
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        _ => break,
                    }
                }
            })
            .map_err(|e| ConvertError::io(&self.inner.settings.work_root, e))?;
        Ok(Sweeper {
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }
}

/// Scratch space for one job. Released exactly once, explicitly or on drop.
pub struct JobScope {
    job_id: String,
    dir: PathBuf,
    resources: Vec<TempResource>,
    released: bool,
}

impl JobScope {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn resources(&self) -> &[TempResource] {
        &self.resources
    }

    /// Reserves a file path inside the scope.
    pub fn path(&mut self, name: &str) -> PathBuf {
        let p = self.dir.join(name);
        self.resources.push(TempResource::new(p.clone(), &self.job_id));
        p
    }

    pub fn scratch_dir(&mut self, name: &str) -> Result<PathBuf, ConvertError> {
        let p = self.path(name);
        std::fs::create_dir_all(&p).map_err(|e| ConvertError::io(&p, e))?;
        Ok(p)
    }

    /// Deletes one resource early, e.g. the leftovers of a failed attempt.
    pub fn discard(&self, path: &Path) {
        delete_logged(path);
    }

    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        for res in self.resources.iter().rev() {
            delete_logged(&res.path);
        }
        debug!("released scope for job {}", self.job_id);
    }
}

impl Drop for JobScope {
    fn drop(&mut self) {
        self.release_inner();
    }
}

pub struct Sweeper {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Sweeper {
    /// Stops the loop and waits for an in-flight pass to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.stop.take().is_none() {
            return;
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("sweeper thread panicked");
            }
        }
        debug!("sweeper stopped");
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn delete_logged(path: &Path) {
    match util::remove_path(path) {
        Ok(true) => debug!("deleted {}", path.display()),
        Ok(false) => {}
        Err(e) => warn!("failed to delete {}: {e}", path.display()),
    }
}

fn reaper_loop(rx: Receiver<TempResource>) {
    let mut pending: Vec<TempResource> = Vec::new();
    loop {
        let now = SystemTime::now();
        pending.retain(|res| {
            let due = res.scheduled_deletion_at.is_none_or(|at| at <= now);
            if due {
                delete_logged(&res.path);
            }
            !due
        });

        let next_due = pending
            .iter()
            .filter_map(|r| r.scheduled_deletion_at)
            .min()
            .map(|at| at.duration_since(now).unwrap_or(Duration::ZERO));

        let msg = match next_due {
            Some(wait) => rx.recv_timeout(wait),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match msg {
            Ok(res) => pending.push(res),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                for res in pending.drain(..) {
                    delete_logged(&res.path);
                }
                return;
            }
        }
    }
}

fn is_expired(meta: &std::fs::Metadata, retention: Duration, now: SystemTime) -> bool {
    meta.modified()
        .map(|m| now.duration_since(m).unwrap_or(Duration::ZERO) >= retention)
        .unwrap_or(false)
}

fn sweep_dir(dir: &Path, retention: Duration, now: SystemTime, report: &mut SweepReport) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        if meta.is_dir() {
            sweep_dir(&path, retention, now, report);
            if is_expired(&meta, retention, now) && std::fs::remove_dir(&path).is_ok() {
                report.removed_dirs += 1;
            }
        } else if is_expired(&meta, retention, now) {
            match util::remove_path(&path) {
                Ok(true) => report.removed_files += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!("sweep could not delete {}: {e}", path.display());
                    report.errors += 1;
                }
            }
        }
    }
}
