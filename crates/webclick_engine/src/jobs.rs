use std::collections::BTreeMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use futures_util::{stream, StreamExt};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use webclick_core::{normalize_url, ArchiveJob, JobId, JobState, PageStatus, UrlError};
use webclick_logging::{webclick_debug, webclick_error, webclick_info, webclick_warn};

use crate::package::{FailedPage, Packager};
use crate::render::{Capture, PageRenderer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSettings {
    /// Pages rendered concurrently within one job.
    pub workers: usize,
    /// Extra attempts after the first one, for retryable failures only.
    pub max_retries: u32,
    /// Wait before the first retry; doubled for each further one.
    pub retry_backoff: Duration,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            workers: 3,
            max_retries: 2,
            retry_backoff: Duration::from_secs(1),
        }
    }
}

impl JobSettings {
    fn backoff(&self, retry: u32) -> Duration {
        self.retry_backoff
            .saturating_mul(2u32.saturating_pow(retry))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("no pages selected")]
    NoSelection,
    #[error(transparent)]
    Url(#[from] UrlError),
    #[error("unknown job {0}")]
    UnknownJob(JobId),
    #[error("{job_id} is {state}; no archive available")]
    NotReady { job_id: JobId, state: JobState },
    #[error("could not read archive: {0}")]
    Io(#[from] io::Error),
}

struct JobEntry {
    status: Arc<watch::Sender<ArchiveJob>>,
    cancel: CancellationToken,
}

struct Inner {
    renderer: Arc<dyn PageRenderer>,
    packager: Packager,
    settings: JobSettings,
    next_id: AtomicU64,
    jobs: Mutex<BTreeMap<JobId, JobEntry>>,
}

/// Owns every archive job of the session.
///
/// Each job runs on its own task and publishes snapshots through a watch
/// channel; status reads, polling and subscriptions all go through that
/// channel. Jobs share nothing but the renderer.
#[derive(Clone)]
pub struct JobManager {
    inner: Arc<Inner>,
}

enum PageOutcome {
    Captured(usize, Capture),
    Failed(usize, FailedPage),
    Skipped,
}

impl JobManager {
    pub fn new(renderer: Arc<dyn PageRenderer>, packager: Packager, settings: JobSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                renderer,
                packager,
                settings,
                next_id: AtomicU64::new(1),
                jobs: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    /// Creates a Pending job and starts it in the background.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit(&self, root_url: &str, urls: &[String]) -> Result<JobId, JobError> {
        if urls.is_empty() {
            return Err(JobError::NoSelection);
        }
        let root_url = normalize_url(root_url)?;
        let urls = urls
            .iter()
            .map(|url| normalize_url(url))
            .collect::<Result<Vec<_>, _>>()?;

        let id = JobId::new(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let job = ArchiveJob::new(id, root_url, urls, Utc::now());
        let pages = job.pages.len();
        let (status, _) = watch::channel(job);
        let status = Arc::new(status);
        let cancel = CancellationToken::new();
        self.inner.jobs().insert(
            id,
            JobEntry {
                status: status.clone(),
                cancel: cancel.clone(),
            },
        );
        webclick_info!("{id} submitted with {pages} pages");

        let inner = self.inner.clone();
        tokio::spawn(async move { inner.run(id, status, cancel).await });
        Ok(id)
    }

    pub fn status(&self, job_id: JobId) -> Result<ArchiveJob, JobError> {
        let jobs = self.inner.jobs();
        let entry = jobs.get(&job_id).ok_or(JobError::UnknownJob(job_id))?;
        let snapshot = entry.status.borrow().clone();
        Ok(snapshot)
    }

    /// Push stream of snapshots for one job.
    pub fn subscribe(&self, job_id: JobId) -> Result<watch::Receiver<ArchiveJob>, JobError> {
        let jobs = self.inner.jobs();
        let entry = jobs.get(&job_id).ok_or(JobError::UnknownJob(job_id))?;
        Ok(entry.status.subscribe())
    }

    /// Resolves once the job reaches a terminal state.
    pub async fn wait(&self, job_id: JobId) -> Result<ArchiveJob, JobError> {
        let mut rx = self.subscribe(job_id)?;
        if rx.wait_for(ArchiveJob::is_terminal).await.is_err() {
            webclick_debug!("{job_id} was cleared while being waited on");
        }
        let snapshot = rx.borrow().clone();
        Ok(snapshot)
    }

    /// Stops the job: no further pages start, pages already rendering may
    /// still settle. Cancelling a finished job changes nothing.
    pub fn cancel(&self, job_id: JobId) -> Result<ArchiveJob, JobError> {
        let jobs = self.inner.jobs();
        let entry = jobs.get(&job_id).ok_or(JobError::UnknownJob(job_id))?;
        entry.cancel.cancel();
        let changed = entry
            .status
            .send_if_modified(|job| job.cancel(Utc::now()).is_ok());
        if changed {
            webclick_info!("{job_id} cancelled");
        }
        let snapshot = entry.status.borrow().clone();
        Ok(snapshot)
    }

    /// Every job, ordered by id.
    pub fn list(&self) -> Vec<ArchiveJob> {
        self.inner
            .jobs()
            .values()
            .map(|entry| entry.status.borrow().clone())
            .collect()
    }

    /// Forgets one finished job. Live jobs cannot be cleared.
    pub fn clear(&self, job_id: JobId) -> Result<ArchiveJob, JobError> {
        let mut jobs = self.inner.jobs();
        let entry = jobs.get(&job_id).ok_or(JobError::UnknownJob(job_id))?;
        let snapshot = entry.status.borrow().clone();
        if !snapshot.is_terminal() {
            return Err(JobError::NotReady {
                job_id,
                state: snapshot.state,
            });
        }
        jobs.remove(&job_id);
        Ok(snapshot)
    }

    /// Forgets every finished job and returns how many were removed.
    pub fn clear_finished(&self) -> usize {
        let mut jobs = self.inner.jobs();
        let before = jobs.len();
        jobs.retain(|_, entry| !entry.status.borrow().is_terminal());
        before - jobs.len()
    }

    /// Archive bytes of a Completed job.
    pub async fn download(&self, job_id: JobId) -> Result<Vec<u8>, JobError> {
        let job = self.status(job_id)?;
        match (&job.state, &job.result_artifact_path) {
            (JobState::Completed, Some(path)) => Ok(tokio::fs::read(path).await?),
            _ => Err(JobError::NotReady {
                job_id,
                state: job.state,
            }),
        }
    }

    /// Cancels every live job and releases the renderer.
    pub async fn shutdown(&self) {
        let ids: Vec<JobId> = self.inner.jobs().keys().copied().collect();
        for id in ids {
            if let Err(err) = self.cancel(id) {
                webclick_debug!("cancel during shutdown: {err}");
            }
        }
        self.inner.renderer.shutdown().await;
    }
}

impl Inner {
    fn jobs(&self) -> MutexGuard<'_, BTreeMap<JobId, JobEntry>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run(
        self: Arc<Self>,
        id: JobId,
        status: Arc<watch::Sender<ArchiveJob>>,
        cancel: CancellationToken,
    ) {
        if !status.send_if_modified(|job| job.start().is_ok()) {
            webclick_debug!("{id} was cancelled before it started");
            return;
        }
        webclick_info!("{id} started");

        let urls: Vec<String> = status
            .borrow()
            .selected_urls()
            .map(str::to_string)
            .collect();
        let total = urls.len();
        let workers = self.settings.workers.max(1);

        let outcomes: Vec<PageOutcome> = stream::iter(urls.into_iter().enumerate())
            .map(|(index, url)| self.process_page(id, index, url, &status, &cancel))
            .buffer_unordered(workers)
            .collect()
            .await;

        if cancel.is_cancelled() {
            webclick_info!("{id} stopped after cancellation");
            return;
        }

        let mut captures: Vec<(usize, Capture)> = Vec::new();
        let mut failures: Vec<(usize, FailedPage)> = Vec::new();
        for outcome in outcomes {
            match outcome {
                PageOutcome::Captured(index, capture) => captures.push((index, capture)),
                PageOutcome::Failed(index, failed) => failures.push((index, failed)),
                PageOutcome::Skipped => {}
            }
        }
        captures.sort_by_key(|(index, _)| *index);
        failures.sort_by_key(|(index, _)| *index);
        let captures: Vec<Capture> = captures.into_iter().map(|(_, c)| c).collect();
        let failures: Vec<FailedPage> = failures.into_iter().map(|(_, f)| f).collect();

        if captures.is_empty() {
            let first = failures
                .first()
                .map(|f| format!(": {} ({})", f.url, f.error))
                .unwrap_or_default();
            let message = format!("all {total} pages failed{first}");
            webclick_warn!("{id} failed, {message}");
            status.send_if_modified(|job| job.fail(message, Utc::now()).is_ok());
            return;
        }

        let root_url = status.borrow().root_url.clone();
        let packager = self.packager.clone();
        let packaged = tokio::task::spawn_blocking(move || {
            packager.package(id, &root_url, &captures, &failures)
        })
        .await;

        let now = Utc::now();
        match packaged {
            Ok(Ok(path)) => {
                let completed =
                    status.send_if_modified(|job| job.complete(path.clone(), now).is_ok());
                if completed {
                    webclick_info!("{id} completed: {}", path.display());
                } else {
                    webclick_debug!("{id} was cancelled while packaging");
                }
            }
            Ok(Err(err)) => {
                webclick_error!("{id} packaging failed: {err}");
                status.send_if_modified(|job| {
                    job.fail(format!("packaging failed: {err}"), now).is_ok()
                });
            }
            Err(join) => {
                webclick_error!("{id} packaging task aborted: {join}");
                status.send_if_modified(|job| {
                    job.fail(format!("packaging aborted: {join}"), now).is_ok()
                });
            }
        }
    }

    async fn process_page(
        &self,
        id: JobId,
        index: usize,
        url: String,
        status: &watch::Sender<ArchiveJob>,
        cancel: &CancellationToken,
    ) -> PageOutcome {
        if cancel.is_cancelled() || !status.send_if_modified(|job| job.begin_page(&url).is_ok()) {
            return PageOutcome::Skipped;
        }

        let mut attempts = 0u32;
        let result = loop {
            if attempts > 0 && cancel.is_cancelled() {
                break Err("cancelled before retry".to_string());
            }
            attempts += 1;
            match self.renderer.capture(&url).await {
                Ok(capture) => break Ok(capture),
                Err(err) => {
                    let retries_used = attempts - 1;
                    if !err.is_retryable() || retries_used >= self.settings.max_retries {
                        break Err(err.to_string());
                    }
                    webclick_warn!("{id} attempt {attempts} for {url} failed: {err}");
                    self.pause_before_retry(retries_used, cancel).await;
                }
            }
        };

        match result {
            Ok(capture) => {
                status.send_if_modified(|job| {
                    job.finish_page(&url, PageStatus::Captured, attempts, None)
                        .is_ok()
                });
                PageOutcome::Captured(index, capture)
            }
            Err(error) => {
                webclick_warn!("{id} giving up on {url} after {attempts} attempts: {error}");
                status.send_if_modified(|job| {
                    job.finish_page(&url, PageStatus::Failed, attempts, Some(error.clone()))
                        .is_ok()
                });
                PageOutcome::Failed(index, FailedPage { url, error })
            }
        }
    }

    async fn pause_before_retry(&self, retry: u32, cancel: &CancellationToken) {
        let delay = self.settings.backoff(retry);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => {}
        }
    }
}

