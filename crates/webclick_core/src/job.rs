use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque archive job identifier, displayed as `job-<n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(u64);

impl JobId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim();
        let digits = digits.strip_prefix("job-").unwrap_or(digits);
        digits.parse().map(JobId)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::Cancelled)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    Pending,
    Rendering,
    Captured,
    Failed,
}

impl PageStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, PageStatus::Captured | PageStatus::Failed)
    }
}

impl fmt::Display for PageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PageStatus::Pending => "pending",
            PageStatus::Rendering => "rendering",
            PageStatus::Captured => "captured",
            PageStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Per-URL status inside a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageReport {
    pub url: String,
    pub status: PageStatus,
    pub attempts: u32,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageCounts {
    pub pending: usize,
    pub rendering: usize,
    pub captured: usize,
    pub failed: usize,
}

impl PageCounts {
    pub fn total(&self) -> usize {
        self.pending + self.rendering + self.captured + self.failed
    }

    pub fn settled(&self) -> usize {
        self.captured + self.failed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("{job} cannot move from {from} to {to}")]
    State {
        job: JobId,
        from: JobState,
        to: JobState,
    },
    #[error("{job} has no page {url}")]
    UnknownPage { job: JobId, url: String },
    #[error("page {url} of {job} is already {status}")]
    PageSettled {
        job: JobId,
        url: String,
        status: PageStatus,
    },
}

/// Snapshot-able state of one archive request.
///
/// All mutation goes through the transition methods, which keep the state
/// one-directional and `progress_percent` non-decreasing. Progress stays at
/// or below 99 until the job reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveJob {
    pub id: JobId,
    pub root_url: String,
    pub state: JobState,
    /// Selected URLs in submission order with their status.
    pub pages: Vec<PageReport>,
    pub progress_percent: u8,
    pub result_artifact_path: Option<PathBuf>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ArchiveJob {
    /// Creates a Pending job. Duplicate URLs collapse to their first occurrence.
    pub fn new(
        id: JobId,
        root_url: impl Into<String>,
        urls: impl IntoIterator<Item = String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let mut pages: Vec<PageReport> = Vec::new();
        for url in urls {
            if pages.iter().any(|page| page.url == url) {
                continue;
            }
            pages.push(PageReport {
                url,
                status: PageStatus::Pending,
                attempts: 0,
                error: None,
            });
        }
        Self {
            id,
            root_url: root_url.into(),
            state: JobState::Pending,
            pages,
            progress_percent: 0,
            result_artifact_path: None,
            error: None,
            created_at,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Terminal with no render still in flight. A cancelled job settles once
    /// the pages it was rendering at cancel time have finished.
    pub fn is_settled(&self) -> bool {
        self.is_terminal() && self.counts().rendering == 0
    }

    pub fn selected_urls(&self) -> impl Iterator<Item = &str> {
        self.pages.iter().map(|page| page.url.as_str())
    }

    pub fn page(&self, url: &str) -> Option<&PageReport> {
        self.pages.iter().find(|page| page.url == url)
    }

    pub fn counts(&self) -> PageCounts {
        let mut counts = PageCounts::default();
        for page in &self.pages {
            match page.status {
                PageStatus::Pending => counts.pending += 1,
                PageStatus::Rendering => counts.rendering += 1,
                PageStatus::Captured => counts.captured += 1,
                PageStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    pub fn start(&mut self) -> Result<(), TransitionError> {
        self.transition(&[JobState::Pending], JobState::Running)
    }

    /// Marks a page as being rendered. Only a running job starts pages.
    pub fn begin_page(&mut self, url: &str) -> Result<(), TransitionError> {
        if self.state != JobState::Running {
            return Err(self.state_error(JobState::Running));
        }
        let job = self.id;
        let page = self.page_mut(url)?;
        if page.status.is_terminal() {
            return Err(TransitionError::PageSettled {
                job,
                url: url.to_string(),
                status: page.status,
            });
        }
        page.status = PageStatus::Rendering;
        Ok(())
    }

    /// Records the final outcome of one page and recomputes progress.
    ///
    /// Accepted while running, and after cancellation for renders that were
    /// already in flight.
    pub fn finish_page(
        &mut self,
        url: &str,
        outcome: PageStatus,
        attempts: u32,
        error: Option<String>,
    ) -> Result<(), TransitionError> {
        if !matches!(self.state, JobState::Running | JobState::Cancelled) || !outcome.is_terminal() {
            return Err(self.state_error(JobState::Running));
        }
        let job = self.id;
        let page = self.page_mut(url)?;
        if page.status.is_terminal() {
            return Err(TransitionError::PageSettled {
                job,
                url: url.to_string(),
                status: page.status,
            });
        }
        page.status = outcome;
        page.attempts = attempts;
        page.error = error;
        self.refresh_progress();
        Ok(())
    }

    pub fn complete(
        &mut self,
        artifact: PathBuf,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.transition(&[JobState::Running], JobState::Completed)?;
        self.result_artifact_path = Some(artifact);
        self.finish_at(now, 100);
        Ok(())
    }

    pub fn fail(&mut self, message: impl Into<String>, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.transition(&[JobState::Pending, JobState::Running], JobState::Failed)?;
        self.error = Some(message.into());
        self.finish_at(now, 100);
        Ok(())
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.transition(&[JobState::Pending, JobState::Running], JobState::Cancelled)?;
        let reached = self.progress_percent;
        self.finish_at(now, reached);
        Ok(())
    }

    fn transition(&mut self, from: &[JobState], to: JobState) -> Result<(), TransitionError> {
        if !from.contains(&self.state) {
            return Err(self.state_error(to));
        }
        self.state = to;
        Ok(())
    }

    fn state_error(&self, to: JobState) -> TransitionError {
        TransitionError::State {
            job: self.id,
            from: self.state,
            to,
        }
    }

    fn page_mut(&mut self, url: &str) -> Result<&mut PageReport, TransitionError> {
        let job = self.id;
        self.pages
            .iter_mut()
            .find(|page| page.url == url)
            .ok_or_else(|| TransitionError::UnknownPage {
                job,
                url: url.to_string(),
            })
    }

    fn refresh_progress(&mut self) {
        let counts = self.counts();
        let total = counts.total().max(1);
        let mut percent = (counts.settled() * 100 / total) as u8;
        if !self.state.is_terminal() {
            percent = percent.min(99);
        }
        self.progress_percent = self.progress_percent.max(percent);
    }

    fn finish_at(&mut self, now: DateTime<Utc>, percent: u8) {
        self.progress_percent = self.progress_percent.max(percent);
        self.completed_at = Some(now);
    }
}
