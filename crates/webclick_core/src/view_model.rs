use std::path::PathBuf;

use crate::{AppState, JobId, JobState, NodeId};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppViewModel {
    pub root_url: Option<String>,
    pub rows: Vec<TreeRowView>,
    pub selected: Vec<String>,
    pub jobs: Vec<JobRowView>,
    pub last_error: Option<String>,
    pub dirty: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeRowView {
    pub node: NodeId,
    pub depth: usize,
    pub title: String,
    pub url: String,
    pub expanded: bool,
    pub loading: bool,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRowView {
    pub job_id: JobId,
    pub state: JobState,
    pub progress_percent: u8,
    pub captured: usize,
    pub failed: usize,
    pub total: usize,
    pub artifact: Option<PathBuf>,
    pub error: Option<String>,
}

impl AppState {
    pub fn view(&self) -> AppViewModel {
        let (root_url, rows) = match self.tree() {
            Some(tree) => {
                let root_url = tree.get(tree.root()).map(|n| n.url.clone());
                let rows = tree
                    .walk()
                    .into_iter()
                    .filter_map(|(id, depth)| {
                        let node = tree.get(id)?;
                        Some(TreeRowView {
                            node: id,
                            depth,
                            title: node.title.clone(),
                            url: node.url.clone(),
                            expanded: node.expanded,
                            loading: self.is_loading(id),
                            selected: self.selected().contains(&node.url),
                        })
                    })
                    .collect();
                (root_url, rows)
            }
            None => (None, Vec::new()),
        };

        let jobs = self
            .jobs()
            .map(|job| {
                let counts = job.counts();
                JobRowView {
                    job_id: job.id,
                    state: job.state,
                    progress_percent: job.progress_percent,
                    captured: counts.captured,
                    failed: counts.failed,
                    total: counts.total(),
                    artifact: job.result_artifact_path.clone(),
                    error: job.error.clone(),
                }
            })
            .collect();

        AppViewModel {
            root_url,
            rows,
            selected: self.selected().to_vec(),
            jobs,
            last_error: self.last_error().map(str::to_string),
            dirty: self.is_dirty(),
        }
    }
}
