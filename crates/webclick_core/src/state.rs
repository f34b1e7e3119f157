use std::collections::{BTreeMap, BTreeSet};

use crate::{ArchiveJob, ChildLink, JobId, LinkTree, NodeId};

/// Session state behind the link-tree view and the job list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppState {
    generation: u64,
    tree: Option<LinkTree>,
    loading: BTreeSet<NodeId>,
    selected: Vec<String>,
    jobs: BTreeMap<JobId, ArchiveJob>,
    last_error: Option<String>,
    dirty: bool,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bumped on every new root so late resolutions for an old tree are dropped.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn tree(&self) -> Option<&LinkTree> {
        self.tree.as_ref()
    }

    pub fn selected(&self) -> &[String] {
        &self.selected
    }

    pub fn job(&self, job_id: JobId) -> Option<&ArchiveJob> {
        self.jobs.get(&job_id)
    }

    /// Returns whether the view needs a redraw and clears the flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn is_loading(&self, node: NodeId) -> bool {
        self.loading.contains(&node)
    }

    pub(crate) fn jobs(&self) -> impl Iterator<Item = &ArchiveJob> {
        self.jobs.values()
    }

    pub(crate) fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn set_error(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
        self.dirty = true;
    }

    /// Replaces the tree with a fresh root and returns the root handle.
    pub(crate) fn reset_tree(&mut self, root_url: String) -> NodeId {
        self.generation += 1;
        let tree = LinkTree::new(root_url.clone(), root_url);
        let root = tree.root();
        self.tree = Some(tree);
        self.loading.clear();
        self.selected.clear();
        self.last_error = None;
        self.dirty = true;
        root
    }

    /// Registers an outstanding resolution; false if one is already pending.
    pub(crate) fn begin_loading(&mut self, node: NodeId) -> bool {
        let inserted = self.loading.insert(node);
        if inserted {
            self.dirty = true;
        }
        inserted
    }

    /// Clears the pending marker; false if nothing was pending for `node`.
    pub(crate) fn finish_loading(&mut self, node: NodeId) -> bool {
        let removed = self.loading.remove(&node);
        if removed {
            self.dirty = true;
        }
        removed
    }

    pub(crate) fn attach(&mut self, node: NodeId, children: &[ChildLink]) {
        if let Some(tree) = self.tree.as_mut() {
            if tree.attach_children(node, children).is_ok() {
                self.last_error = None;
                self.dirty = true;
            }
        }
    }

    pub(crate) fn collapse(&mut self, node: NodeId) {
        let Some(tree) = self.tree.as_mut() else {
            return;
        };
        if tree.collapse(node).is_ok() {
            let stale: Vec<NodeId> = self
                .loading
                .iter()
                .copied()
                .filter(|id| *id == node || tree.get(*id).is_none())
                .collect();
            for id in stale {
                self.loading.remove(&id);
            }
            self.dirty = true;
        }
    }

    pub(crate) fn toggle_selection(&mut self, url: &str) {
        if let Some(pos) = self.selected.iter().position(|u| u == url) {
            self.selected.remove(pos);
        } else {
            self.selected.push(url.to_string());
        }
        self.dirty = true;
    }

    /// Stores a job snapshot. Progress never moves backwards, whatever order
    /// snapshots arrive in. A terminal row never changes state again, and
    /// only takes the late page outcomes of a cancelled job until it settles.
    pub(crate) fn apply_job(&mut self, mut job: ArchiveJob) {
        if let Some(existing) = self.jobs.get(&job.id) {
            if existing.is_settled() || (existing.is_terminal() && job.state != existing.state) {
                return;
            }
            job.progress_percent = job.progress_percent.max(existing.progress_percent);
        }
        self.jobs.insert(job.id, job);
        self.dirty = true;
    }
}
