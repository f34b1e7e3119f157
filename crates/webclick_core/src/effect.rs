use crate::{JobId, NodeId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Drop every cached resolution; a new root scrape begins.
    ClearDiscovery,
    /// Resolve one level of links for `node`.
    ResolveLinks {
        generation: u64,
        node: NodeId,
        url: String,
    },
    SubmitArchive {
        root_url: String,
        urls: Vec<String>,
    },
    CancelJob {
        job_id: JobId,
    },
}
