use crate::{ArchiveJob, ChildLink, JobId, NodeId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// User entered a new root URL; the current tree and selection are discarded.
    RootSubmitted(String),
    /// User asked to show the children of a node.
    ExpandClicked(NodeId),
    /// User asked to hide the children of a node.
    CollapseClicked(NodeId),
    /// Engine finished resolving the links of a node.
    LinksResolved {
        generation: u64,
        node: NodeId,
        result: Result<Vec<ChildLink>, String>,
    },
    /// User ticked or unticked a node for archiving.
    SelectionToggled(NodeId),
    /// User clicked Archive.
    ArchiveClicked,
    /// Engine accepted an archive request.
    JobAccepted(ArchiveJob),
    /// Engine refused an archive request.
    JobRejected(String),
    /// Fresh status snapshot for a job.
    JobUpdated(ArchiveJob),
    /// User clicked Cancel on a job row.
    CancelClicked(JobId),
    /// UI/render tick to coalesce rendering.
    Tick,
    /// Fallback for placeholder wiring.
    NoOp,
}
