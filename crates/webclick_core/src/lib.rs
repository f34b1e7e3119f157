//! WebClick core: URL identity, the link tree, archive job transitions and
//! the pure session state machine.
mod effect;
mod job;
mod msg;
mod normalize;
mod state;
mod tree;
mod update;
mod view_model;

pub use effect::Effect;
pub use job::{
    ArchiveJob, JobId, JobState, PageCounts, PageReport, PageStatus, TransitionError,
};
pub use msg::Msg;
pub use normalize::{check_supported_scheme, is_web_url, normalize_url, UrlError};
pub use state::AppState;
pub use tree::{ChildLink, LinkNode, LinkTree, NodeId, TreeError};
pub use update::update;
pub use view_model::{AppViewModel, JobRowView, TreeRowView};
