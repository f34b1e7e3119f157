use webclick_core::{LinkTree, NodeId, TreeError};

use crate::cache::DiscoveryCache;
use crate::resolve::ResolveError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExpandError {
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// Expands `node` one level through the discovery cache.
///
/// An expanded node is left alone. On a resolution error the tree is not
/// touched. Returns the number of children attached.
pub async fn expand(
    tree: &mut LinkTree,
    node: NodeId,
    cache: &DiscoveryCache,
) -> Result<usize, ExpandError> {
    let Some(url) = tree.expansion_target(node)?.map(str::to_string) else {
        return Ok(0);
    };
    let entry = cache.get_or_resolve(&url).await?;
    Ok(tree.attach_children(node, &entry.links)?)
}

/// Hides the subtree under `node`. Cached resolutions survive, so expanding
/// again does not fetch.
pub fn collapse(tree: &mut LinkTree, node: NodeId) -> Result<usize, ExpandError> {
    Ok(tree.collapse(node)?)
}
