use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Handle to a node of one [`LinkTree`]. Handles are never reused within a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// One outbound link discovered on a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildLink {
    pub url: String,
    pub title: String,
}

impl ChildLink {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkNode {
    pub url: String,
    pub title: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub expanded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error("node {0:?} is not part of the tree")]
    UnknownNode(NodeId),
}

/// Hierarchy of discovered links, grown one node at a time.
///
/// Nodes live in an arena; a collapsed subtree frees its slots but the
/// handles are not handed out again, so a stale [`NodeId`] resolves to
/// [`TreeError::UnknownNode`] instead of to an unrelated node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTree {
    nodes: Vec<Option<LinkNode>>,
    root: NodeId,
}

impl LinkTree {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        let root = LinkNode {
            url: url.into(),
            title: title.into(),
            parent: None,
            children: Vec::new(),
            expanded: false,
        };
        Self {
            nodes: vec![Some(root)],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn get(&self, id: NodeId) -> Option<&LinkNode> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    pub fn node(&self, id: NodeId) -> Result<&LinkNode, TreeError> {
        self.get(id).ok_or(TreeError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut LinkNode, TreeError> {
        self.nodes
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(TreeError::UnknownNode(id))
    }

    /// Number of live nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// URL that has to be resolved to expand `id`, or `None` when the node is
    /// already expanded.
    pub fn expansion_target(&self, id: NodeId) -> Result<Option<&str>, TreeError> {
        let node = self.node(id)?;
        if node.expanded {
            Ok(None)
        } else {
            Ok(Some(node.url.as_str()))
        }
    }

    /// Attaches resolved children to `id` and marks it expanded.
    ///
    /// Children keep the given order; a URL already present under `id`, and
    /// the node's own URL, are skipped. Attaching to an expanded node is a
    /// no-op. Returns the number of nodes added.
    pub fn attach_children(&mut self, id: NodeId, links: &[ChildLink]) -> Result<usize, TreeError> {
        let parent = self.node(id)?;
        if parent.expanded {
            return Ok(0);
        }

        let mut seen: HashSet<String> = HashSet::with_capacity(links.len() + 1);
        seen.insert(parent.url.clone());

        let mut added = Vec::with_capacity(links.len());
        for link in links {
            if !seen.insert(link.url.clone()) {
                continue;
            }
            let child = NodeId(self.nodes.len());
            self.nodes.push(Some(LinkNode {
                url: link.url.clone(),
                title: link.title.clone(),
                parent: Some(id),
                children: Vec::new(),
                expanded: false,
            }));
            added.push(child);
        }

        let count = added.len();
        let parent = self.node_mut(id)?;
        parent.children = added;
        parent.expanded = true;
        Ok(count)
    }

    /// Detaches every descendant of `id` and clears its expanded flag.
    /// Returns the number of nodes removed.
    pub fn collapse(&mut self, id: NodeId) -> Result<usize, TreeError> {
        let node = self.node_mut(id)?;
        let mut pending = std::mem::take(&mut node.children);
        node.expanded = false;

        let mut removed = 0;
        while let Some(child) = pending.pop() {
            if let Some(slot) = self.nodes.get_mut(child.0) {
                if let Some(detached) = slot.take() {
                    pending.extend(detached.children);
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    /// Path from `id` up to the root, starting with `id`.
    pub fn ancestry(&self, id: NodeId) -> Result<Vec<NodeId>, TreeError> {
        let mut path = vec![id];
        let mut current = self.node(id)?;
        while let Some(parent) = current.parent {
            path.push(parent);
            current = self.node(parent)?;
        }
        Ok(path)
    }

    pub fn depth(&self, id: NodeId) -> Result<usize, TreeError> {
        Ok(self.ancestry(id)?.len() - 1)
    }

    /// Depth-first, pre-order listing of the live nodes with their depth.
    pub fn walk(&self) -> Vec<(NodeId, usize)> {
        let mut rows = Vec::with_capacity(self.len());
        let mut stack = vec![(self.root, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            let Some(node) = self.get(id) else {
                continue;
            };
            rows.push((id, depth));
            for child in node.children.iter().rev() {
                stack.push((*child, depth + 1));
            }
        }
        rows
    }
}
