use pretty_assertions::assert_eq;
use webclick_core::{ChildLink, LinkTree, TreeError};

fn links(urls: &[&str]) -> Vec<ChildLink> {
    urls.iter()
        .map(|u| ChildLink::new(*u, format!("title of {u}")))
        .collect()
}

#[test]
fn new_tree_has_only_an_unexpanded_root() {
    let tree = LinkTree::new("https://example.com", "Example");
    let root = tree.node(tree.root()).unwrap();

    assert_eq!(tree.len(), 1);
    assert_eq!(root.parent, None);
    assert!(!root.expanded);
    assert_eq!(
        tree.expansion_target(tree.root()).unwrap(),
        Some("https://example.com")
    );
}

#[test]
fn attach_keeps_order_and_drops_duplicates_and_self() {
    let mut tree = LinkTree::new("https://example.com", "Example");
    let root = tree.root();
    let added = tree
        .attach_children(
            root,
            &links(&[
                "https://example.com/b",
                "https://example.com/a",
                "https://example.com/b",
                "https://example.com",
            ]),
        )
        .unwrap();

    assert_eq!(added, 2);
    let urls: Vec<_> = tree
        .node(root)
        .unwrap()
        .children
        .iter()
        .map(|id| tree.node(*id).unwrap().url.clone())
        .collect();
    assert_eq!(urls, vec!["https://example.com/b", "https://example.com/a"]);
    assert!(tree.node(root).unwrap().expanded);
    assert_eq!(tree.expansion_target(root).unwrap(), None);
}

#[test]
fn attaching_to_an_expanded_node_is_a_noop() {
    let mut tree = LinkTree::new("https://example.com", "Example");
    let root = tree.root();
    tree.attach_children(root, &links(&["https://example.com/a"]))
        .unwrap();
    let again = tree
        .attach_children(root, &links(&["https://example.com/z"]))
        .unwrap();

    assert_eq!(again, 0);
    assert_eq!(tree.len(), 2);
}

#[test]
fn collapse_removes_the_whole_subtree_but_keeps_the_node() {
    let mut tree = LinkTree::new("https://example.com", "Example");
    let root = tree.root();
    tree.attach_children(root, &links(&["https://example.com/a", "https://example.com/b"]))
        .unwrap();
    let a = tree.node(root).unwrap().children[0];
    tree.attach_children(a, &links(&["https://example.com/a/1", "https://example.com/a/2"]))
        .unwrap();
    let a1 = tree.node(a).unwrap().children[0];
    assert_eq!(tree.len(), 5);
    assert_eq!(tree.depth(a1).unwrap(), 2);
    assert_eq!(tree.ancestry(a1).unwrap(), vec![a1, a, root]);

    let removed = tree.collapse(root).unwrap();

    assert_eq!(removed, 4);
    assert_eq!(tree.len(), 1);
    assert!(!tree.node(root).unwrap().expanded);
    assert!(tree.node(root).unwrap().children.is_empty());
    assert_eq!(tree.node(a1), Err(TreeError::UnknownNode(a1)));
}

#[test]
fn handles_are_not_reused_after_collapse() {
    let mut tree = LinkTree::new("https://example.com", "Example");
    let root = tree.root();
    tree.attach_children(root, &links(&["https://example.com/a"]))
        .unwrap();
    let old = tree.node(root).unwrap().children[0];
    tree.collapse(root).unwrap();
    tree.attach_children(root, &links(&["https://example.com/a"]))
        .unwrap();
    let new = tree.node(root).unwrap().children[0];

    assert_ne!(old, new);
    assert!(tree.get(old).is_none());
}

#[test]
fn the_same_url_may_appear_under_different_parents() {
    let mut tree = LinkTree::new("https://example.com", "Example");
    let root = tree.root();
    tree.attach_children(root, &links(&["https://example.com/a", "https://example.com/b"]))
        .unwrap();
    let a = tree.node(root).unwrap().children[0];
    tree.attach_children(a, &links(&["https://example.com/b"]))
        .unwrap();

    assert_eq!(tree.len(), 4);
}

#[test]
fn walk_lists_nodes_depth_first() {
    let mut tree = LinkTree::new("https://example.com", "Example");
    let root = tree.root();
    tree.attach_children(root, &links(&["https://example.com/a", "https://example.com/b"]))
        .unwrap();
    let a = tree.node(root).unwrap().children[0];
    tree.attach_children(a, &links(&["https://example.com/a/1"]))
        .unwrap();

    let rows: Vec<_> = tree
        .walk()
        .into_iter()
        .map(|(id, depth)| (tree.node(id).unwrap().url.clone(), depth))
        .collect();
    assert_eq!(
        rows,
        vec![
            ("https://example.com".to_string(), 0),
            ("https://example.com/a".to_string(), 1),
            ("https://example.com/a/1".to_string(), 2),
            ("https://example.com/b".to_string(), 1),
        ]
    );
}
