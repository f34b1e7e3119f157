use crate::{normalize_url, AppState, Effect, Msg};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: AppState, msg: Msg) -> (AppState, Vec<Effect>) {
    let effects = match msg {
        Msg::RootSubmitted(raw) => match normalize_url(&raw) {
            Ok(url) => {
                let root = state.reset_tree(url.clone());
                state.begin_loading(root);
                vec![
                    Effect::ClearDiscovery,
                    Effect::ResolveLinks {
                        generation: state.generation(),
                        node: root,
                        url,
                    },
                ]
            }
            Err(err) => {
                state.set_error(err.to_string());
                Vec::new()
            }
        },
        Msg::ExpandClicked(node) => {
            let target = match state.tree().map(|tree| tree.expansion_target(node)) {
                Some(Ok(Some(url))) => url.to_string(),
                Some(Ok(None)) | None => return (state, Vec::new()),
                Some(Err(err)) => {
                    state.set_error(err.to_string());
                    return (state, Vec::new());
                }
            };
            // One outstanding resolution per node.
            if !state.begin_loading(node) {
                return (state, Vec::new());
            }
            vec![Effect::ResolveLinks {
                generation: state.generation(),
                node,
                url: target,
            }]
        }
        Msg::LinksResolved {
            generation,
            node,
            result,
        } => {
            if generation != state.generation() || !state.finish_loading(node) {
                return (state, Vec::new());
            }
            match result {
                Ok(children) => state.attach(node, &children),
                Err(message) => {
                    let url = state
                        .tree()
                        .and_then(|tree| tree.get(node))
                        .map(|n| n.url.clone())
                        .unwrap_or_default();
                    state.set_error(format!("could not expand {url}: {message}"));
                }
            }
            Vec::new()
        }
        Msg::CollapseClicked(node) => {
            state.collapse(node);
            Vec::new()
        }
        Msg::SelectionToggled(node) => {
            let url = state
                .tree()
                .and_then(|tree| tree.get(node))
                .map(|n| n.url.clone());
            if let Some(url) = url {
                state.toggle_selection(&url);
            }
            Vec::new()
        }
        Msg::ArchiveClicked => {
            let root_url = state
                .tree()
                .and_then(|tree| tree.get(tree.root()))
                .map(|n| n.url.clone());
            let Some(root_url) = root_url else {
                state.set_error("open a root URL first");
                return (state, Vec::new());
            };
            if state.selected().is_empty() {
                state.set_error("no pages selected");
                return (state, Vec::new());
            }
            vec![Effect::SubmitArchive {
                root_url,
                urls: state.selected().to_vec(),
            }]
        }
        Msg::JobAccepted(job) | Msg::JobUpdated(job) => {
            state.apply_job(job);
            Vec::new()
        }
        Msg::JobRejected(message) => {
            state.set_error(message);
            Vec::new()
        }
        Msg::CancelClicked(job_id) => match state.job(job_id) {
            Some(job) if !job.is_terminal() => vec![Effect::CancelJob { job_id }],
            _ => Vec::new(),
        },
        Msg::Tick | Msg::NoOp => Vec::new(),
    };

    (state, effects)
}
