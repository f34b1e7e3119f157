use tokio::sync::mpsc::UnboundedSender;
use webclick_core::{Effect, JobId, Msg};
use webclick_engine::Engine;
use webclick_logging::{webclick_debug, webclick_info, webclick_warn};

/// Executes reducer effects against the engine and reports back as messages.
pub struct EffectRunner {
    engine: Engine,
    msg_tx: UnboundedSender<Msg>,
}

impl EffectRunner {
    pub fn new(engine: Engine, msg_tx: UnboundedSender<Msg>) -> Self {
        Self { engine, msg_tx }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn enqueue(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::ClearDiscovery => self.engine.clear_discovery(),
                Effect::ResolveLinks {
                    generation,
                    node,
                    url,
                } => {
                    webclick_debug!("ResolveLinks generation={generation} node={node:?} url={url}");
                    let engine = self.engine.clone();
                    let msg_tx = self.msg_tx.clone();
                    tokio::spawn(async move {
                        let result = engine
                            .resolve_links(&url)
                            .await
                            .map_err(|err| err.to_string());
                        let _ = msg_tx.send(Msg::LinksResolved {
                            generation,
                            node,
                            result,
                        });
                    });
                }
                Effect::SubmitArchive { root_url, urls } => {
                    self.submit(&root_url, &urls);
                }
                Effect::CancelJob { job_id } => match self.engine.jobs().cancel(job_id) {
                    Ok(job) => {
                        let _ = self.msg_tx.send(Msg::JobUpdated(job));
                    }
                    Err(err) => webclick_warn!("cancel {job_id}: {err}"),
                },
            }
        }
    }

    fn submit(&self, root_url: &str, urls: &[String]) {
        let job_id = match self.engine.submit_archive(root_url, urls) {
            Ok(job_id) => job_id,
            Err(err) => {
                let _ = self.msg_tx.send(Msg::JobRejected(err.to_string()));
                return;
            }
        };
        match self.engine.jobs().status(job_id) {
            Ok(job) => {
                webclick_info!("{job_id} accepted with {} pages", job.pages.len());
                let _ = self.msg_tx.send(Msg::JobAccepted(job));
                self.forward_updates(job_id);
            }
            Err(err) => {
                let _ = self.msg_tx.send(Msg::JobRejected(err.to_string()));
            }
        }
    }

    /// Relays every snapshot of `job_id` until it is settled, so pages that
    /// finish rendering after a cancel still reach the view.
    fn forward_updates(&self, job_id: JobId) {
        let mut rx = match self.engine.jobs().subscribe(job_id) {
            Ok(rx) => rx,
            Err(err) => {
                webclick_warn!("cannot follow {job_id}: {err}");
                return;
            }
        };
        let msg_tx = self.msg_tx.clone();
        tokio::spawn(async move {
            loop {
                let snapshot = rx.borrow_and_update().clone();
                let done = snapshot.is_settled();
                if msg_tx.send(Msg::JobUpdated(snapshot)).is_err() || done {
                    break;
                }
                if rx.changed().await.is_err() {
                    break;
                }
            }
        });
    }
}
