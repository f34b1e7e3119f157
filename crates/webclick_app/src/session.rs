use tokio::sync::mpsc::{self, UnboundedReceiver};
use webclick_core::{update, AppState, AppViewModel, Msg, NodeId};
use webclick_engine::Engine;

use crate::effects::EffectRunner;

/// Owns the session state and funnels every change through the reducer.
pub struct Session {
    state: AppState,
    runner: EffectRunner,
    msg_rx: UnboundedReceiver<Msg>,
}

impl Session {
    pub fn new(engine: Engine) -> Self {
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        Self {
            state: AppState::new(),
            runner: EffectRunner::new(engine, msg_tx),
            msg_rx,
        }
    }

    pub fn engine(&self) -> &Engine {
        self.runner.engine()
    }

    pub fn view(&self) -> AppViewModel {
        self.state.view()
    }

    pub fn dispatch(&mut self, msg: Msg) {
        let state = std::mem::take(&mut self.state);
        let (state, effects) = update(state, msg);
        self.state = state;
        self.runner.enqueue(effects);
    }

    /// Applies every message that has already arrived.
    pub fn drain(&mut self) {
        while let Ok(msg) = self.msg_rx.try_recv() {
            self.dispatch(msg);
        }
    }

    /// Processes incoming messages until `done` holds for the view.
    pub async fn run_until(&mut self, done: impl Fn(&AppViewModel) -> bool) {
        while !done(&self.state.view()) {
            match self.msg_rx.recv().await {
                Some(msg) => self.dispatch(msg),
                None => break,
            }
        }
    }

    /// Waits for the outstanding resolution of `node`, if any.
    pub async fn settle(&mut self, node: NodeId) {
        self.run_until(|view| !view.rows.iter().any(|row| row.node == node && row.loading))
            .await;
    }
}
