//! Session Actor - drives one session document
//!
//! Receives inbound wire messages for the components of one session and
//! runs the document's task queue: next-tick tasks right away, debounce and
//! echo-expiry timeouts when their deadline passes.

use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;
use tokio::sync::mpsc;

use super::messages::SessionMsg;
use crate::component::Component;
use crate::config::cfg;
use crate::document::Document;
use crate::ids::{ComponentId, RootId};

pub struct SessionActor {
    rx: mpsc::Receiver<SessionMsg>,
    document: Document,
    components: FxHashMap<ComponentId, Component>,
}

impl SessionActor {
    pub fn new(document: Document, rx: mpsc::Receiver<SessionMsg>) -> Self {
        Self {
            rx,
            document,
            components: FxHashMap::default(),
        }
    }

    /// Create an actor together with the sender feeding it.
    pub fn channel(document: Document, capacity: usize) -> (mpsc::Sender<SessionMsg>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self::new(document, rx))
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        loop {
            let idle = self
                .document
                .sleep_duration(Instant::now())
                .unwrap_or_else(|| idle_interval());

            tokio::select! {
                biased;
                msg = self.rx.recv() => match msg {
                    Some(SessionMsg::Shutdown) | None => break,
                    Some(msg) => self.handle(msg),
                },
                _ = tokio::time::sleep(idle) => {}
            }

            self.document.run_pending(Instant::now());
        }

        let flushed = self.document.flush_all();
        crate::debug!("session"; "{} stopped, flushed {} task(s)", self.document.id(), flushed);
    }

    fn handle(&mut self, msg: SessionMsg) {
        match msg {
            SessionMsg::Register(component) => {
                self.components.insert(component.id(), component);
            }
            SessionMsg::Inbound {
                component,
                root,
                payload,
            } => self.handle_inbound(component, root, &payload),
            SessionMsg::Shutdown => {}
        }
    }

    fn handle_inbound(&self, component: ComponentId, root: RootId, payload: &str) {
        let Some(target) = self.components.get(&component) else {
            crate::debug!("session"; "message for unregistered component {}", component);
            return;
        };
        let ctx = self.document.context().with_origin(root);
        let _cycle = self.document.enter();
        if let Err(e) = target.handle_message(&ctx, root, payload) {
            crate::log!("error"; "{} rejected message from {}: {}", component, root, e);
        }
    }
}

/// Sleep used when nothing is scheduled.
fn idle_interval() -> Duration {
    cfg().sync.timeout()
}
