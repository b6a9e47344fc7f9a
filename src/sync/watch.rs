//! Server-side watchers.
//!
//! A watcher observes a fixed set of keys and is called once per change
//! cycle with the events for those keys, after all views were updated.
//! Links are built on watchers.

use std::sync::Arc;

use super::{ChangeEvent, SyncContext};
use crate::component::Component;
use crate::error::Result;

pub use crate::ids::WatcherId;

pub type WatchFn = Arc<dyn Fn(&SyncContext, &[ChangeEvent]) -> Result<()> + Send + Sync>;

pub(crate) struct Watcher {
    pub(crate) id: WatcherId,
    keys: Vec<String>,
    callback: WatchFn,
}

impl Component {
    /// Call `callback` whenever any of `keys` changes.
    pub fn watch<F>(&self, keys: &[&str], callback: F) -> Result<WatcherId>
    where
        F: Fn(&SyncContext, &[ChangeEvent]) -> Result<()> + Send + Sync + 'static,
    {
        let keys = keys.iter().map(|k| k.to_string()).collect();
        self.add_watcher(keys, Arc::new(callback))
    }

    pub(crate) fn add_watcher(&self, keys: Vec<String>, callback: WatchFn) -> Result<WatcherId> {
        for key in &keys {
            self.inner.kind.require_param(key)?;
        }
        let id = WatcherId::next();
        self.inner.watchers.lock().push(Watcher { id, keys, callback });
        Ok(id)
    }

    /// Remove a watcher; `false` if it was not registered.
    pub fn unwatch(&self, id: WatcherId) -> bool {
        let mut watchers = self.inner.watchers.lock();
        let before = watchers.len();
        watchers.retain(|w| w.id != id);
        watchers.len() != before
    }

    /// Run watchers in registration order; the first error stops the chain.
    pub(crate) fn notify_watchers(&self, ctx: &SyncContext, events: &[ChangeEvent]) -> Result<()> {
        let matched: Vec<(WatchFn, Vec<ChangeEvent>)> = self
            .inner
            .watchers
            .lock()
            .iter()
            .filter_map(|w| {
                let relevant: Vec<ChangeEvent> = events
                    .iter()
                    .filter(|e| w.keys.contains(&e.key))
                    .cloned()
                    .collect();
                (!relevant.is_empty()).then(|| (Arc::clone(&w.callback), relevant))
            })
            .collect();

        for (callback, events) in matched {
            callback(ctx, &events)?;
        }
        Ok(())
    }
}
