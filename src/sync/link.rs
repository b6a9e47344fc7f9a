//! Live coupling between two components.
//!
//! A link forwards changes of source keys either to target keys
//! (`param`) or to explicit callbacks (`callback`). Parameter links may be
//! bidirectional, which installs a second watcher on the target. Each
//! direction remembers which keys it is currently applying and ignores
//! re-entrant changes of those keys.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use super::{ChangeEvent, StateValue, SyncContext, WatcherId};
use crate::component::Component;
use crate::error::{Result, UsageError};

/// Callback invoked with `(source, target, event)`.
pub type LinkCallback = Arc<dyn Fn(&Component, &Component, &ChangeEvent) -> Result<()> + Send + Sync>;

#[derive(Clone, Default)]
pub struct Link {
    params: Vec<(String, String)>,
    callbacks: Vec<(String, LinkCallback)>,
    bidirectional: bool,
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("params", &self.params)
            .field("callbacks", &self.callbacks.iter().map(|(k, _)| k).collect::<Vec<_>>())
            .field("bidirectional", &self.bidirectional)
            .finish()
    }
}

impl Link {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward `source` on this component to `target` on the other.
    pub fn param(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.params.push((source.into(), target.into()));
        self
    }

    pub fn callback<F>(mut self, source: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Component, &Component, &ChangeEvent) -> Result<()> + Send + Sync + 'static,
    {
        self.callbacks.push((source.into(), Arc::new(f)));
        self
    }

    pub fn bidirectional(mut self, enabled: bool) -> Self {
        self.bidirectional = enabled;
        self
    }
}

/// Registered link; dropping it keeps the link alive, `unlink` removes it.
#[derive(Debug)]
pub struct LinkHandle {
    source: Component,
    target: Component,
    forward: WatcherId,
    reverse: Option<WatcherId>,
}

impl LinkHandle {
    pub fn unlink(self) {
        self.source.unwatch(self.forward);
        if let Some(reverse) = self.reverse {
            self.target.unwatch(reverse);
        }
        crate::debug!("link"; "unlinked {} → {}", self.source.id(), self.target.id());
    }
}

type Updating = Arc<Mutex<FxHashSet<String>>>;

impl Component {
    /// Link this component to `target`. Nothing is registered on error.
    pub fn link(&self, target: &Component, link: Link) -> Result<LinkHandle> {
        match (link.params.is_empty(), link.callbacks.is_empty()) {
            (false, false) => return Err(UsageError::LinkConflict.into()),
            (true, true) => return Err(UsageError::LinkEmpty.into()),
            _ => {}
        }
        if !link.callbacks.is_empty() && link.bidirectional {
            return Err(UsageError::LinkCallbacksBidirectional.into());
        }
        for (source, dest) in &link.params {
            self.inner.kind.require_param(source)?;
            target.inner.kind.require_param(dest)?;
        }
        for (source, _) in &link.callbacks {
            self.inner.kind.require_param(source)?;
        }

        let forward = if link.params.is_empty() {
            self.watch_callbacks(target, link.callbacks)?
        } else {
            self.watch_params(target, link.params.clone())?
        };
        let reverse = match link.bidirectional {
            true => {
                let inverted = link.params.into_iter().map(|(s, t)| (t, s)).collect();
                Some(target.watch_params(self, inverted)?)
            }
            false => None,
        };

        crate::debug!("link"; "linked {} → {} (bidirectional: {})", self.id(), target.id(), reverse.is_some());
        Ok(LinkHandle {
            source: self.clone(),
            target: target.clone(),
            forward,
            reverse,
        })
    }

    fn watch_params(&self, target: &Component, mapping: Vec<(String, String)>) -> Result<WatcherId> {
        let keys = mapping.iter().map(|(s, _)| s.clone()).collect();
        let target = target.downgrade();
        let updating: Updating = Arc::default();

        self.add_watcher(
            keys,
            Arc::new(move |ctx: &SyncContext, events: &[ChangeEvent]| -> Result<()> {
                let Some(target) = Component::upgrade(&target) else {
                    return Ok(());
                };
                for event in events {
                    if !updating.lock().insert(event.key.clone()) {
                        continue;
                    }
                    let changes: Vec<(String, StateValue)> = mapping
                        .iter()
                        .filter(|(source, _)| *source == event.key)
                        .map(|(_, dest)| (dest.clone(), event.new.clone()))
                        .collect();
                    let result = target.set_with(ctx, changes);
                    updating.lock().remove(&event.key);
                    result?;
                }
                Ok(())
            }),
        )
    }

    fn watch_callbacks(&self, target: &Component, callbacks: Vec<(String, LinkCallback)>) -> Result<WatcherId> {
        let keys = callbacks.iter().map(|(s, _)| s.clone()).collect();
        let (source, target) = (self.downgrade(), target.downgrade());
        let updating: Updating = Arc::default();

        self.add_watcher(
            keys,
            Arc::new(move |_: &SyncContext, events: &[ChangeEvent]| -> Result<()> {
                let (Some(source), Some(target)) = (Component::upgrade(&source), Component::upgrade(&target)) else {
                    return Ok(());
                };
                for event in events {
                    if !updating.lock().insert(event.key.clone()) {
                        continue;
                    }
                    let result = callbacks
                        .iter()
                        .filter(|(key, _)| *key == event.key)
                        .try_for_each(|(_, cb)| cb(&source, &target, event));
                    updating.lock().remove(&event.key);
                    result?;
                }
                Ok(())
            }),
        )
    }
}
