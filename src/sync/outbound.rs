//! Server → client propagation.
//!
//! A batch of change events becomes one `update` message per view (only the
//! properties that differ from the view's mirror) plus one `children`
//! message when child slots changed.
//!
//! Views reached through a direct channel, or whose document is unblocked
//! for the current context, are updated immediately. Everything else is
//! queued as a next-tick task on the view's document; once a view has a
//! deferred task, later work for it is deferred too so pushes stay FIFO.

use std::sync::Arc;
use std::time::Instant;

use super::{ChangeEvent, StateValue, SyncContext};
use crate::channel::{Channel, ChannelKind, OutboundMessage, ViewRef};
use crate::children::{ChildList, literal_entries, reconcile};
use crate::component::{ChildSlotKind, Component};
use crate::config::cfg;
use crate::ids::{RootId, ViewId};
use crate::value::{self, Changes, Value};

/// Send one message; delivery failures are logged, never retried.
pub(crate) fn deliver(channel: &Arc<dyn Channel>, target: &ViewRef, message: OutboundMessage) {
    if let Err(err) = channel.send(target, message) {
        crate::debug!("sync"; "dropped message for {}/{}: {}", target.root, target.view, err);
    }
}

type ViewOp = dyn Fn(&Component, &SyncContext, RootId, ViewId) + Send + Sync;

impl Component {
    /// Map state pairs to client properties (renamed, transformed, sanitized).
    pub(crate) fn outbound_properties<'a, I>(&self, pairs: I) -> Changes
    where
        I: IntoIterator<Item = (&'a str, &'a Value)>,
    {
        let props = self.inner.kind.transforms.to_properties(pairs);
        if !cfg().sync.sanitize_strings {
            return props;
        }
        props
            .into_iter()
            .map(|(k, v)| (k, value::sanitize(v)))
            .collect()
    }

    /// Push a batch of server-side changes to every mounted view.
    pub(crate) fn param_change(&self, ctx: &SyncContext, events: &[ChangeEvent]) {
        let kind = &self.inner.kind;
        // stream/patch send their own column messages
        let skip_data = match self.inner.is_updating() {
            true => kind.data_param.as_deref(),
            false => None,
        };

        let mut data = Vec::new();
        let mut child_keys = Vec::new();
        for event in events {
            if skip_data == Some(event.key.as_str()) {
                continue;
            }
            if kind.slots.contains_key(&event.key) {
                child_keys.push(event.key.clone());
                continue;
            }
            if let StateValue::Data(v) = &event.new {
                data.push((event.key.as_str(), v));
            }
        }

        let props = self.outbound_properties(data);
        if props.is_empty() && child_keys.is_empty() {
            return;
        }

        self.for_each_view(ctx, move |component, _, root, view| {
            component.update_view(root, view, props.clone(), &child_keys);
        });
    }

    /// Run `op` for every view, now or as a deferred task per view.
    pub(crate) fn for_each_view<F>(&self, ctx: &SyncContext, op: F)
    where
        F: Fn(&Component, &SyncContext, RootId, ViewId) + Send + Sync + 'static,
    {
        let op: Arc<ViewOp> = Arc::new(op);
        let targets: Vec<_> = {
            let mut views = self.inner.views.lock();
            views
                .values_mut()
                .map(|view| {
                    let direct = view.channel.kind() == ChannelKind::Direct;
                    let defer = view.deferred > 0 || !(direct || view.document.is_unblocked(ctx));
                    if defer {
                        view.deferred += 1;
                    }
                    (view.root, view.id, view.document.clone(), defer)
                })
                .collect()
        };

        for (root, view, document, defer) in targets {
            if defer {
                let component = self.clone();
                let op = Arc::clone(&op);
                crate::debug!("sync"; "deferred update of {} under {}", view, root);
                document.add_next_tick(Box::new(move |ctx: &SyncContext| {
                    if component.finish_deferred(root, view) {
                        op(&component, ctx, root, view);
                    }
                }));
            } else {
                let _cycle = document.enter();
                op(self, ctx, root, view);
            }
        }
    }

    /// Account for a deferred task; `false` if its view is gone.
    fn finish_deferred(&self, root: RootId, view: ViewId) -> bool {
        match self.inner.views.lock().get_mut(&root) {
            Some(v) if v.id == view => {
                v.deferred = v.deferred.saturating_sub(1);
                true
            }
            _ => {
                crate::debug!("sync"; "skipping deferred update of released view {}", view);
                false
            }
        }
    }

    pub(crate) fn update_view(
        &self,
        root: RootId,
        view: ViewId,
        props: Changes,
        child_keys: &[String],
    ) {
        let now = Instant::now();
        let staged = {
            let mut views = self.inner.views.lock();
            let Some(v) = views.get_mut(&root).filter(|v| v.id == view) else {
                return;
            };
            let send = v.stage_update(props, now);
            let expiry = self.schedule_expiry(v, now);
            (send, v.target(self.inner.id), Arc::clone(&v.channel), v.document.clone(), expiry)
        };
        let (send, target, channel, document, expiry) = staged;

        if !send.is_empty() {
            crate::debug!("echo"; "{} ← {:?}", target.view, send.keys().collect::<Vec<_>>());
            deliver(&channel, &target, OutboundMessage::Update { properties: send });
            document.touch(&channel);
        }
        if let Some(delay) = expiry {
            let component = self.clone();
            document.add_timeout(
                delay,
                Box::new(move |_: &SyncContext| component.flush_expired(root, view, Instant::now())),
            );
        }
        if !child_keys.is_empty() {
            self.update_children(root, view, child_keys);
        }
    }

    /// Delay until held values must be flushed, if a flush is not already
    /// scheduled.
    fn schedule_expiry(&self, view: &mut crate::view::View, now: Instant) -> Option<std::time::Duration> {
        if view.expiry_scheduled {
            return None;
        }
        let deadline = view.echo.next_expiry()?;
        view.expiry_scheduled = true;
        Some(deadline.saturating_duration_since(now))
    }

    /// Send held values whose markers expired for one view.
    pub(crate) fn flush_expired(&self, root: RootId, view: ViewId, now: Instant) {
        let staged = {
            let mut views = self.inner.views.lock();
            let Some(v) = views.get_mut(&root).filter(|v| v.id == view) else {
                return;
            };
            v.expiry_scheduled = false;
            let send = v.stage_update(Changes::new(), now);
            let expiry = self.schedule_expiry(v, now);
            (send, v.target(self.inner.id), Arc::clone(&v.channel), v.document.clone(), expiry)
        };
        let (send, target, channel, document, expiry) = staged;

        if !send.is_empty() {
            crate::debug!("echo"; "flushing expired {:?} to {}", send.keys().collect::<Vec<_>>(), view);
            deliver(&channel, &target, OutboundMessage::Update { properties: send });
            document.touch(&channel);
        }
        if let Some(delay) = expiry {
            let component = self.clone();
            document.add_timeout(
                delay,
                Box::new(move |_: &SyncContext| component.flush_expired(root, view, Instant::now())),
            );
        }
    }

    /// Flush held values of every view whose echo markers expired by `now`.
    pub fn expire_echoes(&self, now: Instant) {
        let views: Vec<_> = self
            .inner
            .views
            .lock()
            .values()
            .map(|v| (v.root, v.id))
            .collect();
        for (root, view) in views {
            self.flush_expired(root, view, now);
        }
    }

    /// Reconcile changed child slots of one view and send its child map.
    fn update_children(&self, root: RootId, view: ViewId, keys: &[String]) {
        let kind = &self.inner.kind;
        let (mount_ctx, previous) = {
            let views = self.inner.views.lock();
            let Some(v) = views.get(&root).filter(|v| v.id == view) else {
                return;
            };
            let previous: Vec<ChildList> = keys
                .iter()
                .map(|k| v.snapshot.get(k).cloned().unwrap_or_default())
                .collect();
            (v.child_context(self.inner.id), previous)
        };

        let mut slot_updates = Vec::new();
        for (key, old) in keys.iter().zip(previous) {
            let Some(slot) = kind.slots.get(key) else {
                continue;
            };
            match (slot.kind, self.get(key)) {
                (ChildSlotKind::Literal, Some(StateValue::Data(value))) => {
                    let names = match &value {
                        Value::Object(map) => Some(map.keys().cloned().collect()),
                        _ => None,
                    };
                    slot_updates.push((key, &slot.node, literal_entries(&value), names, None));
                }
                (_, Some(StateValue::Children(new))) => {
                    if new.same_as(&old) {
                        continue;
                    }
                    match reconcile(&mount_ctx, &old, &new) {
                        Ok(update) => {
                            slot_updates.push((key, &slot.node, update.entries, update.names, Some(new)));
                        }
                        Err(err) => {
                            crate::log!("error"; "failed to mount children of {}.{}: {}", kind.name, key, err);
                        }
                    }
                }
                _ => {}
            }
        }
        if slot_updates.is_empty() {
            return;
        }

        let staged = {
            let mut views = self.inner.views.lock();
            let Some(v) = views.get_mut(&root).filter(|v| v.id == view) else {
                return;
            };
            for (key, node, entries, names, snapshot) in slot_updates {
                v.children.insert(node.clone(), entries);
                match names {
                    Some(names) => v.child_names.insert(node.clone(), names),
                    None => v.child_names.remove(node),
                };
                if let Some(list) = snapshot {
                    v.snapshot.insert(key.clone(), list);
                }
            }
            let message = OutboundMessage::Children {
                children: v.children.clone(),
                child_names: v.child_names.clone(),
            };
            (message, v.target(self.inner.id), Arc::clone(&v.channel), v.document.clone())
        };
        let (message, target, channel, document) = staged;
        deliver(&channel, &target, message);
        document.touch(&channel);
    }
}
