//! DOM-event dispatch.
//!
//! An inbound `{node, data: {type, ...}}` notification fires, in order:
//!
//! | Tier | Source                                         |
//! |------|------------------------------------------------|
//! | 1    | convention method `_{node}_{event}`            |
//! | 2    | `on_event(node, event)` callbacks              |
//! | 3    | `on_event(node, "*")` callbacks                |
//! | 4    | `on_event("*", event)` callbacks               |
//! | 5    | `on_event("*", "*")` callbacks                 |
//! | 6    | inline template callbacks (`onclick="${m}"`)   |
//!
//! Within a tier, callbacks run in registration order.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::channel::OutboundMessage;
use crate::component::Component;
use crate::error::{Result, UsageError};
use crate::ids::RootId;
use crate::sync::{SyncContext, deliver};
use crate::value::{Changes, Value};

/// Matches every node or every event type.
pub const WILDCARD: &str = "*";

/// node → event → declared in the component type (`false`: callback only)
pub type EventMap = BTreeMap<String, BTreeMap<String, bool>>;

pub type EventCallback = Arc<dyn Fn(&Component, &DomEvent) + Send + Sync>;

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomEvent {
    pub node: String,
    pub data: EventData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub payload: Changes,
}

impl DomEvent {
    pub fn new(node: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            data: EventData {
                kind: kind.into(),
                payload: Changes::new(),
            },
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.payload.insert(key.into(), value.into());
        self
    }

    #[inline]
    pub fn event_type(&self) -> &str {
        &self.data.kind
    }
}

// ============================================================================
// EventRegistry
// ============================================================================

/// Runtime `on_event` callbacks: node → event → callbacks.
#[derive(Default)]
pub struct EventRegistry {
    callbacks: BTreeMap<String, BTreeMap<String, Vec<EventCallback>>>,
}

impl EventRegistry {
    pub fn register(&mut self, node: &str, event: &str, callback: EventCallback) {
        self.callbacks
            .entry(node.to_string())
            .or_default()
            .entry(event.to_string())
            .or_default()
            .push(callback);
    }

    /// Callbacks of tiers 2-5 for one event, in dispatch order.
    pub fn matching(&self, node: &str, event: &str) -> SmallVec<[EventCallback; 4]> {
        let tiers = [(node, event), (node, WILDCARD), (WILDCARD, event), (WILDCARD, WILDCARD)];
        let mut out = SmallVec::new();
        for (i, (n, e)) in tiers.iter().enumerate() {
            // an incoming wildcard must not fire the same list twice
            if tiers[..i].contains(&(*n, *e)) {
                continue;
            }
            if let Some(list) = self.callbacks.get(*n).and_then(|events| events.get(*e)) {
                out.extend(list.iter().cloned());
            }
        }
        out
    }

    /// Every registered (node, event) pair.
    pub fn subscriptions(&self) -> impl Iterator<Item = (&str, &str)> {
        self.callbacks.iter().flat_map(|(node, events)| {
            events
                .keys()
                .map(move |event| (node.as_str(), event.as_str()))
        })
    }
}

// ============================================================================
// Component integration
// ============================================================================

impl Component {
    /// Register `callback` for `event` on `node` (`*` matches any).
    pub fn on_event<F>(&self, node: &str, event: &str, callback: F) -> Result<()>
    where
        F: Fn(&Component, &DomEvent) + Send + Sync + 'static,
    {
        let kind = &self.inner.kind;
        if node != WILDCARD && !kind.binding.has_node(node) {
            return Err(UsageError::UnknownNode {
                node: node.to_string(),
                nodes: kind.binding.nodes.clone(),
            }
            .into());
        }
        self.inner.events.lock().register(node, event, Arc::new(callback));
        crate::debug!("event"; "{} subscribed {}:{}", self.inner.id, node, event);

        let events = self.events_map();
        let targets: Vec<_> = self
            .inner
            .views
            .lock()
            .values()
            .map(|v| (v.target(self.inner.id), Arc::clone(&v.channel), v.document.clone()))
            .collect();
        for (target, channel, document) in targets {
            deliver(&channel, &target, OutboundMessage::Events { events: events.clone() });
            document.touch(&channel);
        }
        Ok(())
    }

    /// Subscriptions sent to clients.
    pub fn events_map(&self) -> EventMap {
        let mut map = EventMap::new();
        for (node, events) in &self.inner.kind.dom_events {
            let entry = map.entry(node.clone()).or_default();
            for event in events {
                entry.insert(event.clone(), true);
            }
        }
        for (node, event) in self.inner.events.lock().subscriptions() {
            map.entry(node.to_string())
                .or_default()
                .entry(event.to_string())
                .or_insert(false);
        }
        map
    }

    /// Handle a DOM event from the view under `root`.
    ///
    /// Buffered client edits of that view are applied first so callbacks
    /// observe current state.
    pub fn handle_event(&self, ctx: &SyncContext, root: RootId, event: &DomEvent) -> Result<()> {
        let view = self.inner.views.lock().get(&root).map(|v| v.id);
        if let Some(view) = view {
            self.change_event(ctx, root, view)?;
        }
        self.dispatch(event);
        Ok(())
    }

    /// Fire every callback for `event`; returns how many ran.
    pub fn dispatch(&self, event: &DomEvent) -> usize {
        let kind = &self.inner.kind;
        let (node, event_type) = (event.node.as_str(), event.event_type());

        let mut callbacks: SmallVec<[EventCallback; 4]> = SmallVec::new();
        if let Some(method) = kind
            .convention_handler(node, event_type)
            .and_then(|name| kind.method(name))
        {
            callbacks.push(Arc::clone(method));
        }
        callbacks.extend(self.inner.events.lock().matching(node, event_type));
        callbacks.extend(
            kind.inline_callbacks
                .iter()
                .filter(|cb| cb.node == node && cb.fires_on(event_type))
                .filter_map(|cb| kind.method(&cb.method).cloned()),
        );

        crate::debug!("event"; "{}:{} → {} callback(s)", node, event_type, callbacks.len());
        for callback in &callbacks {
            callback(self, event);
        }
        callbacks.len()
    }
}
