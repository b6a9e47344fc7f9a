//! Live component state.
//!
//! A [`Component`] is a cheap handle; clones share the same state, views
//! and registries. Every change goes through one path:
//!
//! ```text
//! validate ─► enter cycle ─► diff + store ─► param_change (views) ─► watchers
//! ```
//!
//! Validation happens before anything is stored, so a rejected batch leaves
//! no partial effect.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use super::{ChildSlotKind, ComponentType};
use crate::channel::{OutboundMessage, RenderMessage};
use crate::children::{
    ChildHandle, ChildList, MountContext, Renderable, literal_entries, reconcile,
};
use crate::document::Document;
use crate::error::{Result, SyncError, UsageError};
use crate::events::EventRegistry;
use crate::ids::{ComponentId, RootId, SessionId, ViewId};
use crate::sync::watch::Watcher;
use crate::sync::{ChangeEvent, Origin, StateValue, SyncContext};
use crate::utils::html;
use crate::value::{Changes, Value, type_name};
use crate::view::{EchoTracker, View};

pub(crate) struct ComponentInner {
    pub(crate) id: ComponentId,
    pub(crate) kind: Arc<ComponentType>,
    pub(crate) state: Mutex<FxHashMap<String, StateValue>>,
    pub(crate) views: Mutex<FxHashMap<RootId, View>>,
    pub(crate) events: Mutex<EventRegistry>,
    pub(crate) watchers: Mutex<Vec<Watcher>>,
    /// Session inside a change cycle, with nesting depth.
    pub(crate) cycle: Mutex<Option<(SessionId, usize)>>,
    /// Raised while stream/patch apply their own column messages.
    pub(crate) updating: AtomicBool,
}

#[derive(Clone)]
pub struct Component {
    pub(crate) inner: Arc<ComponentInner>,
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("id", &self.inner.id)
            .field("type", &self.inner.kind.name)
            .finish()
    }
}

impl Component {
    pub fn new(kind: &Arc<ComponentType>) -> Self {
        let state = kind
            .params
            .iter()
            .map(|spec| {
                let value = match kind.slots.get(&spec.name).map(|s| s.kind) {
                    Some(ChildSlotKind::Model | ChildSlotKind::Template) => {
                        StateValue::Children(ChildList::empty())
                    }
                    _ => StateValue::Data(spec.default.clone()),
                };
                (spec.name.clone(), value)
            })
            .collect();

        Self {
            inner: Arc::new(ComponentInner {
                id: ComponentId::next(),
                kind: Arc::clone(kind),
                state: Mutex::new(state),
                views: Mutex::new(FxHashMap::default()),
                events: Mutex::new(EventRegistry::default()),
                watchers: Mutex::new(Vec::new()),
                cycle: Mutex::new(None),
                updating: AtomicBool::new(false),
            }),
        }
    }

    /// Create an instance with initial values overriding the defaults.
    pub fn with_values<I, K, V>(kind: &Arc<ComponentType>, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<StateValue>,
    {
        let component = Self::new(kind);
        component.set(values)?;
        Ok(component)
    }

    #[inline]
    pub fn id(&self) -> ComponentId {
        self.inner.id
    }

    pub(crate) fn downgrade(&self) -> Weak<ComponentInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<ComponentInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    #[inline]
    pub fn kind(&self) -> &Arc<ComponentType> {
        &self.inner.kind
    }

    pub fn get(&self, key: &str) -> Option<StateValue> {
        self.inner.state.lock().get(key).cloned()
    }

    /// Current data value of `key` (`None` for unknown keys and child slots).
    pub fn value(&self, key: &str) -> Option<Value> {
        self.inner
            .state
            .lock()
            .get(key)
            .and_then(StateValue::as_data)
            .cloned()
    }

    pub fn children(&self, key: &str) -> Option<ChildList> {
        self.inner
            .state
            .lock()
            .get(key)
            .and_then(StateValue::as_children)
            .cloned()
    }

    /// Roots this component is currently mounted under.
    pub fn roots(&self) -> Vec<RootId> {
        self.inner.views.lock().keys().copied().collect()
    }

    /// Mirror of the client data container for the view under `root`.
    pub fn view_data(&self, root: RootId) -> Option<Changes> {
        self.inner
            .views
            .lock()
            .get(&root)
            .map(|v| v.data.values().clone())
    }

    /// Mount as a new top-level root of `document`.
    pub fn render(&self, document: &Document, channel: Arc<dyn crate::channel::Channel>) -> Result<RootId> {
        document.add_root(Arc::new(self.clone()), channel)
    }

    // ========================================================================
    // Changes
    // ========================================================================

    /// Apply server-side changes outside any session.
    pub fn set<I, K, V>(&self, changes: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<StateValue>,
    {
        self.set_with(&SyncContext::detached(), changes)
    }

    /// Apply server-side changes as one atomic batch under `ctx`.
    pub fn set_with<I, K, V>(&self, ctx: &SyncContext, changes: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<StateValue>,
    {
        let changes = changes
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.apply(ctx, changes, Origin::Server)
    }

    pub(crate) fn apply(
        &self,
        ctx: &SyncContext,
        changes: Vec<(String, StateValue)>,
        origin: Origin,
    ) -> Result<()> {
        for (key, value) in &changes {
            self.validate(key, value)?;
        }
        let _cycle = self.enter_cycle(ctx)?;

        let events: Vec<ChangeEvent> = {
            let mut state = self.inner.state.lock();
            let mut events: Vec<ChangeEvent> = Vec::new();
            for (key, new) in changes {
                let old = state.get(&key).cloned().unwrap_or_default();
                if old.same_as(&new) {
                    continue;
                }
                state.insert(key.clone(), new.clone());
                match events.iter_mut().find(|e| e.key == key) {
                    Some(event) => event.new = new,
                    None => events.push(ChangeEvent {
                        key,
                        old,
                        new,
                        origin,
                    }),
                }
            }
            // a key set and reset within one batch did not change
            events.retain(|e| !e.old.same_as(&e.new));
            events
        };
        if events.is_empty() {
            return Ok(());
        }

        crate::debug_do!({
            let keys: Vec<_> = events.iter().map(|e| e.key.as_str()).collect();
            crate::debug!("sync"; "{} changed {:?} ({:?})", self.inner.id, keys, origin);
        });

        self.param_change(ctx, &events);
        self.notify_watchers(ctx, &events)
    }

    fn validate(&self, key: &str, value: &StateValue) -> Result<(), UsageError> {
        let kind = &self.inner.kind;
        let spec = kind.require_param(key)?;
        let slot = kind.slots.get(key).map(|s| s.kind);

        let wrong = |expected: String| UsageError::WrongValueKind {
            name: key.to_string(),
            expected,
        };
        match (slot, value) {
            (Some(ChildSlotKind::Model | ChildSlotKind::Template), StateValue::Children(_)) => Ok(()),
            (Some(ChildSlotKind::Model | ChildSlotKind::Template), StateValue::Data(_)) => {
                Err(wrong("a child list".to_string()))
            }
            (_, StateValue::Children(_)) => Err(wrong(format!("a {} value, not children", spec.kind))),
            (_, StateValue::Data(v)) if !spec.kind.accepts(v) => {
                Err(wrong(format!("a {} value, got {}", spec.kind, type_name(v))))
            }
            _ => Ok(()),
        }
    }

    /// Enter a change cycle, rejecting a second session.
    fn enter_cycle(&self, ctx: &SyncContext) -> Result<CycleEntry<'_>> {
        let mut cycle = self.inner.cycle.lock();
        let tracked = match (*cycle, ctx.session()) {
            (Some((active, _)), Some(attempted)) if active != attempted => {
                return Err(SyncError::Concurrent { active, attempted });
            }
            (Some((active, depth)), _) => {
                *cycle = Some((active, depth + 1));
                true
            }
            (None, Some(session)) => {
                *cycle = Some((session, 1));
                true
            }
            (None, None) => false,
        };
        Ok(CycleEntry {
            cycle: &self.inner.cycle,
            tracked,
        })
    }

    // ========================================================================
    // Mounting
    // ========================================================================

    fn mount_view(&self, ctx: &MountContext) -> Result<ChildHandle> {
        let component = self.inner.id;
        if self.inner.views.lock().contains_key(&ctx.root) {
            return Err(UsageError::AlreadyMounted(ctx.root.to_string()).into());
        }

        let kind = &self.inner.kind;
        let view_id = ViewId::next();
        let handle = ChildHandle {
            component,
            view: view_id,
        };
        let child_ctx = ctx.child_of(handle);
        let state = self.inner.state.lock().clone();

        let data_pairs = kind
            .params
            .iter()
            .filter(|p| !kind.slots.contains_key(&p.name))
            .filter_map(|p| match state.get(&p.name) {
                Some(StateValue::Data(v)) => Some((p.name.as_str(), v)),
                _ => None,
            });
        let data = kind.data_model.instantiate(self.outbound_properties(data_pairs));

        let mut children = BTreeMap::new();
        let mut child_names = BTreeMap::new();
        let mut snapshot: FxHashMap<String, ChildList> = FxHashMap::default();
        for (param, slot) in &kind.slots {
            match state.get(param) {
                Some(StateValue::Children(list)) => match reconcile(&child_ctx, &ChildList::empty(), list) {
                    Ok(update) => {
                        children.insert(slot.node.clone(), update.entries);
                        if let Some(names) = update.names {
                            child_names.insert(slot.node.clone(), names);
                        }
                        snapshot.insert(param.clone(), list.clone());
                    }
                    Err(err) => {
                        for list in snapshot.values() {
                            for child in list.iter() {
                                child.release(ctx.root);
                            }
                        }
                        return Err(err);
                    }
                },
                Some(StateValue::Data(value)) => {
                    children.insert(slot.node.clone(), literal_entries(value));
                    if let Value::Object(map) = value {
                        child_names.insert(slot.node.clone(), map.keys().cloned().collect());
                    }
                }
                None => {
                    children.insert(slot.node.clone(), Vec::new());
                }
            }
        }

        let view = View {
            id: view_id,
            root: ctx.root,
            document: ctx.document.clone(),
            channel: Arc::clone(&ctx.channel),
            parent: ctx.parent,
            data,
            children,
            child_names,
            snapshot,
            echo: EchoTracker::new(ctx.document.echo_timeout()),
            pending: Changes::new(),
            deferred: 0,
            expiry_scheduled: false,
        };
        let message = self.render_message(&view, handle);
        let target = view.target(component);
        self.inner.views.lock().insert(ctx.root, view);

        crate::sync::deliver(&ctx.channel, &target, OutboundMessage::Render(Box::new(message)));
        ctx.document.touch(&ctx.channel);
        crate::debug!("sync"; "mounted {} as {} under {}", component, view_id, ctx.root);
        Ok(handle)
    }

    fn render_message(&self, view: &View, handle: ChildHandle) -> RenderMessage {
        let kind = &self.inner.kind;
        let transforms = &kind.transforms;

        let attrs = kind
            .binding
            .attrs
            .iter()
            .map(|(node, bindings)| {
                let bindings = bindings
                    .iter()
                    .map(|b| crate::template::AttrBinding {
                        attr: b.attr.clone(),
                        refs: b
                            .refs
                            .iter()
                            .filter_map(|r| transforms.property_name(r).map(str::to_string))
                            .collect(),
                        template: b.template.clone(),
                    })
                    .collect();
                (node.clone(), bindings)
            })
            .collect();

        let mut callbacks: BTreeMap<String, Vec<(String, String)>> = BTreeMap::new();
        for cb in &kind.inline_callbacks {
            callbacks
                .entry(cb.node.clone())
                .or_default()
                .push((cb.attr.clone(), cb.method.clone()));
        }

        RenderMessage {
            view: handle,
            data_model: kind.data_model.name().to_string(),
            attrs,
            callbacks,
            child_templates: kind
                .slots
                .values()
                .map(|s| (s.node.clone(), s.template.clone()))
                .collect(),
            child_names: view.child_names.clone(),
            data: view.data.values().clone(),
            events: self.events_map(),
            html: html::escape(&kind.html).into_owned(),
            nodes: kind.binding.nodes.clone(),
            scripts: kind.scripts.clone(),
            children: view.children.clone(),
        }
    }

    fn release_view(&self, root: RootId) {
        let mounted = match self.inner.views.lock().get(&root) {
            Some(view) => view.mounted_children(),
            None => return,
        };
        for list in mounted {
            for child in list.iter() {
                child.release(root);
            }
        }
        if self.inner.views.lock().remove(&root).is_some() {
            crate::debug!("child"; "released {} under {}", self.inner.id, root);
        }
    }
}

impl Renderable for Component {
    fn child_id(&self) -> ComponentId {
        self.inner.id
    }

    fn mount(&self, ctx: &MountContext) -> Result<ChildHandle> {
        self.mount_view(ctx)
    }

    fn mounted_handle(&self, root: RootId) -> Option<ChildHandle> {
        self.inner
            .views
            .lock()
            .get(&root)
            .map(|view| view.handle(self.inner.id))
    }

    fn release(&self, root: RootId) {
        self.release_view(root);
    }
}

/// Membership of one change cycle; leaving the outermost clears the session.
struct CycleEntry<'a> {
    cycle: &'a Mutex<Option<(SessionId, usize)>>,
    tracked: bool,
}

impl Drop for CycleEntry<'_> {
    fn drop(&mut self) {
        if !self.tracked {
            return;
        }
        let mut cycle = self.cycle.lock();
        *cycle = match *cycle {
            Some((session, depth)) if depth > 1 => Some((session, depth - 1)),
            _ => None,
        };
    }
}

impl ComponentInner {
    pub(crate) fn is_updating(&self) -> bool {
        self.updating.load(Ordering::SeqCst)
    }
}
