//! Views: one mounted rendering of a component.
//!
//! A view keeps everything that is specific to one client mount: the data
//! container mirroring the client, the rendered child lists, the echo
//! tracker and the buffer of client edits waiting to be processed.

pub mod echo;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use rustc_hash::FxHashMap;

pub use echo::EchoTracker;

use crate::channel::{Channel, ViewRef};
use crate::children::{ChildEntry, ChildHandle, ChildList, MountContext};
use crate::document::Document;
use crate::ids::{ComponentId, RootId, ViewId};
use crate::schema::DataContainer;
use crate::value::{Changes, Value};

pub struct View {
    pub(crate) id: ViewId,
    pub(crate) root: RootId,
    pub(crate) document: Document,
    pub(crate) channel: Arc<dyn Channel>,
    pub(crate) parent: Option<ChildHandle>,
    pub(crate) data: DataContainer,
    /// node → rendered child entries
    pub(crate) children: BTreeMap<String, Vec<ChildEntry>>,
    pub(crate) child_names: BTreeMap<String, Vec<String>>,
    /// child-slot key → collection last reconciled
    pub(crate) snapshot: FxHashMap<String, ChildList>,
    pub(crate) echo: EchoTracker,
    /// Buffered client edits (property → value).
    pub(crate) pending: Changes,
    /// Deferred tasks queued for this view and not yet run.
    pub(crate) deferred: usize,
    pub(crate) expiry_scheduled: bool,
}

impl View {
    pub(crate) fn target(&self, component: ComponentId) -> ViewRef {
        ViewRef {
            component,
            root: self.root,
            view: self.id,
        }
    }

    pub(crate) fn handle(&self, component: ComponentId) -> ChildHandle {
        ChildHandle {
            component,
            view: self.id,
        }
    }

    /// Context for mounting this view's children.
    pub(crate) fn child_context(&self, component: ComponentId) -> MountContext {
        MountContext {
            document: self.document.clone(),
            root: self.root,
            parent: Some(self.handle(component)),
            channel: Arc::clone(&self.channel),
        }
    }

    pub fn id(&self) -> ViewId {
        self.id
    }

    pub fn parent(&self) -> Option<ChildHandle> {
        self.parent
    }

    pub fn data(&self) -> &DataContainer {
        &self.data
    }

    /// Stage outbound property values; returns what must go on the wire.
    ///
    /// Held values whose markers expired are flushed first, then `props`
    /// override them. Properties still in flight are held. Properties the
    /// client already has are skipped. Everything sent is marked in flight
    /// and written to the mirror.
    pub(crate) fn stage_update(&mut self, props: Changes, now: Instant) -> Changes {
        let mut outgoing = self.echo.expire(now);
        outgoing.extend(props);

        let mut send = Changes::new();
        for (property, value) in outgoing {
            if !self.data.contains(&property) {
                continue;
            }
            if self.echo.is_in_flight(&property, now) {
                self.echo.hold(&property, value);
                continue;
            }
            if self.data.matches(&property, &value) {
                continue;
            }
            self.echo.mark_sent(&property, now);
            self.data.set(&property, value.clone());
            send.insert(property, value);
        }
        send
    }

    /// Handle the echo of an in-flight property; returns the held value to
    /// send next, if any.
    pub(crate) fn acknowledge(&mut self, property: &str, now: Instant) -> Changes {
        match self.echo.acknowledge(property) {
            Some(value) => {
                let mut props = Changes::new();
                props.insert(property.to_string(), value);
                self.stage_update(props, now)
            }
            None => Changes::new(),
        }
    }

    /// Record a genuine client edit. Returns `true` if it is the first
    /// buffered edit (processing must be scheduled).
    pub(crate) fn buffer_client_change(&mut self, property: &str, value: Value) -> bool {
        self.echo.forget(property);
        self.data.set(property, value.clone());
        let first = self.pending.is_empty();
        self.pending.insert(property.to_string(), value);
        first
    }

    pub(crate) fn take_pending(&mut self) -> Changes {
        std::mem::take(&mut self.pending)
    }

    /// Every child collection mounted under this view.
    pub(crate) fn mounted_children(&self) -> Vec<ChildList> {
        self.snapshot.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MemoryChannel;
    use crate::schema::{ParamKind, ParamSpec, construct_data_model};
    use serde_json::json;
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_millis(200);

    fn view() -> View {
        let specs = [
            ParamSpec::new("a", ParamKind::Number).default(0),
            ParamSpec::new("b", ParamKind::String),
        ];
        let model = Arc::new(
            construct_data_model("ViewProbe", specs.iter().map(|s| (s.name.as_str(), s))).unwrap(),
        );
        View {
            id: ViewId::next(),
            root: RootId::next(),
            document: Document::new(),
            channel: MemoryChannel::direct(),
            parent: None,
            data: model.instantiate(Changes::new()),
            children: BTreeMap::new(),
            child_names: BTreeMap::new(),
            snapshot: FxHashMap::default(),
            echo: EchoTracker::new(TIMEOUT),
            pending: Changes::new(),
            deferred: 0,
            expiry_scheduled: false,
        }
    }

    fn props(pairs: &[(&str, Value)]) -> Changes {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_stage_sends_only_differences() {
        let mut view = view();
        let now = Instant::now();
        let send = view.stage_update(props(&[("a", json!(0)), ("b", json!("x"))]), now);
        assert_eq!(send.keys().collect::<Vec<_>>(), vec!["b"]);
        assert!(view.echo.is_in_flight("b", now));
        assert!(!view.echo.is_in_flight("a", now));
    }

    #[test]
    fn test_stage_holds_in_flight_and_ack_flushes() {
        let mut view = view();
        let now = Instant::now();
        view.stage_update(props(&[("a", json!(1))]), now);
        let send = view.stage_update(props(&[("a", json!(2))]), now);
        assert!(send.is_empty());
        let send = view.stage_update(props(&[("a", json!(3))]), now);
        assert!(send.is_empty());

        let flushed = view.acknowledge("a", now);
        assert_eq!(flushed.get("a"), Some(&json!(3)));
        assert!(view.echo.is_in_flight("a", now));
    }

    #[test]
    fn test_held_value_equal_to_mirror_is_not_resent() {
        let mut view = view();
        let now = Instant::now();
        view.stage_update(props(&[("a", json!(1))]), now);
        view.stage_update(props(&[("a", json!(2))]), now);
        view.stage_update(props(&[("a", json!(1))]), now);
        assert!(view.acknowledge("a", now).is_empty());
    }

    #[test]
    fn test_unknown_properties_ignored() {
        let mut view = view();
        let send = view.stage_update(props(&[("nope", json!(1))]), Instant::now());
        assert!(send.is_empty());
    }

    #[test]
    fn test_client_edit_buffers_and_clears_marker() {
        let mut view = view();
        let now = Instant::now();
        view.stage_update(props(&[("a", json!(1))]), now);
        view.echo.hold("a", json!(2));

        assert!(view.buffer_client_change("a", json!(7)));
        assert!(!view.buffer_client_change("b", json!("y")));
        assert!(!view.echo.is_in_flight("a", now));
        assert!(view.echo.held("a").is_none());
        assert!(view.data.matches("a", &json!(7)));
        assert_eq!(view.take_pending().len(), 2);
    }
}
