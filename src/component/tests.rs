//! End-to-end scenarios: component types, views, sync, children, events.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::json;

use super::{Component, ComponentType};
use crate::channel::{MemoryChannel, OutboundMessage};
use crate::children::{ChildEntry, ChildList, MountContext, Renderable};
use crate::data::{Patchable, Selectable, Streamable};
use crate::document::Document;
use crate::error::{SchemaError, SyncError, UsageError};
use crate::events::DomEvent;
use crate::ids::SessionId;
use crate::schema::{ParamKind, ParamSpec};
use crate::sync::{ChangeEvent, Link, StateValue, SyncContext};
use crate::value::{Changes, Value};

// ============================================================================
// Fixtures
// ============================================================================

fn card() -> Arc<ComponentType> {
    ComponentType::builder("Card")
        .params([
            ParamSpec::new("value", ParamKind::Number).default(0),
            ParamSpec::new("label", ParamKind::String),
            ParamSpec::new("color", ParamKind::Color).default("red"),
        ])
        .template(
            r#"<div id="box" style="color: ${color}; width: ${value}px">${label}</div>
               <input id="input" value="${value}"/>"#,
        )
        .build()
        .unwrap()
}

fn item() -> Arc<ComponentType> {
    ComponentType::builder("Item")
        .param(ParamSpec::new("label", ParamKind::String))
        .template(r#"<span id="text">${label}</span>"#)
        .build()
        .unwrap()
}

fn list() -> Arc<ComponentType> {
    ComponentType::builder("List")
        .param(ParamSpec::new("objects", ParamKind::List))
        .template(r#"<div id="container">${objects}</div>"#)
        .build()
        .unwrap()
}

fn mounted(kind: &Arc<ComponentType>) -> (Component, Arc<MemoryChannel>, Document, crate::ids::RootId) {
    let component = Component::new(kind);
    let channel = MemoryChannel::direct();
    let document = Document::new();
    let root = component.render(&document, channel.clone()).unwrap();
    channel.take();
    (component, channel, document, root)
}

fn session_mounted(kind: &Arc<ComponentType>) -> (Component, Arc<MemoryChannel>, Document, crate::ids::RootId) {
    let component = Component::new(kind);
    let channel = MemoryChannel::session();
    let document = Document::with_session(SessionId::next());
    let root = component.render(&document, channel.clone()).unwrap();
    channel.take();
    (component, channel, document, root)
}

fn later() -> Instant {
    Instant::now() + Duration::from_secs(1)
}

fn props(value: Value) -> Changes {
    match value {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

fn handles(message: &OutboundMessage, node: &str) -> Vec<crate::ids::ComponentId> {
    match message {
        OutboundMessage::Children { children, .. } => children[node]
            .iter()
            .filter_map(ChildEntry::handle)
            .map(|h| h.component)
            .collect(),
        other => panic!("expected children message, got {other:?}"),
    }
}

// ============================================================================
// Types and projection
// ============================================================================

#[test]
fn test_data_model_excludes_internal_hidden_and_slots() {
    let kind = ComponentType::builder("Panel")
        .params([
            ParamSpec::new("value", ParamKind::Number).default(1),
            ParamSpec::new("label", ParamKind::String),
            ParamSpec::new("cache", ParamKind::Dict).internal(),
            ParamSpec::new("secret", ParamKind::String),
            ParamSpec::new("objects", ParamKind::List),
        ])
        .template(r#"<p id="title">${label}</p><div id="body">${objects}</div>"#)
        .rename("label", Some("text"))
        .rename("secret", None)
        .build()
        .unwrap();

    let names: Vec<_> = kind.data_model().properties().iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["value", "text"]);
    assert!(kind.data_model().name().starts_with("Panel"));

    let component = Component::new(&kind);
    let channel = MemoryChannel::direct();
    component.render(&Document::new(), channel.clone()).unwrap();
    let sent = channel.take();
    let OutboundMessage::Render(render) = &sent[0].1 else {
        panic!("first message must be render");
    };
    assert_eq!(render.data.keys().collect::<Vec<_>>(), vec!["value", "text"]);
    assert_eq!(render.attrs["title"][0].refs, vec!["text"]);
    assert!(render.child_templates.contains_key("body"));
    assert!(render.html.contains("&lt;"));
}

#[test]
fn test_bound_hidden_parameter_is_capability_error() {
    let err = ComponentType::builder("Leaky")
        .param(ParamSpec::new("value", ParamKind::Number))
        .template(r#"<input id="input" value="${value}"/>"#)
        .rename("value", None)
        .build()
        .unwrap_err();
    assert!(matches!(err, SyncError::Capability(e) if e.name == "value"));
}

#[test]
fn test_unknown_reference_suggests_methods_and_params() {
    let err = ComponentType::builder("Button")
        .param(ParamSpec::new("label", ParamKind::String))
        .method("_click", |_: &Component, _: &DomEvent| {})
        .template(r#"<button id="btn" onclick="${_clik}">${label}</button>"#)
        .build()
        .unwrap_err();
    match err {
        SyncError::Schema(SchemaError::UnknownReference { name, suggestions }) => {
            assert_eq!(name, "_clik");
            assert!(suggestions.contains("_click"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_dom_events_on_unknown_node() {
    let err = ComponentType::builder("Card")
        .param(ParamSpec::new("value", ParamKind::Number))
        .template(r#"<input id="input" value="${value}"/>"#)
        .dom_events("missing", ["click"])
        .build()
        .unwrap_err();
    assert!(matches!(err, SyncError::Schema(SchemaError::UnknownEventNode { .. })));
}

// ============================================================================
// Server → client
// ============================================================================

#[test]
fn test_set_sends_only_changed_properties() {
    let (component, channel, _doc, _root) = mounted(&card());

    component.set([("value", json!(5)), ("color", json!("red"))]).unwrap();
    assert_eq!(channel.updates(), vec![props(json!({"value": 5}))]);

    // unchanged value: no event, no message
    component.set([("value", json!(5.0))]).unwrap();
    assert_eq!(channel.updates().len(), 1);
}

#[test]
fn test_batch_coalesces_into_one_update() {
    let (component, channel, _doc, _root) = mounted(&card());

    component
        .set([("value", json!(1)), ("label", json!("a")), ("value", json!(2))])
        .unwrap();
    assert_eq!(channel.updates(), vec![props(json!({"value": 2, "label": "a"}))]);

    // set and reset within one batch is not a change
    component.set([("value", json!(3)), ("value", json!(2))]).unwrap();
    assert_eq!(channel.updates().len(), 1);
    assert_eq!(component.value("value"), Some(json!(2)));
}

#[test]
fn test_rejected_batch_has_no_effect() {
    let (component, channel, _doc, _root) = mounted(&card());

    let err = component
        .set([("label", json!("x")), ("value", json!("not a number"))])
        .unwrap_err();
    assert!(matches!(err, SyncError::Usage(UsageError::WrongValueKind { ref name, .. }) if name == "value"));
    assert_eq!(component.value("label"), Some(json!("")));
    assert!(channel.updates().is_empty());
}

#[test]
fn test_unknown_parameter_suggests_close_match() {
    let component = Component::new(&card());
    let err = component.set([("clor", json!("blue"))]).unwrap_err();
    match err {
        SyncError::Usage(UsageError::UnknownParameter { name, suggestions, .. }) => {
            assert_eq!(name, "clor");
            assert!(suggestions.contains("color"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_strings_are_sanitized_for_clients() {
    let (component, channel, _doc, root) = mounted(&card());
    component.set([("label", json!("<b>bold</b>"))]).unwrap();

    assert_eq!(component.value("label"), Some(json!("<b>bold</b>")));
    let sent = channel.updates();
    assert_eq!(sent[0]["label"], json!("&lt;b&gt;bold&lt;/b&gt;"));
    assert_eq!(component.view_data(root).unwrap()["label"], sent[0]["label"]);
}

// ============================================================================
// Echo suppression
// ============================================================================

#[test]
fn test_echo_is_consumed_and_held_value_flushed() {
    let (component, channel, _doc, root) = mounted(&card());
    let ctx = SyncContext::detached();

    component.set([("value", json!(5))]).unwrap();
    component.handle_change(&ctx, root, "value", json!(5)).unwrap();
    assert_eq!(channel.updates().len(), 1);

    component.set([("value", json!(6))]).unwrap();
    component.set([("value", json!(7))]).unwrap();
    component.set([("value", json!(8))]).unwrap();
    assert_eq!(channel.updates().len(), 2, "7 and 8 are held while 6 is in flight");

    // echo of 6 releases only the latest held value
    component.handle_change(&ctx, root, "value", json!(6)).unwrap();
    assert_eq!(
        channel.updates(),
        vec![
            props(json!({"value": 5})),
            props(json!({"value": 6})),
            props(json!({"value": 8})),
        ]
    );
    assert_eq!(component.value("value"), Some(json!(8)));
}

#[test]
fn test_expired_marker_flushes_held_value() {
    let (component, channel, _doc, _root) = mounted(&card());

    component.set([("value", json!(1))]).unwrap();
    component.set([("value", json!(2))]).unwrap();
    assert_eq!(channel.updates().len(), 1);

    component.expire_echoes(Instant::now() + Duration::from_secs(3600));
    assert_eq!(channel.updates().last(), Some(&props(json!({"value": 2}))));
}

#[tokio::test]
async fn test_lost_echo_releases_held_value_on_sessionless_document() {
    let component = Component::new(&card());
    let channel = MemoryChannel::direct();
    let document = Document::new();
    document.set_echo_timeout(Duration::from_millis(10));
    component.render(&document, channel.clone()).unwrap();
    channel.take();

    channel.drop_next(1);
    component.set([("value", json!(1))]).unwrap();
    component.set([("value", json!(2))]).unwrap();
    assert!(channel.updates().is_empty());

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(channel.updates(), vec![props(json!({"value": 2}))]);
}

#[test]
fn test_due_expiry_runs_on_next_cycle_without_runtime() {
    let component = Component::new(&card());
    let channel = MemoryChannel::direct();
    let document = Document::new();
    document.set_echo_timeout(Duration::from_millis(5));
    component.render(&document, channel.clone()).unwrap();
    channel.take();

    channel.drop_next(1);
    component.set([("value", json!(1))]).unwrap();
    component.set([("value", json!(2))]).unwrap();
    std::thread::sleep(Duration::from_millis(30));
    assert!(channel.updates().is_empty());

    component.set([("label", json!("x"))]).unwrap();
    assert_eq!(
        channel.updates(),
        vec![props(json!({"value": 2})), props(json!({"label": "x"}))]
    );
}

#[test]
fn test_dropped_update_is_not_retried() {
    let (component, channel, document, _root) = mounted(&card());

    // a lost push is neither an error nor retried
    channel.drop_next(1);
    component.set([("value", json!(3))]).unwrap();
    assert!(channel.updates().is_empty());
    assert_eq!(component.value("value"), Some(json!(3)));

    component.set([("label", json!("x"))]).unwrap();
    assert_eq!(channel.updates(), vec![props(json!({"label": "x"}))]);
    assert_eq!(document.pending_tasks(), 1, "only the echo expiry is queued");

    // the client stays stale until the marker expires; the latest value wins
    component.set([("value", json!(4))]).unwrap();
    assert_eq!(channel.updates().len(), 1);
    component.expire_echoes(Instant::now() + Duration::from_secs(3600));
    assert_eq!(channel.updates().last(), Some(&props(json!({"value": 4}))));
}

// ============================================================================
// Client → server
// ============================================================================

#[test]
fn test_client_change_applies_without_echo_back() {
    let (component, channel, _doc, root) = mounted(&card());
    let ctx = SyncContext::detached();
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        component
            .watch(&["value"], move |_: &SyncContext, events: &[ChangeEvent]| {
                seen.lock().extend(events.iter().map(|e| e.origin));
                Ok(())
            })
            .unwrap();
    }

    component.handle_change(&ctx, root, "value", json!(9)).unwrap();
    assert_eq!(component.value("value"), Some(json!(9)));
    assert!(channel.updates().is_empty());

    // repeating the same value is idempotent
    component.handle_change(&ctx, root, "value", json!(9)).unwrap();
    assert_eq!(seen.lock().len(), 1);
    assert_eq!(seen.lock()[0], crate::sync::Origin::Client);
}

#[test]
fn test_client_edit_reaches_other_views() {
    let component = Component::new(&card());
    let (first, second) = (MemoryChannel::direct(), MemoryChannel::direct());
    let document = Document::new();
    let root = component.render(&document, first.clone()).unwrap();
    component.render(&document, second.clone()).unwrap();

    component
        .handle_change(&SyncContext::detached(), root, "label", json!("hi"))
        .unwrap();
    assert!(first.updates().is_empty());
    assert_eq!(second.updates(), vec![props(json!({"label": "hi"}))]);
}

#[test]
fn test_unknown_client_property_is_rejected() {
    let (component, _channel, _doc, root) = mounted(&card());
    let err = component
        .handle_change(&SyncContext::detached(), root, "valeu", json!(1))
        .unwrap_err();
    assert!(matches!(err, SyncError::Usage(UsageError::UnknownParameter { .. })));
}

#[test]
fn test_session_edits_are_debounced_and_batched() {
    let (component, _channel, document, root) = session_mounted(&card());
    let ctx = document.context();
    let batches = Arc::new(Mutex::new(Vec::new()));
    {
        let batches = Arc::clone(&batches);
        component
            .watch(&["value", "label"], move |_: &SyncContext, events: &[ChangeEvent]| {
                batches.lock().push(events.len());
                Ok(())
            })
            .unwrap();
    }

    component.handle_change(&ctx, root, "value", json!(3)).unwrap();
    component.handle_change(&ctx, root, "label", json!("x")).unwrap();
    assert_eq!(component.value("value"), Some(json!(0)));
    assert_eq!(document.pending_tasks(), 1);

    document.run_pending(Instant::now());
    assert_eq!(component.value("value"), Some(json!(0)));

    document.run_pending(later());
    assert_eq!(component.value("value"), Some(json!(3)));
    assert_eq!(component.value("label"), Some(json!("x")));
    assert_eq!(*batches.lock(), vec![2]);
}

#[test]
fn test_message_json_round_trip() {
    let (component, _channel, _doc, root) = mounted(&card());
    let ctx = SyncContext::detached();
    component
        .handle_message(&ctx, root, r#"{"type":"change","attr":"value","old":0,"new":4}"#)
        .unwrap();
    assert_eq!(component.value("value"), Some(json!(4)));

    let err = component.handle_message(&ctx, root, "not json").unwrap_err();
    assert!(matches!(err, SyncError::Message(_)));
}

// ============================================================================
// Deferral
// ============================================================================

#[test]
fn test_foreign_context_is_deferred_until_next_tick() {
    let (component, channel, document, _root) = session_mounted(&card());

    component.set([("value", json!(1))]).unwrap();
    assert_eq!(component.value("value"), Some(json!(1)));
    assert!(channel.updates().is_empty());

    component.set([("value", json!(2))]).unwrap();
    document.run_pending(Instant::now());
    // FIFO: both deferred pushes run, the second is held behind the first
    assert_eq!(channel.updates(), vec![props(json!({"value": 1}))]);
}

#[test]
fn test_deferred_update_of_released_view_is_noop() {
    let (component, channel, document, root) = session_mounted(&card());

    component.set([("value", json!(1))]).unwrap();
    component.release(root);
    document.run_pending(Instant::now());

    assert!(channel.updates().is_empty());
    assert!(component.roots().is_empty());
}

#[test]
fn test_session_context_updates_immediately() {
    let (component, channel, document, _root) = session_mounted(&card());
    component.set_with(&document.context(), [("value", json!(1))]).unwrap();
    assert_eq!(channel.updates(), vec![props(json!({"value": 1}))]);
}

#[test]
fn test_concurrent_session_is_rejected() {
    let component = Component::new(&card());
    let nested = Arc::new(Mutex::new(None));
    {
        let target = component.clone();
        let nested = Arc::clone(&nested);
        component
            .watch(&["value"], move |_: &SyncContext, _: &[ChangeEvent]| {
                let other = SyncContext::for_session(Some(SessionId::next()));
                *nested.lock() = Some(target.set_with(&other, [("label", json!("late"))]));
                Ok(())
            })
            .unwrap();
    }

    let ctx = SyncContext::for_session(Some(SessionId::next()));
    component.set_with(&ctx, [("value", json!(1))]).unwrap();

    let result = nested.lock().take().unwrap();
    assert!(matches!(result, Err(SyncError::Concurrent { .. })));
    assert_eq!(component.value("label"), Some(json!("")));

    // the cycle is over; another session may enter now
    let other = SyncContext::for_session(Some(SessionId::next()));
    component.set_with(&other, [("label", json!("ok"))]).unwrap();
    assert_eq!(component.value("label"), Some(json!("ok")));
}

// ============================================================================
// Children
// ============================================================================

#[test]
fn test_children_reconcile_by_identity() {
    let kind = item();
    let [a, b, c, d] = ["a", "b", "c", "d"].map(|label| {
        Component::with_values(&kind, [("label", json!(label))]).unwrap()
    });
    let parent = Component::new(&list());
    parent
        .set([("objects", ChildList::of([a.clone(), b.clone(), c.clone()]))])
        .unwrap();

    let channel = MemoryChannel::direct();
    let document = Document::new();
    let root = parent.render(&document, channel.clone()).unwrap();
    let b_handle = b.mounted_handle(root).unwrap();
    channel.take();

    parent
        .set([("objects", ChildList::of([b.clone(), c.clone(), d.clone()]))])
        .unwrap();

    let sent = channel.take();
    let children = sent
        .iter()
        .find(|(_, m)| matches!(m, OutboundMessage::Children { .. }))
        .unwrap();
    assert_eq!(handles(&children.1, "container"), vec![b.id(), c.id(), d.id()]);
    assert!(a.roots().is_empty());
    assert_eq!(b.mounted_handle(root), Some(b_handle), "kept children are not remounted");
    assert_eq!(d.roots(), vec![root]);

    document.close();
    assert!(b.roots().is_empty() && c.roots().is_empty() && d.roots().is_empty());
    assert!(parent.roots().is_empty());
}

/// Child whose mount always fails.
struct Unmountable(crate::ids::ComponentId);

impl Renderable for Unmountable {
    fn child_id(&self) -> crate::ids::ComponentId {
        self.0
    }

    fn mount(&self, _: &MountContext) -> crate::error::Result<crate::children::ChildHandle> {
        Err(UsageError::InvalidData("cannot mount".into()).into())
    }

    fn mounted_handle(&self, _: crate::ids::RootId) -> Option<crate::children::ChildHandle> {
        None
    }

    fn release(&self, _: crate::ids::RootId) {}
}

#[test]
fn test_failed_child_mount_keeps_previous_children() {
    let kind = item();
    let (a, b) = (Component::new(&kind), Component::new(&kind));
    let parent = Component::new(&list());
    parent.set([("objects", ChildList::of([a.clone()]))]).unwrap();
    let (channel, document) = (MemoryChannel::direct(), Document::new());
    let root = parent.render(&document, channel.clone()).unwrap();
    channel.take();

    parent
        .set([("objects", ChildList::of([Unmountable(crate::ids::ComponentId::next())]))])
        .unwrap();
    assert_eq!(a.roots(), vec![root], "old children stay mounted");
    assert!(channel.take().is_empty());

    // the view still holds [a], so the next update releases it
    parent.set([("objects", ChildList::of([b.clone()]))]).unwrap();
    let sent = channel.take();
    let (_, children) = sent.iter().rev().find(|(_, m)| matches!(m, OutboundMessage::Children { .. })).unwrap();
    assert_eq!(handles(children, "container"), vec![b.id()]);
    assert!(a.roots().is_empty());
}

#[test]
fn test_keyed_children_send_names() {
    let kind = item();
    let parent = Component::new(&list());
    let channel = MemoryChannel::direct();
    parent.render(&Document::new(), channel.clone()).unwrap();
    channel.take();

    let children = ChildList::keyed([("first", Component::new(&kind)), ("second", Component::new(&kind))]);
    parent.set([("objects", children)]).unwrap();

    // new children render before the parent's child map
    let sent = channel.take();
    let Some(OutboundMessage::Children { child_names, .. }) = sent.iter().map(|(_, m)| m).last() else {
        panic!("expected children message last");
    };
    assert_eq!(child_names["container"], vec!["first", "second"]);
}

#[test]
fn test_child_slot_rejects_plain_data() {
    let parent = Component::new(&list());
    let err = parent.set([("objects", json!([1, 2]))]).unwrap_err();
    assert!(matches!(err, SyncError::Usage(UsageError::WrongValueKind { .. })));
    assert!(matches!(parent.get("objects"), Some(StateValue::Children(_))));
}

#[test]
fn test_literal_slot_sends_values() {
    let kind = ComponentType::builder("Markup")
        .param(ParamSpec::new("items", ParamKind::List))
        .template(r#"<ul id="list">${items}</ul>"#)
        .child_type("items", "literal")
        .build()
        .unwrap();
    let (component, channel, _doc, _root) = mounted(&kind);

    component.set([("items", json!(["<li>a</li>", "<li>b</li>"]))]).unwrap();
    let sent = channel.take();
    let OutboundMessage::Children { children, .. } = &sent[0].1 else {
        panic!("expected children message");
    };
    assert_eq!(
        children["list"],
        vec![ChildEntry::Literal(json!("<li>a</li>")), ChildEntry::Literal(json!("<li>b</li>"))]
    );
}

#[test]
fn test_invalid_child_type_is_schema_error() {
    let err = ComponentType::builder("Markup")
        .param(ParamSpec::new("items", ParamKind::List))
        .template(r#"<ul id="list">${items}</ul>"#)
        .child_type("items", "widget")
        .build()
        .unwrap_err();
    assert!(matches!(err, SyncError::Schema(SchemaError::InvalidChildType { .. })));
}

#[test]
fn test_mounting_twice_under_one_root() {
    let (component, channel, document, root) = mounted(&card());
    let ctx = MountContext::new(document, root, channel);
    let err = component.mount(&ctx).unwrap_err();
    assert!(matches!(err, SyncError::Usage(UsageError::AlreadyMounted(_))));
}

// ============================================================================
// Events
// ============================================================================

#[test]
fn test_dispatch_order() {
    let log: Arc<Mutex<Vec<&'static str>>> = Arc::default();
    let record = |name: &'static str| {
        let log = Arc::clone(&log);
        move |_: &Component, _: &DomEvent| log.lock().push(name)
    };
    let kind = ComponentType::builder("Button")
        .param(ParamSpec::new("label", ParamKind::String))
        .template(r#"<button id="btn" onclick="${handle}">${label}</button>"#)
        .method("_btn_click", record("convention"))
        .method("handle", record("inline"))
        .dom_events("btn", ["click"])
        .build()
        .unwrap();
    let component = Component::new(&kind);
    component.on_event("*", "*", record("any")).unwrap();
    component.on_event("btn", "click", record("btn-click")).unwrap();
    component.on_event("btn", "*", record("btn-any")).unwrap();

    let ran = component.dispatch(&DomEvent::new("btn", "click"));
    assert_eq!(ran, 5);
    assert_eq!(*log.lock(), vec!["convention", "btn-click", "btn-any", "any", "inline"]);

    log.lock().clear();
    component.dispatch(&DomEvent::new("btn", "dblclick"));
    assert_eq!(*log.lock(), vec!["btn-any", "any"]);
}

#[test]
fn test_on_event_unknown_node() {
    let component = Component::new(&card());
    let err = component
        .on_event("nope", "click", |_: &Component, _: &DomEvent| {})
        .unwrap_err();
    assert!(matches!(err, SyncError::Usage(UsageError::UnknownNode { .. })));
}

#[test]
fn test_subscription_is_pushed_to_views() {
    let (component, channel, _doc, _root) = mounted(&card());
    component
        .on_event("box", "click", |_: &Component, _: &DomEvent| {})
        .unwrap();
    let sent = channel.take();
    let OutboundMessage::Events { events } = &sent[0].1 else {
        panic!("expected events message");
    };
    assert_eq!(events["box"]["click"], false);
}

#[test]
fn test_event_sees_buffered_edits() {
    let (component, _channel, document, root) = session_mounted(&card());
    let seen = Arc::new(Mutex::new(None));
    {
        let seen = Arc::clone(&seen);
        component
            .on_event("input", "keyup", move |c: &Component, _: &DomEvent| {
                *seen.lock() = c.value("value");
            })
            .unwrap();
    }

    let ctx = document.context();
    component.handle_change(&ctx, root, "value", json!(42)).unwrap();
    component
        .handle_message(&ctx, root, r#"{"type":"dom_event","node":"input","data":{"type":"keyup","key":"Enter"}}"#)
        .unwrap();
    assert_eq!(*seen.lock(), Some(json!(42)));
}

// ============================================================================
// Watchers and links
// ============================================================================

#[test]
fn test_watch_and_unwatch() {
    let component = Component::new(&card());
    let seen: Arc<Mutex<Vec<(Value, Value)>>> = Arc::default();
    let id = {
        let seen = Arc::clone(&seen);
        component
            .watch(&["value"], move |_: &SyncContext, events: &[ChangeEvent]| {
                for e in events {
                    let (old, new) = (e.old.as_data().cloned(), e.new.as_data().cloned());
                    seen.lock().push((old.unwrap_or_default(), new.unwrap_or_default()));
                }
                Ok(())
            })
            .unwrap()
    };

    component.set([("label", json!("ignored"))]).unwrap();
    component.set([("value", json!(2))]).unwrap();
    assert_eq!(*seen.lock(), vec![(json!(0), json!(2))]);

    assert!(component.unwatch(id));
    assert!(!component.unwatch(id));
    component.set([("value", json!(3))]).unwrap();
    assert_eq!(seen.lock().len(), 1);

    assert!(component.watch(&["nope"], |_: &SyncContext, _: &[ChangeEvent]| Ok(())).is_err());
}

#[test]
fn test_link_validation() {
    let (a, b) = (Component::new(&card()), Component::new(&card()));
    let noop = |_: &Component, _: &Component, _: &ChangeEvent| -> crate::error::Result<()> { Ok(()) };

    let err = a
        .link(&b, Link::new().param("value", "value").callback("label", noop))
        .unwrap_err();
    assert!(matches!(err, SyncError::Usage(UsageError::LinkConflict)));

    let err = a.link(&b, Link::new()).unwrap_err();
    assert!(matches!(err, SyncError::Usage(UsageError::LinkEmpty)));

    let err = a
        .link(&b, Link::new().callback("value", noop).bidirectional(true))
        .unwrap_err();
    assert!(matches!(err, SyncError::Usage(UsageError::LinkCallbacksBidirectional)));

    let err = a.link(&b, Link::new().param("value", "vlue")).unwrap_err();
    assert!(matches!(err, SyncError::Usage(UsageError::UnknownParameter { .. })));

    // nothing was registered by the failed calls
    a.set([("value", json!(1))]).unwrap();
    assert_eq!(b.value("value"), Some(json!(0)));
}

#[test]
fn test_bidirectional_link_and_unlink() {
    let (a, b) = (Component::new(&card()), Component::new(&card()));
    let handle = a
        .link(&b, Link::new().param("value", "value").bidirectional(true))
        .unwrap();

    a.set([("value", json!(3))]).unwrap();
    assert_eq!(b.value("value"), Some(json!(3)));
    b.set([("value", json!(4))]).unwrap();
    assert_eq!(a.value("value"), Some(json!(4)));

    handle.unlink();
    a.set([("value", json!(5))]).unwrap();
    assert_eq!(b.value("value"), Some(json!(4)));
}

#[test]
fn test_callback_link() {
    let (a, b) = (Component::new(&card()), Component::new(&card()));
    a.link(
        &b,
        Link::new().callback("value", |_: &Component, target: &Component, event: &ChangeEvent| {
            let label = format!("value is {}", event.new.as_data().cloned().unwrap_or_default());
            target.set([("label", json!(label))])
        }),
    )
    .unwrap();

    a.set([("value", json!(7))]).unwrap();
    assert_eq!(b.value("label"), Some(json!("value is 7")));
}

// ============================================================================
// Column data
// ============================================================================

fn table() -> Arc<ComponentType> {
    ComponentType::builder("Table")
        .params([
            ParamSpec::new("source", ParamKind::Dict),
            ParamSpec::new("selected", ParamKind::List),
        ])
        .template(r#"<div id="plot"></div>"#)
        .data_param("source")
        .selection_param("selected")
        .build()
        .unwrap()
}

#[test]
fn test_stream_and_patch_send_incremental_messages() {
    let kind = table();
    let component = Component::with_values(&kind, [("source", json!({"x": [1, 2], "y": [3, 4]}))]).unwrap();
    let channel = MemoryChannel::direct();
    let root = component.render(&Document::new(), channel.clone()).unwrap();
    channel.take();
    let ctx = SyncContext::detached();

    component
        .stream(&ctx, props(json!({"x": [5], "y": [6]})), Some(2))
        .unwrap();
    let sent = channel.take();
    assert_eq!(sent.len(), 1);
    assert!(matches!(&sent[0].1, OutboundMessage::Stream { rollover: Some(2), .. }));
    assert_eq!(component.value("source"), Some(json!({"x": [2, 5], "y": [4, 6]})));
    assert_eq!(component.view_data(root).unwrap()["source"], json!({"x": [2, 5], "y": [4, 6]}));

    component.patch(&ctx, props(json!({"y": [[0, 40]]}))).unwrap();
    let sent = channel.take();
    assert!(matches!(&sent[0].1, OutboundMessage::Patch { property, .. } if property == "source"));
    assert_eq!(component.value("source"), Some(json!({"x": [2, 5], "y": [40, 6]})));

    let err = component.stream(&ctx, props(json!({"x": [9]})), None).unwrap_err();
    assert!(err.to_string().contains("all columns"));
}

#[test]
fn test_selection_bounds() {
    let component = Component::with_values(&table(), [("source", json!({"x": [1, 2, 3]}))]).unwrap();
    let ctx = SyncContext::detached();
    component.select(&ctx, vec![0, 2]).unwrap();
    assert_eq!(component.selected(), vec![0, 2]);
    assert!(component.select(&ctx, vec![3]).is_err());
    assert_eq!(component.selected(), vec![0, 2]);
}
