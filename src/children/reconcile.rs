//! Old/new child list diffing for one slot.
//!
//! Rules:
//! 1. Every new child reuses its existing mount under the root, or is mounted.
//! 2. Every old child absent (by identity) from the new list is released once,
//!    but only after all new children mounted.
//! 3. Output order equals the new list order.
//!
//! A failed mount releases the children mounted by this pass and leaves the
//! old children untouched.

use rustc_hash::FxHashSet;

use super::{ChildEntry, ChildList, MountContext};
use crate::error::Result;
use crate::value::Value;

/// Outcome of reconciling one slot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlotUpdate {
    pub entries: Vec<ChildEntry>,
    pub names: Option<Vec<String>>,
    pub released: usize,
    pub mounted: usize,
}

pub fn reconcile(ctx: &MountContext, old: &ChildList, new: &ChildList) -> Result<SlotUpdate> {
    let mut update = SlotUpdate {
        entries: Vec::with_capacity(new.len()),
        names: new.names(),
        ..SlotUpdate::default()
    };

    let mut fresh = Vec::new();
    for child in new.iter() {
        let handle = match child.mounted_handle(ctx.root) {
            Some(handle) => handle,
            None => match child.mount(ctx) {
                Ok(handle) => {
                    fresh.push(child);
                    handle
                }
                Err(err) => {
                    for child in fresh {
                        child.release(ctx.root);
                    }
                    return Err(err);
                }
            },
        };
        update.entries.push(ChildEntry::Handle(handle));
    }
    update.mounted = fresh.len();

    let mut released = FxHashSet::default();
    for child in old.iter() {
        let id = child.child_id();
        if !new.contains(id) && released.insert(id) {
            child.release(ctx.root);
            update.released += 1;
        }
    }

    crate::debug!(
        "child";
        "reconciled slot: {} kept, {} mounted, {} released",
        update.entries.len() - update.mounted,
        update.mounted,
        update.released
    );
    Ok(update)
}

/// Entries for a literal slot: values are inserted as-is.
pub fn literal_entries(value: &Value) -> Vec<ChildEntry> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().cloned().map(ChildEntry::Literal).collect(),
        Value::Object(items) => items.values().cloned().map(ChildEntry::Literal).collect(),
        other => vec![ChildEntry::Literal(other.clone())],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MemoryChannel;
    use crate::children::{ChildHandle, Renderable};
    use crate::document::Document;
    use crate::error::UsageError;
    use crate::ids::{ComponentId, RootId, ViewId};
    use parking_lot::Mutex;
    use rustc_hash::FxHashMap;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Leaf child counting its mounts and releases.
    #[derive(Default)]
    struct Leaf {
        id: Option<ComponentId>,
        fail: bool,
        mounts: AtomicUsize,
        releases: AtomicUsize,
        views: Mutex<FxHashMap<RootId, ChildHandle>>,
    }

    impl Leaf {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                id: Some(ComponentId::next()),
                ..Self::default()
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                id: Some(ComponentId::next()),
                fail: true,
                ..Self::default()
            })
        }
    }

    impl Renderable for Leaf {
        fn child_id(&self) -> ComponentId {
            self.id.unwrap_or(ComponentId(0))
        }

        fn mount(&self, ctx: &MountContext) -> Result<ChildHandle> {
            if self.fail {
                return Err(UsageError::InvalidData("leaf refused to mount".into()).into());
            }
            self.mounts.fetch_add(1, Ordering::SeqCst);
            let handle = ChildHandle {
                component: self.child_id(),
                view: ViewId::next(),
            };
            self.views.lock().insert(ctx.root, handle);
            Ok(handle)
        }

        fn mounted_handle(&self, root: RootId) -> Option<ChildHandle> {
            self.views.lock().get(&root).copied()
        }

        fn release(&self, root: RootId) {
            if self.views.lock().remove(&root).is_some() {
                self.releases.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn ctx() -> MountContext {
        MountContext::new(Document::new(), RootId::next(), MemoryChannel::direct())
    }

    fn list(items: &[&Arc<Leaf>]) -> ChildList {
        items
            .iter()
            .map(|p| Arc::clone(*p) as Arc<dyn Renderable>)
            .collect()
    }

    #[test]
    fn test_abc_to_bcd() {
        let ctx = ctx();
        let (a, b, c, d) = (Leaf::new(), Leaf::new(), Leaf::new(), Leaf::new());

        let first = reconcile(&ctx, &ChildList::empty(), &list(&[&a, &b, &c])).unwrap();
        assert_eq!(first.mounted, 3);
        let b_handle = first.entries[1].handle().unwrap();
        let c_handle = first.entries[2].handle().unwrap();

        let second = reconcile(&ctx, &list(&[&a, &b, &c]), &list(&[&b, &c, &d])).unwrap();
        assert_eq!(second.released, 1);
        assert_eq!(second.mounted, 1);
        assert_eq!(a.releases.load(Ordering::SeqCst), 1);
        assert_eq!(d.mounts.load(Ordering::SeqCst), 1);
        assert_eq!(b.mounts.load(Ordering::SeqCst), 1);
        assert_eq!(c.mounts.load(Ordering::SeqCst), 1);

        let handles: Vec<_> = second.entries.iter().filter_map(ChildEntry::handle).collect();
        assert_eq!(handles[0], b_handle);
        assert_eq!(handles[1], c_handle);
        assert_eq!(handles[2].component, d.child_id());
    }

    #[test]
    fn test_duplicate_old_entries_release_once() {
        let ctx = ctx();
        let a = Leaf::new();
        reconcile(&ctx, &ChildList::empty(), &list(&[&a])).unwrap();
        let update = reconcile(&ctx, &list(&[&a, &a]), &ChildList::empty()).unwrap();
        assert_eq!(update.released, 1);
        assert_eq!(a.releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reorder_keeps_handles() {
        let ctx = ctx();
        let (a, b) = (Leaf::new(), Leaf::new());
        let first = reconcile(&ctx, &ChildList::empty(), &list(&[&a, &b])).unwrap();
        let second = reconcile(&ctx, &list(&[&a, &b]), &list(&[&b, &a])).unwrap();
        assert_eq!(second.entries[0], first.entries[1]);
        assert_eq!(second.entries[1], first.entries[0]);
        assert_eq!(second.mounted + second.released, 0);
    }

    #[test]
    fn test_failed_mount_rolls_back() {
        let ctx = ctx();
        let (a, bad) = (Leaf::new(), Leaf::failing());
        assert!(reconcile(&ctx, &ChildList::empty(), &list(&[&a, &bad])).is_err());
        assert_eq!(a.releases.load(Ordering::SeqCst), 1);
        assert!(a.mounted_handle(ctx.root).is_none());
    }

    #[test]
    fn test_failed_mount_keeps_old_children() {
        let ctx = ctx();
        let (a, bad) = (Leaf::new(), Leaf::failing());
        let first = reconcile(&ctx, &ChildList::empty(), &list(&[&a])).unwrap();

        assert!(reconcile(&ctx, &list(&[&a]), &list(&[&bad])).is_err());
        assert_eq!(a.releases.load(Ordering::SeqCst), 0);
        assert_eq!(a.mounted_handle(ctx.root), first.entries[0].handle());
    }

    #[test]
    fn test_keyed_names() {
        let ctx = ctx();
        let (a, b) = (Leaf::new(), Leaf::new());
        let keyed = ChildList::Keyed(vec![
            ("first".into(), Arc::clone(&a) as Arc<dyn Renderable>),
            ("second".into(), Arc::clone(&b) as Arc<dyn Renderable>),
        ]);
        let update = reconcile(&ctx, &ChildList::empty(), &keyed).unwrap();
        assert_eq!(update.names, Some(vec!["first".into(), "second".into()]));
    }

    #[test]
    fn test_literal_entries() {
        assert_eq!(
            literal_entries(&json!(["<b>a</b>", 2])),
            vec![ChildEntry::Literal(json!("<b>a</b>")), ChildEntry::Literal(json!(2))]
        );
        assert!(literal_entries(&Value::Null).is_empty());
    }
}
