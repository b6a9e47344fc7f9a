//! Child components and slot reconciliation.
//!
//! A child slot holds a [`ChildList`] of [`Renderable`]s. Each mounted child
//! is addressed on the wire by a [`ChildHandle`]; literal slots carry opaque
//! values instead.

pub mod reconcile;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use reconcile::{SlotUpdate, literal_entries, reconcile};

use crate::channel::Channel;
use crate::document::Document;
use crate::error::Result;
use crate::ids::{ComponentId, RootId, ViewId};
use crate::value::Value;

// ============================================================================
// Wire types
// ============================================================================

/// Reference to one mounted child view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChildHandle {
    pub component: ComponentId,
    pub view: ViewId,
}

/// One entry of a rendered child list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChildEntry {
    Handle(ChildHandle),
    Literal(Value),
}

impl ChildEntry {
    pub fn handle(&self) -> Option<ChildHandle> {
        match self {
            Self::Handle(h) => Some(*h),
            Self::Literal(_) => None,
        }
    }
}

// ============================================================================
// Renderable
// ============================================================================

/// Where a child gets mounted: same document, root and channel as its parent.
#[derive(Clone)]
pub struct MountContext {
    pub document: Document,
    pub root: RootId,
    pub parent: Option<ChildHandle>,
    pub channel: Arc<dyn Channel>,
}

impl MountContext {
    pub fn new(document: Document, root: RootId, channel: Arc<dyn Channel>) -> Self {
        Self {
            document,
            root,
            parent: None,
            channel,
        }
    }

    /// Context for children of `parent`.
    pub fn child_of(&self, parent: ChildHandle) -> Self {
        Self {
            parent: Some(parent),
            ..self.clone()
        }
    }
}

/// Anything that can be mounted into a child slot.
pub trait Renderable: Send + Sync {
    /// Identity used for reconciliation.
    fn child_id(&self) -> ComponentId;

    fn mount(&self, ctx: &MountContext) -> Result<ChildHandle>;

    /// Handle of the existing mount under `root`, if any.
    fn mounted_handle(&self, root: RootId) -> Option<ChildHandle>;

    /// Tear down the mount under `root` and its descendants.
    ///
    /// Releasing something that is not mounted is a no-op.
    fn release(&self, root: RootId);
}

pub type Child = Arc<dyn Renderable>;

// ============================================================================
// ChildList
// ============================================================================

/// Ordered child collection: a plain sequence or a keyed mapping.
#[derive(Clone)]
pub enum ChildList {
    Sequence(Vec<Child>),
    Keyed(Vec<(String, Child)>),
}

impl Default for ChildList {
    fn default() -> Self {
        Self::Sequence(Vec::new())
    }
}

impl ChildList {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn of<I, R>(items: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Renderable + 'static,
    {
        Self::Sequence(
            items
                .into_iter()
                .map(|r| Arc::new(r) as Child)
                .collect(),
        )
    }

    pub fn keyed<I, K, R>(items: I) -> Self
    where
        I: IntoIterator<Item = (K, R)>,
        K: Into<String>,
        R: Renderable + 'static,
    {
        Self::Keyed(
            items
                .into_iter()
                .map(|(k, r)| (k.into(), Arc::new(r) as Child))
                .collect(),
        )
    }

    pub fn iter(&self) -> Box<dyn Iterator<Item = &Child> + '_> {
        match self {
            Self::Sequence(items) => Box::new(items.iter()),
            Self::Keyed(items) => Box::new(items.iter().map(|(_, c)| c)),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Sequence(items) => items.len(),
            Self::Keyed(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: ComponentId) -> bool {
        self.iter().any(|c| c.child_id() == id)
    }

    /// Keys of a keyed collection.
    pub fn names(&self) -> Option<Vec<String>> {
        match self {
            Self::Sequence(_) => None,
            Self::Keyed(items) => Some(items.iter().map(|(k, _)| k.clone()).collect()),
        }
    }

    /// Same children (by identity), same keys, same order.
    pub fn same_as(&self, other: &ChildList) -> bool {
        self.len() == other.len()
            && self.names() == other.names()
            && self
                .iter()
                .zip(other.iter())
                .all(|(a, b)| a.child_id() == b.child_id())
    }

    pub fn ids(&self) -> Vec<ComponentId> {
        self.iter().map(|c| c.child_id()).collect()
    }
}

impl fmt::Debug for ChildList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequence(_) => f.debug_tuple("Sequence").field(&self.ids()).finish(),
            Self::Keyed(items) => f
                .debug_map()
                .entries(items.iter().map(|(k, c)| (k, c.child_id())))
                .finish(),
        }
    }
}

impl FromIterator<Child> for ChildList {
    fn from_iter<T: IntoIterator<Item = Child>>(iter: T) -> Self {
        Self::Sequence(iter.into_iter().collect())
    }
}
