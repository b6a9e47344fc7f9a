//! Bidirectional change propagation.
//!
//! # Module Structure
//!
//! - `context` - per-cycle [`SyncContext`] (session, origin, busy flag)
//! - `transform` - rename / value-transform table
//! - `outbound` - server → client: batching, deferral, echo holding
//! - `inbound` - client → server: echo suppression, debounced processing
//! - `watch` - server-side watchers
//! - `link` - live coupling between two components
//!
//! ```text
//! set() ─► apply ─► param_change ─► View::stage_update ─► Channel::send
//!                         │
//!                         └─► watchers / links
//!
//! Channel ─► handle_message ─► handle_change ─► pending ─(debounce)─► apply
//! ```

pub mod context;
mod inbound;
pub mod link;
mod outbound;
pub mod transform;
pub mod watch;

pub use context::SyncContext;
pub(crate) use outbound::deliver;
pub use link::{Link, LinkCallback, LinkHandle};
pub use transform::{Transforms, ValueTransform};
pub use watch::{WatchFn, WatcherId};

pub use crate::ids::SessionId;

use crate::children::ChildList;
use crate::value::{Value, values_match};

// ============================================================================
// State values
// ============================================================================

/// Value stored under one state key.
#[derive(Debug, Clone)]
pub enum StateValue {
    Data(Value),
    /// Mounted children of a `model`/`template` child slot.
    Children(ChildList),
}

impl Default for StateValue {
    fn default() -> Self {
        Self::Data(Value::Null)
    }
}

impl StateValue {
    pub fn as_data(&self) -> Option<&Value> {
        match self {
            Self::Data(v) => Some(v),
            Self::Children(_) => None,
        }
    }

    pub fn as_children(&self) -> Option<&ChildList> {
        match self {
            Self::Children(c) => Some(c),
            Self::Data(_) => None,
        }
    }

    /// Equality used for change detection: numeric-tolerant for data,
    /// identity-wise for children.
    pub fn same_as(&self, other: &StateValue) -> bool {
        match (self, other) {
            (Self::Data(a), Self::Data(b)) => values_match(a, b),
            (Self::Children(a), Self::Children(b)) => a.same_as(b),
            _ => false,
        }
    }
}

impl From<Value> for StateValue {
    fn from(value: Value) -> Self {
        Self::Data(value)
    }
}

impl From<ChildList> for StateValue {
    fn from(children: ChildList) -> Self {
        Self::Children(children)
    }
}

// ============================================================================
// Change events
// ============================================================================

/// Where a change came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Server,
    Client,
}

/// One key changed within a cycle.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub key: String,
    pub old: StateValue,
    pub new: StateValue,
    pub origin: Origin,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_same_as_numeric_tolerance() {
        assert!(StateValue::from(json!(1)).same_as(&StateValue::from(json!(1.0))));
        assert!(!StateValue::from(json!(1)).same_as(&StateValue::from(json!(2))));
        assert!(!StateValue::from(json!([])).same_as(&StateValue::Children(ChildList::empty())));
    }
}
