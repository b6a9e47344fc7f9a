//! Process-unique identifiers.
//!
//! Identifiers are plain counters; they are never reused within a process,
//! so a stale id can be told apart from a live one by equality alone.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Allocate the next identifier.
            pub fn next() -> Self {
                static COUNTER: AtomicU64 = AtomicU64::new(1);
                Self(COUNTER.fetch_add(1, Ordering::Relaxed))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

define_id!(
    /// Logical session (one connected client).
    SessionId,
    "s"
);
define_id!(
    /// Top-level mount inside a document.
    RootId,
    "r"
);
define_id!(
    /// One mounted view of a component.
    ViewId,
    "v"
);
define_id!(
    /// Live component instance.
    ComponentId,
    "c"
);
define_id!(DocumentId, "d");
define_id!(
    /// Registered watcher, used to unwatch.
    WatcherId,
    "w"
);
