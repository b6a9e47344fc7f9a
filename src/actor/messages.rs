//! Session Actor Messages
//!
//! ```text
//! transport --Inbound--> SessionActor --(Document task queue)--> Components
//! ```

use crate::component::Component;
use crate::ids::{ComponentId, RootId};

// =============================================================================
// SessionActor Messages
// =============================================================================

/// Messages to the session actor
#[derive(Debug)]
pub enum SessionMsg {
    /// Make a component addressable by inbound messages
    Register(Component),
    /// Raw JSON received from the view of `component` under `root`
    Inbound {
        component: ComponentId,
        root: RootId,
        payload: String,
    },
    /// Flush every pending task and stop
    Shutdown,
}
