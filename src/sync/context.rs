//! Per-cycle synchronization context.
//!
//! A `SyncContext` travels down the call chain of one change cycle. It names
//! the session that started the cycle, the root the change originated from
//! (client edits), and carries the busy flag raised while buffered client
//! changes are applied.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::ids::{RootId, SessionId};

#[derive(Debug, Default)]
pub struct SyncContext {
    session: Option<SessionId>,
    origin: Option<RootId>,
    busy: AtomicBool,
}

impl SyncContext {
    /// Context for code running outside any session (scripts, tests, timers).
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn for_session(session: Option<SessionId>) -> Self {
        Self {
            session,
            ..Self::default()
        }
    }

    pub fn with_origin(mut self, root: RootId) -> Self {
        self.origin = Some(root);
        self
    }

    #[inline]
    pub fn session(&self) -> Option<SessionId> {
        self.session
    }

    #[inline]
    pub fn origin(&self) -> Option<RootId> {
        self.origin
    }

    #[inline]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Raise the busy flag until the guard drops (including on early return).
    pub(crate) fn busy(&self) -> BusyGuard<'_> {
        self.busy.store(true, Ordering::SeqCst);
        BusyGuard { ctx: self }
    }
}

pub(crate) struct BusyGuard<'a> {
    ctx: &'a SyncContext,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.ctx.busy.store(false, Ordering::SeqCst);
    }
}
