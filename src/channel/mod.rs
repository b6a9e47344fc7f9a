//! Transport seam between the engine and client views.
//!
//! The engine never talks to a socket directly. Each mounted view is bound
//! to a [`Channel`] that delivers [`OutboundMessage`]s in order for that
//! view. Delivery is best-effort: a failed send is logged and never retried.
//!
//! | Kind      | Inbound edits            | Outbound pushes          |
//! |-----------|--------------------------|--------------------------|
//! | `Direct`  | processed immediately    | applied immediately      |
//! | `Session` | debounced on the document| deferred when blocked    |

pub mod message;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use message::{InboundMessage, OutboundMessage, RenderMessage};

use crate::ids::{ComponentId, DocumentId, RootId, ViewId};
use crate::value::Changes;

/// Address of one mounted view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViewRef {
    pub component: ComponentId,
    pub root: RootId,
    pub view: ViewId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// Synchronous, in-process comm.
    Direct,
    /// Server session with its own event loop.
    Session,
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel is closed")]
    Closed,

    #[error("message rejected: {0}")]
    Rejected(String),
}

pub trait Channel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    /// Queue a message for one view.
    fn send(&self, target: &ViewRef, message: OutboundMessage) -> Result<(), ChannelError>;

    /// Flush queued messages for a document.
    fn push(&self, document: DocumentId);
}

// ============================================================================
// MemoryChannel
// ============================================================================

/// In-process channel that records everything it is asked to deliver.
pub struct MemoryChannel {
    kind: ChannelKind,
    sent: Mutex<Vec<(ViewRef, OutboundMessage)>>,
    pushes: Mutex<Vec<DocumentId>>,
    drop_next: AtomicUsize,
    closed: AtomicBool,
}

impl MemoryChannel {
    pub fn new(kind: ChannelKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            sent: Mutex::new(Vec::new()),
            pushes: Mutex::new(Vec::new()),
            drop_next: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        })
    }

    pub fn direct() -> Arc<Self> {
        Self::new(ChannelKind::Direct)
    }

    pub fn session() -> Arc<Self> {
        Self::new(ChannelKind::Session)
    }

    /// Silently lose the next `n` messages.
    pub fn drop_next(&self, n: usize) {
        self.drop_next.store(n, Ordering::SeqCst);
    }

    /// Reject every later send with [`ChannelError::Closed`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(ViewRef, OutboundMessage)> {
        self.sent.lock().clone()
    }

    /// Drain recorded messages.
    pub fn take(&self) -> Vec<(ViewRef, OutboundMessage)> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Properties of every recorded `update` message, in order.
    pub fn updates(&self) -> Vec<Changes> {
        self.sent
            .lock()
            .iter()
            .filter_map(|(_, msg)| msg.properties().cloned())
            .collect()
    }

    pub fn push_count(&self) -> usize {
        self.pushes.lock().len()
    }
}

impl Channel for MemoryChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    fn send(&self, target: &ViewRef, message: OutboundMessage) -> Result<(), ChannelError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ChannelError::Closed);
        }
        let dropped = self
            .drop_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !dropped {
            self.sent.lock().push((*target, message));
        }
        Ok(())
    }

    fn push(&self, document: DocumentId) {
        self.pushes.lock().push(document);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> ViewRef {
        ViewRef {
            component: ComponentId::next(),
            root: RootId::next(),
            view: ViewId::next(),
        }
    }

    fn update() -> OutboundMessage {
        OutboundMessage::Update {
            properties: Changes::new(),
        }
    }

    #[test]
    fn test_records_in_order() {
        let channel = MemoryChannel::direct();
        let t = target();
        channel.send(&t, update()).unwrap();
        channel
            .send(&t, OutboundMessage::Events { events: Default::default() })
            .unwrap();
        let sent = channel.take();
        assert_eq!(sent.len(), 2);
        assert!(matches!(sent[1].1, OutboundMessage::Events { .. }));
        assert!(channel.sent().is_empty());
    }

    #[test]
    fn test_drop_next_is_silent() {
        let channel = MemoryChannel::session();
        channel.drop_next(1);
        let t = target();
        assert!(channel.send(&t, update()).is_ok());
        assert!(channel.send(&t, update()).is_ok());
        assert_eq!(channel.sent().len(), 1);
    }

    #[test]
    fn test_closed_channel_rejects() {
        let channel = MemoryChannel::direct();
        channel.close();
        assert!(matches!(
            channel.send(&target(), update()),
            Err(ChannelError::Closed)
        ));
    }
}
