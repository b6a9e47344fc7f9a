//! Documents: the hosting page of one or more mounted roots.
//!
//! A document owns:
//! - a cooperative [`TaskQueue`] for deferred pushes and debounced edits
//! - the change-cycle depth; channels touched inside a cycle are pushed
//!   once when the outermost cycle exits
//! - the list of top-level roots, released on [`Document::close`]
//!
//! A document bound to a session defers work that arrives from outside that
//! session and relies on a [`SessionActor`](crate::actor::SessionActor) to
//! run its queue. A document without a session applies everything
//! immediately; its only queued work is echo expiry, which it runs itself:
//! from a tokio timer when a runtime is available, and at the start of the
//! next change cycle otherwise.

mod queue;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

pub use queue::{Task, TaskQueue};

use crate::channel::Channel;
use crate::children::{Child, MountContext};
use crate::config::cfg;
use crate::error::Result;
use crate::ids::{DocumentId, RootId, SessionId};
use crate::sync::SyncContext;

#[derive(Default)]
struct Cycle {
    depth: usize,
    dirty: Vec<Arc<dyn Channel>>,
}

struct DocumentInner {
    id: DocumentId,
    session: Option<SessionId>,
    queue: Mutex<TaskQueue>,
    cycle: Mutex<Cycle>,
    roots: Mutex<Vec<(RootId, Child)>>,
    echo_timeout: Mutex<Duration>,
    closed: AtomicBool,
}

#[derive(Clone)]
pub struct Document {
    inner: Arc<DocumentInner>,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.inner.id)
            .field("session", &self.inner.session)
            .finish()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Document without a session: updates are never deferred.
    pub fn new() -> Self {
        Self::build(None)
    }

    pub fn with_session(session: SessionId) -> Self {
        Self::build(Some(session))
    }

    fn build(session: Option<SessionId>) -> Self {
        Self {
            inner: Arc::new(DocumentInner {
                id: DocumentId::next(),
                session,
                queue: Mutex::new(TaskQueue::new()),
                cycle: Mutex::new(Cycle::default()),
                roots: Mutex::new(Vec::new()),
                echo_timeout: Mutex::new(cfg().sync.timeout()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    #[inline]
    pub fn id(&self) -> DocumentId {
        self.inner.id
    }

    #[inline]
    pub fn session(&self) -> Option<SessionId> {
        self.inner.session
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Whether a change running under `ctx` may touch this document directly.
    pub fn is_unblocked(&self, ctx: &SyncContext) -> bool {
        match self.inner.session {
            None => true,
            Some(session) => ctx.session() == Some(session),
        }
    }

    /// Lifetime of "recently sent" markers for views mounted here.
    pub fn echo_timeout(&self) -> Duration {
        *self.inner.echo_timeout.lock()
    }

    /// Override the marker lifetime for views mounted from now on.
    pub fn set_echo_timeout(&self, timeout: Duration) {
        *self.inner.echo_timeout.lock() = timeout;
    }

    /// Context for work executed on behalf of this document.
    pub fn context(&self) -> SyncContext {
        SyncContext::for_session(self.inner.session)
    }

    // ========================================================================
    // Roots
    // ========================================================================

    /// Mount `child` as a new top-level root.
    pub fn add_root(&self, child: Child, channel: Arc<dyn Channel>) -> Result<RootId> {
        let root = RootId::next();
        let ctx = MountContext::new(self.clone(), root, channel);
        {
            let _cycle = self.enter();
            child.mount(&ctx)?;
        }
        self.inner.roots.lock().push((root, child));
        crate::debug!("session"; "{} mounted root {}", self.inner.id, root);
        Ok(root)
    }

    pub fn roots(&self) -> Vec<RootId> {
        self.inner.roots.lock().iter().map(|(r, _)| *r).collect()
    }

    /// Release every root (depth-first) and discard queued work.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let roots = std::mem::take(&mut *self.inner.roots.lock());
        for (root, child) in roots {
            child.release(root);
        }
        self.inner.queue.lock().clear();
        crate::debug!("session"; "{} closed", self.inner.id);
    }

    // ========================================================================
    // Change cycles
    // ========================================================================

    /// Enter a change cycle; dirty channels are pushed when the outermost
    /// guard drops.
    ///
    /// Entering the outermost cycle of a sessionless document first runs
    /// its timeouts that are already due.
    pub fn enter(&self) -> CycleGuard {
        let outermost = {
            let mut cycle = self.inner.cycle.lock();
            cycle.depth += 1;
            cycle.depth == 1
        };
        let guard = CycleGuard { doc: self.clone() };
        if outermost && self.inner.session.is_none() {
            let due = self.inner.queue.lock().take_ready(Instant::now());
            if !due.is_empty() {
                let ctx = self.context();
                for task in due {
                    task(&ctx);
                }
            }
        }
        guard
    }

    /// Record that `channel` has pending messages for this document.
    pub(crate) fn touch(&self, channel: &Arc<dyn Channel>) {
        let mut cycle = self.inner.cycle.lock();
        if cycle.depth == 0 {
            drop(cycle);
            channel.push(self.inner.id);
            return;
        }
        if !cycle.dirty.iter().any(|c| Arc::ptr_eq(c, channel)) {
            cycle.dirty.push(Arc::clone(channel));
        }
    }

    // ========================================================================
    // Task queue
    // ========================================================================

    pub fn add_next_tick(&self, task: Task) {
        if self.is_closed() {
            return;
        }
        self.inner.queue.lock().push_next_tick(task);
    }

    pub fn add_timeout(&self, delay: Duration, task: Task) {
        if self.is_closed() {
            return;
        }
        self.inner
            .queue
            .lock()
            .push_timeout(Instant::now() + delay, task);
        if self.inner.session.is_none() {
            self.drive_timeout(delay);
        }
    }

    /// Run due timeouts of a sessionless document once `delay` has passed.
    fn drive_timeout(&self, delay: Duration) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            crate::debug!("session"; "{} has no runtime, timeout runs on next cycle", self.inner.id);
            return;
        };
        let document = self.clone();
        runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if !document.is_closed() {
                document.run_pending(Instant::now());
            }
        });
    }

    pub fn pending_tasks(&self) -> usize {
        self.inner.queue.lock().len()
    }

    pub fn sleep_duration(&self, now: Instant) -> Option<Duration> {
        self.inner.queue.lock().sleep_duration(now)
    }

    /// Run every task runnable at `now`, including next-tick tasks those
    /// tasks schedule. Returns the number of tasks run.
    pub fn run_pending(&self, now: Instant) -> usize {
        self.drain(|queue| queue.take_ready(now))
    }

    /// Run every queued task regardless of deadlines.
    pub fn flush_all(&self) -> usize {
        self.drain(TaskQueue::take_all)
    }

    fn drain(&self, mut take: impl FnMut(&mut TaskQueue) -> Vec<Task>) -> usize {
        let ctx = self.context();
        let mut ran = 0;
        loop {
            let tasks = take(&mut *self.inner.queue.lock());
            if tasks.is_empty() {
                break;
            }
            let _cycle = self.enter();
            for task in tasks {
                task(&ctx);
                ran += 1;
            }
        }
        ran
    }
}

/// Guard for one (possibly nested) change cycle.
pub struct CycleGuard {
    doc: Document,
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        let dirty = {
            let mut cycle = self.doc.inner.cycle.lock();
            cycle.depth = cycle.depth.saturating_sub(1);
            if cycle.depth > 0 {
                return;
            }
            std::mem::take(&mut cycle.dirty)
        };
        for channel in dirty {
            channel.push(self.doc.inner.id);
        }
    }
}
