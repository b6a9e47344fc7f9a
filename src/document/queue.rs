use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::sync::SyncContext;

/// Deferred unit of work, run with the owning document's context.
pub type Task = Box<dyn FnOnce(&SyncContext) + Send>;

struct Timeout {
    deadline: Instant,
    seq: u64,
    task: Task,
}

/// Pure task queue: only ordering and timing, no document state.
///
/// Next-tick tasks run first, in FIFO order. Timeout tasks run once their
/// deadline has passed, ordered by deadline and then by insertion.
#[derive(Default)]
pub struct TaskQueue {
    next_tick: VecDeque<Task>,
    timeouts: Vec<Timeout>,
    seq: u64,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_next_tick(&mut self, task: Task) {
        self.next_tick.push_back(task);
    }

    pub fn push_timeout(&mut self, deadline: Instant, task: Task) {
        self.seq += 1;
        self.timeouts.push(Timeout {
            deadline,
            seq: self.seq,
            task,
        });
    }

    pub fn is_ready(&self, now: Instant) -> bool {
        !self.next_tick.is_empty() || self.timeouts.iter().any(|t| t.deadline <= now)
    }

    /// Remove and return every task runnable at `now`.
    pub fn take_ready(&mut self, now: Instant) -> Vec<Task> {
        let mut ready: Vec<Task> = self.next_tick.drain(..).collect();

        let (mut due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.timeouts)
            .into_iter()
            .partition(|t| t.deadline <= now);
        self.timeouts = pending;

        due.sort_by_key(|t| (t.deadline, t.seq));
        ready.extend(due.into_iter().map(|t| t.task));
        ready
    }

    /// Remove and return every task regardless of deadlines.
    pub fn take_all(&mut self) -> Vec<Task> {
        let mut all: Vec<Task> = self.next_tick.drain(..).collect();
        let mut timeouts = std::mem::take(&mut self.timeouts);
        timeouts.sort_by_key(|t| (t.deadline, t.seq));
        all.extend(timeouts.into_iter().map(|t| t.task));
        all
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timeouts.iter().map(|t| t.deadline).min()
    }

    /// How long a driver may sleep before work becomes runnable.
    pub fn sleep_duration(&self, now: Instant) -> Option<Duration> {
        if !self.next_tick.is_empty() {
            return Some(Duration::ZERO);
        }
        self.next_deadline()
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    pub fn len(&self) -> usize {
        self.next_tick.len() + self.timeouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.next_tick.clear();
        self.timeouts.clear();
    }
}
