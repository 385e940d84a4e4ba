//! Virtual clock and task scheduler.
//!
//! Every delayed effect in the simulation (engine ticks, pod readiness,
//! drain steps, node jitter) is a task queued against one virtual clock.
//! Tasks run in `(due, insertion)` order, so two tasks due at the same
//! instant run in the order they were scheduled.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::time::Duration;

struct Scheduled<T> {
    due: Duration,
    seq: u64,
    task: T,
}

impl<T> PartialEq for Scheduled<T> {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl<T> Eq for Scheduled<T> {}

impl<T> PartialOrd for Scheduled<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Scheduled<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.due, self.seq).cmp(&(other.due, other.seq))
    }
}

pub struct Scheduler<T> {
    now: Duration,
    seq: u64,
    queue: BinaryHeap<Reverse<Scheduled<T>>>,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self {
            now: Duration::ZERO,
            seq: 0,
            queue: BinaryHeap::new(),
        }
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    /// Queue `task` at `due`. A due time in the past runs on the next pop.
    pub fn schedule_at(&mut self, due: Duration, task: T) {
        self.seq += 1;
        self.queue.push(Reverse(Scheduled {
            due: due.max(self.now),
            seq: self.seq,
            task,
        }));
    }

    pub fn schedule_in(&mut self, delay: Duration, task: T) {
        self.schedule_at(self.now + delay, task);
    }

    /// Pop the next task due at or before `until`, moving the clock to its
    /// due time.
    pub fn pop_due(&mut self, until: Duration) -> Option<(Duration, T)> {
        if self.queue.peek()?.0.due > until {
            return None;
        }
        let Reverse(next) = self.queue.pop()?;
        self.now = next.due;
        Some((next.due, next.task))
    }

    /// Move the clock forward without running anything. Never moves back.
    pub fn advance_to(&mut self, at: Duration) {
        self.now = self.now.max(at);
    }

    pub fn next_due(&self) -> Option<Duration> {
        self.queue.peek().map(|s| s.0.due)
    }

    /// Drop every task for which `keep` returns false. Returns how many were
    /// dropped.
    pub fn retain(&mut self, mut keep: impl FnMut(&T) -> bool) -> usize {
        let before = self.queue.len();
        self.queue.retain(|s| keep(&s.0.task));
        before - self.queue.len()
    }

    pub fn any(&self, mut pred: impl FnMut(&T) -> bool) -> bool {
        self.queue.iter().any(|s| pred(&s.0.task))
    }

    pub fn count(&self, mut pred: impl FnMut(&T) -> bool) -> usize {
        self.queue.iter().filter(|s| pred(&s.0.task)).count()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
