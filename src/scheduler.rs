//! Timer facility
//!
//! Deferred work is an explicit queue of `(due, task)` entries keyed by
//! session time (time since the session started). The event loop asks for
//! [`Scheduler::next_due`], sleeps until then, and pops every task that is
//! due. Cancelled entries stay in the heap and are skipped when popped.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::time::Duration;

use crate::model::NodeId;

/// Handle for cancelling a scheduled task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// Every kind of deferred work the session schedules
#[derive(Debug, Clone, PartialEq)]
pub enum TimerTask {
    /// Retry the live connection
    Reconnect,
    /// Periodic ambient firing
    AmbientFire,
    /// Periodic relaxation step
    Relax,
    /// Periodic decay notification and position refresh
    Maintenance,
    /// Periodic activity poll
    PollActivity,
    /// Deferred firing (propagation hop or staggered cascade)
    Fire { node: NodeId, propagate: bool },
    /// Return a synapse to its weight-derived baseline
    SynapseRest { index: usize },
    /// End a node's peak flash
    NeuronRest { node: NodeId },
}

struct Entry<T> {
    due: Duration,
    seq: u64,
    id: TimerId,
    task: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for a min-heap; ties resolve in scheduling order
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Min-heap of pending tasks
pub struct Scheduler<T = TimerTask> {
    heap: BinaryHeap<Entry<T>>,
    pending: HashSet<TimerId>,
    next_seq: u64,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            pending: HashSet::new(),
            next_seq: 0,
        }
    }

    /// Schedule `task` at absolute session time `due`
    pub fn schedule_at(&mut self, due: Duration, task: T) -> TimerId {
        let seq = self.next_seq;
        self.next_seq += 1;
        let id = TimerId(seq);
        self.heap.push(Entry { due, seq, id, task });
        self.pending.insert(id);
        id
    }

    /// Schedule `task` `delay` after `now`
    pub fn schedule_after(&mut self, now: Duration, delay: Duration, task: T) -> TimerId {
        self.schedule_at(now + delay, task)
    }

    /// Cancel a pending task. Returns false if it already ran or was cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        self.pending.remove(&id)
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.pending.contains(&id)
    }

    /// Number of tasks still pending
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Earliest due time among pending tasks
    pub fn next_due(&mut self) -> Option<Duration> {
        self.discard_cancelled();
        self.heap.peek().map(|e| e.due)
    }

    /// Pop the earliest task if it is due at `now`
    pub fn pop_due(&mut self, now: Duration) -> Option<(TimerId, T)> {
        self.discard_cancelled();
        if self.heap.peek().is_some_and(|e| e.due <= now) {
            let entry = self.heap.pop()?;
            self.pending.remove(&entry.id);
            return Some((entry.id, entry.task));
        }
        None
    }

    /// Pending tasks in no particular order
    pub fn pending_tasks(&self) -> impl Iterator<Item = (Duration, &T)> {
        self.heap
            .iter()
            .filter(|e| self.pending.contains(&e.id))
            .map(|e| (e.due, &e.task))
    }

    fn discard_cancelled(&mut self) {
        while let Some(top) = self.heap.peek() {
            if self.pending.contains(&top.id) {
                break;
            }
            self.heap.pop();
        }
    }
}
