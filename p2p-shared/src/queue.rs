use std::collections::BTreeMap;
use std::time::Instant;

/// TaskQueue holds work posted for later delivery.
///
/// Tasks come out in deadline order; tasks posted for the same deadline come
/// out in the order they were posted. Nothing is delivered until the owner
/// drives the queue with [TaskQueue::pop_due].
#[derive(Debug)]
pub struct TaskQueue<T> {
    tasks: BTreeMap<(Instant, u64), T>,
    next_seq: u64,
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self {
            tasks: BTreeMap::new(),
            next_seq: 0,
        }
    }
}

impl<T> TaskQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// post schedules `task` for delivery once the clock reaches `at`.
    pub fn post(&mut self, at: Instant, task: T) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.tasks.insert((at, seq), task);
    }

    /// Earliest deadline among pending tasks.
    pub fn poll_timeout(&self) -> Option<Instant> {
        self.tasks.keys().next().map(|(at, _)| *at)
    }

    /// pop_due removes and returns the next task whose deadline is not after `now`.
    pub fn pop_due(&mut self, now: Instant) -> Option<T> {
        let key = *self.tasks.keys().next()?;
        if key.0 > now {
            return None;
        }
        self.tasks.remove(&key)
    }

    /// Drops every pending task without delivering it.
    pub fn clear(&mut self) {
        self.tasks.clear();
    }

    /// Drops the pending tasks for which `f` returns false.
    pub fn retain<F>(&mut self, mut f: F)
    where
        F: FnMut(&T) -> bool,
    {
        self.tasks.retain(|_, task| f(task));
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
