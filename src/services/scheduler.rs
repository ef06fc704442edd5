//! Scheduler: keyed one-shot timers with explicit supersede and cancel.
//!
//! DESIGN
//! ======
//! Each key holds at most one pending task. `schedule` replaces (restarts)
//! the key's task, `schedule_if_idle` only arms when nothing is pending,
//! and `cancel` drops it. Timers run on `tokio::time`, so tests drive them
//! with a paused clock.
//!
//! A firing task first claims its own entry under the lock (matching by
//! generation) and only then runs its body. Once claimed, the task is no
//! longer visible to `cancel`, so cancellation never aborts a body that
//! has started writing.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

struct Entry {
    generation: u64,
    handle: JoinHandle<()>,
}

struct SchedulerInner<K> {
    tasks: HashMap<K, Entry>,
    next_generation: u64,
}

pub struct Scheduler<K> {
    inner: Arc<Mutex<SchedulerInner<K>>>,
}

impl<K> Clone for Scheduler<K> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<K> Default for Scheduler<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Scheduler<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self { inner: Arc::new(Mutex::new(SchedulerInner { tasks: HashMap::new(), next_generation: 0 })) }
    }

    fn lock(&self) -> MutexGuard<'_, SchedulerInner<K>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `task` after `delay`, superseding any task pending for `key`.
    pub fn schedule<F>(&self, key: K, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut inner = self.lock();
        self.arm(&mut inner, key, delay, task);
    }

    /// Run `task` after `delay` unless a task is already pending for `key`.
    /// Returns whether a new task was armed.
    pub fn schedule_if_idle<F>(&self, key: K, delay: Duration, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut inner = self.lock();
        if inner.tasks.contains_key(&key) {
            return false;
        }
        self.arm(&mut inner, key, delay, task);
        true
    }

    /// Drop the pending task for `key`. Returns whether one was pending.
    pub fn cancel(&self, key: &K) -> bool {
        let Some(entry) = self.lock().tasks.remove(key) else {
            return false;
        };
        entry.handle.abort();
        true
    }

    #[must_use]
    pub fn is_armed(&self, key: &K) -> bool {
        self.lock().tasks.contains_key(key)
    }

    #[must_use]
    pub fn armed_count(&self) -> usize {
        self.lock().tasks.len()
    }

    fn arm<F>(&self, inner: &mut SchedulerInner<K>, key: K, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        inner.next_generation += 1;
        let generation = inner.next_generation;

        let this = self.clone();
        let claim_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if this.claim(&claim_key, generation) {
                task.await;
            }
        });

        if let Some(previous) = inner.tasks.insert(key, Entry { generation, handle }) {
            previous.handle.abort();
        }
    }

    /// Remove the entry for `key` if it still belongs to `generation`.
    fn claim(&self, key: &K, generation: u64) -> bool {
        let mut inner = self.lock();
        match inner.tasks.get(key) {
            Some(entry) if entry.generation == generation => {
                inner.tasks.remove(key);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
#[path = "scheduler_test.rs"]
mod tests;
