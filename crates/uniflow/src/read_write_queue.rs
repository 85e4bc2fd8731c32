//! The serializing state cell: concurrent reads, FIFO-serialized writes.
//!
//! Reads share an `RwLock` and only ever see fully-committed values.
//! Writes are funneled through a serial [`Queue`], which gives them a
//! strict FIFO order no matter which thread submitted them. A mutator
//! works on a copy of the current value and the result is committed in one
//! assignment, so a panicking mutator commits nothing.

use std::sync::{Arc, RwLock};

use crate::queue::Queue;

pub(crate) struct ReadWriteQueue<T> {
    value: Arc<RwLock<T>>,
    writes: Queue,
}

impl<T: Clone + Send + Sync + 'static> ReadWriteQueue<T> {
    pub(crate) fn new(label: &str, value: T) -> Self {
        Self {
            value: Arc::new(RwLock::new(value)),
            writes: Queue::new(label),
        }
    }

    /// Read the latest committed value. Concurrent with other reads; never
    /// interleaves with an in-progress commit.
    pub(crate) fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = match self.value.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&guard)
    }

    /// Queue a write and return before it lands. `committed` runs on the
    /// write queue after the commit, outside the lock, with the new value.
    pub(crate) fn write<M, C>(&self, mutate: M, committed: C)
    where
        M: FnOnce(&mut T) + Send + 'static,
        C: FnOnce(T) + Send + 'static,
    {
        let value = self.value.clone();
        self.writes.run(move || apply(&value, mutate, committed));
    }

    /// Like [`Self::write`], but blocks until the commit and `committed`
    /// have finished. A panicking mutator resumes on this caller.
    pub(crate) fn write_and_wait<M, C>(&self, mutate: M, committed: C)
    where
        M: FnOnce(&mut T) + Send + 'static,
        C: FnOnce(T) + Send + 'static,
    {
        let value = self.value.clone();
        self.writes.run_sync(move || apply(&value, mutate, committed));
    }

    /// Block until every write queued before this call has committed.
    /// Degenerates to a no-op when already on the write queue.
    pub(crate) fn flush(&self) {
        self.writes.run_sync(|| {});
    }
}

fn apply<T: Clone>(value: &RwLock<T>, mutate: impl FnOnce(&mut T), committed: impl FnOnce(T)) {
    let mut next = {
        let guard = match value.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.clone()
    };
    mutate(&mut next);
    {
        let mut guard = match value.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = next.clone();
    }
    committed(next);
}
