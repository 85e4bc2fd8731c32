//! Named serial execution contexts.
//!
//! A [`Queue`] is a dedicated worker thread fed by a channel. Jobs run one
//! at a time in FIFO submission order, so anything funneled through a queue
//! is serialized without explicit locking. Subscriber deliveries and the
//! store's write path both ride on queues.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc::{self, Sender};
use std::thread::{self, ThreadId};

type Job = Box<dyn FnOnce() + Send>;

/// A named serial execution context backed by one worker thread.
///
/// Handles are cheap to clone and share the same worker. The worker exits
/// once the last handle is dropped and its pending jobs have run.
#[derive(Clone)]
pub struct Queue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    label: String,
    tx: Sender<Job>,
    worker: ThreadId,
}

impl Queue {
    /// Spawn a serial queue whose worker thread carries `label` as its name.
    pub fn new(label: &str) -> Self {
        let (tx, rx) = mpsc::channel::<Job>();
        let handle = thread::Builder::new()
            .name(label.to_string())
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
                        log::error!("queue job panicked: {}", panic_message(payload.as_ref()));
                    }
                }
            })
            .unwrap_or_else(|e| panic!("failed to spawn queue worker '{label}': {e}"));

        let worker = handle.thread().id();
        Self {
            inner: Arc::new(QueueInner {
                label: label.to_string(),
                tx,
                worker,
            }),
        }
    }

    /// The label this queue was created with.
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// True when called from this queue's own worker thread.
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.inner.worker
    }

    /// Submit a job without waiting for it to run.
    ///
    /// A panicking job is caught and logged; the worker keeps serving
    /// later jobs.
    pub fn run<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.inner.tx.send(Box::new(job)).is_err() {
            log::error!("queue '{}' is gone, dropping job", self.inner.label);
        }
    }

    /// Submit a job and block until it has run, returning its result.
    ///
    /// Called from this queue's own worker thread the job executes
    /// directly, so a job may wait on its own queue without deadlocking.
    /// A panic inside the job resumes on the waiting caller.
    pub fn run_sync<R, F>(&self, job: F) -> R
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        if self.is_current() {
            return job();
        }

        let (done_tx, done_rx) = mpsc::channel();
        self.run(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(job));
            let _ = done_tx.send(result);
        });
        match done_rx.recv() {
            Ok(Ok(value)) => value,
            Ok(Err(payload)) => panic::resume_unwind(payload),
            Err(_) => panic!("queue '{}' shut down while a caller was waiting", self.label()),
        }
    }
}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue").field("label", &self.inner.label).finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_jobs_run_in_submission_order() {
        let queue = Queue::new("test.queue.order");
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let seen = seen.clone();
            queue.run(move || seen.lock().unwrap().push(i));
        }
        queue.run_sync(|| {});

        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_run_sync_returns_value_from_worker_thread() {
        let queue = Queue::new("test.queue.sync");

        let name = queue.run_sync(|| thread::current().name().map(str::to_string));

        assert_eq!(name.as_deref(), Some("test.queue.sync"));
    }

    #[test]
    fn test_run_sync_from_own_worker_executes_directly() {
        let queue = Queue::new("test.queue.reentrant");
        let inner = queue.clone();

        let value = queue.run_sync(move || inner.run_sync(|| 7));

        assert_eq!(value, 7);
    }

    #[test]
    fn test_worker_survives_panicking_job() {
        let queue = Queue::new("test.queue.panic");
        let count = Arc::new(AtomicUsize::new(0));

        queue.run(|| panic!("boom"));
        let count2 = count.clone();
        queue.run(move || {
            count2.fetch_add(1, Ordering::SeqCst);
        });
        queue.run_sync(|| {});

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_run_sync_propagates_panic_to_caller() {
        let queue = Queue::new("test.queue.resume");

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            queue.run_sync(|| -> usize { panic!("boom") })
        }));

        assert!(result.is_err());
        assert_eq!(queue.run_sync(|| 3), 3);
    }
}
