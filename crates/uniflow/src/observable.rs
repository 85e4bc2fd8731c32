//! One-to-many broadcast channel for state updates.
//!
//! [`Observable::pipe`] builds a linked pair: the [`Observer`] side pushes
//! values, the [`Observable`] side hands out independently disposable
//! subscriptions. Fan-out iterates a snapshot of the registry, so
//! registration and disposal stay safe while an update is in flight.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::disposable::Disposable;
use crate::queue::Queue;

/// Caller-supplied equality used by skip-repeats filtering.
pub type EqualityFn<T> = Arc<dyn Fn(&T, &T) -> bool + Send + Sync>;

type OnValue<T> = Box<dyn Fn(T) + Send + Sync>;

/// One registered observer: callback, delivery context, and filters.
pub(crate) struct Subscription<T> {
    queue: Option<Queue>,
    on_value: OnValue<T>,
    disposed: Arc<AtomicBool>,
    repeats: Option<RepeatFilter<T>>,
}

struct RepeatFilter<T> {
    eq: EqualityFn<T>,
    last: Mutex<Option<T>>,
}

impl<T> Subscription<T> {
    pub(crate) fn new(
        queue: Option<Queue>,
        skip_repeats: Option<EqualityFn<T>>,
        on_value: OnValue<T>,
    ) -> Self {
        Self {
            queue,
            on_value,
            disposed: Arc::new(AtomicBool::new(false)),
            repeats: skip_repeats.map(|eq| RepeatFilter {
                eq,
                last: Mutex::new(None),
            }),
        }
    }
}

impl<T: Clone> Subscription<T> {
    /// Invoke the callback unless disposed or suppressed as a repeat.
    /// Runs on the subscription's delivery context.
    pub(crate) fn deliver(&self, value: T) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        if let Some(filter) = &self.repeats {
            let mut last = filter.last.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if matches!(last.as_ref(), Some(previous) if (filter.eq)(previous, &value)) {
                return;
            }
            *last = Some(value.clone());
        }
        (self.on_value)(value);
    }
}

struct Registry<T> {
    subscriptions: HashMap<u64, Arc<Subscription<T>>>,
    /// Queue most recently named by any subscriber; the fallback context
    /// for subscriptions registered without one.
    default_queue: Option<Queue>,
    next_id: u64,
}

struct Channel<T> {
    registry: Mutex<Registry<T>>,
}

/// Consumer side of the pub-sub pair.
pub struct Observable<T> {
    channel: Arc<Channel<T>>,
}

/// Producer side of the pub-sub pair.
pub struct Observer<T> {
    channel: Arc<Channel<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self { channel: self.channel.clone() }
    }
}

impl<T> Clone for Observer<T> {
    fn clone(&self) -> Self {
        Self { channel: self.channel.clone() }
    }
}

impl<T: Clone + Send + Sync + 'static> Observable<T> {
    /// Construct a linked observable/observer pair.
    pub fn pipe() -> (Observable<T>, Observer<T>) {
        let channel = Arc::new(Channel {
            registry: Mutex::new(Registry {
                subscriptions: HashMap::new(),
                default_queue: None,
                next_id: 0,
            }),
        });
        (Observable { channel: channel.clone() }, Observer { channel })
    }

    /// Register a subscriber.
    ///
    /// Values are delivered on `queue` when given. Otherwise delivery falls
    /// back to the queue most recently named by any subscriber of this
    /// channel, and failing that runs inline on the updating thread.
    pub fn subscribe<F>(&self, queue: Option<Queue>, on_value: F) -> Disposable
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.register(Subscription::new(queue, None, Box::new(on_value)))
    }

    pub(crate) fn register(&self, subscription: Subscription<T>) -> Disposable {
        let subscription = Arc::new(subscription);
        let id = {
            let mut registry = self.lock_registry();
            if let Some(queue) = &subscription.queue {
                registry.default_queue = Some(queue.clone());
            }
            let id = registry.next_id;
            registry.next_id += 1;
            registry.subscriptions.insert(id, subscription.clone());
            id
        };

        let channel = Arc::downgrade(&self.channel);
        Disposable::new(
            subscription.disposed.clone(),
            Box::new(move || {
                if let Some(channel) = Weak::upgrade(&channel) {
                    channel
                        .registry
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .subscriptions
                        .remove(&id);
                }
            }),
        )
    }

    fn lock_registry(&self) -> std::sync::MutexGuard<'_, Registry<T>> {
        self.channel
            .registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T: Clone + Send + Sync + 'static> Observer<T> {
    /// Broadcast `value` to every subscription registered at this instant.
    ///
    /// Subscriptions added during the call need not see this value;
    /// subscriptions disposed before their delivery runs will not.
    pub fn update(&self, value: T) {
        let (subscriptions, default_queue) = {
            let registry = self
                .channel
                .registry
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            (
                registry.subscriptions.values().cloned().collect::<Vec<_>>(),
                registry.default_queue.clone(),
            )
        };

        for subscription in subscriptions {
            match subscription.queue.clone().or_else(|| default_queue.clone()) {
                Some(queue) => {
                    let value = value.clone();
                    queue.run(move || subscription.deliver(value));
                }
                None => subscription.deliver(value.clone()),
            }
        }
    }
}

impl<T> Observer<T> {
    /// Force-dispose every registered subscription. Used at store teardown
    /// so no observer callback outlives its store.
    pub(crate) fn dispose_all(&self) {
        let drained: Vec<_> = {
            let mut registry = self
                .channel
                .registry
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            registry.subscriptions.drain().map(|(_, s)| s).collect()
        };
        for subscription in drained {
            subscription.disposed.store(true, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_update_fans_out_to_all_subscribers() {
        let (observable, observer) = Observable::pipe();
        let first = Arc::new(Mutex::new(Vec::new()));
        let second = Arc::new(Mutex::new(Vec::new()));

        let sink = first.clone();
        let _a = observable.subscribe(None, move |v: i32| sink.lock().unwrap().push(v));
        let sink = second.clone();
        let _b = observable.subscribe(None, move |v: i32| sink.lock().unwrap().push(v));

        observer.update(1);
        observer.update(2);

        assert_eq!(*first.lock().unwrap(), vec![1, 2]);
        assert_eq!(*second.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_disposed_subscription_receives_nothing_further() {
        let (observable, observer) = Observable::pipe();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        let disposable = observable.subscribe(None, move |v: i32| sink.lock().unwrap().push(v));

        observer.update(1);
        disposable.dispose();
        observer.update(2);

        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }

    #[test]
    fn test_delivery_happens_on_selected_queue() {
        let (observable, observer) = Observable::pipe();
        let queue = Queue::new("obs.selected");
        let (tx, rx) = mpsc::channel();

        let _d = observable.subscribe(Some(queue), move |v: i32| {
            let name = thread::current().name().map(str::to_string);
            tx.send((v, name)).unwrap();
        });
        observer.update(7);

        let (value, name) = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(value, 7);
        assert_eq!(name.as_deref(), Some("obs.selected"));
    }

    #[test]
    fn test_queueless_subscriber_falls_back_to_last_named_queue() {
        let (observable, observer) = Observable::pipe();
        let queue = Queue::new("obs.fallback");
        let (tx, rx) = mpsc::channel();

        let _first = observable.subscribe(Some(queue), |_v: i32| {});
        let _second = observable.subscribe(None, move |v: i32| {
            let name = thread::current().name().map(str::to_string);
            tx.send((v, name)).unwrap();
        });
        observer.update(9);

        let (value, name) = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(value, 9);
        assert_eq!(name.as_deref(), Some("obs.fallback"));
    }

    #[test]
    fn test_dispose_all_marks_outstanding_handles() {
        let (observable, observer) = Observable::pipe();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        let disposable = observable.subscribe(None, move |v: i32| sink.lock().unwrap().push(v));
        observer.update(1);

        observer.dispose_all();

        assert!(disposable.is_disposed());
        observer.update(2);
        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }
}
