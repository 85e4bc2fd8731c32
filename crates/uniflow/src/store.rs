//! The store: state cell, middleware chain, and update broadcast.
//!
//! A [`Store`] owns one state value, a reducer, a middleware chain
//! composed once at construction, and an [`Observable`]/[`Observer`] pair
//! for fan-out. Dispatches enter a serialized FIFO write path; reads and
//! subscription bookkeeping use their own finer-grained locks so reading
//! state never waits on listener churn.

use std::sync::{Arc, OnceLock, Weak};

use crate::disposable::Disposable;
use crate::middleware::{ActionHandler, DispatchFn, GetState, Middleware, apply_middleware};
use crate::observable::{EqualityFn, Observable, Observer, Subscription};
use crate::queue::Queue;
use crate::read_write_queue::ReadWriteQueue;

/// Options for [`Store::subscribe`].
pub struct SubscribeOptions<S> {
    queue: Option<Queue>,
    include_current_state: bool,
    skip_repeats: Option<EqualityFn<S>>,
}

impl<S> SubscribeOptions<S> {
    /// Defaults: no delivery queue, include the current state, deliver
    /// every update.
    pub fn new() -> Self {
        Self {
            queue: None,
            include_current_state: true,
            skip_repeats: None,
        }
    }

    /// Deliver updates on `queue` instead of the channel's fallback
    /// context.
    pub fn on(mut self, queue: Queue) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Whether the current state is delivered synchronously at subscribe
    /// time, ahead of any later update.
    pub fn include_current_state(mut self, include: bool) -> Self {
        self.include_current_state = include;
        self
    }

    /// Suppress updates equal to the last value delivered to this
    /// subscription.
    pub fn skip_repeats(self) -> Self
    where
        S: PartialEq,
    {
        self.skip_repeats_by(|a: &S, b: &S| a == b)
    }

    /// Skip repeats under a caller-supplied equality.
    pub fn skip_repeats_by<F>(mut self, eq: F) -> Self
    where
        F: Fn(&S, &S) -> bool + Send + Sync + 'static,
    {
        self.skip_repeats = Some(Arc::new(eq));
        self
    }
}

impl<S> Default for SubscribeOptions<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Unidirectional state container.
///
/// Cheap to share behind an `Arc`; all operations take `&self` and are
/// safe to call concurrently from any thread.
pub struct Store<S, A> {
    cell: Arc<ReadWriteQueue<S>>,
    observable: Observable<S>,
    observer: Observer<S>,
    chain: Arc<OnceLock<ActionHandler<A>>>,
}

impl<S, A> Store<S, A>
where
    S: Clone + Send + Sync + 'static,
    A: Send + 'static,
{
    /// Build a store from an initial state, a reducer, and an ordered
    /// middleware chain.
    pub fn new(
        state: S,
        reducer: impl Fn(&mut S, &A) + Send + Sync + 'static,
        middleware: Vec<Middleware<S, A>>,
    ) -> Self {
        Self::with_id("uniflow.store", state, reducer, middleware)
    }

    /// Like [`Store::new`]; `id` labels the internal write queue thread,
    /// which helps tell stores apart when several coexist in one process.
    pub fn with_id(
        id: &str,
        state: S,
        reducer: impl Fn(&mut S, &A) + Send + Sync + 'static,
        middleware: Vec<Middleware<S, A>>,
    ) -> Self {
        let cell = Arc::new(ReadWriteQueue::new(&format!("{id}.queue"), state));
        let (observable, observer) = Observable::pipe();
        let chain: Arc<OnceLock<ActionHandler<A>>> = Arc::new(OnceLock::new());

        let get_state: GetState<S> = {
            let cell = cell.clone();
            Arc::new(move || cell.read(S::clone))
        };

        // Holds the chain weakly so middleware and subscriber closures
        // cannot keep a dropped store's pipeline alive.
        let dispatch: DispatchFn<A> = {
            let chain = Arc::downgrade(&chain);
            Arc::new(move |action| {
                if let Some(chain) = Weak::upgrade(&chain) {
                    if let Some(handler) = chain.get() {
                        handler(action);
                    }
                }
            })
        };

        let terminal: ActionHandler<A> = {
            let cell = cell.clone();
            let observer = observer.clone();
            let reducer = Arc::new(reducer);
            Box::new(move |action: A| {
                let reducer = reducer.clone();
                let observer = observer.clone();
                cell.write(
                    move |state| reducer(state, &action),
                    move |state| observer.update(state),
                );
            })
        };

        let handler = apply_middleware(middleware, get_state, dispatch, terminal);
        let _ = chain.set(handler);

        Self {
            cell,
            observable,
            observer,
            chain,
        }
    }

    /// Fire-and-forget dispatch: the action enters the serialized write
    /// path in submission order, and this call may return before the write
    /// lands.
    pub fn dispatch(&self, action: A) {
        if let Some(handler) = self.chain.get() {
            handler(action);
        }
    }

    /// Dispatch, then block until the action's middleware chain, reducer
    /// application, and inline subscriber deliveries have completed.
    ///
    /// The wait is a barrier behind the serialized write path. Middleware
    /// that defers `next` to another thread, or never calls it, is not
    /// waited for beyond the writes already queued; the call completes
    /// rather than blocking indefinitely. Re-entered from a reducer or an
    /// inline subscriber already running on the write queue, the barrier
    /// executes directly instead of deadlocking behind itself.
    pub fn dispatch_and_wait(&self, action: A) {
        self.dispatch(action);
        self.cell.flush();
    }

    /// Snapshot of the latest fully-committed state.
    pub fn get_state(&self) -> S {
        self.cell.read(S::clone)
    }

    /// Register an observer for state updates.
    ///
    /// With `include_current_state` (the default) the current snapshot is
    /// delivered synchronously, before this call returns and ahead of any
    /// subsequently dispatched update.
    pub fn subscribe<F>(&self, options: SubscribeOptions<S>, observer: F) -> Disposable
    where
        F: Fn(S) + Send + Sync + 'static,
    {
        let subscription = Subscription::new(options.queue, options.skip_repeats, Box::new(observer));
        if options.include_current_state {
            subscription.deliver(self.get_state());
        }
        self.observable.register(subscription)
    }

    /// The raw update channel, for composing pipelines outside the store.
    pub fn observe(&self) -> Observable<S> {
        self.observable.clone()
    }
}

impl<S, A> Drop for Store<S, A> {
    /// Tear down every outstanding subscription so their disposables
    /// report disposed and no observer callback runs after the store is
    /// gone.
    fn drop(&mut self) {
        self.observer.dispose_all();
    }
}
