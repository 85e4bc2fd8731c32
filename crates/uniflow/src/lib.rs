#![forbid(unsafe_code)]

//! Single-process, in-memory state container with a unidirectional update
//! protocol.
//!
//! Callers submit immutable actions, a pure reducer computes the next
//! state, and subscribers are notified of every committed transition:
//!
//! ```text
//! dispatch(action) → middleware chain → reducer (serialized write path)
//!                  → observer → subscribers, each on its own queue
//! ```
//!
//! Many threads may read state, dispatch, subscribe, and dispose
//! concurrently. Writes are serialized FIFO through an internal queue;
//! reads share a lock and never see a half-applied transition.
//!
//! # Example
//!
//! ```
//! use uniflow::{Store, SubscribeOptions};
//!
//! #[derive(Clone, Copy, Debug)]
//! enum CounterAction {
//!     Increment,
//!     Add(i32),
//! }
//!
//! let store = Store::new(
//!     0,
//!     |state: &mut i32, action: &CounterAction| match action {
//!         CounterAction::Increment => *state += 1,
//!         CounterAction::Add(n) => *state += n,
//!     },
//!     Vec::new(),
//! );
//!
//! let _subscription = store.subscribe(SubscribeOptions::new(), |state| {
//!     println!("state is now {state}");
//! });
//!
//! store.dispatch_and_wait(CounterAction::Add(41));
//! store.dispatch_and_wait(CounterAction::Increment);
//! assert_eq!(store.get_state(), 42);
//! ```

mod disposable;
mod middleware;
mod observable;
mod queue;
mod read_write_queue;
mod store;

pub use disposable::{CompositeDisposable, Disposable};
pub use middleware::{
    ActionHandler, DispatchFn, GetState, Middleware, create_fall_through_middleware,
    create_middleware, logging_middleware,
};
pub use observable::{EqualityFn, Observable, Observer};
pub use queue::Queue;
pub use store::{Store, SubscribeOptions};
