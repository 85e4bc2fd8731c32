//! Middleware composition around the dispatch path.
//!
//! Middleware sits between action dispatch and reducer execution, allowing
//! side effects, follow-up dispatches, logging, and other cross-cutting
//! concerns to be handled in a composable way:
//!
//! ```text
//! Action → Middleware Chain → Reducer → State → Subscribers
//! ```
//!
//! A middleware is a factory: it receives `get_state`, `dispatch`, and the
//! `next` handler once, at store construction, and returns the per-action
//! handler. State a middleware keeps across dispatches (counters, buffered
//! queues) lives in that handler's captures. The factory ordering is the
//! supplied ordering: the first middleware sees each action first and
//! decides whether and when to call `next`.

use std::fmt::Debug;
use std::sync::Arc;

/// Reads the store's current state snapshot.
pub type GetState<S> = Arc<dyn Fn() -> S + Send + Sync>;

/// Re-enters the store's full dispatch path from the top of the chain.
pub type DispatchFn<A> = Arc<dyn Fn(A) + Send + Sync>;

/// Per-action handler produced by a middleware factory.
pub type ActionHandler<A> = Box<dyn Fn(A) + Send + Sync>;

type Factory<S, A> =
    Box<dyn FnOnce(GetState<S>, DispatchFn<A>, ActionHandler<A>) -> ActionHandler<A> + Send>;

/// One link of the dispatch chain.
///
/// Built with [`create_middleware`] or [`create_fall_through_middleware`];
/// consumed when the owning store composes its chain.
pub struct Middleware<S, A> {
    factory: Factory<S, A>,
}

/// Chaining middleware: the returned handler must call `next(action)` for
/// the action to continue toward the reducer.
pub fn create_middleware<S, A, F>(factory: F) -> Middleware<S, A>
where
    F: FnOnce(GetState<S>, DispatchFn<A>, ActionHandler<A>) -> ActionHandler<A> + Send + 'static,
{
    Middleware {
        factory: Box::new(factory),
    }
}

/// Fall-through middleware: a chain leaf that never receives `next`, so
/// actions stop here after its side effect runs. Follow-up actions can
/// still be injected through `dispatch`.
pub fn create_fall_through_middleware<S, A, F>(factory: F) -> Middleware<S, A>
where
    F: FnOnce(GetState<S>, DispatchFn<A>) -> ActionHandler<A> + Send + 'static,
{
    Middleware {
        factory: Box::new(move |get_state, dispatch, _next| factory(get_state, dispatch)),
    }
}

/// Fold the chain right-to-left around `terminal`. Every factory runs
/// exactly once, here; only the returned handlers run per action.
pub(crate) fn apply_middleware<S, A>(
    chain: Vec<Middleware<S, A>>,
    get_state: GetState<S>,
    dispatch: DispatchFn<A>,
    terminal: ActionHandler<A>,
) -> ActionHandler<A> {
    chain.into_iter().rev().fold(terminal, |next, middleware| {
        (middleware.factory)(get_state.clone(), dispatch.clone(), next)
    })
}

/// Stock middleware that logs every action at debug level, then continues
/// the chain.
pub fn logging_middleware<S, A>() -> Middleware<S, A>
where
    A: Debug + 'static,
{
    create_middleware(|_get_state, _dispatch, next| {
        Box::new(move |action: A| {
            log::debug!("action: {action:?}");
            next(action);
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn tracing_middleware(
        tag: &'static str,
        factory_count: Arc<AtomicUsize>,
        trace: Arc<Mutex<Vec<String>>>,
    ) -> Middleware<i32, i32> {
        create_middleware(move |_get_state, _dispatch, next| {
            factory_count.fetch_add(1, Ordering::SeqCst);
            Box::new(move |action: i32| {
                trace.lock().unwrap().push(format!("{tag}-{action}"));
                next(action);
            })
        })
    }

    #[test]
    fn test_chain_runs_in_supplied_order_and_factories_run_once() {
        let factory_count = Arc::new(AtomicUsize::new(0));
        let trace = Arc::new(Mutex::new(Vec::new()));

        let first = tracing_middleware("first", factory_count.clone(), trace.clone());
        let second = tracing_middleware("second", factory_count.clone(), trace.clone());
        let terminal_trace = trace.clone();
        let terminal: ActionHandler<i32> = Box::new(move |action| {
            terminal_trace.lock().unwrap().push(format!("terminal-{action}"));
        });

        let get_state: GetState<i32> = Arc::new(|| 0);
        let dispatch: DispatchFn<i32> = Arc::new(|_| {});
        let handler = apply_middleware(vec![first, second], get_state, dispatch, terminal);

        handler(1);
        handler(2);

        assert_eq!(factory_count.load(Ordering::SeqCst), 2);
        assert_eq!(
            *trace.lock().unwrap(),
            vec![
                "first-1",
                "second-1",
                "terminal-1",
                "first-2",
                "second-2",
                "terminal-2"
            ]
        );
    }

    #[test]
    fn test_fall_through_middleware_never_reaches_terminal() {
        let trace = Arc::new(Mutex::new(Vec::new()));

        let leaf_trace = trace.clone();
        let leaf = create_fall_through_middleware(move |_get_state, _dispatch| {
            Box::new(move |action: i32| {
                leaf_trace.lock().unwrap().push(format!("leaf-{action}"));
            })
        });
        let terminal_trace = trace.clone();
        let terminal: ActionHandler<i32> = Box::new(move |action| {
            terminal_trace.lock().unwrap().push(format!("terminal-{action}"));
        });

        let get_state: GetState<i32> = Arc::new(|| 0);
        let dispatch: DispatchFn<i32> = Arc::new(|_| {});
        let handler = apply_middleware(vec![leaf], get_state, dispatch, terminal);

        handler(5);

        assert_eq!(*trace.lock().unwrap(), vec!["leaf-5"]);
    }
}
