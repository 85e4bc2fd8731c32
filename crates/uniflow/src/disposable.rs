//! Cancellation handles for subscriptions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

type DisposeAction = Box<dyn FnOnce() + Send>;

/// Idempotent cancellation handle for a subscription.
///
/// The disposed flag is shared with the subscription registry, so a handle
/// also reports disposed after its store force-disposed everything on drop.
/// `dispose` is safe to call repeatedly and from any thread; only the first
/// call anywhere runs the teardown.
#[derive(Clone)]
pub struct Disposable {
    disposed: Arc<AtomicBool>,
    action: Arc<Mutex<Option<DisposeAction>>>,
}

impl Disposable {
    pub(crate) fn new(disposed: Arc<AtomicBool>, action: DisposeAction) -> Self {
        Self {
            disposed,
            action: Arc::new(Mutex::new(Some(action))),
        }
    }

    /// A handle with no teardown work.
    pub fn nop() -> Self {
        Self {
            disposed: Arc::new(AtomicBool::new(false)),
            action: Arc::new(Mutex::new(None)),
        }
    }

    /// True once this handle, or the registry owning its subscription, has
    /// been disposed.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Cancel the subscription. No-op on every call after the first.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let action = self
            .action
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(action) = action {
            action();
        }
    }
}

/// Collects disposables so a whole group can be cancelled at once.
///
/// Adding to an already-disposed composite disposes the newcomer
/// immediately instead of holding it.
#[derive(Default)]
pub struct CompositeDisposable {
    state: Mutex<CompositeState>,
}

#[derive(Default)]
struct CompositeState {
    disposed: bool,
    children: Vec<Disposable>,
}

impl CompositeDisposable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_disposed(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .disposed
    }

    pub fn add(&self, disposable: Disposable) {
        let already_disposed = {
            let mut state = self
                .state
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if !state.disposed {
                state.children.push(disposable.clone());
            }
            state.disposed
        };
        if already_disposed {
            disposable.dispose();
        }
    }

    /// Dispose every collected handle. Idempotent.
    pub fn dispose(&self) {
        let children = {
            let mut state = self
                .state
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            state.disposed = true;
            std::mem::take(&mut state.children)
        };
        for child in children {
            child.dispose();
        }
    }
}
