use std::sync::Arc;

use infergate_core::ServiceError;
use parking_lot::RwLock;

enum State<E> {
    Ready(Arc<E>),
    Stopped,
}

/// Owns the engine until it is released; `Ready` -> `Stopped` only.
///
/// Calls hold their own `Arc` for the duration of a dispatch, so releasing the
/// engine never pulls it out from under an in-flight call, and nothing can
/// acquire it afterwards.
pub struct Lifecycle<E> {
    state: RwLock<State<E>>,
}

impl<E> Lifecycle<E> {
    pub fn ready(engine: E) -> Self {
        Self {
            state: RwLock::new(State::Ready(Arc::new(engine))),
        }
    }

    pub fn acquire(&self) -> Result<Arc<E>, ServiceError> {
        match &*self.state.read() {
            State::Ready(engine) => Ok(Arc::clone(engine)),
            State::Stopped => Err(ServiceError::Stopped),
        }
    }

    /// Returns `true` if this call performed the transition.
    pub fn stop(&self) -> bool {
        let previous = std::mem::replace(&mut *self.state.write(), State::Stopped);
        // dropped outside the lock
        matches!(previous, State::Ready(_))
    }

    pub fn is_stopped(&self) -> bool {
        matches!(*self.state.read(), State::Stopped)
    }
}
