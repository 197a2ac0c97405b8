/// Cooperative stop signal shared between the session and its controller.
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

/// Set once by a controller (signal handler, UI, test), observed by the
/// session at its check points. Pauses taken through [`StopSignal::sleep`]
/// end early when the signal is raised.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        let (lock, condvar) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner) = true;
        condvar.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for `duration` or until stopped. Returns `true` if stopped.
    pub fn sleep(&self, duration: Duration) -> bool {
        let (lock, condvar) = &*self.inner;
        let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = condvar
            .wait_timeout_while(guard, duration, |stopped| !*stopped)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}
