//! Target process liveness
//!
//! [`TargetWatch`] holds whether the process being captured is running, plus a
//! host exit request. It is cloned into whatever observes the process (a
//! poller thread, a signal handler) and read by the tick loop.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct WatchState {
    running: bool,
    exit_requested: bool,
}

/// Shared liveness flag with a bounded wait.
#[derive(Debug, Clone, Default)]
pub struct TargetWatch {
    inner: Arc<(Mutex<WatchState>, Condvar)>,
}

impl TargetWatch {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, WatchState> {
        // State is two bools; a panic while holding the lock cannot leave it torn
        self.inner.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record whether the target is running and wake any waiter.
    pub fn set_running(&self, running: bool) {
        let mut state = self.state();
        if state.running != running {
            tracing::info!(
                "Target process {}",
                if running { "started" } else { "stopped" }
            );
        }
        state.running = running;
        self.inner.1.notify_all();
    }

    pub fn is_running(&self) -> bool {
        self.state().running
    }

    /// Ask the host loop to stop and wake any waiter.
    pub fn request_exit(&self) {
        self.state().exit_requested = true;
        self.inner.1.notify_all();
    }

    pub fn exit_requested(&self) -> bool {
        self.state().exit_requested
    }

    /// Block until the target runs, exit is requested, or `timeout` elapses.
    ///
    /// Returns whether the target is running on return.
    pub fn wait_until_running(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state();

        while !state.running && !state.exit_requested {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            state = match self.inner.1.wait_timeout(state, remaining) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }

        state.running
    }
}
