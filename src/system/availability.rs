use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Tracks whether an external tool is usable, re-allowing attempts after a backoff.
#[derive(Debug)]
pub struct RetryableAvailability {
    state: Mutex<AvailabilityState>,
    backoff: Duration,
}

#[derive(Debug, Clone, Copy)]
enum AvailabilityState {
    Available,
    Disabled,
    RetryAt(Instant),
}

impl RetryableAvailability {
    pub fn new(initially_available: bool, backoff: Duration) -> Self {
        let state = if initially_available {
            AvailabilityState::Available
        } else {
            AvailabilityState::RetryAt(Instant::now() + backoff)
        };
        Self {
            state: Mutex::new(state),
            backoff,
        }
    }

    pub fn current(&self) -> bool {
        matches!(*self.lock(), AvailabilityState::Available)
    }

    /// Returns `(may_attempt, became_available)`.
    pub fn try_acquire(&self) -> (bool, bool) {
        self.try_acquire_at(Instant::now())
    }

    fn try_acquire_at(&self, now: Instant) -> (bool, bool) {
        let mut state = self.lock();
        match *state {
            AvailabilityState::Available => (true, false),
            AvailabilityState::Disabled => (false, false),
            AvailabilityState::RetryAt(at) if now >= at => {
                *state = AvailabilityState::Available;
                (true, true)
            }
            AvailabilityState::RetryAt(_) => (false, false),
        }
    }

    /// Returns `true` if this call changed the state.
    pub fn mark_available(&self) -> bool {
        let mut state = self.lock();
        let changed = !matches!(*state, AvailabilityState::Available);
        *state = AvailabilityState::Available;
        changed
    }

    /// Returns `true` if the tool was considered available before this call.
    pub fn mark_unavailable(&self) -> bool {
        let mut state = self.lock();
        let was_available = matches!(*state, AvailabilityState::Available);
        *state = if self.backoff.is_zero() {
            AvailabilityState::Disabled
        } else {
            AvailabilityState::RetryAt(Instant::now() + self.backoff)
        };
        was_available
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AvailabilityState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
