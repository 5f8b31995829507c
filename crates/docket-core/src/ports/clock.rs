//! Clock port - time abstraction.
//!
//! Every lease expiry check reads `now()` when the atomic call is built, so
//! tests drive expiry deterministically with `FixedClock`.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

/// Clock supplies the current time.
///
/// # Testability
/// - injected everywhere time matters (leases, heartbeats, cron, ids)
/// - tests use `FixedClock` and move time with `advance`
///
/// # Thread Safety
/// - `Send + Sync`: shared behind `Arc<dyn Clock>`
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for tests. Clones share the same time.
///
/// # Example
/// ```ignore
/// let clock = FixedClock::new(noon);
/// let seen_by_queue = clock.clone();
/// clock.advance(Duration::seconds(31));
/// assert_eq!(seen_by_queue.now(), noon + Duration::seconds(31));
/// ```
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn fixed_clock_advances_for_every_clone() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let clock = FixedClock::new(start);
        let shared = clock.clone();

        clock.advance(Duration::seconds(31));
        assert_eq!(shared.now(), start + Duration::seconds(31));

        shared.set(start);
        assert_eq!(clock.now(), start);
    }
}
