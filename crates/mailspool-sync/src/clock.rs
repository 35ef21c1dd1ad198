//! Time source abstraction.
//!
//! Session aging and re-select gating compare instants the pool
//! recorded earlier against "now". Routing every reading through a
//! [`Clock`] lets tests drive those comparisons deterministically
//! instead of sleeping.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use mailspool_sync::clock::{Clock, MockClock};
//!
//! let clock = MockClock::new();
//! let start = clock.now();
//! clock.advance(Duration::from_secs(300));
//! assert!(clock.has_elapsed(start, Duration::from_secs(60)));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Source of monotonic time.
///
/// Production code uses [`SystemClock`]; tests use [`MockClock`] and
/// advance it by hand.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: Instant) -> Duration {
        self.now().duration_since(since)
    }

    /// Whether at least `duration` has passed since `since`.
    fn has_elapsed(&self, since: Instant, duration: Duration) -> bool {
        self.elapsed(since) >= duration
    }
}

/// Real time via `std::time::Instant`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for tests.
///
/// Starts at a base instant and only moves when [`advance`] is
/// called, so "ten minutes idle" is a one-liner rather than a sleep.
///
/// [`advance`]: MockClock::advance
#[derive(Debug)]
pub struct MockClock {
    base: Instant,
    offset_nanos: AtomicU64,
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MockClock {
    /// Creates a clock frozen at the current time.
    #[must_use]
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset_nanos: AtomicU64::new(0),
        }
    }

    /// Creates a clock that can be handed out and advanced from
    /// several places.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Moves the clock forward by `duration`.
    ///
    /// Durations past ~584 years truncate, which a test clock can
    /// live with.
    #[allow(clippy::cast_possible_truncation)]
    pub fn advance(&self, duration: Duration) {
        let nanos = duration.as_nanos() as u64;
        self.offset_nanos.fetch_add(nanos, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.base + Duration::from_nanos(self.offset_nanos.load(Ordering::SeqCst))
    }
}

impl Clock for Arc<MockClock> {
    fn now(&self) -> Instant {
        self.as_ref().now()
    }
}

/// A boxed clock for dynamic dispatch.
pub type BoxClock = Box<dyn Clock>;

impl Clock for BoxClock {
    fn now(&self) -> Instant {
        self.as_ref().now()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock;
        let before = Instant::now();
        let reading = clock.now();
        assert!(reading >= before);
        assert!(reading <= Instant::now());
    }

    #[test]
    fn test_mock_clock_advances_on_demand() {
        let clock = MockClock::new();
        let start = clock.now();

        assert_eq!(clock.elapsed(start), Duration::ZERO);

        clock.advance(Duration::from_secs(10));
        assert_eq!(clock.elapsed(start), Duration::from_secs(10));

        clock.advance(Duration::from_secs(5));
        assert_eq!(clock.elapsed(start), Duration::from_secs(15));
    }

    #[test]
    fn test_has_elapsed_is_inclusive() {
        let clock = MockClock::new();
        let start = clock.now();

        assert!(!clock.has_elapsed(start, Duration::from_secs(5)));

        clock.advance(Duration::from_secs(5));
        assert!(clock.has_elapsed(start, Duration::from_secs(5)));
        assert!(!clock.has_elapsed(start, Duration::from_secs(6)));
    }

    #[test]
    fn test_shared_clock_sees_every_advance() {
        let clock = MockClock::shared();
        let handle = Arc::clone(&clock);

        let start = clock.now();
        handle.advance(Duration::from_secs(10));

        assert_eq!(clock.elapsed(start), Duration::from_secs(10));
    }

    #[test]
    fn test_boxed_clock_delegates() {
        let clock = MockClock::shared();
        let boxed: BoxClock = Box::new(Arc::clone(&clock));

        let start = boxed.now();
        clock.advance(Duration::from_secs(3));
        assert_eq!(boxed.elapsed(start), Duration::from_secs(3));
    }
}
