//! Environment traits for dependency injection.
//!
//! External inputs a handler needs (the time, a fresh identifier) are never
//! read directly from the system. They are provided through these traits and
//! injected into the context as coeffects, which keeps handlers pure and
//! tests deterministic.

use chrono::{DateTime, Utc};
use std::sync::Mutex;
use uuid::{ContextV7, Timestamp, Uuid};

/// Clock trait - abstracts time operations for testability
///
/// # Examples
///
/// ```
/// use refract_core::environment::{Clock, SystemClock};
///
/// let now = SystemClock.now();
/// assert!(now.timestamp() > 0);
/// ```
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Source of fresh unique identifiers
pub trait IdGenerator: Send + Sync {
    /// Produce an identifier greater than every one produced before it
    fn next_uuid(&self) -> Uuid;
}

/// Time-ordered UUIDv7 generator with a strict in-process ordering guarantee
///
/// Ids compare in creation order even when the clock stalls or steps back.
/// The ordering comes from the counter that [`ContextV7`] keeps in the random
/// bits, so the version and variant bits are never touched.
pub struct MonotonicUuidV7<C> {
    clock: C,
    context: Mutex<ContextV7>,
}

impl<C: Clock> MonotonicUuidV7<C> {
    /// Create a generator reading time from `clock`
    #[must_use]
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            context: Mutex::new(ContextV7::new()),
        }
    }
}

impl Default for MonotonicUuidV7<SystemClock> {
    fn default() -> Self {
        Self::new(SystemClock)
    }
}

impl<C: Clock> IdGenerator for MonotonicUuidV7<C> {
    fn next_uuid(&self) -> Uuid {
        let now = self.clock.now();
        let seconds = u64::try_from(now.timestamp()).unwrap_or(0);

        let context = self
            .context
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Uuid::new_v7(Timestamp::from_unix(
            &*context,
            seconds,
            now.timestamp_subsec_nanos(),
        ))
    }
}

impl<C> std::fmt::Debug for MonotonicUuidV7<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonotonicUuidV7").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StoppedClock(DateTime<Utc>);

    impl Clock for StoppedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    #[test]
    fn test_ids_strictly_increase_under_stopped_clock() {
        let generator = MonotonicUuidV7::new(StoppedClock(Utc::now()));

        let ids: Vec<Uuid> = (0..100).map(|_| generator.next_uuid()).collect();

        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(
            ids.windows(2)
                .all(|pair| pair[0].hyphenated().to_string() < pair[1].hyphenated().to_string())
        );
    }

    #[test]
    fn test_ids_keep_order_when_clock_steps_back() {
        let now = Utc::now();
        let ahead = MonotonicUuidV7::new(StoppedClock(now));
        let first = ahead.next_uuid();

        let behind = MonotonicUuidV7 {
            clock: StoppedClock(now - chrono::Duration::seconds(5)),
            context: ahead.context,
        };
        let ids: Vec<Uuid> = (0..50).map(|_| behind.next_uuid()).collect();

        assert!(ids.iter().all(|id| *id > first));
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(ids.iter().all(|id| id.get_version_num() == 7));
        assert!(ids.iter().all(|id| id.get_variant() == uuid::Variant::RFC4122));
    }

    #[test]
    fn test_ids_are_version_7() {
        let generator = MonotonicUuidV7::default();
        assert_eq!(generator.next_uuid().get_version_num(), 7);
    }
}
