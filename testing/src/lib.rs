//! # Refract Testing
//!
//! Testing utilities and helpers for the Refract event pipeline.
//!
//! This crate provides:
//! - Mock implementations of Environment traits
//! - A recording key-value store that can be told to fail
//! - A Given-When-Then harness for registered event handlers
//! - Tracing setup for tests
//!
//! ## Example
//!
//! ```
//! use refract_core::Event;
//! use refract_runtime::Dispatcher;
//! use refract_testing::EventTest;
//!
//! #[derive(Debug)]
//! struct Double;
//!
//! impl Event for Double {
//!     fn name(&self) -> &'static str {
//!         "double"
//!     }
//! }
//!
//! EventTest::new(|dispatcher: &Dispatcher<u64, Double>| {
//!     dispatcher.reg_event_db("double", Vec::new(), |n: &u64, _: &Double| n * 2);
//! })
//! .given_state(21_u64)
//! .when_event(Double)
//! .then_state(|n| assert_eq!(*n, 42))
//! .run();
//! ```

use chrono::{DateTime, Utc};
use refract_core::environment::{Clock, IdGenerator};
use refract_runtime::{KeyValueStore, StorageError};


pub use event_test::EventTest;

/// Mock implementations for testing.
pub mod mocks {
    use super::{Clock, DateTime, IdGenerator, KeyValueStore, StorageError, Utc};
    use chrono::Duration;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex, PoisonError};
    use uuid::Uuid;

    /// A clock that only moves when a test moves it
    ///
    /// Clones share the same time, so a test can keep one handle and give
    /// another to the code under test (an id generator, say), then step time
    /// forwards or backwards between events.
    ///
    /// # Example
    ///
    /// ```
    /// use chrono::Duration;
    /// use refract_core::environment::Clock;
    /// use refract_testing::frozen_clock;
    ///
    /// let clock = frozen_clock();
    /// let shared = clock.clone();
    /// let start = shared.now();
    ///
    /// clock.advance(Duration::milliseconds(250));
    /// assert_eq!(shared.now() - start, Duration::milliseconds(250));
    /// ```
    #[derive(Debug, Clone)]
    pub struct FrozenClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl FrozenClock {
        /// Freeze time at `time`
        #[must_use]
        pub fn at(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Jump to `time`, which may be earlier than now
        pub fn set(&self, time: DateTime<Utc>) {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner) = time;
        }

        /// Move time by `delta`; a negative delta steps back
        pub fn advance(&self, delta: Duration) {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += delta;
        }
    }

    impl Clock for FrozenClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// A [`FrozenClock`] stopped at 2024-06-01 00:00:00 UTC
    #[must_use]
    pub fn frozen_clock() -> FrozenClock {
        FrozenClock::at(DateTime::from_timestamp(1_717_200_000, 0).unwrap_or_default())
    }

    /// Predictable ids: `...0001`, `...0002`, and so on
    ///
    /// # Example
    ///
    /// ```
    /// use refract_core::environment::IdGenerator;
    /// use refract_testing::mocks::SequentialIds;
    ///
    /// let ids = SequentialIds::new();
    /// assert_eq!(ids.next_uuid().to_string(), "00000000-0000-0000-0000-000000000001");
    ///
    /// let second = ids.next_uuid();
    /// assert_eq!(ids.peek_last(), second);
    /// ```
    #[derive(Debug, Default)]
    pub struct SequentialIds {
        last: Mutex<u128>,
    }

    impl SequentialIds {
        /// Start counting from 1
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Start counting from `first`
        #[must_use]
        pub const fn starting_at(first: u128) -> Self {
            Self {
                last: Mutex::new(first.saturating_sub(1)),
            }
        }

        /// The most recently issued id (nil before the first)
        #[must_use]
        pub fn peek_last(&self) -> Uuid {
            Uuid::from_u128(*self.last.lock().unwrap_or_else(PoisonError::into_inner))
        }
    }

    impl IdGenerator for SequentialIds {
        fn next_uuid(&self) -> Uuid {
            let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
            *last += 1;
            Uuid::from_u128(*last)
        }
    }

    /// In-memory store that records every save and can simulate failures
    #[derive(Debug, Default)]
    pub struct RecordingStore {
        entries: Mutex<HashMap<String, String>>,
        saves: Mutex<Vec<(String, String)>>,
        fail_saves: AtomicBool,
    }

    impl RecordingStore {
        /// Create an empty store
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Make subsequent saves fail (or succeed again)
        pub fn fail_saves(&self, fail: bool) {
            self.fail_saves.store(fail, Ordering::SeqCst);
        }

        /// Every successful save so far, oldest first
        #[must_use]
        pub fn saves(&self) -> Vec<(String, String)> {
            self.saves
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// Value currently stored under `key`
        #[must_use]
        pub fn get(&self, key: &str) -> Option<String> {
            self.entries
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(key)
                .cloned()
        }

        /// Seed a value without recording a save
        pub fn seed(&self, key: impl Into<String>, value: impl Into<String>) {
            self.entries
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(key.into(), value.into());
        }
    }

    impl KeyValueStore for RecordingStore {
        fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
            Ok(self.get(key))
        }

        fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(StorageError::Io(std::io::Error::other("simulated write failure")));
            }
            self.seed(key, value);
            self.saves
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((key.to_string(), value.to_string()));
            Ok(())
        }
    }
}

/// Test helpers and utilities.
pub mod helpers {
    use tracing_subscriber::EnvFilter;

    /// Route `tracing` output through the test harness's captured stdout
    ///
    /// Honours `RUST_LOG`, defaulting to `debug` for the refract crates. Safe
    /// to call from every test; only the first call installs a subscriber.
    pub fn init_test_tracing() {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "refract_core=debug,refract_runtime=debug".into());
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    }
}

// Re-export commonly used items
pub use helpers::init_test_tracing;
pub use mocks::{FrozenClock, RecordingStore, SequentialIds, frozen_clock};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use refract_core::environment::MonotonicUuidV7;
    use uuid::Uuid;

    #[test]
    fn test_frozen_clock_moves_only_when_told() {
        let clock = frozen_clock();
        let handle = clock.clone();
        let start = clock.now();
        assert_eq!(clock.now(), start);

        handle.advance(Duration::seconds(-3));
        assert_eq!(clock.now(), start - Duration::seconds(3));

        handle.set(start);
        assert_eq!(clock.now(), start);
    }

    #[test]
    fn test_uuid_v7_order_survives_a_frozen_then_rewound_clock() {
        let clock = frozen_clock();
        let generator = MonotonicUuidV7::new(clock.clone());

        let mut ids: Vec<Uuid> = (0..20).map(|_| generator.next_uuid()).collect();
        clock.advance(Duration::minutes(-10));
        ids.extend((0..20).map(|_| generator.next_uuid()));
        clock.advance(Duration::hours(1));
        ids.extend((0..20).map(|_| generator.next_uuid()));

        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(ids.iter().all(|id| id.get_version_num() == 7));
    }

    #[test]
    fn test_sequential_ids_increase() {
        let ids = SequentialIds::starting_at(10);
        let first = ids.next_uuid();
        let second = ids.next_uuid();

        assert_eq!(first.as_u128(), 10);
        assert!(first < second);
        assert!(first.to_string() < second.to_string());
    }

    #[test]
    fn test_recording_store_failure_toggle() {
        let store = RecordingStore::new();
        assert!(store.save("k", "1").is_ok());

        store.fail_saves(true);
        assert!(store.save("k", "2").is_err());
        store.fail_saves(false);

        assert_eq!(store.get("k").as_deref(), Some("1"));
        assert_eq!(store.saves(), vec![("k".to_string(), "1".to_string())]);
    }
}
