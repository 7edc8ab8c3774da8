//! Event trait for named state transitions.
//!
//! An event is an immutable record describing an intended state transition.
//! Applications model their events as a single enum: each variant is one event
//! and its fields are the arguments. The registry in the runtime resolves a
//! handler by [`Event::name`], so two variants must never share a name.
//!
//! Most applications derive the trait with `#[derive(Event)]` from
//! `refract-macros`, which names each variant in kebab-case.
//!
//! # Example
//!
//! ```
//! use refract_core::event::Event;
//!
//! #[derive(Clone, Debug)]
//! enum CounterEvent {
//!     Increment,
//!     Add { amount: i64 },
//! }
//!
//! impl Event for CounterEvent {
//!     fn name(&self) -> &'static str {
//!         match self {
//!             Self::Increment => "increment",
//!             Self::Add { .. } => "add",
//!         }
//!     }
//! }
//!
//! assert_eq!(CounterEvent::Add { amount: 2 }.name(), "add");
//! ```

use std::fmt;

/// A named request to transform application state.
///
/// Events are moved into a dispatch and consumed exactly once; they are never
/// mutated after creation.
pub trait Event: fmt::Debug + Send + Sync + 'static {
    /// The symbol this event is registered under.
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    enum TestEvent {
        Ping,
        Echo(String),
    }

    impl Event for TestEvent {
        fn name(&self) -> &'static str {
            match self {
                Self::Ping => "ping",
                Self::Echo(_) => "echo",
            }
        }
    }

    #[test]
    fn test_event_names() {
        assert_eq!(TestEvent::Ping.name(), "ping");
        assert_eq!(TestEvent::Echo("hi".to_string()).name(), "echo");
    }
}
