//! Dispatch error types.
//!
//! Every failure inside a dispatch is synchronous and halts only that
//! dispatch. The state container is never written when any of these is
//! returned.

use crate::schema::ValidationReport;
use thiserror::Error;

/// Errors that can abort a dispatch
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DispatchError {
    /// No handler is registered under the event's name
    #[error("No such event: {name}")]
    UnknownEvent {
        /// Name of the event that was dispatched
        name: String,
    },

    /// The state produced by the handler failed structural validation
    ///
    /// The report lists every violated field, not just the first.
    #[error("{0}")]
    Validation(ValidationReport),

    /// A coeffect required by a hook or handler was never injected
    #[error("Missing coeffect: {key}")]
    MissingCoeffect {
        /// Coeffect key
        key: String,
    },

    /// An interceptor expected an effect that no earlier stage produced
    #[error("Missing effect: {key}")]
    MissingEffect {
        /// Effect key
        key: String,
    },

    /// A context slot holds a value of a different type than requested
    #[error("Context slot '{key}' does not hold a {expected}")]
    ContextType {
        /// Slot key
        key: String,
        /// Requested type name
        expected: &'static str,
    },

    /// A handler or hook reported a failure of its own
    #[error("Handler failed: {0}")]
    Handler(String),

    /// The asynchronous event queue is no longer running
    #[error("Event queue is closed")]
    QueueClosed,

    /// The asynchronous event queue is at capacity
    #[error("Event queue is full")]
    QueueFull,
}

impl DispatchError {
    /// Create a handler failure from any displayable error
    #[must_use]
    pub fn handler(message: impl std::fmt::Display) -> Self {
        Self::Handler(message.to_string())
    }

    /// Returns true if this error came from the validation gate
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
