//! # Refract Core
//!
//! Core types for the Refract event pipeline.
//!
//! This crate provides the vocabulary shared by every part of a Refract
//! application. It performs no I/O and spawns nothing; the runtime crate
//! owns state, dispatch, and subscriptions.
//!
//! ## Core Concepts
//!
//! - **Event**: A named, argument-carrying request to transform application state
//! - **Context**: The per-dispatch record threaded through an interceptor chain
//! - **Interceptor**: A `{before, after}` hook pair wrapped around an event handler
//! - **Schema**: A structural description of state, checked after every handler
//! - **Environment**: Injected dependencies (clock, id generation)
//!
//! ## Architecture Principles
//!
//! - Unidirectional Data Flow
//! - One immutable state value, replaced atomically
//! - Handlers are pure; side effects live in interceptors
//! - Dependency Injection via coeffects
//!
//! ## Example
//!
//! ```
//! use refract_core::{Context, Interceptor, keys};
//! use std::sync::Arc;
//!
//! #[derive(Debug)]
//! struct Increment;
//!
//! impl refract_core::Event for Increment {
//!     fn name(&self) -> &'static str {
//!         "increment"
//!     }
//! }
//!
//! let handler = Interceptor::new("increment").with_before(|mut ctx: Context| {
//!     let count = ctx.db::<i64>()?;
//!     ctx.set_effect(keys::DB, Arc::new(*count + 1));
//!     Ok(ctx)
//! });
//!
//! let ctx = Context::new(Increment, Arc::new(41_i64), [Arc::new(handler)]);
//! let ctx = ctx.execute()?;
//! assert_eq!(ctx.effect::<i64>(keys::DB)?.as_deref(), Some(&42));
//! # Ok::<(), refract_core::DispatchError>(())
//! ```

// Re-export commonly used types
pub use serde::{Deserialize, Serialize};
pub use smallvec::{SmallVec, smallvec};

/// Context module - The per-dispatch record threaded through interceptors
pub mod context;

/// Environment module - Dependency injection traits
pub mod environment;

/// Error types for dispatch
pub mod error;

/// Event module - Named state-transition requests
pub mod event;

/// Interceptor module - Before/after hooks and chain execution
pub mod interceptor;

/// Schema module - Structural validation of committed state
pub mod schema;

pub use context::{Coeffects, Context, Effects, Slots, keys};
pub use error::DispatchError;
pub use event::Event;
pub use interceptor::{Hook, Interceptor, execute};
pub use schema::{Schema, ValidationReport, Violation};
