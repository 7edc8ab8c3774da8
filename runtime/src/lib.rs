//! # Refract Runtime
//!
//! Runtime implementation for the Refract event pipeline.
//!
//! This crate owns the application state and everything that reads or writes
//! it: the event registry and dispatcher, the ordered asynchronous queue, the
//! memoized subscription graph, the standard interceptors, and the
//! persistence stores they write to.
//!
//! ## Core Components
//!
//! - **`StateContainer`**: Holds the single immutable state value
//! - **`Dispatcher`**: Resolves an event to its interceptor chain, runs it, commits the result
//! - **`EventQueue`**: Applies events from many producers one at a time, in order
//! - **`SubscriptionGraph`**: Derived views recomputed only when their inputs change
//! - **Interceptors**: `path`, `validate`, `inject_cofx`, `persist`, `debug`
//!
//! ## Example
//!
//! ```
//! use refract_core::Event;
//! use refract_runtime::{Dispatcher, StateContainer, SubscriptionGraph};
//! use std::sync::Arc;
//!
//! #[derive(Debug)]
//! struct Add(u32);
//!
//! impl Event for Add {
//!     fn name(&self) -> &'static str {
//!         "add"
//!     }
//! }
//!
//! let container = StateContainer::new(Vec::<u32>::new());
//! let dispatcher = Dispatcher::new(container.clone());
//! let graph = SubscriptionGraph::new(container);
//!
//! dispatcher.reg_event_db("add", Vec::new(), |items: &Vec<u32>, Add(n): &Add| {
//!     let mut next = items.clone();
//!     next.push(*n);
//!     next
//! });
//! graph.reg_root("items", |items: &Vec<u32>, _| Arc::new(items.clone()));
//! graph.reg_derived1("total", "items", |items: &Vec<u32>| items.iter().sum::<u32>());
//!
//! let total = graph.subscribe::<u32>("total")?;
//! dispatcher.dispatch_sync(Add(2))?;
//! dispatcher.dispatch_sync(Add(3))?;
//!
//! assert_eq!(*total.value()?, 5);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Runtime configuration
pub mod config;

/// The state container
pub mod container;

/// Event registry and synchronous dispatch
pub mod dispatcher;

/// Standard interceptors
pub mod interceptors;

/// Metrics for observability
pub mod metrics;

/// Ordered asynchronous dispatch
pub mod queue;

/// Persistence stores
pub mod storage;

/// Memoized derived views
pub mod subscription;

pub use config::RuntimeConfig;
pub use container::{Snapshot, StateContainer};
pub use dispatcher::Dispatcher;
pub use queue::{EventQueue, EventSender};
pub use storage::{FileStore, KeyValueStore, MemoryStore, QueuedStore, StorageError};
pub use subscription::{Inputs, Query, QueryValue, Signal, SubscriptionError, SubscriptionGraph, Value};
