//! TodoMVC built on the Refract event pipeline.
//!
//! The application state is a single [`AppState`] value. Every change is an
//! event dispatched through an interceptor chain (see [`events`]), and every
//! view is a memoized subscription over the state (see [`subs`]).
//!
//! - Path-scoped handlers that only see the task map
//! - Structural validation of every committed state
//! - Best-effort persistence that never blocks a dispatch
//! - Routing of URL fragments to the filter
//!
//! # Quick Start
//!
//! ```no_run
//! use todomvc::{App, AppConfig, TodoEvent};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let app = App::start(&AppConfig::from_env()?)?;
//!
//! app.dispatch_sync(TodoEvent::CreateTodo {
//!     title: "Buy milk".to_string(),
//! })?;
//! app.navigate("#/active")?;
//!
//! print!("{}", app.render()?);
//! app.shutdown().await?;
//! # Ok(())
//! # }
//! ```

use refract_core::DispatchError;
use refract_core::environment::{IdGenerator, MonotonicUuidV7};
use refract_runtime::{
    Dispatcher, EventQueue, EventSender, FileStore, KeyValueStore, MemoryStore, QueuedStore,
    StateContainer, StorageError, SubscriptionError, SubscriptionGraph,
};
use std::sync::Arc;
use thiserror::Error;

pub mod config;
pub mod events;
pub mod model;
pub mod routing;
pub mod schema;
pub mod storage;
pub mod subs;
pub mod view;

// Re-export commonly used types
pub use config::{AppConfig, ConfigError};
pub use events::{Deps, TodoEvent};
pub use model::{AppState, Showing, Task, TaskId, Todos};
pub use routing::Route;
pub use subs::{FooterCounts, Subs};

/// Errors that stop the application from starting or shutting down cleanly
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration is invalid
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The backing store could not be opened or flushed
    #[error("Storage unavailable: {0}")]
    Storage(#[from] StorageError),

    /// A dispatch failed
    #[error("Dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),

    /// A subscription could not be built
    #[error("Subscription failed: {0}")]
    Subscription(#[from] SubscriptionError),
}

/// A running application: state, handlers, subscriptions and background workers
pub struct App {
    dispatcher: Arc<Dispatcher<AppState, TodoEvent>>,
    graph: SubscriptionGraph<AppState>,
    subs: Subs,
    queue: EventQueue<TodoEvent>,
    store: Arc<QueuedStore>,
}

impl App {
    /// Start the application described by `config`
    ///
    /// Opens the configured store, registers every handler and subscription,
    /// and dispatches `initialize` before returning.
    ///
    /// # Errors
    ///
    /// Returns [`AppError`] if the configuration is invalid, the storage
    /// directory cannot be created, or initialization fails.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn start(config: &AppConfig) -> Result<Self, AppError> {
        config.validate()?;
        let backing: Arc<dyn KeyValueStore> = match &config.storage_dir {
            Some(dir) => Arc::new(FileStore::open(dir.clone())?),
            None => Arc::new(MemoryStore::new()),
        };
        Self::start_with(config, backing, Arc::new(MonotonicUuidV7::default()))
    }

    /// Start with an explicit backing store and id source
    ///
    /// # Errors
    ///
    /// Returns [`AppError`] if initialization fails.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn start_with(
        config: &AppConfig,
        backing: Arc<dyn KeyValueStore>,
        ids: Arc<dyn IdGenerator>,
    ) -> Result<Self, AppError> {
        let store = Arc::new(QueuedStore::spawn(backing));
        let container = StateContainer::new(AppState::default());

        let dispatcher = Arc::new(Dispatcher::new(container.clone()));
        let deps = Deps {
            store: Arc::clone(&store) as Arc<dyn KeyValueStore>,
            storage_key: config.storage_key.clone(),
            ids,
            seed_examples: config.seed_examples,
        };
        events::register(&dispatcher, &deps);

        let graph = SubscriptionGraph::new(container);
        subs::register(&graph);
        let subs = Subs::subscribe(&graph)?;

        let state = dispatcher.dispatch_sync(TodoEvent::Initialize)?;
        tracing::info!(
            storage_key = %config.storage_key,
            tasks = state.todos.len(),
            "Application started"
        );

        let queue = EventQueue::spawn(Arc::clone(&dispatcher));
        Ok(Self {
            dispatcher,
            graph,
            subs,
            queue,
            store,
        })
    }

    /// Apply an event now and return the committed state
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] if the event is rejected; the state is then
    /// unchanged.
    pub fn dispatch_sync(&self, event: TodoEvent) -> Result<Arc<AppState>, DispatchError> {
        self.dispatcher.dispatch_sync(event)
    }

    /// Queue an event behind everything already queued
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::QueueClosed`] once the queue has stopped.
    pub async fn dispatch(&self, event: TodoEvent) -> Result<(), DispatchError> {
        self.queue.dispatch(event).await
    }

    /// A handle other tasks can queue events through
    #[must_use]
    pub fn sender(&self) -> EventSender<TodoEvent> {
        self.queue.sender()
    }

    /// Follow a URL fragment, changing the filter
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] if the filter change is rejected.
    pub fn navigate(&self, fragment: &str) -> Result<Arc<AppState>, DispatchError> {
        self.dispatch_sync(Route::parse(fragment).into_event())
    }

    /// The current state
    #[must_use]
    pub fn state(&self) -> Arc<AppState> {
        self.dispatcher.container().get()
    }

    /// The signals the view reads
    #[must_use]
    pub const fn subs(&self) -> &Subs {
        &self.subs
    }

    /// The subscription graph, for views beyond [`Subs`]
    #[must_use]
    pub const fn graph(&self) -> &SubscriptionGraph<AppState> {
        &self.graph
    }

    /// Render the current views as text
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError`] if a view fails to compute.
    pub fn render(&self) -> Result<String, SubscriptionError> {
        view::render_text(&self.subs)
    }

    /// Wait until every queued event is applied and every save is written
    ///
    /// # Errors
    ///
    /// Returns [`AppError`] if the queue or the store writer has stopped.
    pub async fn settle(&self) -> Result<(), AppError> {
        self.queue.flush().await?;
        self.store.flush().await?;
        Ok(())
    }

    /// Drain the queue, write pending saves and stop background workers
    ///
    /// # Errors
    ///
    /// Returns [`AppError`] if a worker had already stopped.
    pub async fn shutdown(self) -> Result<(), AppError> {
        self.queue.shutdown().await?;
        self.store.shutdown().await?;
        tracing::info!("Application stopped");
        Ok(())
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("dispatcher", &self.dispatcher)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}
