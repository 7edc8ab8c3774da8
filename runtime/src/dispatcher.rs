//! Event registry and synchronous dispatch.
//!
//! The [`Dispatcher`] maps event names to interceptor chains. Dispatching an
//! event looks its chain up, seeds a fresh [`Context`] with the current state,
//! runs the chain, and commits the resulting `db` effect to the
//! [`StateContainer`] only when every hook succeeded.
//!
//! Dispatches are serialised: exactly one runs from lookup through commit
//! before the next begins, whichever thread or task submitted it.

use crate::config::RuntimeConfig;
use crate::container::StateContainer;
use crate::metrics::DispatchMetrics;
use refract_core::{Coeffects, Context, DispatchError, Event, Interceptor, keys};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;

/// Id of the terminal interceptor synthesized by [`Dispatcher::reg_event_db`]
pub const DB_HANDLER_ID: &str = "db-handler";

/// Id of the terminal interceptor synthesized by [`Dispatcher::reg_event_fx`]
pub const FX_HANDLER_ID: &str = "fx-handler";

type Chain = Arc<[Arc<Interceptor>]>;

/// Registry of event handlers plus the single writer of the state container
///
/// # Type Parameters
///
/// - `S`: The application state type
/// - `E`: The application's event type
///
/// # Example
///
/// ```
/// use refract_core::Event;
/// use refract_runtime::{Dispatcher, StateContainer};
///
/// #[derive(Debug)]
/// enum Counter {
///     Add(i64),
/// }
///
/// impl Event for Counter {
///     fn name(&self) -> &'static str {
///         "add"
///     }
/// }
///
/// let dispatcher = Dispatcher::<i64, Counter>::new(StateContainer::new(0));
/// dispatcher.reg_event_db("add", Vec::new(), |count: &i64, event: &Counter| {
///     let Counter::Add(n) = event;
///     count + n
/// });
///
/// dispatcher.dispatch_sync(Counter::Add(2))?;
/// assert_eq!(*dispatcher.container().get(), 2);
/// # Ok::<(), refract_core::DispatchError>(())
/// ```
pub struct Dispatcher<S, E> {
    container: StateContainer<S>,
    registry: RwLock<HashMap<&'static str, Chain>>,
    dispatch_lock: Mutex<()>,
    config: RuntimeConfig,
    _event: PhantomData<fn(E)>,
}

impl<S, E> Dispatcher<S, E>
where
    S: fmt::Debug + Send + Sync + 'static,
    E: Event,
{
    /// Create a dispatcher writing to `container` with default configuration
    #[must_use]
    pub fn new(container: StateContainer<S>) -> Self {
        Self::with_config(container, RuntimeConfig::default())
    }

    /// Create a dispatcher with custom configuration
    #[must_use]
    pub fn with_config(container: StateContainer<S>, config: RuntimeConfig) -> Self {
        Self {
            container,
            registry: RwLock::new(HashMap::new()),
            dispatch_lock: Mutex::new(()),
            config,
            _event: PhantomData,
        }
    }

    /// The container this dispatcher commits to
    #[must_use]
    pub const fn container(&self) -> &StateContainer<S> {
        &self.container
    }

    /// The configuration this dispatcher was built with
    #[must_use]
    pub const fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Register a handler that computes a new working value from the old one
    ///
    /// The working value is `S` unless one of `interceptors` narrows it (see
    /// [`crate::interceptors::path`]), in which case `W` is the narrowed type.
    /// Registering a name twice replaces the earlier registration.
    ///
    /// # Arguments
    ///
    /// - `name`: The event name, as returned by [`Event::name`]
    /// - `interceptors`: Hooks wrapped around the handler, outermost first
    /// - `handler`: Pure function of the working value and the event
    pub fn reg_event_db<W, F>(&self, name: &'static str, interceptors: Vec<Arc<Interceptor>>, handler: F)
    where
        W: Any + Send + Sync,
        F: Fn(&W, &E) -> W + Send + Sync + 'static,
    {
        let terminal = Interceptor::new(DB_HANDLER_ID).with_before(move |mut ctx: Context| {
            let db = ctx.db::<W>()?;
            let event = ctx.event::<E>()?;
            let next = handler(&*db, &*event);
            ctx.set_effect(keys::DB, Arc::new(next));
            Ok(ctx)
        });
        self.register(name, interceptors, terminal);
    }

    /// Register a handler that reads injected coeffects
    ///
    /// The handler sees every coeffect (the working value under `db`, plus
    /// whatever [`crate::interceptors::inject_cofx`] put there) and returns
    /// the new working value.
    ///
    /// # Arguments
    ///
    /// - `name`: The event name, as returned by [`Event::name`]
    /// - `interceptors`: Hooks wrapped around the handler, outermost first
    /// - `handler`: Function of the coeffects and the event
    pub fn reg_event_fx<W, F>(&self, name: &'static str, interceptors: Vec<Arc<Interceptor>>, handler: F)
    where
        W: Any + Send + Sync,
        F: Fn(&Coeffects, &E) -> Result<W, DispatchError> + Send + Sync + 'static,
    {
        let terminal = Interceptor::new(FX_HANDLER_ID).with_before(move |mut ctx: Context| {
            let event = ctx.event::<E>()?;
            let next = handler(ctx.coeffects(), &*event)?;
            ctx.set_effect(keys::DB, Arc::new(next));
            Ok(ctx)
        });
        self.register(name, interceptors, terminal);
    }

    /// Register a fully custom chain; the last interceptor is the handler
    pub fn reg_event_chain(&self, name: &'static str, chain: Vec<Arc<Interceptor>>) {
        let chain: Chain = chain.into();
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        if registry.insert(name, chain).is_some() {
            tracing::warn!(event = name, "Overwriting event handler");
        }
    }

    fn register(&self, name: &'static str, mut interceptors: Vec<Arc<Interceptor>>, terminal: Interceptor) {
        interceptors.push(Arc::new(terminal));
        self.reg_event_chain(name, interceptors);
    }

    /// Remove a registration
    ///
    /// Returns true if `name` was registered.
    pub fn clear_event(&self, name: &str) -> bool {
        self.registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some()
    }

    /// Whether a handler is registered under `name`
    #[must_use]
    pub fn is_registered(&self, name: &str) -> bool {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Registered event names, sorted
    #[must_use]
    pub fn registered_events(&self) -> Vec<&'static str> {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<&'static str> = registry.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Interceptor ids of a registered chain, outermost first
    #[must_use]
    pub fn chain_ids(&self, name: &str) -> Option<Vec<String>> {
        self.lookup(name)
            .map(|chain| chain.iter().map(|i| i.id().to_string()).collect())
    }

    fn lookup(&self, name: &str) -> Option<Chain> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Dispatch an event and return once it has committed or failed
    ///
    /// Returns the state the container holds afterwards. A chain that leaves
    /// no `db` effect commits nothing and returns the unchanged state.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::UnknownEvent`]: No handler is registered for the name
    /// - [`DispatchError::Validation`]: The validation gate rejected the new state
    /// - Any other error raised by a hook or handler
    ///
    /// On every error the container is left untouched.
    #[tracing::instrument(skip(self, event), name = "dispatch_sync", fields(event = event.name()))]
    pub fn dispatch_sync(&self, event: E) -> Result<Arc<S>, DispatchError> {
        let name = event.name();
        let _serial = self.dispatch_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let started = Instant::now();

        let result = self.run(name, event);

        match &result {
            Ok(_) => DispatchMetrics::record_commit(name, started.elapsed()),
            Err(error) => {
                tracing::debug!(%error, "Dispatch aborted, state unchanged");
                DispatchMetrics::record_failure(name);
            },
        }
        result
    }

    fn run(&self, name: &'static str, event: E) -> Result<Arc<S>, DispatchError> {
        let chain = self.lookup(name).ok_or_else(|| DispatchError::UnknownEvent {
            name: name.to_string(),
        })?;

        let before = self.container.get();
        let ctx = Context::new(event, Arc::clone(&before), chain.iter().cloned());
        let ctx = ctx.execute()?;

        let Some(next) = ctx.effect::<S>(keys::DB)? else {
            tracing::trace!("No db effect, nothing to commit");
            return Ok(before);
        };

        if self.config.log_state_diffs {
            tracing::trace!(before = ?before, after = ?next, "Committing state");
        }
        self.container.set(Arc::clone(&next));
        tracing::debug!("Event committed");
        Ok(next)
    }
}

impl<S, E> fmt::Debug for Dispatcher<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registered = self
            .registry
            .read()
            .map(|registry| registry.len())
            .unwrap_or_default();
        f.debug_struct("Dispatcher")
            .field("registered", &registered)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
