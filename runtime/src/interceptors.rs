//! Standard interceptors.
//!
//! - [`path`]: narrow the working state to a sub-tree and splice the result back
//! - [`validate`]: reject a new state that violates a [`Schema`]
//! - [`inject_cofx`]: put an external input into the coeffects before the handler
//! - [`persist`]: write a sub-tree of every committed state to a key-value store
//! - [`debug`]: log each event and whether it changed the state
//!
//! Register them outermost first. After hooks run in reverse, so a chain of
//! `[debug, persist, validate, path]` splices, then validates the whole state,
//! then persists it only if validation passed.

use crate::metrics::PersistenceMetrics;
use crate::storage::{KeyValueStore, StorageError};
use refract_core::{Context, DispatchError, Interceptor, Schema, keys};
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Id of the interceptor returned by [`path`]
pub const PATH_ID: &str = "path";

/// Id of the interceptor returned by [`validate`]
pub const VALIDATE_ID: &str = "validate";

/// Id of the interceptor returned by [`persist`]
pub const PERSIST_ID: &str = "persist";

/// Id of the interceptor returned by [`debug`]
pub const DEBUG_ID: &str = "debug";

/// Scope the working state to a sub-tree of `S`
///
/// The before hook replaces the `db` coeffect with `get(state)`, so the
/// handler reads and returns a `Sub`. The after hook restores the full state
/// and, if the handler produced a new `Sub`, writes a copy of the full state
/// with it spliced in via `set` as the `db` effect.
///
/// # Example
///
/// ```
/// use refract_runtime::interceptors::path;
/// use std::sync::Arc;
///
/// #[derive(Clone, Debug)]
/// struct State {
///     items: Arc<Vec<String>>,
///     title: String,
/// }
///
/// let scoped = path(
///     |state: &State| Arc::clone(&state.items),
///     |state: &mut State, items| state.items = items,
/// );
/// assert_eq!(scoped.id(), "path");
/// ```
pub fn path<S, Sub, G, P>(get: G, set: P) -> Interceptor
where
    S: Clone + Any + Send + Sync,
    Sub: Any + Send + Sync,
    G: Fn(&S) -> Arc<Sub> + Send + Sync + 'static,
    P: Fn(&mut S, Arc<Sub>) + Send + Sync + 'static,
{
    Interceptor::new(PATH_ID)
        .with_before(move |mut ctx: Context| {
            let whole = ctx.db::<S>()?;
            let scoped = get(&*whole);
            ctx.stash_db(whole);
            ctx.set_coeffect(keys::DB, scoped);
            Ok(ctx)
        })
        .with_after(move |mut ctx: Context| {
            let whole = ctx.unstash_db::<S>()?;
            if let Some(scoped) = ctx.effect::<Sub>(keys::DB)? {
                let mut next = (*whole).clone();
                set(&mut next, scoped);
                ctx.set_effect(keys::DB, Arc::new(next));
            }
            ctx.set_coeffect(keys::DB, whole);
            Ok(ctx)
        })
}

/// Reject any new state that does not satisfy `schema`
///
/// Runs as an after hook on the `db` effect. Chains that produce no new state
/// pass through untouched.
///
/// # Errors
///
/// The hook raises [`DispatchError::Validation`] listing every violated field,
/// which stops the dispatch before anything is committed.
pub fn validate<S>(schema: Schema) -> Interceptor
where
    S: Serialize + Any + Send + Sync,
{
    Interceptor::new(VALIDATE_ID).with_after(move |ctx: Context| {
        if let Some(next) = ctx.effect::<S>(keys::DB)? {
            schema.validate_serialize(&*next).map_err(|report| {
                tracing::error!(event = ctx.event_name(), %report, "Rejected invalid state");
                DispatchError::Validation(report)
            })?;
        }
        Ok(ctx)
    })
}

/// Inject the result of `provider` into the coeffects under `key`
///
/// The provider runs in the before phase, so the handler reads the value as a
/// plain input and stays a pure function.
///
/// # Example
///
/// ```
/// use refract_runtime::interceptors::inject_cofx;
///
/// let now = inject_cofx("answer", || Ok(42_u32));
/// assert_eq!(now.id(), "cofx:answer");
/// ```
pub fn inject_cofx<T, F>(key: &'static str, provider: F) -> Interceptor
where
    T: Any + Send + Sync,
    F: Fn() -> Result<T, DispatchError> + Send + Sync + 'static,
{
    Interceptor::new(format!("cofx:{key}")).with_before(move |mut ctx: Context| {
        let value = provider()?;
        ctx.set_coeffect(key, Arc::new(value));
        Ok(ctx)
    })
}

/// Save `select(state)` as JSON under `key` whenever a new state is committed
///
/// Persistence is best-effort: a failed save is logged and counted, and the
/// dispatch still commits. Each save counts as one request; a store that
/// writes in the background counts its own failures later.
pub fn persist<S, T, F>(store: Arc<dyn KeyValueStore>, key: impl Into<String>, select: F) -> Interceptor
where
    S: Any + Send + Sync,
    T: Serialize + ?Sized,
    F: Fn(&S) -> &T + Send + Sync + 'static,
{
    let key = key.into();
    Interceptor::new(PERSIST_ID).with_after(move |ctx: Context| {
        if let Some(next) = ctx.effect::<S>(keys::DB)? {
            PersistenceMetrics::record_save_request();
            let saved = serde_json::to_string(select(&*next))
                .map_err(StorageError::from)
                .and_then(|json| store.save(&key, &json));
            if let Err(error) = saved {
                tracing::warn!(key = %key, %error, "Failed to persist state, keeping in-memory commit");
                PersistenceMetrics::record_save_failure();
            }
        }
        Ok(ctx)
    })
}

/// Log every event and whether it changed the state
///
/// Goes first in a chain so its after hook sees the final `db` effect and the
/// restored full state.
pub fn debug<S>() -> Interceptor
where
    S: fmt::Debug + PartialEq + Any + Send + Sync,
{
    Interceptor::new(DEBUG_ID)
        .with_before(|ctx: Context| {
            tracing::debug!(event = ctx.event_name(), "Handling event");
            Ok(ctx)
        })
        .with_after(|ctx: Context| {
            let before = ctx.db::<S>()?;
            match ctx.effect::<S>(keys::DB)? {
                Some(after) if *after != *before => {
                    tracing::debug!(event = ctx.event_name(), "State changed");
                    tracing::trace!(before = ?before, after = ?after, "State diff");
                },
                _ => tracing::debug!(event = ctx.event_name(), "No state change"),
            }
            Ok(ctx)
        })
}
