//! The per-dispatch context.
//!
//! A [`Context`] is created when a dispatch starts, threaded by value through
//! every interceptor stage, and discarded once the dispatcher has read the
//! final effects. It is never persisted or shared across dispatches.
//!
//! Coeffects are the inputs a handler may read (the current state under
//! [`keys::DB`], the event under [`keys::EVENT`], and anything injected by a
//! coeffect interceptor). Effects are the outputs: the new state under
//! [`keys::DB`] plus anything an after-hook wants to pass outward.

use crate::error::DispatchError;
use crate::event::Event;
use crate::interceptor::Interceptor;
use smallvec::SmallVec;
use std::any::{Any, type_name};
use std::borrow::Cow;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

/// Well-known context slot keys
pub mod keys {
    /// Working state (coeffect) and committed state (effect)
    pub const DB: &str = "db";

    /// The event being dispatched (coeffect)
    pub const EVENT: &str = "event";
}

/// Type-erased slot value
pub type SlotValue = Arc<dyn Any + Send + Sync>;

/// A string-keyed map of type-erased values with typed accessors
#[derive(Clone, Default)]
pub struct Slots {
    entries: HashMap<Cow<'static, str>, SlotValue>,
}

/// Inputs visible to handlers and hooks
pub type Coeffects = Slots;

/// Outputs produced by handlers and hooks
pub type Effects = Slots;

impl Slots {
    /// Create an empty slot map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a slot, downcasting to `T`
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::ContextType`] if the slot exists but holds
    /// another type.
    pub fn get<T>(&self, key: &str) -> Result<Option<Arc<T>>, DispatchError>
    where
        T: Any + Send + Sync,
    {
        let Some(value) = self.entries.get(key) else {
            return Ok(None);
        };

        Arc::clone(value)
            .downcast::<T>()
            .map(Some)
            .map_err(|_| DispatchError::ContextType {
                key: key.to_string(),
                expected: type_name::<T>(),
            })
    }

    /// Look up a slot that must be present
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::MissingCoeffect`] if absent, or
    /// [`DispatchError::ContextType`] on a type mismatch.
    pub fn require<T>(&self, key: &str) -> Result<Arc<T>, DispatchError>
    where
        T: Any + Send + Sync,
    {
        self.get(key)?.ok_or_else(|| DispatchError::MissingCoeffect {
            key: key.to_string(),
        })
    }

    /// The working state, narrowed to whatever a path interceptor scoped it to
    ///
    /// # Errors
    ///
    /// See [`Slots::require`].
    pub fn db<T>(&self) -> Result<Arc<T>, DispatchError>
    where
        T: Any + Send + Sync,
    {
        self.require(keys::DB)
    }

    /// Insert or replace a slot
    pub fn insert(&mut self, key: impl Into<Cow<'static, str>>, value: SlotValue) {
        self.entries.insert(key.into(), value);
    }

    /// Remove a slot, returning its previous value
    pub fn remove(&mut self, key: &str) -> Option<SlotValue> {
        self.entries.remove(key)
    }

    /// Whether a slot is present
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of slots
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no slots
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Slot keys in arbitrary order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(AsRef::as_ref)
    }
}

impl fmt::Debug for Slots {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.keys().collect();
        keys.sort_unstable();
        f.debug_struct("Slots").field("keys", &keys).finish()
    }
}

/// Per-dispatch record threaded through an interceptor chain
pub struct Context {
    event_name: &'static str,
    coeffects: Coeffects,
    effects: Effects,
    queue: VecDeque<Arc<Interceptor>>,
    stack: SmallVec<[Arc<Interceptor>; 8]>,
    db_stash: Vec<SlotValue>,
}

impl Context {
    /// Create a context for one dispatch
    ///
    /// # Arguments
    ///
    /// - `event`: The event being dispatched (becomes the `event` coeffect)
    /// - `db`: The current state snapshot (becomes the `db` coeffect)
    /// - `chain`: Interceptors to run, the terminal handler last
    pub fn new<E, S, I>(event: E, db: Arc<S>, chain: I) -> Self
    where
        E: Event,
        S: Any + Send + Sync,
        I: IntoIterator<Item = Arc<Interceptor>>,
    {
        let event_name = event.name();
        let mut coeffects = Coeffects::new();
        coeffects.insert(keys::EVENT, Arc::new(event));
        coeffects.insert(keys::DB, db);

        Self {
            event_name,
            coeffects,
            effects: Effects::new(),
            queue: chain.into_iter().collect(),
            stack: SmallVec::new(),
            db_stash: Vec::new(),
        }
    }

    /// Name of the event being dispatched
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        self.event_name
    }

    /// The event being dispatched
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::ContextType`] if `E` is not the dispatched type.
    pub fn event<E>(&self) -> Result<Arc<E>, DispatchError>
    where
        E: Event,
    {
        self.coeffects.require(keys::EVENT)
    }

    /// The working state coeffect
    ///
    /// # Errors
    ///
    /// See [`Slots::require`].
    pub fn db<T>(&self) -> Result<Arc<T>, DispatchError>
    where
        T: Any + Send + Sync,
    {
        self.coeffects.db()
    }

    /// Read-only view of the coeffects
    #[must_use]
    pub const fn coeffects(&self) -> &Coeffects {
        &self.coeffects
    }

    /// Read-only view of the effects
    #[must_use]
    pub const fn effects(&self) -> &Effects {
        &self.effects
    }

    /// Look up a coeffect that must be present
    ///
    /// # Errors
    ///
    /// See [`Slots::require`].
    pub fn coeffect<T>(&self, key: &str) -> Result<Arc<T>, DispatchError>
    where
        T: Any + Send + Sync,
    {
        self.coeffects.require(key)
    }

    /// Look up an effect, if any stage produced it
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::ContextType`] on a type mismatch.
    pub fn effect<T>(&self, key: &str) -> Result<Option<Arc<T>>, DispatchError>
    where
        T: Any + Send + Sync,
    {
        self.effects.get(key)
    }

    /// Insert or replace a coeffect
    pub fn set_coeffect(&mut self, key: impl Into<Cow<'static, str>>, value: SlotValue) {
        self.coeffects.insert(key, value);
    }

    /// Insert or replace an effect
    pub fn set_effect(&mut self, key: impl Into<Cow<'static, str>>, value: SlotValue) {
        self.effects.insert(key, value);
    }

    /// Remove an effect
    pub fn remove_effect(&mut self, key: &str) -> Option<SlotValue> {
        self.effects.remove(key)
    }

    /// Append an interceptor to the end of the pending queue
    ///
    /// Only meaningful during the before phase.
    pub fn enqueue(&mut self, interceptor: Arc<Interceptor>) {
        self.queue.push_back(interceptor);
    }

    /// Ids of interceptors that have not run their before hook yet
    #[must_use]
    pub fn queued_ids(&self) -> Vec<&str> {
        self.queue.iter().map(|i| i.id()).collect()
    }

    /// Ids of interceptors whose before hook has run, oldest first
    #[must_use]
    pub fn stack_ids(&self) -> Vec<&str> {
        self.stack.iter().map(|i| i.id()).collect()
    }

    /// Save the current working state before narrowing it
    pub fn stash_db(&mut self, db: SlotValue) {
        self.db_stash.push(db);
    }

    /// Restore the most recently stashed working state
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::MissingCoeffect`] if nothing was stashed, or
    /// [`DispatchError::ContextType`] if the stashed value is not a `T`.
    pub fn unstash_db<T>(&mut self) -> Result<Arc<T>, DispatchError>
    where
        T: Any + Send + Sync,
    {
        let stashed = self
            .db_stash
            .pop()
            .ok_or_else(|| DispatchError::MissingCoeffect {
                key: "original-db".to_string(),
            })?;

        stashed
            .downcast::<T>()
            .map_err(|_| DispatchError::ContextType {
                key: "original-db".to_string(),
                expected: type_name::<T>(),
            })
    }

    pub(crate) fn next_queued(&mut self) -> Option<Arc<Interceptor>> {
        self.queue.pop_front()
    }

    pub(crate) fn push_stack(&mut self, interceptor: Arc<Interceptor>) {
        self.stack.push(interceptor);
    }

    pub(crate) fn pop_stack(&mut self) -> Option<Arc<Interceptor>> {
        self.stack.pop()
    }

    /// Run the chain; see [`crate::interceptor::execute`]
    ///
    /// # Errors
    ///
    /// Returns the first error raised by any hook.
    pub fn execute(self) -> Result<Self, DispatchError> {
        crate::interceptor::execute(self)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("event", &self.event_name)
            .field("coeffects", &self.coeffects)
            .field("effects", &self.effects)
            .field("queue", &self.queued_ids())
            .field("stack", &self.stack_ids())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Noop;

    impl Event for Noop {
        fn name(&self) -> &'static str {
            "noop"
        }
    }

    #[test]
    fn test_slots_typed_lookup() {
        let mut slots = Slots::new();
        slots.insert("count", Arc::new(3_u32));

        assert_eq!(slots.get::<u32>("count").ok().flatten().as_deref(), Some(&3));
        assert!(matches!(slots.get::<u32>("missing"), Ok(None)));
        assert!(matches!(
            slots.get::<String>("count"),
            Err(DispatchError::ContextType { .. })
        ));
    }

    #[test]
    fn test_require_reports_missing_key() {
        let slots = Slots::new();
        let err = slots.require::<u32>("now").err();
        assert_eq!(
            err,
            Some(DispatchError::MissingCoeffect {
                key: "now".to_string()
            })
        );
    }

    #[test]
    fn test_new_context_seeds_event_and_db() -> Result<(), DispatchError> {
        let ctx = Context::new(Noop, Arc::new("state".to_string()), Vec::new());

        assert_eq!(ctx.event_name(), "noop");
        assert_eq!(ctx.db::<String>()?.as_str(), "state");
        assert_eq!(ctx.event::<Noop>()?.name(), "noop");
        assert!(ctx.effects().is_empty());
        Ok(())
    }

    #[test]
    fn test_stash_round_trip() -> Result<(), DispatchError> {
        let mut ctx = Context::new(Noop, Arc::new(1_i32), Vec::new());
        ctx.stash_db(Arc::new(7_i32));

        assert_eq!(*ctx.unstash_db::<i32>()?, 7);
        assert!(ctx.unstash_db::<i32>().is_err());
        Ok(())
    }
}
