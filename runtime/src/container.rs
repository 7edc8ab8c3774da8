//! The state container.
//!
//! Holds the single immutable application-state value. Every transition
//! replaces the whole value with [`StateContainer::set`]; nothing mutates the
//! current value in place. Readers get a cheap `Arc` snapshot that stays valid
//! however many commits happen afterwards.

use std::sync::Arc;
use tokio::sync::watch;

/// A committed state value and the commit counter it was written at
#[derive(Debug)]
pub struct Snapshot<S> {
    /// The state value
    pub state: Arc<S>,
    /// Number of commits before this one (0 for the initial value)
    pub version: u64,
}

impl<S> Clone for Snapshot<S> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            version: self.version,
        }
    }
}

/// Owner of the current application state
///
/// Cloning a container yields another handle to the same state.
///
/// # Example
///
/// ```
/// use refract_runtime::StateContainer;
/// use std::sync::Arc;
///
/// let container = StateContainer::new(1_u32);
/// let before = container.get();
///
/// container.set(Arc::new(2));
///
/// assert_eq!(*before, 1);
/// assert_eq!(*container.get(), 2);
/// assert_eq!(container.version(), 1);
/// ```
#[derive(Debug)]
pub struct StateContainer<S> {
    sender: Arc<watch::Sender<Snapshot<S>>>,
}

impl<S> Clone for StateContainer<S> {
    fn clone(&self) -> Self {
        Self {
            sender: Arc::clone(&self.sender),
        }
    }
}

impl<S> StateContainer<S>
where
    S: Send + Sync + 'static,
{
    /// Create a container holding `initial`
    #[must_use]
    pub fn new(initial: S) -> Self {
        Self::from_arc(Arc::new(initial))
    }

    /// Create a container around an existing snapshot
    #[must_use]
    pub fn from_arc(initial: Arc<S>) -> Self {
        let (sender, _) = watch::channel(Snapshot {
            state: initial,
            version: 0,
        });
        Self {
            sender: Arc::new(sender),
        }
    }

    /// The current state
    #[must_use]
    pub fn get(&self) -> Arc<S> {
        Arc::clone(&self.sender.borrow().state)
    }

    /// The current state together with its commit counter
    #[must_use]
    pub fn snapshot(&self) -> Snapshot<S> {
        self.sender.borrow().clone()
    }

    /// Number of commits so far
    #[must_use]
    pub fn version(&self) -> u64 {
        self.sender.borrow().version
    }

    /// Atomically replace the state
    ///
    /// Readers holding an older snapshot keep it; subscriptions notice the new
    /// commit counter on their next read.
    pub fn set(&self, next: Arc<S>) {
        self.sender.send_modify(|current| {
            current.state = next;
            current.version += 1;
        });
        tracing::trace!(version = self.version(), "State committed");
    }

    /// Receive a notification after every commit
    ///
    /// For render collaborators that prefer push over polling. The receiver
    /// starts out having seen the current value.
    #[must_use]
    pub fn changes(&self) -> watch::Receiver<Snapshot<S>> {
        self.sender.subscribe()
    }
}
