//! The subscription graph.
//!
//! Derived, memoized read views over the state container. Every view is a node
//! identified by a [`Query`] (a name plus arguments). Identical queries resolve
//! to the same node for as long as anyone holds it.
//!
//! - **Root** nodes read the committed state directly.
//! - **Derived** nodes list their input queries explicitly and only ever see
//!   those inputs' outputs, never the raw state.
//!
//! Evaluation is pull-based. A [`Signal::value`] call takes one snapshot of the
//! container and evaluates the node's ancestors against it before the node
//! itself, so a node never observes a half-updated combination of inputs.
//! A node recomputes only when one of its inputs differs from the inputs it
//! cached. When a recomputed output equals the cached one, the cached `Arc` is
//! kept, which keeps descendants from recomputing and preserves output
//! identity for callers.
//!
//! Nodes are held strongly by signals and by the nodes that depend on them, and
//! only weakly by the graph. Dropping the last signal tears a node down;
//! subscribing again rebuilds it lazily.

use crate::container::{Snapshot, StateContainer};
use crate::metrics::SubscriptionMetrics;
use std::any::{Any, type_name};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use thiserror::Error;

/// Errors raised while building or reading a subscription
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SubscriptionError {
    /// No recipe is registered under the query's name
    #[error("No subscription registered for: {name}")]
    UnknownQuery {
        /// Query name
        name: String,
    },

    /// The declared inputs loop back on themselves
    #[error("Subscription cycle: {}", path.join(" -> "))]
    Cycle {
        /// Queries along the loop, first repeated last
        path: Vec<String>,
    },

    /// A node's output is not the type the reader asked for
    #[error("Subscription {query} does not produce a {expected}")]
    TypeMismatch {
        /// The query whose output was read
        query: String,
        /// Requested type name
        expected: &'static str,
    },

    /// A compute function reported a failure
    #[error("Subscription {query} failed: {message}")]
    Compute {
        /// The query being computed
        query: String,
        /// What went wrong
        message: String,
    },
}

impl SubscriptionError {
    /// Create a compute failure for `query`
    #[must_use]
    pub fn compute(query: &Query, message: impl fmt::Display) -> Self {
        Self::Compute {
            query: query.to_string(),
            message: message.to_string(),
        }
    }
}

/// Identity of a subscription node: a name plus arguments
///
/// # Example
///
/// ```
/// use refract_runtime::Query;
///
/// let query = Query::new("visible-todos").with_arg("active");
/// assert_eq!(query.to_string(), "[visible-todos active]");
/// assert_eq!(Query::from("showing"), Query::new("showing"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Query {
    name: Cow<'static, str>,
    args: Vec<String>,
}

impl Query {
    /// A query with no arguments
    #[must_use]
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Append an argument
    #[must_use]
    pub fn with_arg(mut self, arg: impl ToString) -> Self {
        self.args.push(arg.to_string());
        self
    }

    /// Name used to look up the recipe
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Arguments, in order
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Argument at `index`, if any
    #[must_use]
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }
}

impl From<&'static str> for Query {
    fn from(name: &'static str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}", self.name)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        write!(f, "]")
    }
}

/// A type-erased node output that can be compared for equality
pub trait QueryValue: Any + Send + Sync + fmt::Debug {
    /// Borrow as `Any` for downcasting
    fn as_any(&self) -> &dyn Any;

    /// Convert to `Arc<dyn Any>` for downcasting without a copy
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    /// Value equality with another erased output
    fn dyn_eq(&self, other: &dyn QueryValue) -> bool;
}

impl<T> QueryValue for T
where
    T: Any + Send + Sync + fmt::Debug + PartialEq,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn dyn_eq(&self, other: &dyn QueryValue) -> bool {
        other.as_any().downcast_ref::<T>().is_some_and(|other| self == other)
    }
}

/// A node output
pub type Value = Arc<dyn QueryValue>;

fn same_value(a: &Value, b: &Value) -> bool {
    Arc::ptr_eq(a, b) || a.dyn_eq(&**b)
}

/// Resolved input values handed to a derived compute function
pub struct Inputs<'a> {
    query: &'a Query,
    queries: &'a [Query],
    values: &'a [Value],
}

impl Inputs<'_> {
    /// The query being computed
    #[must_use]
    pub const fn query(&self) -> &Query {
        self.query
    }

    /// Number of inputs
    #[must_use]
    pub const fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether there are no inputs
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Borrow the input at `index` as a `T`
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError::TypeMismatch`] if the input produces
    /// another type, or [`SubscriptionError::Compute`] if there is no input at
    /// `index`.
    pub fn get<T: Any>(&self, index: usize) -> Result<&T, SubscriptionError> {
        let value = self.values.get(index).ok_or_else(|| {
            SubscriptionError::compute(self.query, format!("no input at index {index}"))
        })?;
        value
            .as_any()
            .downcast_ref::<T>()
            .ok_or_else(|| SubscriptionError::TypeMismatch {
                query: self.queries[index].to_string(),
                expected: type_name::<T>(),
            })
    }

    /// Share the input at `index` as an `Arc<T>`
    ///
    /// # Errors
    ///
    /// See [`Inputs::get`].
    pub fn arc<T: Any + Send + Sync>(&self, index: usize) -> Result<Arc<T>, SubscriptionError> {
        let value = self.values.get(index).ok_or_else(|| {
            SubscriptionError::compute(self.query, format!("no input at index {index}"))
        })?;
        Arc::clone(value)
            .into_any()
            .downcast::<T>()
            .map_err(|_| SubscriptionError::TypeMismatch {
                query: self.queries[index].to_string(),
                expected: type_name::<T>(),
            })
    }
}

type ExtractFn<S> = Arc<dyn Fn(&S, &Query) -> Value + Send + Sync>;
type InputsFn = Arc<dyn Fn(&Query) -> Vec<Query> + Send + Sync>;
type ComputeFn = Arc<dyn Fn(&Inputs<'_>) -> Result<Value, SubscriptionError> + Send + Sync>;

enum Recipe<S> {
    Root(ExtractFn<S>),
    Derived { inputs: InputsFn, compute: ComputeFn },
}

impl<S> Clone for Recipe<S> {
    fn clone(&self) -> Self {
        match self {
            Self::Root(extract) => Self::Root(Arc::clone(extract)),
            Self::Derived { inputs, compute } => Self::Derived {
                inputs: Arc::clone(inputs),
                compute: Arc::clone(compute),
            },
        }
    }
}

enum NodeKind<S> {
    Root(ExtractFn<S>),
    Derived {
        queries: Vec<Query>,
        inputs: Vec<Arc<Node<S>>>,
        compute: ComputeFn,
    },
}

enum CachedInputs<S> {
    State(Arc<S>),
    Values(Vec<Value>),
}

struct Cache<S> {
    version: u64,
    inputs: CachedInputs<S>,
    output: Value,
}

struct Node<S> {
    query: Query,
    kind: NodeKind<S>,
    cache: Mutex<Option<Cache<S>>>,
    recomputes: AtomicU64,
}

impl<S> Node<S> {
    fn new(query: Query, kind: NodeKind<S>) -> Self {
        Self {
            query,
            kind,
            cache: Mutex::new(None),
            recomputes: AtomicU64::new(0),
        }
    }

    // Holds this node's lock while its inputs evaluate. Locks are always
    // taken from a node towards its ancestors, and the graph is acyclic.
    fn value(&self, snapshot: &Snapshot<S>) -> Result<Value, SubscriptionError> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(cached) = cache.as_ref() {
            if cached.version == snapshot.version {
                SubscriptionMetrics::record_cache_hit();
                return Ok(Arc::clone(&cached.output));
            }
        }

        match &self.kind {
            NodeKind::Root(extract) => {
                if let Some(cached) = cache.as_mut() {
                    if let CachedInputs::State(previous) = &cached.inputs {
                        if Arc::ptr_eq(previous, &snapshot.state) {
                            cached.version = snapshot.version;
                            SubscriptionMetrics::record_cache_hit();
                            return Ok(Arc::clone(&cached.output));
                        }
                    }
                }
                let output = extract(&snapshot.state, &self.query);
                let inputs = CachedInputs::State(Arc::clone(&snapshot.state));
                Ok(self.store(&mut cache, snapshot.version, inputs, output))
            },
            NodeKind::Derived {
                queries,
                inputs,
                compute,
            } => {
                let values = inputs
                    .iter()
                    .map(|input| input.value(snapshot))
                    .collect::<Result<Vec<_>, _>>()?;

                if let Some(cached) = cache.as_mut() {
                    if let CachedInputs::Values(previous) = &cached.inputs {
                        let unchanged = previous.len() == values.len()
                            && previous.iter().zip(&values).all(|(a, b)| same_value(a, b));
                        if unchanged {
                            cached.version = snapshot.version;
                            SubscriptionMetrics::record_cache_hit();
                            return Ok(Arc::clone(&cached.output));
                        }
                    }
                }

                tracing::debug!(query = %self.query, "Recomputing subscription");
                let output = compute(&Inputs {
                    query: &self.query,
                    queries,
                    values: &values,
                })?;
                Ok(self.store(&mut cache, snapshot.version, CachedInputs::Values(values), output))
            },
        }
    }

    fn store(
        &self,
        cache: &mut Option<Cache<S>>,
        version: u64,
        inputs: CachedInputs<S>,
        output: Value,
    ) -> Value {
        self.recomputes.fetch_add(1, Ordering::Relaxed);
        SubscriptionMetrics::record_recompute();

        let output = match cache.take() {
            Some(previous) if same_value(&previous.output, &output) => previous.output,
            _ => output,
        };
        *cache = Some(Cache {
            version,
            inputs,
            output: Arc::clone(&output),
        });
        output
    }
}

struct GraphInner<S> {
    container: StateContainer<S>,
    recipes: RwLock<HashMap<String, Recipe<S>>>,
    nodes: Mutex<HashMap<Query, Weak<Node<S>>>>,
}

/// Registry of subscription recipes plus the live node set
///
/// Cloning yields another handle to the same graph.
///
/// # Example
///
/// ```
/// use refract_runtime::{StateContainer, SubscriptionGraph};
/// use std::sync::Arc;
///
/// let container = StateContainer::new(vec![3_u32, 1, 2]);
/// let graph = SubscriptionGraph::new(container.clone());
///
/// graph.reg_root("numbers", |state: &Vec<u32>, _| Arc::new(state.clone()));
/// graph.reg_derived1("total", "numbers", |numbers: &Vec<u32>| numbers.iter().sum::<u32>());
///
/// let total = graph.subscribe::<u32>("total")?;
/// assert_eq!(*total.value()?, 6);
///
/// container.set(Arc::new(vec![10]));
/// assert_eq!(*total.value()?, 10);
/// # Ok::<(), refract_runtime::SubscriptionError>(())
/// ```
pub struct SubscriptionGraph<S> {
    inner: Arc<GraphInner<S>>,
}

impl<S> Clone for SubscriptionGraph<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> SubscriptionGraph<S>
where
    S: Send + Sync + 'static,
{
    /// Create an empty graph reading from `container`
    #[must_use]
    pub fn new(container: StateContainer<S>) -> Self {
        Self {
            inner: Arc::new(GraphInner {
                container,
                recipes: RwLock::new(HashMap::new()),
                nodes: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The container this graph reads
    #[must_use]
    pub fn container(&self) -> &StateContainer<S> {
        &self.inner.container
    }

    /// Register a root recipe that reads the state directly
    ///
    /// Return a shared `Arc` from `extract` (for example a field already stored
    /// as an `Arc`) and the output keeps its identity across unrelated commits.
    pub fn reg_root<T, F>(&self, name: impl Into<String>, extract: F)
    where
        T: QueryValue,
        F: Fn(&S, &Query) -> Arc<T> + Send + Sync + 'static,
    {
        let extract: ExtractFn<S> = Arc::new(move |state: &S, query: &Query| {
            let value: Value = extract(state, query);
            value
        });
        self.register(name.into(), Recipe::Root(extract));
    }

    /// Register a derived recipe
    ///
    /// # Arguments
    ///
    /// - `name`: Query name
    /// - `inputs`: Input queries for a given query (may depend on its args)
    /// - `compute`: Function of the resolved input values
    pub fn reg_derived<T, I, F>(&self, name: impl Into<String>, inputs: I, compute: F)
    where
        T: QueryValue,
        I: Fn(&Query) -> Vec<Query> + Send + Sync + 'static,
        F: Fn(&Inputs<'_>) -> Result<T, SubscriptionError> + Send + Sync + 'static,
    {
        let compute: ComputeFn = Arc::new(move |inputs: &Inputs<'_>| -> Result<Value, SubscriptionError> {
            let value: Value = Arc::new(compute(inputs)?);
            Ok(value)
        });
        self.register(
            name.into(),
            Recipe::Derived {
                inputs: Arc::new(inputs),
                compute,
            },
        );
    }

    /// Register a derived recipe over one fixed input
    pub fn reg_derived1<A, T, F>(&self, name: impl Into<String>, input: impl Into<Query>, compute: F)
    where
        A: Any,
        T: QueryValue,
        F: Fn(&A) -> T + Send + Sync + 'static,
    {
        let input = input.into();
        self.reg_derived(
            name,
            move |_| vec![input.clone()],
            move |inputs| Ok(compute(inputs.get::<A>(0)?)),
        );
    }

    /// Register a derived recipe over two fixed inputs
    pub fn reg_derived2<A, B, T, F>(
        &self,
        name: impl Into<String>,
        first: impl Into<Query>,
        second: impl Into<Query>,
        compute: F,
    ) where
        A: Any,
        B: Any,
        T: QueryValue,
        F: Fn(&A, &B) -> T + Send + Sync + 'static,
    {
        let queries = vec![first.into(), second.into()];
        self.reg_derived(
            name,
            move |_| queries.clone(),
            move |inputs| Ok(compute(inputs.get::<A>(0)?, inputs.get::<B>(1)?)),
        );
    }

    fn register(&self, name: String, recipe: Recipe<S>) {
        // Live nodes keep the recipe they were built with; new subscribers
        // get the replacement.
        self.inner
            .nodes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|query, _| query.name() != name);

        let mut recipes = self.inner.recipes.write().unwrap_or_else(PoisonError::into_inner);
        if recipes.insert(name.clone(), recipe).is_some() {
            tracing::warn!(subscription = %name, "Overwriting subscription");
        }
    }

    /// Whether a recipe is registered under `name`
    #[must_use]
    pub fn is_registered(&self, name: &str) -> bool {
        self.inner
            .recipes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Number of nodes currently alive
    #[must_use]
    pub fn live_nodes(&self) -> usize {
        self.inner
            .nodes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|node| node.strong_count() > 0)
            .count()
    }

    /// Get (building if needed) the node for `query`
    ///
    /// Building resolves every transitive input, so unknown names and cycles
    /// are reported here rather than on first read.
    ///
    /// # Errors
    ///
    /// - [`SubscriptionError::UnknownQuery`]: A query in the tree has no recipe
    /// - [`SubscriptionError::Cycle`]: The declared inputs loop
    pub fn subscribe<T>(&self, query: impl Into<Query>) -> Result<Signal<S, T>, SubscriptionError>
    where
        T: Any + Send + Sync,
    {
        let node = self.node(&query.into(), &mut Vec::new())?;
        Ok(Signal {
            node,
            container: self.inner.container.clone(),
            _output: PhantomData,
        })
    }

    /// Subscribe, read once, and let the node go
    ///
    /// # Errors
    ///
    /// See [`SubscriptionGraph::subscribe`] and [`Signal::value`].
    pub fn value<T>(&self, query: impl Into<Query>) -> Result<Arc<T>, SubscriptionError>
    where
        T: Any + Send + Sync,
    {
        self.subscribe::<T>(query)?.value()
    }

    fn node(&self, query: &Query, path: &mut Vec<Query>) -> Result<Arc<Node<S>>, SubscriptionError> {
        if path.contains(query) {
            let mut cycle: Vec<String> = path.iter().map(ToString::to_string).collect();
            cycle.push(query.to_string());
            return Err(SubscriptionError::Cycle { path: cycle });
        }

        if let Some(live) = self.live(query) {
            return Ok(live);
        }

        let recipe = self
            .inner
            .recipes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(query.name())
            .cloned()
            .ok_or_else(|| SubscriptionError::UnknownQuery {
                name: query.name().to_string(),
            })?;

        let kind = match recipe {
            Recipe::Root(extract) => NodeKind::Root(extract),
            Recipe::Derived { inputs, compute } => {
                let queries = inputs(query);
                path.push(query.clone());
                let resolved = queries
                    .iter()
                    .map(|input| self.node(input, path))
                    .collect::<Result<Vec<_>, _>>();
                path.pop();
                NodeKind::Derived {
                    queries,
                    inputs: resolved?,
                    compute,
                }
            },
        };

        let mut nodes = self.inner.nodes.lock().unwrap_or_else(PoisonError::into_inner);
        // Another thread may have built the same query meanwhile
        if let Some(live) = nodes.get(query).and_then(Weak::upgrade) {
            return Ok(live);
        }
        nodes.retain(|_, node| node.strong_count() > 0);

        tracing::trace!(query = %query, "Built subscription node");
        let node = Arc::new(Node::new(query.clone(), kind));
        nodes.insert(query.clone(), Arc::downgrade(&node));
        Ok(node)
    }

    fn live(&self, query: &Query) -> Option<Arc<Node<S>>> {
        self.inner
            .nodes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(query)
            .and_then(Weak::upgrade)
    }
}

impl<S> fmt::Debug for SubscriptionGraph<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let recipes = self.inner.recipes.read().map(|r| r.len()).unwrap_or_default();
        f.debug_struct("SubscriptionGraph")
            .field("recipes", &recipes)
            .finish_non_exhaustive()
    }
}

/// A consumer's handle on one subscription node
///
/// Holding a signal keeps the node (and its ancestors) and their caches alive.
pub struct Signal<S, T> {
    node: Arc<Node<S>>,
    container: StateContainer<S>,
    _output: PhantomData<fn() -> T>,
}

impl<S, T> Clone for Signal<S, T> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
            container: self.container.clone(),
            _output: PhantomData,
        }
    }
}

impl<S, T> Signal<S, T>
where
    S: Send + Sync + 'static,
    T: Any + Send + Sync,
{
    /// The current value, recomputing whatever the latest commit invalidated
    ///
    /// # Errors
    ///
    /// - [`SubscriptionError::TypeMismatch`]: The node does not produce a `T`
    /// - [`SubscriptionError::Compute`]: A compute function in the tree failed
    pub fn value(&self) -> Result<Arc<T>, SubscriptionError> {
        let snapshot = self.container.snapshot();
        self.node
            .value(&snapshot)?
            .into_any()
            .downcast::<T>()
            .map_err(|_| SubscriptionError::TypeMismatch {
                query: self.node.query.to_string(),
                expected: type_name::<T>(),
            })
    }

    /// The query this signal reads
    #[must_use]
    pub fn query(&self) -> &Query {
        &self.node.query
    }

    /// How many times the node has recomputed since it was built
    #[must_use]
    pub fn recompute_count(&self) -> u64 {
        self.node.recomputes.load(Ordering::Relaxed)
    }
}

impl<S, T> fmt::Debug for Signal<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("query", &self.node.query)
            .field("recomputes", &self.node.recomputes.load(Ordering::Relaxed))
            .finish()
    }
}
