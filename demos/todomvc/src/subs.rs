//! The subscription catalog.
//!
//! Two roots read the state directly (`todos`, `showing`); everything else is
//! derived from them:
//!
//! ```text
//! todos ──┬── sorted-todos ──┬── visible-todos
//!         │                  └── [filtered-todos <filter>]
//! showing ───────────────────┘
//! todos ──┬── all-complete
//!         └── completed-count ── footer-counts
//! ```

use crate::model::{AppState, Showing, Task, Todos};
use refract_runtime::{Query, Signal, SubscriptionError, SubscriptionGraph};
use std::sync::Arc;

/// The raw task map
pub const TODOS: &str = "todos";
/// The current filter
pub const SHOWING: &str = "showing";
/// Every task in id order
pub const SORTED_TODOS: &str = "sorted-todos";
/// Tasks passing the current filter
pub const VISIBLE_TODOS: &str = "visible-todos";
/// Tasks passing the filter named by the query's first argument
pub const FILTERED_TODOS: &str = "filtered-todos";
/// Whether every task is done
pub const ALL_COMPLETE: &str = "all-complete";
/// Number of done tasks
pub const COMPLETED_COUNT: &str = "completed-count";
/// Remaining and done counts
pub const FOOTER_COUNTS: &str = "footer-counts";

/// Counts shown in the footer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FooterCounts {
    /// Tasks not yet done
    pub active: usize,
    /// Tasks done
    pub done: usize,
}

/// Register every subscription in the catalog on `graph`
pub fn register(graph: &SubscriptionGraph<AppState>) {
    graph.reg_root(TODOS, |state: &AppState, _| Arc::clone(&state.todos));
    graph.reg_root(SHOWING, |state: &AppState, _| Arc::new(state.showing));

    graph.reg_derived1(SORTED_TODOS, TODOS, |todos: &Todos| {
        todos.values().cloned().collect::<Vec<Task>>()
    });
    graph.reg_derived2(VISIBLE_TODOS, SORTED_TODOS, SHOWING, |tasks: &Vec<Task>, showing: &Showing| {
        filter(tasks, *showing)
    });
    graph.reg_derived(
        FILTERED_TODOS,
        |_| vec![Query::new(SORTED_TODOS)],
        |inputs| {
            let query = inputs.query();
            let showing: Showing = query
                .arg(0)
                .unwrap_or(Showing::All.as_str())
                .parse()
                .map_err(|error| SubscriptionError::compute(query, error))?;
            Ok(filter(inputs.get::<Vec<Task>>(0)?, showing))
        },
    );

    graph.reg_derived1(ALL_COMPLETE, TODOS, |todos: &Todos| todos.values().all(|task| task.done));
    graph.reg_derived1(COMPLETED_COUNT, TODOS, |todos: &Todos| {
        todos.values().filter(|task| task.done).count()
    });
    graph.reg_derived2(FOOTER_COUNTS, TODOS, COMPLETED_COUNT, |todos: &Todos, done: &usize| {
        FooterCounts {
            active: todos.len() - done,
            done: *done,
        }
    });
}

fn filter(tasks: &[Task], showing: Showing) -> Vec<Task> {
    tasks.iter().filter(|task| showing.matches(task)).cloned().collect()
}

/// The signals a render collaborator reads
#[derive(Clone, Debug)]
pub struct Subs {
    /// Tasks passing the current filter
    pub visible_todos: Signal<AppState, Vec<Task>>,
    /// Whether every task is done
    pub all_complete: Signal<AppState, bool>,
    /// Remaining and done counts
    pub footer_counts: Signal<AppState, FooterCounts>,
    /// The current filter
    pub showing: Signal<AppState, Showing>,
}

impl Subs {
    /// Subscribe to everything the view needs
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError`] if the catalog was not registered on
    /// `graph`.
    pub fn subscribe(graph: &SubscriptionGraph<AppState>) -> Result<Self, SubscriptionError> {
        Ok(Self {
            visible_todos: graph.subscribe(VISIBLE_TODOS)?,
            all_complete: graph.subscribe(ALL_COMPLETE)?,
            footer_counts: graph.subscribe(FOOTER_COUNTS)?,
            showing: graph.subscribe(SHOWING)?,
        })
    }
}
