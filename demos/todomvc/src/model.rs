//! Domain types for the task list.
//!
//! The whole application is one [`AppState`] value. Tasks live in a map keyed
//! by [`TaskId`]; ids are time-ordered, so iterating the map yields tasks in
//! creation order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Unique, time-sortable identifier for a task
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Wrap a UUID
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::try_parse(s).map(Self)
    }
}

/// A single task
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Identifier, always equal to the key the task is stored under
    pub id: TaskId,
    /// What needs doing
    pub title: String,
    /// Whether it has been done
    pub done: bool,
}

impl Task {
    /// Create a task that is not yet done
    #[must_use]
    pub fn new(id: TaskId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            done: false,
        }
    }
}

/// Every task, ordered by id
pub type Todos = BTreeMap<TaskId, Task>;

/// Which tasks the list shows
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Showing {
    /// Every task
    #[default]
    All,
    /// Tasks not yet done
    Active,
    /// Tasks already done
    Done,
}

impl Showing {
    /// Every filter, in display order
    pub const ALL: [Self; 3] = [Self::All, Self::Active, Self::Done];

    /// The filter's name as it appears in state and in URLs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Active => "active",
            Self::Done => "done",
        }
    }

    /// Whether `task` passes this filter
    #[must_use]
    pub const fn matches(self, task: &Task) -> bool {
        match self {
            Self::All => true,
            Self::Active => !task.done,
            Self::Done => task.done,
        }
    }
}

impl fmt::Display for Showing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A filter name that is not `all`, `active` or `done`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown filter: {0:?}")]
pub struct UnknownFilter(pub String);

impl FromStr for Showing {
    type Err = UnknownFilter;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "active" => Ok(Self::Active),
            "done" => Ok(Self::Done),
            other => Err(UnknownFilter(other.to_string())),
        }
    }
}

/// The application state
///
/// `todos` sits behind an `Arc` so events that leave it alone (changing the
/// filter) keep it pointer-identical, which is what lets subscriptions over
/// it skip recomputation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AppState {
    /// Every task, keyed by id
    pub todos: Arc<Todos>,
    /// Current filter
    pub showing: Showing,
}

impl AppState {
    /// Build a state from a list of tasks
    #[must_use]
    pub fn with_tasks(tasks: impl IntoIterator<Item = Task>, showing: Showing) -> Self {
        Self {
            todos: Arc::new(tasks.into_iter().map(|task| (task.id, task)).collect()),
            showing,
        }
    }

    /// Number of tasks
    #[must_use]
    pub fn count(&self) -> usize {
        self.todos.len()
    }

    /// Number of tasks already done
    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.todos.values().filter(|task| task.done).count()
    }
}
