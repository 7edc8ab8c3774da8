//! The event catalog and its handlers.
//!
//! Every task event runs under the same interceptor chain:
//!
//! ```text
//! debug -> persist -> validate -> path(todos) -> handler
//! ```
//!
//! so each handler sees only the task map, the result is spliced back into the
//! whole state, checked against the schema, and only then saved. `set-showing`
//! operates on the whole state and is validated but not saved. `initialize`
//! reads stored tasks and the example tasks as coeffects.
//!
//! Events naming a task that does not exist leave the map unchanged.

use crate::model::{AppState, Showing, Task, TaskId, Todos};
use crate::schema;
use crate::storage::{load_todos, todos_to_store};
use refract_core::environment::IdGenerator;
use refract_core::{Coeffects, DispatchError, Interceptor};
use refract_macros::Event;
use refract_runtime::interceptors::{debug, inject_cofx, path, validate};
use refract_runtime::{Dispatcher, KeyValueStore};
use std::sync::Arc;

/// Coeffect key for the tasks read from storage
pub const LOCAL_STORE_TODOS: &str = "local-store-todos";

/// Coeffect key for the example tasks used when nothing is stored
pub const SEED_TODOS: &str = "seed-todos";

/// Coeffect key for the id of a task about to be created
pub const NEW_TASK_ID: &str = "new-task-id";

/// Titles of the example tasks
pub const SEED_TITLES: [&str; 2] = ["Learn the event pipeline", "Write a subscription"];

/// Every event the application handles
#[derive(Event, Clone, Debug, PartialEq, Eq)]
pub enum TodoEvent {
    /// Load stored tasks (or the examples) and show everything
    Initialize,
    /// Flip one task between done and not done
    ToggleDone {
        /// Task to flip
        id: TaskId,
    },
    /// Add a task that is not yet done
    CreateTodo {
        /// Title of the new task
        title: String,
    },
    /// Rename a task
    UpdateTodo {
        /// Task to rename
        id: TaskId,
        /// New title
        title: String,
    },
    /// Remove a task
    DeleteTodo {
        /// Task to remove
        id: TaskId,
    },
    /// Mark every task done, or every task not done if all already are
    CompleteAllToggle,
    /// Remove every done task
    ClearCompleted,
    /// Change which tasks are shown
    SetShowing {
        /// New filter
        showing: Showing,
    },
}

/// What the handlers need from outside
#[derive(Clone)]
pub struct Deps {
    /// Where tasks are persisted
    pub store: Arc<dyn KeyValueStore>,
    /// Key tasks are persisted under
    pub storage_key: String,
    /// Source of new task ids
    pub ids: Arc<dyn IdGenerator>,
    /// Whether `initialize` falls back to the example tasks
    pub seed_examples: bool,
}

impl std::fmt::Debug for Deps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deps")
            .field("storage_key", &self.storage_key)
            .field("seed_examples", &self.seed_examples)
            .finish_non_exhaustive()
    }
}

/// Register every handler in the catalog on `dispatcher`
pub fn register(dispatcher: &Dispatcher<AppState, TodoEvent>, deps: &Deps) {
    dispatcher.reg_event_fx(
        "initialize",
        vec![
            Arc::new(debug::<AppState>()),
            Arc::new(validate::<AppState>(schema::app_state())),
            Arc::new(stored_todos(deps)),
            Arc::new(seed_todos(deps)),
        ],
        initialize,
    );

    let mut create_chain = todos_chain(deps);
    let ids = Arc::clone(&deps.ids);
    create_chain.push(Arc::new(inject_cofx(NEW_TASK_ID, move || {
        Ok(TaskId::from_uuid(ids.next_uuid()))
    })));
    dispatcher.reg_event_fx("create-todo", create_chain, create_todo);

    dispatcher.reg_event_db("toggle-done", todos_chain(deps), toggle_done);
    dispatcher.reg_event_db("update-todo", todos_chain(deps), update_todo);
    dispatcher.reg_event_db("delete-todo", todos_chain(deps), delete_todo);
    dispatcher.reg_event_db("complete-all-toggle", todos_chain(deps), complete_all_toggle);
    dispatcher.reg_event_db("clear-completed", todos_chain(deps), clear_completed);

    dispatcher.reg_event_db(
        "set-showing",
        vec![
            Arc::new(debug::<AppState>()),
            Arc::new(validate::<AppState>(schema::app_state())),
        ],
        set_showing,
    );
}

/// The chain shared by every event that edits the task map
fn todos_chain(deps: &Deps) -> Vec<Arc<Interceptor>> {
    vec![
        Arc::new(debug::<AppState>()),
        Arc::new(todos_to_store(Arc::clone(&deps.store), deps.storage_key.clone())),
        Arc::new(validate::<AppState>(schema::app_state())),
        Arc::new(path(
            |state: &AppState| Arc::clone(&state.todos),
            |state: &mut AppState, todos| state.todos = todos,
        )),
    ]
}

/// Stored tasks; unreadable storage counts as empty so the app still starts
fn stored_todos(deps: &Deps) -> Interceptor {
    let store = Arc::clone(&deps.store);
    let key = deps.storage_key.clone();
    inject_cofx(LOCAL_STORE_TODOS, move || {
        Ok(load_todos(store.as_ref(), &key).unwrap_or_else(|error| {
            tracing::warn!(key = %key, %error, "Ignoring unreadable stored tasks");
            None
        }))
    })
}

fn seed_todos(deps: &Deps) -> Interceptor {
    let ids = Arc::clone(&deps.ids);
    let enabled = deps.seed_examples;
    inject_cofx(SEED_TODOS, move || {
        let seeds: Todos = if enabled {
            SEED_TITLES
                .iter()
                .map(|title| {
                    let id = TaskId::from_uuid(ids.next_uuid());
                    (id, Task::new(id, *title))
                })
                .collect()
        } else {
            Todos::new()
        };
        Ok(seeds)
    })
}

fn initialize(cofx: &Coeffects, _: &TodoEvent) -> Result<AppState, DispatchError> {
    let stored = cofx.require::<Option<Todos>>(LOCAL_STORE_TODOS)?;
    let todos = match &*stored {
        Some(todos) => {
            tracing::info!(count = todos.len(), "Loaded stored tasks");
            Arc::new(todos.clone())
        },
        None => cofx.require::<Todos>(SEED_TODOS)?,
    };
    Ok(AppState {
        todos,
        showing: Showing::All,
    })
}

fn create_todo(cofx: &Coeffects, event: &TodoEvent) -> Result<Todos, DispatchError> {
    let todos = cofx.db::<Todos>()?;
    let mut next = (*todos).clone();
    if let TodoEvent::CreateTodo { title } = event {
        let id = *cofx.require::<TaskId>(NEW_TASK_ID)?;
        next.insert(id, Task::new(id, title.clone()));
    }
    Ok(next)
}

fn toggle_done(todos: &Todos, event: &TodoEvent) -> Todos {
    let mut next = todos.clone();
    if let TodoEvent::ToggleDone { id } = event {
        match next.get_mut(id) {
            Some(task) => task.done = !task.done,
            None => tracing::debug!(%id, "toggle-done: no such task"),
        }
    }
    next
}

fn update_todo(todos: &Todos, event: &TodoEvent) -> Todos {
    let mut next = todos.clone();
    if let TodoEvent::UpdateTodo { id, title } = event {
        match next.get_mut(id) {
            Some(task) => task.title.clone_from(title),
            None => tracing::debug!(%id, "update-todo: no such task"),
        }
    }
    next
}

fn delete_todo(todos: &Todos, event: &TodoEvent) -> Todos {
    let mut next = todos.clone();
    if let TodoEvent::DeleteTodo { id } = event {
        if next.remove(id).is_none() {
            tracing::debug!(%id, "delete-todo: no such task");
        }
    }
    next
}

fn complete_all_toggle(todos: &Todos, _: &TodoEvent) -> Todos {
    let target = !todos.values().all(|task| task.done);
    todos
        .iter()
        .map(|(id, task)| (*id, Task { done: target, ..task.clone() }))
        .collect()
}

fn clear_completed(todos: &Todos, _: &TodoEvent) -> Todos {
    todos
        .iter()
        .filter(|(_, task)| !task.done)
        .map(|(id, task)| (*id, task.clone()))
        .collect()
}

fn set_showing(state: &AppState, event: &TodoEvent) -> AppState {
    let mut next = state.clone();
    if let TodoEvent::SetShowing { showing } = event {
        next.showing = *showing;
    }
    next
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code: failures should panic
mod tests {
    use super::*;
    use refract_core::Event;
    use refract_runtime::MemoryStore;
    use refract_testing::{EventTest, SequentialIds};
    use uuid::Uuid;

    fn id(n: u128) -> TaskId {
        TaskId::from_uuid(Uuid::from_u128(n))
    }

    fn deps() -> Deps {
        Deps {
            store: Arc::new(MemoryStore::new()),
            storage_key: "todos".to_string(),
            ids: Arc::new(SequentialIds::starting_at(100)),
            seed_examples: true,
        }
    }

    fn setup(deps: Deps) -> impl FnOnce(&Dispatcher<AppState, TodoEvent>) + 'static {
        move |dispatcher: &Dispatcher<AppState, TodoEvent>| register(dispatcher, &deps)
    }

    fn state(tasks: &[(u128, &str, bool)]) -> AppState {
        AppState::with_tasks(
            tasks.iter().map(|(n, title, done)| Task {
                id: id(*n),
                title: (*title).to_string(),
                done: *done,
            }),
            Showing::All,
        )
    }

    #[test]
    fn test_event_names() {
        assert_eq!(TodoEvent::CompleteAllToggle.name(), "complete-all-toggle");
        assert_eq!(TodoEvent::SetShowing { showing: Showing::Done }.name(), "set-showing");
        assert_eq!(TodoEvent::EVENT_NAMES.len(), 8);
    }

    #[test]
    fn test_every_event_is_registered() {
        let dispatcher = Dispatcher::new(refract_runtime::StateContainer::new(AppState::default()));
        register(&dispatcher, &deps());

        let mut expected = TodoEvent::EVENT_NAMES.to_vec();
        expected.sort_unstable();
        assert_eq!(dispatcher.registered_events(), expected);
    }

    #[test]
    fn test_initialize_seeds_examples() {
        EventTest::new(setup(deps()))
            .given_state(state(&[(1, "stale", true)]))
            .when_event(TodoEvent::Initialize)
            .then_state(|state| {
                let titles: Vec<&str> = state.todos.values().map(|t| t.title.as_str()).collect();
                assert_eq!(titles, SEED_TITLES);
                assert_eq!(state.showing, Showing::All);
                assert!(state.todos.values().all(|t| !t.done));
            })
            .run();
    }

    #[test]
    fn test_initialize_prefers_stored_tasks() {
        let deps = deps();
        let stored = state(&[(5, "stored", true)]);
        crate::storage::save_todos(deps.store.as_ref(), &deps.storage_key, &stored.todos).unwrap();

        EventTest::new(setup(deps))
            .given_state(AppState::default())
            .when_event(TodoEvent::Initialize)
            .then_state(move |state| assert_eq!(state.todos, stored.todos))
            .run();
    }

    #[test]
    fn test_initialize_without_examples_starts_empty() {
        let deps = Deps {
            seed_examples: false,
            ..deps()
        };

        EventTest::new(setup(deps))
            .given_state(AppState::default())
            .when_event(TodoEvent::Initialize)
            .then_state(|state| assert!(state.todos.is_empty()))
            .run();
    }

    #[test]
    fn test_create_then_toggle() {
        EventTest::new(setup(deps()))
            .given_state(AppState::default())
            .when_event(TodoEvent::CreateTodo {
                title: "Foo".to_string(),
            })
            .when_event(TodoEvent::ToggleDone { id: id(100) })
            .then_state(|state| {
                assert_eq!(state.todos.len(), 1);
                let task = &state.todos[&id(100)];
                assert_eq!(task.id, id(100));
                assert_eq!(task.title, "Foo");
                assert!(task.done);
            })
            .run();
    }

    #[test]
    fn test_toggle_twice_restores() {
        let initial = state(&[(1, "a", false), (2, "b", true)]);
        let expected = initial.clone();

        EventTest::new(setup(deps()))
            .given_state(initial)
            .when_event(TodoEvent::ToggleDone { id: id(2) })
            .when_event(TodoEvent::ToggleDone { id: id(2) })
            .then_state(move |state| assert_eq!(*state, expected))
            .run();
    }

    #[test]
    fn test_clear_completed_keeps_active() {
        EventTest::new(setup(deps()))
            .given_state(state(&[(1, "a", true), (2, "b", false), (3, "c", true)]))
            .when_event(TodoEvent::ClearCompleted)
            .then_state(|state| {
                let ids: Vec<TaskId> = state.todos.keys().copied().collect();
                assert_eq!(ids, [id(2)]);
            })
            .run();
    }

    #[test]
    fn test_created_tasks_keep_creation_order() {
        EventTest::new(setup(deps()))
            .given_state(AppState::default())
            .when_event(TodoEvent::CreateTodo { title: "b".into() })
            .when_event(TodoEvent::CreateTodo { title: "a".into() })
            .then_state(|state| {
                let titles: Vec<&str> = state.todos.values().map(|t| t.title.as_str()).collect();
                assert_eq!(titles, ["b", "a"]);
            })
            .run();
    }

    #[test]
    fn test_update_and_delete() {
        EventTest::new(setup(deps()))
            .given_state(state(&[(1, "old", false), (2, "gone", false)]))
            .when_event(TodoEvent::UpdateTodo {
                id: id(1),
                title: "new".into(),
            })
            .when_event(TodoEvent::DeleteTodo { id: id(2) })
            .then_state(|state| {
                assert_eq!(state.todos.len(), 1);
                assert_eq!(state.todos[&id(1)].title, "new");
            })
            .run();
    }

    #[test]
    fn test_missing_ids_are_ignored() {
        let initial = state(&[(1, "only", false)]);
        let expected = initial.clone();

        EventTest::new(setup(deps()))
            .given_state(initial)
            .when_event(TodoEvent::ToggleDone { id: id(9) })
            .when_event(TodoEvent::UpdateTodo {
                id: id(9),
                title: "x".into(),
            })
            .when_event(TodoEvent::DeleteTodo { id: id(9) })
            .then_state(move |state| assert_eq!(*state, expected))
            .run();
    }

    #[test]
    fn test_complete_all_toggle_marks_all_done_when_any_active() {
        EventTest::new(setup(deps()))
            .given_state(state(&[(1, "a", true), (2, "b", false)]))
            .when_event(TodoEvent::CompleteAllToggle)
            .then_state(|state| assert!(state.todos.values().all(|t| t.done)))
            .run();
    }

    #[test]
    fn test_complete_all_toggle_clears_when_all_done() {
        EventTest::new(setup(deps()))
            .given_state(state(&[(1, "a", true), (2, "b", true)]))
            .when_event(TodoEvent::CompleteAllToggle)
            .then_state(|state| assert!(state.todos.values().all(|t| !t.done)))
            .run();
    }

    #[test]
    fn test_set_showing_leaves_todos_untouched() {
        let initial = state(&[(1, "a", false)]);
        let todos = Arc::clone(&initial.todos);

        EventTest::new(setup(deps()))
            .given_state(initial)
            .when_event(TodoEvent::SetShowing {
                showing: Showing::Active,
            })
            .then_state(move |state| {
                assert_eq!(state.showing, Showing::Active);
                assert!(Arc::ptr_eq(&state.todos, &todos));
            })
            .run();
    }

    #[test]
    fn test_invalid_state_is_rejected_by_validation() {
        // A task stored under the wrong key violates the id-equals-key rule
        let mut broken = state(&[(1, "a", false)]);
        Arc::make_mut(&mut broken.todos).insert(id(7), Task::new(id(8), "misfiled"));

        EventTest::new(setup(deps()))
            .given_state(broken)
            .when_event(TodoEvent::ToggleDone { id: id(1) })
            .then_error(|error| match error {
                DispatchError::Validation(report) => {
                    assert!(report.has_path(&format!("todos.{}.id", id(7))));
                },
                other => assert!(other.is_validation(), "unexpected error: {other}"),
            })
            .then_state(|state| assert!(!state.todos[&id(1)].done))
            .run();
    }
}
