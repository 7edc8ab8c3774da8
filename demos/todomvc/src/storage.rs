//! Persistence of the task map.
//!
//! The tasks are stored as one JSON object under a single fixed key. Reading
//! happens once, as a coeffect of `initialize`; writing happens after every
//! committed todos-scoped event through the persist interceptor.

use crate::model::{AppState, Todos};
use refract_core::Interceptor;
use refract_runtime::interceptors::persist;
use refract_runtime::storage::{load_json, save_json};
use refract_runtime::{KeyValueStore, StorageError};
use std::sync::Arc;

/// Key used when none is configured
pub const DEFAULT_STORAGE_KEY: &str = "todos-reframe";

/// Read the persisted tasks, if any were saved under `key`
///
/// # Errors
///
/// Returns [`StorageError`] if the store cannot be read or holds something
/// that is not a task map.
pub fn load_todos(store: &dyn KeyValueStore, key: &str) -> Result<Option<Todos>, StorageError> {
    load_json(store, key)
}

/// Write `todos` under `key`
///
/// # Errors
///
/// Returns [`StorageError`] if the store rejects the write.
pub fn save_todos(store: &dyn KeyValueStore, key: &str, todos: &Todos) -> Result<(), StorageError> {
    save_json(store, key, todos)
}

/// Interceptor that saves `todos` after every committed event
#[must_use]
pub fn todos_to_store(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Interceptor {
    persist(store, key, |state: &AppState| &*state.todos)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code: failures should panic
mod tests {
    use super::*;
    use crate::model::{Task, TaskId};
    use refract_runtime::MemoryStore;
    use uuid::Uuid;

    #[test]
    fn test_missing_key_loads_nothing() {
        let store = MemoryStore::new();
        assert_eq!(load_todos(&store, DEFAULT_STORAGE_KEY).unwrap(), None);
    }

    #[test]
    fn test_saved_todos_load_back() {
        let store = MemoryStore::new();
        let id = TaskId::from_uuid(Uuid::from_u128(3));
        let todos: Todos = [(id, Task::new(id, "Ship it"))].into_iter().collect();

        save_todos(&store, DEFAULT_STORAGE_KEY, &todos).unwrap();

        assert_eq!(load_todos(&store, DEFAULT_STORAGE_KEY).unwrap(), Some(todos));
    }

    #[test]
    fn test_wrong_shape_is_a_serialization_error() {
        let store = MemoryStore::with_entry(DEFAULT_STORAGE_KEY, r#"["not", "a", "map"]"#);

        let result = load_todos(&store, DEFAULT_STORAGE_KEY);

        assert!(matches!(result, Err(StorageError::Serialization(_))));
    }
}
