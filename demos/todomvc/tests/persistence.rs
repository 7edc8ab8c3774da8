//! Persistence across restarts and in the face of storage failures.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use refract_runtime::{FileStore, KeyValueStore, MemoryStore};
use refract_testing::{RecordingStore, SequentialIds, init_test_tracing};
use std::sync::Arc;
use todomvc::storage::load_todos;
use todomvc::{App, AppConfig, Showing, TodoEvent};

fn config(dir: &std::path::Path) -> AppConfig {
    AppConfig::default()
        .with_storage_dir(dir)
        .with_storage_key("my-todos")
        .with_seed_examples(false)
}

#[tokio::test]
async fn test_tasks_survive_restart() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();

    let app = App::start(&config(dir.path())).unwrap();
    app.dispatch_sync(TodoEvent::CreateTodo { title: "Keep me".into() }).unwrap();
    app.dispatch_sync(TodoEvent::CreateTodo { title: "And me".into() }).unwrap();
    let first = *app.state().todos.keys().next().unwrap();
    app.dispatch_sync(TodoEvent::ToggleDone { id: first }).unwrap();
    app.navigate("#/done").unwrap();
    let saved = Arc::clone(&app.state().todos);
    app.shutdown().await.unwrap();

    assert!(dir.path().join("my-todos.json").exists());

    let app = App::start(&config(dir.path())).unwrap();
    let state = app.state();
    assert_eq!(state.todos, saved);
    // The filter is not persisted
    assert_eq!(state.showing, Showing::All);
    app.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_only_committed_states_are_saved() {
    init_test_tracing();
    let store = Arc::new(MemoryStore::new());
    let app = App::start_with(
        &AppConfig::default().with_seed_examples(false),
        Arc::clone(&store) as Arc<dyn KeyValueStore>,
        Arc::new(SequentialIds::new()),
    )
    .unwrap();

    assert!(store.is_empty(), "initialize must not save");

    app.dispatch_sync(TodoEvent::CreateTodo { title: "A".into() }).unwrap();
    app.dispatch_sync(TodoEvent::SetShowing { showing: Showing::Done }).unwrap();
    app.settle().await.unwrap();

    let stored = load_todos(store.as_ref(), "todos-reframe").unwrap().unwrap();
    assert_eq!(stored, *app.state().todos);

    app.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_failed_saves_do_not_roll_back() {
    init_test_tracing();
    let store = Arc::new(RecordingStore::new());
    store.fail_saves(true);
    let app = App::start_with(
        &AppConfig::default().with_seed_examples(false),
        Arc::clone(&store) as Arc<dyn KeyValueStore>,
        Arc::new(SequentialIds::new()),
    )
    .unwrap();

    app.dispatch_sync(TodoEvent::CreateTodo { title: "A".into() }).unwrap();
    app.dispatch(TodoEvent::CreateTodo { title: "B".into() }).await.unwrap();
    app.settle().await.unwrap();

    assert_eq!(app.state().todos.len(), 2);
    assert!(store.saves().is_empty());

    store.fail_saves(false);
    app.dispatch_sync(TodoEvent::CompleteAllToggle).unwrap();
    app.settle().await.unwrap();
    assert_eq!(store.saves().len(), 1);

    app.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_corrupt_storage_falls_back_to_examples() {
    init_test_tracing();
    let store = Arc::new(RecordingStore::new());
    store.seed("todos-reframe", "{ this is not json");

    let app = App::start_with(
        &AppConfig::default(),
        Arc::clone(&store) as Arc<dyn KeyValueStore>,
        Arc::new(SequentialIds::new()),
    )
    .unwrap();

    let titles: Vec<String> = app.state().todos.values().map(|t| t.title.clone()).collect();
    assert_eq!(titles, todomvc::events::SEED_TITLES);

    app.shutdown().await.unwrap();
}

#[test]
fn test_unsafe_storage_key_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path()).unwrap();

    assert!(store.save("../escape", "{}").is_err());
    assert!(load_todos(&store, "../escape").is_err());
}
