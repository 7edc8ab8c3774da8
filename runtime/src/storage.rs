//! String-keyed persistence stores.
//!
//! The persist interceptor and startup coeffects talk to a [`KeyValueStore`]:
//! a map from key to serialized string, the same surface browser local storage
//! offers. Three implementations are provided:
//!
//! - [`MemoryStore`]: process-local, for tests and ephemeral sessions
//! - [`FileStore`]: one file per key in a directory, written atomically
//! - [`QueuedStore`]: hands saves to a background task so the dispatch path
//!   never waits on I/O

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::metrics::PersistenceMetrics;

/// Errors from persistence stores
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StorageError {
    /// Underlying I/O failed
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A value could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The key cannot be used by this store
    #[error("Invalid storage key: {reason}")]
    InvalidKey {
        /// Why the key was rejected
        reason: String,
    },

    /// The store's background worker has stopped
    #[error("Store is closed")]
    Closed,
}

/// A string-keyed store of serialized values
pub trait KeyValueStore: Send + Sync {
    /// Read the value under `key`, or `None` if nothing was ever saved
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the store cannot be read.
    fn load(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write `value` under `key`, replacing any previous value
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the store cannot be written.
    fn save(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// Load and deserialize the JSON value under `key`
///
/// # Errors
///
/// Returns [`StorageError::Serialization`] if the stored text is not a valid
/// `T`, or whatever the store reports on read.
pub fn load_json<T>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>, StorageError>
where
    T: DeserializeOwned,
{
    store
        .load(key)?
        .map(|text| serde_json::from_str(&text).map_err(StorageError::from))
        .transpose()
}

/// Serialize `value` as JSON and save it under `key`
///
/// # Errors
///
/// Returns [`StorageError::Serialization`] or whatever the store reports on
/// write.
pub fn save_json<T>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<(), StorageError>
where
    T: Serialize + ?Sized,
{
    store.save(key, &serde_json::to_string(value)?)
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding one entry
    #[must_use]
    pub fn with_entry(key: impl Into<String>, value: impl Into<String>) -> Self {
        let store = Self::new();
        store
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
        store
    }

    /// Number of stored keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Directory-backed store: `<dir>/<key>.json`, replaced atomically on save
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `dir`
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        tracing::debug!(dir = %dir.display(), "Opened file store");
        Ok(Self { dir })
    }

    /// Directory holding the files
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey {
                reason: "key cannot be empty".to_string(),
            });
        }
        if key.len() > 200 {
            return Err(StorageError::InvalidKey {
                reason: "key too long (max 200 characters)".to_string(),
            });
        }
        if !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            || key.starts_with('.')
        {
            return Err(StorageError::InvalidKey {
                reason: format!("key {key:?} contains characters unsafe for a file name"),
            });
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileStore {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        match std::fs::read_to_string(self.path_for(key)?) {
            Ok(text) => Ok(Some(text)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, value)?;
        std::fs::rename(&temp_path, &path)?;
        tracing::trace!(key, bytes = value.len(), "Saved to file store");
        Ok(())
    }
}

enum Job {
    Save { key: String, value: String },
    Flush(oneshot::Sender<()>),
    Shutdown,
}

/// Store wrapper that performs saves on a background task
///
/// `save` only enqueues, so callers on the dispatch path return immediately.
/// Saves are applied in order. Failures are logged and counted since nobody is
/// waiting for them. Loads go straight to the wrapped store.
pub struct QueuedStore {
    inner: Arc<dyn KeyValueStore>,
    jobs: mpsc::UnboundedSender<Job>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl QueuedStore {
    /// Wrap `inner`, spawning the writer on the current tokio runtime
    #[must_use]
    pub fn spawn(inner: Arc<dyn KeyValueStore>) -> Self {
        let (jobs, receiver) = mpsc::unbounded_channel();
        let worker = tokio::spawn(write_behind(Arc::clone(&inner), receiver));
        Self {
            inner,
            jobs,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Wait until every save enqueued before this call has been written
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Closed`] if the writer has stopped.
    pub async fn flush(&self) -> Result<(), StorageError> {
        let (ack, done) = oneshot::channel();
        self.jobs.send(Job::Flush(ack)).map_err(|_| StorageError::Closed)?;
        done.await.map_err(|_| StorageError::Closed)
    }

    /// Write everything pending and stop the writer
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Closed`] if the writer had already stopped.
    pub async fn shutdown(&self) -> Result<(), StorageError> {
        self.jobs.send(Job::Shutdown).map_err(|_| StorageError::Closed)?;
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match worker {
            Some(worker) => worker.await.map_err(|error| {
                tracing::error!(%error, "Background writer ended abnormally");
                StorageError::Closed
            }),
            None => Err(StorageError::Closed),
        }
    }
}

impl KeyValueStore for QueuedStore {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.load(key)
    }

    fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.jobs
            .send(Job::Save {
                key: key.to_string(),
                value: value.to_string(),
            })
            .map_err(|_| StorageError::Closed)
    }
}

impl fmt::Debug for QueuedStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedStore")
            .field("closed", &self.jobs.is_closed())
            .finish_non_exhaustive()
    }
}

async fn write_behind(inner: Arc<dyn KeyValueStore>, mut receiver: mpsc::UnboundedReceiver<Job>) {
    while let Some(job) = receiver.recv().await {
        match job {
            Job::Save { key, value } => {
                let store = Arc::clone(&inner);
                let written = tokio::task::spawn_blocking(move || {
                    let result = store.save(&key, &value);
                    (key, result)
                })
                .await;
                match written {
                    Ok((_, Ok(()))) => {},
                    Ok((key, Err(error))) => {
                        tracing::warn!(key = %key, %error, "Background save failed");
                        PersistenceMetrics::record_save_failure();
                    },
                    Err(error) => {
                        tracing::error!(%error, "Background save task panicked");
                        PersistenceMetrics::record_save_failure();
                    },
                }
            },
            Job::Flush(ack) => {
                let _ = ack.send(());
            },
            // Saves accepted before the close are still written
            Job::Shutdown => receiver.close(),
        }
    }
    tracing::debug!("Background writer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Entry {
        title: String,
        done: bool,
    }

    #[test]
    fn test_memory_store_round_trip() -> Result<(), StorageError> {
        let store = MemoryStore::new();
        assert_eq!(store.load("todos")?, None);

        store.save("todos", "{}")?;

        assert_eq!(store.load("todos")?.as_deref(), Some("{}"));
        assert_eq!(store.len(), 1);
        Ok(())
    }

    #[test]
    fn test_load_json_reports_corrupt_data() {
        let store = MemoryStore::with_entry("todos", "not json");
        let result = load_json::<Entry>(&store, "todos");
        assert!(matches!(result, Err(StorageError::Serialization(_))));
    }

    #[test]
    fn test_json_helpers() -> Result<(), StorageError> {
        let store = MemoryStore::new();
        let entry = Entry {
            title: "Foo".to_string(),
            done: true,
        };

        save_json(&store, "entry", &entry)?;

        assert_eq!(load_json::<Entry>(&store, "entry")?, Some(entry));
        assert_eq!(load_json::<Entry>(&store, "missing")?, None);
        Ok(())
    }

    #[test]
    fn test_file_store_persists_across_instances() -> Result<(), StorageError> {
        let dir = tempfile::tempdir()?;

        FileStore::open(dir.path())?.save("todos-reframe", r#"{"a":1}"#)?;
        let reopened = FileStore::open(dir.path())?;

        assert_eq!(reopened.load("todos-reframe")?.as_deref(), Some(r#"{"a":1}"#));
        assert_eq!(reopened.load("other")?, None);
        assert!(!dir.path().join("todos-reframe.json.tmp").exists());
        Ok(())
    }

    #[test]
    fn test_file_store_rejects_unsafe_keys() -> Result<(), StorageError> {
        let dir = tempfile::tempdir()?;
        let store = FileStore::open(dir.path())?;

        for key in ["", "../escape", "a/b", ".hidden"] {
            assert!(matches!(
                store.save(key, "x"),
                Err(StorageError::InvalidKey { .. })
            ));
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_queued_store_writes_in_order() -> Result<(), StorageError> {
        let inner = Arc::new(MemoryStore::new());
        let queued = QueuedStore::spawn(Arc::clone(&inner) as Arc<dyn KeyValueStore>);

        for n in 0..10 {
            queued.save("counter", &n.to_string())?;
        }
        queued.flush().await?;

        assert_eq!(inner.load("counter")?.as_deref(), Some("9"));
        assert_eq!(queued.load("counter")?.as_deref(), Some("9"));
        Ok(())
    }

    #[tokio::test]
    async fn test_queued_store_closed_after_shutdown() -> Result<(), StorageError> {
        let queued = QueuedStore::spawn(Arc::new(MemoryStore::new()));
        queued.save("k", "v")?;

        queued.shutdown().await?;

        assert!(matches!(queued.save("k", "w"), Err(StorageError::Closed)));
        assert_eq!(queued.load("k")?.as_deref(), Some("v"));
        Ok(())
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_save_accepted_during_shutdown_is_written() -> Result<(), StorageError> {
        let inner = Arc::new(MemoryStore::new());
        let queued = QueuedStore::spawn(Arc::clone(&inner) as Arc<dyn KeyValueStore>);
        queued.save("early", "1")?;

        // The late save is queued behind the shutdown job, before the writer runs
        let (stopped, late) = tokio::join!(queued.shutdown(), async { queued.save("late", "2") });
        stopped?;
        late?;

        assert_eq!(inner.load("early")?.as_deref(), Some("1"));
        assert_eq!(inner.load("late")?.as_deref(), Some("2"));
        assert!(matches!(queued.flush().await, Err(StorageError::Closed)));
        Ok(())
    }
}
