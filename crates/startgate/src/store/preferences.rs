//! `SQLite`-backed preferences store.
//!
//! Preferences live in a small key-value table. The file is opened lazily on
//! first access, so a missing or unreadable file never prevents the store
//! from being constructed. Every handle opened for the same path in this
//! process shares one connection and one change notifier: writes are
//! serialized and all observers see them.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::{migrations, FlagStore, FlagStream, DEFAULT_FIRST_RUN, FIRST_RUN_KEY};
use crate::error::{Error, Result};

/// Where the preferences are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Location {
    File(PathBuf),
    Memory,
}

#[derive(Debug)]
struct Shared {
    location: Location,
    conn: Mutex<Option<Connection>>,
    changes: watch::Sender<bool>,
}

/// File-backed first-run flag store.
#[derive(Debug, Clone)]
pub struct PreferencesStore {
    shared: Arc<Shared>,
}

fn registry() -> &'static Mutex<HashMap<PathBuf, Weak<Shared>>> {
    static REGISTRY: OnceLock<Mutex<HashMap<PathBuf, Weak<Shared>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// One spelling per file: absolute, without `.`/`..`, and with the directory
/// canonicalized when it exists.
fn registry_key(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
    };

    if let Some(key) = canonical_parent(&absolute) {
        return key;
    }

    let mut clean = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                clean.pop();
            }
            other => clean.push(other.as_os_str()),
        }
    }
    canonical_parent(&clean).unwrap_or(clean)
}

fn canonical_parent(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?;
    let dir = path.parent()?.canonicalize().ok()?;
    Some(dir.join(name))
}

impl PreferencesStore {
    /// Open the preferences file at `path`.
    ///
    /// Nothing touches the disk until the first read or write. Handles opened
    /// for the same path share state with each other.
    #[must_use]
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let key = registry_key(&path);
        let mut handles = registry().lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(shared) = handles.get(&key).and_then(Weak::upgrade) {
            return Self { shared };
        }

        handles.retain(|_, weak| weak.strong_count() > 0);
        let shared = Arc::new(Shared::new(Location::File(path)));
        handles.insert(key, Arc::downgrade(&shared));
        Self { shared }
    }

    /// Create a store backed by an in-memory database.
    ///
    /// The store is private to the returned handle and its clones.
    #[must_use]
    pub fn open_in_memory() -> Self {
        Self {
            shared: Arc::new(Shared::new(Location::Memory)),
        }
    }

    /// Get the path to the preferences file, if file-backed.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match &self.shared.location {
            Location::File(path) => Some(path),
            Location::Memory => None,
        }
    }

    /// When the first-run flag was last written, if ever.
    ///
    /// # Errors
    ///
    /// Returns an error if the preferences cannot be opened or queried.
    pub async fn last_updated(&self) -> Result<Option<DateTime<Utc>>> {
        let shared = Arc::clone(&self.shared);
        let updated: Option<String> = blocking(move || {
            shared.with_conn(|conn| {
                Ok(conn
                    .query_row(
                        "SELECT updated_at FROM preferences WHERE key = ?1",
                        [FIRST_RUN_KEY],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
        })
        .await?;

        Ok(updated
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc)))
    }

    /// Delete every stored preference, restoring the first-run default.
    ///
    /// Observers receive [`DEFAULT_FIRST_RUN`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageWrite`] if the preferences could not be cleared.
    pub async fn clear(&self) -> Result<usize> {
        let shared = Arc::clone(&self.shared);
        let removed = blocking(move || {
            let mut guard = shared.lock_conn();
            let conn = shared.connection(&mut guard)?;
            let removed = conn.execute("DELETE FROM preferences", [])?;
            shared.changes.send_replace(DEFAULT_FIRST_RUN);
            Ok(removed)
        })
        .await
        .map_err(|e| write_failure(&e))?;

        info!(removed, "cleared stored preferences");
        Ok(removed)
    }
}

impl Shared {
    fn new(location: Location) -> Self {
        let (changes, _) = watch::channel(DEFAULT_FIRST_RUN);
        Self {
            location,
            conn: Mutex::new(None),
            changes,
        }
    }

    fn lock_conn(&self) -> MutexGuard<'_, Option<Connection>> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the open connection, opening it first if needed.
    fn connection<'a>(
        &self,
        guard: &'a mut MutexGuard<'_, Option<Connection>>,
    ) -> Result<&'a Connection> {
        if guard.is_none() {
            **guard = Some(open_connection(&self.location)?);
        }
        let slot: &'a Option<Connection> = &**guard;
        slot.as_ref()
            .ok_or_else(|| Error::internal("preferences connection missing after open"))
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let mut guard = self.lock_conn();
        let conn = self.connection(&mut guard)?;
        f(conn)
    }

    /// Read the flag and mark `changes` as seen while the connection is
    /// held. Writes notify under the same lock, so each one is reported
    /// either by this read or by a later notification, never both.
    fn read_flag(&self, changes: &mut watch::Receiver<bool>) -> Result<bool> {
        let stored: Option<String> = self.with_conn(|conn| {
            let stored = conn
                .query_row(
                    "SELECT value FROM preferences WHERE key = ?1",
                    [FIRST_RUN_KEY],
                    |row| row.get(0),
                )
                .optional()?;
            changes.borrow_and_update();
            Ok(stored)
        })?;

        match stored {
            None => Ok(DEFAULT_FIRST_RUN),
            Some(value) => value.parse().map_err(|_| {
                Error::storage_read(FIRST_RUN_KEY, format!("unexpected value '{value}'"))
            }),
        }
    }

    fn write_flag(&self, value: bool) -> Result<()> {
        let mut guard = self.lock_conn();
        let conn = self.connection(&mut guard)?;
        conn.execute(
            r"
            INSERT INTO preferences (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            ",
            params![FIRST_RUN_KEY, value.to_string(), Utc::now().to_rfc3339()],
        )?;
        // Notify while still holding the connection so observers see writes
        // in the order they were committed.
        self.changes.send_replace(value);
        Ok(())
    }

    /// Read the flag, substituting the default on any failure.
    async fn read_or_default(
        self: Arc<Self>,
        changes: watch::Receiver<bool>,
    ) -> (bool, watch::Receiver<bool>) {
        let shared = Arc::clone(&self);
        let read = blocking(move || {
            let mut changes = changes;
            let value = shared.read_flag(&mut changes);
            Ok((value, changes))
        })
        .await;

        match read {
            Ok((Ok(value), changes)) => (value, changes),
            Ok((Err(e), changes)) => {
                warn!(error = %e, "failed to read first-run state, assuming first run");
                (DEFAULT_FIRST_RUN, changes)
            }
            Err(e) => {
                warn!(error = %e, "failed to read first-run state, assuming first run");
                (DEFAULT_FIRST_RUN, self.changes.subscribe())
            }
        }
    }
}

fn open_connection(location: &Location) -> Result<Connection> {
    let mut conn = match location {
        Location::Memory => Connection::open_in_memory().map_err(|source| Error::StorageOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?,
        Location::File(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    std::fs::create_dir_all(parent).map_err(|source| {
                        Error::DirectoryCreate {
                            path: parent.to_path_buf(),
                            source,
                        }
                    })?;
                }
            }

            debug!("Opening preferences at {}", path.display());
            let conn = Connection::open(path).map_err(|source| Error::StorageOpen {
                path: path.clone(),
                source,
            })?;
            conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL;")?;
            conn
        }
    };

    migrations::initialize_schema(&mut conn)?;
    Ok(conn)
}

/// Run blocking `SQLite` work off the async executor.
async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::internal(format!("preferences task failed: {e}")))?
}

fn write_failure(err: &Error) -> Error {
    match err {
        Error::StorageWrite { key, message } => Error::storage_write(key.clone(), message),
        other => Error::storage_write(FIRST_RUN_KEY, other),
    }
}

#[async_trait::async_trait]
impl FlagStore for PreferencesStore {
    fn observe(&self) -> FlagStream {
        let shared = Arc::clone(&self.shared);
        // Subscribe before the initial read so no write slips in between.
        let changes = shared.changes.subscribe();

        let stream = futures::stream::unfold(
            (shared, changes, true),
            |(shared, mut changes, first)| async move {
                if first {
                    let (value, changes) = Arc::clone(&shared).read_or_default(changes).await;
                    return Some((value, (shared, changes, false)));
                }
                // `shared` owns the sender, so this only fails if it is dropped.
                changes.changed().await.ok()?;
                let value = *changes.borrow_and_update();
                Some((value, (shared, changes, false)))
            },
        );

        Box::pin(stream)
    }

    async fn set(&self, value: bool) -> Result<()> {
        let shared = Arc::clone(&self.shared);
        match blocking(move || shared.write_flag(value)).await {
            Ok(()) => {
                debug!("First run state updated to: {}", value);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Error setting first run state to: {}", value);
                Err(write_failure(&e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn next_value(stream: &mut FlagStream) -> bool {
        tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("timed out waiting for flag")
            .expect("flag stream ended")
    }

    #[tokio::test]
    async fn test_fresh_store_defaults_to_first_run() {
        let store = PreferencesStore::open_in_memory();
        assert!(store.get().await);

        let mut flags = store.observe();
        assert!(next_value(&mut flags).await);
    }

    #[tokio::test]
    async fn test_set_then_observe() {
        let store = PreferencesStore::open_in_memory();
        store.set(false).await.unwrap();

        let mut flags = store.observe();
        assert!(!next_value(&mut flags).await);
    }

    #[tokio::test]
    async fn test_observe_sees_later_writes() {
        let store = PreferencesStore::open_in_memory();
        let mut flags = store.observe();
        assert!(next_value(&mut flags).await);

        store.set(false).await.unwrap();
        assert!(!next_value(&mut flags).await);

        store.set(true).await.unwrap();
        assert!(next_value(&mut flags).await);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = PreferencesStore::open_in_memory();
        let other = store.clone();
        let mut flags = other.observe();
        assert!(next_value(&mut flags).await);

        store.set(false).await.unwrap();
        assert!(!next_value(&mut flags).await);
        assert!(!other.get().await);
    }

    #[tokio::test]
    async fn test_file_store_persists_across_handles() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.db");

        PreferencesStore::open(&path).set(false).await.unwrap();
        assert!(path.exists());

        let conn = Connection::open(&path).unwrap();
        let raw: String = conn
            .query_row(
                "SELECT value FROM preferences WHERE key = ?1",
                [FIRST_RUN_KEY],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(raw, "false");

        assert!(!PreferencesStore::open(&path).get().await);
    }

    #[tokio::test]
    async fn test_handles_for_same_path_share_notifier() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.db");

        let writer = PreferencesStore::open(&path);
        let reader = PreferencesStore::open(&path);
        let mut flags = reader.observe();
        assert!(next_value(&mut flags).await);

        writer.set(false).await.unwrap();
        assert!(!next_value(&mut flags).await);
    }

    #[tokio::test]
    async fn test_path_spellings_share_notifier() {
        let temp_dir = TempDir::new().unwrap();
        let plain = temp_dir.path().join("settings.db");
        let dotted = temp_dir.path().join("sub").join("..").join(".").join("settings.db");

        let reader = PreferencesStore::open(&plain);
        let writer = PreferencesStore::open(&dotted);
        let mut flags = reader.observe();
        assert!(next_value(&mut flags).await);

        writer.set(false).await.unwrap();
        assert!(!next_value(&mut flags).await);
        assert_eq!(reader.path(), Some(plain.as_path()));
    }

    #[test]
    fn test_registry_key_normalizes() {
        let temp_dir = TempDir::new().unwrap();
        let plain = temp_dir.path().join("settings.db");
        std::fs::create_dir(temp_dir.path().join("sub")).unwrap();

        let through_existing = temp_dir.path().join("sub/../settings.db");
        let through_missing = temp_dir.path().join("gone/../settings.db");
        assert_eq!(registry_key(&through_existing), registry_key(&plain));
        assert_eq!(registry_key(&through_missing), registry_key(&plain));
        assert!(registry_key(Path::new("settings.db")).is_absolute());
    }

    #[tokio::test]
    async fn test_write_before_first_item_is_emitted_once() {
        let store = PreferencesStore::open_in_memory();
        let mut flags = store.observe();
        store.set(false).await.unwrap();

        assert!(!next_value(&mut flags).await);
        let again = tokio::time::timeout(Duration::from_millis(200), flags.next()).await;
        assert!(again.is_err(), "unexpected repeat: {again:?}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sets_last_commit_wins() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.db");
        let observer = PreferencesStore::open(&path);
        let mut changes = observer.shared.changes.subscribe();

        let writers: Vec<_> = (0..50)
            .map(|i| {
                let store = PreferencesStore::open(&path);
                tokio::spawn(async move { store.set(i % 2 == 0).await })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap().unwrap();
        }

        // Notifications are sent under the connection lock, in commit order,
        // so the latest one names the last committed value.
        assert!(changes.has_changed().unwrap());
        let last_committed = *changes.borrow_and_update();

        let conn = Connection::open(&path).unwrap();
        let raw: String = conn
            .query_row(
                "SELECT value FROM preferences WHERE key = ?1",
                [FIRST_RUN_KEY],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(raw, last_committed.to_string());
        assert_eq!(PreferencesStore::open(&path).get().await, last_committed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_observer_sees_commits_in_order() {
        let store = PreferencesStore::open_in_memory();
        let mut flags = store.observe();
        assert!(next_value(&mut flags).await);

        for value in [false, true, false, true, false] {
            let writer = store.clone();
            tokio::spawn(async move { writer.set(value).await })
                .await
                .unwrap()
                .unwrap();
            assert_eq!(next_value(&mut flags).await, value);
        }
    }

    #[tokio::test]
    async fn test_open_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/deeper/settings.db");

        let store = PreferencesStore::open(&path);
        assert!(!path.exists());

        store.set(true).await.unwrap();
        assert!(path.exists());
        assert_eq!(store.path(), Some(path.as_path()));
    }

    #[tokio::test]
    async fn test_corrupt_file_reads_as_first_run() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.db");
        std::fs::write(&path, vec![0x42_u8; 4096]).unwrap();

        let store = PreferencesStore::open(&path);
        let mut flags = store.observe();
        assert!(next_value(&mut flags).await);
    }

    #[tokio::test]
    async fn test_unexpected_value_reads_as_first_run() {
        let store = PreferencesStore::open_in_memory();
        store.set(false).await.unwrap();
        store
            .shared
            .with_conn(|conn| {
                conn.execute(
                    "UPDATE preferences SET value = 'maybe' WHERE key = ?1",
                    [FIRST_RUN_KEY],
                )?;
                Ok(())
            })
            .unwrap();

        let mut changes = store.shared.changes.subscribe();
        assert!(matches!(
            store.shared.read_flag(&mut changes),
            Err(Error::StorageRead { .. })
        ));
        assert!(store.get().await);
    }

    #[tokio::test]
    async fn test_unwritable_location_fails_write() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, b"a file, not a directory").unwrap();

        let store = PreferencesStore::open(blocker.join("settings.db"));
        let err = store.set(false).await.unwrap_err();
        assert!(err.is_storage_write());
        assert!(err.to_string().contains(FIRST_RUN_KEY));

        // Reads on the same medium fall back to the default.
        assert!(store.get().await);
    }

    #[tokio::test]
    async fn test_clear_restores_default_and_notifies() {
        let store = PreferencesStore::open_in_memory();
        store.set(false).await.unwrap();

        let mut flags = store.observe();
        assert!(!next_value(&mut flags).await);

        assert_eq!(store.clear().await.unwrap(), 1);
        assert!(next_value(&mut flags).await);
        assert!(store.get().await);
    }

    #[tokio::test]
    async fn test_last_updated() {
        let store = PreferencesStore::open_in_memory();
        assert!(store.last_updated().await.unwrap().is_none());

        store.set(false).await.unwrap();
        let updated = store.last_updated().await.unwrap();
        assert!(updated.is_some_and(|at| at <= Utc::now()));
    }

    #[tokio::test]
    async fn test_in_memory_has_no_path() {
        assert!(PreferencesStore::open_in_memory().path().is_none());
    }
}
