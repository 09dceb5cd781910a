//! In-process flag store.
//!
//! Behaves like [`super::PreferencesStore`] from an observer's point of
//! view, but keeps the value in memory. It also counts operations and can be
//! told to fail, which makes it the store of choice when testing callers.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, warn};

use super::{FlagStore, FlagStream, DEFAULT_FIRST_RUN, FIRST_RUN_KEY};
use crate::error::{Error, Result};

#[derive(Debug)]
struct Inner {
    value: Mutex<Option<bool>>,
    changes: watch::Sender<bool>,
    writes: AtomicUsize,
    subscriptions: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    read_delay: Mutex<Duration>,
}

/// Memory-backed first-run flag store.
#[derive(Debug, Clone)]
pub struct MemoryFlagStore {
    inner: Arc<Inner>,
}

impl Default for MemoryFlagStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFlagStore {
    /// Create an empty store (the flag has never been written).
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = watch::channel(DEFAULT_FIRST_RUN);
        Self {
            inner: Arc::new(Inner {
                value: Mutex::new(None),
                changes,
                writes: AtomicUsize::new(0),
                subscriptions: AtomicUsize::new(0),
                fail_reads: AtomicBool::new(false),
                fail_writes: AtomicBool::new(false),
                read_delay: Mutex::new(Duration::ZERO),
            }),
        }
    }

    /// Create a store that already holds `value`.
    #[must_use]
    pub fn with_value(value: bool) -> Self {
        let store = Self::new();
        *store.lock_value() = Some(value);
        store
    }

    /// Delay every initial read by `delay`.
    #[must_use]
    pub fn with_read_delay(self, delay: Duration) -> Self {
        *self
            .inner
            .read_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = delay;
        self
    }

    /// Make reads fail (and fall back to the default) until turned off.
    pub fn fail_reads(&self, fail: bool) {
        self.inner.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make writes fail until turned off.
    pub fn fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// The raw stored value, `None` if never written.
    #[must_use]
    pub fn stored(&self) -> Option<bool> {
        *self.lock_value()
    }

    /// Number of successful writes.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.inner.writes.load(Ordering::SeqCst)
    }

    /// Number of `observe` subscriptions started.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.load(Ordering::SeqCst)
    }

    fn lock_value(&self) -> std::sync::MutexGuard<'_, Option<bool>> {
        self.inner
            .value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Inner {
    /// Read the value and mark `changes` as seen under the same lock, so a
    /// concurrent write is reported either by this read or by a later
    /// notification, never both.
    async fn read_or_default(&self, changes: &mut watch::Receiver<bool>) -> bool {
        let delay = *self.read_delay.lock().unwrap_or_else(PoisonError::into_inner);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.fail_reads.load(Ordering::SeqCst) {
            let e = Error::storage_read(FIRST_RUN_KEY, "injected read failure");
            warn!(error = %e, "failed to read first-run state, assuming first run");
            return DEFAULT_FIRST_RUN;
        }

        let stored = self.value.lock().unwrap_or_else(PoisonError::into_inner);
        changes.borrow_and_update();
        stored.unwrap_or(DEFAULT_FIRST_RUN)
    }
}

#[async_trait::async_trait]
impl FlagStore for MemoryFlagStore {
    fn observe(&self) -> FlagStream {
        let inner = Arc::clone(&self.inner);
        inner.subscriptions.fetch_add(1, Ordering::SeqCst);
        let changes = inner.changes.subscribe();

        let stream = futures::stream::unfold(
            (inner, changes, true),
            |(inner, mut changes, first)| async move {
                if first {
                    let value = inner.read_or_default(&mut changes).await;
                    return Some((value, (inner, changes, false)));
                }
                changes.changed().await.ok()?;
                let value = *changes.borrow_and_update();
                Some((value, (inner, changes, false)))
            },
        );

        Box::pin(stream)
    }

    async fn set(&self, value: bool) -> Result<()> {
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::storage_write(FIRST_RUN_KEY, "injected write failure"));
        }

        {
            let mut stored = self.lock_value();
            *stored = Some(value);
            self.inner.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.changes.send_replace(value);
        }
        debug!("First run state updated to: {}", value);
        Ok(())
    }
}
