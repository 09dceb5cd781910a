//! Start-destination resolution.
//!
//! The resolver turns the first-run flag into the route the shell starts on.
//! Its value is `None` until the first flag read completes, then
//! `Some(route)` for the rest of the resolver's life: later flag changes do
//! not re-navigate a running session.
//!
//! The upstream flag subscription is shared by all consumers. It starts with
//! the first consumer and is cancelled a grace period after the last one
//! leaves, so a consumer that is quickly replaced does not restart the read.
//! A subscription cancelled before resolving leaves nothing behind; the next
//! consumer reads the persisted value from scratch.

use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info};

use crate::error::Result;
use crate::navigation::Route;
use crate::store::FlagStore;

/// Default time the upstream subscription outlives its last consumer.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct Sharing {
    subscribers: usize,
    /// Bumped on every acquire and release; a stop timer only acts if it
    /// still matches the generation it was armed at.
    generation: u64,
    upstream: Option<JoinHandle<()>>,
    stop_timer: Option<JoinHandle<()>>,
}

#[derive(Debug)]
struct Shared {
    store: Arc<dyn FlagStore>,
    grace: Duration,
    runtime: Handle,
    destination: watch::Sender<Option<Route>>,
    sharing: Mutex<Sharing>,
}

/// Derives the start destination from the first-run flag.
#[derive(Debug, Clone)]
pub struct StartDestinationResolver {
    shared: Arc<Shared>,
}

impl StartDestinationResolver {
    /// Create a resolver over `store`.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn new(store: Arc<dyn FlagStore>, grace: Duration) -> Self {
        let (destination, _) = watch::channel(None);
        Self {
            shared: Arc::new(Shared {
                store,
                grace,
                runtime: Handle::current(),
                destination,
                sharing: Mutex::new(Sharing::default()),
            }),
        }
    }

    /// Subscribe to the start destination.
    ///
    /// The stream yields the current value first (`None` while unresolved)
    /// and then every change. Holding it keeps the upstream flag
    /// subscription alive.
    #[must_use]
    pub fn current_start_destination(&self) -> StartDestinationStream {
        self.shared.acquire();
        StartDestinationStream {
            current: self.shared.destination.subscribe(),
            changes: WatchStream::new(self.shared.destination.subscribe()),
            _guard: SubscriberGuard {
                shared: Arc::clone(&self.shared),
            },
        }
    }

    /// The resolved start destination, without subscribing.
    #[must_use]
    pub fn peek(&self) -> Option<Route> {
        *self.shared.destination.borrow()
    }

    /// Mark onboarding as complete.
    ///
    /// Every call writes `false` to the store; the resolved destination of
    /// this resolver is not affected.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::Error::StorageWrite`] from the store.
    pub async fn on_get_started(&self) -> Result<()> {
        self.shared.store.set(false).await
    }
}

impl Shared {
    fn lock_sharing(&self) -> MutexGuard<'_, Sharing> {
        self.sharing.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn acquire(self: &Arc<Self>) {
        let mut sharing = self.lock_sharing();
        sharing.subscribers += 1;
        sharing.generation = sharing.generation.wrapping_add(1);

        if let Some(timer) = sharing.stop_timer.take() {
            timer.abort();
        }

        let running = sharing
            .upstream
            .as_ref()
            .is_some_and(|task| !task.is_finished());
        if !running && self.destination.borrow().is_none() {
            debug!("starting first-run subscription");
            let shared = Arc::clone(self);
            sharing.upstream = Some(self.runtime.spawn(shared.run_upstream()));
        }
    }

    fn release(self: &Arc<Self>) {
        let mut sharing = self.lock_sharing();
        sharing.subscribers = sharing.subscribers.saturating_sub(1);
        sharing.generation = sharing.generation.wrapping_add(1);
        if sharing.subscribers > 0 {
            return;
        }

        if self.grace.is_zero() {
            Self::stop_upstream(&mut sharing);
            return;
        }

        let shared = Arc::clone(self);
        let armed_at = sharing.generation;
        sharing.stop_timer = Some(self.runtime.spawn(async move {
            tokio::time::sleep(shared.grace).await;
            shared.grace_elapsed(armed_at);
        }));
    }

    /// Stop the upstream if nothing happened since the timer was armed.
    fn grace_elapsed(&self, armed_at: u64) {
        let mut sharing = self.lock_sharing();
        if sharing.generation != armed_at {
            debug!("stale stop timer ignored");
            return;
        }
        sharing.stop_timer = None;
        if sharing.subscribers == 0 {
            Self::stop_upstream(&mut sharing);
        }
    }

    fn stop_upstream(sharing: &mut Sharing) {
        if let Some(task) = sharing.upstream.take() {
            task.abort();
            debug!("stopped first-run subscription");
        }
    }

    async fn run_upstream(self: Arc<Self>) {
        let mut flags = self.store.observe();
        while let Some(is_first_run) = flags.next().await {
            let route = Route::from_first_run(is_first_run);
            let resolved = self.destination.send_if_modified(|current| {
                if current.is_none() {
                    *current = Some(route);
                    true
                } else {
                    false
                }
            });

            if resolved {
                info!(%route, "start destination resolved");
            } else {
                debug!(is_first_run, "first-run state changed after start destination was resolved");
            }
        }
    }
}

struct SubscriberGuard {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for SubscriberGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberGuard").finish_non_exhaustive()
    }
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        self.shared.release();
    }
}

/// A consumer's view of the start destination.
#[derive(Debug)]
pub struct StartDestinationStream {
    current: watch::Receiver<Option<Route>>,
    changes: WatchStream<Option<Route>>,
    _guard: SubscriberGuard,
}

impl StartDestinationStream {
    /// The value right now.
    #[must_use]
    pub fn current(&self) -> Option<Route> {
        *self.current.borrow()
    }

    /// Wait until the destination is resolved.
    ///
    /// Returns `None` only if the resolver was torn down underneath the
    /// stream, which cannot happen while the stream is alive.
    pub async fn resolved(&mut self) -> Option<Route> {
        self.current
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|route| *route)
    }
}

impl Stream for StartDestinationStream {
    type Item = Option<Route>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.changes.poll_next_unpin(cx)
    }
}
