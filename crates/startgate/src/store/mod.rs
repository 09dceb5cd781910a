//! Persistent first-run flag storage.
//!
//! The flag is a single boolean preference, `is_first_run`, that defaults to
//! `true` when it has never been written. Stores expose it as an observable
//! stream plus an asynchronous write.

pub mod memory;
pub mod migrations;
pub mod preferences;
pub mod schema;

use std::pin::Pin;

use futures::{Stream, StreamExt};

use crate::error::Result;

pub use memory::MemoryFlagStore;
pub use preferences::PreferencesStore;

/// Preference key holding the first-run flag.
pub const FIRST_RUN_KEY: &str = "is_first_run";

/// Value reported when the flag is absent or cannot be read.
///
/// Showing onboarding again is preferred over silently skipping it.
pub const DEFAULT_FIRST_RUN: bool = true;

/// Stream of first-run flag values.
pub type FlagStream = Pin<Box<dyn Stream<Item = bool> + Send>>;

/// Durable storage for the first-run flag.
#[async_trait::async_trait]
pub trait FlagStore: Send + Sync + std::fmt::Debug {
    /// Observe the flag.
    ///
    /// The stream yields the stored value first, then the new value after
    /// every write made through a handle sharing the same backing storage.
    /// It never ends on its own. Missing values and read failures yield
    /// [`DEFAULT_FIRST_RUN`].
    fn observe(&self) -> FlagStream;

    /// Persist a new flag value.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StorageWrite`] if the value could not be
    /// persisted.
    async fn set(&self, value: bool) -> Result<()>;

    /// Read the flag once, with the same defaults as [`FlagStore::observe`].
    async fn get(&self) -> bool {
        self.observe().next().await.unwrap_or(DEFAULT_FIRST_RUN)
    }
}
