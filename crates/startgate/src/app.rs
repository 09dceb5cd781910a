//! The application shell.
//!
//! Wires the flag store, the resolver and the navigation host together and
//! runs one session: wait for the start destination, render it, and move to
//! home once onboarding is completed and persisted.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::navigation::{NavHost, OnboardingOutcome, Route, Screens};
use crate::resolver::StartDestinationResolver;
use crate::store::{FlagStore, PreferencesStore};

/// Observable state of the shell before and after resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellState {
    /// The start destination is not known yet.
    Waiting,
    /// The host is showing a route.
    Showing(Route),
}

impl From<Option<Route>> for ShellState {
    fn from(destination: Option<Route>) -> Self {
        destination.map_or(Self::Waiting, Self::Showing)
    }
}

/// Composition root of the application.
#[derive(Debug, Clone)]
pub struct Shell {
    resolver: StartDestinationResolver,
}

impl Shell {
    /// Build a shell over an explicit store.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn new(store: Arc<dyn FlagStore>, grace: Duration) -> Self {
        Self {
            resolver: StartDestinationResolver::new(store, grace),
        }
    }

    /// Build a shell over the preferences file named by `config`.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let store = PreferencesStore::open(config.preferences_path());
        Self::new(Arc::new(store), config.grace_period())
    }

    /// The resolver backing this shell.
    #[must_use]
    pub fn resolver(&self) -> &StartDestinationResolver {
        &self.resolver
    }

    /// Current shell state.
    #[must_use]
    pub fn state(&self) -> ShellState {
        self.resolver.peek().into()
    }

    /// Wait for the start destination and build a host on it.
    ///
    /// `screens.waiting()` is rendered if the destination is not known yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the resolver stopped before resolving.
    pub async fn launch(&self, screens: &mut dyn Screens) -> Result<NavHost> {
        let mut destination = self.resolver.current_start_destination();
        if destination.current().is_none() {
            screens.waiting();
        }

        let start = destination
            .resolved()
            .await
            .ok_or_else(|| Error::internal("start destination stream closed"))?;

        info!(%start, "launching");
        Ok(NavHost::new(start))
    }

    /// Persist onboarding completion, then move the host to home.
    ///
    /// The host only navigates once the write succeeded; on failure it stays
    /// on onboarding so the user can try again.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageWrite`] if the flag could not be persisted,
    /// or [`Error::InvalidTransition`] if the host is not on onboarding.
    pub async fn get_started(&self, host: &mut NavHost) -> Result<Route> {
        if host.current() != Route::Onboarding {
            return Err(Error::InvalidTransition {
                from: host.current(),
                action: "complete onboarding",
            });
        }

        if let Err(e) = self.resolver.on_get_started().await {
            warn!(error = %e, "could not record onboarding completion");
            return Err(e);
        }
        host.complete_onboarding()
    }

    /// Run one session and return the route it ended on.
    ///
    /// # Errors
    ///
    /// Returns an error if the start destination could not be resolved.
    pub async fn run(&self, screens: &mut dyn Screens) -> Result<Route> {
        let mut host = self.launch(screens).await?;

        loop {
            match host.render(screens) {
                None => return Ok(host.current()),
                Some(OnboardingOutcome::Dismissed) => {
                    info!("onboarding dismissed");
                    return Ok(host.current());
                }
                Some(OnboardingOutcome::Completed) => {
                    if let Err(e) = self.get_started(&mut host).await {
                        screens.get_started_failed(&e);
                    }
                }
            }
        }
    }
}
