//! Routes and the navigation host.
//!
//! The host owns a back stack of [`Route`]s. It starts on the resolved start
//! destination and knows exactly one transition: onboarding to home, which
//! also removes onboarding from the history.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// A navigable screen destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// Onboarding flow, shown until the user completes it once.
    Onboarding,
    /// Main home screen.
    Home,
}

impl Route {
    /// Wire identifier of the onboarding route.
    pub const ONBOARDING: &'static str = "onboarding";

    /// Wire identifier of the home route.
    pub const HOME: &'static str = "home";

    /// Map the persisted first-run flag to the route the shell starts on.
    #[must_use]
    pub fn from_first_run(is_first_run: bool) -> Self {
        if is_first_run {
            Self::Onboarding
        } else {
            Self::Home
        }
    }

    /// The route identifier.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Onboarding => Self::ONBOARDING,
            Self::Home => Self::HOME,
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Route {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            Self::ONBOARDING => Ok(Self::Onboarding),
            Self::HOME => Ok(Self::Home),
            other => Err(Error::InvalidRoute(other.to_string())),
        }
    }
}

/// What the user did on the onboarding screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnboardingOutcome {
    /// The user pressed "Get Started".
    Completed,
    /// The user left without finishing.
    Dismissed,
}

/// Rendering collaborator for the two screens.
///
/// Methods are called from the shell's async task. An implementation that
/// waits on the user should step off the executor while it waits, as
/// [`crate::cli::TerminalScreens`] does with `block_in_place`.
pub trait Screens {
    /// Render the onboarding screen and report how it ended.
    fn onboarding(&mut self) -> OnboardingOutcome;

    /// Render the home screen.
    fn home(&mut self);

    /// Render the neutral state shown while the start route is unresolved.
    fn waiting(&mut self) {}

    /// Tell the user that completing onboarding could not be recorded.
    fn get_started_failed(&mut self, _error: &Error) {}
}

/// Navigation host with a back stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavHost {
    back_stack: Vec<Route>,
}

impl NavHost {
    /// Create a host whose back stack holds only `start`.
    #[must_use]
    pub fn new(start: Route) -> Self {
        Self {
            back_stack: vec![start],
        }
    }

    /// The route on top of the back stack.
    #[must_use]
    pub fn current(&self) -> Route {
        // The stack is never emptied: `navigate_back` keeps the last entry.
        self.back_stack
            .last()
            .copied()
            .unwrap_or(Route::Home)
    }

    /// The back stack, bottom first.
    #[must_use]
    pub fn back_stack(&self) -> &[Route] {
        &self.back_stack
    }

    /// Render the current route.
    pub fn render(&self, screens: &mut dyn Screens) -> Option<OnboardingOutcome> {
        match self.current() {
            Route::Onboarding => Some(screens.onboarding()),
            Route::Home => {
                screens.home();
                None
            }
        }
    }

    /// Move from onboarding to home, popping onboarding inclusively.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] when the host is not on onboarding.
    pub fn complete_onboarding(&mut self) -> Result<Route> {
        let from = self.current();
        if from != Route::Onboarding {
            return Err(Error::InvalidTransition {
                from,
                action: "complete onboarding",
            });
        }

        let keep = self
            .back_stack
            .iter()
            .position(|r| *r == Route::Onboarding)
            .unwrap_or(0);
        self.back_stack.truncate(keep);
        self.back_stack.push(Route::Home);

        debug!(stack = ?self.back_stack, "navigated to home");
        Ok(Route::Home)
    }

    /// Pop one entry if there is somewhere to go back to.
    pub fn navigate_back(&mut self) -> bool {
        if self.back_stack.len() > 1 {
            self.back_stack.pop();
            true
        } else {
            false
        }
    }
}
