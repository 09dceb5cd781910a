//! `startgate` - First-launch gate for an application shell
//!
//! This library decides, from one persisted boolean, whether the shell starts
//! on onboarding or on the home screen, and drives the one-way transition
//! between the two.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod navigation;
pub mod resolver;
pub mod store;

pub use app::{Shell, ShellState};
pub use config::Config;
pub use error::{Error, Result};
pub use logging::init_logging;
pub use navigation::{NavHost, OnboardingOutcome, Route, Screens};
pub use resolver::{StartDestinationResolver, StartDestinationStream};
pub use store::{FlagStore, MemoryFlagStore, PreferencesStore};
