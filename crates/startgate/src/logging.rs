//! Tracing setup for the `startgate` binary and embedders.
//!
//! Events go to stderr, leaving stdout to the screens and to command output.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// How much the crate logs when `RUST_LOG` is unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Errors only.
    Quiet,
    /// Warnings and errors, which includes failed preference reads.
    #[default]
    Normal,
    /// Adds resolution and storage activity.
    Verbose,
    /// Everything.
    Trace,
}

impl Verbosity {
    /// Most detailed level emitted at this verbosity.
    #[must_use]
    pub fn level(self) -> LevelFilter {
        match self {
            Self::Quiet => LevelFilter::ERROR,
            Self::Normal => LevelFilter::WARN,
            Self::Verbose => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }

    /// Filter directive scoping [`Verbosity::level`] to this crate.
    #[must_use]
    pub fn directive(self) -> String {
        format!("{}={}", env!("CARGO_CRATE_NAME"), self.level())
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG`, when set and valid, replaces the directive derived from
/// `verbosity`. Later calls are no-ops.
pub fn init_logging(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.directive()));

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .try_init()
        .is_ok();

    if installed {
        tracing::trace!(?verbosity, "logging initialized");
    }
}
