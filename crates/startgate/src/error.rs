//! Error types for startgate.
//!
//! Storage failures carry the preference key they concern. Read failures
//! never leave the store: it logs them and reports the first-run default.

use std::path::PathBuf;
use thiserror::Error;

use crate::navigation::Route;

/// Errors produced by startgate.
#[derive(Error, Debug)]
pub enum Error {
    // === Preferences ===
    /// The preferences file could not be opened.
    #[error("failed to open preferences at {path}: {source}")]
    StorageOpen {
        /// Preferences file path, or `:memory:`.
        path: PathBuf,
        /// Error reported by `SQLite`.
        #[source]
        source: rusqlite::Error,
    },

    /// A stored preference could not be read or understood.
    #[error("failed to read preference '{key}': {message}")]
    StorageRead {
        /// Preference key.
        key: String,
        /// Reason the read failed.
        message: String,
    },

    /// A preference could not be persisted.
    #[error("failed to write preference '{key}': {message}")]
    StorageWrite {
        /// Preference key.
        key: String,
        /// Reason the write failed.
        message: String,
    },

    /// `SQLite` rejected a statement.
    #[error("preferences query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// The preferences file has a schema this build cannot use.
    #[error("preferences migration failed: {message}")]
    DatabaseMigration {
        /// What was wrong with the schema.
        message: String,
    },

    /// The directory holding the preferences file could not be created.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    // === Configuration ===
    /// Configuration sources could not be merged or parsed.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// A configuration value is out of range.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Which value is wrong and why.
        message: String,
    },

    // === Navigation ===
    /// A route identifier did not match any route.
    #[error("unknown route: '{0}'")]
    InvalidRoute(String),

    /// The navigation host refused a transition.
    #[error("cannot {action} from route '{from}'")]
    InvalidTransition {
        /// Route shown when the transition was attempted.
        from: Route,
        /// The refused transition.
        action: &'static str,
    },

    /// Broken internal plumbing, such as a panicked blocking task.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result alias used across startgate.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// A read failure for `key`.
    #[must_use]
    pub fn storage_read(key: impl Into<String>, message: impl ToString) -> Self {
        Self::StorageRead {
            key: key.into(),
            message: message.to_string(),
        }
    }

    /// A write failure for `key`.
    #[must_use]
    pub fn storage_write(key: impl Into<String>, message: impl ToString) -> Self {
        Self::StorageWrite {
            key: key.into(),
            message: message.to_string(),
        }
    }

    /// An internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether this is a failed preference write, which the user may retry.
    #[must_use]
    pub fn is_storage_write(&self) -> bool {
        matches!(self, Self::StorageWrite { .. })
    }
}
