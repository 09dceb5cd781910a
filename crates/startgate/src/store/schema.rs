//! `SQLite` schema for the preferences file.
//!
//! Each entry of [`MIGRATIONS`] upgrades the file by one version; entry `n`
//! produces schema version `n + 1`. Entries are append-only.

/// Version 1: one row per preference.
pub const CREATE_PREFERENCES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS preferences (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
";

/// Migration batches in version order.
pub const MIGRATIONS: &[&str] = &[CREATE_PREFERENCES_TABLE];
