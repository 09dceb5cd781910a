//! Schema versioning for the preferences file.
//!
//! The version lives in `SQLite`'s `user_version` header field, so a fresh
//! file reports 0 without any bookkeeping table.

use rusqlite::{Connection, TransactionBehavior};
use tracing::debug;

use crate::error::{Error, Result};

use super::schema::MIGRATIONS;

/// Schema version this build writes.
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub const CURRENT_VERSION: i32 = MIGRATIONS.len() as i32;

/// Bring `conn` up to [`CURRENT_VERSION`].
///
/// Pending migrations run in one immediate transaction together with the
/// version bump.
///
/// # Errors
///
/// Returns [`Error::DatabaseMigration`] if the file was written by a newer
/// build, or any `SQLite` error raised while migrating.
pub fn initialize_schema(conn: &mut Connection) -> Result<()> {
    let found = schema_version(conn)?;
    if found > CURRENT_VERSION {
        return Err(Error::DatabaseMigration {
            message: format!(
                "preferences schema version {found} is newer than supported {CURRENT_VERSION}"
            ),
        });
    }
    if found == CURRENT_VERSION {
        return Ok(());
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    // Another connection may have migrated while we waited for the lock.
    let start = schema_version(&tx)?;
    for (index, sql) in pending(start)? {
        tx.execute_batch(sql)?;
        debug!(version = index + 1, "applied preferences migration");
    }
    tx.pragma_update(None, "user_version", CURRENT_VERSION)?;
    tx.commit()?;
    Ok(())
}

/// The file's schema version; 0 for a fresh file.
pub fn schema_version(conn: &Connection) -> Result<i32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

fn pending(from: i32) -> Result<impl Iterator<Item = (usize, &'static str)>> {
    let from = usize::try_from(from).map_err(|_| Error::DatabaseMigration {
        message: format!("invalid schema version: {from}"),
    })?;
    Ok(MIGRATIONS.iter().copied().enumerate().skip(from))
}
