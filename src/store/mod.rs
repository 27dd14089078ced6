//! Data-model operations over the shared SQLite store.
//!
//! Each function is one logical operation; timestamps are passed in by the
//! caller so the clock stays injectable. Writes that carry a notification
//! side effect run the primary write and the notification in one
//! transaction.

pub mod lists;
pub mod notifications;
pub mod resets;
pub mod tasks;
pub mod users;

use sqlx::{Sqlite, SqlitePool, Transaction};

/// Opens a write transaction holding SQLite's write lock from the start, so
/// concurrent writers queue on the busy timeout instead of failing with
/// `SQLITE_BUSY` when their first write upgrades a read snapshot.
pub(crate) async fn begin_write(
    pool: &SqlitePool,
) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
    pool.begin_with("BEGIN IMMEDIATE").await
}
