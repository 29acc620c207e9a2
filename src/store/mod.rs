//! Durable home of the record set.
//!
//! The session treats the store as an overwrite-only blob: every mutation
//! saves the whole list, and a load that finds garbage comes back empty.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::Record;

pub mod format;
mod sqlite;

pub use sqlite::SqliteRecordStore;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Prepares the backing storage. Safe to call more than once.
    async fn initialize(&self) -> Result<()>;

    /// Returns the stored records in saved order. Malformed payloads load as
    /// an empty list; only an unreadable store is an error.
    async fn load(&self) -> Result<Vec<Record>>;

    /// Replaces the stored list with `records`.
    async fn save(&self, records: &[Record]) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}
