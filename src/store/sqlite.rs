use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{info, warn};

use crate::db::Database;
use crate::models::Record;

use super::{format, RecordStore};

const RECORDS_KEY: &str = "records";

/// Keeps the whole record list as one JSON value in the `kv_store` table.
#[derive(Clone)]
pub struct SqliteRecordStore {
    db: Database,
}

impl SqliteRecordStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn open(path: PathBuf) -> Result<Self> {
        let db = Database::new(path).context("failed to open record database")?;
        info!("Record store at {}", db.path().display());
        Ok(Self::new(db))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn initialize(&self) -> Result<()> {
        self.db.ping().await
    }

    async fn load(&self) -> Result<Vec<Record>> {
        let Some(stored) = self.db.get_value(RECORDS_KEY).await? else {
            return Ok(Vec::new());
        };

        match format::decode(&stored.value) {
            Ok(decoded) => {
                if decoded.skipped > 0 {
                    warn!(
                        "Skipped {} malformed record(s) while loading",
                        decoded.skipped
                    );
                }
                if decoded.legacy {
                    info!("Loaded unversioned record payload; it will be upgraded on next save");
                }
                Ok(decoded.records)
            }
            Err(err) => {
                warn!("Stored records unreadable, starting empty: {err:#}");
                Ok(Vec::new())
            }
        }
    }

    async fn save(&self, records: &[Record]) -> Result<()> {
        let payload = format::encode(records)?;
        self.db
            .put_value(RECORDS_KEY, payload)
            .await
            .with_context(|| format!("failed to save {} record(s)", records.len()))
    }

    async fn clear(&self) -> Result<()> {
        self.db.delete_value(RECORDS_KEY).await?;
        Ok(())
    }
}
