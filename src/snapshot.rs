//! Durable copy of the last loaded zone data.
//!
//! One entry per apex in an embedded redb database: the key is the apex
//! name, the value the zone's record list as JSON. The store is read once at
//! startup to answer queries before the first live fetch completes.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use thiserror::Error;
use tracing::{debug, warn};

use crate::zone::ingest::normalize_name;
use crate::zone::{Record, ZoneDocument};

const ZONES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("zones");

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, SnapshotError>;

#[derive(Clone)]
pub struct SnapshotStore {
    db: Arc<Database>,
}

impl SnapshotStore {
    /// Open or create the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::create(path)
            .map_err(|e| SnapshotError::Database(format!("failed to open database: {}", e)))?;

        let write_txn = db
            .begin_write()
            .map_err(|e| SnapshotError::Database(format!("failed to begin transaction: {}", e)))?;
        write_txn
            .open_table(ZONES_TABLE)
            .map_err(|e| SnapshotError::Database(format!("failed to create zones table: {}", e)))?;
        write_txn
            .commit()
            .map_err(|e| SnapshotError::Database(format!("failed to commit: {}", e)))?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Every stored zone. Entries that no longer decode are skipped.
    pub fn read_zones(&self) -> Result<ZoneDocument> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| SnapshotError::Database(format!("failed to begin read: {}", e)))?;
        let table = read_txn
            .open_table(ZONES_TABLE)
            .map_err(|e| SnapshotError::Database(format!("failed to open table: {}", e)))?;

        let mut zones = ZoneDocument::new();
        for entry in table
            .iter()
            .map_err(|e| SnapshotError::Database(format!("iter failed: {}", e)))?
        {
            let (key, value) = entry
                .map_err(|e| SnapshotError::Database(format!("entry read failed: {}", e)))?;
            match serde_json::from_slice::<Vec<Record>>(value.value()) {
                Ok(records) => {
                    zones.insert(key.value().to_string(), records);
                }
                Err(e) => warn!("Ignoring unreadable snapshot entry {}: {}", key.value(), e),
            }
        }
        debug!("Read {} zones from snapshot", zones.len());
        Ok(zones)
    }

    /// Store `zones`, replacing the entries of the same apexes. With `flush`
    /// every other entry is removed first, in the same transaction.
    pub fn write_zones(&self, zones: &ZoneDocument, flush: bool) -> Result<()> {
        let mut encoded = Vec::with_capacity(zones.len());
        for (apex, records) in zones {
            let bytes = serde_json::to_vec(records).map_err(|e| {
                SnapshotError::Serialization(format!("failed to serialize {}: {}", apex, e))
            })?;
            let key = normalize_name(apex).unwrap_or_else(|_| apex.clone());
            encoded.push((key, bytes));
        }

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| SnapshotError::Database(format!("failed to begin write: {}", e)))?;
        if flush {
            write_txn
                .delete_table(ZONES_TABLE)
                .map_err(|e| SnapshotError::Database(format!("failed to flush zones: {}", e)))?;
        }
        {
            let mut table = write_txn
                .open_table(ZONES_TABLE)
                .map_err(|e| SnapshotError::Database(format!("failed to open table: {}", e)))?;
            for (key, bytes) in &encoded {
                table
                    .insert(key.as_str(), bytes.as_slice())
                    .map_err(|e| SnapshotError::Database(format!("insert failed: {}", e)))?;
            }
        }
        write_txn
            .commit()
            .map_err(|e| SnapshotError::Database(format!("commit failed: {}", e)))?;

        debug!("Wrote {} zones to snapshot (flush: {})", encoded.len(), flush);
        Ok(())
    }
}
