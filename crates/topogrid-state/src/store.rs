//! ScheduleStore — redb-backed persistence for node schedules.
//!
//! Values are JSON records in `&[u8]` columns. The store can live on disk
//! or in memory (for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Thread-safe schedule store backed by redb.
#[derive(Clone)]
pub struct ScheduleStore {
    db: Arc<Database>,
}

impl ScheduleStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "schedule store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory schedule store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(SCHEDULES).map_err(map_err!(Table))?;
        txn.open_table(VM_MAPPINGS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Schedules ──────────────────────────────────────────────────

    pub fn put_schedule(&self, record: &ScheduleRecord) -> StateResult<()> {
        self.put(SCHEDULES, record.table_key(), record)?;
        debug!(node = %record.node, bytes = record.schedule.len(), "schedule stored");
        Ok(())
    }

    pub fn get_schedule(&self, node: &str) -> StateResult<Option<ScheduleRecord>> {
        self.get(SCHEDULES, node)
    }

    pub fn list_schedules(&self) -> StateResult<Vec<ScheduleRecord>> {
        self.list(SCHEDULES)
    }

    // ── VM mappings ────────────────────────────────────────────────

    pub fn put_mapping(&self, mapping: &VmMapping) -> StateResult<()> {
        self.put(VM_MAPPINGS, &mapping.table_key(), mapping)
    }

    pub fn get_mapping(&self, uuid: &uuid::Uuid) -> StateResult<Option<VmMapping>> {
        self.get(VM_MAPPINGS, &uuid.to_string())
    }

    pub fn list_mappings(&self) -> StateResult<Vec<VmMapping>> {
        self.list(VM_MAPPINGS)
    }

    /// Drop every schedule and mapping. Returns the number of records removed.
    pub fn clear(&self) -> StateResult<usize> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let mut removed = 0;
        for definition in [SCHEDULES, VM_MAPPINGS] {
            let mut table = txn.open_table(definition).map_err(map_err!(Table))?;
            let keys = table
                .iter()
                .map_err(map_err!(Read))?
                .map(|entry| entry.map(|(key, _)| key.value().to_string()))
                .collect::<Result<Vec<_>, _>>()
                .map_err(map_err!(Read))?;
            for key in &keys {
                table.remove(key.as_str()).map_err(map_err!(Write))?;
            }
            removed += keys.len();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(removed, "schedule store cleared");
        Ok(removed)
    }

    // ── Helpers ────────────────────────────────────────────────────

    fn put<T: Serialize>(&self, definition: JsonTable, key: &str, value: &T) -> StateResult<()> {
        let value = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(definition).map_err(map_err!(Table))?;
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, definition: JsonTable, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(definition).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let value = serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn list<T: DeserializeOwned>(&self, definition: JsonTable) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(definition).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?);
        }
        Ok(results)
    }
}
