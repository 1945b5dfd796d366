//! Persistent local gateway using redb.
//!
//! Stands in for the managed document store when running on a single
//! machine (the CLI uses it). Each collection is one redb table keyed by
//! document id; values are JSON records carrying an arrival sequence so
//! emissions keep insertion order. Subscribers in the same process are
//! notified after every committed write.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use redb::{Database, ReadableTable, TableDefinition, TableError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use ulid::Ulid;

use super::hub::SubscriberHub;
use super::{CollectionGateway, Document, Fields, GatewaySubscription};
use crate::error::InventoryResult;
use crate::InventoryError;

/// Next arrival sequence per collection
const SEQUENCE_TABLE: TableDefinition<&str, u64> = TableDefinition::new("medsync_sequences");

/// Prefix keeping collection tables apart from bookkeeping tables
const COLLECTION_PREFIX: &str = "collection:";

#[derive(Serialize, Deserialize)]
struct StoredRecord {
    seq: u64,
    fields: Fields,
}

/// Gateway persisting collections in a redb database file
pub struct RedbGateway {
    db: Arc<Database>,
    hub: SubscriberHub,
    /// Serializes write + publish so emissions follow commit order
    write_lock: Mutex<()>,
}

impl RedbGateway {
    /// Open (or create) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> InventoryResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(path)?;
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(SEQUENCE_TABLE)?;
        }
        write_txn.commit()?;
        info!(?path, "Opened local document store");

        Ok(Self {
            db: Arc::new(db),
            hub: SubscriberHub::new(),
            write_lock: Mutex::new(()),
        })
    }

    fn table_name(collection: &str) -> String {
        format!("{}{}", COLLECTION_PREFIX, collection)
    }

    /// Read a whole collection in arrival order.
    fn read_collection(&self, collection: &str) -> InventoryResult<Vec<Document>> {
        let name = Self::table_name(collection);
        let definition: TableDefinition<&str, &[u8]> = TableDefinition::new(&name);

        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(definition) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for entry in table.iter()? {
            let (key, value) = entry?;
            let id = key.value().to_string();
            match serde_json::from_slice::<StoredRecord>(value.value()) {
                Ok(record) => records.push((record.seq, Document::new(id, record.fields))),
                Err(e) => {
                    // Keep the record so consumers still see the id; its
                    // fields default downstream.
                    warn!(collection, %id, error = %e, "Unreadable stored record");
                    records.push((u64::MAX, Document::new(id, Fields::new())));
                }
            }
        }
        records.sort_by_key(|(seq, _)| *seq);
        Ok(records.into_iter().map(|(_, doc)| doc).collect())
    }

    /// Subscriptions on `collection` that have not been released.
    pub fn live_subscriptions(&self, collection: &str) -> usize {
        self.hub.live(collection)
    }
}

#[async_trait]
impl CollectionGateway for RedbGateway {
    async fn subscribe(&self, collection: &str) -> InventoryResult<GatewaySubscription> {
        let _guard = self.write_lock.lock();
        let current = self.read_collection(collection)?;
        Ok(self.hub.register(collection, current))
    }

    async fn list(&self, collection: &str) -> InventoryResult<Vec<Document>> {
        self.read_collection(collection)
    }

    fn new_document_id(&self, _collection: &str) -> String {
        Ulid::new().to_string()
    }

    async fn put(&self, collection: &str, doc: Document) -> InventoryResult<Document> {
        if doc.id.is_empty() {
            return Err(InventoryError::InvalidArgument(
                "document id must not be empty".to_string(),
            ));
        }

        let _guard = self.write_lock.lock();
        let name = Self::table_name(collection);
        let definition: TableDefinition<&str, &[u8]> = TableDefinition::new(&name);

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(definition)?;
            let mut sequences = write_txn.open_table(SEQUENCE_TABLE)?;

            let existing_seq = match table.get(doc.id.as_str())? {
                Some(value) => serde_json::from_slice::<StoredRecord>(value.value())
                    .ok()
                    .map(|r| r.seq),
                None => None,
            };
            let seq = match existing_seq {
                Some(seq) => seq,
                None => {
                    let next = sequences.get(collection)?.map(|v| v.value()).unwrap_or(0);
                    sequences.insert(collection, next + 1)?;
                    next
                }
            };

            let record = StoredRecord {
                seq,
                fields: doc.fields.clone(),
            };
            let bytes = serde_json::to_vec(&record)?;
            table.insert(doc.id.as_str(), bytes.as_slice())?;
        }
        write_txn.commit()?;
        debug!(collection, id = %doc.id, "Document committed");

        let docs = self.read_collection(collection)?;
        self.hub.publish(collection, &docs);
        Ok(doc)
    }

    async fn delete(&self, collection: &str, id: &str) -> InventoryResult<()> {
        let _guard = self.write_lock.lock();
        let name = Self::table_name(collection);
        let definition: TableDefinition<&str, &[u8]> = TableDefinition::new(&name);

        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(definition)?;
            let removed = table.remove(id)?.is_some();
            removed
        };
        write_txn.commit()?;

        if removed {
            debug!(collection, id, "Document removed");
            let docs = self.read_collection(collection)?;
            self.hub.publish(collection, &docs);
        }
        Ok(())
    }
}
