//! Write path: create, update and delete items through the gateway.
//!
//! The coordinator never touches the snapshot. A successful call means the
//! store accepted the write; the change shows up locally when the sync
//! engine receives the store's next emission.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::error::InventoryResult;
use crate::gateway::CollectionGateway;
use crate::types::{Item, ItemId};
use crate::InventoryError;

/// Default capacity for the completion broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Kind of completed write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteAction {
    Added,
    Updated,
    Deleted,
}

impl std::fmt::Display for WriteAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteAction::Added => write!(f, "Added"),
            WriteAction::Updated => write!(f, "Updated"),
            WriteAction::Deleted => write!(f, "Deleted"),
        }
    }
}

/// Published after the store accepted a write
#[derive(Debug, Clone, PartialEq)]
pub struct WriteEvent {
    pub action: WriteAction,
    pub id: ItemId,
    /// Item name at the time of the write (empty for deletes by id)
    pub name: String,
    pub at: DateTime<Utc>,
}

/// Executes writes against the item collection
#[derive(Clone)]
pub struct WriteCoordinator {
    gateway: Arc<dyn CollectionGateway>,
    collection: String,
    event_tx: broadcast::Sender<WriteEvent>,
}

impl WriteCoordinator {
    pub fn new(gateway: Arc<dyn CollectionGateway>, collection: impl Into<String>) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            gateway,
            collection: collection.into(),
            event_tx,
        }
    }

    /// Subscribe to write completions.
    ///
    /// Multiple subscribers can exist; events are broadcast to all.
    pub fn subscribe(&self) -> broadcast::Receiver<WriteEvent> {
        self.event_tx.subscribe()
    }

    /// Persist a new item.
    ///
    /// Assigns a store identifier when the draft has none and stamps the
    /// creation instant. Returns the item as stored.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a blank name (no gateway call is made); any
    /// store error is passed through unchanged.
    pub async fn insert(&self, draft: Item) -> InventoryResult<Item> {
        validate_name(&draft)?;

        let mut item = draft;
        if item.id.is_empty() {
            item.id = ItemId::new(self.gateway.new_document_id(&self.collection));
        }
        item.created_at = Utc::now();

        self.gateway
            .put(&self.collection, item.to_document())
            .await?;
        info!(id = %item.id, name = %item.name, "Item inserted");
        self.publish(WriteAction::Added, &item.id, &item.name);
        Ok(item)
    }

    /// Replace an existing item with `item` (full record, last write wins).
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an empty id or blank name; store errors such as
    /// `NotFound` are passed through.
    pub async fn update(&self, item: Item) -> InventoryResult<Item> {
        if item.id.is_empty() {
            return Err(InventoryError::InvalidArgument(
                "update requires an item id".to_string(),
            ));
        }
        validate_name(&item)?;

        self.gateway
            .put(&self.collection, item.to_document())
            .await?;
        info!(id = %item.id, name = %item.name, "Item updated");
        self.publish(WriteAction::Updated, &item.id, &item.name);
        Ok(item)
    }

    /// Delete an item. An item without an id was never stored, so this
    /// succeeds without contacting the store.
    pub async fn delete(&self, item: &Item) -> InventoryResult<()> {
        self.delete_inner(&item.id, &item.name).await
    }

    /// Delete by identifier; an empty id is a successful no-op.
    pub async fn delete_by_id(&self, id: &ItemId) -> InventoryResult<()> {
        self.delete_inner(id, "").await
    }

    async fn delete_inner(&self, id: &ItemId, name: &str) -> InventoryResult<()> {
        if id.is_empty() {
            debug!("Delete skipped: item has no id");
            return Ok(());
        }
        self.gateway.delete(&self.collection, id.as_str()).await?;
        info!(%id, "Item deleted");
        self.publish(WriteAction::Deleted, id, name);
        Ok(())
    }

    fn publish(&self, action: WriteAction, id: &ItemId, name: &str) {
        // no receivers is fine
        let _ = self.event_tx.send(WriteEvent {
            action,
            id: id.clone(),
            name: name.to_string(),
            at: Utc::now(),
        });
    }
}

fn validate_name(item: &Item) -> InventoryResult<()> {
    if item.name.trim().is_empty() {
        return Err(InventoryError::InvalidArgument(
            "item name must not be empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;

    fn coordinator() -> (Arc<MemoryGateway>, WriteCoordinator) {
        let gateway = Arc::new(MemoryGateway::new());
        let writer = WriteCoordinator::new(gateway.clone(), "medicines");
        (gateway, writer)
    }

    #[tokio::test]
    async fn test_insert_assigns_id() {
        let (gateway, writer) = coordinator();
        let item = writer.insert(Item::new("Aspirin")).await.unwrap();
        assert!(!item.id.is_empty());

        let docs = gateway.documents("medicines");
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, item.id.as_str());
    }

    #[tokio::test]
    async fn test_insert_keeps_client_assigned_id() {
        let (_gateway, writer) = coordinator();
        let mut draft = Item::new("Aspirin");
        draft.id = ItemId::new("client-1");
        let item = writer.insert(draft).await.unwrap();
        assert_eq!(item.id.as_str(), "client-1");
    }

    #[tokio::test]
    async fn test_insert_blank_name_rejected_before_store() {
        let (gateway, writer) = coordinator();
        gateway.fail_next_write(InventoryError::Transport("should not be reached".into()));

        let err = writer.insert(Item::new("   ")).await.unwrap_err();
        assert!(matches!(err, InventoryError::InvalidArgument(_)));
        // the injected fault is still pending, so the gateway was never called
        assert!(writer.insert(Item::new("x")).await.is_err());
    }

    #[tokio::test]
    async fn test_update_requires_id() {
        let (_gateway, writer) = coordinator();
        let err = writer.update(Item::new("Aspirin")).await.unwrap_err();
        assert!(matches!(err, InventoryError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_update_preserves_id_and_created_at() {
        let (_gateway, writer) = coordinator();
        let item = writer.insert(Item::new("Aspirin")).await.unwrap();

        let mut edited = item.clone();
        edited.name = "Aspirin Cardio".into();
        let updated = writer.update(edited).await.unwrap();
        assert_eq!(updated.id, item.id);
        assert_eq!(updated.created_at, item.created_at);
    }

    #[tokio::test]
    async fn test_delete_without_id_is_noop() {
        let (gateway, writer) = coordinator();
        gateway.fail_next_write(InventoryError::Transport("should not be reached".into()));
        writer.delete(&Item::new("draft")).await.unwrap();
        writer.delete_by_id(&ItemId::empty()).await.unwrap();
    }

    #[tokio::test]
    async fn test_store_errors_pass_through() {
        let (gateway, writer) = coordinator();
        let item = writer.insert(Item::new("Aspirin")).await.unwrap();

        gateway.fail_next_write(InventoryError::NotFound(item.id.to_string()));
        let err = writer.update(item.clone()).await.unwrap_err();
        assert_eq!(err, InventoryError::NotFound(item.id.to_string()));
    }

    #[tokio::test]
    async fn test_completions_are_published() {
        let (_gateway, writer) = coordinator();
        let mut events = writer.subscribe();

        let item = writer.insert(Item::new("Aspirin")).await.unwrap();
        writer.update(item.clone()).await.unwrap();
        writer.delete(&item).await.unwrap();

        let actions: Vec<_> = (0..3)
            .map(|_| events.try_recv().unwrap().action)
            .collect();
        assert_eq!(
            actions,
            vec![WriteAction::Added, WriteAction::Updated, WriteAction::Deleted]
        );
    }

    #[tokio::test]
    async fn test_failed_write_publishes_nothing() {
        let (gateway, writer) = coordinator();
        let mut events = writer.subscribe();

        gateway.fail_next_write(InventoryError::Transport("offline".into()));
        assert!(writer.insert(Item::new("Aspirin")).await.is_err());
        assert!(events.try_recv().is_err());
    }
}
