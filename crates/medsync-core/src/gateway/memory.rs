//! In-process gateway.
//!
//! Behaves like the managed document store (full-state emissions, upsert by
//! id, idempotent delete) without any network. Tests use its fault hooks to
//! simulate dropped connections and failed writes.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};
use ulid::Ulid;

use super::hub::SubscriberHub;
use super::{CollectionGateway, Document, GatewaySubscription};
use crate::error::InventoryResult;
use crate::InventoryError;

#[derive(Default)]
struct Faults {
    /// Number of upcoming `subscribe` calls that fail
    failing_subscribes: usize,
    /// Error returned by the next `put` or `delete`
    next_write_error: Option<InventoryError>,
}

/// Gateway backed by in-memory, insertion-ordered collections
#[derive(Default)]
pub struct MemoryGateway {
    collections: Mutex<HashMap<String, Vec<Document>>>,
    hub: SubscriberHub,
    faults: Mutex<Faults>,
}

impl MemoryGateway {
    /// Create an empty gateway
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` subscribe calls fail with a transport error.
    pub fn fail_next_subscribes(&self, count: usize) {
        self.faults.lock().failing_subscribes = count;
    }

    /// Make the next write (`put` or `delete`) fail with `error`.
    pub fn fail_next_write(&self, error: InventoryError) {
        self.faults.lock().next_write_error = Some(error);
    }

    /// Drop every live subscription on `collection` with a terminal error.
    ///
    /// Returns how many subscriptions were affected.
    pub fn disconnect(&self, collection: &str, error: InventoryError) -> usize {
        warn!(collection, %error, "Dropping gateway subscriptions");
        self.hub.fail(Some(collection), &error)
    }

    /// Total subscriptions opened over the gateway's lifetime.
    pub fn subscriptions_opened(&self) -> usize {
        self.hub.opened()
    }

    /// Subscriptions on `collection` that have not been released.
    pub fn live_subscriptions(&self, collection: &str) -> usize {
        self.hub.live(collection)
    }

    /// Current contents of `collection`, without going through the trait.
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.collections
            .lock()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    fn take_write_fault(&self) -> InventoryResult<()> {
        match self.faults.lock().next_write_error.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CollectionGateway for MemoryGateway {
    async fn subscribe(&self, collection: &str) -> InventoryResult<GatewaySubscription> {
        {
            let mut faults = self.faults.lock();
            if faults.failing_subscribes > 0 {
                faults.failing_subscribes -= 1;
                return Err(InventoryError::Transport(format!(
                    "subscribe to '{}' refused",
                    collection
                )));
            }
        }

        // Hold the collection lock so no write lands between the snapshot
        // and the registration.
        let collections = self.collections.lock();
        let current = collections.get(collection).cloned().unwrap_or_default();
        Ok(self.hub.register(collection, current))
    }

    async fn list(&self, collection: &str) -> InventoryResult<Vec<Document>> {
        Ok(self.documents(collection))
    }

    fn new_document_id(&self, _collection: &str) -> String {
        Ulid::new().to_string()
    }

    async fn put(&self, collection: &str, doc: Document) -> InventoryResult<Document> {
        self.take_write_fault()?;
        if doc.id.is_empty() {
            return Err(InventoryError::InvalidArgument(
                "document id must not be empty".to_string(),
            ));
        }

        let mut collections = self.collections.lock();
        let docs = collections.entry(collection.to_string()).or_default();
        match docs.iter_mut().find(|d| d.id == doc.id) {
            Some(existing) => *existing = doc.clone(),
            None => docs.push(doc.clone()),
        }
        debug!(collection, id = %doc.id, total = docs.len(), "Document stored");
        self.hub.publish(collection, docs);
        Ok(doc)
    }

    async fn delete(&self, collection: &str, id: &str) -> InventoryResult<()> {
        self.take_write_fault()?;

        let mut collections = self.collections.lock();
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(());
        };
        let before = docs.len();
        docs.retain(|d| d.id != id);
        if docs.len() != before {
            debug!(collection, id, total = docs.len(), "Document deleted");
            self.hub.publish(collection, docs);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{Fields, GatewayEvent};
    use serde_json::json;

    fn doc(id: &str, name: &str) -> Document {
        let mut fields = Fields::new();
        fields.insert("name".into(), json!(name));
        Document::new(id, fields)
    }

    async fn next_state(sub: &mut GatewaySubscription) -> Vec<Document> {
        match sub.next().await {
            Some(GatewayEvent::State(docs)) => docs,
            other => panic!("expected state, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_put_upserts_in_arrival_order() {
        let gw = MemoryGateway::new();
        gw.put("medicines", doc("b", "B")).await.unwrap();
        gw.put("medicines", doc("a", "A")).await.unwrap();
        gw.put("medicines", doc("b", "B2")).await.unwrap();

        let docs = gw.list("medicines").await.unwrap();
        let ids: Vec<_> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(docs[0].str_field("name"), Some("B2"));
    }

    #[tokio::test]
    async fn test_subscription_sees_every_change() {
        let gw = MemoryGateway::new();
        gw.put("medicines", doc("a", "A")).await.unwrap();

        let mut sub = gw.subscribe("medicines").await.unwrap();
        assert_eq!(next_state(&mut sub).await.len(), 1);

        gw.put("medicines", doc("b", "B")).await.unwrap();
        assert_eq!(next_state(&mut sub).await.len(), 2);

        gw.delete("medicines", "a").await.unwrap();
        let docs = next_state(&mut sub).await;
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "b");
    }

    #[tokio::test]
    async fn test_delete_unknown_is_ok_and_silent() {
        let gw = MemoryGateway::new();
        gw.delete("medicines", "ghost").await.unwrap();

        gw.put("medicines", doc("a", "A")).await.unwrap();
        let mut sub = gw.subscribe("medicines").await.unwrap();
        next_state(&mut sub).await;

        gw.delete("medicines", "ghost").await.unwrap();
        gw.put("medicines", doc("c", "C")).await.unwrap();
        // the no-op delete produced no emission
        assert_eq!(next_state(&mut sub).await.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_id_rejected() {
        let gw = MemoryGateway::new();
        let err = gw.put("medicines", doc("", "A")).await.unwrap_err();
        assert!(matches!(err, InventoryError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let gw = MemoryGateway::new();

        gw.fail_next_subscribes(1);
        assert!(gw.subscribe("medicines").await.is_err());
        assert!(gw.subscribe("medicines").await.is_ok());

        gw.fail_next_write(InventoryError::NotFound("a".into()));
        let err = gw.put("medicines", doc("a", "A")).await.unwrap_err();
        assert_eq!(err, InventoryError::NotFound("a".into()));
        assert!(gw.put("medicines", doc("a", "A")).await.is_ok());
    }

    #[tokio::test]
    async fn test_disconnect_delivers_terminal_error() {
        let gw = MemoryGateway::new();
        let mut sub = gw.subscribe("medicines").await.unwrap();
        next_state(&mut sub).await;

        assert_eq!(
            gw.disconnect("medicines", InventoryError::Transport("reset".into())),
            1
        );
        assert!(matches!(sub.next().await, Some(GatewayEvent::Error(_))));
        assert!(sub.next().await.is_none());
        assert_eq!(gw.live_subscriptions("medicines"), 0);
    }

    #[tokio::test]
    async fn test_new_document_ids_are_unique() {
        let gw = MemoryGateway::new();
        let a = gw.new_document_id("medicines");
        let b = gw.new_document_id("medicines");
        assert!(!a.is_empty());
        assert_ne!(a, b);
    }
}
