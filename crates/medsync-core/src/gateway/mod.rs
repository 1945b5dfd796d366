//! Remote collection gateway
//!
//! Thin adapter boundary between the inventory core and a document store.
//! The gateway never looks inside documents; it moves them.
//!
//! ## Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  CollectionGateway (trait)                                      │
//! │  ├── subscribe(collection)  -> GatewaySubscription              │
//! │  │   └── State(full collection) ... | Error (terminal)          │
//! │  ├── list(collection)       -> Vec<Document>                    │
//! │  ├── new_document_id()      -> store-assigned id                │
//! │  ├── put(collection, doc)   -> upsert by id                     │
//! │  └── delete(collection, id) -> delete by id (unknown id is ok)  │
//! │                                                                 │
//! │  MemoryGateway: in-process store with fault injection           │
//! │  RedbGateway:   persistent local store backed by redb           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every emission on a subscription carries the *entire* collection, never
//! a delta. The first emission is the current contents at subscribe time.

mod hub;
mod local;
mod memory;

use async_trait::async_trait;
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::InventoryResult;
use crate::InventoryError;

pub use local::RedbGateway;
pub use memory::MemoryGateway;

/// Document body: a JSON object
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// A single record in a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Store key
    pub id: String,
    /// Record contents
    pub fields: Fields,
}

impl Document {
    /// Create a document from its id and fields
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Get a string field, if present and a string
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(|v| v.as_str())
    }
}

/// One emission on a gateway subscription
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    /// Full current contents of the collection
    State(Vec<Document>),
    /// The subscription failed; nothing follows this event
    Error(InventoryError),
}

/// A live subscription to one collection.
///
/// Dropping the subscription (or calling [`close`](Self::close)) releases it;
/// the gateway stops emitting to it immediately.
pub struct GatewaySubscription {
    collection: String,
    rx: mpsc::UnboundedReceiver<GatewayEvent>,
    cancel: CancellationToken,
    finished: bool,
}

impl GatewaySubscription {
    /// Build a subscription from a receiving channel and its release token.
    ///
    /// Gateway implementations keep the sender and a clone of the token; they
    /// must stop sending once the token is cancelled.
    pub fn new(
        collection: impl Into<String>,
        rx: mpsc::UnboundedReceiver<GatewayEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            collection: collection.into(),
            rx,
            cancel,
            finished: false,
        }
    }

    /// Collection this subscription watches
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Wait for the next emission.
    ///
    /// Returns `None` once the subscription is closed, after a terminal
    /// error has been delivered, or when the gateway dropped it.
    pub async fn next(&mut self) -> Option<GatewayEvent> {
        if self.finished {
            return None;
        }
        let event = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            event = self.rx.recv() => event,
        };
        match &event {
            Some(GatewayEvent::Error(_)) | None => {
                self.finished = true;
                self.cancel.cancel();
            }
            Some(GatewayEvent::State(_)) => {}
        }
        event
    }

    /// Release the subscription. Safe to call more than once.
    pub fn close(&mut self) {
        self.finished = true;
        self.cancel.cancel();
        self.rx.close();
    }

    /// Token that releases this subscription when cancelled.
    ///
    /// Lets an owner release the subscription synchronously from outside
    /// the task that is awaiting [`next`](Self::next).
    pub fn release_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Whether the subscription has been released.
    pub fn is_closed(&self) -> bool {
        self.finished || self.cancel.is_cancelled()
    }

    /// Adapt into a `Stream` of events.
    pub fn into_stream(self) -> impl Stream<Item = GatewayEvent> {
        stream::unfold(self, |mut sub| async move {
            let event = sub.next().await?;
            Some((event, sub))
        })
    }
}

impl Drop for GatewaySubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for GatewaySubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewaySubscription")
            .field("collection", &self.collection)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Adapter to a document store.
///
/// Implementations translate these calls into store calls and report
/// transport failures as [`InventoryError::Transport`] or
/// [`InventoryError::Timeout`]. They do not reconnect on their own.
#[async_trait]
pub trait CollectionGateway: Send + Sync {
    /// Open a full-state subscription on a collection.
    async fn subscribe(&self, collection: &str) -> InventoryResult<GatewaySubscription>;

    /// Read the full collection once.
    async fn list(&self, collection: &str) -> InventoryResult<Vec<Document>>;

    /// Reserve a fresh identifier for a new document.
    fn new_document_id(&self, collection: &str) -> String;

    /// Insert or replace the document with `doc.id`.
    async fn put(&self, collection: &str, doc: Document) -> InventoryResult<Document>;

    /// Delete by id. Deleting an id the store does not hold succeeds.
    async fn delete(&self, collection: &str, id: &str) -> InventoryResult<()>;
}
