//! Fan-out of full-collection emissions to live gateway subscriptions.
//!
//! Shared by the in-process gateways. Callers must invoke `publish` in the
//! same order their writes were applied (both gateways hold their write lock
//! across the write and the publish).

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{Document, GatewayEvent, GatewaySubscription};
use crate::InventoryError;

struct Subscriber {
    tx: mpsc::UnboundedSender<GatewayEvent>,
    released: CancellationToken,
}

impl Subscriber {
    fn is_live(&self) -> bool {
        !self.released.is_cancelled() && !self.tx.is_closed()
    }
}

#[derive(Default)]
pub(crate) struct SubscriberHub {
    subscribers: Mutex<HashMap<String, Vec<Subscriber>>>,
    opened: AtomicUsize,
}

impl SubscriberHub {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber and hand it the current contents as its first
    /// emission.
    pub(crate) fn register(&self, collection: &str, current: Vec<Document>) -> GatewaySubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let released = CancellationToken::new();
        // receiver is still alive here
        let _ = tx.send(GatewayEvent::State(current));

        let mut subscribers = self.subscribers.lock();
        let list = subscribers.entry(collection.to_string()).or_default();
        list.retain(Subscriber::is_live);
        list.push(Subscriber {
            tx,
            released: released.clone(),
        });
        let opened = self.opened.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(collection, opened, live = list.len(), "Gateway subscription opened");

        GatewaySubscription::new(collection, rx, released)
    }

    /// Send the new full contents to every live subscriber of `collection`.
    pub(crate) fn publish(&self, collection: &str, docs: &[Document]) {
        let mut subscribers = self.subscribers.lock();
        if let Some(list) = subscribers.get_mut(collection) {
            list.retain(|s| s.is_live() && s.tx.send(GatewayEvent::State(docs.to_vec())).is_ok());
        }
    }

    /// Deliver a terminal error to every live subscriber and drop them.
    ///
    /// With `collection == None` every collection is affected.
    pub(crate) fn fail(&self, collection: Option<&str>, error: &InventoryError) -> usize {
        let mut subscribers = self.subscribers.lock();
        let mut failed = 0;
        for (name, list) in subscribers.iter_mut() {
            if collection.is_some_and(|c| c != name.as_str()) {
                continue;
            }
            for sub in list.drain(..) {
                if sub.is_live() && sub.tx.send(GatewayEvent::Error(error.clone())).is_ok() {
                    failed += 1;
                }
            }
        }
        failed
    }

    /// Number of subscriptions ever opened.
    pub(crate) fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Number of subscriptions on `collection` not yet released.
    pub(crate) fn live(&self, collection: &str) -> usize {
        self.subscribers
            .lock()
            .get(collection)
            .map(|list| list.iter().filter(|s| s.is_live()).count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_emits_current_state() {
        let hub = SubscriberHub::new();
        let mut sub = hub.register("medicines", vec![Document::new("a", Default::default())]);

        match sub.next().await {
            Some(GatewayEvent::State(docs)) => assert_eq!(docs.len(), 1),
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(hub.opened(), 1);
        assert_eq!(hub.live("medicines"), 1);
    }

    #[tokio::test]
    async fn test_released_subscriber_is_pruned() {
        let hub = SubscriberHub::new();
        let sub = hub.register("medicines", vec![]);
        drop(sub);

        hub.publish("medicines", &[]);
        assert_eq!(hub.live("medicines"), 0);
        assert_eq!(hub.opened(), 1);
    }

    #[tokio::test]
    async fn test_fail_targets_one_collection() {
        let hub = SubscriberHub::new();
        let mut meds = hub.register("medicines", vec![]);
        let _cats = hub.register("categories", vec![]);

        let failed = hub.fail(Some("medicines"), &InventoryError::Transport("x".into()));
        assert_eq!(failed, 1);
        assert_eq!(hub.live("medicines"), 0);
        assert_eq!(hub.live("categories"), 1);

        assert!(matches!(meds.next().await, Some(GatewayEvent::State(_))));
        assert!(matches!(meds.next().await, Some(GatewayEvent::Error(_))));
        assert!(meds.next().await.is_none());
    }
}
