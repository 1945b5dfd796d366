//! Live snapshot engine for one collection
//!
//! The `SyncEngine` keeps a single gateway subscription open while at least
//! one consumer is registered, turns every full-state emission into a new
//! [`Snapshot`] revision and pushes it to every consumer in emission order.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  SyncEngine                                                     │
//! │  ├── state: Mutex<EngineState>                                  │
//! │  │   ├── snapshot: Arc<Snapshot>   (swapped, never mutated)     │
//! │  │   ├── consumers: id -> unbounded sender                      │
//! │  │   └── pump: generation + cancellation of the live task       │
//! │  └── pump task (one per subscription lifetime)                  │
//! │      └── gateway.subscribe -> apply each emission under lock    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Lifecycle
//!
//! `Unsubscribed -> Subscribing -> Live -> (Error -> Subscribing | Unsubscribed)`
//!
//! - First `register()` starts the pump; later registrations share it. A
//!   registration while the engine has given up counts as a fresh attempt.
//! - Last consumer leaving cancels the pump and releases the gateway
//!   subscription.
//! - A gateway error is surfaced to every consumer and followed by exactly
//!   one resubscription. A successful emission restores that allowance; if
//!   the resubscription fails first, the engine stays in `Error` until
//!   [`SyncEngine::retry`] is called.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::events::{SyncEvent, SyncStatus};
use crate::gateway::{CollectionGateway, Document, GatewayEvent, GatewaySubscription};
use crate::snapshot::Snapshot;
use crate::InventoryError;

/// Identifies one registered consumer
pub type ConsumerId = u64;

/// Handle to the running pump task
struct PumpHandle {
    generation: u64,
    cancel: CancellationToken,
    /// Release token of the gateway subscription currently held by the pump
    subscription: Option<CancellationToken>,
}

struct EngineState {
    status: SyncStatus,
    snapshot: Arc<Snapshot>,
    consumers: HashMap<ConsumerId, mpsc::UnboundedSender<SyncEvent>>,
    next_consumer: ConsumerId,
    pump: Option<PumpHandle>,
    generation: u64,
}

impl EngineState {
    fn broadcast(&self, event: SyncEvent) {
        for tx in self.consumers.values() {
            // A consumer that dropped its receiver without unregistering is
            // removed by its own Drop; nothing to do here.
            let _ = tx.send(event.clone());
        }
    }

    fn set_status(&mut self, status: SyncStatus) {
        if self.status != status {
            self.status = status.clone();
            self.broadcast(SyncEvent::StatusChanged(status));
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.pump
            .as_ref()
            .is_some_and(|pump| pump.generation == generation)
    }
}

struct Shared {
    gateway: Arc<dyn CollectionGateway>,
    collection: String,
    subscribe_timeout: Mutex<Option<Duration>>,
    state: Mutex<EngineState>,
}

/// Keeps a live snapshot of one collection and fans it out to consumers
///
/// # Example
///
/// ```ignore
/// let engine = SyncEngine::new(gateway, "medicines");
///
/// let mut consumer = engine.register();
/// while let Some(snapshot) = consumer.next_snapshot().await {
///     println!("revision {} has {} items", snapshot.revision(), snapshot.len());
/// }
/// ```
#[derive(Clone)]
pub struct SyncEngine {
    shared: Arc<Shared>,
}

impl SyncEngine {
    /// Create an engine for `collection`. Nothing is opened until the first
    /// consumer registers.
    pub fn new(gateway: Arc<dyn CollectionGateway>, collection: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                gateway,
                collection: collection.into(),
                subscribe_timeout: Mutex::new(None),
                state: Mutex::new(EngineState {
                    status: SyncStatus::Unsubscribed,
                    snapshot: Arc::new(Snapshot::empty()),
                    consumers: HashMap::new(),
                    next_consumer: 1,
                    pump: None,
                    generation: 0,
                }),
            }),
        }
    }

    /// Fail a `subscribe` call that takes longer than `timeout` with
    /// [`InventoryError::Timeout`].
    pub fn with_subscribe_timeout(self, timeout: Duration) -> Self {
        self.set_subscribe_timeout(Some(timeout));
        self
    }

    /// Change the subscribe timeout for every clone of this engine.
    ///
    /// Applies from the next subscription attempt on; `None` waits forever.
    pub fn set_subscribe_timeout(&self, timeout: Option<Duration>) {
        *self.shared.subscribe_timeout.lock() = timeout;
    }

    pub fn subscribe_timeout(&self) -> Option<Duration> {
        *self.shared.subscribe_timeout.lock()
    }

    /// Collection this engine follows
    pub fn collection(&self) -> &str {
        &self.shared.collection
    }

    /// Latest snapshot (read-most-recent access)
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.shared.state.lock().snapshot.clone()
    }

    /// Current engine status
    pub fn status(&self) -> SyncStatus {
        self.shared.state.lock().status.clone()
    }

    /// Number of registered consumers
    pub fn consumer_count(&self) -> usize {
        self.shared.state.lock().consumers.len()
    }

    /// Register a consumer.
    ///
    /// The first registration opens the gateway subscription, and so does a
    /// registration while the engine is halted in `Error`. If a snapshot has
    /// already been received, the new consumer gets it as its first event.
    /// Must be called from within a tokio runtime.
    pub fn register(&self) -> SnapshotSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.shared.state.lock();

        let id = state.next_consumer;
        state.next_consumer += 1;

        if state.snapshot.revision() > 0 {
            let _ = tx.send(SyncEvent::Snapshot(state.snapshot.clone()));
        }
        let idle = state.pump.is_none();
        state.consumers.insert(id, tx);
        debug!(
            collection = %self.shared.collection,
            consumer = id,
            consumers = state.consumers.len(),
            "Consumer registered"
        );

        if idle {
            Shared::start_pump(&self.shared, &mut state);
        }

        SnapshotSubscription {
            id,
            rx,
            engine: Some(self.shared.clone()),
        }
    }

    /// Restart the subscription after the engine gave up on an error.
    ///
    /// Returns `true` if a new subscription attempt was started. No-op when
    /// there are no consumers or a subscription is already running.
    pub fn retry(&self) -> bool {
        let mut state = self.shared.state.lock();
        if state.consumers.is_empty() || state.pump.is_some() {
            return false;
        }
        info!(collection = %self.shared.collection, "Retrying subscription");
        Shared::start_pump(&self.shared, &mut state);
        true
    }

    /// Drop every consumer and release the gateway subscription.
    ///
    /// Consumers see their event stream end.
    pub fn shutdown(&self) {
        let mut state = self.shared.state.lock();
        state.consumers.clear();
        Shared::teardown(&self.shared.collection, &mut state);
    }
}

impl Shared {
    fn start_pump(shared: &Arc<Shared>, state: &mut EngineState) {
        state.generation += 1;
        let generation = state.generation;
        let cancel = CancellationToken::new();
        state.pump = Some(PumpHandle {
            generation,
            cancel: cancel.clone(),
            subscription: None,
        });
        state.set_status(SyncStatus::Subscribing);
        info!(collection = %shared.collection, generation, "Starting subscription");

        let shared = shared.clone();
        tokio::spawn(async move {
            shared.pump(generation, cancel).await;
        });
    }

    fn teardown(collection: &str, state: &mut EngineState) {
        if let Some(pump) = state.pump.take() {
            pump.cancel.cancel();
            if let Some(subscription) = pump.subscription {
                subscription.cancel();
            }
        }
        state.generation += 1;
        state.set_status(SyncStatus::Unsubscribed);
        info!(collection, "Subscription torn down");
    }

    fn unregister(&self, id: ConsumerId) {
        let mut state = self.state.lock();
        if state.consumers.remove(&id).is_none() {
            return;
        }
        debug!(
            collection = %self.collection,
            consumer = id,
            consumers = state.consumers.len(),
            "Consumer unregistered"
        );
        if state.consumers.is_empty() {
            Self::teardown(&self.collection, &mut state);
        }
    }

    async fn pump(&self, generation: u64, cancel: CancellationToken) {
        let mut resubscribe_allowed = true;
        loop {
            let error = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                error = self.follow(generation, &mut resubscribe_allowed) => error,
            };

            let resubscribing = resubscribe_allowed;
            resubscribe_allowed = false;
            if !self.surface_error(generation, error, resubscribing) || !resubscribing {
                return;
            }
        }
    }

    /// Subscribe and apply emissions until the subscription fails.
    async fn follow(&self, generation: u64, resubscribe_allowed: &mut bool) -> InventoryError {
        {
            let mut state = self.state.lock();
            if !state.is_current(generation) {
                return InventoryError::Transport("subscription superseded".into());
            }
            state.set_status(SyncStatus::Subscribing);
        }

        let mut subscription = match self.open_subscription().await {
            Ok(subscription) => subscription,
            Err(e) => return e,
        };
        {
            let mut state = self.state.lock();
            match state.pump.as_mut() {
                Some(pump) if pump.generation == generation => {
                    pump.subscription = Some(subscription.release_handle());
                }
                _ => {
                    subscription.close();
                    return InventoryError::Transport("subscription superseded".into());
                }
            }
        }

        loop {
            match subscription.next().await {
                Some(GatewayEvent::State(docs)) => {
                    if !self.apply(generation, &docs) {
                        return InventoryError::Transport("subscription superseded".into());
                    }
                    *resubscribe_allowed = true;
                }
                Some(GatewayEvent::Error(error)) => return error,
                None => {
                    return InventoryError::Transport(
                        "subscription closed by gateway".to_string(),
                    )
                }
            }
        }
    }

    async fn open_subscription(&self) -> Result<GatewaySubscription, InventoryError> {
        let subscribe = self.gateway.subscribe(&self.collection);
        let timeout = *self.subscribe_timeout.lock();
        match timeout {
            Some(timeout) => tokio::time::timeout(timeout, subscribe)
                .await
                .map_err(|_| {
                    InventoryError::Timeout(format!(
                        "subscribe to '{}' exceeded {:?}",
                        self.collection, timeout
                    ))
                })?,
            None => subscribe.await,
        }
    }

    /// Replace the snapshot with a new revision and broadcast it.
    ///
    /// Returns `false` if this pump has been superseded.
    fn apply(&self, generation: u64, docs: &[Document]) -> bool {
        let mut state = self.state.lock();
        if !state.is_current(generation) {
            return false;
        }

        let revision = state.snapshot.revision() + 1;
        let snapshot = Arc::new(Snapshot::from_documents(revision, docs));
        state.snapshot = snapshot.clone();
        state.set_status(SyncStatus::Live);
        state.broadcast(SyncEvent::Snapshot(snapshot));
        debug!(
            collection = %self.collection,
            revision,
            documents = docs.len(),
            consumers = state.consumers.len(),
            "Snapshot published"
        );
        true
    }

    /// Report a subscription failure to consumers.
    ///
    /// Returns `false` if this pump has been superseded.
    fn surface_error(&self, generation: u64, error: InventoryError, resubscribing: bool) -> bool {
        let mut state = self.state.lock();
        if !state.is_current(generation) {
            return false;
        }

        warn!(
            collection = %self.collection,
            %error,
            resubscribing,
            "Gateway subscription failed"
        );
        if let Some(pump) = state.pump.as_mut() {
            pump.subscription = None;
        }
        state.set_status(SyncStatus::Error(error.to_string()));
        state.broadcast(SyncEvent::Error {
            error,
            resubscribing,
        });
        if !resubscribing {
            // keep the generation so a stale task cannot publish, but free
            // the slot for retry()
            state.pump = None;
        }
        true
    }
}

/// A registered consumer of snapshot events
///
/// Unregisters on drop. [`unregister`](Self::unregister) may be called any
/// number of times, including after the engine shut down.
pub struct SnapshotSubscription {
    id: ConsumerId,
    rx: mpsc::UnboundedReceiver<SyncEvent>,
    engine: Option<Arc<Shared>>,
}

impl SnapshotSubscription {
    pub fn id(&self) -> ConsumerId {
        self.id
    }

    /// Wait for the next event. `None` once unregistered or shut down.
    pub async fn recv(&mut self) -> Option<SyncEvent> {
        if self.engine.is_none() {
            return None;
        }
        self.rx.recv().await
    }

    /// Take an already-delivered event without waiting.
    pub fn try_recv(&mut self) -> Option<SyncEvent> {
        self.rx.try_recv().ok()
    }

    /// Wait for the next snapshot, skipping status and error events.
    pub async fn next_snapshot(&mut self) -> Option<Arc<Snapshot>> {
        loop {
            match self.recv().await? {
                SyncEvent::Snapshot(snapshot) => return Some(snapshot),
                _ => continue,
            }
        }
    }

    /// Stop receiving events.
    pub fn unregister(&mut self) {
        if let Some(engine) = self.engine.take() {
            engine.unregister(self.id);
            self.rx.close();
        }
    }
}

impl Drop for SnapshotSubscription {
    fn drop(&mut self) {
        self.unregister();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;

    fn engine() -> (Arc<MemoryGateway>, SyncEngine) {
        let gateway = Arc::new(MemoryGateway::new());
        let engine = SyncEngine::new(gateway.clone(), "medicines");
        (gateway, engine)
    }

    #[tokio::test]
    async fn test_engine_starts_unsubscribed() {
        let (gateway, engine) = engine();
        assert_eq!(engine.status(), SyncStatus::Unsubscribed);
        assert_eq!(engine.snapshot().revision(), 0);
        assert_eq!(gateway.subscriptions_opened(), 0);
    }

    #[tokio::test]
    async fn test_first_registration_goes_live() {
        let (_gateway, engine) = engine();
        let mut consumer = engine.register();

        let snapshot = consumer.next_snapshot().await.unwrap();
        assert_eq!(snapshot.revision(), 1);
        assert!(snapshot.is_empty());
        assert_eq!(engine.status(), SyncStatus::Live);
    }

    #[tokio::test]
    async fn test_unregister_is_idempotent() {
        let (_gateway, engine) = engine();
        let mut consumer = engine.register();
        consumer.unregister();
        consumer.unregister();
        assert_eq!(engine.consumer_count(), 0);
        assert_eq!(engine.status(), SyncStatus::Unsubscribed);
        assert!(consumer.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_retry_without_consumers_is_noop() {
        let (_gateway, engine) = engine();
        assert!(!engine.retry());
    }

    #[tokio::test]
    async fn test_shutdown_ends_streams() {
        let (_gateway, engine) = engine();
        let mut consumer = engine.register();
        consumer.next_snapshot().await.unwrap();

        engine.shutdown();
        assert_eq!(engine.status(), SyncStatus::Unsubscribed);
        // drain any status event already queued, then the stream ends
        while consumer.recv().await.is_some() {}
        consumer.unregister();
    }
}
