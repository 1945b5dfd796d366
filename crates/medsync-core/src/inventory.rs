//! Inventory: every component wired over one gateway.
//!
//! ```ignore
//! let inventory = Inventory::open_local(InventoryConfig::default().with_data_dir("./data"))?;
//! inventory.insert(Item::new("Aspirin")).await?;
//!
//! let snapshot = inventory.load_snapshot().await?;
//! for row in inventory.evaluate(&snapshot, Utc::now(), &QueryFilter::all()) {
//!     println!("{} {}", row.item.name, row.bucket);
//! }
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::info;

use crate::categories::CategoryDirectory;
use crate::config::InventoryConfig;
use crate::error::InventoryResult;
use crate::gateway::{CollectionGateway, RedbGateway};
use crate::history::ActionLog;
use crate::query::{evaluate_within, summarize_within, BucketCounts, ClassifiedItem, QueryFilter};
use crate::snapshot::Snapshot;
use crate::sync::{SnapshotSubscription, SyncEngine, SyncEvent};
use crate::types::Item;
use crate::writer::WriteCoordinator;
use crate::InventoryError;

pub struct Inventory {
    config: InventoryConfig,
    gateway: Arc<dyn CollectionGateway>,
    sync: SyncEngine,
    writer: WriteCoordinator,
    categories: CategoryDirectory,
    history: ActionLog,
    history_task: JoinHandle<()>,
}

impl Inventory {
    /// Build an inventory over `gateway`.
    ///
    /// Starts the action log follower, so this must run inside a tokio
    /// runtime.
    pub fn new(
        config: InventoryConfig,
        gateway: Arc<dyn CollectionGateway>,
    ) -> InventoryResult<Self> {
        config.validate()?;

        let sync = SyncEngine::new(gateway.clone(), config.items_collection.clone());
        sync.set_subscribe_timeout(config.subscribe_timeout());
        let writer = WriteCoordinator::new(gateway.clone(), config.items_collection.clone());
        let categories =
            CategoryDirectory::new(gateway.clone(), config.categories_collection.clone());
        let history = ActionLog::new(config.history_capacity);
        let history_task = history.follow(writer.subscribe());

        info!(
            items = %config.items_collection,
            categories = %config.categories_collection,
            "Inventory ready"
        );

        Ok(Self {
            config,
            gateway,
            sync,
            writer,
            categories,
            history,
            history_task,
        })
    }

    /// Open the redb-backed store under `config.data_dir`.
    pub fn open_local(config: InventoryConfig) -> InventoryResult<Self> {
        let path = config
            .store_path()
            .ok_or_else(|| InventoryError::Config("no data directory configured".to_string()))?;
        let gateway = RedbGateway::open(&path)?;
        info!(path = %path.display(), "Opened local store");
        Self::new(config, Arc::new(gateway))
    }

    pub fn config(&self) -> &InventoryConfig {
        &self.config
    }

    pub fn gateway(&self) -> &Arc<dyn CollectionGateway> {
        &self.gateway
    }

    pub fn sync(&self) -> &SyncEngine {
        &self.sync
    }

    pub fn writer(&self) -> &WriteCoordinator {
        &self.writer
    }

    pub fn categories(&self) -> &CategoryDirectory {
        &self.categories
    }

    pub fn history(&self) -> &ActionLog {
        &self.history
    }

    /// Insert an item after checking its category.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `require_known_category` is set and the item
    /// names a category the directory does not list; otherwise whatever
    /// [`WriteCoordinator::insert`] returns.
    pub async fn insert(&self, item: Item) -> InventoryResult<Item> {
        self.check_category(&item).await?;
        self.writer.insert(item).await
    }

    /// Replace an existing item after checking its category.
    pub async fn update(&self, item: Item) -> InventoryResult<Item> {
        self.check_category(&item).await?;
        self.writer.update(item).await
    }

    async fn check_category(&self, item: &Item) -> InventoryResult<()> {
        let category = item.category.trim();
        if !self.config.require_known_category || category.is_empty() {
            return Ok(());
        }
        if self.categories.contains(category).await? {
            Ok(())
        } else {
            Err(InventoryError::InvalidArgument(format!(
                "unknown category: {}",
                category
            )))
        }
    }

    /// Register a consumer of item snapshots.
    pub fn watch(&self) -> SnapshotSubscription {
        self.sync.register()
    }

    /// Wait for the store's current state.
    ///
    /// Registers a short-lived consumer and returns the first snapshot it
    /// receives. Fails with the gateway error if the engine gives up.
    pub async fn load_snapshot(&self) -> InventoryResult<Arc<Snapshot>> {
        let mut consumer = self.sync.register();
        while let Some(event) = consumer.recv().await {
            match event {
                SyncEvent::Snapshot(snapshot) => return Ok(snapshot),
                SyncEvent::Error {
                    error,
                    resubscribing: false,
                } => return Err(error),
                _ => {}
            }
        }
        Err(InventoryError::Transport(
            "sync engine stopped before delivering a snapshot".to_string(),
        ))
    }

    /// Classify and filter `snapshot` using the configured window.
    pub fn evaluate(
        &self,
        snapshot: &Snapshot,
        now: DateTime<Utc>,
        filter: &QueryFilter,
    ) -> Vec<ClassifiedItem> {
        evaluate_within(snapshot, now, filter, self.config.expiring_soon_window())
    }

    /// Query the most recent snapshot the engine holds.
    ///
    /// Empty until a consumer is registered and the first emission arrived.
    pub fn query(&self, now: DateTime<Utc>, filter: &QueryFilter) -> Vec<ClassifiedItem> {
        self.evaluate(&self.sync.snapshot(), now, filter)
    }

    pub fn summary(&self, now: DateTime<Utc>) -> BucketCounts {
        summarize_within(&self.sync.snapshot(), now, self.config.expiring_soon_window())
    }

    /// Release the subscription and stop the action log follower.
    pub fn shutdown(&self) {
        self.sync.shutdown();
        self.history_task.abort();
    }
}

impl Drop for Inventory {
    fn drop(&mut self) {
        self.history_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;
    use crate::query::StatusBucket;
    use crate::types::Item;
    use crate::writer::WriteAction;
    use chrono::Duration;
    use tempfile::TempDir;

    fn memory_inventory() -> (Arc<MemoryGateway>, Inventory) {
        let gateway = Arc::new(MemoryGateway::new());
        let inventory = Inventory::new(InventoryConfig::default(), gateway.clone()).unwrap();
        (gateway, inventory)
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_open_local_requires_data_dir() {
        let err = Inventory::open_local(InventoryConfig::default()).err().unwrap();
        assert!(matches!(err, InventoryError::Config(_)));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = InventoryConfig {
            history_capacity: 0,
            ..Default::default()
        };
        let gateway = Arc::new(MemoryGateway::new());
        assert!(Inventory::new(config, gateway).is_err());
    }

    #[tokio::test]
    async fn test_writes_reach_snapshot_and_history() {
        let (_gateway, inventory) = memory_inventory();
        let now = Utc::now();

        let mut consumer = inventory.watch();
        assert_eq!(consumer.next_snapshot().await.unwrap().len(), 0);

        inventory
            .writer()
            .insert(Item::new("Aspirin").with_expiration(now + Duration::days(5)))
            .await
            .unwrap();
        let snapshot = consumer.next_snapshot().await.unwrap();
        assert_eq!(snapshot.len(), 1);

        let rows = inventory.query(now, &QueryFilter::all());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].bucket, StatusBucket::ExpiringSoon);
        assert_eq!(inventory.summary(now).expiring_soon, 1);

        settle().await;
        let history = inventory.history().entries();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, WriteAction::Added);
    }

    #[tokio::test]
    async fn test_configured_window_applies() {
        let gateway = Arc::new(MemoryGateway::new());
        let config = InventoryConfig {
            expiring_soon_days: 3,
            ..Default::default()
        };
        let inventory = Inventory::new(config, gateway).unwrap();
        let now = Utc::now();
        inventory
            .writer()
            .insert(Item::new("Aspirin").with_expiration(now + Duration::days(5)))
            .await
            .unwrap();

        let snapshot = inventory.load_snapshot().await.unwrap();
        let rows = inventory.evaluate(&snapshot, now, &QueryFilter::all());
        assert_eq!(rows[0].bucket, StatusBucket::Nominal);
    }

    #[tokio::test]
    async fn test_load_snapshot_surfaces_subscribe_failure() {
        let (gateway, inventory) = memory_inventory();
        gateway.fail_next_subscribes(2);
        let err = inventory.load_snapshot().await.unwrap_err();
        assert!(err.is_gateway_error());
    }

    #[tokio::test]
    async fn test_unknown_category_rejected_when_required() {
        let gateway = Arc::new(MemoryGateway::new());
        let config = InventoryConfig {
            require_known_category: true,
            ..Default::default()
        };
        let inventory = Inventory::new(config, gateway.clone()).unwrap();
        inventory.categories().add("Vitamins").await.unwrap();

        let err = inventory
            .insert(Item::new("Aspirin").with_category("Painkillers"))
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::InvalidArgument(_)));
        assert!(gateway.documents("medicines").is_empty());

        let stored = inventory
            .insert(Item::new("Vitamin C").with_category(" Vitamins "))
            .await
            .unwrap();
        inventory.insert(Item::new("Plaster")).await.unwrap();

        let mut edited = stored.clone();
        edited.category = "Antibiotics".into();
        assert!(inventory.update(edited).await.is_err());
        assert_eq!(gateway.documents("medicines").len(), 2);
    }

    #[tokio::test]
    async fn test_categories_are_soft_by_default() {
        let (gateway, inventory) = memory_inventory();
        inventory
            .insert(Item::new("Aspirin").with_category("Painkillers"))
            .await
            .unwrap();
        assert_eq!(gateway.documents("medicines").len(), 1);
    }

    #[tokio::test]
    async fn test_load_snapshot_after_halt_tries_again() {
        let (gateway, inventory) = memory_inventory();
        gateway.fail_next_subscribes(2);
        let mut watcher = inventory.watch();
        assert!(inventory.load_snapshot().await.is_err());

        // the watcher keeps the engine halted in Error; a new load retries
        assert!(inventory.sync().status().is_error());
        let snapshot = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            inventory.load_snapshot(),
        )
        .await
        .expect("load_snapshot hung")
        .unwrap();
        assert_eq!(snapshot.revision(), 1);
        assert_eq!(watcher.next_snapshot().await.unwrap().revision(), 1);
    }

    #[tokio::test]
    async fn test_open_local_persists_between_instances() {
        let temp = TempDir::new().unwrap();
        let config = InventoryConfig::default().with_data_dir(temp.path());

        {
            let inventory = Inventory::open_local(config.clone()).unwrap();
            inventory.writer().insert(Item::new("Aspirin")).await.unwrap();
            inventory.categories().add("Painkillers").await.unwrap();
            inventory.shutdown();
        }
        // let the cancelled pump release its database handle
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let inventory = Inventory::open_local(config).unwrap();
        let snapshot = inventory.load_snapshot().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.items()[0].name, "Aspirin");
        assert_eq!(
            inventory.categories().list().await.unwrap(),
            vec!["Painkillers"]
        );
    }
}
