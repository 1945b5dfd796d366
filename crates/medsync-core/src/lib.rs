//! medsync core library
//!
//! Shared medicine inventory kept in sync with a remote document store.
//!
//! ## Overview
//!
//! The store holds two collections: items (medicines) and category names.
//! A [`SyncEngine`] keeps one live subscription to the item collection and
//! turns every full-state emission into a new revision of an in-memory
//! [`Snapshot`]. Writes go straight to the store through the
//! [`WriteCoordinator`]; they become visible locally when the store echoes
//! them back. Queries are pure functions over a snapshot and a clock reading.
//!
//! ## Core Principles
//!
//! - **Store is the source of truth**: the snapshot is only ever replaced by
//!   an emission, never patched by a local write
//! - **One subscription per collection**: shared by every consumer, opened
//!   on first registration and closed on last unregistration
//! - **Time is an input**: classification takes `now` explicitly
//!
//! ## Quick Start
//!
//! ```ignore
//! use medsync_core::{Inventory, InventoryConfig, Item, QueryFilter, StatusBucket};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = InventoryConfig::default().with_data_dir("~/.medsync/data");
//!     let inventory = Inventory::open_local(config)?;
//!
//!     inventory.writer().insert(Item::new("Paracetamol")).await?;
//!
//!     let snapshot = inventory.load_snapshot().await?;
//!     let filter = QueryFilter::all().with_bucket(StatusBucket::ExpiringSoon);
//!     for row in inventory.evaluate(&snapshot, chrono::Utc::now(), &filter) {
//!         println!("{} ({:?} days)", row.item.name, row.days_left);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod categories;
pub mod config;
pub mod error;
pub mod gateway;
pub mod history;
pub mod inventory;
pub mod logging;
pub mod query;
pub mod snapshot;
pub mod sync;
pub mod types;
pub mod writer;

// Re-exports
pub use categories::CategoryDirectory;
pub use config::InventoryConfig;
pub use error::{InventoryError, InventoryResult};
pub use gateway::{
    CollectionGateway, Document, Fields, GatewayEvent, GatewaySubscription, MemoryGateway,
    RedbGateway,
};
pub use history::{ActionEntry, ActionLog};
pub use inventory::Inventory;
pub use query::{
    classify, days_left, evaluate, evaluate_within, summarize, summarize_within, BucketCounts,
    CategoryFilter, ClassifiedItem, QueryFilter, StatusBucket, EXPIRING_SOON_DAYS,
};
pub use snapshot::{Revision, Snapshot};
pub use sync::{SnapshotSubscription, SyncEngine, SyncEvent, SyncStatus};
pub use types::*;
pub use writer::{WriteAction, WriteCoordinator, WriteEvent};
