//! Snapshot synchronization layer
//!
//! Turns a gateway's full-state subscription into a revisioned, shared
//! snapshot that any number of local consumers can follow.
//!
//! ## Usage
//!
//! ```ignore
//! let engine = SyncEngine::new(gateway, "medicines");
//! let mut consumer = engine.register();
//!
//! while let Some(event) = consumer.recv().await {
//!     match event {
//!         SyncEvent::Snapshot(snapshot) => render(&snapshot),
//!         SyncEvent::Error { error, resubscribing: false } => {
//!             // engine gave up; back off, then
//!             engine.retry();
//!         }
//!         _ => {}
//!     }
//! }
//! ```

pub mod engine;
pub mod events;

pub use engine::{ConsumerId, SnapshotSubscription, SyncEngine};
pub use events::{SyncEvent, SyncStatus};
