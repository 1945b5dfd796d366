//! Sync event types and status tracking
//!
//! ## Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  SyncStatus: engine connection state                            │
//! │  ├── Unsubscribed: no consumers, no gateway subscription        │
//! │  ├── Subscribing: opening the gateway subscription              │
//! │  ├── Live: receiving full-state emissions                       │
//! │  └── Error: subscription failed with error message              │
//! │                                                                 │
//! │  SyncEvent: what each registered consumer receives              │
//! │  ├── Snapshot: a new revision of the collection                 │
//! │  ├── StatusChanged: the engine moved to a new state             │
//! │  └── Error: the gateway subscription failed                     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;
use std::sync::Arc;

use crate::snapshot::{Revision, Snapshot};
use crate::InventoryError;

/// Connection state of a sync engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SyncStatus {
    /// No consumers are registered
    #[default]
    Unsubscribed,
    /// Opening the gateway subscription
    Subscribing,
    /// Receiving emissions
    Live,
    /// The subscription failed
    Error(String),
}

impl SyncStatus {
    pub fn is_live(&self) -> bool {
        matches!(self, SyncStatus::Live)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, SyncStatus::Error(_))
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::Unsubscribed => write!(f, "Unsubscribed"),
            SyncStatus::Subscribing => write!(f, "Subscribing"),
            SyncStatus::Live => write!(f, "Live"),
            SyncStatus::Error(msg) => write!(f, "Error: {}", msg),
        }
    }
}

/// Events delivered to registered consumers, in order
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A new snapshot was accepted
    Snapshot(Arc<Snapshot>),
    /// Engine status changed
    StatusChanged(SyncStatus),
    /// The gateway subscription failed
    Error {
        /// The gateway error
        error: InventoryError,
        /// Whether the engine is attempting a resubscription. When `false`
        /// the engine waits for [`SyncEngine::retry`](super::SyncEngine::retry).
        resubscribing: bool,
    },
}

impl SyncEvent {
    /// Revision carried by a snapshot event
    pub fn revision(&self) -> Option<Revision> {
        match self {
            SyncEvent::Snapshot(snapshot) => Some(snapshot.revision()),
            _ => None,
        }
    }

    /// The snapshot, if this is a snapshot event
    pub fn snapshot(&self) -> Option<&Arc<Snapshot>> {
        match self {
            SyncEvent::Snapshot(snapshot) => Some(snapshot),
            _ => None,
        }
    }
}
