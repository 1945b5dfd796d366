//! Inventory configuration.
//!
//! Read from a JSON file; every field is optional and falls back to the
//! defaults below, so `{}` is a valid configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::InventoryResult;
use crate::query::EXPIRING_SOON_DAYS;
use crate::InventoryError;

pub const DEFAULT_ITEMS_COLLECTION: &str = "medicines";
pub const DEFAULT_CATEGORIES_COLLECTION: &str = "categories";
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;
pub const DEFAULT_INSTANCE: &str = "medsync";
pub const DEFAULT_SUBSCRIBE_TIMEOUT_MS: u64 = 10_000;

/// File name of the local store inside the data directory
pub const STORE_FILE: &str = "medsync.redb";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InventoryConfig {
    /// Where the local store lives. Unset means the caller picks.
    pub data_dir: Option<PathBuf>,
    pub items_collection: String,
    pub categories_collection: String,
    /// Maximum number of action log entries kept
    pub history_capacity: usize,
    /// Width of the expiring-soon window in days
    pub expiring_soon_days: i64,
    /// Name used for per-instance log files
    pub instance: String,
    /// Limit on how long opening a subscription may take; `None` waits forever
    pub subscribe_timeout_ms: Option<u64>,
    /// Reject item writes naming a category the directory does not know
    pub require_known_category: bool,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            items_collection: DEFAULT_ITEMS_COLLECTION.to_string(),
            categories_collection: DEFAULT_CATEGORIES_COLLECTION.to_string(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            expiring_soon_days: EXPIRING_SOON_DAYS,
            instance: DEFAULT_INSTANCE.to_string(),
            subscribe_timeout_ms: Some(DEFAULT_SUBSCRIBE_TIMEOUT_MS),
            require_known_category: false,
        }
    }
}

impl InventoryConfig {
    /// Load and validate a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> InventoryResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| InventoryError::Config(format!("{}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| InventoryError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn validate(&self) -> InventoryResult<()> {
        if self.items_collection.trim().is_empty() || self.categories_collection.trim().is_empty()
        {
            return Err(InventoryError::Config(
                "collection names must not be empty".to_string(),
            ));
        }
        if self.items_collection == self.categories_collection {
            return Err(InventoryError::Config(
                "items and categories must use different collections".to_string(),
            ));
        }
        if self.history_capacity == 0 {
            return Err(InventoryError::Config(
                "historyCapacity must be at least 1".to_string(),
            ));
        }
        if self.expiring_soon_days < 0 {
            return Err(InventoryError::Config(
                "expiringSoonDays must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    pub fn expiring_soon_window(&self) -> chrono::Duration {
        chrono::Duration::days(self.expiring_soon_days)
    }

    pub fn subscribe_timeout(&self) -> Option<Duration> {
        self.subscribe_timeout_ms.map(Duration::from_millis)
    }

    /// Path of the local store, if a data directory is set.
    pub fn store_path(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| dir.join(STORE_FILE))
    }
}
