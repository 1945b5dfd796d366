//! Category directory: the list of known category names.
//!
//! Backed by its own collection of `{ "name": ... }` documents. The store may
//! hold the same name more than once; `list` collapses duplicates.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use crate::error::InventoryResult;
use crate::gateway::{CollectionGateway, Document, Fields};
use crate::InventoryError;

const FIELD_NAME: &str = "name";

/// Reads and appends category names
#[derive(Clone)]
pub struct CategoryDirectory {
    gateway: Arc<dyn CollectionGateway>,
    collection: String,
}

impl CategoryDirectory {
    pub fn new(gateway: Arc<dyn CollectionGateway>, collection: impl Into<String>) -> Self {
        Self {
            gateway,
            collection: collection.into(),
        }
    }

    /// Distinct category names in first-seen order.
    ///
    /// Documents without a usable name are ignored.
    pub async fn list(&self) -> InventoryResult<Vec<String>> {
        let docs = self.gateway.list(&self.collection).await?;
        let mut seen = HashSet::new();
        let names: Vec<String> = docs
            .iter()
            .filter_map(|doc| doc.str_field(FIELD_NAME))
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .filter(|name| seen.insert(name.to_string()))
            .map(str::to_string)
            .collect();
        debug!(collection = %self.collection, count = names.len(), "Listed categories");
        Ok(names)
    }

    /// Add a category name. Adding an existing name is allowed; it stays
    /// listed once.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a blank name; store errors pass through.
    pub async fn add(&self, name: &str) -> InventoryResult<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(InventoryError::InvalidArgument(
                "category name must not be empty".to_string(),
            ));
        }

        let mut fields = Fields::new();
        fields.insert(FIELD_NAME.to_string(), Value::String(name.to_string()));
        let id = self.gateway.new_document_id(&self.collection);
        self.gateway
            .put(&self.collection, Document::new(id, fields))
            .await?;
        info!(collection = %self.collection, name, "Category added");
        Ok(())
    }

    /// Whether `name` is a known category.
    pub async fn contains(&self, name: &str) -> InventoryResult<bool> {
        let name = name.trim();
        Ok(self.list().await?.iter().any(|n| n == name))
    }
}
