//! Core types for medsync

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::gateway::{Document, Fields};

mod measure;

pub use measure::Measure;

// Persisted field names, shared with existing records in the collection.
const FIELD_NAME: &str = "name";
const FIELD_DOSAGE: &str = "dosage";
const FIELD_QUANTITY: &str = "quantity";
const FIELD_CATEGORY: &str = "category";
const FIELD_MANUFACTURER: &str = "manufacturer";
const FIELD_DESCRIPTION: &str = "description";
const FIELD_EXPIRATION: &str = "expirationDate";
const FIELD_ADDED: &str = "addedDate";

/// Opaque identifier for an item
///
/// Assigned by the store (or the write path) exactly once, when the item is
/// first created. An empty id marks a draft that has never been persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(String);

impl ItemId {
    /// Wrap an existing identifier string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id of an item that has not been persisted yet
    pub fn empty() -> Self {
        Self(String::new())
    }

    /// Get the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this id has been assigned
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A tracked inventory item (a medicine in the home pharmacy)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Store identifier (empty until first persisted)
    pub id: ItemId,
    /// Display name
    pub name: String,
    /// Dose per unit, e.g. 500 mg
    pub dosage: Measure,
    /// Package contents, e.g. 20 tablets
    pub quantity: Measure,
    /// Category name (soft reference into the category directory)
    pub category: String,
    /// Manufacturer, free text
    pub manufacturer: String,
    /// Optional notes
    pub description: Option<String>,
    /// Expiration instant; `None` means no known expiration
    pub expires_at: Option<DateTime<Utc>>,
    /// When the item was first created; never changes afterwards
    pub created_at: DateTime<Utc>,
}

impl Item {
    /// Create an unsaved item with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ItemId::empty(),
            name: name.into(),
            dosage: Measure::default(),
            quantity: Measure::default(),
            category: String::new(),
            manufacturer: String::new(),
            description: None,
            expires_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_dosage(mut self, dosage: Measure) -> Self {
        self.dosage = dosage;
        self
    }

    pub fn with_quantity(mut self, quantity: Measure) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = manufacturer.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_expiration(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Build an item from a store document.
    ///
    /// Never fails: missing or mistyped fields fall back to empty/absent
    /// values so one bad record cannot poison a whole snapshot.
    pub fn from_document(doc: &Document) -> Self {
        let fields = &doc.fields;
        let description = string_field(fields, FIELD_DESCRIPTION);
        Self {
            id: ItemId::new(doc.id.clone()),
            name: string_field(fields, FIELD_NAME),
            dosage: Measure::parse(&string_field(fields, FIELD_DOSAGE)),
            quantity: Measure::parse(&string_field(fields, FIELD_QUANTITY)),
            category: string_field(fields, FIELD_CATEGORY),
            manufacturer: string_field(fields, FIELD_MANUFACTURER),
            description: (!description.is_empty()).then_some(description),
            expires_at: timestamp_field(fields, FIELD_EXPIRATION),
            created_at: timestamp_field(fields, FIELD_ADDED)
                .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        }
    }

    /// Convert to the persisted document layout.
    pub fn to_document(&self) -> Document {
        let mut fields = Fields::new();
        fields.insert(FIELD_NAME.into(), Value::String(self.name.clone()));
        fields.insert(FIELD_DOSAGE.into(), Value::String(self.dosage.to_persisted()));
        fields.insert(FIELD_QUANTITY.into(), Value::String(self.quantity.to_persisted()));
        fields.insert(FIELD_CATEGORY.into(), Value::String(self.category.clone()));
        fields.insert(FIELD_MANUFACTURER.into(), Value::String(self.manufacturer.clone()));
        fields.insert(
            FIELD_DESCRIPTION.into(),
            Value::String(self.description.clone().unwrap_or_default()),
        );
        fields.insert(
            FIELD_EXPIRATION.into(),
            self.expires_at
                .map(|t| Value::String(t.to_rfc3339()))
                .unwrap_or(Value::Null),
        );
        fields.insert(FIELD_ADDED.into(), Value::String(self.created_at.to_rfc3339()));
        Document {
            id: self.id.as_str().to_string(),
            fields,
        }
    }
}

/// Read a string field, treating anything else as empty.
fn string_field(fields: &Fields, key: &str) -> String {
    match fields.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Read a timestamp written by any client generation.
///
/// Accepts RFC 3339 strings, epoch milliseconds, and
/// `{ "seconds": .., "nanoseconds": .. }` objects.
fn timestamp_field(fields: &Fields, key: &str) -> Option<DateTime<Utc>> {
    match fields.get(key)? {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        Value::Object(obj) => {
            let secs = obj.get("seconds").and_then(Value::as_i64)?;
            let nanos = obj
                .get("nanoseconds")
                .and_then(Value::as_u64)
                .unwrap_or(0);
            DateTime::from_timestamp(secs, u32::try_from(nanos).ok()?)
        }
        _ => None,
    }
}
