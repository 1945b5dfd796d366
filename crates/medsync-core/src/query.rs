//! Expiration classification and snapshot queries.
//!
//! Everything here is a pure function of its arguments. Status buckets depend
//! on the caller's `now`, so they are recomputed on every call and never
//! stored alongside the items.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::snapshot::Snapshot;
use crate::types::Item;

/// Items expiring within this window of `now` are "expiring soon"
pub const EXPIRING_SOON_DAYS: i64 = 30;

/// Time-relative expiration state of an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusBucket {
    NoExpiration,
    Expired,
    ExpiringSoon,
    Nominal,
}

impl fmt::Display for StatusBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusBucket::NoExpiration => write!(f, "no-expiration"),
            StatusBucket::Expired => write!(f, "expired"),
            StatusBucket::ExpiringSoon => write!(f, "expiring-soon"),
            StatusBucket::Nominal => write!(f, "nominal"),
        }
    }
}

impl FromStr for StatusBucket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "no-expiration" => Ok(StatusBucket::NoExpiration),
            "expired" => Ok(StatusBucket::Expired),
            "expiring-soon" | "soon" => Ok(StatusBucket::ExpiringSoon),
            "nominal" | "ok" => Ok(StatusBucket::Nominal),
            _ => Err(format!(
                "Invalid bucket '{}'. Must be one of: expired, expiring-soon, nominal, none",
                s
            )),
        }
    }
}

/// Classify with the default 30-day window.
///
/// The window is inclusive: an item expiring exactly `now + 30 days` is
/// still expiring soon. An item expiring exactly at `now` is expiring soon,
/// not expired.
pub fn classify(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> StatusBucket {
    classify_within(expires_at, now, Duration::days(EXPIRING_SOON_DAYS))
}

/// Classify with a custom expiring-soon window.
pub fn classify_within(
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    window: Duration,
) -> StatusBucket {
    match expires_at {
        None => StatusBucket::NoExpiration,
        Some(t) if t < now => StatusBucket::Expired,
        Some(t) if t <= now + window => StatusBucket::ExpiringSoon,
        Some(_) => StatusBucket::Nominal,
    }
}

/// Whole days until expiration, rounded toward negative infinity.
///
/// Negative for expired items, `None` without an expiration.
pub fn days_left(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<i64> {
    let remaining = expires_at? - now;
    let secs = remaining.num_seconds();
    Some(secs.div_euclid(86_400))
}

/// Category restriction of a query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CategoryFilter {
    /// Every item, including uncategorized ones
    #[default]
    All,
    /// Items whose category equals this name exactly
    Named(String),
}

impl CategoryFilter {
    /// Parse user input; `"all"` (any case) or an empty string mean `All`.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("all") {
            CategoryFilter::All
        } else {
            CategoryFilter::Named(raw.to_string())
        }
    }

    pub fn matches(&self, category: &str) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Named(name) => name == category,
        }
    }
}

/// Query parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryFilter {
    /// Case-insensitive substring over name and description; empty matches all
    pub text: String,
    pub category: CategoryFilter,
    /// Only return items in this bucket
    pub bucket: Option<StatusBucket>,
}

impl QueryFilter {
    /// Filter matching every item
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_category(mut self, category: CategoryFilter) -> Self {
        self.category = category;
        self
    }

    pub fn with_bucket(mut self, bucket: StatusBucket) -> Self {
        self.bucket = Some(bucket);
        self
    }

    fn matches_text(&self, needle: &str, item: &Item) -> bool {
        needle.is_empty()
            || item.name.to_lowercase().contains(needle)
            || item
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(needle))
    }
}

/// An item together with its derived status
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedItem {
    pub item: Item,
    pub bucket: StatusBucket,
    pub days_left: Option<i64>,
}

/// Filter, classify and order a snapshot.
///
/// Results are sorted by expiration ascending; items without an expiration
/// come last. Ties keep snapshot (arrival) order.
pub fn evaluate(
    snapshot: &Snapshot,
    now: DateTime<Utc>,
    filter: &QueryFilter,
) -> Vec<ClassifiedItem> {
    evaluate_within(snapshot, now, filter, Duration::days(EXPIRING_SOON_DAYS))
}

/// [`evaluate`] with a custom expiring-soon window.
pub fn evaluate_within(
    snapshot: &Snapshot,
    now: DateTime<Utc>,
    filter: &QueryFilter,
    window: Duration,
) -> Vec<ClassifiedItem> {
    let needle = filter.text.trim().to_lowercase();

    let mut results: Vec<ClassifiedItem> = snapshot
        .iter()
        .filter(|item| filter.category.matches(&item.category))
        .filter(|item| filter.matches_text(&needle, item))
        .map(|item| ClassifiedItem {
            bucket: classify_within(item.expires_at, now, window),
            days_left: days_left(item.expires_at, now),
            item: item.clone(),
        })
        .filter(|c| filter.bucket.map_or(true, |b| c.bucket == b))
        .collect();

    // stable sort keeps arrival order among equal keys
    results.sort_by(|a, b| compare_expiration(a.item.expires_at, b.item.expires_at));
    results
}

fn compare_expiration(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Per-bucket item counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BucketCounts {
    pub no_expiration: usize,
    pub expired: usize,
    pub expiring_soon: usize,
    pub nominal: usize,
}

impl BucketCounts {
    pub fn total(&self) -> usize {
        self.no_expiration + self.expired + self.expiring_soon + self.nominal
    }

    pub fn get(&self, bucket: StatusBucket) -> usize {
        match bucket {
            StatusBucket::NoExpiration => self.no_expiration,
            StatusBucket::Expired => self.expired,
            StatusBucket::ExpiringSoon => self.expiring_soon,
            StatusBucket::Nominal => self.nominal,
        }
    }
}

/// Count every item in the snapshot by bucket.
pub fn summarize(snapshot: &Snapshot, now: DateTime<Utc>) -> BucketCounts {
    summarize_within(snapshot, now, Duration::days(EXPIRING_SOON_DAYS))
}

pub fn summarize_within(snapshot: &Snapshot, now: DateTime<Utc>, window: Duration) -> BucketCounts {
    let mut counts = BucketCounts::default();
    for item in snapshot {
        match classify_within(item.expires_at, now, window) {
            StatusBucket::NoExpiration => counts.no_expiration += 1,
            StatusBucket::Expired => counts.expired += 1,
            StatusBucket::ExpiringSoon => counts.expiring_soon += 1,
            StatusBucket::Nominal => counts.nominal += 1,
        }
    }
    counts
}
