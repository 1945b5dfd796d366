//! Property-based tests for classification and queries
//!
//! Uses proptest to check that `evaluate` is a pure, ordered filter over a
//! snapshot for arbitrary item sets and clock readings.

use chrono::{DateTime, Duration, TimeZone, Utc};
use medsync_core::{
    classify, days_left, evaluate, summarize, CategoryFilter, Item, ItemId, QueryFilter,
    Snapshot, StatusBucket,
};
use proptest::prelude::*;

// ============================================================================
// Strategy Generators
// ============================================================================

fn base_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 15, 12, 0, 0).unwrap()
}

/// Expiration offsets in seconds around `now`, or none
fn expiration_strategy() -> impl Strategy<Value = Option<i64>> {
    prop_oneof![
        1 => Just(None),
        4 => (-400 * 86_400i64..400 * 86_400i64).prop_map(Some),
        1 => prop::sample::select(vec![-1i64, 0, 1, 30 * 86_400, 30 * 86_400 + 1]).prop_map(Some),
    ]
}

fn category_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["", "Vitamins", "Painkillers", "Cold"]).prop_map(String::from)
}

fn items_strategy(max: usize) -> impl Strategy<Value = Vec<Item>> {
    prop::collection::vec(
        (
            "[a-zA-Z ]{1,12}",
            category_strategy(),
            expiration_strategy(),
        ),
        0..max,
    )
    .prop_map(|rows| {
        let now = base_now();
        rows.into_iter()
            .enumerate()
            .map(|(i, (name, category, offset))| {
                let mut item = Item::new(name).with_category(category);
                item.id = ItemId::new(format!("id-{i:04}"));
                item.expires_at = offset.map(|s| now + Duration::seconds(s));
                item
            })
            .collect()
    })
}

fn bucket_strategy() -> impl Strategy<Value = Option<StatusBucket>> {
    prop::option::of(prop::sample::select(vec![
        StatusBucket::NoExpiration,
        StatusBucket::Expired,
        StatusBucket::ExpiringSoon,
        StatusBucket::Nominal,
    ]))
}

fn filter_strategy() -> impl Strategy<Value = QueryFilter> {
    ("[a-z]{0,2}", category_strategy(), bucket_strategy()).prop_map(|(text, category, bucket)| {
        let category = if category.is_empty() {
            CategoryFilter::All
        } else {
            CategoryFilter::parse(&category)
        };
        let mut filter = QueryFilter::all().with_text(text).with_category(category);
        if let Some(bucket) = bucket {
            filter = filter.with_bucket(bucket);
        }
        filter
    })
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    /// Same snapshot, same clock, same filter: same answer
    #[test]
    fn evaluate_is_idempotent(items in items_strategy(40), filter in filter_strategy()) {
        let snapshot = Snapshot::from_items(1, items);
        let now = base_now();
        prop_assert_eq!(evaluate(&snapshot, now, &filter), evaluate(&snapshot, now, &filter));
    }

    /// Results never contain anything the snapshot does not, and never repeat
    #[test]
    fn evaluate_returns_subset(items in items_strategy(40), filter in filter_strategy()) {
        let snapshot = Snapshot::from_items(1, items);
        let rows = evaluate(&snapshot, base_now(), &filter);
        prop_assert!(rows.len() <= snapshot.len());
        let mut ids: Vec<_> = rows.iter().map(|r| r.item.id.clone()).collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        ids.dedup();
        prop_assert_eq!(ids.len(), rows.len());
        for row in &rows {
            prop_assert_eq!(snapshot.get(&row.item.id), Some(&row.item));
        }
    }

    /// Ascending expiration, undated last, ties in arrival order
    #[test]
    fn evaluate_orders_by_expiration(items in items_strategy(40)) {
        let snapshot = Snapshot::from_items(1, items);
        let rows = evaluate(&snapshot, base_now(), &QueryFilter::all());
        prop_assert_eq!(rows.len(), snapshot.len());

        for pair in rows.windows(2) {
            let (a, b) = (&pair[0].item, &pair[1].item);
            match (a.expires_at, b.expires_at) {
                (Some(x), Some(y)) => {
                    prop_assert!(x <= y);
                    if x == y {
                        prop_assert!(a.id.as_str() < b.id.as_str());
                    }
                }
                (None, Some(_)) => prop_assert!(false, "undated item before a dated one"),
                (Some(_), None) => {}
                (None, None) => prop_assert!(a.id.as_str() < b.id.as_str()),
            }
        }
    }

    /// A bucket filter keeps exactly the items classified into that bucket
    #[test]
    fn bucket_filter_matches_classification(
        items in items_strategy(40),
        bucket in prop::sample::select(vec![
            StatusBucket::NoExpiration,
            StatusBucket::Expired,
            StatusBucket::ExpiringSoon,
            StatusBucket::Nominal,
        ]),
    ) {
        let now = base_now();
        let snapshot = Snapshot::from_items(1, items);
        let rows = evaluate(&snapshot, now, &QueryFilter::all().with_bucket(bucket));

        let expected = snapshot
            .iter()
            .filter(|item| classify(item.expires_at, now) == bucket)
            .count();
        prop_assert_eq!(rows.len(), expected);
        prop_assert_eq!(summarize(&snapshot, now).get(bucket), expected);
        prop_assert!(rows.iter().all(|r| r.bucket == bucket));
    }

    /// Expired items always have negative days left, others non-negative
    #[test]
    fn days_left_agrees_with_bucket(offset in -400 * 86_400i64..400 * 86_400i64) {
        let now = base_now();
        let expires = Some(now + Duration::seconds(offset));
        let days = days_left(expires, now).unwrap();
        match classify(expires, now) {
            StatusBucket::Expired => prop_assert!(days < 0),
            StatusBucket::ExpiringSoon => prop_assert!((0..=30).contains(&days)),
            StatusBucket::Nominal => prop_assert!(days >= 30),
            StatusBucket::NoExpiration => prop_assert!(false, "dated item without expiration"),
        }
    }

    /// Summary counts add up to the snapshot size
    #[test]
    fn summary_covers_every_item(items in items_strategy(40)) {
        let snapshot = Snapshot::from_items(1, items);
        prop_assert_eq!(summarize(&snapshot, base_now()).total(), snapshot.len());
    }
}
