//! medsync CLI
//!
//! Thin wrapper around medsync-core for command-line usage against the local
//! store.
//!
//! ## Usage
//!
//! ```bash
//! # Show store information and bucket counts
//! medsync info
//!
//! # Add an item
//! medsync item add "Paracetamol" --dosage "500 mg" --quantity "20 tablets" --expires 2027-03-31
//!
//! # Change an item
//! medsync item update <id> --quantity "10 tablets"
//!
//! # Remove an item
//! medsync item delete <id>
//!
//! # Everything, soonest expiration first
//! medsync item list
//!
//! # Filtered view
//! medsync query --text para --category Painkillers --bucket expiring-soon
//!
//! # Categories
//! medsync category add Painkillers
//! medsync category list
//!
//! # Follow changes as they arrive
//! medsync watch --count 3
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use clap::{Args, Parser, Subcommand};
use medsync_core::logging::JsonlLayer;
use medsync_core::{
    summarize_within, CategoryFilter, ClassifiedItem, Inventory, InventoryConfig, Item, ItemId,
    Measure, QueryFilter, Snapshot, StatusBucket, SyncEvent,
};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// medsync - home pharmacy inventory
#[derive(Parser)]
#[command(name = "medsync")]
#[command(version)]
#[command(about = "medsync - home pharmacy inventory")]
#[command(
    long_about = "Track medicines, their categories and expiration dates in a shared document store."
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Data directory (default: ~/.medsync/data)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Also write JSONL logs under this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show store information
    Info,

    /// Item management
    Item {
        #[command(subcommand)]
        action: ItemAction,
    },

    /// Filter and classify items
    Query {
        /// Case-insensitive substring of the name
        #[arg(short, long, default_value = "")]
        text: String,
        /// Category name, or "all"
        #[arg(long, default_value = "all")]
        category: String,
        /// expired, expiring-soon, nominal or none
        #[arg(short, long)]
        bucket: Option<StatusBucket>,
    },

    /// Category management
    Category {
        #[command(subcommand)]
        action: CategoryAction,
    },

    /// Print every new revision of the item collection
    Watch {
        /// Stop after this many snapshots
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },
}

#[derive(Subcommand)]
enum ItemAction {
    /// Add an item
    Add {
        /// Item name
        name: String,
        #[command(flatten)]
        fields: ItemFields,
    },
    /// Replace fields of an existing item
    Update {
        /// Item ID
        id: String,
        /// New name
        #[arg(long)]
        name: Option<String>,
        #[command(flatten)]
        fields: ItemFields,
    },
    /// Delete an item
    Delete {
        /// Item ID
        id: String,
    },
    /// List all items
    List,
}

#[derive(Args)]
struct ItemFields {
    /// Dose per unit, e.g. "500 mg"
    #[arg(long)]
    dosage: Option<String>,
    /// Package contents, e.g. "20 tablets"
    #[arg(long)]
    quantity: Option<String>,
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    manufacturer: Option<String>,
    #[arg(long)]
    description: Option<String>,
    /// Expiration date (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    expires: Option<NaiveDate>,
}

impl ItemFields {
    /// Overwrite whatever was given on the command line.
    fn apply(self, mut item: Item) -> Item {
        if let Some(dosage) = self.dosage {
            item.dosage = Measure::parse(&dosage);
        }
        if let Some(quantity) = self.quantity {
            item.quantity = Measure::parse(&quantity);
        }
        if let Some(category) = self.category {
            item.category = category;
        }
        if let Some(manufacturer) = self.manufacturer {
            item.manufacturer = manufacturer;
        }
        if let Some(description) = self.description {
            item.description = Some(description).filter(|d| !d.is_empty());
        }
        if let Some(date) = self.expires {
            item.expires_at = date
                .and_hms_opt(0, 0, 0)
                .map(|naive| Utc.from_utc_datetime(&naive));
        }
        item
    }
}

#[derive(Subcommand)]
enum CategoryAction {
    /// List known categories
    List,
    /// Add a category
    Add {
        /// Category name
        name: String,
    },
}

fn setup_logging(verbosity: u8, log_dir: Option<&Path>, instance: &str) -> Result<()> {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let jsonl = log_dir
        .map(|dir| JsonlLayer::new(dir, instance))
        .transpose()
        .context("Failed to open log directory")?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(jsonl)
        .init();
    Ok(())
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".medsync")
        .join("data")
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| format!("expected YYYY-MM-DD, got '{}': {}", s, e))
}

fn load_config(cli: &Cli) -> Result<InventoryConfig> {
    let mut config = match &cli.config {
        Some(path) => InventoryConfig::load(path)?,
        None => InventoryConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.data_dir = Some(dir.clone());
    }
    if config.data_dir.is_none() {
        config.data_dir = Some(default_data_dir());
    }
    Ok(config)
}

fn print_rows(rows: &[ClassifiedItem]) {
    if rows.is_empty() {
        println!("No items found.");
        return;
    }
    println!("Items ({}):", rows.len());
    println!();
    for row in rows {
        let item = &row.item;
        let days = match row.days_left {
            Some(days) => format!("{}d", days),
            None => "-".to_string(),
        };
        println!("[{}] {} ({})", row.bucket, item.name, days);
        println!("  ID: {}", item.id);
        if !item.dosage.is_empty() || !item.quantity.is_empty() {
            println!("  Dosage: {}  Quantity: {}", item.dosage, item.quantity);
        }
        if !item.category.is_empty() {
            println!("  Category: {}", item.category);
        }
        if !item.manufacturer.is_empty() {
            println!("  Manufacturer: {}", item.manufacturer);
        }
        if let Some(description) = &item.description {
            println!("  Description: {}", description);
        }
        if let Some(expires) = item.expires_at {
            println!("  Expires: {}", expires.format("%Y-%m-%d"));
        }
    }
}

/// One-line summary of a received snapshot; counts come from that snapshot only
fn describe_revision(snapshot: &Snapshot, now: DateTime<Utc>, window: Duration) -> String {
    let summary = summarize_within(snapshot, now, window);
    format!(
        "Revision {}: {} items ({} expired, {} expiring soon)",
        snapshot.revision(),
        snapshot.len(),
        summary.expired,
        summary.expiring_soon
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli)?;
    setup_logging(cli.verbose, cli.log_dir.as_deref(), &config.instance)?;

    let inventory = Inventory::open_local(config)?;
    let now = Utc::now();

    match cli.command {
        Commands::Info => {
            let snapshot = inventory.load_snapshot().await?;
            let categories = inventory.categories().list().await?;
            let summary = inventory.summary(now);
            let config = inventory.config();

            println!("medsync v{}", env!("CARGO_PKG_VERSION"));
            println!();
            if let Some(dir) = &config.data_dir {
                println!("Data directory: {}", dir.display());
            }
            println!("Collections: {} / {}", config.items_collection, config.categories_collection);
            println!("Revision: {}", snapshot.revision());
            println!("Items: {}", snapshot.len());
            for bucket in [
                StatusBucket::Expired,
                StatusBucket::ExpiringSoon,
                StatusBucket::Nominal,
                StatusBucket::NoExpiration,
            ] {
                println!("  {}: {}", bucket, summary.get(bucket));
            }
            println!("Categories: {}", categories.len());
        }

        Commands::Item { action } => match action {
            ItemAction::Add { name, fields } => {
                let item = inventory.insert(fields.apply(Item::new(name))).await?;
                println!("Added item: {}", item.name);
                println!("  ID: {}", item.id);
            }

            ItemAction::Update { id, name, fields } => {
                let snapshot = inventory.load_snapshot().await?;
                let Some(existing) = snapshot.get(&ItemId::new(&id)) else {
                    anyhow::bail!("Item not found: {}", id);
                };
                let mut item = fields.apply(existing.clone());
                if let Some(name) = name {
                    item.name = name;
                }
                let item = inventory.update(item).await?;
                println!("Updated item: {}", item.name);
                println!("  ID: {}", item.id);
            }

            ItemAction::Delete { id } => {
                inventory.writer().delete_by_id(&ItemId::new(&id)).await?;
                println!("Deleted item: {}", id);
            }

            ItemAction::List => {
                let snapshot = inventory.load_snapshot().await?;
                print_rows(&inventory.evaluate(&snapshot, now, &QueryFilter::all()));
            }
        },

        Commands::Query {
            text,
            category,
            bucket,
        } => {
            let snapshot = inventory.load_snapshot().await?;
            let mut filter = QueryFilter::all()
                .with_text(text)
                .with_category(CategoryFilter::parse(&category));
            if let Some(bucket) = bucket {
                filter = filter.with_bucket(bucket);
            }
            print_rows(&inventory.evaluate(&snapshot, now, &filter));
        }

        Commands::Category { action } => match action {
            CategoryAction::List => {
                let categories = inventory.categories().list().await?;
                if categories.is_empty() {
                    println!("No categories found.");
                } else {
                    println!("Categories ({}):", categories.len());
                    for name in categories {
                        println!("  {}", name);
                    }
                }
            }

            CategoryAction::Add { name } => {
                inventory.categories().add(&name).await?;
                println!("Added category: {}", name.trim());
            }
        },

        Commands::Watch { count } => {
            let mut consumer = inventory.watch();
            let mut seen = 0usize;
            println!("Watching '{}' (Ctrl+C to stop)", inventory.config().items_collection);

            loop {
                let event = tokio::select! {
                    event = consumer.recv() => event,
                    _ = tokio::signal::ctrl_c() => break,
                };
                let Some(event) = event else { break };

                match event {
                    SyncEvent::Snapshot(snapshot) => {
                        println!(
                            "{}",
                            describe_revision(
                                &snapshot,
                                Utc::now(),
                                inventory.config().expiring_soon_window()
                            )
                        );
                        seen += 1;
                        if count.is_some_and(|limit| seen >= limit) {
                            break;
                        }
                    }
                    SyncEvent::StatusChanged(status) => {
                        tracing::debug!(%status, "Sync status changed");
                    }
                    SyncEvent::Error {
                        error,
                        resubscribing,
                    } => {
                        eprintln!("Sync error: {}", error);
                        if !resubscribing {
                            anyhow::bail!("Subscription stopped: {}", error);
                        }
                    }
                }
            }
        }
    }

    inventory.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, expires: DateTime<Utc>) -> Item {
        let mut item = Item::new(id).with_expiration(expires);
        item.id = ItemId::new(id);
        item
    }

    #[test]
    fn test_describe_revision_counts_only_given_snapshot() {
        let now = Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap();
        let window = Duration::days(30);
        let older = Snapshot::from_items(3, [item("syrup", now - Duration::days(2))]);
        let newer = Snapshot::from_items(
            4,
            [
                item("syrup", now - Duration::days(2)),
                item("drops", now + Duration::days(3)),
            ],
        );

        assert_eq!(
            describe_revision(&older, now, window),
            "Revision 3: 1 items (1 expired, 0 expiring soon)"
        );
        assert_eq!(
            describe_revision(&newer, now, window),
            "Revision 4: 2 items (1 expired, 1 expiring soon)"
        );
    }
}
