//! JSONL log capture.
//!
//! A [`JsonlLayer`] can be stacked on top of the console formatter so every
//! `tracing` event is also appended, as one JSON object per line, to
//! `<log-dir>/raw/<date>_<instance>.jsonl`. Separate processes pick separate
//! instance names and never share a file.
//!
//! ```ignore
//! use medsync_core::logging::JsonlLayer;
//! use tracing_subscriber::prelude::*;
//!
//! let jsonl = JsonlLayer::new("./logs", "pharmacy-1")?;
//! tracing_subscriber::registry()
//!     .with(tracing_subscriber::fmt::layer())
//!     .with(jsonl)
//!     .init();
//! ```
//!
//! Reading the files back: [`read_records`] returns every record sorted by
//! timestamp, or filter with jq:
//!
//! ```bash
//! jq 'select(.level == "warn")' logs/raw/*.jsonl
//! ```

pub mod entry;
pub mod layer;
pub mod writer;

pub use entry::LogRecord;
pub use layer::JsonlLayer;
pub use writer::{read_records, read_records_for_date, LogFileWriter};
