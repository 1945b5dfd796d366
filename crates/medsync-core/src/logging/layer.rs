//! `tracing_subscriber` layer that feeds a [`LogFileWriter`].

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Number, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use super::entry::LogRecord;
use super::writer::LogFileWriter;

/// Writes every event it sees as a JSON line.
///
/// Filtering is left to the surrounding subscriber, so stack it under the
/// same `EnvFilter` as the console output.
#[derive(Clone)]
pub struct JsonlLayer {
    writer: Arc<LogFileWriter>,
}

impl JsonlLayer {
    /// Open the instance's log file and wrap it in a layer.
    ///
    /// # Arguments
    /// * `log_dir` - Root log directory (e.g. `~/.medsync/logs`)
    /// * `instance` - Name that keeps this process's file apart from others
    pub fn new(log_dir: impl AsRef<Path>, instance: impl Into<String>) -> std::io::Result<Self> {
        Ok(Self {
            writer: Arc::new(LogFileWriter::open(log_dir, instance)?),
        })
    }

    /// Current log file
    pub fn log_path(&self) -> PathBuf {
        self.writer.path()
    }

    pub fn instance(&self) -> &str {
        self.writer.instance()
    }
}

impl<S> Layer<S> for JsonlLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let meta = event.metadata();
        let mut visitor = FieldCollector::default();
        event.record(&mut visitor);

        let mut record = LogRecord::new(
            meta.level().as_str().to_lowercase(),
            self.writer.instance(),
            meta.target(),
            visitor.message.unwrap_or_default(),
        );
        record.fields = visitor.fields;

        if let Some(scope) = ctx.event_scope(event) {
            let path: Vec<&str> = scope.from_root().map(|span| span.name()).collect();
            if !path.is_empty() {
                record = record.with_span(path.join(" > "));
            }
        }

        // a failing log sink must not take the process down
        let _ = self.writer.append(&record);
    }
}

#[derive(Default)]
struct FieldCollector {
    message: Option<String>,
    fields: Map<String, Value>,
}

impl FieldCollector {
    fn put(&mut self, field: &Field, value: Value) {
        self.fields.insert(field.name().to_string(), value);
    }
}

impl Visit for FieldCollector {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let mut text = String::new();
        let _ = write!(text, "{value:?}");
        if field.name() == "message" {
            self.message = Some(text);
        } else {
            self.put(field, Value::String(text));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.put(field, Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, Value::Number(value.into()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, Value::Number(value.into()));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, Value::Bool(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        if let Some(n) = Number::from_f64(value) {
            self.put(field, Value::Number(n));
        }
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.put(field, Value::String(value.to_string()));
    }
}
