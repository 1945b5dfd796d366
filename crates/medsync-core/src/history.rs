//! Action log: a bounded, newest-first record of completed writes.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use parking_lot::Mutex;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::DEFAULT_HISTORY_CAPACITY;
use crate::types::ItemId;
use crate::writer::{WriteAction, WriteEvent};

/// One completed write
#[derive(Debug, Clone, PartialEq)]
pub struct ActionEntry {
    pub action: WriteAction,
    pub id: ItemId,
    pub name: String,
    pub at: DateTime<Utc>,
}

impl ActionEntry {
    /// Name if known, otherwise the item id.
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            self.id.as_str()
        } else {
            &self.name
        }
    }
}

impl From<&WriteEvent> for ActionEntry {
    fn from(event: &WriteEvent) -> Self {
        Self {
            action: event.action,
            id: event.id.clone(),
            name: event.name.clone(),
            at: event.at,
        }
    }
}

impl fmt::Display for ActionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} - {}",
            self.at.with_timezone(&Local).format("%d.%m.%Y %H:%M:%S"),
            self.action,
            self.label()
        )
    }
}

/// Shared handle to the log; clones see the same entries.
#[derive(Clone)]
pub struct ActionLog {
    entries: Arc<Mutex<VecDeque<ActionEntry>>>,
    capacity: usize,
}

impl Default for ActionLog {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl ActionLog {
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Prepend an entry, dropping the oldest once full.
    pub fn record(&self, event: &WriteEvent) {
        let mut entries = self.entries.lock();
        entries.push_front(ActionEntry::from(event));
        entries.truncate(self.capacity);
    }

    /// Entries, newest first.
    pub fn entries(&self) -> Vec<ActionEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Feed the log from a write-completion channel until it closes.
    ///
    /// Events lost to a lagging receiver are reported and skipped.
    pub fn follow(&self, mut events: broadcast::Receiver<WriteEvent>) -> JoinHandle<()> {
        let log = self.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => log.record(&event),
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "Action log fell behind; entries dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Action log follower stopped");
        })
    }
}
