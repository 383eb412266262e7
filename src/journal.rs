//! Execution journal
//!
//! Append-only record of the orders a strategy created. Entries are kept in
//! memory for the run report and, when a path is configured, appended to a
//! JSON-lines file as they happen.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use tracing::warn;

use crate::StrategyOrder;

/// Which strategy produced an entry and why
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalEvent {
    /// A TWAP chunk was executed
    TwapChunk,
    /// A grid order reached a terminal status
    GridTerminal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub event: JournalEvent,
    /// Chunk index for TWAP, level index for grid
    pub index: usize,
    pub order: StrategyOrder,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct ExecutionJournal {
    entries: Vec<JournalEntry>,
    file: Option<File>,
}

impl ExecutionJournal {
    /// Memory-only journal
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Journal that also appends to `path`, creating parent directories
    pub fn with_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open journal {}", path.display()))?;
        Ok(Self {
            entries: Vec::new(),
            file: Some(file),
        })
    }

    pub fn record(&mut self, event: JournalEvent, index: usize, order: StrategyOrder) {
        let entry = JournalEntry {
            event,
            index,
            order,
            recorded_at: Utc::now(),
        };

        // A broken journal file must not stop order handling
        if let Some(file) = self.file.as_mut() {
            let written = serde_json::to_string(&entry)
                .map_err(anyhow::Error::from)
                .and_then(|line| writeln!(file, "{}", line).map_err(anyhow::Error::from));
            if let Err(e) = written {
                warn!(error = %e, order_id = entry.order.order_id, "Failed to append journal entry");
            }
        }

        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
