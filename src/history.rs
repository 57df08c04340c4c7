use crate::request::Method;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

pub const HISTORY_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub method: String,
    pub url: String,
    pub status: u16,
    pub elapsed_ms: u64,
    pub timestamp: String,
}

impl HistoryEntry {
    pub fn new(method: Method, url: &str, status: u16, elapsed_ms: u64, at: DateTime<Utc>) -> Self {
        Self {
            method: method.to_string(),
            url: url.to_string(),
            status,
            elapsed_ms,
            timestamp: at.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// Newest-first log of completed exchanges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct History {
    entries: Vec<HistoryEntry>,
}

impl History {
    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        let mut entries: Vec<HistoryEntry> = serde_json::from_str(s)?;
        entries.truncate(HISTORY_LIMIT);
        Ok(Self { entries })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.entries)
    }

    pub fn record(&mut self, entry: HistoryEntry) {
        self.entries.insert(0, entry);
        self.entries.truncate(HISTORY_LIMIT);
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
