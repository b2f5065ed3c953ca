use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status codes a site answers with when it throttles or bans the client.
pub const BLOCK_STATUS_CODES: [u16; 3] = [403, 429, 503];

pub fn is_block_status(code: u16) -> bool {
    BLOCK_STATUS_CODES.contains(&code)
}

/// Where the detail record for a work item lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator(pub String);

impl Locator {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockSignal {
    Status(u16),
    Marker,
}

impl fmt::Display for BlockSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockSignal::Status(code) => write!(f, "status={code}"),
            BlockSignal::Marker => write!(f, "status=blocked"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    Found(Locator),
    Blocked(BlockSignal),
    NotFound,
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DetailOutcome {
    Record(ResolvedRecord),
    Blocked(BlockSignal),
    Error {
        message: String,
        status: Option<u16>,
    },
}

impl DetailOutcome {
    /// Block signals, including error signals carrying a block status code.
    pub fn block_signal(&self) -> Option<BlockSignal> {
        match self {
            DetailOutcome::Blocked(signal) => Some(*signal),
            DetailOutcome::Error {
                status: Some(code), ..
            } if is_block_status(*code) => Some(BlockSignal::Status(*code)),
            _ => None,
        }
    }
}

/// A detail record produced by the resolution collaborators.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResolvedRecord {
    pub source_url: Option<String>,
    /// Identity of the record; empty until normalized.
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

impl ResolvedRecord {
    pub fn new(source_url: Option<String>) -> Self {
        Self {
            source_url,
            ..Self::default()
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Ensures `fields[label_key]` is a non-empty string and mirrors it into `label`.
    ///
    /// Falls back to `work_item` when the collaborator left the label out.
    /// Returns the label the record is tracked under.
    pub fn normalize_label(&mut self, label_key: &str, work_item: &str) -> &str {
        let existing = self
            .fields
            .get(label_key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToOwned::to_owned);
        let label = existing.unwrap_or_else(|| work_item.to_string());
        self.fields
            .insert(label_key.to_string(), Value::String(label.clone()));
        self.label = label;
        &self.label
    }
}
