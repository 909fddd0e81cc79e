use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Reserved worker classes for records that do no work of their own
pub const BATCH: &str = "batch";
pub const BATCH_CHILD: &str = "batch_child";
pub const SUPERWORKER: &str = "superworker";

/// Concrete argument bindings for one compilation
pub type Args = BTreeMap<String, JsonValue>;

/// An entry of `arg_keys`: a formal name, or for a batch root the
/// list → element mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgKey {
    Name(String),
    /// Keyed by list name, so it serializes with lists sorted, whatever the
    /// binding order. Each `batch_child` keeps binding order for its elements.
    Bindings(BTreeMap<String, String>),
}

impl ArgKey {
    pub fn as_name(&self) -> Option<&str> {
        match self {
            ArgKey::Name(name) => Some(name),
            ArgKey::Bindings(_) => None,
        }
    }
}

impl From<&str> for ArgKey {
    fn from(name: &str) -> Self {
        ArgKey::Name(name.to_string())
    }
}

impl From<String> for ArgKey {
    fn from(name: String) -> Self {
        ArgKey::Name(name)
    }
}

/// One compiled graph node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "subjob_id")]
    pub id: u32,
    #[serde(rename = "subworker_class")]
    pub worker_class: String,
    pub arg_keys: Vec<ArgKey>,
    pub arg_values: Vec<JsonValue>,
    pub parent_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children_ids: Option<Vec<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_id: Option<u32>,
}

impl Record {
    pub fn is_structural(&self) -> bool {
        matches!(
            self.worker_class.as_str(),
            BATCH | BATCH_CHILD | SUPERWORKER
        )
    }

    /// Arguments as a `key → value` object, skipping batch mappings
    pub fn named_args(&self) -> serde_json::Map<String, JsonValue> {
        self.arg_keys
            .iter()
            .zip(&self.arg_values)
            .filter_map(|(key, value)| key.as_name().map(|k| (k.to_string(), value.clone())))
            .collect()
    }
}

/// The flat output of one compilation, keyed by record id.
///
/// Serializes as a JSON object keyed by id.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordTable {
    records: BTreeMap<u32, Record>,
}

impl RecordTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: u32) -> Option<&Record> {
        self.records.get(&id)
    }

    /// Records in id order
    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.records.keys().copied()
    }

    /// The record without a parent (the first one, if several)
    pub fn root(&self) -> Option<&Record> {
        self.records.values().find(|r| r.parent_id.is_none())
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl FromIterator<Record> for RecordTable {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().map(|r| (r.id, r)).collect(),
        }
    }
}

impl<'a> IntoIterator for &'a RecordTable {
    type Item = &'a Record;
    type IntoIter = std::collections::btree_map::Values<'a, u32, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.values()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SubjobStatus {
    Initialized,
    Queued,
    Running,
    Complete,
    Failed,
}

impl SubjobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SubjobStatus::Complete | SubjobStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Complete,
    Failed,
}
