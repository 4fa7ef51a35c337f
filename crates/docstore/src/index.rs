//! Hash indexes over dotted document paths
//!
//! An index maps the canonical JSON encoding of every value found at its path
//! to the set of document ids holding that value. Arrays along the path are
//! flattened, so `tags` indexes each element of a `tags` array separately.

use crate::error::{DocError, DocResult};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// A parsed dotted path such as `profile.address.city`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexPath(Vec<String>);

impl IndexPath {
    /// Parse a dotted path; empty segments are rejected
    pub fn parse(path: &str) -> DocResult<Self> {
        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(DocError::InvalidInput(format!(
                "invalid index path '{}'",
                path
            )));
        }
        Ok(IndexPath(segments))
    }

    /// Path segments in order
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Collect every value found at this path inside `doc`
    pub fn values_in<'a>(&self, doc: &'a Value) -> Vec<&'a Value> {
        let mut current = vec![doc];
        for segment in &self.0 {
            let mut next = Vec::new();
            for value in current {
                collect_field(value, segment, &mut next);
            }
            current = next;
        }
        // Arrays at the leaf index each element
        let mut out = Vec::with_capacity(current.len());
        for value in current {
            match value {
                Value::Array(items) => out.extend(items.iter()),
                other => out.push(other),
            }
        }
        out
    }
}

fn collect_field<'a>(value: &'a Value, segment: &str, out: &mut Vec<&'a Value>) {
    match value {
        Value::Object(map) => {
            if let Some(field) = map.get(segment) {
                out.push(field);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_field(item, segment, out);
            }
        }
        _ => {}
    }
}

impl fmt::Display for IndexPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

/// Canonical lookup key for a JSON value
///
/// `serde_json` keeps object keys sorted, so equal values encode equally.
pub(crate) fn lookup_key(value: &Value) -> String {
    value.to_string()
}

/// In-memory hash index for one path of one collection
#[derive(Debug, Clone)]
pub(crate) struct HashIndex {
    path: IndexPath,
    entries: HashMap<String, BTreeSet<u64>>,
}

impl HashIndex {
    pub(crate) fn new(path: IndexPath) -> Self {
        Self {
            path,
            entries: HashMap::new(),
        }
    }

    pub(crate) fn path(&self) -> &IndexPath {
        &self.path
    }

    pub(crate) fn insert(&mut self, id: u64, doc: &Value) {
        for value in self.path.values_in(doc) {
            self.entries.entry(lookup_key(value)).or_default().insert(id);
        }
    }

    pub(crate) fn remove(&mut self, id: u64, doc: &Value) {
        for value in self.path.values_in(doc) {
            let key = lookup_key(value);
            if let Some(ids) = self.entries.get_mut(&key) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.entries.remove(&key);
                }
            }
        }
    }

    pub(crate) fn lookup(&self, value: &Value) -> Vec<u64> {
        self.entries
            .get(&lookup_key(value))
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }
}
