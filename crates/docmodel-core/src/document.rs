//! Documents: string-keyed value maps with deep merge.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Name of the store-assigned identifier field.
pub const ID_FIELD: &str = "_id";

/// A document: an ordered map from field names to [`Value`]s.
///
/// Documents serve double duty as stored records and as compiled native
/// filters, which is why merging is deep: nested documents merge key by key,
/// everything else overwrites.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    entries: BTreeMap<String, Value>,
}

impl Document {
    /// Create an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Get a value by field name.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert a value, returning the previous one if present.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    /// Deep-merge `other` into this document.
    ///
    /// Nested document values merge recursively; any other value overwrites
    /// the existing entry. This is the merge rule used both for accumulating
    /// queryset filters and for folding post-write documents back into
    /// instance state.
    pub fn merge(&mut self, other: &Document) {
        for (key, value) in &other.entries {
            match (self.entries.get_mut(key), value) {
                (Some(Value::Document(existing)), Value::Document(incoming)) => {
                    existing.merge(incoming);
                }
                _ => {
                    self.entries.insert(key.clone(), value.clone());
                }
            }
        }
    }

    /// Serialize to a JSON string, for logging and interop.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse a document from JSON.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Resolve a dotted path (`"author.$id"`) inside this document.
    ///
    /// A `$id` segment steps through a [`Value::Reference`] to its identifier.
    #[must_use]
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut current: Option<&Value> = None;
        for segment in path.split('.') {
            current = match current {
                None => self.entries.get(segment),
                Some(Value::Document(doc)) => doc.get(segment),
                Some(Value::Reference { collection: _, id }) if segment == "$id" => {
                    Some(id.as_ref())
                }
                _ => None,
            };
            current?;
        }
        current
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<const N: usize> From<[(&str, Value); N]> for Document {
    fn from(pairs: [(&str, Value); N]) -> Self {
        pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }
}
