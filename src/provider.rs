use crate::error::{MetadataError, Result};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Detail sets a record must carry before it is considered fully populated.
/// Providers deliver these incrementally; see [`MetadataProvider::load_details`].
pub const REQUIRED_DETAIL_SETS: [&str; 6] =
    ["main", "plot", "release dates", "akas", "taglines", "dvd"];

/// One loosely-typed record as returned by an upstream metadata provider.
///
/// Field presence depends on the provider, the query that produced the
/// record, and which detail sets have been loaded so far. Consumers must
/// treat every field as optional.
#[derive(Debug, Clone)]
pub struct RawRecord {
    id: String,
    fields: Map<String, Value>,
    detail_sets: BTreeSet<String>,
}

impl RawRecord {
    /// Wraps a provider response in a record. Fails when the payload is not
    /// a JSON object, the one structural shape normalization cannot recover
    /// from.
    pub fn from_value(id: impl Into<String>, value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self {
                id: id.into(),
                fields,
                detail_sets: BTreeSet::new(),
            }),
            other => Err(MetadataError::InvalidRecord(format!(
                "expected a JSON object, got {}",
                type_name(&other)
            ))),
        }
    }

    /// Canonical identifier, without any provider prefix.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn get_field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Field names in the order the provider supplied them.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Detail sets that have been loaded onto this record so far.
    pub fn current_detail_sets(&self) -> &BTreeSet<String> {
        &self.detail_sets
    }

    /// Records that the named detail sets are now populated.
    pub fn mark_detail_sets<I, S>(&mut self, sets: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.detail_sets.extend(sets.into_iter().map(Into::into));
    }

    /// Merges enrichment fields fetched for an additional detail set.
    pub fn merge_fields(&mut self, fields: Map<String, Value>) {
        self.fields.extend(fields);
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Upstream movie-metadata source. Implementations block until the provider
/// responds; no retry or timeout policy is applied at this layer.
pub trait MetadataProvider: Send + Sync {
    /// Free-text search. Results are typically sparse records carrying
    /// little more than titles, kind and year.
    fn search_by_text(&self, text: &str) -> Result<Vec<RawRecord>>;

    /// Fetches one record by canonical identifier (no provider prefix).
    fn fetch_by_id(&self, id: &str) -> Result<RawRecord>;

    /// Enriches `record` in place with the named detail sets. The
    /// implementation must mark the sets as loaded on success.
    fn load_details(&self, record: &mut RawRecord, sets: &[&str]) -> Result<()>;
}
