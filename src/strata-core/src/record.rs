//! Records and dot-path field access.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use common_error::{RecordLocator, StrataError, StrataResult};

use crate::types::Value;

/// A dot-separated field path such as `metadata.language`.
pub type FieldPath = str;

/// One document plus the metadata added by earlier stages.
///
/// Fields keep insertion order. The origin locator is lineage metadata set
/// by the engine when the record enters a run; it is not serialized and does
/// not take part in equality.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: IndexMap<String, Value>,
    #[serde(skip)]
    origin: Option<RecordLocator>,
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a record from top-level fields.
    pub fn from_fields(fields: IndexMap<String, Value>) -> Self {
        Self {
            fields,
            origin: None,
        }
    }

    /// Create a record with a single text field.
    pub fn with_text(field: &str, text: impl Into<String>) -> Self {
        let mut fields = IndexMap::new();
        fields.insert(field.to_string(), Value::String(text.into()));
        Self::from_fields(fields)
    }

    /// Build a record from a JSON object.
    pub fn from_json(json: serde_json::Value) -> StrataResult<Self> {
        match Value::from(json) {
            Value::Map(fields) => Ok(Self::from_fields(fields)),
            other => Err(StrataError::type_error(format!(
                "record must be a JSON object, got {}",
                other.type_name()
            ))),
        }
    }

    /// Top-level fields.
    pub fn fields(&self) -> &IndexMap<String, Value> {
        &self.fields
    }

    /// Consume the record, returning its fields.
    pub fn into_fields(self) -> IndexMap<String, Value> {
        self.fields
    }

    /// Number of top-level fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Where the record entered the run, if known.
    pub fn origin(&self) -> Option<RecordLocator> {
        self.origin
    }

    /// Set the origin locator.
    #[must_use]
    pub fn with_origin(mut self, origin: Option<RecordLocator>) -> Self {
        self.origin = origin;
        self
    }

    /// Read a field by dot path. Missing segments yield `None`.
    pub fn get(&self, path: &FieldPath) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.fields.get(first)?;
        for segment in segments {
            current = current.as_map()?.get(segment)?;
        }
        Some(current)
    }

    /// Whether a field exists at the path (a stored `Null` counts as present).
    pub fn contains(&self, path: &FieldPath) -> bool {
        self.get(path).is_some()
    }

    /// Read a string field.
    pub fn get_str(&self, path: &FieldPath) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    /// Write a field by dot path, creating intermediate maps as needed.
    ///
    /// Fails with a `TypeError` when an intermediate segment holds a
    /// non-map value.
    pub fn set(&mut self, path: &FieldPath, value: Value) -> StrataResult<()> {
        if path.is_empty() {
            return Err(StrataError::value_error("field path must not be empty"));
        }
        let segments: Vec<&str> = path.split('.').collect();
        let (last, parents) = segments
            .split_last()
            .ok_or_else(|| StrataError::value_error("field path must not be empty"))?;

        let mut current = &mut self.fields;
        for (depth, segment) in parents.iter().enumerate() {
            let slot = current
                .entry((*segment).to_string())
                .or_insert_with(|| Value::Map(IndexMap::new()));
            current = match slot {
                Value::Map(map) => map,
                other => {
                    return Err(StrataError::type_error(format!(
                        "cannot set '{path}': '{}' holds {}, not a map",
                        segments[..=depth].join("."),
                        other.type_name()
                    )))
                }
            };
        }
        current.insert((*last).to_string(), value);
        Ok(())
    }

    /// Builder form of [`Record::set`].
    pub fn with_field(mut self, path: &FieldPath, value: impl Into<Value>) -> StrataResult<Self> {
        self.set(path, value.into())?;
        Ok(self)
    }

    /// Remove a field by dot path, returning its value.
    pub fn remove(&mut self, path: &FieldPath) -> Option<Value> {
        let (parent, last) = match path.rsplit_once('.') {
            Some((parent, last)) => (Some(parent), last),
            None => (None, path),
        };
        let container = match parent {
            None => &mut self.fields,
            Some(parent) => {
                let mut current = &mut self.fields;
                for segment in parent.split('.') {
                    current = match current.get_mut(segment)? {
                        Value::Map(map) => map,
                        _ => return None,
                    };
                }
                current
            }
        };
        container.shift_remove(last)
    }

    /// Check that every leaf present in `before` is still present and
    /// unchanged in `self`.
    ///
    /// Returns the first path that was removed or overwritten. Maps may gain
    /// keys; any other value must compare equal.
    pub fn first_changed_path(&self, before: &Record) -> Option<String> {
        fn walk(
            prefix: &str,
            before: &IndexMap<String, Value>,
            after: &IndexMap<String, Value>,
        ) -> Option<String> {
            for (key, old) in before {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                match (old, after.get(key)) {
                    (_, None) => return Some(path),
                    (Value::Map(old_map), Some(Value::Map(new_map))) => {
                        if let Some(changed) = walk(&path, old_map, new_map) {
                            return Some(changed);
                        }
                    }
                    (old, Some(new)) if old != new => return Some(path),
                    _ => {}
                }
            }
            None
        }
        walk("", &before.fields, &self.fields)
    }
}

impl From<IndexMap<String, Value>> for Record {
    fn from(fields: IndexMap<String, Value>) -> Self {
        Self::from_fields(fields)
    }
}

impl From<&Record> for serde_json::Value {
    fn from(record: &Record) -> Self {
        Self::Object(
            record
                .fields
                .iter()
                .map(|(k, v)| (k.clone(), Self::from(v)))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Record {
        Record::from_json(json!({
            "text": "hello world",
            "metadata": {"source": "web", "stats": {"chars": 11}}
        }))
        .unwrap()
    }

    #[test]
    fn test_get_nested() {
        let record = sample();
        assert_eq!(record.get_str("text"), Some("hello world"));
        assert_eq!(record.get("metadata.stats.chars"), Some(&Value::Int64(11)));
        assert!(record.get("metadata.missing").is_none());
        assert!(record.get("text.inner").is_none());
        assert!(!record.contains("nope"));
    }

    #[test]
    fn test_set_creates_intermediate_maps() {
        let record = Record::new().with_field("a.b.c", 1i64).unwrap();
        assert_eq!(record.get("a.b.c"), Some(&Value::Int64(1)));
        assert!(record.get("a.b").unwrap().as_map().is_some());
    }

    #[test]
    fn test_set_through_scalar_fails() {
        let mut record = sample();
        let err = record.set("text.lang", Value::from("en")).unwrap_err();
        assert!(matches!(err, StrataError::TypeError(_)));
        assert!(err.to_string().contains("'text' holds String"));
        assert_eq!(record, sample());
    }

    #[test]
    fn test_remove() {
        let mut record = sample();
        assert_eq!(record.remove("metadata.source"), Some(Value::from("web")));
        assert!(record.remove("metadata.source").is_none());
        assert!(record.remove("text.inner").is_none());
        assert_eq!(record.remove("text"), Some(Value::from("hello world")));
    }

    #[test]
    fn test_first_changed_path() {
        let before = sample();

        let added = before.clone().with_field("metadata.language", "en").unwrap();
        assert_eq!(added.first_changed_path(&before), None);

        let overwritten = before.clone().with_field("metadata.stats.chars", 12i64).unwrap();
        assert_eq!(
            overwritten.first_changed_path(&before).as_deref(),
            Some("metadata.stats.chars")
        );

        let mut removed = before.clone();
        removed.remove("text");
        assert_eq!(removed.first_changed_path(&before).as_deref(), Some("text"));
    }

    #[test]
    fn test_origin_not_part_of_equality() {
        let a = sample().with_origin(Some(RecordLocator::new(0, 1)));
        let b = sample();
        assert_eq!(a, b);
        assert_eq!(a.origin(), Some(RecordLocator::new(0, 1)));
        assert_eq!(serde_json::to_value(&a).unwrap(), serde_json::Value::from(&b));
    }
}
