//! Statically known shape of the records a source produces.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Fields a reader promises to produce.
///
/// An open schema only lists the fields that are guaranteed; records may
/// carry more. A closed schema lists every top-level field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSchema {
    /// The designated content field every record carries.
    pub content_field: String,
    /// Known field paths, including the content field.
    pub fields: BTreeSet<String>,
    /// Whether `fields` is exhaustive.
    pub closed: bool,
}

impl SourceSchema {
    /// Open schema that only guarantees the content field.
    pub fn open(content_field: impl Into<String>) -> Self {
        let content_field = content_field.into();
        let fields = BTreeSet::from([content_field.clone()]);
        Self {
            content_field,
            fields,
            closed: false,
        }
    }

    /// Closed schema with an explicit field list.
    pub fn closed<I, S>(content_field: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let content_field = content_field.into();
        let mut all: BTreeSet<String> = fields.into_iter().map(Into::into).collect();
        all.insert(content_field.clone());
        Self {
            content_field,
            fields: all,
            closed: true,
        }
    }
}

impl Default for SourceSchema {
    fn default() -> Self {
        Self::open("text")
    }
}

/// Whether two dot paths refer to overlapping parts of a record.
pub fn paths_overlap(a: &str, b: &str) -> bool {
    a == b || is_descendant(a, b) || is_descendant(b, a)
}

/// Whether `path` lies strictly below `ancestor`.
pub fn is_descendant(path: &str, ancestor: &str) -> bool {
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == b'.'
}
