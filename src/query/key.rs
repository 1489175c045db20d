use std::{
    fmt,
    hash::{Hash, Hasher},
};

use serde::{Serialize, Serializer};
use serde_json::Value;

/// Ordered tuple of JSON segments identifying one cached resource.
///
/// Equality, hashing and prefix matching all go through the canonical
/// rendering, in which object properties are sorted. Two filter objects with
/// the same fields therefore name the same key whatever order they were
/// built in.
#[derive(Clone)]
pub struct QueryKey {
    segments: Vec<Value>,
    canonical_segments: Vec<String>,
}

impl QueryKey {
    pub fn new(path: impl Into<String>) -> Self {
        Self::from(vec![Value::String(path.into())])
    }

    /// Appends one segment, e.g. an id or a filter object.
    pub fn push(mut self, segment: impl Into<Value>) -> Self {
        let segment = segment.into();
        self.canonical_segments.push(canonical_json(&segment));
        self.segments.push(segment);
        self
    }

    pub fn segments(&self) -> &[Value] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        prefix.canonical_segments.len() <= self.canonical_segments.len()
            && prefix
                .canonical_segments
                .iter()
                .zip(&self.canonical_segments)
                .all(|(left, right)| left == right)
    }

    pub fn canonical(&self) -> String {
        format!("[{}]", self.canonical_segments.join(","))
    }
}

impl From<Vec<Value>> for QueryKey {
    fn from(segments: Vec<Value>) -> Self {
        let canonical_segments = segments.iter().map(canonical_json).collect();
        Self {
            segments,
            canonical_segments,
        }
    }
}

impl From<&str> for QueryKey {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl PartialEq for QueryKey {
    fn eq(&self, other: &Self) -> bool {
        self.canonical_segments == other.canonical_segments
    }
}

impl Eq for QueryKey {}

impl Hash for QueryKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical_segments.hash(state);
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl fmt::Debug for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QueryKey{}", self.canonical())
    }
}

impl Serialize for QueryKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.segments.serialize(serializer)
    }
}

/// Builds a key from JSON-like segments: `query_key!["/api/forum/posts", {"page": 2}]`.
#[macro_export]
macro_rules! query_key {
    ($($segment:tt),+ $(,)?) => {
        $crate::query::QueryKey::from(vec![$(::serde_json::json!($segment)),+])
    };
}

fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut fields: Vec<(&String, &Value)> = map.iter().collect();
            fields.sort_by(|left, right| left.0.cmp(right.0));
            out.push('{');
            for (index, (name, field)) in fields.into_iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(name.clone()).to_string());
                out.push(':');
                write_canonical(field, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
