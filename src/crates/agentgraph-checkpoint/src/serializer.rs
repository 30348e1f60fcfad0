//! Serialization for checkpoint files
//!
//! Everything written to disk goes through two stages:
//!
//! 1. **Plain tree** - the value is serialized with serde and walked depth
//!    first. Non-finite numbers become `null` and subtrees deeper than
//!    [`MAX_TREE_DEPTH`] collapse into a string marker, so a step file can
//!    always be read back by any JSON reader.
//! 2. **Bytes** - the tree is rendered as pretty JSON by [`JsonSerializer`].

use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Depth below which subtrees are collapsed
pub const MAX_TREE_DEPTH: usize = 64;

/// Marker replacing a collapsed subtree
pub const TRUNCATED_MARKER: &str = "<truncated: max depth exceeded>";

/// Flatten any serializable value into a plain JSON tree
pub fn to_plain_tree<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    let tree = serde_json::to_value(value)?;
    Ok(plain(tree, 0))
}

fn plain(value: Value, depth: usize) -> Value {
    if depth >= MAX_TREE_DEPTH {
        return match value {
            Value::Array(_) | Value::Object(_) => Value::String(TRUNCATED_MARKER.to_string()),
            scalar => scalar,
        };
    }
    match value {
        Value::Number(n) => match n.as_f64() {
            Some(f) if !f.is_finite() => Value::Null,
            _ => Value::Number(n),
        },
        Value::Array(items) => {
            Value::Array(items.into_iter().map(|v| plain(v, depth + 1)).collect())
        }
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, plain(v, depth + 1)))
                .collect(),
        ),
        other => other,
    }
}

/// JSON serializer for checkpoint files
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl JsonSerializer {
    pub fn new() -> Self {
        Self
    }

    /// Serialize to pretty JSON bytes
    pub fn dumps<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(value)?)
    }

    /// Deserialize from JSON bytes
    pub fn loads<T: for<'de> Deserialize<'de>>(&self, data: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Report {
        title: String,
        score: f64,
        tags: Vec<String>,
    }

    #[test]
    fn test_typed_value_becomes_plain_tree() {
        let report = Report {
            title: "weekly".into(),
            score: 0.5,
            tags: vec!["a".into()],
        };
        let tree = to_plain_tree(&report).unwrap();
        assert_eq!(tree, json!({"title": "weekly", "score": 0.5, "tags": ["a"]}));
    }

    #[test]
    fn test_non_finite_numbers_become_null() {
        // serde_json already maps NaN to null; the walk keeps it that way
        let tree = to_plain_tree(&vec![f64::NAN, 1.0, f64::INFINITY]).unwrap();
        assert_eq!(tree, json!([null, 1.0, null]));
    }

    #[test]
    fn test_deep_tree_is_collapsed() {
        let mut value = json!("leaf");
        for _ in 0..100 {
            value = json!({ "child": value });
        }
        let tree = to_plain_tree(&value).unwrap();

        let mut cursor = &tree;
        let mut depth = 0;
        while let Some(child) = cursor.get("child") {
            cursor = child;
            depth += 1;
        }
        assert_eq!(depth, MAX_TREE_DEPTH);
        assert_eq!(cursor, &json!(TRUNCATED_MARKER));
    }

    #[test]
    fn test_json_serializer_round_trip() {
        let serializer = JsonSerializer::new();
        let data = json!({"step": 3, "node": "planner"});
        let bytes = serializer.dumps(&data).unwrap();
        let back: Value = serializer.loads(&bytes).unwrap();
        assert_eq!(back, data);
    }
}
