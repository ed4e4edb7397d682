//! Flattens nested metadata payloads into single-level staging records.
//!
//! Key paths are built by joining map keys and sequence indices with `_`:
//! `{"Ratings": [{"Source": "IMDb"}]}` becomes `{"Ratings_0_Source": "IMDb"}`.
//! First-level keys are kept bare and a scalar root lands under the empty key.

use serde_json::Value;
use std::collections::BTreeMap;

/// A flattened record: compound key path -> scalar leaf
pub type FlatRecord = BTreeMap<String, Value>;

pub const SEPARATOR: char = '_';

/// Flatten `raw` into a fresh record.
///
/// Total and deterministic. Empty maps and sequences contribute no keys.
pub fn flatten(raw: &Value) -> FlatRecord {
    let mut out = FlatRecord::new();
    flatten_into(raw, "", &mut out);
    out
}

fn flatten_into(raw: &Value, prefix: &str, out: &mut FlatRecord) {
    match raw {
        Value::Object(map) => {
            for (key, value) in map {
                flatten_into(value, &child_path(prefix, key), out);
            }
        }
        Value::Array(items) => {
            for (idx, item) in items.iter().enumerate() {
                flatten_into(item, &child_path(prefix, &idx.to_string()), out);
            }
        }
        leaf => {
            out.insert(prefix.to_string(), leaf.clone());
        }
    }
}

fn child_path(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else {
        format!("{}{}{}", prefix, SEPARATOR, segment)
    }
}

/// Text form of a scalar leaf as stored in staging. `null` maps to `None`.
pub fn leaf_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        // flatten() never emits containers; keep their JSON text if handed one
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Rebuild nesting by splitting keys on the separator. Numeric segments
    /// become sequence indices. Only valid for inputs whose own keys carry no
    /// separator.
    fn renest(flat: &FlatRecord) -> Value {
        let mut root = Value::Null;
        for (path, leaf) in flat {
            let segments: Vec<&str> = path.split(SEPARATOR).collect();
            insert_path(&mut root, &segments, leaf.clone());
        }
        root
    }

    fn insert_path(node: &mut Value, segments: &[&str], leaf: Value) {
        let Some((head, rest)) = segments.split_first() else {
            *node = leaf;
            return;
        };
        if let Ok(idx) = head.parse::<usize>() {
            if !node.is_array() {
                *node = Value::Array(Vec::new());
            }
            let items = node.as_array_mut().unwrap();
            while items.len() <= idx {
                items.push(Value::Null);
            }
            insert_path(&mut items[idx], rest, leaf);
        } else {
            if !node.is_object() {
                *node = Value::Object(Default::default());
            }
            let map = node.as_object_mut().unwrap();
            let child = map.entry(head.to_string()).or_insert(Value::Null);
            insert_path(child, rest, leaf);
        }
    }

    fn omdb_payload() -> Value {
        json!({
            "Title": "Inception",
            "Year": "2010",
            "Genre": "Action, Adventure, Sci-Fi",
            "Ratings": [
                { "Source": "Internet Movie Database", "Value": "8.8/10" },
                { "Source": "Rotten Tomatoes", "Value": "87%" }
            ],
            "Metascore": "74",
            "Response": "True"
        })
    }

    #[test]
    fn test_flatten_omdb_ratings() {
        let flat = flatten(&omdb_payload());

        assert_eq!(flat["Title"], json!("Inception"));
        assert_eq!(flat["Ratings_0_Source"], json!("Internet Movie Database"));
        assert_eq!(flat["Ratings_1_Value"], json!("87%"));
        assert!(!flat.contains_key("Ratings"));
        assert_eq!(flat.len(), 9);
    }

    #[test]
    fn test_flatten_deep_nesting() {
        let raw = json!({ "a": { "b": [ { "c": [1, 2] } ] } });
        let flat = flatten(&raw);
        assert_eq!(flat.len(), 2);
        assert_eq!(flat["a_b_0_c_0"], json!(1));
        assert_eq!(flat["a_b_0_c_1"], json!(2));
    }

    #[test]
    fn test_flatten_empty_containers_contribute_nothing() {
        let raw = json!({ "Title": "X", "Ratings": [], "Extra": {} });
        let flat = flatten(&raw);
        assert_eq!(flat.len(), 1);
        assert!(flat.contains_key("Title"));
    }

    #[test]
    fn test_flatten_root_sequence_and_scalar() {
        let flat = flatten(&json!(["x", "y"]));
        assert_eq!(flat["0"], json!("x"));
        assert_eq!(flat["1"], json!("y"));

        let flat = flatten(&json!(42));
        assert_eq!(flat.len(), 1);
        assert_eq!(flat[""], json!(42));
    }

    #[test]
    fn test_flatten_keeps_null_and_bool_leaves() {
        let flat = flatten(&json!({ "DVD": null, "Adult": false }));
        assert_eq!(flat["DVD"], Value::Null);
        assert_eq!(flat["Adult"], json!(false));
    }

    #[test]
    fn test_flatten_preserves_leaves_on_renest() {
        let raw = json!({
            "Title": "Heat",
            "Ratings": [
                { "Source": "IMDb", "Value": "8.3/10" },
                { "Source": "Metacritic", "Value": "76/100" }
            ],
            "Box": { "Gross": 187436818, "Tags": ["crime", "drama"] }
        });
        assert_eq!(renest(&flatten(&raw)), raw);
    }

    #[test]
    fn test_flatten_is_identity_on_flat_input() {
        let once = flatten(&omdb_payload());
        let as_value = Value::Object(once.clone().into_iter().collect());
        let twice = flatten(&as_value);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_flatten_determinism() {
        let baseline = flatten(&omdb_payload());
        for _ in 0..10 {
            assert_eq!(flatten(&omdb_payload()), baseline);
        }
    }

    #[test]
    fn test_leaf_text() {
        assert_eq!(leaf_text(&json!("8.8/10")).as_deref(), Some("8.8/10"));
        assert_eq!(leaf_text(&json!(74)).as_deref(), Some("74"));
        assert_eq!(leaf_text(&json!(true)).as_deref(), Some("true"));
        assert_eq!(leaf_text(&Value::Null), None);
    }
}
