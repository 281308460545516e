//! The one generic dynamic-key accessor retained from the "dynamic `ag()`
//! nested-key access" anti-pattern flagged in spec §9 — used strictly for
//! decoding vendor payload shapes, never for general state access.

use serde_json::Value;

/// Walk `path` through nested JSON objects/arrays-by-index, returning the
/// first missing/mistyped segment as `None`.
///
/// Array indices are path segments that parse as `usize`.
pub fn get<'v>(value: &'v Value, path: &[&str]) -> Option<&'v Value> {
    let mut cur = value;
    for segment in path {
        cur = match cur {
            Value::Object(map) => map.get(*segment)?,
            Value::Array(arr) => arr.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(cur)
}

pub fn get_str<'v>(value: &'v Value, path: &[&str]) -> Option<&'v str> {
    get(value, path).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn walks_nested_object_and_array() {
        let v = json!({"MediaContainer": {"Metadata": [{"Guid": "imdb://tt1"}]}});
        assert_eq!(
            get_str(&v, &["MediaContainer", "Metadata", "0", "Guid"]),
            Some("imdb://tt1")
        );
    }

    #[test]
    fn missing_segment_is_none() {
        let v = json!({"a": 1});
        assert!(get(&v, &["a", "b"]).is_none());
    }
}
