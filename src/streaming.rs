//! Streaming-style page decode — spec §4.3 step 6.
//!
//! Vendor page payloads wrap their item array under a vendor-specific key
//! (`Items` for Jellyfin/Emby, `MediaContainer.Metadata` for Plex) rather
//! than at the JSON top level, so `serde_json`'s top-level
//! `StreamDeserializer` can't be pointed at the array directly. `items_in`
//! parses the page once, locates the array via `ws_adapters::json_path`,
//! and yields each element independently — one malformed element is
//! dropped at the call site (`toState` failing) without poisoning the rest
//! of the page.

use ws_adapters::json_path;
use ws_types::{AdapterError, BackendKind, RawItem};

/// Where the item array lives in a page payload, per vendor (spec §4.3 step
/// 6's "`/Items` (or vendor equivalent)").
pub fn items_path(kind: BackendKind) -> &'static [&'static str] {
    match kind {
        BackendKind::Plex => &["MediaContainer", "Metadata"],
        BackendKind::Jellyfin | BackendKind::Emby => &["Items"],
    }
}

/// Locate the item array at `path` within `body` and decode it into
/// `RawItem`s. The page itself must be well-formed JSON (a malformed page
/// is a hard error, per spec §4.3's "failed page request" failure
/// semantics); individual array elements are handed through untouched,
/// since per-item validation happens in the adapter's `toState`.
pub fn items_in(body: &[u8], path: &[&str]) -> Result<Vec<RawItem>, AdapterError> {
    let root: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| AdapterError::validation(format!("malformed page payload: {e}")))?;

    let array = json_path::get(&root, path)
        .and_then(serde_json::Value::as_array)
        .cloned()
        .unwrap_or_default();

    Ok(array.into_iter().map(RawItem::new).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_items_under_nested_key() {
        let body = serde_json::json!({"Items": [{"Id": "1"}, {"Id": "2"}]});
        let items = items_in(body.to_string().as_bytes(), &["Items"]).unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn missing_key_yields_empty_not_error() {
        let body = serde_json::json!({"TotalRecordCount": 0});
        let items = items_in(body.to_string().as_bytes(), &["Items"]).unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn malformed_page_is_an_error() {
        let err = items_in(b"not json", &["Items"]).unwrap_err();
        assert!(err.message.contains("malformed"));
    }
}
