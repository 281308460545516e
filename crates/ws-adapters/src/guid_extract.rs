//! Shared GUID-extraction helper — every vendor payload hands us
//! `(source_tag, value)` pairs in its own shape; this is where they funnel
//! into the validated `guids` map (spec §3: unknown/invalid sources are
//! discarded with a warning, never stored).

use std::collections::BTreeMap;

use ws_types::ExternalSource;

/// Parse and validate one `(source, value)` pair, inserting it into `into`
/// on success. Unknown sources and values failing their source's pattern
/// are logged and dropped.
pub fn push_validated(into: &mut BTreeMap<String, String>, source_tag: &str, value: &str) {
    match ExternalSource::parse(source_tag) {
        Some(source) if source.validate(value) => {
            into.insert(source.as_str().to_owned(), value.to_owned());
        }
        Some(source) => {
            tracing::warn!(source = %source, value, "external id failed source validation pattern, discarding");
        }
        None => {
            tracing::warn!(source = source_tag, value, "unrecognized external id source, discarding");
        }
    }
}
