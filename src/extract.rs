//! Structural search over response payloads.
//!
//! The interesting data sits nested at varying depths and the server has
//! shipped more than one schema for it. Rather than enumerate absolute paths
//! and chase every schema change, `find_key` recursively collects every value
//! of a key anywhere in the payload; the schema-specific helpers below
//! post-process those results.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::model::CollectedRecord;

/// Entry ids that carry collectable records.
static RECORD_ENTRY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(tweet|user)-").expect("valid entry-id regex"));

/// Find all values of `key` anywhere within a nested JSON structure,
/// depth-first. Null values are skipped; a matched value's own children are
/// still searched.
pub fn find_key<'a>(value: &'a Value, key: &str) -> Vec<&'a Value> {
    fn walk<'a>(value: &'a Value, key: &str, out: &mut Vec<&'a Value>) {
        match value {
            Value::Object(map) => {
                if let Some(v) = map.get(key) {
                    if !v.is_null() {
                        out.push(v);
                    }
                }
                for v in map.values() {
                    walk(v, key, out);
                }
            }
            Value::Array(items) => {
                for v in items {
                    walk(v, key, out);
                }
            }
            _ => {}
        }
    }

    let mut out = Vec::new();
    walk(value, key, &mut out);
    out
}

/// All timeline entries in the payload whose entry id marks a record.
pub fn extract_entries(payload: &Value) -> Vec<&Value> {
    find_key(payload, "entries")
        .into_iter()
        .filter_map(Value::as_array)
        .flatten()
        .filter(|entry| {
            entry
                .get("entryId")
                .and_then(Value::as_str)
                .is_some_and(|id| RECORD_ENTRY_RE.is_match(id))
        })
        .collect()
}

/// Extract the continuation cursor from the payload, if any.
///
/// Cursor entries are tagged `cursor-bottom` or `cursor-showmorethreads`.
/// Two schema epochs are in the wild: the newer one nests the value under
/// `content.itemContent`, the older one exposes it at `content.value`.
/// Both are tried in that order.
pub fn extract_cursor(payload: &Value) -> Option<String> {
    let entries = find_key(payload, "entries");
    let last = entries.last().and_then(|v| v.as_array())?;
    for entry in last {
        let entry_id = entry.get("entryId").and_then(Value::as_str).unwrap_or("");
        if !entry_id.contains("cursor-bottom") && !entry_id.contains("cursor-showmorethreads") {
            continue;
        }
        let content = entry.get("content")?;
        if let Some(value) = content
            .get("itemContent")
            .and_then(|ic| ic.get("value"))
            .and_then(Value::as_str)
        {
            return Some(value.to_string());
        }
        if let Some(value) = content.get("value").and_then(Value::as_str) {
            return Some(value.to_string());
        }
    }
    None
}

/// Normalize one timeline entry into a `CollectedRecord`, tagged with the
/// query that produced it. Entries without a usable identity are dropped.
pub fn normalize_record(entry: &Value, query: &str) -> Option<CollectedRecord> {
    let id = find_key(entry, "rest_id")
        .into_iter()
        .find_map(Value::as_str)
        .map(str::to_string)
        .or_else(|| {
            entry
                .get("entryId")
                .and_then(Value::as_str)
                .and_then(|id| id.split_once('-'))
                .map(|(_, rest)| rest.to_string())
        })?;

    let text = find_key(entry, "full_text")
        .into_iter()
        .find_map(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Some(CollectedRecord {
        url: format!("https://twitter.com/i/status/{id}"),
        id,
        text,
        query: query.to_string(),
    })
}

/// Entries matched and normalized in one pass.
pub fn extract_records(payload: &Value, query: &str) -> Vec<CollectedRecord> {
    extract_entries(payload)
        .into_iter()
        .filter_map(|entry| normalize_record(entry, query))
        .collect()
}
