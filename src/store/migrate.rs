//! Versioned migration of legacy correction files.
//!
//! Early review runs used a different status taxonomy (`pending`, `approved`,
//! `edited`, `deleted`). Migration is a pure function over the raw JSON value,
//! applied by the store immediately after load and before any typed
//! deserialization or validation — never inside the save path.

use serde_json::Value;

use super::records::FORMAT_VERSION;

/// Legacy (format 0) status names and their current equivalents.
const LEGACY_STATUSES: &[(&str, &str)] = &[
    ("pending", "undefined"),
    ("approved", "confirmed_without_changes"),
    ("edited", "confirmed_with_changes"),
    ("deleted", "rejected"),
];

/// Bring a raw correction-file value up to the current format. Returns true
/// if anything was rewritten.
pub fn migrate_value(value: &mut Value) -> bool {
    if !value.is_object() {
        return false;
    }
    let version = value
        .get("format_version")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    if version >= u64::from(FORMAT_VERSION) {
        return false;
    }

    if let Some(tables) = value.get_mut("tables").and_then(Value::as_object_mut) {
        for record in tables.values_mut() {
            let Some(status) = record.get("status").and_then(Value::as_str) else {
                continue;
            };
            if let Some((_, current)) = LEGACY_STATUSES.iter().find(|(old, _)| *old == status) {
                record["status"] = Value::String((*current).to_string());
            }
        }
    }

    value["format_version"] = Value::from(FORMAT_VERSION);
    true
}
