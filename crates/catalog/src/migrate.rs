//! Catalog document migrations.
//!
//! Each migration takes the raw document from `version - 1` to `version`.
//! They are applied in ascending order on open and are idempotent: running
//! one against a document already at or past its target shape is a no-op.

use serde_json::Value;

use spg_domain::error::{ErrorKind, Result};

pub type Migration = fn(&mut Value);

/// `(target_version, migration)` pairs, ascending.
pub const MIGRATIONS: &[(u32, Migration)] = &[(2, filters_array_to_map), (3, rename_enabled_to_active)];

/// v1 stored `filters` as an array; v2 keys the map by id.
fn filters_array_to_map(doc: &mut Value) {
    let filters = match doc.get_mut("filters") {
        Some(Value::Array(items)) => std::mem::take(items),
        _ => return,
    };
    let mut map = serde_json::Map::new();
    for item in filters {
        if let Some(id) = item.get("id").and_then(Value::as_str) {
            map.insert(id.to_string(), item.clone());
        }
    }
    doc["filters"] = Value::Object(map);
}

/// v2 called the activation flag `enabled`; v3 calls it `active` and
/// guarantees every definition carries a `version` string.
fn rename_enabled_to_active(doc: &mut Value) {
    let filters = match doc.get_mut("filters").and_then(Value::as_object_mut) {
        Some(map) => map,
        None => return,
    };
    for def in filters.values_mut() {
        let Some(obj) = def.as_object_mut() else {
            continue;
        };
        if let Some(enabled) = obj.remove("enabled") {
            obj.entry("active").or_insert(enabled);
        }
        obj.entry("version").or_insert(Value::String("1.0".into()));
    }
}

/// Bring a raw document up to `target`, applying pending migrations in
/// ascending order. Documents newer than `target` are refused.
pub fn migrate_to(doc: &mut Value, target: u32) -> Result<()> {
    let current = doc
        .get("schema_version")
        .and_then(Value::as_u64)
        .unwrap_or(1) as u32;

    if current > target {
        return Err(ErrorKind::Internal(format!(
            "catalog schema version {current} is newer than supported version {target}"
        )));
    }

    for (version, migration) in MIGRATIONS {
        if *version > current && *version <= target {
            migration(doc);
            tracing::debug!(version, "applied catalog migration");
        }
    }
    doc["schema_version"] = Value::from(target);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn v1_array_becomes_keyed_map() {
        let mut doc = json!({
            "schema_version": 1,
            "filters": [
                {"id": "a", "name": "A", "kind": "record", "enabled": true},
                {"id": "b", "name": "B", "kind": "field", "enabled": false}
            ]
        });
        migrate_to(&mut doc, 3).unwrap();
        assert_eq!(doc["schema_version"], 3);
        assert_eq!(doc["filters"]["a"]["name"], "A");
        assert_eq!(doc["filters"]["b"]["active"], false);
        assert!(doc["filters"]["b"].get("enabled").is_none());
        assert_eq!(doc["filters"]["a"]["version"], "1.0");
    }

    #[test]
    fn migrations_are_idempotent() {
        let mut doc = json!({
            "schema_version": 1,
            "filters": [{"id": "a", "name": "A", "kind": "record"}]
        });
        migrate_to(&mut doc, 3).unwrap();
        let once = doc.clone();
        // Re-running against an already-current document changes nothing.
        migrate_to(&mut doc, 3).unwrap();
        assert_eq!(doc, once);
    }

    #[test]
    fn current_documents_pass_through() {
        let mut doc = json!({
            "schema_version": 3,
            "filters": {"a": {"id": "a", "active": true, "version": "1.0"}}
        });
        let before = doc.clone();
        migrate_to(&mut doc, 3).unwrap();
        assert_eq!(doc, before);
    }

    #[test]
    fn newer_documents_are_refused() {
        let mut doc = json!({"schema_version": 9, "filters": {}});
        assert!(migrate_to(&mut doc, 3).is_err());
    }
}
