//! JSON merge helpers for layered configuration.

use serde_json::Value;

/// Array paths whose entries accumulate across layers instead of being replaced.
///
/// Policy rules only ever tighten the check, so every layer (including the
/// requirements layer) contributes its rules.
const APPEND_ONLY_PATHS: &[&str] = &["policy.extra_rules"];

/// Merge overlay values into the base, recursively overriding objects.
#[cfg(test)]
pub(super) fn merge_json_values(base: &mut Value, overlay: &Value) {
    merge_at(base, overlay, None, "");
}

/// Merge overlay values into base, honoring constraints when provided.
///
/// A key present as a leaf in `constraints` is locked: later layers cannot
/// change it. Append-only arrays are extended even when locked.
pub(super) fn merge_json_with_constraints(
    base: &mut Value,
    overlay: &Value,
    constraints: Option<&Value>,
) {
    merge_at(base, overlay, constraints, "");
}

fn merge_at(base: &mut Value, overlay: &Value, constraints: Option<&Value>, path: &str) {
    if APPEND_ONLY_PATHS.contains(&path) {
        append_entries(base, overlay);
        return;
    }
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            let constraint_map = match constraints {
                Some(Value::Object(map)) => Some(map),
                Some(_) => return,
                None => None,
            };
            for (key, value) in overlay_map {
                let child_path = join_path(path, key);
                let key_constraint = constraint_map.and_then(|map| map.get(key));
                let locked_leaf = matches!(key_constraint, Some(constraint) if !constraint.is_object());
                if locked_leaf && !APPEND_ONLY_PATHS.contains(&child_path.as_str()) {
                    continue;
                }
                match base_map.get_mut(key) {
                    Some(existing) => merge_at(existing, value, key_constraint, &child_path),
                    None => {
                        let mut slot = empty_like(value);
                        merge_at(&mut slot, value, key_constraint, &child_path);
                        base_map.insert(key.clone(), slot);
                    }
                }
            }
        }
        (base_slot, overlay_value) => {
            if constraints.is_none() {
                *base_slot = overlay_value.clone();
            }
        }
    }
}

/// Extend an array slot with overlay entries, replacing non-array bases.
fn append_entries(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Array(existing), Value::Array(entries)) => {
            existing.extend(entries.iter().cloned());
        }
        (base_slot, overlay_value) => {
            *base_slot = overlay_value.clone();
        }
    }
}

fn empty_like(value: &Value) -> Value {
    match value {
        Value::Object(_) => Value::Object(serde_json::Map::new()),
        Value::Array(_) => Value::Array(Vec::new()),
        _ => Value::Null,
    }
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}
