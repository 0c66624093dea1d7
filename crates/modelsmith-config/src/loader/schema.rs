//! Schema validation helpers for modelsmith JSON5 configuration.

use crate::ConfigError;
use serde_json::{Map, Value};

/// Category names accepted in `policy.extra_rules[].category`.
const POLICY_CATEGORIES: &[&str] = &[
    "file_system",
    "process_control",
    "network",
    "reflection",
    "self_reference",
];

/// Generator providers this build knows how to construct.
const GENERATOR_PROVIDERS: &[&str] = &["gemini"];

/// Check one layer, or the merged value, against the schema.
pub(super) fn validate_layer_schema(value: &Value, layer: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, "")?;
    let allowed = ["$schema", "policy", "capabilities", "execution", "generator"];
    ensure_allowed_keys(map, &allowed, layer, "")?;

    if let Some(value) = map.get("$schema") {
        expect_string(value, layer, "$schema")?;
    }
    if let Some(value) = map.get("policy") {
        validate_policy(value, layer, "policy")?;
    }
    if let Some(value) = map.get("capabilities") {
        validate_capabilities(value, layer, "capabilities")?;
    }
    if let Some(value) = map.get("execution") {
        validate_execution(value, layer, "execution")?;
    }
    if let Some(value) = map.get("generator") {
        validate_generator(value, layer, "generator")?;
    }

    Ok(())
}

/// Validate the "policy" block.
fn validate_policy(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, &["extra_rules", "max_code_bytes"], layer, path)?;

    if let Some(value) = map.get("extra_rules") {
        let rules_path = join_path(path, "extra_rules");
        let arr = expect_array(value, layer, &rules_path)?;
        for (idx, entry) in arr.iter().enumerate() {
            validate_policy_rule(entry, layer, &format!("{rules_path}[{idx}]"))?;
        }
    }
    if let Some(value) = map.get("max_code_bytes") {
        expect_optional_u64(value, layer, &join_path(path, "max_code_bytes"))?;
    }
    Ok(())
}

/// Validate a single integrator policy rule.
fn validate_policy_rule(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, &["id", "category", "pattern"], layer, path)?;

    for key in ["id", "pattern"] {
        let field_path = join_path(path, key);
        let Some(value) = map.get(key) else {
            return Err(invalid_field(layer, &field_path, "missing required field"));
        };
        expect_string(value, layer, &field_path)?;
    }

    let category_path = join_path(path, "category");
    let Some(category) = map.get("category") else {
        return Err(invalid_field(layer, &category_path, "missing required field"));
    };
    match category.as_str() {
        Some(name) if POLICY_CATEGORIES.contains(&name) => Ok(()),
        Some(_) => Err(invalid_field(layer, &category_path, "invalid policy category")),
        None => Err(invalid_field(layer, &category_path, "expected string")),
    }
}

/// Validate the "capabilities" block.
fn validate_capabilities(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, &["approved"], layer, path)?;
    if let Some(value) = map.get("approved") {
        validate_string_array(value, layer, &join_path(path, "approved"))?;
    }
    Ok(())
}

/// Validate the "execution" block.
fn validate_execution(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    let allowed = [
        "workspace_prefix",
        "max_operations",
        "timeout_ms",
        "max_call_levels",
        "max_expr_depth",
        "max_string_size",
        "max_array_size",
        "max_map_size",
    ];
    ensure_allowed_keys(map, &allowed, layer, path)?;

    if let Some(value) = map.get("workspace_prefix") {
        expect_string(value, layer, &join_path(path, "workspace_prefix"))?;
    }
    for key in ["max_operations", "timeout_ms"] {
        if let Some(value) = map.get(key) {
            expect_optional_u64(value, layer, &join_path(path, key))?;
        }
    }
    for key in [
        "max_call_levels",
        "max_expr_depth",
        "max_string_size",
        "max_array_size",
        "max_map_size",
    ] {
        if let Some(value) = map.get(key) {
            expect_u64(value, layer, &join_path(path, key))?;
        }
    }
    Ok(())
}

/// Validate the "generator" block.
fn validate_generator(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    let allowed = [
        "provider",
        "model",
        "endpoint",
        "api_key_env",
        "temperature",
        "max_output_tokens",
        "additional_instructions",
    ];
    ensure_allowed_keys(map, &allowed, layer, path)?;

    if let Some(value) = map.get("provider") {
        let provider_path = join_path(path, "provider");
        match value.as_str() {
            Some(name) if GENERATOR_PROVIDERS.contains(&name) => {}
            Some(_) => {
                return Err(invalid_field(layer, &provider_path, "unknown provider"));
            }
            None => return Err(invalid_field(layer, &provider_path, "expected string")),
        }
    }
    for key in ["model", "endpoint", "api_key_env"] {
        if let Some(value) = map.get(key) {
            expect_string(value, layer, &join_path(path, key))?;
        }
    }
    if let Some(value) = map.get("temperature") {
        expect_f64(value, layer, &join_path(path, "temperature"))?;
    }
    if let Some(value) = map.get("max_output_tokens") {
        expect_u64(value, layer, &join_path(path, "max_output_tokens"))?;
    }
    if let Some(value) = map.get("additional_instructions") {
        if !value.is_null() {
            expect_string(value, layer, &join_path(path, "additional_instructions"))?;
        }
    }
    Ok(())
}

fn expect_object<'a>(
    value: &'a Value,
    layer: &str,
    path: &str,
) -> Result<&'a Map<String, Value>, ConfigError> {
    value
        .as_object()
        .ok_or_else(|| invalid_field(layer, path, "expected object"))
}

fn expect_array<'a>(
    value: &'a Value,
    layer: &str,
    path: &str,
) -> Result<&'a Vec<Value>, ConfigError> {
    value
        .as_array()
        .ok_or_else(|| invalid_field(layer, path, "expected array"))
}

fn expect_string(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.is_string() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected string"))
    }
}

/// Expect a non-negative JSON integer.
fn expect_u64(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.is_u64() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected non-negative integer"))
    }
}

/// Expect a non-negative JSON integer or null (unbounded).
fn expect_optional_u64(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.is_null() {
        return Ok(());
    }
    expect_u64(value, layer, path)
}

/// Expect any JSON number.
fn expect_f64(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.is_number() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected number"))
    }
}

fn validate_string_array(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let arr = expect_array(value, layer, path)?;
    for (idx, entry) in arr.iter().enumerate() {
        if !entry.is_string() {
            return Err(invalid_field(
                layer,
                &format!("{path}[{idx}]"),
                "expected string",
            ));
        }
    }
    Ok(())
}

/// Unknown keys are errors at every level.
fn ensure_allowed_keys(
    map: &Map<String, Value>,
    allowed: &[&str],
    layer: &str,
    path: &str,
) -> Result<(), ConfigError> {
    match map.keys().find(|key| !allowed.contains(&key.as_str())) {
        Some(key) => Err(invalid_field(layer, &join_path(path, key), "unknown key")),
        None => Ok(()),
    }
}

/// Join nested paths for error messages.
fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Build a structured invalid-field error.
fn invalid_field(layer: &str, path: &str, message: &str) -> ConfigError {
    let normalized_path = if path.is_empty() { "root" } else { path };
    ConfigError::InvalidField {
        path: format!("{layer}:{normalized_path}"),
        message: message.to_string(),
    }
}
