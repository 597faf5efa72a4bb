//! Output aggregation: folds result fragments into one flat artifact map.
//!
//! Fragment groups are applied in a fixed precedence order, lowest first:
//! the single-value upload locators, then `intermediate_outputs`,
//! `final_outputs`, `filter_outputs`, `multiresolution_outputs` and `metrics`.
//! A later group overwrites an earlier one on key collision.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// Artifact key to value (normally a relative URL path; metrics carry numbers).
pub type OutputMap = BTreeMap<String, Value>;

const SINGLE_VALUE_KEYS: [&str; 2] = ["element_url", "big_url"];
const MULTIRESOLUTION_GROUP: &str = "multiresolution_outputs";
const GROUP_KEYS: [&str; 5] = [
    "intermediate_outputs",
    "final_outputs",
    "filter_outputs",
    MULTIRESOLUTION_GROUP,
    "metrics",
];

/// Returns `current` overlaid with every recognised group of `fragment`.
///
/// The input map is never modified and merging the same fragment twice yields
/// the same map as merging it once.
pub fn merge(current: &OutputMap, fragment: &Value) -> OutputMap {
    let mut merged = current.clone();
    let Some(fields) = fragment.as_object() else {
        return merged;
    };

    for key in SINGLE_VALUE_KEYS {
        if let Some(value) = fields.get(key).filter(|value| !value.is_null()) {
            merged.insert(key.to_string(), value.clone());
        }
    }

    for group in GROUP_KEYS {
        if let Some(Value::Object(entries)) = fields.get(group) {
            overlay(&mut merged, group, entries);
        }
    }

    merged
}

fn overlay(merged: &mut OutputMap, group: &str, entries: &Map<String, Value>) {
    for (key, value) in entries {
        match value {
            Value::Null => {}
            // Per-size maps are flattened to `{size}_{artifact}`.
            Value::Object(nested) if group == MULTIRESOLUTION_GROUP => {
                for (nested_key, nested_value) in nested {
                    if !nested_value.is_null() {
                        merged.insert(format!("{key}_{nested_key}"), nested_value.clone());
                    }
                }
            }
            _ => {
                merged.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Looks up an artifact that is a URL path.
pub fn artifact_url<'a>(outputs: &'a OutputMap, key: &str) -> Option<&'a str> {
    outputs.get(key).and_then(Value::as_str)
}

/// Apply-filter responses may carry only `filtered_url`; lift it into
/// `filter_outputs.filtered_mosaic` so the aggregator picks it up.
pub fn normalize_filter_fragment(payload: &Value) -> Value {
    let mut normalized = payload.clone();
    let has_group = payload
        .get("filter_outputs")
        .is_some_and(Value::is_object);
    if has_group {
        return normalized;
    }
    if let (Some(url), Some(fields)) = (
        payload.get("filtered_url").and_then(Value::as_str),
        normalized.as_object_mut(),
    ) {
        let mut group = Map::new();
        group.insert("filtered_mosaic".to_string(), Value::String(url.to_string()));
        fields.insert("filter_outputs".to_string(), Value::Object(group));
    }
    normalized
}

/// The multiresolution endpoint reports its per-size map as `multi_outputs`.
pub fn normalize_multiresolution_fragment(payload: &Value) -> Value {
    let mut normalized = payload.clone();
    if payload.get(MULTIRESOLUTION_GROUP).is_some() {
        return normalized;
    }
    if let Some(fields) = normalized.as_object_mut() {
        if let Some(multi) = fields.remove("multi_outputs") {
            fields.insert(MULTIRESOLUTION_GROUP.to_string(), multi);
        }
    }
    normalized
}
