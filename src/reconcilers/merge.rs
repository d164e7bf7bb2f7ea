// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! JSON merge patch (RFC 7386) computation and additive metadata merging.
//!
//! A merge patch from `original` to `modified` contains every key whose value
//! changed, `null` for every key that was removed, and recurses into nested
//! objects. Arrays are replaced whole. An empty object means "no change".

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Compute the merge patch that turns `original` into `modified`.
///
/// When either side is not an object the patch is `modified` itself, which a
/// merge-patch consumer applies as a wholesale replacement.
#[must_use]
pub fn merge_patch(original: &Value, modified: &Value) -> Value {
    match (original, modified) {
        (Value::Object(orig), Value::Object(modi)) => Value::Object(diff_objects(orig, modi)),
        _ => modified.clone(),
    }
}

fn diff_objects(original: &Map<String, Value>, modified: &Map<String, Value>) -> Map<String, Value> {
    let mut patch = Map::new();

    for key in original.keys() {
        if !modified.contains_key(key) {
            patch.insert(key.clone(), Value::Null);
        }
    }

    for (key, new_value) in modified {
        match original.get(key) {
            Some(old_value) if old_value == new_value => {}
            Some(Value::Object(old)) => {
                if let Value::Object(new) = new_value {
                    let nested = diff_objects(old, new);
                    if !nested.is_empty() {
                        patch.insert(key.clone(), Value::Object(nested));
                    }
                } else {
                    patch.insert(key.clone(), new_value.clone());
                }
            }
            _ => {
                patch.insert(key.clone(), new_value.clone());
            }
        }
    }

    patch
}

/// `true` when the patch would not change anything.
#[must_use]
pub fn is_empty_patch(patch: &Value) -> bool {
    matches!(patch, Value::Object(map) if map.is_empty())
}

/// Merge `desired` into `stored`, keeping every stored key `desired` lacks.
///
/// Desired values win on conflict. Returns `None` only when both sides are
/// absent, so an object without labels stays without a `labels` field.
#[must_use]
pub fn merge_string_maps(
    stored: Option<&BTreeMap<String, String>>,
    desired: Option<&BTreeMap<String, String>>,
) -> Option<BTreeMap<String, String>> {
    match (stored, desired) {
        (None, None) => None,
        (stored, desired) => {
            let mut merged = stored.cloned().unwrap_or_default();
            if let Some(desired) = desired {
                merged.extend(desired.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            Some(merged)
        }
    }
}

/// Merge owner references by uid.
///
/// References already on the stored object are kept in place; a desired
/// reference with a matching uid replaces the stored one, anything new is
/// appended.
#[must_use]
pub fn merge_owner_references(
    stored: Option<&Vec<OwnerReference>>,
    desired: Option<&Vec<OwnerReference>>,
) -> Option<Vec<OwnerReference>> {
    match (stored, desired) {
        (None, None) => None,
        (stored, desired) => {
            let mut merged = stored.cloned().unwrap_or_default();
            for reference in desired.into_iter().flatten() {
                match merged.iter_mut().find(|r| r.uid == reference.uid) {
                    Some(existing) => *existing = reference.clone(),
                    None => merged.push(reference.clone()),
                }
            }
            Some(merged)
        }
    }
}

#[cfg(test)]
#[path = "merge_tests.rs"]
mod merge_tests;
