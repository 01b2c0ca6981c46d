// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Canonical JSON and Data Hashes
//!
//! Deterministic serialization used by the idempotency checker. Object keys
//! are sorted recursively, arrays keep their order, and no insignificant
//! whitespace is emitted, so two runs over identical declared input produce
//! byte-identical serializations and therefore identical SHA-256 digests.
//!
//! Numbers use serde_json's default representation; the pipeline never puts
//! NaN or infinities into declared stage inputs.

use std::collections::BTreeMap;

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Renders a JSON value in canonical form: sorted object keys, compact
/// separators, arrays in declared order.
pub fn to_canonical_json(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => serde_json::to_string(s).unwrap_or_default(),
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(to_canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        Value::Object(map) => {
            let mut tree = BTreeMap::new();
            for (k, v) in map {
                tree.insert(k, to_canonical_json(v));
            }
            let items: Vec<String> = tree
                .into_iter()
                .map(|(k, v)| format!("{}:{}", serde_json::to_string(&k).unwrap_or_default(), v))
                .collect();
            format!("{{{}}}", items.join(","))
        }
    }
}

/// SHA-256 hex digest of raw bytes.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// SHA-256 hex digest of a JSON value's canonical serialization.
///
/// This is the data hash stored in completion markers.
pub fn hash_value(value: &Value) -> String {
    hash_bytes(to_canonical_json(value).as_bytes())
}
