// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! A tagged-enum JSON-Schema-like structure (spec §9: "dynamic argument
//! construction via runtime type probing becomes explicit walk of a schema
//! data structure... no reflection"). The Argument Builder pattern-matches
//! on `Schema`; nothing here inspects Rust types at runtime.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSchema {
    pub schema: Schema,
    /// Regex or enum recognizer used by the Argument Builder's first
    /// extraction pass (spec §4.10 step 1).
    pub extraction_pattern: Option<String>,
    pub default: Option<serde_json::Value>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Schema {
    Object {
        properties: BTreeMap<String, FieldSchema>,
        required: Vec<String>,
    },
    Array {
        items: Box<Schema>,
    },
    String {
        #[serde(skip_serializing_if = "Option::is_none")]
        pattern: Option<String>,
    },
    Number,
    Boolean,
    Enum {
        values: Vec<String>,
    },
}

impl Schema {
    pub fn as_object_fields(&self) -> Option<(&BTreeMap<String, FieldSchema>, &[String])> {
        match self {
            Schema::Object { properties, required } => Some((properties, required.as_slice())),
            _ => None,
        }
    }

    /// Type/enum validation used after argument assembly (spec §4.10:
    /// "validate the result against the schema: types, enum membership,
    /// required presence").
    pub fn accepts(&self, value: &serde_json::Value) -> bool {
        match self {
            Schema::Object { properties, .. } => {
                let Some(obj) = value.as_object() else { return false };
                obj.iter().all(|(k, v)| {
                    properties.get(k).map(|field| field.schema.accepts(v)).unwrap_or(true)
                })
            }
            Schema::Array { items } => value
                .as_array()
                .map(|arr| arr.iter().all(|v| items.accepts(v)))
                .unwrap_or(false),
            Schema::String { .. } => value.is_string(),
            Schema::Number => value.is_number(),
            Schema::Boolean => value.is_boolean(),
            Schema::Enum { values } => value
                .as_str()
                .map(|s| values.iter().any(|v| v == s))
                .unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn enum_accepts_only_declared_values() {
        let schema = Schema::Enum { values: vec!["a".into(), "b".into()] };
        assert!(schema.accepts(&json!("a")));
        assert!(!schema.accepts(&json!("c")));
    }

    #[test]
    fn object_validates_declared_properties() {
        let mut properties = BTreeMap::new();
        properties.insert(
            "path".to_string(),
            FieldSchema {
                schema: Schema::String { pattern: None },
                extraction_pattern: None,
                default: None,
                description: None,
            },
        );
        let schema = Schema::Object { properties, required: vec!["path".into()] };
        assert!(schema.accepts(&json!({ "path": "/tmp/x" })));
        assert!(!schema.accepts(&json!({ "path": 5 })));
    }
}
