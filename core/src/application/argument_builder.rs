// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Turns task text plus a tool's input schema into a concrete arguments
//! object (C10, spec §4.10). Four passes per required field, in order:
//! declared extraction pattern, name-driven heuristic, a narrowly scoped
//! Advisor call for whatever is still missing, then declared defaults.
//! Never invents a value for a field with no supporting evidence.

use std::time::Duration;

use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::schema::{FieldSchema, Schema};
use crate::infrastructure::advisor_client::AdvisorClient;

const ADVISOR_FILL_TIMEOUT: Duration = Duration::from_millis(2500);

#[derive(Debug, Error, PartialEq)]
pub enum ArgumentBuildError {
    #[error("arguments incomplete: {fields:?}")]
    Incomplete { fields: Vec<String> },
    #[error("assembled arguments violate the tool's schema: {0}")]
    SchemaViolation(String),
}

pub struct ArgumentBuilder<'a> {
    advisor: &'a AdvisorClient,
}

impl<'a> ArgumentBuilder<'a> {
    pub fn new(advisor: &'a AdvisorClient) -> Self {
        Self { advisor }
    }

    pub async fn build(&self, task_text: &str, schema: &Schema) -> Result<Value, ArgumentBuildError> {
        let Some((properties, required)) = schema.as_object_fields() else {
            return Ok(Value::Object(Map::new()));
        };

        let mut built = Map::new();
        for (name, field) in properties {
            if let Some(value) = extract_by_pattern(field, task_text) {
                built.insert(name.clone(), value);
            } else if let Some(value) = heuristic_from_name(name, task_text) {
                built.insert(name.clone(), value);
            }
        }

        let mut missing: Vec<String> =
            required.iter().filter(|f| !built.contains_key(f.as_str())).cloned().collect();

        if !missing.is_empty() {
            if let Some(filled) = self.try_advisor_fill(task_text, properties, &missing).await {
                for (name, value) in filled {
                    built.insert(name, value);
                }
                missing = required.iter().filter(|f| !built.contains_key(f.as_str())).cloned().collect();
            }
        }

        for name in &missing {
            if let Some(field) = properties.get(name) {
                if let Some(default) = &field.default {
                    built.insert(name.clone(), default.clone());
                }
            }
        }
        let missing: Vec<String> =
            required.iter().filter(|f| !built.contains_key(f.as_str())).cloned().collect();
        if !missing.is_empty() {
            return Err(ArgumentBuildError::Incomplete { fields: missing });
        }

        let assembled = Value::Object(built);
        if !schema.accepts(&assembled) {
            return Err(ArgumentBuildError::SchemaViolation(format!(
                "assembled arguments do not satisfy the declared schema: {assembled}"
            )));
        }
        Ok(assembled)
    }

    async fn try_advisor_fill(
        &self,
        task_text: &str,
        properties: &std::collections::BTreeMap<String, FieldSchema>,
        missing: &[String],
    ) -> Option<Vec<(String, Value)>> {
        let mut prompt = String::new();
        prompt.push_str("Task: ");
        prompt.push_str(task_text);
        prompt.push_str("\n\nProvide values for these fields as a single JSON object, one key per field:\n");
        for name in missing {
            let description = properties.get(name).and_then(|f| f.description.as_deref()).unwrap_or("");
            prompt.push_str(&format!("- {name}: {description}\n"));
        }
        prompt.push_str("\nReply with exactly one JSON object and no other text.\n");

        let reply = self.advisor.complete(prompt, ADVISOR_FILL_TIMEOUT).await.ok()?;
        let parsed: Value = serde_json::from_str(reply.trim()).ok()?;
        let object = parsed.as_object()?;
        Some(
            missing
                .iter()
                .filter_map(|name| object.get(name).map(|v| (name.clone(), v.clone())))
                .collect(),
        )
    }
}

fn extract_by_pattern(field: &FieldSchema, task_text: &str) -> Option<Value> {
    let pattern = field.extraction_pattern.as_ref()?;
    let re = Regex::new(pattern).ok()?;
    let captured = re.captures(task_text)?;
    let text = captured.get(1).or_else(|| captured.get(0))?.as_str();
    Some(coerce(&field.schema, text))
}

/// Name-driven heuristics for common field shapes: `path`/`url`-like
/// fields take the first path- or URL-looking token in the task text,
/// `count`/`limit`-like fields take the first integer, everything else
/// is left for the Advisor pass.
fn heuristic_from_name(name: &str, task_text: &str) -> Option<Value> {
    let lower = name.to_lowercase();
    if lower.contains("path") || lower.contains("file") {
        task_text.split_whitespace().find(|t| t.contains('/') || t.contains('.')).map(|t| Value::String(t.to_string()))
    } else if lower.contains("url") {
        task_text.split_whitespace().find(|t| t.starts_with("http://") || t.starts_with("https://")).map(|t| Value::String(t.to_string()))
    } else if lower.contains("count") || lower.contains("limit") {
        task_text.split_whitespace().find_map(|t| t.parse::<i64>().ok()).map(|n| Value::Number(n.into()))
    } else if lower == "query" || lower.contains("text") {
        Some(Value::String(task_text.to_string()))
    } else {
        None
    }
}

fn coerce(schema: &Schema, text: &str) -> Value {
    match schema {
        Schema::Number => text.parse::<f64>().ok().and_then(serde_json::Number::from_f64).map(Value::Number).unwrap_or_else(|| Value::String(text.to_string())),
        Schema::Boolean => text.parse::<bool>().map(Value::Bool).unwrap_or_else(|_| Value::String(text.to_string())),
        _ => Value::String(text.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn advisor() -> AdvisorClient {
        AdvisorClient::new("http://127.0.0.1:1", "test-model", Duration::from_millis(10))
    }

    fn schema_with(name: &str, field: FieldSchema, required: bool) -> Schema {
        let mut properties = BTreeMap::new();
        properties.insert(name.to_string(), field);
        Schema::Object { properties, required: if required { vec![name.to_string()] } else { vec![] } }
    }

    #[tokio::test]
    async fn extraction_pattern_wins_over_heuristic() {
        let field = FieldSchema {
            schema: Schema::String { pattern: None },
            extraction_pattern: Some(r"path=(\S+)".to_string()),
            default: None,
            description: None,
        };
        let schema = schema_with("path", field, true);
        let client = advisor();
        let builder = ArgumentBuilder::new(&client);
        let result = builder.build("please read path=/tmp/x.txt now", &schema).await.unwrap();
        assert_eq!(result["path"], "/tmp/x.txt");
    }

    #[tokio::test]
    async fn falls_back_to_default_when_nothing_found() {
        let field = FieldSchema {
            schema: Schema::Number,
            extraction_pattern: None,
            default: Some(serde_json::json!(10)),
            description: None,
        };
        let schema = schema_with("limit", field, true);
        let client = advisor();
        let builder = ArgumentBuilder::new(&client);
        let result = builder.build("do a thing with no numbers here", &schema).await.unwrap();
        assert_eq!(result["limit"], 10);
    }

    #[tokio::test]
    async fn default_violating_the_schema_is_rejected() {
        let field = FieldSchema {
            schema: Schema::Enum { values: vec!["low".into(), "high".into()] },
            extraction_pattern: None,
            default: Some(serde_json::json!("medium")),
            description: None,
        };
        let schema = schema_with("priority", field, true);
        let client = advisor();
        let builder = ArgumentBuilder::new(&client);
        let err = builder.build("do a thing", &schema).await.unwrap_err();
        assert!(matches!(err, ArgumentBuildError::SchemaViolation(_)));
    }

    #[tokio::test]
    async fn missing_required_field_with_no_evidence_fails() {
        let field = FieldSchema {
            schema: Schema::String { pattern: None },
            extraction_pattern: None,
            default: None,
            description: None,
        };
        let schema = schema_with("recipient", field, true);
        let client = advisor();
        let builder = ArgumentBuilder::new(&client);
        let err = builder.build("send a message", &schema).await.unwrap_err();
        assert!(matches!(err, ArgumentBuildError::Incomplete { .. }));
    }
}
