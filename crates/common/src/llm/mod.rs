//! LLM client abstraction
//!
//! Provides:
//! - The `LlmClient` seam used by routing and map-reduce synthesis
//! - An OpenAI chat-completions client with retry on transient failures
//! - Structured (JSON schema) completion parsing

mod openai;

pub use openai::OpenAIChatClient;

use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde_json::Value;

/// Trait for text and structured completions
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Free-text completion
    async fn get_completion(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        max_tokens: Option<usize>,
    ) -> Result<String>;

    /// JSON completion; the returned object carries every key the schema requires
    async fn get_structured_completion(
        &self,
        prompt: &str,
        schema: &Value,
        system_prompt: Option<&str>,
    ) -> Result<Value>;
}

/// Parse a model's JSON answer and check it against the schema's `required` keys
pub fn parse_structured(text: &str, schema: &Value) -> Result<Value> {
    let body = strip_code_fences(text);

    let value: Value = serde_json::from_str(body).map_err(|e| AppError::MalformedResponse {
        message: format!(
            "Failed to parse JSON response: {} (response: {})",
            e,
            text.chars().take(200).collect::<String>()
        ),
    })?;

    let object = value.as_object().ok_or_else(|| AppError::MalformedResponse {
        message: "Structured response is not a JSON object".to_string(),
    })?;

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for key in required.iter().filter_map(Value::as_str) {
            if !object.contains_key(key) {
                return Err(AppError::MalformedResponse {
                    message: format!("Structured response is missing required key '{}'", key),
                });
            }
        }
    }

    Ok(value)
}

/// Whether a JSON schema satisfies OpenAI strict structured-output rules:
/// every object closes `additionalProperties` and requires all of its properties
pub fn is_strict_schema(schema: &Value) -> bool {
    if let Some(items) = schema.get("items") {
        if !is_strict_schema(items) {
            return false;
        }
    }
    if schema.get("type").and_then(Value::as_str) != Some("object") {
        return true;
    }
    if schema.get("additionalProperties") != Some(&Value::Bool(false)) {
        return false;
    }

    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|keys| keys.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    match schema.get("properties").and_then(Value::as_object) {
        Some(properties) => properties
            .iter()
            .all(|(key, property)| required.contains(&key.as_str()) && is_strict_schema(property)),
        None => true,
    }
}

fn strip_code_fences(text: &str) -> &str {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```json") {
        body = rest;
    } else if let Some(rest) = body.strip_prefix("```") {
        body = rest;
    }
    if let Some(rest) = body.strip_suffix("```") {
        body = rest;
    }
    body.trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entities_schema() -> Value {
        json!({
            "type": "object",
            "properties": {"entities": {"type": "array", "items": {"type": "string"}}},
            "required": ["entities"]
        })
    }

    #[test]
    fn test_parses_plain_json() {
        let value = parse_structured(r#"{"entities": ["Raft"]}"#, &entities_schema()).unwrap();
        assert_eq!(value["entities"][0], "Raft");
    }

    #[test]
    fn test_strips_markdown_fences() {
        let text = "```json\n{\"entities\": [\"Paxos\", \"DHT\"]}\n```";
        let value = parse_structured(text, &entities_schema()).unwrap();
        assert_eq!(value["entities"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn test_missing_required_key_is_data_error() {
        let err = parse_structured(r#"{"names": []}"#, &entities_schema()).unwrap_err();
        assert!(matches!(err, AppError::MalformedResponse { .. }));
    }

    #[test]
    fn test_non_object_rejected() {
        let err = parse_structured(r#"["Raft"]"#, &entities_schema()).unwrap_err();
        assert!(matches!(err, AppError::MalformedResponse { .. }));
    }

    #[test]
    fn test_strict_schema_requires_closed_objects() {
        assert!(!is_strict_schema(&entities_schema()));

        let mut closed = entities_schema();
        closed["additionalProperties"] = json!(false);
        assert!(is_strict_schema(&closed));

        let optional = json!({
            "type": "object",
            "properties": {"entities": {"type": "string"}, "note": {"type": "string"}},
            "required": ["entities"],
            "additionalProperties": false
        });
        assert!(!is_strict_schema(&optional));

        let nested_open = json!({
            "type": "object",
            "properties": {"items": {"type": "array", "items": {"type": "object"}}},
            "required": ["items"],
            "additionalProperties": false
        });
        assert!(!is_strict_schema(&nested_open));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(parse_structured("I think the entities are Raft", &entities_schema()).is_err());
    }
}
