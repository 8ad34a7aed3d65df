//! OpenAI chat-completions client

use super::{is_strict_schema, parse_structured, LlmClient};
use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: usize,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

/// Chat-completions client bound to one model
pub struct OpenAIChatClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    default_max_tokens: usize,
    max_retry_elapsed: Duration,
}

impl OpenAIChatClient {
    /// Create a client for `model` using the shared provider settings
    pub fn new(config: &LlmConfig, model: &str) -> Result<Self> {
        if config.provider != "openai" {
            return Err(AppError::Configuration {
                message: format!("Unsupported LLM provider: {}", config.provider),
            });
        }
        let api_key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
            message: "llm.api_key is required".to_string(),
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.api_base.trim_end_matches('/')),
            api_key,
            model: model.to_string(),
            temperature: config.temperature,
            default_max_tokens: config.max_tokens,
            max_retry_elapsed: Duration::from_secs(config.max_retry_elapsed_secs),
        })
    }

    async fn complete(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        max_tokens: Option<usize>,
        response_format: Option<Value>,
    ) -> Result<String> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        let request = ChatRequest {
            model: &self.model,
            messages,
            max_tokens: max_tokens.unwrap_or(self.default_max_tokens),
            temperature: self.temperature,
            response_format,
        };

        let policy = ExponentialBackoff {
            max_elapsed_time: Some(self.max_retry_elapsed),
            ..Default::default()
        };

        let outcome = retry(policy, || async {
            self.send(&request).await.map_err(|e| {
                if e.is_retryable() {
                    tracing::warn!(model = %self.model, error = %e, "LLM request failed, retrying");
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
        })
        .await;

        metrics::record_llm_request(&self.model, outcome.is_ok());

        outcome.map_err(|e| match e {
            AppError::MalformedResponse { .. } => e,
            other => AppError::Llm {
                message: format!("LLM completion failed: {}", other),
            },
        })
    }

    async fn send(&self, request: &ChatRequest<'_>) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?
            .error_for_status()?;

        let chat_response: ChatResponse =
            response.json().await.map_err(|e| AppError::MalformedResponse {
                message: format!("Failed to parse LLM response: {}", e),
            })?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.unwrap_or_default())
            .ok_or_else(|| AppError::MalformedResponse {
                message: "Empty response from LLM".to_string(),
            })
    }
}

#[async_trait]
impl LlmClient for OpenAIChatClient {
    async fn get_completion(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        max_tokens: Option<usize>,
    ) -> Result<String> {
        self.complete(prompt, system_prompt, max_tokens, None).await
    }

    async fn get_structured_completion(
        &self,
        prompt: &str,
        schema: &Value,
        system_prompt: Option<&str>,
    ) -> Result<Value> {
        let text = self
            .complete(prompt, system_prompt, None, Some(response_format(schema)))
            .await?;
        parse_structured(&text, schema)
    }
}

/// `json_schema` response format; strict mode only for schemas the API accepts as strict
fn response_format(schema: &Value) -> Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": "response",
            "schema": schema,
            "strict": is_strict_schema(schema)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_api_key() {
        let err = OpenAIChatClient::new(&LlmConfig::default(), "gpt-4o-mini").err();
        assert!(matches!(err, Some(AppError::Configuration { .. })));
    }

    #[test]
    fn test_endpoint_joins_base() {
        let config = LlmConfig {
            api_key: Some("sk-test".into()),
            api_base: "http://localhost:8080/v1/".into(),
            ..Default::default()
        };
        let client = OpenAIChatClient::new(&config, "gpt-4o-mini").unwrap();
        assert_eq!(client.endpoint, "http://localhost:8080/v1/chat/completions");
        assert_eq!(client.model, "gpt-4o-mini");
    }

    #[test]
    fn test_request_omits_absent_response_format() {
        let request = ChatRequest {
            model: "m",
            messages: vec![ChatMessage {
                role: "user",
                content: "hi",
            }],
            max_tokens: 10,
            temperature: 0.0,
            response_format: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("response_format").is_none());
    }

    #[test]
    fn test_strict_flag_follows_schema() {
        let open = json!({
            "type": "object",
            "properties": {"entities": {"type": "array", "items": {"type": "string"}}},
            "required": ["entities"]
        });
        let format = response_format(&open);
        assert_eq!(format["type"], "json_schema");
        assert_eq!(format["json_schema"]["strict"], false);
        assert_eq!(format["json_schema"]["schema"], open);

        let mut closed = open.clone();
        closed["additionalProperties"] = json!(false);
        assert_eq!(response_format(&closed)["json_schema"]["strict"], true);
    }

    #[test]
    fn test_structured_request_body() {
        let schema = json!({
            "type": "object",
            "properties": {"entities": {"type": "array", "items": {"type": "string"}}},
            "required": ["entities"],
            "additionalProperties": false
        });
        let request = ChatRequest {
            model: "gpt-4o-mini",
            messages: vec![ChatMessage {
                role: "user",
                content: "Tell me about gossip",
            }],
            max_tokens: 100,
            temperature: 0.0,
            response_format: Some(response_format(&schema)),
        };
        let json = serde_json::to_value(&request).unwrap();
        let format = &json["response_format"]["json_schema"];
        assert_eq!(format["strict"], true);
        assert_eq!(format["schema"]["additionalProperties"], false);
    }
}
