//! Completion client for the OpenAI chat endpoint.
//!
//! Two call shapes are supported: free-text completions for the planning and
//! integration agents, and schema-forced "function call" completions used
//! whenever a single discrete value is needed (a search query, a URL, a
//! yes/no verdict) so no free text has to be parsed.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;

const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Completion calls block for at most this long.
const COMPLETION_TIMEOUT: Duration = Duration::from_secs(180);

/// The completion endpoint replied without the expected structure. Never
/// retried; aborts the current stage.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("completion request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("completion endpoint returned HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("completion reply contained no choices")]
    MissingChoices,

    #[error("completion reply contained no message content")]
    MissingContent,

    #[error("structured completion reply contained no tool call")]
    MissingToolCall,

    #[error("tool call arguments were not valid JSON: {0}")]
    MalformedArguments(#[from] serde_json::Error),

    #[error("tool call arguments missing required field '{0}'")]
    MissingField(String),
}

/// Descriptor for a schema-forced completion: one declared function whose
/// parameters are a single required string field. The completion is forced
/// to invoke the function and the field value is extracted from its
/// arguments.
#[derive(Debug, Clone)]
pub struct FieldSchema {
    /// Name of the declared function
    pub function_name: &'static str,

    /// What the function claims to do
    pub function_description: &'static str,

    /// Name of the single required field
    pub field: &'static str,

    /// Instructions for filling the field
    pub field_description: &'static str,
}

impl FieldSchema {
    /// Render as the `tools` array of a chat-completions request.
    fn to_tools_json(&self) -> Value {
        let mut properties = serde_json::Map::new();
        properties.insert(
            self.field.to_string(),
            json!({
                "type": "string",
                "description": self.field_description,
            }),
        );

        json!([{
            "type": "function",
            "function": {
                "name": self.function_name,
                "description": self.function_description,
                "parameters": {
                    "type": "object",
                    "properties": properties,
                    "required": [self.field],
                },
            },
        }])
    }
}

/// Client interface for text generation.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Two-message exchange returning the generated text as-is.
    async fn complete_free_text(
        &self,
        system_prompt: &str,
        user_message: &str,
    ) -> Result<String, UpstreamError>;

    /// Schema-forced exchange returning the value of the schema's single
    /// required field.
    async fn complete_structured(
        &self,
        user_message: &str,
        schema: &FieldSchema,
    ) -> Result<String, UpstreamError>;
}

/// Client for the OpenAI chat-completions API.
pub struct OpenAiClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiClient {
    /// Create a new client from the agent configuration.
    pub fn new(config: &crate::config::Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: OPENAI_URL.to_string(),
            api_key: config.openai_api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    /// Override the endpoint URL (useful for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    async fn post_chat(&self, body: Value) -> Result<Value, UpstreamError> {
        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .timeout(COMPLETION_TIMEOUT)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status(status));
        }

        Ok(response.json::<Value>().await?)
    }
}

/// Pull the first choice's message out of a chat reply.
fn first_message(reply: &Value) -> Result<&Value, UpstreamError> {
    reply
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .ok_or(UpstreamError::MissingChoices)
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete_free_text(
        &self,
        system_prompt: &str,
        user_message: &str,
    ) -> Result<String, UpstreamError> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "user", "content": user_message},
                {"role": "system", "content": system_prompt},
            ],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        let reply = self.post_chat(body).await?;
        let message = first_message(&reply)?;

        let content = message
            .get("content")
            .and_then(Value::as_str)
            .ok_or(UpstreamError::MissingContent)?;

        Ok(content.to_string())
    }

    async fn complete_structured(
        &self,
        user_message: &str,
        schema: &FieldSchema,
    ) -> Result<String, UpstreamError> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "user", "content": user_message},
            ],
            "temperature": 0,
            "tools": schema.to_tools_json(),
            "tool_choice": "required",
        });

        let reply = self.post_chat(body).await?;
        let message = first_message(&reply)?;

        let raw_arguments = message
            .get("tool_calls")
            .and_then(|calls| calls.get(0))
            .and_then(|call| call.get("function"))
            .and_then(|function| function.get("arguments"))
            .and_then(Value::as_str)
            .ok_or(UpstreamError::MissingToolCall)?;

        let arguments: Value = serde_json::from_str(raw_arguments)?;

        let value = arguments
            .get(schema.field)
            .and_then(Value::as_str)
            .ok_or_else(|| UpstreamError::MissingField(schema.field.to_string()))?;

        Ok(value.to_string())
    }
}
