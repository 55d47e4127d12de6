//! OpenAI model implementation.
//!
//! Implements `StructuredModel` against OpenAI's `/chat/completions` API (or any
//! compatible endpoint) using the `json_schema` response format.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use spendwise_abstraction::{ChatMessage, ModelError, StructuredModel, StructuredRequest};
use std::env;
use tracing::{debug, error};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI model implementation.
#[derive(Debug, Clone)]
pub struct OpenAIModel {
    /// The model ID (e.g., "gpt-4o-mini").
    model_id: String,
    /// The API key for authentication.
    api_key: String,
    /// The base URL for the API.
    base_url: String,
    /// HTTP client for making requests.
    client: Client,
}

impl OpenAIModel {
    /// Creates a new `OpenAIModel` with the given model ID.
    ///
    /// # Errors
    /// Returns a `ModelError` if the API key is not found in environment variables.
    #[allow(clippy::disallowed_methods)] // env::var is needed for API key loading
    pub fn new(model_id: String) -> Result<Self, ModelError> {
        let api_key = env::var("OPENAI_API_KEY").map_err(|_| {
            ModelError::UnsupportedModelProvider(
                "OPENAI_API_KEY environment variable not set".to_string(),
            )
        })?;

        Ok(Self::with_api_key(model_id, api_key))
    }

    /// Creates a new `OpenAIModel` with a custom API key.
    #[must_use]
    pub fn with_api_key(model_id: String, api_key: String) -> Self {
        Self { model_id, api_key, base_url: DEFAULT_BASE_URL.to_string(), client: Client::new() }
    }

    /// Points the client at an OpenAI-compatible endpoint (e.g. "http://localhost:8000/v1").
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn build_request(&self, request: &StructuredRequest) -> OpenAIRequest {
        OpenAIRequest {
            model: self.model_id.clone(),
            messages: request.messages.iter().map(OpenAIMessage::from).collect(),
            temperature: request.parameters.temperature,
            top_p: request.parameters.top_p,
            max_tokens: request.parameters.max_tokens,
            response_format: OpenAIResponseFormat {
                format_type: "json_schema".to_string(),
                json_schema: OpenAIJsonSchema {
                    name: request.schema.name.clone(),
                    schema: request.schema.schema.clone(),
                    strict: request.schema.strict,
                },
            },
        }
    }

    /// Maps a non-success HTTP status to a `ModelError`.
    fn status_error(status: reqwest::StatusCode, error_text: String) -> ModelError {
        if status.as_u16() == 402 || status.as_u16() == 429 {
            return ModelError::QuotaExceeded {
                provider: "openai".to_string(),
                message: Some(error_text),
            };
        }

        ModelError::ModelResponseError(format!("API error ({}): {}", status, error_text))
    }
}

#[async_trait]
impl StructuredModel for OpenAIModel {
    async fn complete_structured(&self, request: &StructuredRequest) -> Result<Value, ModelError> {
        debug!(
            model_id = %self.model_id,
            schema = %request.schema.name,
            message_count = request.messages.len(),
            "OpenAIModel completing structured request"
        );

        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_request(request);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to send request to OpenAI API");
                ModelError::RequestError(format!("Network error: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!(status = %status, error = %error_text, "OpenAI API returned error status");
            return Err(Self::status_error(status, error_text));
        }

        let openai_response: OpenAIResponse = response.json().await.map_err(|e| {
            error!(error = %e, "Failed to parse OpenAI API response");
            ModelError::SerializationError(format!("Failed to parse response: {}", e))
        })?;

        let content = openai_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                error!("No content in OpenAI API response");
                ModelError::ModelResponseError("No content in API response".to_string())
            })?;

        serde_json::from_str(&content).map_err(|e| {
            error!(error = %e, "OpenAI answer is not valid JSON");
            ModelError::SerializationError(format!("Answer is not valid JSON: {}", e))
        })
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// OpenAI API request/response structures

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    response_format: OpenAIResponseFormat,
}

#[derive(Debug, Serialize)]
struct OpenAIResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
    json_schema: OpenAIJsonSchema,
}

#[derive(Debug, Serialize)]
struct OpenAIJsonSchema {
    name: String,
    schema: Value,
    strict: bool,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

impl From<&ChatMessage> for OpenAIMessage {
    fn from(message: &ChatMessage) -> Self {
        Self { role: message.role.clone(), content: message.content.clone() }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}
