//! Model abstraction layer for Spendwise.
//!
//! This crate defines the single capability the learning core needs from a
//! language model: complete a chat request whose answer must be JSON conforming
//! to a caller-supplied schema. Concrete clients live in `spendwise-models`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Represents an error that can occur when interacting with an AI model.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelError {
    /// An error occurred during the API request (e.g., network issues, invalid request).
    #[error("Request Error: {0}")]
    RequestError(String),

    /// The model returned an error (e.g., invalid input, rate limiting).
    #[error("Model Response Error: {0}")]
    ModelResponseError(String),

    /// The model answered, but the answer is not JSON.
    #[error("Serialization Error: {0}")]
    SerializationError(String),

    /// The model provider is not supported or configured.
    #[error("Unsupported Model Provider: {0}")]
    UnsupportedModelProvider(String),

    /// Provider quota exceeded or rate limit hit (hard stop error).
    #[error("Provider '{provider}' quota exceeded{}", message.as_ref().map(|m| format!(": {}", m)).unwrap_or_default())]
    QuotaExceeded {
        /// The provider name (e.g., "openai").
        provider: String,
        /// Optional error message from the provider.
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Other unexpected errors.
    #[error("Other Model Error: {0}")]
    Other(String),
}

/// Represents a message in a conversation with a chat model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The role of the message sender (e.g., "user", "assistant", "system").
    pub role: String,
    /// The content of the message.
    pub content: String,
}

impl ChatMessage {
    /// Creates a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

/// Parameters for controlling the model's generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    /// What sampling temperature to use, between 0 and 2.
    /// Higher values mean the model will take more risks.
    pub temperature: Option<f32>,

    /// An alternative to sampling with temperature, called nucleus sampling,
    /// where the model considers the results of the tokens with `top_p` probability mass.
    pub top_p: Option<f32>,

    /// The maximum number of tokens to generate in the chat completion.
    pub max_tokens: Option<u32>,
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self { temperature: Some(0.7), top_p: Some(1.0), max_tokens: Some(512) }
    }
}

/// JSON schema the model's answer must conform to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonSchema {
    /// Short identifier for the schema (providers require one).
    pub name: String,
    /// The JSON Schema document.
    pub schema: Value,
    /// Ask the provider to enforce the schema strictly when it can.
    pub strict: bool,
}

/// A structured completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredRequest {
    /// Conversation to complete.
    pub messages: Vec<ChatMessage>,
    /// Schema the answer must match.
    pub schema: JsonSchema,
    /// Generation parameters.
    pub parameters: ModelParameters,
}

impl StructuredRequest {
    /// Creates a request with no messages and default parameters.
    pub fn new(schema_name: impl Into<String>, schema: Value) -> Self {
        Self {
            messages: Vec::new(),
            schema: JsonSchema { name: schema_name.into(), schema, strict: true },
            parameters: ModelParameters::default(),
        }
    }

    /// Appends a system message.
    #[must_use]
    pub fn with_system(mut self, content: impl Into<String>) -> Self {
        self.messages.push(ChatMessage::system(content));
        self
    }

    /// Appends a user message.
    #[must_use]
    pub fn with_user(mut self, content: impl Into<String>) -> Self {
        self.messages.push(ChatMessage::user(content));
        self
    }

    /// Replaces the generation parameters.
    #[must_use]
    pub fn with_parameters(mut self, parameters: ModelParameters) -> Self {
        self.parameters = parameters;
        self
    }
}

/// A model that can answer structured completion requests.
///
/// All models must be `Send + Sync` to allow concurrent use across tasks.
#[async_trait]
pub trait StructuredModel: Send + Sync {
    /// Completes the request and returns the JSON answer.
    ///
    /// Implementations return the parsed JSON value; checking it against the
    /// caller's Rust types is the caller's job.
    ///
    /// # Errors
    /// Returns a `ModelError` if the request fails or the answer is not JSON.
    async fn complete_structured(&self, request: &StructuredRequest) -> Result<Value, ModelError>;

    /// Returns the ID of the model.
    fn model_id(&self) -> &str;
}
