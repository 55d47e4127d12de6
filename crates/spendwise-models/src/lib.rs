//! Model implementations for Spendwise.
//!
//! This crate provides concrete implementations of the `StructuredModel` trait.
//!
//! # Supported Providers
//!
//! - **Replay**: Deterministic test double that replays pre-seeded answers in call order
//! - **OpenAI**: Any OpenAI-compatible `/chat/completions` endpoint with JSON-schema output

pub mod factory;
pub mod openai;

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use spendwise_abstraction::{ModelError, StructuredModel, StructuredRequest};
use tracing::debug;

pub use factory::{ModelConfig, ModelFactory, ModelType};
pub use openai::OpenAIModel;

/// A pre-seeded answer, optionally delivered after a delay.
#[derive(Debug, Clone)]
struct ReplayEntry {
    response: Result<Value, ModelError>,
    delay: Option<Duration>,
}

/// Queue-replaying implementation of the `StructuredModel` trait.
///
/// Each call pops the next seeded answer. Every request is recorded so tests
/// can assert on what the caller sent. Calling past the end of the queue
/// returns `ModelError::Other`.
#[derive(Debug, Default)]
pub struct ReplayModel {
    id: String,
    queue: Mutex<VecDeque<ReplayEntry>>,
    requests: Mutex<Vec<StructuredRequest>>,
}

impl ReplayModel {
    /// Creates an empty `ReplayModel` with the given ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), ..Self::default() }
    }

    /// Creates a `ReplayModel` seeded with successful answers.
    #[must_use]
    pub fn with_responses(id: impl Into<String>, responses: impl IntoIterator<Item = Value>) -> Self {
        let model = Self::new(id);
        for response in responses {
            model.push_response(response);
        }
        model
    }

    /// Queues a successful answer.
    pub fn push_response(&self, response: Value) {
        self.push(ReplayEntry { response: Ok(response), delay: None });
    }

    /// Queues a successful answer delivered after `delay`.
    pub fn push_delayed(&self, response: Value, delay: Duration) {
        self.push(ReplayEntry { response: Ok(response), delay: Some(delay) });
    }

    /// Queues an error.
    pub fn push_error(&self, error: ModelError) {
        self.push(ReplayEntry { response: Err(error), delay: None });
    }

    /// Number of answers not consumed yet.
    pub fn remaining(&self) -> usize {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Requests received so far, in call order.
    pub fn requests(&self) -> Vec<StructuredRequest> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn push(&self, entry: ReplayEntry) {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).push_back(entry);
    }
}

#[async_trait]
impl StructuredModel for ReplayModel {
    async fn complete_structured(&self, request: &StructuredRequest) -> Result<Value, ModelError> {
        debug!(
            model_id = %self.id,
            schema = %request.schema.name,
            message_count = request.messages.len(),
            "ReplayModel completing structured request"
        );

        self.requests.lock().unwrap_or_else(PoisonError::into_inner).push(request.clone());

        let entry = self.queue.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
        let Some(entry) = entry else {
            return Err(ModelError::Other(format!(
                "replay queue exhausted for schema '{}'",
                request.schema.name
            )));
        };

        if let Some(delay) = entry.delay {
            tokio::time::sleep(delay).await;
        }

        entry.response
    }

    fn model_id(&self) -> &str {
        &self.id
    }
}
