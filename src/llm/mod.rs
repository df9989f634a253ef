//! Classification backends and the [`Classifier`] built on them
//!
//! A backend is anything that takes a short chat transcript and returns the
//! model's raw text. One implementation exists per provider and the
//! provider is picked once, in [`build_backend`].

mod classifier;
mod ollama;
pub mod parse;
mod vertex;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

pub use classifier::Classifier;
pub use ollama::OllamaBackend;
pub use vertex::VertexBackend;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{LlmConfig, LlmProvider};
use crate::error::{BackendError, Result};

/// Speaker of a chat message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// Instructions for the model
    System,
    /// Caller input
    User,
    /// Earlier model output
    Assistant,
}

/// One message of a chat transcript
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Speaker
    pub role: ChatRole,
    /// Message text
    pub content: String,
}

impl ChatMessage {
    /// System message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    /// User message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// External chat/classification backend
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Short provider name used in logs and errors
    fn provider(&self) -> &str;

    /// Submit a transcript and return the raw response text
    async fn submit(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Construct the backend selected by `config.provider`
///
/// Fails with [`BackendError::Construction`] when the backend cannot be
/// created at all; no labeling run can proceed in that case.
pub fn build_backend(config: &LlmConfig) -> Result<Arc<dyn ChatBackend>> {
    let backend: Arc<dyn ChatBackend> = match config.provider {
        LlmProvider::Ollama => Arc::new(OllamaBackend::new(&config.ollama)?),
        LlmProvider::Vertex => Arc::new(VertexBackend::new(&config.vertex)?),
    };
    tracing::info!(provider = backend.provider(), "classification backend ready");
    Ok(backend)
}

pub(crate) fn construction_error(provider: &str, reason: impl Into<String>) -> crate::Error {
    BackendError::Construction {
        provider: provider.to_string(),
        reason: reason.into(),
    }
    .into()
}

pub(crate) fn transport_error(provider: &str, error: reqwest::Error) -> crate::Error {
    BackendError::Transport {
        provider: provider.to_string(),
        reason: error.to_string(),
    }
    .into()
}

pub(crate) fn malformed_response(provider: &str, reason: impl Into<String>) -> crate::Error {
    BackendError::MalformedResponse {
        provider: provider.to_string(),
        reason: reason.into(),
    }
    .into()
}

/// Turn a non-success response into [`BackendError::Status`]
pub(crate) async fn check_status(
    provider: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > 512 {
        let mut cut = 512;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    tracing::warn!(provider, status = %status, error = %body, "backend API error");
    Err(BackendError::Status {
        provider: provider.to_string(),
        status: status.as_u16(),
        body,
    }
    .into())
}
