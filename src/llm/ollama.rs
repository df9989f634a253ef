use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::{
    ChatBackend, ChatMessage, check_status, construction_error, malformed_response,
    transport_error,
};
use crate::Result;
use crate::config::OllamaConfig;

const PROVIDER: &str = "ollama";

/// Ollama `/api/chat` backend
pub struct OllamaBackend {
    client: reqwest::Client,
    chat_url: Url,
    model: String,
    format: Option<String>,
    options: ChatOptions,
}

#[derive(Clone, Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
    num_predict: u32,
    top_p: f32,
    top_k: u32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>,
    options: &'a ChatOptions,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

impl OllamaBackend {
    /// Create a backend for the configured server and model
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let base = if config.api_base_url.ends_with('/') {
            config.api_base_url.clone()
        } else {
            format!("{}/", config.api_base_url)
        };
        let chat_url = Url::parse(&base)
            .and_then(|base| base.join("api/chat"))
            .map_err(|e| {
                construction_error(PROVIDER, format!("invalid api_base_url: {}", e))
            })?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| construction_error(PROVIDER, e.to_string()))?;

        Ok(Self {
            client,
            chat_url,
            model: config.model_name.clone(),
            format: config.format.clone().filter(|f| !f.is_empty()),
            options: ChatOptions {
                temperature: config.temperature,
                num_predict: config.num_predict,
                top_p: config.top_p,
                top_k: config.top_k,
            },
        })
    }
}

#[async_trait]
impl ChatBackend for OllamaBackend {
    fn provider(&self) -> &str {
        PROVIDER
    }

    async fn submit(&self, messages: &[ChatMessage]) -> Result<String> {
        let start = std::time::Instant::now();
        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
            format: self.format.as_deref(),
            options: &self.options,
        };

        let response = self
            .client
            .post(self.chat_url.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;
        let response = check_status(PROVIDER, response).await?;

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| malformed_response(PROVIDER, e.to_string()))?;
        let content = body
            .message
            .map(|m| m.content.trim().to_string())
            .ok_or_else(|| malformed_response(PROVIDER, "missing message"))?;

        debug!(
            model = %self.model,
            duration_ms = start.elapsed().as_millis(),
            "ollama chat completion"
        );
        Ok(content)
    }
}
