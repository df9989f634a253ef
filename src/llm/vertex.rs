use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    ChatBackend, ChatMessage, ChatRole, check_status, construction_error, malformed_response,
    transport_error,
};
use crate::Result;
use crate::config::VertexConfig;

const PROVIDER: &str = "vertex";

/// Vertex AI `generateContent` backend
///
/// Gemini has no system role, so system messages are folded into the first
/// user turn.
pub struct VertexBackend {
    client: reqwest::Client,
    url: String,
    access_token: String,
    generation_config: GenerationConfig,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
}

#[derive(Debug, PartialEq, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content>,
    generation_config: &'a GenerationConfig,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

impl VertexBackend {
    /// Create a backend for the configured project and model
    ///
    /// The access token comes from `access_token` or, when unset, from the
    /// environment variable named by `access_token_env`.
    pub fn new(config: &VertexConfig) -> Result<Self> {
        if config.project.trim().is_empty() {
            return Err(construction_error(PROVIDER, "vertex.project is not set"));
        }

        let access_token = match &config.access_token {
            Some(token) if !token.is_empty() => token.clone(),
            _ => std::env::var(&config.access_token_env).map_err(|_| {
                construction_error(
                    PROVIDER,
                    format!("no access token: {} not set", config.access_token_env),
                )
            })?,
        };

        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("https://{}-aiplatform.googleapis.com", config.location));
        let url = format!(
            "{}/{}/projects/{}/locations/{}/publishers/google/models/{}:generateContent",
            endpoint.trim_end_matches('/'),
            config.api_version,
            config.project,
            config.location,
            config.model_name
        );

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| construction_error(PROVIDER, e.to_string()))?;

        Ok(Self {
            client,
            url,
            access_token,
            generation_config: GenerationConfig {
                temperature: config.temperature,
                top_p: config.top_p,
                top_k: config.top_k,
                max_output_tokens: config.max_output_tokens,
            },
        })
    }
}

/// Convert a transcript into Gemini contents
fn to_contents(messages: &[ChatMessage]) -> Vec<Content> {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == ChatRole::System)
        .map(|m| m.content.as_str())
        .collect();

    let mut contents: Vec<Content> = messages
        .iter()
        .filter_map(|m| {
            let role = match m.role {
                ChatRole::System => return None,
                ChatRole::User => "user",
                ChatRole::Assistant => "model",
            };
            Some(Content {
                role,
                parts: vec![Part {
                    text: m.content.clone(),
                }],
            })
        })
        .collect();

    if !system.is_empty() {
        let preamble = format!("{}\n\n", system.join("\n\n"));
        match contents.first_mut() {
            Some(first) if first.role == "user" => {
                if let Some(part) = first.parts.first_mut() {
                    part.text.insert_str(0, &preamble);
                }
            }
            _ => contents.insert(
                0,
                Content {
                    role: "user",
                    parts: vec![Part { text: preamble }],
                },
            ),
        }
    }
    contents
}

#[async_trait]
impl ChatBackend for VertexBackend {
    fn provider(&self) -> &str {
        PROVIDER
    }

    async fn submit(&self, messages: &[ChatMessage]) -> Result<String> {
        let start = std::time::Instant::now();
        let request = GenerateRequest {
            contents: to_contents(messages),
            generation_config: &self.generation_config,
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.access_token)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;
        let response = check_status(PROVIDER, response).await?;

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| malformed_response(PROVIDER, e.to_string()))?;
        let content = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .ok_or_else(|| malformed_response(PROVIDER, "no candidates"))?;
        let text: String = content.parts.into_iter().map(|p| p.text).collect();

        debug!(
            url = %self.url,
            duration_ms = start.elapsed().as_millis(),
            "vertex generate content"
        );
        Ok(text.trim().to_string())
    }
}
