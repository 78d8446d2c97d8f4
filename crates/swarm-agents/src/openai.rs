use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::backend::{ReasoningBackend, RoleContext};
use crate::error::AgentError;

/// Any endpoint speaking the OpenAI chat-completions protocol
/// (OpenAI itself, vLLM, llama.cpp server, Ollama's compatibility layer).
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Base URL up to and including the version segment, e.g. `http://host:8000/v1`.
    pub base_url: String,
    pub model: String,
    /// Bearer token. Local servers usually need none.
    pub api_key: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

pub struct OpenAiBackend {
    config: OpenAiConfig,
    http: Client,
}

impl OpenAiBackend {
    pub fn new(config: OpenAiConfig) -> Result<Self, AgentError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AgentError::Http(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { config, http })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl ReasoningBackend for OpenAiBackend {
    fn label(&self) -> String {
        format!("open_ai_compatible:{}", self.config.model)
    }

    async fn complete(&self, ctx: &RoleContext) -> Result<String, AgentError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: ctx.system_prompt.clone(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: ctx.user_prompt.clone(),
                },
            ],
            temperature: 0.2,
        };

        debug!(model = %self.config.model, specialist = %ctx.specialist_id, "Sending chat completion");
        let mut builder = self.http.post(self.endpoint()).json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                AgentError::Timeout(self.config.timeout.as_millis() as u64)
            } else {
                AgentError::from(e)
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(%status, body = %body, "Chat completion failed");
            return Err(AgentError::Http(format!("{status}: {body}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Parse(format!("Malformed chat completion: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(AgentError::Http("empty chat completion".to_string()));
        }
        Ok(content)
    }
}
