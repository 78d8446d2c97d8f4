use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use swarm_models::{BackendSpec, Learning, SpecialistRole, TriggerContext};

use crate::claude_cli::{ClaudeCliBackend, ClaudeCliConfig};
use crate::error::AgentError;
use crate::heuristic::HeuristicBackend;
use crate::openai::{OpenAiBackend, OpenAiConfig};

/// Everything a backend needs for one specialist call.
#[derive(Debug, Clone)]
pub struct RoleContext {
    pub specialist_id: String,
    pub role: SpecialistRole,
    pub system_prompt: String,
    pub user_prompt: String,
    pub trigger: TriggerContext,
    pub learnings: Vec<Learning>,
}

/// A source of raw specialist answers. Mockable for testing.
#[async_trait]
pub trait ReasoningBackend: Send + Sync {
    fn label(&self) -> String;

    /// Return the backend's raw text answer for this context.
    async fn complete(&self, ctx: &RoleContext) -> Result<String, AgentError>;
}

/// Bind a backend spec to a concrete backend, once, at registration.
pub fn build_backend(
    spec: &BackendSpec,
    call_timeout: Duration,
) -> Result<Arc<dyn ReasoningBackend>, AgentError> {
    let backend: Arc<dyn ReasoningBackend> = match spec {
        BackendSpec::ClaudeCli { model } => Arc::new(ClaudeCliBackend::new(ClaudeCliConfig {
            model: model.clone(),
            timeout: call_timeout,
            ..ClaudeCliConfig::default()
        })),
        BackendSpec::OpenAiCompatible {
            base_url,
            model,
            api_key_env,
        } => Arc::new(OpenAiBackend::new(OpenAiConfig {
            base_url: base_url.clone(),
            model: model.clone(),
            api_key: std::env::var(api_key_env).ok(),
            timeout: call_timeout,
        })?),
        BackendSpec::Heuristic => Arc::new(HeuristicBackend),
    };
    Ok(backend)
}
