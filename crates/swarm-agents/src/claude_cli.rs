use std::process::Output;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::backend::{ReasoningBackend, RoleContext};
use crate::error::AgentError;

/// How a specialist reaches the `claude` CLI.
#[derive(Debug, Clone)]
pub struct ClaudeCliConfig {
    /// Executable name or path.
    pub binary: String,
    pub model: String,
    pub timeout: Duration,
}

impl Default for ClaudeCliConfig {
    fn default() -> Self {
        Self {
            binary: "claude".to_string(),
            model: "claude-3-5-haiku-latest".to_string(),
            timeout: Duration::from_secs(45),
        }
    }
}

/// Non-interactive, plain-text invocation with the role prompt as system prompt.
fn cli_args<'a>(system_prompt: &'a str, user_prompt: &'a str, model: &'a str) -> [&'a str; 8] {
    [
        "--print",
        user_prompt,
        "--system-prompt",
        system_prompt,
        "--model",
        model,
        "--output-format",
        "text",
    ]
}

fn answer_from(output: Output) -> Result<String, AgentError> {
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(status = %output.status, stderr = %stderr.trim(), "Claude CLI failed");
        return Err(AgentError::Cli(format!(
            "claude exited {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    let answer = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if answer.is_empty() {
        return Err(AgentError::Cli("claude printed no answer".to_string()));
    }
    Ok(answer)
}

/// Run one prompt through the CLI and return its trimmed stdout.
///
/// The child is killed if the returned future is dropped, so an aborted
/// debate task never leaves a stray process behind.
pub async fn invoke_claude(
    system_prompt: &str,
    user_prompt: &str,
    config: &ClaudeCliConfig,
) -> Result<String, AgentError> {
    debug!(
        binary = %config.binary,
        model = %config.model,
        prompt_len = user_prompt.len(),
        "Invoking claude CLI"
    );

    let child = Command::new(&config.binary)
        .args(cli_args(system_prompt, user_prompt, &config.model))
        .kill_on_drop(true)
        .output();

    let output = tokio::time::timeout(config.timeout, child)
        .await
        .map_err(|_| AgentError::Timeout(config.timeout.as_millis() as u64))?
        .map_err(|e| AgentError::Cli(format!("Failed to spawn {}: {e}", config.binary)))?;

    answer_from(output)
}

/// Whether the configured CLI binary runs at all.
pub async fn check_cli_available(config: &ClaudeCliConfig) -> bool {
    Command::new(&config.binary)
        .arg("--version")
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Reasoning backend that shells out to the `claude` CLI.
pub struct ClaudeCliBackend {
    config: ClaudeCliConfig,
}

impl ClaudeCliBackend {
    pub fn new(config: ClaudeCliConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ReasoningBackend for ClaudeCliBackend {
    fn label(&self) -> String {
        format!("claude_cli:{}", self.config.model)
    }

    async fn complete(&self, ctx: &RoleContext) -> Result<String, AgentError> {
        invoke_claude(&ctx.system_prompt, &ctx.user_prompt, &self.config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ClaudeCliConfig::default();
        assert_eq!(config.binary, "claude");
        assert_eq!(config.model, "claude-3-5-haiku-latest");
        assert_eq!(config.timeout, Duration::from_secs(45));
    }

    #[test]
    fn args_carry_both_prompts_and_model() {
        let args = cli_args("You are the risk assessor.", "SOL moved 6%", "claude-sonnet");
        assert_eq!(args[0], "--print");
        assert_eq!(args[1], "SOL moved 6%");
        assert_eq!(args[3], "You are the risk assessor.");
        assert_eq!(args[5], "claude-sonnet");
        assert_eq!(&args[6..], ["--output-format", "text"]);
    }

    #[test]
    fn label_names_model() {
        let backend = ClaudeCliBackend::new(ClaudeCliConfig {
            model: "claude-sonnet".to_string(),
            ..ClaudeCliConfig::default()
        });
        assert_eq!(backend.label(), "claude_cli:claude-sonnet");
    }

    #[tokio::test]
    async fn missing_binary_is_a_cli_error() {
        let config = ClaudeCliConfig {
            binary: "swarm-no-such-binary".to_string(),
            timeout: Duration::from_secs(5),
            ..ClaudeCliConfig::default()
        };
        assert!(!check_cli_available(&config).await);
        let err = invoke_claude("system", "user", &config).await.unwrap_err();
        assert!(matches!(err, AgentError::Cli(_)));
    }
}
