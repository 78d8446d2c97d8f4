//! Integration tests that invoke the real Claude CLI.
//!
//! These tests are `#[ignore]` by default. They require:
//! - The `claude` CLI installed and on PATH
//! - Valid Anthropic credentials configured
//!
//! Run explicitly with:
//! ```bash
//! cargo test -p swarm-agents --test cli_integration -- --ignored
//! ```

use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;
use swarm_agents::claude_cli::{check_cli_available, invoke_claude, ClaudeCliBackend, ClaudeCliConfig};
use swarm_agents::{ReasoningAdapter, RosterMember};
use swarm_models::{SpecialistDefinition, TriggerContext};

fn config() -> ClaudeCliConfig {
    ClaudeCliConfig {
        timeout: Duration::from_secs(60),
        ..ClaudeCliConfig::default()
    }
}

#[tokio::test]
#[ignore]
async fn cli_is_available() {
    assert!(
        check_cli_available(&config()).await,
        "claude CLI not found on PATH"
    );
}

/// A real specialist call must come back as a parsed, non-degraded vote.
///
/// Catches changes in the CLI's output format that would otherwise turn
/// every production vote into a degraded HOLD.
#[tokio::test]
#[ignore]
async fn specialist_answer_parses_as_vote() {
    if !check_cli_available(&config()).await {
        eprintln!("Skipping: claude CLI not available");
        return;
    }

    let definition = SpecialistDefinition::default_roster().remove(0);
    let member = RosterMember::new(definition, Arc::new(ClaudeCliBackend::new(config())));
    let mut trigger = TriggerContext::new("SOL", dec!(142.5), "Price up 6% in one hour");
    trigger.price_change_24h = Some(dec!(6.1));

    let adapter = ReasoningAdapter::new(Duration::from_secs(90));
    let vote = adapter
        .reason(&member, &trigger, &[])
        .await
        .expect("Claude CLI call failed");

    assert!(
        !vote.degraded,
        "CLI output no longer parses as a vote:\n---\n{}\n---",
        vote.analysis
    );
    assert!(!vote.analysis.is_empty());
}

#[tokio::test]
#[ignore]
async fn cli_reports_errors_for_invalid_model() {
    if !check_cli_available(&config()).await {
        eprintln!("Skipping: claude CLI not available");
        return;
    }

    let config = ClaudeCliConfig {
        model: "nonexistent-model-12345".to_string(),
        timeout: Duration::from_secs(15),
        ..ClaudeCliConfig::default()
    };
    let result = invoke_claude("You are a test.", "hello", &config).await;
    assert!(result.is_err(), "Expected error for invalid model, got: {result:?}");
}
