use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use swarm_models::{AbstentionReason, Learning, TriggerContext, VoteAction};
use thiserror::Error;
use tracing::{debug, warn};

use crate::backend::RoleContext;
use crate::error::AgentError;
use crate::parser::parse_vote;
use crate::prompts::{system_prompt, user_prompt};
use crate::roster::RosterMember;

/// A specialist's contribution to a debate.
#[derive(Debug, Clone, PartialEq)]
pub struct ReasonedVote {
    pub analysis: String,
    pub action: VoteAction,
    pub confidence: Decimal,
    /// The backend answered but the answer could not be parsed.
    pub degraded: bool,
    pub elapsed_ms: u64,
}

/// The specialist produced nothing usable. Recorded as an abstention.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReasoningFailure {
    #[error("no answer within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("backend error: {0}")]
    Backend(String),
}

impl ReasoningFailure {
    pub fn abstention_reason(&self) -> AbstentionReason {
        match self {
            Self::Timeout { .. } => AbstentionReason::Timeout,
            Self::Backend(_) => AbstentionReason::BackendError,
        }
    }
}

/// Turns a roster member plus a trigger into a vote, bounded by a per-call timeout.
#[derive(Debug, Clone, Copy)]
pub struct ReasoningAdapter {
    call_timeout: Duration,
}

impl ReasoningAdapter {
    pub fn new(call_timeout: Duration) -> Self {
        Self { call_timeout }
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    pub fn context(
        member: &RosterMember,
        trigger: &TriggerContext,
        learnings: &[Learning],
    ) -> RoleContext {
        RoleContext {
            specialist_id: member.definition.id.clone(),
            role: member.definition.role,
            system_prompt: system_prompt(&member.definition),
            user_prompt: user_prompt(trigger, learnings),
            trigger: trigger.clone(),
            learnings: learnings.to_vec(),
        }
    }

    /// Ask one specialist for its vote.
    ///
    /// Unparseable output is never fatal: it becomes HOLD at zero confidence
    /// with `degraded` set. Only timeouts and backend errors fail.
    pub async fn reason(
        &self,
        member: &RosterMember,
        trigger: &TriggerContext,
        learnings: &[Learning],
    ) -> Result<ReasonedVote, ReasoningFailure> {
        let ctx = Self::context(member, trigger, learnings);
        let start = Instant::now();

        let raw = match tokio::time::timeout(self.call_timeout, member.backend.complete(&ctx)).await
        {
            Err(_) => {
                return Err(ReasoningFailure::Timeout {
                    timeout_ms: self.call_timeout.as_millis() as u64,
                })
            }
            Ok(Err(AgentError::Timeout(ms))) => {
                return Err(ReasoningFailure::Timeout { timeout_ms: ms })
            }
            Ok(Err(e)) => return Err(ReasoningFailure::Backend(e.to_string())),
            Ok(Ok(raw)) => raw,
        };
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match parse_vote(&raw) {
            Ok(parsed) => {
                debug!(specialist = %ctx.specialist_id, action = %parsed.action, confidence = %parsed.confidence, elapsed_ms, "Specialist voted");
                Ok(ReasonedVote {
                    analysis: parsed.analysis,
                    action: parsed.action,
                    confidence: parsed.confidence,
                    degraded: false,
                    elapsed_ms,
                })
            }
            Err(e) => {
                warn!(specialist = %ctx.specialist_id, error = %e, elapsed_ms, "Unparseable specialist output, coercing to HOLD");
                Ok(ReasonedVote {
                    analysis: raw.trim().to_string(),
                    action: VoteAction::Hold,
                    confidence: Decimal::ZERO,
                    degraded: true,
                    elapsed_ms,
                })
            }
        }
    }
}
