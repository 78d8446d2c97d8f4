use async_trait::async_trait;
use rust_decimal::Decimal;
use swarm_models::{ExecutionAck, ExecutionRequest, VoteAction};
use tracing::info;

use crate::error::CoordinatorError;

/// Downstream collaborator that acts on actionable decisions.
///
/// The sink owns its own execution threshold; the coordinator forwards every
/// completed non-HOLD decision and records whatever the ack says.
#[async_trait]
pub trait ExecutionSink: Send + Sync {
    async fn submit(&self, request: ExecutionRequest) -> Result<ExecutionAck, CoordinatorError>;
}

/// Paper-trading sink: executes nothing, acks anything at or above `min_confidence`.
#[derive(Debug, Clone, Copy)]
pub struct PaperExecutionSink {
    min_confidence: Decimal,
}

impl PaperExecutionSink {
    pub fn new(min_confidence: Decimal) -> Self {
        Self { min_confidence }
    }
}

#[async_trait]
impl ExecutionSink for PaperExecutionSink {
    async fn submit(&self, request: ExecutionRequest) -> Result<ExecutionAck, CoordinatorError> {
        if request.action == VoteAction::Hold {
            return Err(CoordinatorError::Execution(format!(
                "HOLD decision {} is not executable",
                request.decision_id
            )));
        }
        if request.confidence < self.min_confidence {
            return Ok(ExecutionAck {
                executed: false,
                note: Some(format!(
                    "confidence {} below threshold {}",
                    request.confidence, self.min_confidence
                )),
            });
        }
        info!(
            decision_id = %request.decision_id,
            symbol = %request.symbol,
            action = %request.action,
            confidence = %request.confidence,
            "Paper execution"
        );
        Ok(ExecutionAck {
            executed: true,
            note: Some("paper".to_string()),
        })
    }
}
