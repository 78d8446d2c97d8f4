//! Test support: scripted reasoning backends and roster builders.
//!
//! `ScriptedBackend` answers with a fixed vote or raw text, `DelayedBackend`
//! wraps another backend behind a sleep, `FailingBackend` always errors and
//! `RecordingBackend` keeps every context it was asked about so tests can
//! inspect the prompts a specialist actually saw.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use swarm_models::{SpecialistDefinition, VoteAction};

use crate::backend::{ReasoningBackend, RoleContext};
use crate::error::AgentError;
use crate::roster::{RosterMember, SpecialistRoster};

/// Answers every call with the same text.
#[derive(Debug, Clone)]
pub struct ScriptedBackend {
    response: String,
}

impl ScriptedBackend {
    /// A well-formed vote.
    pub fn vote(action: VoteAction, confidence: &str) -> Self {
        Self {
            response: format!(
                r#"{{"analysis": "Scripted {} call.", "action": "{}", "confidence": {}}}"#,
                action.as_str().to_lowercase(),
                action.as_str(),
                confidence
            ),
        }
    }

    /// Arbitrary backend output, parseable or not.
    pub fn raw(text: &str) -> Self {
        Self {
            response: text.to_string(),
        }
    }
}

#[async_trait]
impl ReasoningBackend for ScriptedBackend {
    fn label(&self) -> String {
        "scripted".to_string()
    }

    async fn complete(&self, _ctx: &RoleContext) -> Result<String, AgentError> {
        Ok(self.response.clone())
    }
}

/// Sleeps before delegating. Useful for deadline and timeout tests.
pub struct DelayedBackend<B> {
    delay: Duration,
    inner: B,
}

impl<B: ReasoningBackend> DelayedBackend<B> {
    pub fn new(delay: Duration, inner: B) -> Self {
        Self { delay, inner }
    }
}

#[async_trait]
impl<B: ReasoningBackend> ReasoningBackend for DelayedBackend<B> {
    fn label(&self) -> String {
        format!("delayed:{}", self.inner.label())
    }

    async fn complete(&self, ctx: &RoleContext) -> Result<String, AgentError> {
        tokio::time::sleep(self.delay).await;
        self.inner.complete(ctx).await
    }
}

pub struct FailingBackend;

#[async_trait]
impl ReasoningBackend for FailingBackend {
    fn label(&self) -> String {
        "failing".to_string()
    }

    async fn complete(&self, _ctx: &RoleContext) -> Result<String, AgentError> {
        Err(AgentError::Cli("Mock failure".to_string()))
    }
}

/// Delegates to `inner` and keeps a copy of every context it received.
pub struct RecordingBackend<B> {
    inner: B,
    seen: Arc<Mutex<Vec<RoleContext>>>,
}

impl<B: ReasoningBackend> RecordingBackend<B> {
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Shared handle to the recorded contexts; stays valid after the backend is moved into a roster.
    pub fn seen(&self) -> Arc<Mutex<Vec<RoleContext>>> {
        Arc::clone(&self.seen)
    }
}

#[async_trait]
impl<B: ReasoningBackend> ReasoningBackend for RecordingBackend<B> {
    fn label(&self) -> String {
        format!("recording:{}", self.inner.label())
    }

    async fn complete(&self, ctx: &RoleContext) -> Result<String, AgentError> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(ctx.clone());
        }
        self.inner.complete(ctx).await
    }
}

/// The default six-member roster with every specialist bound to `backend`.
pub fn default_roster_with(backend: Arc<dyn ReasoningBackend>) -> SpecialistRoster {
    let members = SpecialistDefinition::default_roster()
        .into_iter()
        .map(|d| RosterMember::new(d, Arc::clone(&backend)))
        .collect();
    SpecialistRoster::new(members)
}

/// The default roster with a per-specialist backend, looked up by id.
/// Specialists `pick` returns `None` for are left off the roster.
pub fn default_roster_by<F>(mut pick: F) -> SpecialistRoster
where
    F: FnMut(&SpecialistDefinition) -> Option<Arc<dyn ReasoningBackend>>,
{
    let members = SpecialistDefinition::default_roster()
        .into_iter()
        .filter_map(|d| pick(&d).map(|backend| RosterMember::new(d, backend)))
        .collect();
    SpecialistRoster::new(members)
}
