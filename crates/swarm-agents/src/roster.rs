use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use rust_decimal::Decimal;
use swarm_models::{RosterEntry, SpecialistDefinition};
use tracing::info;

use crate::backend::{build_backend, ReasoningBackend};
use crate::error::AgentError;

/// A specialist bound to its reasoning backend.
#[derive(Clone)]
pub struct RosterMember {
    pub definition: SpecialistDefinition,
    pub backend: Arc<dyn ReasoningBackend>,
}

impl RosterMember {
    pub fn new(definition: SpecialistDefinition, backend: Arc<dyn ReasoningBackend>) -> Self {
        Self {
            definition,
            backend,
        }
    }

    pub fn id(&self) -> &str {
        &self.definition.id
    }

    pub fn entry(&self) -> RosterEntry {
        RosterEntry {
            specialist_id: self.definition.id.clone(),
            role: self.definition.role,
            voting_weight: self.definition.voting_weight,
        }
    }
}

/// Mutable per-specialist state. Weights and backends never change after startup.
#[derive(Debug, Clone, Copy)]
struct MemberStatus {
    accuracy: Decimal,
    active: bool,
}

/// Read-mostly registry of specialists, loaded once at startup.
pub struct SpecialistRoster {
    members: Vec<RosterMember>,
    status: RwLock<HashMap<String, MemberStatus>>,
}

impl SpecialistRoster {
    pub fn new(members: Vec<RosterMember>) -> Self {
        let status = members
            .iter()
            .map(|m| {
                (
                    m.definition.id.clone(),
                    MemberStatus {
                        accuracy: m.definition.accuracy,
                        active: m.definition.active,
                    },
                )
            })
            .collect();
        Self {
            members,
            status: RwLock::new(status),
        }
    }

    /// Bind every definition to the backend its spec names.
    pub fn from_definitions(
        definitions: &[SpecialistDefinition],
        call_timeout: Duration,
    ) -> Result<Self, AgentError> {
        let members = definitions
            .iter()
            .map(|d| {
                let backend = build_backend(&d.backend, call_timeout)?;
                info!(specialist = %d.id, backend = %backend.label(), weight = %d.voting_weight, "Registered specialist");
                Ok(RosterMember::new(d.clone(), backend))
            })
            .collect::<Result<Vec<_>, AgentError>>()?;
        Ok(Self::new(members))
    }

    fn status_of(&self, id: &str) -> Option<MemberStatus> {
        self.status
            .read()
            .ok()
            .and_then(|status| status.get(id).copied())
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn members(&self) -> &[RosterMember] {
        &self.members
    }

    pub fn get(&self, id: &str) -> Option<&RosterMember> {
        self.members.iter().find(|m| m.id() == id)
    }

    /// The currently active subset, in roster order.
    pub fn active(&self) -> Vec<RosterMember> {
        self.members
            .iter()
            .filter(|m| self.status_of(m.id()).is_some_and(|s| s.active))
            .cloned()
            .collect()
    }

    pub fn total_active_weight(&self) -> Decimal {
        self.active()
            .iter()
            .map(|m| m.definition.voting_weight)
            .sum()
    }

    /// Returns false for an unknown id. Debates already running keep their snapshot.
    pub fn set_active(&self, id: &str, active: bool) -> bool {
        let Ok(mut status) = self.status.write() else {
            return false;
        };
        match status.get_mut(id) {
            Some(s) => {
                s.active = active;
                info!(specialist = %id, active, "Specialist activation changed");
                true
            }
            None => false,
        }
    }

    pub fn accuracy(&self, id: &str) -> Option<Decimal> {
        self.status_of(id).map(|s| s.accuracy)
    }

    /// Fold one directional hit or miss into the accuracy EMA and return the new value.
    pub fn update_accuracy(&self, id: &str, correct: bool, alpha: Decimal) -> Option<Decimal> {
        let mut status = self.status.write().ok()?;
        let entry = status.get_mut(id)?;
        entry.accuracy = ema(entry.accuracy, correct, alpha);
        Some(entry.accuracy)
    }

    /// The value `update_accuracy` would produce, without applying it.
    pub fn projected_accuracy(&self, id: &str, correct: bool, alpha: Decimal) -> Option<Decimal> {
        self.accuracy(id).map(|current| ema(current, correct, alpha))
    }

    /// Restore persisted accuracy. Unknown ids are ignored.
    pub fn overlay_accuracy(&self, accuracy: &HashMap<String, Decimal>) {
        let Ok(mut status) = self.status.write() else {
            return;
        };
        for (id, value) in accuracy {
            if let Some(entry) = status.get_mut(id) {
                entry.accuracy = (*value).max(Decimal::ZERO).min(Decimal::ONE);
            }
        }
    }

    /// Definitions with live accuracy and activation folded in.
    pub fn definitions(&self) -> Vec<SpecialistDefinition> {
        self.members
            .iter()
            .map(|m| {
                let mut definition = m.definition.clone();
                if let Some(status) = self.status_of(m.id()) {
                    definition.accuracy = status.accuracy;
                    definition.active = status.active;
                }
                definition
            })
            .collect()
    }
}

fn ema(current: Decimal, correct: bool, alpha: Decimal) -> Decimal {
    let hit = if correct { Decimal::ONE } else { Decimal::ZERO };
    (alpha * hit + (Decimal::ONE - alpha) * current).clamp(Decimal::ZERO, Decimal::ONE)
}
