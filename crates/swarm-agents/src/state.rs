//! In-memory debate lifecycle guard.
//!
//! Every transition is a single compare-and-set on an atomic status, so two
//! tasks racing to complete the same debate cannot both win:
//! ```text
//! PENDING → IN_PROGRESS | FAILED
//! IN_PROGRESS → COMPLETED
//! ```

use std::sync::atomic::{AtomicU8, Ordering};

use swarm_models::DebateStatus;
use thiserror::Error;

/// Error returned when a transition is not legal from the current status.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("illegal debate transition: {from} → {to}")]
pub struct TransitionError {
    pub from: DebateStatus,
    pub to: DebateStatus,
}

fn encode(status: DebateStatus) -> u8 {
    match status {
        DebateStatus::Pending => 0,
        DebateStatus::InProgress => 1,
        DebateStatus::Completed => 2,
        DebateStatus::Failed => 3,
    }
}

fn decode(raw: u8) -> DebateStatus {
    match raw {
        0 => DebateStatus::Pending,
        1 => DebateStatus::InProgress,
        2 => DebateStatus::Completed,
        _ => DebateStatus::Failed,
    }
}

fn is_legal_transition(from: DebateStatus, to: DebateStatus) -> bool {
    use DebateStatus::*;
    matches!(
        (from, to),
        (Pending, InProgress) | (Pending, Failed) | (InProgress, Completed)
    )
}

#[derive(Debug)]
pub struct DebateState {
    status: AtomicU8,
}

impl DebateState {
    pub fn new(status: DebateStatus) -> Self {
        Self {
            status: AtomicU8::new(encode(status)),
        }
    }

    pub fn current(&self) -> DebateStatus {
        decode(self.status.load(Ordering::Acquire))
    }

    /// Move `from` → `to` if the debate is still in `from`.
    ///
    /// Fails with the observed status when another task got there first.
    pub fn transition(&self, from: DebateStatus, to: DebateStatus) -> Result<(), TransitionError> {
        if !is_legal_transition(from, to) {
            return Err(TransitionError { from, to });
        }
        self.status
            .compare_exchange(encode(from), encode(to), Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|observed| TransitionError {
                from: decode(observed),
                to,
            })
    }

    pub fn start(&self) -> Result<(), TransitionError> {
        self.transition(DebateStatus::Pending, DebateStatus::InProgress)
    }

    pub fn fail(&self) -> Result<(), TransitionError> {
        self.transition(DebateStatus::Pending, DebateStatus::Failed)
    }

    /// Only one caller ever succeeds.
    pub fn complete(&self) -> Result<(), TransitionError> {
        self.transition(DebateStatus::InProgress, DebateStatus::Completed)
    }

    pub fn accepts_votes(&self) -> bool {
        self.current() == DebateStatus::InProgress
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn happy_path() {
        let state = DebateState::new(DebateStatus::Pending);
        assert!(!state.accepts_votes());
        state.start().unwrap();
        assert!(state.accepts_votes());
        state.complete().unwrap();
        assert_eq!(state.current(), DebateStatus::Completed);
        assert!(!state.accepts_votes());
    }

    #[test]
    fn completed_is_terminal() {
        let state = DebateState::new(DebateStatus::InProgress);
        state.complete().unwrap();
        let err = state.complete().unwrap_err();
        assert_eq!(err.from, DebateStatus::Completed);
        assert!(state.fail().is_err());
        assert!(state.start().is_err());
    }

    #[test]
    fn failure_only_from_pending() {
        let state = DebateState::new(DebateStatus::InProgress);
        assert!(state.fail().is_err());

        let state = DebateState::new(DebateStatus::Pending);
        state.fail().unwrap();
        assert_eq!(state.current(), DebateStatus::Failed);
        assert!(state.start().is_err());
    }

    #[test]
    fn illegal_edges_rejected_without_touching_state() {
        let state = DebateState::new(DebateStatus::Pending);
        let err = state
            .transition(DebateStatus::Pending, DebateStatus::Completed)
            .unwrap_err();
        assert_eq!(
            err,
            TransitionError {
                from: DebateStatus::Pending,
                to: DebateStatus::Completed
            }
        );
        assert_eq!(state.current(), DebateStatus::Pending);
    }

    #[test]
    fn concurrent_completion_has_one_winner() {
        let state = Arc::new(DebateState::new(DebateStatus::InProgress));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let state = Arc::clone(&state);
                std::thread::spawn(move || state.complete().is_ok())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
