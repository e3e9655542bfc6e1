//! Job lifecycle state machine

use crate::error::{OrchestrationError, OrchestrationResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    /// No transitions leave a terminal state
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Cancelled
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Pending => "PENDING",
            JobState::Running => "RUNNING",
            JobState::Succeeded => "SUCCEEDED",
            JobState::Failed => "FAILED",
            JobState::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// States reachable from `from` in one step
pub fn allowed_transitions(from: JobState) -> Vec<JobState> {
    use JobState::*;
    match from {
        Pending => vec![Running],
        Running => vec![Succeeded, Failed, Cancelled],
        Succeeded | Failed | Cancelled => vec![],
    }
}

/// Validates a state transition for `job_id`
pub fn validate_transition(job_id: Uuid, from: JobState, to: JobState) -> OrchestrationResult<()> {
    if from.is_terminal() {
        return Err(OrchestrationError::AlreadyTerminal {
            job_id,
            state: from,
        });
    }
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(OrchestrationError::InvalidTransition { job_id, from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use JobState::*;

    #[test]
    fn test_happy_path() {
        let id = Uuid::new_v4();
        assert!(validate_transition(id, Pending, Running).is_ok());
        assert!(validate_transition(id, Running, Succeeded).is_ok());
        assert!(validate_transition(id, Running, Failed).is_ok());
    }

    #[test]
    fn test_cancel_only_while_running() {
        let id = Uuid::new_v4();
        assert!(validate_transition(id, Running, Cancelled).is_ok());
        assert_eq!(
            validate_transition(id, Pending, Cancelled),
            Err(OrchestrationError::InvalidTransition {
                job_id: id,
                from: Pending,
                to: Cancelled
            })
        );
    }

    #[test]
    fn test_terminal_states_are_final() {
        let id = Uuid::new_v4();
        for from in [Succeeded, Failed, Cancelled] {
            assert!(allowed_transitions(from).is_empty());
            assert!(matches!(
                validate_transition(id, from, Running),
                Err(OrchestrationError::AlreadyTerminal { .. })
            ));
        }
    }

    #[test]
    fn test_no_skipping_running() {
        let id = Uuid::new_v4();
        assert!(validate_transition(id, Pending, Succeeded).is_err());
        assert!(validate_transition(id, Pending, Failed).is_err());
    }
}
