//! Switch audit state machine.
//!
//! Every switch attempt is tracked by one audit row that moves through a
//! small, forward-only state machine.
//!
//! ```text
//!   ┌─────────┐  remote call issued  ┌─────────────┐  agent applied   ┌───────────┐
//!   │ Pending │─────────────────────▶│ InProgress  │─────────────────▶│ Completed │
//!   └────┬────┘                      └──────┬──────┘                  └───────────┘
//!        │                                  │ rejected / transport
//!        │ client setup failed              │ error / timeout / cancel
//!        │                                  ▼
//!        │                           ┌──────────┐
//!        └──────────────────────────▶│  Failed  │
//!                                    └──────────┘
//! ```
//!
//! `completed_at` is written exactly once, on the terminal transition.

use chrono::Utc;
use coreswitch_core::SwitchLogId;
use coreswitch_store::{AgentCoreSwitchLog, SwitchStatus};

use crate::error::{ControlError, Result};

/// Validates a status change and returns the target status if valid.
///
/// # Errors
///
/// Returns `ControlError::InvalidTransition` if the change is not allowed.
pub fn validate_transition(
    switch_log_id: &SwitchLogId,
    from: SwitchStatus,
    to: SwitchStatus,
) -> Result<SwitchStatus> {
    if is_valid_transition(from, to) {
        Ok(to)
    } else {
        Err(ControlError::InvalidTransition {
            switch_log_id: *switch_log_id,
            from,
            to,
        })
    }
}

/// Check if a status change is valid according to the state machine.
#[must_use]
pub const fn is_valid_transition(from: SwitchStatus, to: SwitchStatus) -> bool {
    use SwitchStatus::{Completed, Failed, InProgress, Pending};

    matches!(
        (from, to),
        (Pending, InProgress | Failed) | (InProgress, Completed | Failed)
    )
}

/// Apply a validated status change to an audit row in memory.
///
/// Entering a terminal status stamps `completed_at`.
///
/// # Errors
///
/// Returns `ControlError::InvalidTransition` if the change is not allowed;
/// the row is left untouched.
pub fn transition(
    log: &mut AgentCoreSwitchLog,
    to: SwitchStatus,
    message: impl Into<String>,
) -> Result<()> {
    log.status = validate_transition(&log.id, log.status, to)?;
    log.message = message.into();
    if to.is_terminal() {
        log.completed_at = Some(Utc::now());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use coreswitch_core::{AgentHostId, CoreEngine};

    fn valid_transitions_from(status: SwitchStatus) -> Vec<SwitchStatus> {
        [
            SwitchStatus::Pending,
            SwitchStatus::InProgress,
            SwitchStatus::Completed,
            SwitchStatus::Failed,
        ]
        .into_iter()
        .filter(|to| is_valid_transition(status, *to))
        .collect()
    }

    fn pending_log() -> AgentCoreSwitchLog {
        AgentCoreSwitchLog {
            id: SwitchLogId::generate(),
            agent_host_id: AgentHostId::generate(),
            from_instance_id: None,
            to_instance_id: None,
            from_core_type: None,
            to_core_type: CoreEngine::Xray,
            status: SwitchStatus::Pending,
            message: String::new(),
            operator_id: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    #[test]
    fn valid_transitions() {
        use SwitchStatus::*;

        assert!(is_valid_transition(Pending, InProgress));
        assert!(is_valid_transition(Pending, Failed));
        assert!(is_valid_transition(InProgress, Completed));
        assert!(is_valid_transition(InProgress, Failed));
    }

    #[test]
    fn invalid_transitions() {
        use SwitchStatus::*;

        // Success needs a remote call
        assert!(!is_valid_transition(Pending, Completed));
        // Terminal states are final
        assert!(!is_valid_transition(Completed, Failed));
        assert!(!is_valid_transition(Failed, InProgress));
        assert!(!is_valid_transition(InProgress, Pending));
        assert!(valid_transitions_from(Completed).is_empty());
    }

    #[test]
    fn terminal_transition_stamps_completion_once() {
        let mut log = pending_log();
        transition(&mut log, SwitchStatus::InProgress, "").unwrap();
        assert!(log.completed_at.is_none());

        transition(&mut log, SwitchStatus::Completed, "switched").unwrap();
        let completed_at = log.completed_at;
        assert!(completed_at.is_some());
        assert_eq!(log.message, "switched");

        let err = transition(&mut log, SwitchStatus::Failed, "late").unwrap_err();
        assert!(matches!(err, ControlError::InvalidTransition { .. }));
        assert_eq!(log.status, SwitchStatus::Completed);
        assert_eq!(log.completed_at, completed_at);
        assert_eq!(log.message, "switched");
    }

    #[test]
    fn valid_transitions_from_pending() {
        let transitions = valid_transitions_from(SwitchStatus::Pending);
        assert!(transitions.contains(&SwitchStatus::InProgress));
        assert!(transitions.contains(&SwitchStatus::Failed));
        assert!(!transitions.contains(&SwitchStatus::Completed));
    }
}
