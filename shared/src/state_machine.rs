//! Command Execution State Machine
//!
//! Defines the valid lifecycle of one inbound envelope on a device:
//!
//! ```text
//! Received -> Verified -> [AuthorizedLocally] -> Executing -> Completed | Failed
//! ```
//!
//! `Completed` and `Failed` are terminal. There is no retry edge; a retry is a
//! new envelope with a new `command_id`.

use serde::Serialize;

/// Lifecycle states of a single command on the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Received,
    Verified,
    AuthorizedLocally,
    Executing,
    Completed,
    Failed,
}

impl ExecutionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionState::Completed | ExecutionState::Failed)
    }
}

/// Events that drive the lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionEvent {
    /// Signature, freshness and replay checks passed
    VerificationPassed,
    /// Any verification check failed
    VerificationFailed,
    /// Local policy allows the command
    LocalPolicyPassed,
    /// Local policy refuses the command, or the command name is unknown
    LocalPolicyDenied,
    /// The OS action is about to run
    ExecutionStarted,
    /// The OS action returned without error
    ActionSucceeded,
    /// The OS action returned an error
    ActionFailed,
}

/// Result of a state transition attempt
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionResult {
    /// Transition was valid and state changed
    Success(ExecutionState),
    /// Transition was invalid from current state
    Invalid {
        from: ExecutionState,
        event: ExecutionEvent,
    },
}

/// Tracks one command through its lifecycle
#[derive(Debug)]
pub struct ExecutionStateMachine {
    current_state: ExecutionState,
    trail: Vec<ExecutionState>,
}

impl Default for ExecutionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionStateMachine {
    /// Create a new state machine in the Received state
    pub fn new() -> Self {
        Self {
            current_state: ExecutionState::Received,
            trail: vec![ExecutionState::Received],
        }
    }

    /// Get current state
    pub fn state(&self) -> ExecutionState {
        self.current_state
    }

    /// Every state visited so far, in order
    pub fn trail(&self) -> &[ExecutionState] {
        &self.trail
    }

    /// Process an event and return the transition result
    pub fn process_event(&mut self, event: ExecutionEvent) -> TransitionResult {
        match self.get_next_state(event) {
            Some(state) => {
                self.current_state = state;
                self.trail.push(state);
                TransitionResult::Success(state)
            }
            None => TransitionResult::Invalid {
                from: self.current_state,
                event,
            },
        }
    }

    /// Get the next state for a given event, if the transition is valid
    fn get_next_state(&self, event: ExecutionEvent) -> Option<ExecutionState> {
        use ExecutionEvent::*;
        use ExecutionState::*;

        match (self.current_state, event) {
            (Received, VerificationPassed) => Some(Verified),
            (Received, VerificationFailed) => Some(Failed),

            (Verified, LocalPolicyPassed) => Some(AuthorizedLocally),
            (Verified, LocalPolicyDenied) => Some(Failed),

            // Local policy is optional
            (Verified | AuthorizedLocally, ExecutionStarted) => Some(Executing),

            (Executing, ActionSucceeded) => Some(Completed),
            (Executing, ActionFailed) => Some(Failed),

            // Terminal states accept nothing
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let fsm = ExecutionStateMachine::new();
        assert_eq!(fsm.state(), ExecutionState::Received);
        assert!(!fsm.state().is_terminal());
    }

    #[test]
    fn test_full_flow_with_local_policy() {
        let mut fsm = ExecutionStateMachine::new();

        let result = fsm.process_event(ExecutionEvent::VerificationPassed);
        assert_eq!(result, TransitionResult::Success(ExecutionState::Verified));

        let result = fsm.process_event(ExecutionEvent::LocalPolicyPassed);
        assert_eq!(result, TransitionResult::Success(ExecutionState::AuthorizedLocally));

        let result = fsm.process_event(ExecutionEvent::ExecutionStarted);
        assert_eq!(result, TransitionResult::Success(ExecutionState::Executing));

        let result = fsm.process_event(ExecutionEvent::ActionSucceeded);
        assert_eq!(result, TransitionResult::Success(ExecutionState::Completed));
        assert!(fsm.state().is_terminal());

        assert_eq!(
            fsm.trail(),
            &[
                ExecutionState::Received,
                ExecutionState::Verified,
                ExecutionState::AuthorizedLocally,
                ExecutionState::Executing,
                ExecutionState::Completed,
            ]
        );
    }

    #[test]
    fn test_local_policy_is_optional() {
        let mut fsm = ExecutionStateMachine::new();
        fsm.process_event(ExecutionEvent::VerificationPassed);

        let result = fsm.process_event(ExecutionEvent::ExecutionStarted);
        assert_eq!(result, TransitionResult::Success(ExecutionState::Executing));
    }

    #[test]
    fn test_verification_failure_is_terminal() {
        let mut fsm = ExecutionStateMachine::new();
        fsm.process_event(ExecutionEvent::VerificationFailed);
        assert_eq!(fsm.state(), ExecutionState::Failed);

        let result = fsm.process_event(ExecutionEvent::ExecutionStarted);
        assert!(matches!(result, TransitionResult::Invalid { .. }));
        assert_eq!(fsm.state(), ExecutionState::Failed);
    }

    #[test]
    fn test_cannot_execute_unverified() {
        let mut fsm = ExecutionStateMachine::new();
        let result = fsm.process_event(ExecutionEvent::ExecutionStarted);
        assert_eq!(
            result,
            TransitionResult::Invalid {
                from: ExecutionState::Received,
                event: ExecutionEvent::ExecutionStarted,
            }
        );
    }

    #[test]
    fn test_no_retry_after_failure() {
        let mut fsm = ExecutionStateMachine::new();
        fsm.process_event(ExecutionEvent::VerificationPassed);
        fsm.process_event(ExecutionEvent::ExecutionStarted);
        fsm.process_event(ExecutionEvent::ActionFailed);
        assert_eq!(fsm.state(), ExecutionState::Failed);

        let result = fsm.process_event(ExecutionEvent::ExecutionStarted);
        assert!(matches!(result, TransitionResult::Invalid { .. }));
        assert_eq!(fsm.trail().last(), Some(&ExecutionState::Failed));
    }
}
