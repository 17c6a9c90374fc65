use interop_core::SessionState;

/// Valid lifecycle transitions for a browser session.
///
/// The happy path walks the lifecycle forward one state at a time;
/// `Failed` is reachable from any live state and `Closed` from
/// everywhere, so cleanup can always complete.
pub struct SessionStateMachine;

impl SessionStateMachine {
    pub fn can_transition(from: SessionState, to: SessionState) -> bool {
        Self::allowed_transitions(from).contains(&to)
    }

    fn allowed_transitions(from: SessionState) -> Vec<SessionState> {
        use SessionState::*;
        match from {
            Uninitialized => vec![Launched, Failed, Closed],
            Launched => vec![Navigated, Failed, Closed],
            Navigated => vec![ChannelJoined, Failed, Closed],
            ChannelJoined => vec![StreamActive, Failed, Closed],
            StreamActive => vec![ReadyForVerification, Failed, Closed],
            ReadyForVerification => vec![Failed, Closed],
            Failed => vec![Closed],
            Closed => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionState::*;

    #[test]
    fn test_happy_path_transitions() {
        assert!(SessionStateMachine::can_transition(Uninitialized, Launched));
        assert!(SessionStateMachine::can_transition(Launched, Navigated));
        assert!(SessionStateMachine::can_transition(Navigated, ChannelJoined));
        assert!(SessionStateMachine::can_transition(
            ChannelJoined,
            StreamActive
        ));
        assert!(SessionStateMachine::can_transition(
            StreamActive,
            ReadyForVerification
        ));
    }

    #[test]
    fn test_no_skipping_forward() {
        assert!(!SessionStateMachine::can_transition(
            Uninitialized,
            ChannelJoined
        ));
        assert!(!SessionStateMachine::can_transition(Launched, StreamActive));
    }

    #[test]
    fn test_failure_and_close_always_reachable() {
        for from in [
            Uninitialized,
            Launched,
            Navigated,
            ChannelJoined,
            StreamActive,
            ReadyForVerification,
        ] {
            assert!(SessionStateMachine::can_transition(from, Failed));
            assert!(SessionStateMachine::can_transition(from, Closed));
        }
        assert!(SessionStateMachine::can_transition(Failed, Closed));
    }

    #[test]
    fn test_closed_is_terminal() {
        assert!(!SessionStateMachine::can_transition(Closed, Launched));
        assert!(!SessionStateMachine::can_transition(Closed, Failed));
    }
}
