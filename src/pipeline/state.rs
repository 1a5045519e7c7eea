//! Pipeline state management

use std::time::Instant;

/// Pipeline state machine
///
/// Represents the current state of the receiver pipeline. State transitions
/// are validated so the coordinator cannot start twice or restart after
/// shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Pipeline is idle and not processing
    Idle,

    /// Waiting for the connection to come up before starting the sink
    WaitingForConnection,

    /// Sink is actively draining the queue
    Running {
        /// When the sink started draining
        started_at: Instant,
    },

    /// Pipeline is stopping (drain loops cancelled, writers closing)
    Stopping,

    /// Pipeline has stopped and cannot be restarted
    Stopped,
}

impl PipelineState {
    /// Check if this state transition is valid
    pub fn can_transition_to(&self, target: &PipelineState) -> bool {
        use PipelineState::*;

        match (self, target) {
            (Idle, WaitingForConnection) => true,
            (Idle, Running { .. }) => true,
            (Idle, Stopping) => true,

            (WaitingForConnection, Running { .. }) => true,
            (WaitingForConnection, Stopping) => true,

            (Running { .. }, Stopping) => true,

            (Stopping, Stopped) => true,

            // From Stopped - no transitions allowed
            (Stopped, _) => false,

            // Self-transitions
            (a, b) if a == b => true,

            _ => false,
        }
    }

    /// Get a human-readable description of this state
    pub fn description(&self) -> &'static str {
        match self {
            PipelineState::Idle => "Idle",
            PipelineState::WaitingForConnection => "WaitingForConnection",
            PipelineState::Running { .. } => "Running",
            PipelineState::Stopping => "Stopping",
            PipelineState::Stopped => "Stopped",
        }
    }

    /// Get the duration since the sink started (if running)
    pub fn running_duration(&self) -> Option<std::time::Duration> {
        if let PipelineState::Running { started_at } = self {
            Some(started_at.elapsed())
        } else {
            None
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        let idle = PipelineState::Idle;
        let waiting = PipelineState::WaitingForConnection;
        let running = PipelineState::Running {
            started_at: Instant::now(),
        };
        let stopping = PipelineState::Stopping;
        let stopped = PipelineState::Stopped;

        assert!(idle.can_transition_to(&waiting));
        assert!(waiting.can_transition_to(&running));
        assert!(running.can_transition_to(&stopping));
        assert!(waiting.can_transition_to(&stopping));
        assert!(stopping.can_transition_to(&stopped));

        assert!(idle.can_transition_to(&idle));
        assert!(running.can_transition_to(&running));
    }

    #[test]
    fn test_invalid_transitions() {
        let idle = PipelineState::Idle;
        let running = PipelineState::Running {
            started_at: Instant::now(),
        };
        let stopped = PipelineState::Stopped;

        assert!(!idle.can_transition_to(&stopped));
        assert!(!running.can_transition_to(&PipelineState::WaitingForConnection));
        assert!(!stopped.can_transition_to(&running));
        assert!(!stopped.can_transition_to(&idle));
    }

    #[test]
    fn test_state_checks() {
        let running = PipelineState::Running {
            started_at: Instant::now(),
        };
        assert!(running.running_duration().is_some());
        assert!(PipelineState::Stopping.running_duration().is_none());
        assert!(PipelineState::Idle.running_duration().is_none());
        assert_eq!(PipelineState::Stopped.to_string(), "Stopped");
    }
}
