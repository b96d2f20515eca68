//! Supervisor state machine: `INIT → PROMPTING → WAITING → DELAY → …` with
//! the orthogonal states `PAUSED`, `NEEDS_INPUT`, `COMPLETED` layered on top.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorState {
    Init,
    Prompting,
    Waiting,
    Delay,
    Paused,
    NeedsInput,
    Completed,
}

impl SupervisorState {
    /// `PAUSED`/`NEEDS_INPUT`/`COMPLETED` are not resumed automatically by
    /// the turn driver — they wait for an external event (presence change,
    /// answered question, operator action).
    pub fn is_driver_suspended(&self) -> bool {
        matches!(self, SupervisorState::Paused | SupervisorState::NeedsInput | SupervisorState::Completed)
    }
}

/// A gateway-forwarded `supervisor_control` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorControlAction {
    Pause,
    Resume,
    Stop,
    Restart,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suspended_states() {
        assert!(SupervisorState::Paused.is_driver_suspended());
        assert!(SupervisorState::NeedsInput.is_driver_suspended());
        assert!(SupervisorState::Completed.is_driver_suspended());
        assert!(!SupervisorState::Prompting.is_driver_suspended());
        assert!(!SupervisorState::Delay.is_driver_suspended());
    }
}
