use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level states of the trial engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EngineState {
    #[default]
    Idle,
    Running,
    Paused,
    Debug,
    DataReady,
    InputForwarding,
}

impl EngineState {
    /// A session is in progress and must not be reconfigured.
    pub fn is_session_active(&self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }

    /// `start` is accepted from here.
    pub fn can_start(&self) -> bool {
        matches!(self, Self::Idle | Self::Debug)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Running => "RUNNING",
            Self::Paused => "PAUSED",
            Self::Debug => "DEBUG",
            Self::DataReady => "DATA_READY",
            Self::InputForwarding => "INPUT_FORWARDING",
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
