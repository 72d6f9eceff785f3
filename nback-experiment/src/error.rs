use std::fmt;

use nback_core::EngineState;
use thiserror::Error;

use crate::config::ConfigError;

/// Engine operations that can be refused because of the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Configure,
    Start,
    Pause,
    EnterDebug,
    ExitDebug,
    Exit,
    GetData,
    SetInputMode,
    ForwardInput,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Configure => "configure",
            Operation::Start => "start",
            Operation::Pause => "pause",
            Operation::EnterDebug => "enter debug mode",
            Operation::ExitDebug => "exit debug mode",
            Operation::Exit => "exit",
            Operation::GetData => "send data",
            Operation::SetInputMode => "change input mode",
            Operation::ForwardInput => "enter input mode",
        })
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: Operation,
        state: EngineState,
    },
}

impl EngineError {
    pub fn invalid(operation: Operation, state: EngineState) -> Self {
        EngineError::InvalidState { operation, state }
    }
}
