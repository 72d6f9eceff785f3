pub mod collector;
pub mod command;
pub mod config;
pub mod error;
pub mod input;
pub mod sequence;
pub mod state;
pub mod trial;

pub use collector::DataCollector;
pub use command::{dispatch, Command, CommandError};
pub use config::{ConfigError, DeviceSettings, SessionConfig};
pub use error::{EngineError, Operation};
pub use input::{InputMode, InputReader};
pub use state::NBackEngine;
pub use trial::{TrialFlags, TrialState, TrialTimestamps};
