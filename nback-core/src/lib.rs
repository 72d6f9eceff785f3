pub mod device;
pub mod state;
pub mod stimulus;
pub mod trial;

pub use device::{Channel, InputSource, Level, StimulusOutput};
pub use state::EngineState;
pub use stimulus::{Color, UnknownColor};
pub use trial::{Metrics, Outcome, TrialRecord};
