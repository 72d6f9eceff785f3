pub mod timer;

pub use timer::{Clock, LoopStats, LoopSummary, ManualClock, MonotonicClock};
