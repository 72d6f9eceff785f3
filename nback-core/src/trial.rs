use serde::{Deserialize, Serialize};

use crate::stimulus::Color;

/// Classified result of one trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Hit,
    /// Target trial with no response, or answered on the wrong channel.
    Miss,
    FalseAlarm,
    CorrectRejection,
}

impl Outcome {
    /// The target decision is taken first; only non-target trials can be false alarms.
    pub fn classify(target: bool, responded: bool, confirm: bool) -> Self {
        match (target, responded, confirm) {
            (true, true, true) => Outcome::Hit,
            (true, _, _) => Outcome::Miss,
            (false, true, true) => Outcome::FalseAlarm,
            (false, _, _) => Outcome::CorrectRejection,
        }
    }

    pub fn is_correct(&self) -> bool {
        matches!(self, Outcome::Hit | Outcome::CorrectRejection)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Hit => "CORRECT RESPONSE",
            Outcome::Miss => "MISSED TARGET",
            Outcome::FalseAlarm => "FALSE ALARM",
            Outcome::CorrectRejection => "CORRECT REJECTION",
        }
    }
}

/// One completed trial. All times are ms relative to session start except
/// `reaction_time_ms`, which is relative to stimulus onset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub stimulus_number: usize,
    pub color: Color,
    pub is_target: bool,
    pub response_made: bool,
    pub response_is_confirm: bool,
    pub outcome: Outcome,
    pub onset_ms: u64,
    /// Zero when no response was made.
    pub response_ms: u64,
    pub reaction_time_ms: u64,
    pub end_ms: u64,
}

impl TrialRecord {
    pub fn is_correct(&self) -> bool {
        self.outcome.is_correct()
    }
}

/// Session performance counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    pub correct_responses: u32,
    pub false_alarms: u32,
    pub missed_targets: u32,
    pub correct_rejections: u32,
    pub total_reaction_time_ms: u64,
    pub reaction_time_count: u32,
}

impl Metrics {
    /// Counts the outcome. Every response, whatever its outcome, feeds the
    /// reaction-time average.
    pub fn apply(&mut self, outcome: Outcome, reaction_time_ms: Option<u64>) {
        match outcome {
            Outcome::Hit => self.correct_responses += 1,
            Outcome::Miss => self.missed_targets += 1,
            Outcome::FalseAlarm => self.false_alarms += 1,
            Outcome::CorrectRejection => self.correct_rejections += 1,
        }
        if let Some(rt) = reaction_time_ms {
            self.total_reaction_time_ms += rt;
            self.reaction_time_count += 1;
        }
    }

    pub fn total_targets(&self) -> u32 {
        self.correct_responses + self.missed_targets
    }

    pub fn hit_rate(&self) -> f64 {
        match self.total_targets() {
            0 => 0.0,
            n => self.correct_responses as f64 / n as f64 * 100.0,
        }
    }

    pub fn average_reaction_time_ms(&self) -> f64 {
        match self.reaction_time_count {
            0 => 0.0,
            n => self.total_reaction_time_ms as f64 / n as f64,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}
