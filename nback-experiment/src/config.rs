use std::collections::TryReserveError;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::input::InputMode;

pub const MIN_STIMULUS_DURATION_MS: u64 = 100;
pub const MIN_INTER_STIMULUS_INTERVAL_MS: u64 = 100;
/// The firmware keeps the study id in a 10-byte C string.
pub const STUDY_ID_MAX_LEN: usize = 9;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("stimulus duration {0} ms is below {min} ms", min = MIN_STIMULUS_DURATION_MS)]
    StimulusTooShort(u64),
    #[error("inter-stimulus interval {0} ms is below {min} ms", min = MIN_INTER_STIMULUS_INTERVAL_MS)]
    IntervalTooShort(u64),
    #[error("n-back level must be at least 1")]
    InvalidNBackLevel,
    #[error("trial count {count} outside {min}..={max}")]
    TrialCountOutOfRange { count: usize, min: usize, max: usize },
    #[error("trial count {trials} must exceed n-back level {n_back}")]
    TrialsNotAboveNBack { trials: usize, n_back: usize },
    #[error("study id is empty")]
    EmptyStudyId,
    #[error("study id '{0}' is longer than {max} characters", max = STUDY_ID_MAX_LEN)]
    StudyIdTooLong(String),
    #[error("sequence buffer allocation failed: {0}")]
    Allocation(#[from] TryReserveError),
    #[error("invalid device settings: {0}")]
    InvalidSettings(String),
}

/// Parameters of one run. Fixed while a session is active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub stimulus_duration_ms: u64,
    pub inter_stimulus_interval_ms: u64,
    pub n_back_level: usize,
    pub trial_count: usize,
    pub study_id: String,
    pub session_number: u16,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            stimulus_duration_ms: 2000,
            inter_stimulus_interval_ms: 2000,
            n_back_level: 1,
            trial_count: 30,
            study_id: "DEFAULT".to_string(),
            session_number: 0,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self, settings: &DeviceSettings) -> Result<(), ConfigError> {
        if self.stimulus_duration_ms < MIN_STIMULUS_DURATION_MS {
            return Err(ConfigError::StimulusTooShort(self.stimulus_duration_ms));
        }
        if self.inter_stimulus_interval_ms < MIN_INTER_STIMULUS_INTERVAL_MS {
            return Err(ConfigError::IntervalTooShort(
                self.inter_stimulus_interval_ms,
            ));
        }
        if self.n_back_level < 1 {
            return Err(ConfigError::InvalidNBackLevel);
        }
        if !(settings.min_trials..=settings.max_trials).contains(&self.trial_count) {
            return Err(ConfigError::TrialCountOutOfRange {
                count: self.trial_count,
                min: settings.min_trials,
                max: settings.max_trials,
            });
        }
        if self.trial_count <= self.n_back_level {
            return Err(ConfigError::TrialsNotAboveNBack {
                trials: self.trial_count,
                n_back: self.n_back_level,
            });
        }
        if self.study_id.is_empty() {
            return Err(ConfigError::EmptyStudyId);
        }
        if self.study_id.chars().count() > STUDY_ID_MAX_LEN {
            return Err(ConfigError::StudyIdTooLong(self.study_id.clone()));
        }
        Ok(())
    }
}

/// Firmware constants that outlive a session. Every field has a default, so
/// a settings file only needs to name what it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    pub feedback_duration_ms: u64,
    pub debounce_delay_ms: u64,
    pub debug_color_interval_ms: u64,
    pub debug_report_interval_ms: u64,
    pub touch_threshold_confirm: u16,
    pub touch_threshold_wrong: u16,
    pub confirm_enabled: bool,
    pub wrong_enabled: bool,
    pub input_mode: InputMode,
    pub record_capacity: usize,
    pub min_trials: usize,
    pub max_trials: usize,
    /// `exit` during a session keeps the partial data instead of dropping it.
    pub finalize_on_exit: bool,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            feedback_duration_ms: 100,
            debounce_delay_ms: 20,
            debug_color_interval_ms: 1000,
            debug_report_interval_ms: 1000,
            touch_threshold_confirm: 37,
            touch_threshold_wrong: 37,
            confirm_enabled: true,
            wrong_enabled: true,
            input_mode: InputMode::Button,
            record_capacity: 50,
            min_trials: 5,
            max_trials: 50,
            finalize_on_exit: false,
        }
    }
}

impl DeviceSettings {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_trials < 2 {
            return Err(ConfigError::InvalidSettings(format!(
                "min_trials {} must be at least 2",
                self.min_trials
            )));
        }
        if self.max_trials < self.min_trials {
            return Err(ConfigError::InvalidSettings(format!(
                "max_trials {} below min_trials {}",
                self.max_trials, self.min_trials
            )));
        }
        if self.record_capacity == 0 {
            return Err(ConfigError::InvalidSettings(
                "record_capacity must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
