use nback_core::Channel;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrialFlags {
    pub awaiting_response: bool,
    pub target_trial: bool,
    pub feedback_active: bool,
    pub response_made: bool,
    pub response_is_confirm: bool,
    pub in_inter_stimulus_interval: bool,
}

/// Absolute clock readings (ms) for the current trial.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrialTimestamps {
    pub trial_start: u64,
    pub stimulus_end: u64,
    pub feedback_start: u64,
    /// Onset relative to session start, as recorded.
    pub onset: u64,
}

/// First press captured in a response window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    pub channel: Channel,
    pub reaction_time_ms: u64,
    /// Relative to session start.
    pub at_ms: u64,
}

#[derive(Debug, Clone, Default)]
pub struct TrialState {
    pub index: usize,
    pub flags: TrialFlags,
    pub timestamps: TrialTimestamps,
    pub response: Option<Response>,
}

impl TrialState {
    pub fn begin(&mut self, index: usize, now: u64, onset: u64, target: bool) {
        self.index = index;
        self.response = None;
        self.flags.awaiting_response = true;
        self.flags.target_trial = target;
        self.flags.response_made = false;
        self.flags.response_is_confirm = false;
        self.flags.in_inter_stimulus_interval = false;
        self.timestamps.trial_start = now;
        self.timestamps.onset = onset;
    }

    /// Stores the press if it is the first one in an open window.
    pub fn capture(&mut self, channel: Channel, now: u64, at_ms: u64) -> Option<Response> {
        if !self.flags.awaiting_response || self.flags.response_made {
            return None;
        }
        let response = Response {
            channel,
            reaction_time_ms: now.saturating_sub(self.timestamps.trial_start),
            at_ms,
        };
        self.flags.response_made = true;
        self.flags.response_is_confirm = channel == Channel::Confirm;
        self.response = Some(response);
        Some(response)
    }

    /// Moves every running timer forward by time spent frozen.
    pub fn shift(&mut self, frozen_ms: u64) {
        self.timestamps.trial_start += frozen_ms;
        self.timestamps.stimulus_end += frozen_ms;
        self.timestamps.feedback_start += frozen_ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_first_press_is_kept() {
        let mut t = TrialState::default();
        t.begin(0, 1_000, 0, true);
        let first = t.capture(Channel::Wrong, 1_300, 300).unwrap();
        assert_eq!(first.reaction_time_ms, 300);
        assert!(t.capture(Channel::Confirm, 1_400, 400).is_none());
        assert!(!t.flags.response_is_confirm);
        assert_eq!(t.response, Some(first));
    }

    #[test]
    fn closed_window_ignores_presses() {
        let mut t = TrialState::default();
        assert!(t.capture(Channel::Confirm, 10, 10).is_none());
        assert!(!t.flags.response_made);
    }

    #[test]
    fn begin_clears_previous_response() {
        let mut t = TrialState::default();
        t.begin(0, 0, 0, false);
        t.capture(Channel::Confirm, 50, 50);
        t.begin(1, 2_000, 2_000, true);
        assert!(t.response.is_none());
        assert!(!t.flags.response_made);
        assert!(t.flags.awaiting_response);
        assert_eq!(t.index, 1);
    }
}
