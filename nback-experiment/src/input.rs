//! Debounced, edge-triggered reading of the two response channels.

use nback_core::{Channel, InputSource, Level};
use serde::{Deserialize, Serialize};

use crate::config::DeviceSettings;

/// Which sensor the participant uses. Selected by `input_mode 0|1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    #[default]
    Button,
    Touch,
}

impl InputMode {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(InputMode::Button),
            1 => Some(InputMode::Touch),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            InputMode::Button => "button",
            InputMode::Touch => "touch",
        }
    }
}

/// How one channel turns its raw signal into active/inactive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modality {
    /// Pull-up button, active when the pin reads low.
    Button,
    /// Capacitive pad, active when the reading drops below `threshold`.
    Touch { threshold: u16 },
    Disabled,
}

/// Time-based debouncer for one channel.
///
/// A change in the raw reading restarts the settle timer. Once the reading
/// has held for longer than `delay_ms` it becomes the stable level; only a
/// stable inactive→active change is reported.
#[derive(Debug, Clone)]
pub struct Debouncer {
    modality: Modality,
    delay_ms: u64,
    last_raw: bool,
    stable: bool,
    last_transition_ms: u64,
}

impl Debouncer {
    pub fn new(modality: Modality, delay_ms: u64) -> Self {
        Self {
            modality,
            delay_ms,
            last_raw: false,
            stable: false,
            last_transition_ms: 0,
        }
    }

    pub fn modality(&self) -> Modality {
        self.modality
    }

    /// Feeds one raw sample. Returns true on the poll where a press is accepted.
    pub fn sample(&mut self, active: bool, now: u64) -> bool {
        if active != self.last_raw {
            self.last_transition_ms = now;
            self.last_raw = active;
        }

        if now.saturating_sub(self.last_transition_ms) > self.delay_ms && active != self.stable {
            self.stable = active;
            return active;
        }

        false
    }

    /// Forgets the settled level. A contact already held at reset reads as a
    /// new press once it has been stable for the delay.
    pub fn reset(&mut self, now: u64) {
        self.last_raw = false;
        self.stable = false;
        self.last_transition_ms = now;
    }

    fn set_modality(&mut self, modality: Modality, now: u64) {
        self.modality = modality;
        self.reset(now);
    }
}

/// Both response channels plus the shared mode switch.
#[derive(Debug, Clone)]
pub struct InputReader {
    mode: InputMode,
    confirm: Debouncer,
    wrong: Debouncer,
    thresholds: [u16; 2],
    enabled: [bool; 2],
}

impl InputReader {
    pub fn new(settings: &DeviceSettings) -> Self {
        let thresholds = [
            settings.touch_threshold_confirm,
            settings.touch_threshold_wrong,
        ];
        let enabled = [settings.confirm_enabled, settings.wrong_enabled];
        let modality = |i: usize| modality_for(settings.input_mode, thresholds[i], enabled[i]);
        Self {
            mode: settings.input_mode,
            confirm: Debouncer::new(modality(0), settings.debounce_delay_ms),
            wrong: Debouncer::new(modality(1), settings.debounce_delay_ms),
            thresholds,
            enabled,
        }
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn modality(&self, channel: Channel) -> Modality {
        self.debouncer(channel).modality()
    }

    pub fn set_mode(&mut self, mode: InputMode, now: u64) {
        self.mode = mode;
        for channel in Channel::ALL {
            let i = slot(channel);
            let modality = modality_for(mode, self.thresholds[i], self.enabled[i]);
            self.debouncer_mut(channel).set_modality(modality, now);
        }
    }

    /// True at most once per physical press.
    pub fn is_pressed<I: InputSource>(&mut self, source: &mut I, channel: Channel, now: u64) -> bool {
        let debouncer = self.debouncer_mut(channel);
        let active = match debouncer.modality {
            Modality::Button => source.read_digital(channel) == Level::Low,
            Modality::Touch { threshold } => source.read_touch(channel) < threshold,
            Modality::Disabled => return false,
        };
        debouncer.sample(active, now)
    }

    /// Samples both channels so neither falls behind; confirm wins a tie.
    pub fn poll<I: InputSource>(&mut self, source: &mut I, now: u64) -> Option<Channel> {
        let confirm = self.is_pressed(source, Channel::Confirm, now);
        let wrong = self.is_pressed(source, Channel::Wrong, now);
        match (confirm, wrong) {
            (true, _) => Some(Channel::Confirm),
            (false, true) => Some(Channel::Wrong),
            _ => None,
        }
    }

    /// Undebounced reading for diagnostics: the touch value, or 0/1 for a pin.
    /// A disabled channel reads as 0 without touching the pin.
    pub fn raw_reading<I: InputSource>(&self, source: &mut I, channel: Channel) -> u16 {
        match self.modality(channel) {
            Modality::Touch { .. } => source.read_touch(channel),
            Modality::Button => match source.read_digital(channel) {
                Level::Low => 0,
                Level::High => 1,
            },
            Modality::Disabled => 0,
        }
    }

    pub fn reset(&mut self, now: u64) {
        self.confirm.reset(now);
        self.wrong.reset(now);
    }

    fn debouncer(&self, channel: Channel) -> &Debouncer {
        match channel {
            Channel::Confirm => &self.confirm,
            Channel::Wrong => &self.wrong,
        }
    }

    fn debouncer_mut(&mut self, channel: Channel) -> &mut Debouncer {
        match channel {
            Channel::Confirm => &mut self.confirm,
            Channel::Wrong => &mut self.wrong,
        }
    }
}

fn slot(channel: Channel) -> usize {
    match channel {
        Channel::Confirm => 0,
        Channel::Wrong => 1,
    }
}

fn modality_for(mode: InputMode, threshold: u16, enabled: bool) -> Modality {
    match (enabled, mode) {
        (false, _) => Modality::Disabled,
        (true, InputMode::Button) => Modality::Button,
        (true, InputMode::Touch) => Modality::Touch { threshold },
    }
}
