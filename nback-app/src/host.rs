//! Stand-ins for the pixel and the response pins when running on a host.

use nback_core::{Channel, Color, InputSource, Level, StimulusOutput};
use nback_timing::{Clock, MonotonicClock};
use tracing::info;

/// How long a simulated press or touch stays active.
pub const HOLD_MS: u64 = 60;

const TOUCH_IDLE: u16 = 60;
const TOUCH_ACTIVE: u16 = 10;

/// Prints every pixel change to the log.
#[derive(Debug, Default)]
pub struct ConsolePixel {
    pub writes: u64,
}

impl StimulusOutput for ConsolePixel {
    fn set_output(&mut self, color: Option<Color>) {
        self.writes += 1;
        match color {
            Some(c) => info!(color = %c, rgb = ?c.rgb(), "pixel on"),
            None => info!("pixel off"),
        }
    }
}

/// Host-only stdin lines that poke the simulated pins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostAction {
    Press(Channel),
    Touch(Channel),
}

impl HostAction {
    /// `press confirm|wrong` or `touch confirm|wrong`; anything else is left
    /// for the command dispatcher.
    pub fn parse(line: &str) -> Option<Self> {
        let (verb, target) = line.trim().split_once(char::is_whitespace)?;
        let channel = match target.trim() {
            "confirm" => Channel::Confirm,
            "wrong" => Channel::Wrong,
            _ => return None,
        };
        match verb {
            "press" => Some(HostAction::Press(channel)),
            "touch" => Some(HostAction::Touch(channel)),
            _ => None,
        }
    }
}

/// Buttons and touch pads that read active until a deadline.
#[derive(Debug, Clone)]
pub struct SimulatedPins {
    clock: MonotonicClock,
    button_until: [u64; 2],
    touch_until: [u64; 2],
}

impl SimulatedPins {
    pub fn new(clock: MonotonicClock) -> Self {
        Self {
            clock,
            button_until: [0; 2],
            touch_until: [0; 2],
        }
    }

    pub fn apply(&mut self, action: HostAction) {
        let until = self.clock.now() + HOLD_MS;
        match action {
            HostAction::Press(ch) => self.button_until[slot(ch)] = until,
            HostAction::Touch(ch) => self.touch_until[slot(ch)] = until,
        }
    }

    fn held(&self, deadlines: &[u64; 2], channel: Channel) -> bool {
        self.clock.now() < deadlines[slot(channel)]
    }
}

impl InputSource for SimulatedPins {
    fn read_digital(&mut self, channel: Channel) -> Level {
        if self.held(&self.button_until, channel) {
            Level::Low
        } else {
            Level::High
        }
    }

    fn read_touch(&mut self, channel: Channel) -> u16 {
        if self.held(&self.touch_until, channel) {
            TOUCH_ACTIVE
        } else {
            TOUCH_IDLE
        }
    }
}

fn slot(channel: Channel) -> usize {
    match channel {
        Channel::Confirm => 0,
        Channel::Wrong => 1,
    }
}
