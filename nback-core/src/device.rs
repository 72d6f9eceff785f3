//! Narrow interfaces to the hardware the engine drives.
//!
//! The engine owns one output device and one input source. Pin setup and the
//! pixel protocol live behind these traits.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::stimulus::Color;

/// Logical response channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    Confirm,
    Wrong,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Confirm, Channel::Wrong];

    /// Upper-case tag used by input forwarding.
    pub fn tag(&self) -> &'static str {
        match self {
            Channel::Confirm => "CONFIRM",
            Channel::Wrong => "WRONG",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Digital pin level. Buttons are wired with pull-ups, so `Low` is pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Level {
    Low,
    #[default]
    High,
}

/// Single-pixel stimulus display. `None` blanks it.
pub trait StimulusOutput {
    fn set_output(&mut self, color: Option<Color>);
}

/// Raw readings from the two response channels.
pub trait InputSource {
    fn read_digital(&mut self, channel: Channel) -> Level;
    /// Capacitive reading; lower means touched.
    fn read_touch(&mut self, channel: Channel) -> u16;
}

impl<T: StimulusOutput + ?Sized> StimulusOutput for &mut T {
    fn set_output(&mut self, color: Option<Color>) {
        (**self).set_output(color)
    }
}

impl<T: InputSource + ?Sized> InputSource for &mut T {
    fn read_digital(&mut self, channel: Channel) -> Level {
        (**self).read_digital(channel)
    }

    fn read_touch(&mut self, channel: Channel) -> u16 {
        (**self).read_touch(channel)
    }
}
