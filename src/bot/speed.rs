//! Speed selection.

use std::fmt;

use crate::bot::input::{Button, Input};
use crate::bot::session::Session;

pub const MIN_SPEED: f64 = 0.1;
pub const MAX_SPEED: f64 = 3.0;

/// A playback multiplier inside `[MIN_SPEED, MAX_SPEED]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Speed(f64);

impl Speed {
    pub const NORMAL: Speed = Speed(1.0);

    pub fn new(value: f64) -> Result<Self, SpeedError> {
        if value.is_finite() && (MIN_SPEED..=MAX_SPEED).contains(&value) {
            Ok(Self(value))
        } else {
            Err(SpeedError::OutOfRange(value))
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // "1.0", not "1"
        if self.0.fract() == 0.0 {
            write!(f, "{:.1}", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl std::str::FromStr for Speed {
    type Err = SpeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: f64 = s
            .trim()
            .parse()
            .map_err(|_| SpeedError::NotANumber(s.trim().to_string()))?;
        Self::new(value)
    }
}

/// The four speed buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Half,
    Normal,
    OneAndHalf,
    Double,
}

impl Preset {
    pub fn speed(self) -> Speed {
        match self {
            Self::Half => Speed(0.5),
            Self::Normal => Speed(1.0),
            Self::OneAndHalf => Speed(1.5),
            Self::Double => Speed(2.0),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Half => "0.5x🐢",
            Self::Normal => "1.0x⚡",
            Self::OneAndHalf => "1.5x🚀",
            Self::Double => "2.0x💨",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpeedError {
    NotANumber(String),
    OutOfRange(f64),
}

impl fmt::Display for SpeedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotANumber(s) => write!(f, "'{}' is not a number", s),
            Self::OutOfRange(v) => {
                write!(f, "speed {} is outside {}..={}", v, MIN_SPEED, MAX_SPEED)
            }
        }
    }
}

impl std::error::Error for SpeedError {}

/// What the resolver wants the conversation to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Selected(Speed),
    /// "Custom" was pressed; the next message should be a number.
    AwaitCustom,
    /// Custom entry failed. Stay in the custom sub-mode.
    InvalidCustom(SpeedError),
    /// Neither a preset nor a custom entry.
    Unrecognized,
}

/// Map a message received in the speed step to a speed.
///
/// Only touches `session.awaiting_custom_speed`.
pub fn resolve(input: &Input, session: &mut Session) -> Resolution {
    match input {
        Input::Button(Button::Preset(preset)) => {
            session.awaiting_custom_speed = false;
            Resolution::Selected(preset.speed())
        }
        Input::Button(Button::Custom) => {
            session.awaiting_custom_speed = true;
            Resolution::AwaitCustom
        }
        Input::Text(raw) if session.awaiting_custom_speed => match raw.parse::<Speed>() {
            Ok(speed) => {
                session.awaiting_custom_speed = false;
                Resolution::Selected(speed)
            }
            Err(e) => Resolution::InvalidCustom(e),
        },
        _ => Resolution::Unrecognized,
    }
}
