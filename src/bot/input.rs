//! Raw chat input to a closed set of commands.
//!
//! Button labels carry emoji decoration for display. Matching strips that
//! decoration, so the state machine only ever sees [`Input`] values.

use crate::bot::speed::Preset;

pub const LABEL_CONVERT: &str = "🎤 Convert Text";
pub const LABEL_BACK: &str = "Back↩️";
pub const LABEL_CUSTOM: &str = "Custom🔧";
pub const LABEL_KEEP_SENDING: &str = "🔄 Keep Sending";
pub const LABEL_STOP: &str = "🛑 Stop";

/// Slash commands handled in every state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlashCommand {
    Start,
    Help,
    Cancel,
}

/// Reply keyboard buttons.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Button {
    Convert,
    Back,
    Preset(Preset),
    Custom,
    KeepSending,
    Stop,
}

impl Button {
    pub fn label(self) -> &'static str {
        match self {
            Self::Convert => LABEL_CONVERT,
            Self::Back => LABEL_BACK,
            Self::Preset(p) => p.label(),
            Self::Custom => LABEL_CUSTOM,
            Self::KeepSending => LABEL_KEEP_SENDING,
            Self::Stop => LABEL_STOP,
        }
    }

    const ALL: [Button; 9] = [
        Self::Convert,
        Self::Back,
        Self::Preset(Preset::Half),
        Self::Preset(Preset::Normal),
        Self::Preset(Preset::OneAndHalf),
        Self::Preset(Preset::Double),
        Self::Custom,
        Self::KeepSending,
        Self::Stop,
    ];
}

/// A parsed text message.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Command(SlashCommand),
    /// Any other `/word`. Never treated as text to speak.
    UnknownCommand(String),
    Button(Button),
    Text(String),
}

impl Input {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();

        if let Some(rest) = trimmed.strip_prefix('/') {
            // "/start@my_bot args" -> "start"
            let name = rest
                .split(|c: char| c.is_whitespace() || c == '@')
                .next()
                .unwrap_or("")
                .to_lowercase();
            return match name.as_str() {
                "start" => Self::Command(SlashCommand::Start),
                "help" => Self::Command(SlashCommand::Help),
                "cancel" => Self::Command(SlashCommand::Cancel),
                _ => Self::UnknownCommand(trimmed.to_string()),
            };
        }

        let key = normalize(trimmed);
        if !key.is_empty()
            && let Some(button) = Button::ALL.iter().find(|b| normalize(b.label()) == key)
        {
            return Self::Button(*button);
        }

        Self::Text(raw.to_string())
    }
}

/// Lowercase ASCII letters, digits and punctuation. Drops emoji and spacing,
/// so "Stop!" is not "🛑 Stop".
fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_ascii_punctuation())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Input::parse("/start"), Input::Command(SlashCommand::Start));
        assert_eq!(Input::parse("/help"), Input::Command(SlashCommand::Help));
        assert_eq!(Input::parse(" /cancel "), Input::Command(SlashCommand::Cancel));
        assert_eq!(
            Input::parse("/start@speech_bot"),
            Input::Command(SlashCommand::Start)
        );
        assert_eq!(
            Input::parse("/weather"),
            Input::UnknownCommand("/weather".to_string())
        );
    }

    #[test]
    fn test_parse_exact_labels() {
        for button in Button::ALL {
            assert_eq!(Input::parse(button.label()), Input::Button(button));
        }
    }

    #[test]
    fn test_parse_labels_without_decoration() {
        assert_eq!(Input::parse("convert text"), Input::Button(Button::Convert));
        assert_eq!(Input::parse("Stop"), Input::Button(Button::Stop));
        assert_eq!(Input::parse("1.5x"), Input::Button(Button::Preset(Preset::OneAndHalf)));
        assert_eq!(Input::parse("custom"), Input::Button(Button::Custom));
    }

    #[test]
    fn test_parse_plain_text() {
        assert_eq!(Input::parse("Hello world"), Input::Text("Hello world".to_string()));
        // A bare number is not a preset label
        assert_eq!(Input::parse("1.3"), Input::Text("1.3".to_string()));
        assert_eq!(Input::parse("1.5"), Input::Text("1.5".to_string()));
        // Emoji-only input normalizes to nothing and stays text
        assert_eq!(Input::parse("😀😀😀"), Input::Text("😀😀😀".to_string()));
    }

    #[test]
    fn test_punctuation_is_not_decoration() {
        assert_eq!(Input::parse("Stop!"), Input::Text("Stop!".to_string()));
        assert_eq!(Input::parse("Back?"), Input::Text("Back?".to_string()));
    }
}
