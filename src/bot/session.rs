//! Per-user conversation state.
//!
//! A `Session` is owned by the dialogue storage and handed to the state
//! machine by value for each event. Nothing here is shared between users.

use crate::bot::speed::Speed;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConversationState {
    #[default]
    MainMenu,
    AwaitingText,
    AwaitingSpeed,
    ContinuousMode,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub state: ConversationState,
    /// Validated text waiting for a speed choice.
    pub pending_text: Option<String>,
    pub last_speed: Option<Speed>,
    pub awaiting_custom_speed: bool,
}

impl Session {
    #[cfg(test)]
    pub fn in_state(state: ConversationState) -> Self {
        Self {
            state,
            ..Self::default()
        }
    }

    /// Move to `state`, leaving stored data alone.
    pub fn goto(mut self, state: ConversationState) -> Self {
        self.state = state;
        self
    }

    /// Back to the main menu with no pending work.
    pub fn reset(self) -> Self {
        Self {
            last_speed: self.last_speed,
            ..Self::default()
        }
    }
}
