//! Text-to-speech bot core: conversation, extraction, speed and synthesis.

pub mod conversation;
pub mod extract;
pub mod files;
pub mod input;
pub mod messenger;
pub mod session;
pub mod speed;
pub mod synthesis;
pub mod telegram;

#[cfg(test)]
mod testing;

pub use conversation::{Conversation, Limits, Outcome, SessionStorage, user_dialogue};
pub use extract::Inbound;
pub use files::FileStore;
pub use session::{ConversationState, Session};
pub use synthesis::{EspeakTts, GoogleTts, SpeechGateway};
pub use telegram::{TelegramChat, inbound_from_message};
