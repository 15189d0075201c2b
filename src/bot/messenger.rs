//! Outbound side of a chat, as seen by the conversation.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;

/// Reply keyboard to attach to a text message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Keyboard {
    /// Leave whatever the user currently sees.
    #[default]
    Unchanged,
    Buttons(Vec<Vec<&'static str>>),
    Remove,
}

/// An outgoing text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub markdown: bool,
    pub keyboard: Keyboard,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markdown: false,
            keyboard: Keyboard::Unchanged,
        }
    }

    pub fn markdown(mut self) -> Self {
        self.markdown = true;
        self
    }

    pub fn keyboard(mut self, rows: Vec<Vec<&'static str>>) -> Self {
        self.keyboard = Keyboard::Buttons(rows);
        self
    }

    pub fn remove_keyboard(mut self) -> Self {
        self.keyboard = Keyboard::Remove;
        self
    }
}

/// Metadata shown with an audio upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioMeta {
    pub title: String,
    pub performer: String,
    pub caption: String,
}

/// Id of a message the bot sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentMessage(pub i32);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessengerError(pub String);

impl fmt::Display for MessengerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for MessengerError {}

/// One user's chat.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send(&self, reply: Reply) -> Result<SentMessage, MessengerError>;

    async fn edit_text(&self, message: SentMessage, text: &str) -> Result<(), MessengerError>;

    async fn delete(&self, message: SentMessage) -> Result<(), MessengerError>;

    /// Upload an audio file. The file must stay on disk until this returns.
    async fn send_audio(&self, path: &Path, meta: &AudioMeta) -> Result<SentMessage, MessengerError>;

    /// Fetch an uploaded document into `dest`.
    async fn download(&self, file_id: &str, dest: &Path) -> Result<(), MessengerError>;
}
