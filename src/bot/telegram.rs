//! Telegram transport using teloxide.

use std::path::Path;

use async_trait::async_trait;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{
    FileId, InputFile, KeyboardButton, KeyboardMarkup, KeyboardRemove, MessageId, ParseMode,
    ReplyMarkup,
};
use tracing::{debug, info, warn};

use crate::bot::extract::{DocumentRef, Inbound};
use crate::bot::messenger::{AudioMeta, Keyboard, Messenger, MessengerError, Reply, SentMessage};

/// A single Telegram chat.
pub struct TelegramChat {
    bot: Bot,
    chat_id: ChatId,
}

impl TelegramChat {
    pub fn new(bot: Bot, chat_id: ChatId) -> Self {
        Self { bot, chat_id }
    }
}

fn failed(action: &str, e: impl std::fmt::Display) -> MessengerError {
    let msg = format!("Failed to {action}: {e}");
    warn!("{}", msg);
    MessengerError(msg)
}

fn reply_markup(keyboard: Keyboard) -> Option<ReplyMarkup> {
    match keyboard {
        Keyboard::Unchanged => None,
        Keyboard::Buttons(rows) => {
            let rows = rows
                .into_iter()
                .map(|row| row.into_iter().map(KeyboardButton::new).collect::<Vec<_>>())
                .collect::<Vec<_>>();
            Some(ReplyMarkup::Keyboard(KeyboardMarkup::new(rows).resize_keyboard()))
        }
        Keyboard::Remove => Some(ReplyMarkup::KeyboardRemove(KeyboardRemove::new())),
    }
}

#[async_trait]
impl Messenger for TelegramChat {
    async fn send(&self, reply: Reply) -> Result<SentMessage, MessengerError> {
        let mut request = self.bot.send_message(self.chat_id, reply.text);
        if reply.markdown {
            request = request.parse_mode(ParseMode::Markdown);
        }
        if let Some(markup) = reply_markup(reply.keyboard) {
            request = request.reply_markup(markup);
        }

        request
            .await
            .map(|msg| SentMessage(msg.id.0))
            .map_err(|e| failed("send", e))
    }

    async fn edit_text(&self, message: SentMessage, text: &str) -> Result<(), MessengerError> {
        self.bot
            .edit_message_text(self.chat_id, MessageId(message.0), text)
            .await
            .map(|_| ())
            .map_err(|e| failed("edit message", e))
    }

    async fn delete(&self, message: SentMessage) -> Result<(), MessengerError> {
        self.bot
            .delete_message(self.chat_id, MessageId(message.0))
            .await
            .map(|_| ())
            .map_err(|e| failed("delete message", e))
    }

    async fn send_audio(&self, path: &Path, meta: &AudioMeta) -> Result<SentMessage, MessengerError> {
        info!("🔊 Sending audio to chat {} ({:?})", self.chat_id, path.file_name());

        self.bot
            .send_audio(self.chat_id, InputFile::file(path))
            .title(meta.title.clone())
            .performer(meta.performer.clone())
            .caption(meta.caption.clone())
            .await
            .map(|msg| SentMessage(msg.id.0))
            .map_err(|e| failed("send audio", e))
    }

    async fn download(&self, file_id: &str, dest: &Path) -> Result<(), MessengerError> {
        let file = self
            .bot
            .get_file(FileId(file_id.to_string()))
            .await
            .map_err(|e| failed("get file info", e))?;

        let mut out = tokio::fs::File::create(dest)
            .await
            .map_err(|e| failed("create download file", e))?;
        self.bot
            .download_file(&file.path, &mut out)
            .await
            .map_err(|e| failed("download file", e))?;

        debug!("📥 Downloaded {} bytes to {:?}", file.size, dest);
        Ok(())
    }
}

/// Map a Telegram message to the event the conversation understands.
pub fn inbound_from_message(msg: &Message) -> Inbound {
    if let Some(text) = msg.text() {
        return Inbound::Text(text.to_string());
    }

    if let Some(doc) = msg.document() {
        return Inbound::Document(DocumentRef {
            file_id: doc.file.id.0.clone(),
            file_name: doc.file_name.clone(),
            mime_type: doc.mime_type.as_ref().map(|m| m.essence_str().to_string()),
        });
    }

    if msg.photo().is_some() {
        return Inbound::Photo {
            caption: msg.caption().map(str::to_string),
        };
    }

    Inbound::Unsupported
}
