//! Text extraction and validation.
//!
//! Text can arrive three ways: a plain message, an uploaded .txt document,
//! or a photo caption. Everything funnels into [`validate`] before it is
//! stored or spoken.

use std::fmt;

use tracing::{debug, info, warn};

use crate::bot::files::FileStore;
use crate::bot::messenger::Messenger;

/// An uploaded document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef {
    pub file_id: String,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
}

impl DocumentRef {
    pub fn is_plain_text(&self) -> bool {
        let by_mime = self
            .mime_type
            .as_deref()
            .is_some_and(|m| m.eq_ignore_ascii_case("text/plain"));
        let by_name = self
            .file_name
            .as_deref()
            .is_some_and(|n| n.to_lowercase().ends_with(".txt"));
        by_mime || by_name
    }
}

/// An inbound user event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    Document(DocumentRef),
    Photo { caption: Option<String> },
    /// Stickers, voice notes and anything else without text.
    Unsupported,
}

/// Text that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextPayload(String);

impl TextPayload {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn char_count(&self) -> usize {
        self.0.chars().count()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Bad text from the user. Recovered by reprompting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    TooLong { length: usize, max: usize },
    NotReadable,
}

impl InputError {
    pub fn user_message(&self) -> String {
        match self {
            Self::TooLong { length, max } => format!(
                "❌ Text too long ({}/{} characters). Please shorten your text.",
                length, max
            ),
            Self::NotReadable => "❌ Text contains only emojis or special characters. \
                                  Please send readable text."
                .to_string(),
        }
    }
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooLong { length, max } => write!(f, "text too long ({}/{})", length, max),
            Self::NotReadable => write!(f, "text has no alphanumeric characters"),
        }
    }
}

impl std::error::Error for InputError {}

/// Could not get text out of the event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    NoText,
    UnsupportedDocument,
    Download(String),
    Unreadable(String),
}

impl ExtractionError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NoText => "❌ No text found. Please send text, .txt file, or photo with caption.",
            Self::UnsupportedDocument => "❌ Only plain text (.txt) files are supported.",
            Self::Download(_) | Self::Unreadable(_) => {
                "❌ Error reading text file. Please try again."
            }
        }
    }
}

impl fmt::Display for ExtractionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoText => write!(f, "no text in message"),
            Self::UnsupportedDocument => write!(f, "document is not plain text"),
            Self::Download(e) => write!(f, "download failed: {}", e),
            Self::Unreadable(e) => write!(f, "document unreadable: {}", e),
        }
    }
}

impl std::error::Error for ExtractionError {}

/// Check length and content. The trimmed text is the canonical payload.
pub fn validate(text: &str, max_len: usize) -> Result<TextPayload, InputError> {
    let trimmed = text.trim();
    let length = trimmed.chars().count();
    if length > max_len {
        return Err(InputError::TooLong {
            length,
            max: max_len,
        });
    }
    if !trimmed.chars().any(char::is_alphanumeric) {
        return Err(InputError::NotReadable);
    }
    Ok(TextPayload(trimmed.to_string()))
}

/// Pull raw text out of an event. Does not validate.
pub async fn extract(
    event: &Inbound,
    messenger: &dyn Messenger,
    files: &FileStore,
) -> Result<String, ExtractionError> {
    match event {
        Inbound::Text(body) => {
            if body.trim_start().starts_with('/') || body.trim().is_empty() {
                return Err(ExtractionError::NoText);
            }
            Ok(body.clone())
        }
        Inbound::Document(doc) => read_document(doc, messenger, files).await,
        Inbound::Photo { caption } => match caption.as_deref() {
            Some(c) if !c.trim().is_empty() => {
                debug!("Using photo caption ({} chars)", c.chars().count());
                Ok(c.to_string())
            }
            _ => Err(ExtractionError::NoText),
        },
        Inbound::Unsupported => Err(ExtractionError::NoText),
    }
}

async fn read_document(
    doc: &DocumentRef,
    messenger: &dyn Messenger,
    files: &FileStore,
) -> Result<String, ExtractionError> {
    if !doc.is_plain_text() {
        info!("Rejected document {:?} ({:?})", doc.file_name, doc.mime_type);
        return Err(ExtractionError::UnsupportedDocument);
    }

    let scratch = files.allocate().with_extension("txt");
    let downloaded = messenger.download(&doc.file_id, &scratch).await;
    let content = match downloaded {
        Ok(()) => tokio::fs::read(&scratch).await,
        Err(e) => {
            files.delete(&scratch).await;
            warn!("Document download failed: {}", e);
            return Err(ExtractionError::Download(e.0));
        }
    };
    files.delete(&scratch).await;

    let bytes = content.map_err(|e| {
        warn!("Failed to read downloaded document: {}", e);
        ExtractionError::Unreadable(e.to_string())
    })?;
    let text = String::from_utf8(bytes).map_err(|e| {
        warn!("Document is not UTF-8: {}", e);
        ExtractionError::Unreadable(e.to_string())
    })?;

    info!("Read text document ({} chars)", text.chars().count());
    Ok(text.trim_start_matches('\u{feff}').to_string())
}
