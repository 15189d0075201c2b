//! In-memory messenger for tests.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use async_trait::async_trait;

use crate::bot::messenger::{AudioMeta, Messenger, MessengerError, Reply, SentMessage};

/// One audio upload as seen by the chat.
#[derive(Debug, Clone)]
pub struct SentAudio {
    pub path: PathBuf,
    /// The file was readable while the upload was in progress.
    pub existed: bool,
    pub bytes: Vec<u8>,
    pub meta: AudioMeta,
}

#[derive(Default)]
pub struct RecordingMessenger {
    next_id: AtomicI32,
    document: Option<Vec<u8>>,
    fail_audio: AtomicBool,
    replies: Mutex<Vec<Reply>>,
    edits: Mutex<Vec<(SentMessage, String)>>,
    deletes: Mutex<Vec<SentMessage>>,
    audio: Mutex<Vec<SentAudio>>,
    downloads: Mutex<Vec<String>>,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content served for every document download.
    pub fn with_document(self, content: &str) -> Self {
        self.with_document_bytes(content.as_bytes().to_vec())
    }

    pub fn with_document_bytes(mut self, content: Vec<u8>) -> Self {
        self.document = Some(content);
        self
    }

    pub fn fail_audio(&self, fail: bool) {
        self.fail_audio.store(fail, Ordering::SeqCst);
    }

    pub fn replies(&self) -> Vec<Reply> {
        self.replies.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.replies().into_iter().map(|r| r.text).collect()
    }

    pub fn last_text(&self) -> String {
        self.texts().pop().unwrap_or_default()
    }

    pub fn edits(&self) -> Vec<(SentMessage, String)> {
        self.edits.lock().unwrap().clone()
    }

    pub fn deletes(&self) -> Vec<SentMessage> {
        self.deletes.lock().unwrap().clone()
    }

    pub fn audio(&self) -> Vec<SentAudio> {
        self.audio.lock().unwrap().clone()
    }

    pub fn downloads(&self) -> Vec<String> {
        self.downloads.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.replies.lock().unwrap().clear();
        self.edits.lock().unwrap().clear();
        self.deletes.lock().unwrap().clear();
        self.audio.lock().unwrap().clear();
    }

    fn next(&self) -> SentMessage {
        SentMessage(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send(&self, reply: Reply) -> Result<SentMessage, MessengerError> {
        self.replies.lock().unwrap().push(reply);
        Ok(self.next())
    }

    async fn edit_text(&self, message: SentMessage, text: &str) -> Result<(), MessengerError> {
        self.edits.lock().unwrap().push((message, text.to_string()));
        Ok(())
    }

    async fn delete(&self, message: SentMessage) -> Result<(), MessengerError> {
        self.deletes.lock().unwrap().push(message);
        Ok(())
    }

    async fn send_audio(&self, path: &Path, meta: &AudioMeta) -> Result<SentMessage, MessengerError> {
        if self.fail_audio.load(Ordering::SeqCst) {
            return Err(MessengerError("upload failed".to_string()));
        }
        let bytes = std::fs::read(path).unwrap_or_default();
        self.audio.lock().unwrap().push(SentAudio {
            path: path.to_path_buf(),
            existed: path.exists(),
            bytes,
            meta: meta.clone(),
        });
        Ok(self.next())
    }

    async fn download(&self, file_id: &str, dest: &Path) -> Result<(), MessengerError> {
        self.downloads.lock().unwrap().push(file_id.to_string());
        match &self.document {
            Some(content) => {
                std::fs::write(dest, content).map_err(|e| MessengerError(e.to_string()))
            }
            None => Err(MessengerError("file not found".to_string())),
        }
    }
}
