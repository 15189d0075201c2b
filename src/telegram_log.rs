//! Forwards warnings and errors to an admin chat.

use teloxide::prelude::*;
use teloxide::types::ChatId;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

/// Telegram rejects messages longer than 4096 characters.
const MAX_MESSAGE_CHARS: usize = 4000;
/// Entries queued beyond this are dropped rather than blocking the logger.
const QUEUE_CAPACITY: usize = 256;
/// Entries merged into one message when a burst is queued.
const MAX_BATCH: usize = 20;

/// Targets never forwarded: a failing send would log again and loop.
const MUTED_TARGETS: &[&str] = &["teloxide", "reqwest", "hyper"];

pub struct TelegramLogLayer {
    tx: mpsc::Sender<String>,
}

impl TelegramLogLayer {
    /// Must be called inside a tokio runtime.
    pub fn new(bot: Bot, chat_id: ChatId) -> Self {
        let (tx, mut rx) = mpsc::channel::<String>(QUEUE_CAPACITY);

        tokio::spawn(async move {
            while let Some(first) = rx.recv().await {
                let mut batch = vec![first];
                while batch.len() < MAX_BATCH {
                    match rx.try_recv() {
                        Ok(entry) => batch.push(entry),
                        Err(_) => break,
                    }
                }
                let text = truncate(&batch.join("\n\n"), MAX_MESSAGE_CHARS);
                if let Err(e) = bot.send_message(chat_id, text).await {
                    eprintln!("Failed to forward log to Telegram: {e}");
                }
            }
        });

        Self { tx }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut)
}

fn format_entry(level: Level, target: &str, message: &str) -> String {
    let icon = if level == Level::ERROR { "❌" } else { "⚠️" };
    format!("{} {} [{}]\n{}", icon, level, target, message)
}

fn forwarded(level: Level, target: &str) -> bool {
    level <= Level::WARN && !MUTED_TARGETS.iter().any(|muted| target.starts_with(muted))
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else if self.message.is_empty() {
            self.message = format!("{} = {:?}", field.name(), value);
        } else {
            self.message.push_str(&format!(", {} = {:?}", field.name(), value));
        }
    }
}

impl<S: Subscriber> Layer<S> for TelegramLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let level = *metadata.level();
        if !forwarded(level, metadata.target()) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        if self
            .tx
            .try_send(format_entry(level, metadata.target(), &visitor.message))
            .is_err()
        {
            eprintln!("Log queue full or closed, message dropped");
        }
    }
}
