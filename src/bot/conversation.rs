//! Conversation state machine.
//!
//! MainMenu -> AwaitingText -> AwaitingSpeed -> ContinuousMode, with /start,
//! /help and /cancel available everywhere. Each event takes the current
//! `Session` by value and yields the next one. Validation failures never
//! advance the state, and a failed synthesis leaves the user where they were.

use std::sync::Arc;

use teloxide::dispatching::dialogue::{Dialogue, InMemStorage};
use teloxide::types::ChatId;
use tracing::{debug, error, info, warn};

use crate::bot::extract::{Inbound, TextPayload, extract, validate};
use crate::bot::files::FileStore;
use crate::bot::input::{
    Button, Input, LABEL_BACK, LABEL_CONVERT, LABEL_CUSTOM, LABEL_KEEP_SENDING, LABEL_STOP,
    SlashCommand,
};
use crate::bot::messenger::{AudioMeta, Messenger, MessengerError, Reply, SentMessage};
use crate::bot::session::{ConversationState, Session};
use crate::bot::speed::{Preset, Resolution, Speed, SpeedError, resolve};
use crate::bot::synthesis::SpeechGateway;

fn welcome_text(max_len: usize) -> String {
    format!(
        "🎤 *Welcome to Text-to-Speech Bot!*\n\n\
         I can convert your text to speech with multiple speed options!\n\n\
         ✨ *Features:*\n\
         • Convert text to audio\n\
         • Multiple speed options (0.5x to 2.0x + custom)\n\
         • Support for .txt files\n\
         • Photo caption processing\n\
         • Up to {} characters\n\n\
         📝 *How to use:*\n\
         1. Send me text, a .txt file, or a photo with caption\n\
         2. Choose your preferred speed\n\
         3. Receive your audio file!\n\n\
         Click the button below to get started! 🚀",
        group_thousands(max_len)
    )
}

fn help_text(max_len: usize) -> String {
    format!(
        "🤖 *Text-to-Speech Bot Help*\n\n\
         📝 *How to use:*\n\
         1. Send /start to begin\n\
         2. Choose 'Convert Text'\n\
         3. Send your text as a message, a .txt file, or a photo caption\n\
         4. Select playback speed\n\
         5. Receive your audio file!\n\n\
         ⚡ *Speed Options:*\n\
         • 0.5x🐢 - Very slow\n\
         • 1.0x⚡ - Normal speed\n\
         • 1.5x🚀 - Fast\n\
         • 2.0x💨 - Very fast\n\
         • Custom🔧 - Any speed from 0.1x to 3.0x\n\n\
         📏 *Limits:*\n\
         • Maximum text length: {} characters\n\
         • Supported formats: text, .txt files, photo captions\n\n\
         🛠 *Commands:*\n\
         /start - Start the bot\n\
         /help - Show this help\n\
         /cancel - Cancel current operation",
        group_thousands(max_len)
    )
}

/// 5000 -> "5,000"
fn group_thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

const SYNTHESIS_FAILED: &str = "❌ Failed to generate audio. Please try again later.";

const UNEXPECTED_ERROR: &str = "❌ An unexpected error occurred. The issue has been logged.\n\n\
    Please try your request again.";

pub const AUDIO_TITLE: &str = "Text-to-Speech Audio";
pub const AUDIO_PERFORMER: &str = "SpeechBot";

/// Text limits and defaults from config.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_text_length: usize,
    pub default_speed: Speed,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_text_length: 5000,
            default_speed: Speed::NORMAL,
        }
    }
}

/// Result of handling one event.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Continue(Session),
    /// Conversation over; drop the session.
    End,
}

pub type SessionStorage = InMemStorage<Session>;
pub type SessionDialogue = Dialogue<Session, SessionStorage>;

/// Sessions are keyed by user, not chat, so two people in one group chat
/// never share a conversation.
pub fn user_dialogue(storage: Arc<SessionStorage>, user_id: u64) -> SessionDialogue {
    Dialogue::new(storage, ChatId(user_id as i64))
}

/// One event from one user.
struct Turn<'a> {
    user_id: u64,
    chat: &'a dyn Messenger,
}

type HandlerResult = Result<Outcome, MessengerError>;

pub struct Conversation {
    gateway: SpeechGateway,
    files: FileStore,
    limits: Limits,
}

impl Conversation {
    pub fn new(gateway: SpeechGateway, files: FileStore, limits: Limits) -> Self {
        Self {
            gateway,
            files,
            limits,
        }
    }

    /// Handle one event. Never fails: anything unexpected is logged, the user
    /// gets a generic reply, and the session is returned unchanged.
    pub async fn handle(
        &self,
        user_id: u64,
        session: Session,
        event: Inbound,
        chat: &dyn Messenger,
    ) -> Outcome {
        let turn = Turn { user_id, chat };
        let before = session.clone();
        let state = session.state;

        match self.dispatch(&turn, session, &event).await {
            Ok(outcome) => {
                if let Outcome::Continue(ref next) = outcome
                    && next.state != state
                {
                    debug!("User {}: {:?} -> {:?}", user_id, state, next.state);
                }
                outcome
            }
            Err(e) => {
                error!("Unhandled error for user {} in {:?}: {}", user_id, state, e);
                if let Err(e) = chat.send(Reply::text(UNEXPECTED_ERROR)).await {
                    error!("Failed to report error to user {}: {}", user_id, e);
                }
                Outcome::Continue(before)
            }
        }
    }

    /// Load the user's session, handle the event, store the result.
    pub async fn handle_stored(
        &self,
        storage: Arc<SessionStorage>,
        user_id: u64,
        event: Inbound,
        chat: &dyn Messenger,
    ) {
        let dialogue = user_dialogue(storage, user_id);
        let session = match dialogue.get_or_default().await {
            Ok(session) => session,
            Err(e) => {
                error!("Failed to load session for user {}: {}", user_id, e);
                Session::default()
            }
        };

        match self.handle(user_id, session, event, chat).await {
            Outcome::Continue(next) => {
                if let Err(e) = dialogue.update(next).await {
                    error!("Failed to store session for user {}: {}", user_id, e);
                }
            }
            Outcome::End => {
                if let Err(e) = dialogue.exit().await {
                    error!("Failed to clear session for user {}: {}", user_id, e);
                }
            }
        }
    }

    async fn dispatch(&self, turn: &Turn<'_>, session: Session, event: &Inbound) -> HandlerResult {
        let input = match event {
            Inbound::Text(body) => Some(Input::parse(body)),
            _ => None,
        };

        if let Some(Input::Command(command)) = &input {
            return match command {
                SlashCommand::Start => self.start(turn).await,
                SlashCommand::Help => {
                    turn.chat
                        .send(Reply::text(help_text(self.limits.max_text_length)).markdown())
                        .await?;
                    Ok(Outcome::Continue(session))
                }
                SlashCommand::Cancel => self.cancel(turn).await,
            };
        }

        match session.state {
            ConversationState::MainMenu => self.main_menu(turn, session, input).await,
            ConversationState::AwaitingText => self.awaiting_text(turn, session, event).await,
            ConversationState::AwaitingSpeed => self.awaiting_speed(turn, session, input).await,
            ConversationState::ContinuousMode => self.continuous(turn, session, input, event).await,
        }
    }

    async fn start(&self, turn: &Turn<'_>) -> HandlerResult {
        turn.chat
            .send(
                Reply::text(welcome_text(self.limits.max_text_length))
                    .markdown()
                    .keyboard(main_keyboard()),
            )
            .await?;
        info!("User {} started the bot", turn.user_id);
        Ok(Outcome::Continue(Session::default()))
    }

    async fn cancel(&self, turn: &Turn<'_>) -> HandlerResult {
        turn.chat
            .send(Reply::text("Operation cancelled.\n\nUse /start to begin again!").remove_keyboard())
            .await?;
        info!("User {} cancelled operation", turn.user_id);
        Ok(Outcome::End)
    }

    async fn show_main_menu(&self, turn: &Turn<'_>, session: Session) -> HandlerResult {
        turn.chat
            .send(Reply::text("Please use the button below to get started:").keyboard(main_keyboard()))
            .await?;
        Ok(Outcome::Continue(session.reset()))
    }

    async fn main_menu(&self, turn: &Turn<'_>, session: Session, input: Option<Input>) -> HandlerResult {
        if input != Some(Input::Button(Button::Convert)) {
            return self.show_main_menu(turn, session).await;
        }

        turn.chat
            .send(
                Reply::text(
                    "📝 Please send your text, .txt file, or photo with caption:\n\n\
                     You can send:\n\
                     • Direct text message\n\
                     • .txt file (document)\n\
                     • Photo with caption\n\n\
                     Or use /cancel to go back",
                )
                .remove_keyboard(),
            )
            .await?;
        Ok(Outcome::Continue(session.goto(ConversationState::AwaitingText)))
    }

    async fn awaiting_text(&self, turn: &Turn<'_>, mut session: Session, event: &Inbound) -> HandlerResult {
        let raw = match extract(event, turn.chat, &self.files).await {
            Ok(raw) => raw,
            Err(e) => {
                info!("User {}: no usable text ({})", turn.user_id, e);
                turn.chat.send(Reply::text(e.user_message())).await?;
                return Ok(Outcome::Continue(session));
            }
        };

        let payload = match validate(&raw, self.limits.max_text_length) {
            Ok(payload) => payload,
            Err(e) => {
                debug!("User {}: rejected text ({})", turn.user_id, e);
                turn.chat.send(Reply::text(e.user_message())).await?;
                return Ok(Outcome::Continue(session));
            }
        };

        info!("User {} submitted text ({} chars)", turn.user_id, payload.char_count());
        turn.chat
            .send(
                Reply::text(format!(
                    "✅ Received {} characters\nNow choose playback speed:",
                    payload.char_count()
                ))
                .keyboard(speed_keyboard()),
            )
            .await?;

        session.pending_text = Some(payload.into_string());
        session.awaiting_custom_speed = false;
        Ok(Outcome::Continue(session.goto(ConversationState::AwaitingSpeed)))
    }

    async fn awaiting_speed(&self, turn: &Turn<'_>, mut session: Session, input: Option<Input>) -> HandlerResult {
        let Some(input) = input else {
            return self.reprompt_speed(turn, session).await;
        };

        if input == Input::Button(Button::Back) {
            return self.show_main_menu(turn, session).await;
        }

        let speed = match resolve(&input, &mut session) {
            Resolution::Selected(speed) => speed,
            Resolution::AwaitCustom => {
                turn.chat
                    .send(
                        Reply::text(
                            "🔧 Enter speed multiplier (0.1 to 3.0):\n\
                             Example: 0.8 for slower, 1.2 for faster",
                        )
                        .remove_keyboard(),
                    )
                    .await?;
                return Ok(Outcome::Continue(session));
            }
            Resolution::InvalidCustom(e) => {
                debug!("User {}: bad custom speed ({})", turn.user_id, e);
                let msg = match e {
                    SpeedError::NotANumber(_) => "❌ Please enter a valid number (0.1 to 3.0)",
                    SpeedError::OutOfRange(_) => "❌ Please enter between 0.1 and 3.0",
                };
                turn.chat.send(Reply::text(msg)).await?;
                return Ok(Outcome::Continue(session));
            }
            Resolution::Unrecognized => return self.reprompt_speed(turn, session).await,
        };

        let Some(text) = session.pending_text.clone() else {
            turn.chat
                .send(Reply::text("❌ Text not found. Please start over."))
                .await?;
            return self.show_main_menu(turn, session).await;
        };
        // Stored text was validated on entry; re-check in case limits changed.
        let payload = match validate(&text, self.limits.max_text_length) {
            Ok(payload) => payload,
            Err(e) => {
                turn.chat.send(Reply::text(e.user_message())).await?;
                return self.show_main_menu(turn, session).await;
            }
        };

        if !self.deliver(turn, &payload, speed).await? {
            turn.chat
                .send(Reply::text(SYNTHESIS_FAILED).keyboard(speed_keyboard()))
                .await?;
            return Ok(Outcome::Continue(session));
        }

        session.last_speed = Some(speed);
        turn.chat
            .send(Reply::text("What would you like to do next?").keyboard(continuous_keyboard()))
            .await?;
        Ok(Outcome::Continue(session.goto(ConversationState::ContinuousMode)))
    }

    async fn reprompt_speed(&self, turn: &Turn<'_>, session: Session) -> HandlerResult {
        turn.chat
            .send(Reply::text("⚠️ Please choose a speed option from the buttons:").keyboard(speed_keyboard()))
            .await?;
        Ok(Outcome::Continue(session))
    }

    /// Only Stop and Keep Sending are buttons here. Text that looks like a
    /// button from another step is spoken like any other text.
    async fn continuous(
        &self,
        turn: &Turn<'_>,
        mut session: Session,
        input: Option<Input>,
        event: &Inbound,
    ) -> HandlerResult {
        let raw = match (input, event) {
            (Some(Input::Button(Button::Stop)), _) => return self.show_main_menu(turn, session).await,
            (Some(Input::Button(Button::KeepSending)), _) => {
                turn.chat
                    .send(Reply::text("📝 Send your next text (or /cancel to stop)").remove_keyboard())
                    .await?;
                session.pending_text = None;
                return Ok(Outcome::Continue(session.goto(ConversationState::AwaitingText)));
            }
            (Some(Input::Text(_) | Input::Button(_)), Inbound::Text(body)) => body.clone(),
            _ => {
                turn.chat
                    .send(
                        Reply::text("⚠️ Please send text or use the buttons below")
                            .keyboard(continuous_keyboard()),
                    )
                    .await?;
                return Ok(Outcome::Continue(session));
            }
        };

        let payload = match validate(&raw, self.limits.max_text_length) {
            Ok(payload) => payload,
            Err(e) => {
                debug!("User {}: rejected text ({})", turn.user_id, e);
                turn.chat
                    .send(Reply::text(e.user_message()).keyboard(continuous_keyboard()))
                    .await?;
                return Ok(Outcome::Continue(session));
            }
        };

        let speed = session.last_speed.unwrap_or(self.limits.default_speed);
        let next = if self.deliver(turn, &payload, speed).await? {
            session.last_speed = Some(speed);
            "Next:"
        } else {
            SYNTHESIS_FAILED
        };
        turn.chat
            .send(Reply::text(next).keyboard(continuous_keyboard()))
            .await?;
        Ok(Outcome::Continue(session))
    }

    /// Synthesize and upload. Returns `false` if the user got no audio.
    ///
    /// The artifact is removed on every path, and only after the upload call
    /// has returned.
    async fn deliver(&self, turn: &Turn<'_>, text: &TextPayload, speed: Speed) -> Result<bool, MessengerError> {
        let chars = text.char_count();
        let progress = turn
            .chat
            .send(Reply::text(format!(
                "🔄 Creating audio...\n📊 Text: {} characters\n⚡ Speed: {}x",
                chars, speed
            )))
            .await?;

        let artifact = match self.gateway.synthesize(text.as_str(), speed).await {
            Ok(artifact) => artifact,
            Err(e) => {
                error!("Audio generation failed for user {}: {}", turn.user_id, e);
                self.discard_progress(turn, progress).await;
                return Ok(false);
            }
        };

        if let Err(e) = turn.chat.edit_text(progress, "📤 Sending audio...").await {
            warn!("Failed to update progress message: {}", e);
        }

        let meta = AudioMeta {
            title: AUDIO_TITLE.to_string(),
            performer: AUDIO_PERFORMER.to_string(),
            caption: format!("Speed: {}x | Text: {} chars", speed, chars),
        };
        debug!("Uploading {} for user {}", artifact.file_name(), turn.user_id);
        let sent = turn.chat.send_audio(&artifact.path, &meta).await;
        self.files.delete(&artifact.path).await;
        self.discard_progress(turn, progress).await;

        match sent {
            Ok(_) => {
                info!(
                    "User {} received audio (speed: {}x, length: {} chars)",
                    turn.user_id, speed, chars
                );
                Ok(true)
            }
            Err(e) => {
                error!("Audio upload failed for user {}: {}", turn.user_id, e);
                Ok(false)
            }
        }
    }

    async fn discard_progress(&self, turn: &Turn<'_>, progress: SentMessage) {
        if let Err(e) = turn.chat.delete(progress).await {
            warn!("Failed to delete progress message: {}", e);
        }
    }
}

pub fn main_keyboard() -> Vec<Vec<&'static str>> {
    vec![vec![LABEL_CONVERT]]
}

pub fn speed_keyboard() -> Vec<Vec<&'static str>> {
    vec![
        vec![Preset::Half.label(), Preset::Normal.label(), Preset::OneAndHalf.label()],
        vec![Preset::Double.label(), LABEL_CUSTOM, LABEL_BACK],
    ]
}

pub fn continuous_keyboard() -> Vec<Vec<&'static str>> {
    vec![vec![LABEL_KEEP_SENDING, LABEL_STOP]]
}
