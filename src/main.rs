use std::sync::Arc;

use teloxide::prelude::*;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use speechbot::bot::{
    Conversation, EspeakTts, FileStore, GoogleTts, SessionStorage, SpeechGateway, TelegramChat,
    inbound_from_message,
};
use speechbot::config::{self, Config};
use speechbot::telegram_log::TelegramLogLayer;

/// Artifacts older than this are removed at startup.
const STARTUP_SWEEP_HOURS: u64 = 1;

#[tokio::main]
async fn main() {
    // A missing .env is fine; the environment may already be set.
    dotenvy::dotenv().ok();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Configuration error: {e}");
            eprintln!("Set TELEGRAM_BOT_TOKEN in the environment or a .env file.");
            std::process::exit(1);
        }
    };
    if let Err(e) = config.prepare_dirs() {
        eprintln!("❌ {e}");
        std::process::exit(1);
    }

    let bot = Bot::new(&config.telegram_bot_token);

    // Setup logging
    let file_appender = tracing_appender::rolling::daily(&config.logs_dir, "bot.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let filter = || {
        EnvFilter::builder()
            .with_default_directive(config.log_level.into())
            .from_env_lossy()
    };

    let registry = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(filter()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(filter()),
        );

    if let Some(log_chat_id) = config.log_chat_id {
        registry.with(TelegramLogLayer::new(bot.clone(), log_chat_id)).init();
    } else {
        registry.init();
    }

    info!("🚀 Starting speechbot...");
    info!(
        "Max text length: {}, default speed: {}x, log level: {}",
        config.max_text_length, config.default_speed, config.log_level
    );

    let pid_path = config.pid_path();
    if let Err(e) = config::write_pid(&pid_path) {
        warn!("Failed to write pid file {:?}: {}", pid_path, e);
    }

    let files = FileStore::new(&config.temp_audio_dir);
    files.sweep(STARTUP_SWEEP_HOURS).await;

    let gateway = SpeechGateway::new(
        Arc::new(GoogleTts::new(config.tts_endpoint.clone(), config.tts_language.clone())),
        Arc::new(EspeakTts::new(
            config.espeak_binary.clone(),
            config.ffmpeg_binary.clone(),
            config.tts_language.clone(),
        )),
        files.clone(),
    );
    let conversation = Arc::new(Conversation::new(gateway, files.clone(), config.limits()));

    let handler = Update::filter_message().endpoint(handle_message);

    info!("✅ Bot is running. Press Ctrl+C to stop.");
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![conversation, SessionStorage::new()])
        // One in-flight update per user, matching the session key
        .distribution_function(|upd| upd.from().map(|user| user.id))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("🛑 Shutting down...");
    files.sweep(0).await;
    config::remove_pid(&pid_path);
}

async fn handle_message(
    bot: Bot,
    msg: Message,
    conversation: Arc<Conversation>,
    storage: Arc<SessionStorage>,
) -> ResponseResult<()> {
    // Channel posts have no sender; fall back to the chat
    let user_id = msg.from.as_ref().map_or(msg.chat.id.0 as u64, |u| u.id.0);
    let chat = TelegramChat::new(bot, msg.chat.id);
    let event = inbound_from_message(&msg);

    conversation.handle_stored(storage, user_id, event, &chat).await;
    Ok(())
}
