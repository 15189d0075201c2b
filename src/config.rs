use std::fmt;
use std::path::{Path, PathBuf};

use teloxide::types::ChatId;
use tracing::Level;

use crate::bot::Limits;
use crate::bot::speed::{MAX_SPEED, MIN_SPEED, Speed};

const PLACEHOLDER_TOKEN: &str = "your_bot_token_here";

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// A required variable is not set.
    Missing(&'static str),
    /// A variable is set but cannot be parsed.
    Invalid { key: &'static str, value: String, reason: String },
    /// Validation error.
    Validation(String),
    /// Failed to create a working directory.
    CreateDir { path: PathBuf, source: std::io::Error },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing(key) => write!(f, "{} is required but not set", key),
            Self::Invalid { key, value, reason } => {
                write!(f, "invalid value '{}' for {}: {}", value, key, reason)
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
            Self::CreateDir { path, source } => {
                write!(f, "failed to create directory '{}': {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::CreateDir { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub struct Config {
    pub telegram_bot_token: String,
    pub max_text_length: usize,
    pub default_speed: Speed,
    pub log_level: Level,
    /// Directory for state files (pid marker).
    pub data_dir: PathBuf,
    pub logs_dir: PathBuf,
    /// Where synthesized audio lives until it is sent.
    pub temp_audio_dir: PathBuf,
    /// Language for the remote provider and voice for espeak-ng.
    pub tts_language: String,
    /// Base URL of the Google Translate TTS endpoint.
    pub tts_endpoint: String,
    pub espeak_binary: String,
    pub ffmpeg_binary: String,
    /// Admin chat that receives warnings and errors.
    pub log_chat_id: Option<ChatId>,
}

impl Config {
    /// Load from the process environment. Call `dotenvy::dotenv()` first to
    /// pick up a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let telegram_bot_token = var("TELEGRAM_BOT_TOKEN").ok_or(ConfigError::Missing("TELEGRAM_BOT_TOKEN"))?;
        if telegram_bot_token == PLACEHOLDER_TOKEN {
            return Err(ConfigError::Validation(
                "TELEGRAM_BOT_TOKEN is still the placeholder value; set a real token".into(),
            ));
        }
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_parts: Vec<&str> = telegram_bot_token.split(':').collect();
        if token_parts.len() != 2 || token_parts[0].parse::<u64>().is_err() || token_parts[1].is_empty() {
            return Err(ConfigError::Validation(
                "TELEGRAM_BOT_TOKEN appears invalid (expected format: 123456789:ABCdefGHI...)".into(),
            ));
        }

        let max_text_length = match var("MAX_TEXT_LENGTH") {
            None => 5000,
            Some(raw) => raw.parse::<usize>().map_err(|e| ConfigError::Invalid {
                key: "MAX_TEXT_LENGTH",
                value: raw.clone(),
                reason: e.to_string(),
            })?,
        };
        if max_text_length == 0 {
            return Err(ConfigError::Validation("MAX_TEXT_LENGTH must be positive".into()));
        }

        let default_speed = match var("DEFAULT_SPEED") {
            None => Speed::NORMAL,
            Some(raw) => raw.parse::<Speed>().map_err(|_| ConfigError::Invalid {
                key: "DEFAULT_SPEED",
                value: raw.clone(),
                reason: format!("must be a number between {} and {}", MIN_SPEED, MAX_SPEED),
            })?,
        };

        let log_level = match var("LOG_LEVEL") {
            None => Level::INFO,
            Some(raw) => raw.parse::<Level>().map_err(|e| ConfigError::Invalid {
                key: "LOG_LEVEL",
                value: raw.clone(),
                reason: e.to_string(),
            })?,
        };

        let log_chat_id = match var("LOG_CHAT_ID") {
            None => None,
            Some(raw) => Some(ChatId(raw.parse::<i64>().map_err(|e| ConfigError::Invalid {
                key: "LOG_CHAT_ID",
                value: raw.clone(),
                reason: e.to_string(),
            })?)),
        };

        let data_dir = PathBuf::from(var("DATA_DIR").unwrap_or_else(|| "data".into()));
        let logs_dir = PathBuf::from(var("LOGS_DIR").unwrap_or_else(|| "logs".into()));
        let temp_audio_dir = var("TEMP_AUDIO_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("temp_audio"));

        Ok(Self {
            telegram_bot_token,
            max_text_length,
            default_speed,
            log_level,
            data_dir,
            logs_dir,
            temp_audio_dir,
            tts_language: var("TTS_LANGUAGE").unwrap_or_else(|| "en".into()),
            tts_endpoint: var("TTS_ENDPOINT")
                .unwrap_or_else(|| "https://translate.google.com".into())
                .trim_end_matches('/')
                .to_string(),
            espeak_binary: var("ESPEAK_BINARY").unwrap_or_else(|| "espeak-ng".into()),
            ffmpeg_binary: var("FFMPEG_BINARY").unwrap_or_else(|| "ffmpeg".into()),
            log_chat_id,
        })
    }

    /// Create the data, log and temp audio directories.
    pub fn prepare_dirs(&self) -> Result<(), ConfigError> {
        for dir in [&self.data_dir, &self.logs_dir, &self.temp_audio_dir] {
            std::fs::create_dir_all(dir)
                .map_err(|e| ConfigError::CreateDir { path: dir.clone(), source: e })?;
        }
        Ok(())
    }

    pub fn pid_path(&self) -> PathBuf {
        self.data_dir.join("bot.pid")
    }

    pub fn limits(&self) -> Limits {
        Limits {
            max_text_length: self.max_text_length,
            default_speed: self.default_speed,
        }
    }
}

/// Record our process id. Overwrites a stale marker.
pub fn write_pid(path: &Path) -> std::io::Result<()> {
    std::fs::write(path, std::process::id().to_string())
}

pub fn remove_pid(path: &Path) {
    if let Err(e) = std::fs::remove_file(path)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!("Failed to remove pid file {:?}: {}", path, e);
    }
}
