//! Text-to-speech with provider fallback.
//!
//! The primary provider is Google Translate's TTS endpoint, which only knows
//! "slow" or "normal". The fallback is a local espeak-ng install, which takes
//! a words-per-minute rate and is transcoded to MP3 with ffmpeg.

use std::fmt;
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::bot::files::{AudioArtifact, FileStore};
use crate::bot::speed::Speed;

/// Below this the primary provider switches to slow mode.
pub const SLOW_THRESHOLD: f64 = 0.8;

/// espeak-ng rate at 1.0x.
pub const BASE_RATE_WPM: f64 = 150.0;

/// Google rejects longer `q` parameters.
const MAX_CHUNK_CHARS: usize = 100;

#[derive(Debug)]
pub enum ProviderError {
    Request(String),
    Status { code: u16, body: String },
    EmptyAudio,
    /// Local engine failed to initialize; recorded once and repeated.
    EngineUnavailable(String),
    Process(String),
    Io(io::Error),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request(msg) => write!(f, "request failed: {}", msg),
            Self::Status { code, body } => write!(f, "HTTP {}: {}", code, body),
            Self::EmptyAudio => write!(f, "provider returned no audio"),
            Self::EngineUnavailable(cause) => write!(f, "engine unavailable: {}", cause),
            Self::Process(msg) => write!(f, "{}", msg),
            Self::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

/// Both providers failed.
#[derive(Debug)]
pub enum SynthesisError {
    Unavailable {
        primary: ProviderError,
        fallback: ProviderError,
    },
}

impl fmt::Display for SynthesisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { primary, fallback } => write!(
                f,
                "speech synthesis unavailable (primary: {}; fallback: {})",
                primary, fallback
            ),
        }
    }
}

impl std::error::Error for SynthesisError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Unavailable { fallback, .. } => Some(fallback),
        }
    }
}

/// A network synthesizer returning audio bytes.
#[async_trait]
pub trait RemoteSynthesizer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch(&self, text: &str, slow: bool) -> Result<Vec<u8>, ProviderError>;
}

/// A local synthesizer writing straight to `dest`.
#[async_trait]
pub trait LocalSynthesizer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn render(&self, text: &str, rate_wpm: u32, dest: &Path) -> Result<(), ProviderError>;
}

/// Speeds above 1.0 still play at normal rate on the primary.
pub fn primary_slow_mode(speed: Speed) -> bool {
    speed.value() < SLOW_THRESHOLD
}

pub fn fallback_rate(speed: Speed) -> u32 {
    (BASE_RATE_WPM * speed.value()).round() as u32
}

/// Tries the primary provider, then the fallback.
#[derive(Clone)]
pub struct SpeechGateway {
    primary: Arc<dyn RemoteSynthesizer>,
    fallback: Arc<dyn LocalSynthesizer>,
    files: FileStore,
}

impl SpeechGateway {
    pub fn new(
        primary: Arc<dyn RemoteSynthesizer>,
        fallback: Arc<dyn LocalSynthesizer>,
        files: FileStore,
    ) -> Self {
        Self {
            primary,
            fallback,
            files,
        }
    }

    /// Produce exactly one artifact, or none on failure.
    ///
    /// The caller owns the artifact and deletes it after delivery.
    pub async fn synthesize(&self, text: &str, speed: Speed) -> Result<AudioArtifact, SynthesisError> {
        info!(
            "🔊 Converting text to speech ({} chars, speed: {}x)",
            text.chars().count(),
            speed
        );

        let primary = match self.try_primary(text, speed).await {
            Ok(artifact) => {
                info!("Generated audio with {}", self.primary.name());
                return Ok(artifact);
            }
            Err(e) => e,
        };
        warn!(
            "{} failed, trying {}: {}",
            self.primary.name(),
            self.fallback.name(),
            primary
        );

        match self.try_fallback(text, speed).await {
            Ok(artifact) => {
                info!("Generated audio with {} fallback", self.fallback.name());
                Ok(artifact)
            }
            Err(fallback) => {
                error!("All TTS providers failed: {}", fallback);
                Err(SynthesisError::Unavailable { primary, fallback })
            }
        }
    }

    async fn try_primary(&self, text: &str, speed: Speed) -> Result<AudioArtifact, ProviderError> {
        let audio = self.primary.fetch(text, primary_slow_mode(speed)).await?;
        if audio.is_empty() {
            return Err(ProviderError::EmptyAudio);
        }
        self.files.save(&audio).await.map_err(ProviderError::Io)
    }

    async fn try_fallback(&self, text: &str, speed: Speed) -> Result<AudioArtifact, ProviderError> {
        let path = self.files.allocate();
        let result = match self.fallback.render(text, fallback_rate(speed), &path).await {
            Ok(()) => match tokio::fs::metadata(&path).await {
                Ok(m) if m.len() > 0 => Ok(()),
                Ok(_) => Err(ProviderError::EmptyAudio),
                Err(e) => Err(ProviderError::Io(e)),
            },
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => Ok(AudioArtifact::new(path)),
            Err(e) => {
                self.files.delete(&path).await;
                Err(e)
            }
        }
    }
}

/// Google Translate TTS client.
pub struct GoogleTts {
    endpoint: String,
    language: String,
    client: reqwest::Client,
}

impl GoogleTts {
    /// `endpoint` is the base URL, e.g. "https://translate.google.com".
    pub fn new(endpoint: String, language: String) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            language,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl RemoteSynthesizer for GoogleTts {
    fn name(&self) -> &'static str {
        "google-tts"
    }

    async fn fetch(&self, text: &str, slow: bool) -> Result<Vec<u8>, ProviderError> {
        let chunks = split_chunks(text, MAX_CHUNK_CHARS);
        let total = chunks.len().to_string();
        let speed = if slow { "0.3" } else { "1" };
        let url = format!("{}/translate_tts", self.endpoint);

        let mut audio = Vec::new();
        for (idx, chunk) in chunks.iter().enumerate() {
            let idx = idx.to_string();
            let textlen = chunk.chars().count().to_string();
            let response = self
                .client
                .get(&url)
                .query(&[
                    ("ie", "UTF-8"),
                    ("client", "tw-ob"),
                    ("tl", self.language.as_str()),
                    ("ttsspeed", speed),
                    ("total", total.as_str()),
                    ("idx", idx.as_str()),
                    ("textlen", textlen.as_str()),
                    ("q", chunk.as_str()),
                ])
                .send()
                .await
                .map_err(|e| ProviderError::Request(e.to_string()))?;

            if !response.status().is_success() {
                let code = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                let body: String = body.chars().take(200).collect();
                return Err(ProviderError::Status { code, body });
            }

            let bytes = response
                .bytes()
                .await
                .map_err(|e| ProviderError::Request(e.to_string()))?;
            debug!("Chunk {}/{}: {} bytes", idx, total, bytes.len());
            audio.extend_from_slice(&bytes);
        }

        if audio.is_empty() {
            return Err(ProviderError::EmptyAudio);
        }
        Ok(audio)
    }
}

/// Split text into pieces of at most `max` chars, breaking on whitespace.
/// Words longer than `max` are cut.
fn split_chunks(text: &str, max: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();

        if word_len > max {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let chars: Vec<char> = word.chars().collect();
            for piece in chars.chunks(max) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }

        let needed = if current.is_empty() { word_len } else { word_len + 1 };
        if current_len + needed > max {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Local espeak-ng engine, probed once on first use.
pub struct EspeakTts {
    binary: String,
    ffmpeg: String,
    voice: String,
    ready: OnceCell<Result<String, String>>,
}

impl EspeakTts {
    pub fn new(binary: String, ffmpeg: String, voice: String) -> Self {
        Self {
            binary,
            ffmpeg,
            voice,
            ready: OnceCell::new(),
        }
    }

    /// Initialize on first call. A failed probe is kept and returned forever.
    async fn ensure_ready(&self) -> Result<(), ProviderError> {
        let state = self.ready.get_or_init(|| probe(&self.binary)).await;
        state
            .as_ref()
            .map(|_| ())
            .map_err(|cause| ProviderError::EngineUnavailable(cause.clone()))
    }
}

async fn probe(binary: &str) -> Result<String, String> {
    let output = Command::new(binary)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| format!("failed to run {}: {}", binary, e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let msg = format!("{} --version failed: {}", binary, stderr.trim());
        error!("Local TTS init failed: {}", msg);
        return Err(msg);
    }

    let version = String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .unwrap_or("")
        .trim()
        .to_string();
    info!("Local TTS ready: {}", version);
    Ok(version)
}

#[async_trait]
impl LocalSynthesizer for EspeakTts {
    fn name(&self) -> &'static str {
        "espeak-ng"
    }

    async fn render(&self, text: &str, rate_wpm: u32, dest: &Path) -> Result<(), ProviderError> {
        self.ensure_ready().await?;

        let wav_path = dest.with_extension("wav");
        let result = self.render_via_wav(text, rate_wpm, &wav_path, dest).await;
        let _ = tokio::fs::remove_file(&wav_path).await;
        result
    }
}

impl EspeakTts {
    async fn render_via_wav(
        &self,
        text: &str,
        rate_wpm: u32,
        wav_path: &Path,
        dest: &Path,
    ) -> Result<(), ProviderError> {
        let mut child = Command::new(&self.binary)
            .args(["-v", &self.voice, "-s", &rate_wpm.to_string(), "--stdin", "-w"])
            .arg(wav_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ProviderError::Process(format!("failed to run {}: {}", self.binary, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes()).await.map_err(ProviderError::Io)?;
        }

        let output = child.wait_with_output().await.map_err(ProviderError::Io)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProviderError::Process(format!("espeak-ng failed: {}", stderr.trim())));
        }

        let output = Command::new(&self.ffmpeg)
            .arg("-y")
            .arg("-i")
            .arg(wav_path)
            .args(["-codec:a", "libmp3lame", "-q:a", "4"])
            .arg(dest)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ProviderError::Process(format!("failed to run {}: {}", self.ffmpeg, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let last = stderr.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("");
            return Err(ProviderError::Process(format!("ffmpeg conversion failed: {}", last.trim())));
        }

        debug!("Rendered {:?} at {} wpm", dest, rate_wpm);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FakeRemote {
        result: Result<Vec<u8>, ()>,
        calls: Mutex<Vec<bool>>,
    }

    impl FakeRemote {
        fn ok(bytes: &[u8]) -> Self {
            Self {
                result: Ok(bytes.to_vec()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                result: Err(()),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RemoteSynthesizer for FakeRemote {
        fn name(&self) -> &'static str {
            "fake-remote"
        }

        async fn fetch(&self, _text: &str, slow: bool) -> Result<Vec<u8>, ProviderError> {
            self.calls.lock().unwrap().push(slow);
            self.result
                .clone()
                .map_err(|_| ProviderError::Request("connection refused".to_string()))
        }
    }

    struct FakeLocal {
        succeed: bool,
        /// Write partial output before failing.
        leave_partial: bool,
        rates: Mutex<Vec<u32>>,
        calls: AtomicUsize,
    }

    impl FakeLocal {
        fn new(succeed: bool, leave_partial: bool) -> Self {
            Self {
                succeed,
                leave_partial,
                rates: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LocalSynthesizer for FakeLocal {
        fn name(&self) -> &'static str {
            "fake-local"
        }

        async fn render(&self, _text: &str, rate_wpm: u32, dest: &Path) -> Result<(), ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.rates.lock().unwrap().push(rate_wpm);
            if self.succeed {
                std::fs::write(dest, b"local-audio").map_err(ProviderError::Io)?;
                Ok(())
            } else {
                if self.leave_partial {
                    std::fs::write(dest, b"partial").map_err(ProviderError::Io)?;
                }
                Err(ProviderError::Process("espeak-ng crashed".to_string()))
            }
        }
    }

    fn gateway(
        dir: &Path,
        remote: Arc<FakeRemote>,
        local: Arc<FakeLocal>,
    ) -> SpeechGateway {
        SpeechGateway::new(remote, local, FileStore::new(dir))
    }

    fn files_in(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_primary_slow_mode_mapping() {
        assert!(primary_slow_mode(Speed::new(0.5).unwrap()));
        assert!(primary_slow_mode(Speed::new(0.79).unwrap()));
        assert!(!primary_slow_mode(Speed::new(0.8).unwrap()));
        assert!(!primary_slow_mode(Speed::new(1.0).unwrap()));
        // Fast speeds collapse to normal rate on the primary provider
        assert!(!primary_slow_mode(Speed::new(2.0).unwrap()));
    }

    #[test]
    fn test_fallback_rate() {
        assert_eq!(fallback_rate(Speed::new(1.0).unwrap()), 150);
        assert_eq!(fallback_rate(Speed::new(0.5).unwrap()), 75);
        assert_eq!(fallback_rate(Speed::new(1.3).unwrap()), 195);
        assert_eq!(fallback_rate(Speed::new(3.0).unwrap()), 450);
        assert_eq!(fallback_rate(Speed::new(0.1).unwrap()), 15);
    }

    #[test]
    fn test_split_chunks() {
        assert_eq!(split_chunks("hello world", 100), vec!["hello world"]);
        assert!(split_chunks("   ", 100).is_empty());

        let text = "word ".repeat(50);
        let chunks = split_chunks(&text, 100);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 100));
        assert_eq!(chunks.join(" "), text.trim());
    }

    #[test]
    fn test_split_chunks_long_word() {
        let word = "a".repeat(250);
        let chunks = split_chunks(&format!("hi {word} there"), 100);
        assert_eq!(chunks[0], "hi");
        assert_eq!(chunks[1].len(), 100);
        assert_eq!(chunks[3].len(), 50);
        assert_eq!(chunks[4], "there");
    }

    #[tokio::test]
    async fn test_primary_success_skips_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let remote = Arc::new(FakeRemote::ok(b"remote-audio"));
        let local = Arc::new(FakeLocal::new(true, false));
        let gw = gateway(dir.path(), remote.clone(), local.clone());

        let artifact = gw.synthesize("Hello world", Speed::new(0.5).unwrap()).await.unwrap();
        assert_eq!(std::fs::read(&artifact.path).unwrap(), b"remote-audio");
        assert_eq!(*remote.calls.lock().unwrap(), vec![true]);
        assert_eq!(local.calls.load(Ordering::SeqCst), 0);
        assert_eq!(files_in(dir.path()), 1);
    }

    #[tokio::test]
    async fn test_fallback_on_primary_failure() {
        let dir = tempfile::tempdir().unwrap();
        let remote = Arc::new(FakeRemote::failing());
        let local = Arc::new(FakeLocal::new(true, false));
        let gw = gateway(dir.path(), remote, local.clone());

        let artifact = gw.synthesize("Hello world", Speed::new(1.3).unwrap()).await.unwrap();
        assert!(artifact.file_name().starts_with("audio_"));
        assert_eq!(std::fs::read(&artifact.path).unwrap(), b"local-audio");
        assert_eq!(*local.rates.lock().unwrap(), vec![195]);
        assert_eq!(files_in(dir.path()), 1);
    }

    #[tokio::test]
    async fn test_empty_primary_audio_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let remote = Arc::new(FakeRemote::ok(b""));
        let local = Arc::new(FakeLocal::new(true, false));
        let gw = gateway(dir.path(), remote, local.clone());

        gw.synthesize("Hello", Speed::NORMAL).await.unwrap();
        assert_eq!(local.calls.load(Ordering::SeqCst), 1);
        assert_eq!(files_in(dir.path()), 1);
    }

    #[tokio::test]
    async fn test_both_fail_leaves_no_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let remote = Arc::new(FakeRemote::failing());
        let local = Arc::new(FakeLocal::new(false, true));
        let gw = gateway(dir.path(), remote, local);

        let err = gw.synthesize("Hello", Speed::NORMAL).await.unwrap_err();
        let SynthesisError::Unavailable { primary, fallback } = &err;
        assert!(matches!(primary, ProviderError::Request(_)));
        assert!(matches!(fallback, ProviderError::Process(_)));
        assert!(err.to_string().contains("espeak-ng crashed"));
        assert_eq!(files_in(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_espeak_missing_binary_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let engine = EspeakTts::new(
            "/nonexistent/espeak-ng".to_string(),
            "ffmpeg".to_string(),
            "en".to_string(),
        );
        let dest = dir.path().join("out.mp3");

        let first = engine.render("hi", 150, &dest).await.unwrap_err();
        let second = engine.render("hi", 150, &dest).await.unwrap_err();
        assert!(matches!(first, ProviderError::EngineUnavailable(_)));
        assert_eq!(first.to_string(), second.to_string());
        assert!(!dest.exists());
    }
}
