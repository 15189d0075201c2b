//! Temp audio storage.
//!
//! Every generated artifact lives in one shared directory. Names are unique
//! per process (timestamp plus an 8-hex suffix), which is the only thing that
//! keeps concurrent sessions from stepping on each other.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};

/// Extension of every artifact the gateway produces.
pub const AUDIO_EXTENSION: &str = "mp3";

/// Low bits of every suffix. Any 4096 consecutive names differ here even if
/// the random part repeats.
static SUFFIX_SEQUENCE: AtomicU32 = AtomicU32::new(0);
const SEQUENCE_MASK: u32 = 0xfff;

/// A generated audio file awaiting delivery.
#[derive(Debug, Clone)]
pub struct AudioArtifact {
    pub path: PathBuf,
}

impl AudioArtifact {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.mp3")
    }
}

/// Owner of the temp audio directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `audio_<YYYYmmdd_HHMMSS>_<8 hex>.mp3`
    pub fn generate_name(&self) -> String {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let sequence = SUFFIX_SEQUENCE.fetch_add(1, Ordering::Relaxed) & SEQUENCE_MASK;
        let suffix = (rand::random::<u32>() & !SEQUENCE_MASK) | sequence;
        format!("audio_{timestamp}_{suffix:08x}.{AUDIO_EXTENSION}")
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Path for a fresh artifact.
    pub fn allocate(&self) -> PathBuf {
        self.path(&self.generate_name())
    }

    /// Write bytes to a freshly named artifact.
    pub async fn save(&self, data: &[u8]) -> io::Result<AudioArtifact> {
        let path = self.allocate();
        if let Err(e) = tokio::fs::write(&path, data).await {
            self.delete(&path).await;
            return Err(e);
        }
        debug!("Saved {} bytes to {:?}", data.len(), path);
        Ok(AudioArtifact::new(path))
    }

    /// Remove a file. Missing files are fine.
    pub async fn delete(&self, path: &Path) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => debug!("Deleted {:?}", path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to delete {:?}: {}", path, e),
        }
    }

    /// Delete every regular file older than `max_age_hours`. Zero deletes all.
    ///
    /// Returns the number of files removed. Per-file failures are logged and
    /// skipped.
    pub async fn sweep(&self, max_age_hours: u64) -> usize {
        let max_age = Duration::from_secs(max_age_hours.saturating_mul(3600));
        let now = SystemTime::now();

        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to read temp dir {:?}: {}", self.dir, e);
                return 0;
            }
        };

        let mut deleted = 0;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to list temp dir: {}", e);
                    break;
                }
            };

            let metadata = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                Ok(_) => continue,
                Err(e) => {
                    warn!("Failed to stat {:?}: {}", entry.path(), e);
                    continue;
                }
            };

            if max_age_hours > 0 {
                // Artifacts are written once, so mtime is their creation time.
                let age = metadata
                    .modified()
                    .ok()
                    .and_then(|t| now.duration_since(t).ok())
                    .unwrap_or_default();
                if age <= max_age {
                    continue;
                }
            }

            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => deleted += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to delete {:?}: {}", entry.path(), e),
            }
        }

        if deleted > 0 {
            info!("🧹 Cleaned up {} old audio file(s)", deleted);
        }
        deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{File, FileTimes};

    fn age_file(path: &Path, hours: u64) {
        let past = SystemTime::now() - Duration::from_secs(hours * 3600);
        let file = File::options().write(true).open(path).unwrap();
        file.set_times(FileTimes::new().set_modified(past).set_accessed(past))
            .unwrap();
    }

    #[test]
    fn test_generate_name_format() {
        let store = FileStore::new("/tmp");
        let name = store.generate_name();
        assert!(name.starts_with("audio_"));
        assert!(name.ends_with(".mp3"));

        let stem = name.trim_end_matches(".mp3");
        let suffix = stem.rsplit('_').next().unwrap();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_name_unique_in_same_tick() {
        let store = FileStore::new("/tmp");
        let names: Vec<String> = (0..1000).map(|_| store.generate_name()).collect();
        let unique: std::collections::HashSet<_> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
    }

    #[test]
    fn test_generate_name_suffix_not_sequential() {
        let store = FileStore::new("/tmp");
        let suffixes: Vec<u32> = (0..64)
            .map(|_| {
                let name = store.generate_name();
                let hex = name.trim_end_matches(".mp3").rsplit('_').next().unwrap().to_string();
                u32::from_str_radix(&hex, 16).unwrap()
            })
            .collect();
        // The high bits are random per name, so a run of 64 cannot all be +1 steps
        assert!(suffixes.windows(2).any(|w| w[1] != w[0].wrapping_add(1)));
    }

    #[test]
    fn test_path_joins_dir() {
        let store = FileStore::new("/var/tmp/audio");
        assert_eq!(store.path("x.mp3"), PathBuf::from("/var/tmp/audio/x.mp3"));
    }

    #[tokio::test]
    async fn test_save_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        let artifact = store.save(b"ID3data").await.unwrap();
        assert!(artifact.path.exists());
        assert_eq!(std::fs::read(&artifact.path).unwrap(), b"ID3data");

        store.delete(&artifact.path).await;
        assert!(!artifact.path.exists());

        // Second delete is a no-op
        store.delete(&artifact.path).await;
    }

    #[tokio::test]
    async fn test_sweep_zero_deletes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        for i in 0..3 {
            std::fs::write(dir.path().join(format!("f{i}.mp3")), b"x").unwrap();
        }

        assert_eq!(store.sweep(0).await, 3);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_sweep_keeps_newer_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let old = dir.path().join("old.mp3");
        let fresh = dir.path().join("fresh.mp3");
        std::fs::write(&old, b"x").unwrap();
        std::fs::write(&fresh, b"x").unwrap();
        age_file(&old, 3);

        assert_eq!(store.sweep(1).await, 1);
        assert!(!old.exists());
        assert!(fresh.exists());
    }

    #[tokio::test]
    async fn test_sweep_huge_age_keeps_everything() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let old = dir.path().join("old.mp3");
        std::fs::write(&old, b"x").unwrap();
        age_file(&old, 3);

        assert_eq!(store.sweep(u64::MAX).await, 0);
        assert!(old.exists());
    }

    #[tokio::test]
    async fn test_sweep_skips_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        assert_eq!(store.sweep(0).await, 0);
        assert!(dir.path().join("nested").exists());
    }

    #[tokio::test]
    async fn test_sweep_missing_dir() {
        let store = FileStore::new("/nonexistent/speechbot/temp");
        assert_eq!(store.sweep(0).await, 0);
    }
}
