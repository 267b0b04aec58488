use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Once};

use tempfile::TempDir;

use crate::cache::Cache;
use crate::config::Config;
use crate::errors::MetadataReadFailure;
use crate::index::LibraryIndex;
use crate::playback::AudioBackend;
use crate::track::{MetadataReader, Track, TrackMetadata};

static INIT: Once = Once::new();

pub fn init() -> TempDir {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")))
            .with_test_writer()
            .try_init();
    });
    TempDir::new().expect("failed to create temp dir")
}

/// A config rooted in a temp dir with `music/` and `cache/` created.
pub fn config() -> (Config, TempDir) {
    let temp_dir = init();
    let base = temp_dir.path();
    fs::create_dir_all(base.join("music")).expect("failed to create music dir");
    fs::create_dir_all(base.join("cache")).expect("failed to create cache dir");
    let config = Config {
        library_roots: vec![base.join("music")],
        cache_dir: base.join("cache"),
        history_limit: 100,
        restart_on_previous: false,
    };
    (config, temp_dir)
}

pub fn open_cache(config: &Config) -> Cache {
    Cache::open(&config.cache_database_path()).expect("failed to open cache")
}

/// A track with sane defaults for index/filter/search tests. The files do
/// not exist on disk.
pub fn track(path: &str, title: &str, artist: &str, album: &str) -> Track {
    Track {
        path: PathBuf::from(path),
        title: title.to_string(),
        artist: artist.to_string(),
        album: album.to_string(),
        year: None,
        genre: String::new(),
        track_number: 0,
        duration: 180.0,
        codec: "FLAC".to_string(),
        bitrate: 1000,
        sample_rate: 44100,
        bit_depth: 16,
        mtime: 999,
        size: 1,
        favorite: false,
    }
}

pub fn index_of(tracks: Vec<Track>) -> LibraryIndex {
    LibraryIndex::from_tracks(tracks)
}

/// Write a fake audio file whose contents encode its tags for StubReader:
/// `title|artist|album[|year[|genre]]`. A body starting with `!` makes
/// the read fail.
pub fn write_audio_file(path: &Path, body: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("failed to create parent dir");
    }
    fs::write(path, body).expect("failed to write audio file");
}

/// Metadata reader for tests: parses the sidecar convention written by
/// `write_audio_file` instead of real tag data.
pub struct StubReader;

impl MetadataReader for StubReader {
    fn read(&self, path: &Path) -> Result<TrackMetadata, MetadataReadFailure> {
        let text = fs::read_to_string(path).map_err(|e| MetadataReadFailure {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if text.starts_with('!') {
            return Err(MetadataReadFailure {
                path: path.to_path_buf(),
                reason: "unreadable tags".to_string(),
            });
        }
        let mut parts = text.trim().split('|');
        let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        Ok(TrackMetadata {
            title: parts.next().filter(|s| !s.is_empty()).map(str::to_string).unwrap_or(stem),
            artist: parts.next().unwrap_or("Unknown").to_string(),
            album: parts.next().unwrap_or("Unknown").to_string(),
            year: parts.next().and_then(|s| s.parse().ok()),
            genre: parts.next().unwrap_or("").to_string(),
            track_number: 0,
            duration: 120.0,
            codec: "FLAC".to_string(),
            bitrate: 1000,
            sample_rate: 44100,
            bit_depth: 16,
        })
    }
}

/// Audio backend that records the calls made to it.
#[derive(Clone, Default)]
pub struct BackendLog(Arc<Mutex<Vec<String>>>);

impl BackendLog {
    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

pub struct RecordingBackend {
    pub log: BackendLog,
}

impl RecordingBackend {
    pub fn new() -> (RecordingBackend, BackendLog) {
        let log = BackendLog::default();
        (RecordingBackend { log: log.clone() }, log)
    }

    fn record(&self, call: String) {
        self.log.0.lock().unwrap().push(call);
    }
}

impl AudioBackend for RecordingBackend {
    fn play(&mut self, path: &Path) {
        self.record(format!("play {}", path.display()));
    }
    fn pause(&mut self) {
        self.record("pause".to_string());
    }
    fn resume(&mut self) {
        self.record("resume".to_string());
    }
    fn stop(&mut self) {
        self.record("stop".to_string());
    }
    fn seek(&mut self, seconds: f64) {
        self.record(format!("seek {seconds}"));
    }
    fn set_volume(&mut self, volume: f64) {
        self.record(format!("volume {volume}"));
    }
}
