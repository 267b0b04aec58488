use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::MetadataReadFailure;

/// File extensions the synchronizer considers part of the library.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mp3", "flac", "ogg", "wav", "m4a", "opus", "aac", "wma"];

pub fn is_supported_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// The catalogued representation of one audio file. Identity is the
/// absolute path; the persistent cache is the sole durable owner, and the
/// in-memory index holds rebuildable copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub path: PathBuf,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub year: Option<i32>,
    /// Semicolon-separated when a file carries multiple genres.
    pub genre: String,
    pub track_number: i32,
    /// Seconds.
    pub duration: f64,
    pub codec: String,
    /// kbps.
    pub bitrate: i32,
    /// Hz.
    pub sample_rate: i32,
    /// Bits, 0 for lossy formats.
    pub bit_depth: i32,
    /// Source file modification time, unix seconds.
    pub mtime: i64,
    /// Source file size in bytes. Together with mtime this forms the
    /// change-detection fingerprint.
    pub size: i64,
    /// User flag, not derived from file tags. Survives metadata refreshes.
    pub favorite: bool,
}

impl Track {
    /// Assemble a record from a metadata read plus the file's fingerprint.
    pub fn from_metadata(path: PathBuf, meta: TrackMetadata, mtime: i64, size: i64) -> Track {
        Track {
            path,
            title: meta.title,
            artist: meta.artist,
            album: meta.album,
            year: meta.year,
            genre: meta.genre,
            track_number: meta.track_number,
            duration: meta.duration,
            codec: meta.codec,
            bitrate: meta.bitrate,
            sample_rate: meta.sample_rate,
            bit_depth: meta.bit_depth,
            mtime,
            size,
            favorite: false,
        }
    }
}

/// What the external metadata reader extracts from file bytes. Tag parsing
/// itself lives outside this crate; consumers plug in a reader.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackMetadata {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub year: Option<i32>,
    pub genre: String,
    pub track_number: i32,
    pub duration: f64,
    pub codec: String,
    pub bitrate: i32,
    pub sample_rate: i32,
    pub bit_depth: i32,
}

pub trait MetadataReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<TrackMetadata, MetadataReadFailure>;
}
