/// The sync module reconciles the persistent cache with the filesystem.
/// One pass: walk the roots, fingerprint-diff against the cache, evict
/// vanished paths, then read and upsert added/changed files one at a time
/// so each record commits atomically and a cancelled run leaves only
/// whole, already-committed records behind.
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::UNIX_EPOCH;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::cache::Cache;
use crate::config::Config;
use crate::errors::{MetadataReadFailure, Result};
use crate::track::{is_supported_path, MetadataReader, Track};

/// (mtime unix seconds, size in bytes).
pub type Fingerprint = (i64, i64);

/// The record-level outcome of a completed sync, consumed by
/// `IndexHandle::apply`.
#[derive(Debug, Default, Clone)]
pub struct SyncDiff {
    pub added: Vec<Track>,
    pub changed: Vec<Track>,
    pub removed: Vec<PathBuf>,
}

impl SyncDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct SyncSummary {
    pub diff: SyncDiff,
    /// Files whose metadata read failed. Contained, never fatal.
    pub skipped: Vec<MetadataReadFailure>,
    pub cancelled: bool,
}

/// Enumerate all supported files under the configured roots, sorted by
/// path for deterministic ordering. Unreadable entries are logged and
/// skipped.
pub fn walk_roots(config: &Config) -> Vec<(PathBuf, Fingerprint)> {
    let mut files = Vec::new();
    for root in &config.library_roots {
        for entry in WalkDir::new(root).follow_links(true) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("skipping unreadable entry under {}: {}", root.display(), e);
                    continue;
                }
            };
            if !entry.file_type().is_file() || !is_supported_path(entry.path()) {
                continue;
            }
            let Ok(meta) = entry.metadata() else {
                warn!("skipping {}: failed to stat", entry.path().display());
                continue;
            };
            let mtime = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);
            files.push((entry.path().to_path_buf(), (mtime, meta.len() as i64)));
        }
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    files
}

/// Run one reconciliation pass. `full` assumes no prior cache state, so
/// every file on disk is treated as added and re-read. Progress is a
/// monotone (processed, total) pair; `cancel` is checked between files.
pub fn run_sync(
    cache: &Cache,
    config: &Config,
    reader: &dyn MetadataReader,
    mut progress: impl FnMut(usize, usize),
    cancel: &AtomicBool,
    full: bool,
) -> Result<SyncSummary> {
    let disk = walk_roots(config);
    let cached = cache.fingerprints()?;
    let assumed: HashMap<PathBuf, Fingerprint> = if full { HashMap::new() } else { cached.clone() };

    let disk_paths: std::collections::HashSet<&PathBuf> = disk.iter().map(|(p, _)| p).collect();
    let removed: Vec<PathBuf> = cached.keys().filter(|p| !disk_paths.contains(p)).cloned().collect();

    let to_process: Vec<(PathBuf, Fingerprint, bool)> = disk
        .into_iter()
        .filter_map(|(path, fp)| match assumed.get(&path) {
            None => Some((path, fp, true)),
            Some(prior) if *prior != fp => Some((path, fp, false)),
            Some(_) => None,
        })
        .collect();

    // Evict vanished paths up front; a later cancellation only defers the
    // per-file work, never leaves dangling records.
    cache.remove_tracks(&removed)?;

    let total = to_process.len();
    debug!("sync: {} to process, {} removed", total, removed.len());
    progress(0, total);

    let mut summary = SyncSummary {
        diff: SyncDiff {
            removed,
            ..SyncDiff::default()
        },
        ..SyncSummary::default()
    };

    for (i, (path, (mtime, size), is_added)) in to_process.into_iter().enumerate() {
        if cancel.load(Ordering::Relaxed) {
            info!("sync cancelled after {} of {} files", i, total);
            summary.cancelled = true;
            break;
        }
        match reader.read(&path) {
            Ok(meta) => {
                let mut track = Track::from_metadata(path, meta, mtime, size);
                cache.upsert_tracks(std::slice::from_ref(&track))?;
                if is_added {
                    summary.diff.added.push(track);
                } else {
                    // The upsert left the stored favorite flag alone; the
                    // diff record must agree with the cache so the index
                    // patch does too.
                    if let Some(stored) = cache.get(&track.path)? {
                        track.favorite = stored.favorite;
                    }
                    summary.diff.changed.push(track);
                }
            }
            Err(failure) => {
                // A changed file that fails to read keeps its previous
                // record; the file still exists.
                warn!("{}", failure);
                summary.skipped.push(failure);
            }
        }
        progress(i + 1, total);
    }

    info!(
        "sync finished: {} added, {} changed, {} removed, {} skipped{}",
        summary.diff.added.len(),
        summary.diff.changed.len(),
        summary.diff.removed.len(),
        summary.skipped.len(),
        if summary.cancelled { " (cancelled)" } else { "" },
    );
    Ok(summary)
}
