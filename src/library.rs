/// The library module ties the persistent cache, the in-memory index and
/// the synchronizer together. Scanning runs on its own worker thread so a
/// large walk never blocks queries or playback; the cache has a single
/// writer (that worker), and the completed diff is handed to the index as
/// one atomic generation swap.
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{info, warn};

use crate::cache::Cache;
use crate::config::Config;
use crate::errors::{Result, WiredError};
use crate::index::{IndexHandle, LibraryIndex};
use crate::sync::{run_sync, SyncDiff, SyncSummary};
use crate::track::MetadataReader;

#[derive(Debug)]
pub enum SyncEvent {
    /// Monotone (processed, total).
    Progress { processed: usize, total: usize },
    Finished(SyncSummary),
    Failed(String),
}

pub struct Library {
    config: Arc<Config>,
    cache: Cache,
    index: IndexHandle,
    sync_running: Arc<AtomicBool>,
    sync_cancel: Arc<AtomicBool>,
}

/// A running background sync: an event stream plus a join handle.
pub struct SyncTask {
    pub events: Receiver<SyncEvent>,
    handle: JoinHandle<()>,
}

impl SyncTask {
    pub fn wait(self) {
        let _ = self.handle.join();
    }
}

impl Library {
    /// Open the library. A corrupt or incompatible cache surfaces as
    /// `CacheUnavailable`; use `open_or_rebuild` to accept the recovery
    /// path instead.
    pub fn open(config: Config) -> Result<Library> {
        let cache = Cache::open(&config.cache_database_path())?;
        Library::with_cache(config, cache)
    }

    /// Open the library, rebuilding the cache from scratch when it is
    /// unavailable. The caller should follow a rebuild with a full sync.
    pub fn open_or_rebuild(config: Config) -> Result<Library> {
        let db_path = config.cache_database_path();
        let cache = match Cache::open(&db_path) {
            Ok(cache) => cache,
            Err(WiredError::CacheUnavailable { reason, .. }) => {
                warn!("cache unavailable ({reason}); rebuilding from scratch");
                Cache::rebuild(&db_path)?
            }
            Err(e) => return Err(e),
        };
        Library::with_cache(config, cache)
    }

    fn with_cache(config: Config, cache: Cache) -> Result<Library> {
        let index = IndexHandle::new(LibraryIndex::load_from(&cache)?);
        info!("library opened with {} cached tracks", index.snapshot().len());
        Ok(Library {
            config: Arc::new(config),
            cache,
            index,
            sync_running: Arc::new(AtomicBool::new(false)),
            sync_cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn index(&self) -> &IndexHandle {
        &self.index
    }

    /// Flip a track's favorite flag in the cache and patch the index in
    /// the same call, so filters see the change without waiting for a
    /// sync. Returns false when no record exists for the path.
    pub fn set_favorite(&self, path: &Path, favorite: bool) -> Result<bool> {
        if !self.cache.set_favorite(path, favorite)? {
            return Ok(false);
        }
        if let Some(stored) = self.cache.get(path)? {
            self.index.apply(&SyncDiff {
                changed: vec![stored],
                ..SyncDiff::default()
            });
        }
        Ok(true)
    }

    pub fn sync_running(&self) -> bool {
        self.sync_running.load(Ordering::SeqCst)
    }

    /// Cooperative: the worker notices between files.
    pub fn cancel_sync(&self) {
        self.sync_cancel.store(true, Ordering::SeqCst);
    }

    /// Start a background sync. At most one may run at a time; a request
    /// while one is active is rejected with `SyncInProgress`, never
    /// queued. The completed diff is applied to the index before the
    /// terminal `Finished` event is emitted.
    pub fn start_sync(&self, reader: Arc<dyn MetadataReader>, full: bool) -> Result<SyncTask> {
        if self.sync_running.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            return Err(WiredError::SyncInProgress);
        }
        self.sync_cancel.store(false, Ordering::SeqCst);

        let (tx, rx) = channel();
        let cache = self.cache.clone();
        let config = Arc::clone(&self.config);
        let index = self.index.clone();
        let running = Arc::clone(&self.sync_running);
        let cancel = Arc::clone(&self.sync_cancel);

        let handle = thread::spawn(move || {
            let progress_tx = tx.clone();
            let result = run_sync(
                &cache,
                &config,
                reader.as_ref(),
                |processed, total| {
                    let _ = progress_tx.send(SyncEvent::Progress { processed, total });
                },
                &cancel,
                full,
            );
            match result {
                Ok(summary) => {
                    // A cancelled run still applies whatever committed.
                    index.apply(&summary.diff);
                    let _ = tx.send(SyncEvent::Finished(summary));
                }
                Err(e) => {
                    warn!("sync failed: {e}");
                    let _ = tx.send(SyncEvent::Failed(e.to_string()));
                }
            }
            running.store(false, Ordering::SeqCst);
        });

        Ok(SyncTask { events: rx, handle })
    }
}
