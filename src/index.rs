/// The index module holds the in-memory, query-optimized projection of the
/// persistent cache: the path map plus derived orderings. It is never a
/// source of truth; it is rebuilt wholesale at load and patched from
/// completed sync diffs. `IndexHandle` swaps whole generations so readers
/// are never exposed to a half-applied patch.
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::cache::Cache;
use crate::errors::Result;
use crate::sync::SyncDiff;
use crate::track::Track;

#[derive(Debug, Default, Clone)]
pub struct LibraryIndex {
    by_path: HashMap<PathBuf, Arc<Track>>,
    /// Natural order: sorted by path, matching the cache's `get_all`.
    ordered: Vec<Arc<Track>>,
    /// Keyed by lowercased artist; groups sorted by (album, track number, path).
    by_artist: BTreeMap<String, Vec<Arc<Track>>>,
    /// Keyed by lowercased (artist, album); groups sorted by (track number, path).
    by_album: BTreeMap<(String, String), Vec<Arc<Track>>>,
}

fn artist_group_key(t: &Track) -> (String, i32, PathBuf) {
    (t.album.to_lowercase(), t.track_number, t.path.clone())
}

fn album_group_key(t: &Track) -> (i32, PathBuf) {
    (t.track_number, t.path.clone())
}

impl LibraryIndex {
    /// O(n) wholesale rebuild from the cache.
    pub fn load_from(cache: &Cache) -> Result<LibraryIndex> {
        Ok(LibraryIndex::from_tracks(cache.get_all()?))
    }

    pub fn from_tracks(tracks: Vec<Track>) -> LibraryIndex {
        let mut index = LibraryIndex::default();
        for t in tracks {
            index.insert(Arc::new(t));
        }
        index
    }

    /// Incremental patch from a completed sync: O(k log n) in the number
    /// of touched records.
    pub fn patch(&mut self, diff: &SyncDiff) {
        for path in &diff.removed {
            self.remove(path);
        }
        for t in diff.changed.iter().chain(diff.added.iter()) {
            self.remove(&t.path);
            self.insert(Arc::new(t.clone()));
        }
    }

    fn insert(&mut self, track: Arc<Track>) {
        let pos = self.ordered.partition_point(|t| t.path < track.path);
        self.ordered.insert(pos, Arc::clone(&track));

        let artist_tracks = self.by_artist.entry(track.artist.to_lowercase()).or_default();
        let key = artist_group_key(&track);
        let pos = artist_tracks.partition_point(|t| artist_group_key(t) < key);
        artist_tracks.insert(pos, Arc::clone(&track));

        let album_tracks = self.by_album.entry((track.artist.to_lowercase(), track.album.to_lowercase())).or_default();
        let key = album_group_key(&track);
        let pos = album_tracks.partition_point(|t| album_group_key(t) < key);
        album_tracks.insert(pos, Arc::clone(&track));

        self.by_path.insert(track.path.clone(), track);
    }

    fn remove(&mut self, path: &Path) {
        let Some(track) = self.by_path.remove(path) else {
            return;
        };
        if let Ok(pos) = self.ordered.binary_search_by(|t| t.path.as_path().cmp(path)) {
            self.ordered.remove(pos);
        }
        let artist_key = track.artist.to_lowercase();
        if let Some(group) = self.by_artist.get_mut(&artist_key) {
            group.retain(|t| t.path != *path);
            if group.is_empty() {
                self.by_artist.remove(&artist_key);
            }
        }
        let album_key = (track.artist.to_lowercase(), track.album.to_lowercase());
        if let Some(group) = self.by_album.get_mut(&album_key) {
            group.retain(|t| t.path != *path);
            if group.is_empty() {
                self.by_album.remove(&album_key);
            }
        }
    }

    pub fn all(&self) -> &[Arc<Track>] {
        &self.ordered
    }

    pub fn get(&self, path: &Path) -> Option<&Arc<Track>> {
        self.by_path.get(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.by_path.contains_key(path)
    }

    pub fn by_artist(&self, artist: &str) -> &[Arc<Track>] {
        self.by_artist.get(&artist.to_lowercase()).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn by_album(&self, artist: &str, album: &str) -> &[Arc<Track>] {
        self.by_album.get(&(artist.to_lowercase(), album.to_lowercase())).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Distinct artist display names, ordered case-insensitively.
    pub fn artists(&self) -> Vec<String> {
        self.by_artist.values().filter_map(|g| g.first()).map(|t| t.artist.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

/// Shared, generation-swapped access to the index. Readers take an `Arc`
/// snapshot and query it without locks held; `apply` builds the next
/// generation and swaps it in atomically, so concurrent readers observe
/// either the pre- or post-apply index, never a mix.
#[derive(Clone)]
pub struct IndexHandle {
    inner: Arc<RwLock<Arc<LibraryIndex>>>,
}

impl IndexHandle {
    pub fn new(index: LibraryIndex) -> IndexHandle {
        IndexHandle {
            inner: Arc::new(RwLock::new(Arc::new(index))),
        }
    }

    pub fn snapshot(&self) -> Arc<LibraryIndex> {
        Arc::clone(&self.inner.read().unwrap())
    }

    pub fn apply(&self, diff: &SyncDiff) {
        let mut guard = self.inner.write().unwrap();
        let mut next = (**guard).clone();
        next.patch(diff);
        *guard = Arc::new(next);
    }

    pub fn replace(&self, index: LibraryIndex) {
        *self.inner.write().unwrap() = Arc::new(index);
    }
}
