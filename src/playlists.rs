/// The playlists module provides the durable, user-defined ordered track
/// subsets stored in the cache database. Membership is a dense 0..n-1
/// position ordering; paths referencing tracks absent from the index are
/// kept in storage (deletion is an explicit user action) and filtered out
/// at resolve time.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;
use uuid::Uuid;

use crate::cache::Cache;
use crate::errors::{Result, WiredError};
use crate::index::LibraryIndex;
use crate::m3u::{self, M3uDocument, M3uEntry};
use crate::track::Track;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub track_count: usize,
}

#[derive(Debug)]
pub struct ImportOutcome {
    pub playlist: Playlist,
    /// Entries whose path resolved to no known track, in source order.
    pub skipped: Vec<PathBuf>,
}

pub struct PlaylistStore {
    cache: Cache,
}

impl PlaylistStore {
    pub fn new(cache: Cache) -> PlaylistStore {
        PlaylistStore { cache }
    }

    pub fn create(&self, name: &str) -> Result<Playlist> {
        let conn = self.cache.connect()?;
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        conn.execute(
            "INSERT INTO playlists (id, name, created_at, modified_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, name, now, now],
        )?;
        info!("created playlist {name} ({id})");
        self.get(&id)
    }

    pub fn get(&self, id: &str) -> Result<Playlist> {
        let conn = self.cache.connect()?;
        fetch_playlist(&conn, id)?.ok_or_else(|| WiredError::PlaylistDoesNotExist(id.to_string()))
    }

    pub fn list(&self) -> Result<Vec<Playlist>> {
        let conn = self.cache.connect()?;
        let mut stmt = conn.prepare(
            "
            SELECT p.id, p.name, p.created_at, p.modified_at, COUNT(pt.path) AS track_count
            FROM playlists p
            LEFT JOIN playlist_tracks pt ON pt.playlist_id = p.id
            GROUP BY p.id
            ORDER BY p.name, p.id
            ",
        )?;
        let playlists = stmt
            .query_map([], |row| {
                Ok(Playlist {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    created_at: row.get(2)?,
                    modified_at: row.get(3)?,
                    track_count: row.get::<_, i64>(4)? as usize,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(playlists)
    }

    pub fn rename(&self, id: &str, name: &str) -> Result<()> {
        let conn = self.cache.connect()?;
        let changed = conn.execute("UPDATE playlists SET name = ?1, modified_at = ?2 WHERE id = ?3", params![name, Utc::now(), id])?;
        if changed == 0 {
            return Err(WiredError::PlaylistDoesNotExist(id.to_string()));
        }
        info!("renamed playlist {id} to {name}");
        Ok(())
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        let conn = self.cache.connect()?;
        let changed = conn.execute("DELETE FROM playlists WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(WiredError::PlaylistDoesNotExist(id.to_string()));
        }
        info!("deleted playlist {id}");
        Ok(())
    }

    /// Raw membership, stale references included.
    pub fn tracks(&self, id: &str) -> Result<Vec<PathBuf>> {
        let conn = self.cache.connect()?;
        require(&conn, id)?;
        read_paths(&conn, id)
    }

    /// Membership resolved against the index; stale references are
    /// filtered from the result but remain in storage.
    pub fn resolved_tracks(&self, id: &str, index: &LibraryIndex) -> Result<Vec<Arc<Track>>> {
        Ok(self.tracks(id)?.iter().filter_map(|p| index.get(p).cloned()).collect())
    }

    /// Append paths, or splice them in at `at` (clamped to the end).
    /// Duplicates are allowed.
    pub fn add_tracks(&self, id: &str, paths: &[PathBuf], at: Option<usize>) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut conn = self.cache.connect()?;
        require(&conn, id)?;
        let mut membership = read_paths(&conn, id)?;
        let at = at.unwrap_or(membership.len()).min(membership.len());
        membership.splice(at..at, paths.iter().cloned());
        write_paths(&mut conn, id, &membership)?;
        info!("added {} tracks to playlist {id}", paths.len());
        Ok(())
    }

    /// Remove every entry matching one of `paths`; survivors keep their
    /// relative order and are renumbered densely.
    pub fn remove_tracks(&self, id: &str, paths: &[PathBuf]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut conn = self.cache.connect()?;
        require(&conn, id)?;
        let doomed: std::collections::HashSet<&PathBuf> = paths.iter().collect();
        let mut membership = read_paths(&conn, id)?;
        let before = membership.len();
        membership.retain(|p| !doomed.contains(p));
        write_paths(&mut conn, id, &membership)?;
        info!("removed {} tracks from playlist {id}", before - membership.len());
        Ok(())
    }

    /// Replace the ordering wholesale. The new ordering must be a
    /// permutation (as a multiset) of the current membership; otherwise
    /// nothing is applied.
    pub fn reorder(&self, id: &str, new_order: &[PathBuf]) -> Result<()> {
        let mut conn = self.cache.connect()?;
        require(&conn, id)?;
        let current = read_paths(&conn, id)?;

        let mut want = new_order.to_vec();
        let mut have = current.clone();
        want.sort();
        have.sort();
        if want != have {
            return Err(WiredError::PlaylistReorderInvalid {
                id: id.to_string(),
                reason: format!("supplied ordering of {} tracks is not a permutation of the current {} tracks", new_order.len(), current.len()),
            });
        }

        write_paths(&mut conn, id, new_order)?;
        info!("reordered playlist {id}");
        Ok(())
    }

    /// Materialize a query result as a new playlist. This is a snapshot
    /// taken at save time; later index changes do not touch it.
    pub fn save_filter_results(&self, name: &str, tracks: &[Arc<Track>]) -> Result<Playlist> {
        let playlist = self.create(name)?;
        let paths: Vec<PathBuf> = tracks.iter().map(|t| t.path.clone()).collect();
        self.add_tracks(&playlist.id, &paths, None)?;
        self.get(&playlist.id)
    }

    /// Export to extended M3U. Only entries resolvable in the index are
    /// written; stale references have no metadata to describe.
    pub fn export_m3u(&self, id: &str, dest: &Path, index: &LibraryIndex) -> Result<()> {
        let playlist = self.get(id)?;
        let entries = self
            .resolved_tracks(id, index)?
            .into_iter()
            .map(|t| M3uEntry {
                path: t.path.clone(),
                duration: Some(t.duration as i64),
                display: Some(format!("{} - {}", t.artist, t.title)),
            })
            .collect();
        let doc = M3uDocument {
            name: Some(playlist.name),
            entries,
        };
        m3u::write_file(&doc, dest)?;
        info!("exported playlist {id} to {}", dest.display());
        Ok(())
    }

    /// Import an M3U file as a new playlist named from its `#PLAYLIST:`
    /// directive, falling back to the file stem. Entries that resolve to
    /// no known track are skipped and reported, not stored.
    pub fn import_m3u(&self, src: &Path, index: &LibraryIndex) -> Result<ImportOutcome> {
        let doc = m3u::read_file(src)?;
        let name = doc
            .name
            .clone()
            .unwrap_or_else(|| src.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_else(|| "Imported".to_string()));

        let mut kept = Vec::new();
        let mut skipped = Vec::new();
        for entry in doc.entries {
            if index.contains(&entry.path) {
                kept.push(entry.path);
            } else {
                skipped.push(entry.path);
            }
        }

        let playlist = self.create(&name)?;
        self.add_tracks(&playlist.id, &kept, None)?;
        info!("imported playlist {name} from {}: {} tracks, {} skipped", src.display(), kept.len(), skipped.len());
        Ok(ImportOutcome {
            playlist: self.get(&playlist.id)?,
            skipped,
        })
    }
}

fn fetch_playlist(conn: &Connection, id: &str) -> Result<Option<Playlist>> {
    let playlist = conn
        .query_row(
            "
            SELECT p.id, p.name, p.created_at, p.modified_at, COUNT(pt.path) AS track_count
            FROM playlists p
            LEFT JOIN playlist_tracks pt ON pt.playlist_id = p.id
            WHERE p.id = ?1
            GROUP BY p.id
            ",
            params![id],
            |row| {
                Ok(Playlist {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    created_at: row.get(2)?,
                    modified_at: row.get(3)?,
                    track_count: row.get::<_, i64>(4)? as usize,
                })
            },
        )
        .optional()?;
    Ok(playlist)
}

fn require(conn: &Connection, id: &str) -> Result<()> {
    let exists: bool = conn.query_row("SELECT EXISTS(SELECT * FROM playlists WHERE id = ?1)", params![id], |row| row.get(0))?;
    if !exists {
        return Err(WiredError::PlaylistDoesNotExist(id.to_string()));
    }
    Ok(())
}

fn read_paths(conn: &Connection, id: &str) -> Result<Vec<PathBuf>> {
    let mut stmt = conn.prepare("SELECT path FROM playlist_tracks WHERE playlist_id = ?1 ORDER BY position")?;
    let paths = stmt
        .query_map(params![id], |row| Ok(PathBuf::from(row.get::<_, String>(0)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(paths)
}

/// Rewrite the membership in one transaction, renumbering positions
/// densely and touching modified_at.
fn write_paths(conn: &mut Connection, id: &str, paths: &[PathBuf]) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM playlist_tracks WHERE playlist_id = ?1", params![id])?;
    {
        let mut stmt = tx.prepare("INSERT INTO playlist_tracks (playlist_id, path, position) VALUES (?1, ?2, ?3)")?;
        for (i, p) in paths.iter().enumerate() {
            stmt.execute(params![id, p.to_string_lossy(), i as i64])?;
        }
    }
    tx.execute("UPDATE playlists SET modified_at = ?1 WHERE id = ?2", params![Utc::now(), id])?;
    tx.commit()?;
    Ok(())
}
