/// The cache module encapsulates the persistent track cache: a SQLite
/// database keyed by absolute path. The synchronizer is its only writer;
/// everything else reads. The tracks table is a reconstructible projection
/// of the filesystem, but the playlist, queue and favorite data in here is
/// user-owned, so an incompatible or corrupt database is surfaced as
/// `CacheUnavailable` and only rebuilt on explicit request.
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension, Row};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::common::VERSION;
use crate::errors::{Result, WiredError};
use crate::track::Track;

static CACHE_SCHEMA: &str = include_str!("cache.sql");

/// Connect to the SQLite database with appropriate settings.
pub fn connect(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;
        PRAGMA journal_mode = WAL;
        PRAGMA busy_timeout = 15000;
        ",
    )?;
    Ok(conn)
}

fn schema_hash() -> String {
    let mut hasher = Sha256::new();
    hasher.update(CACHE_SCHEMA.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn unavailable(db_path: &Path, reason: impl ToString) -> WiredError {
    WiredError::CacheUnavailable {
        path: db_path.to_path_buf(),
        reason: reason.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct Cache {
    db_path: PathBuf,
}

impl Cache {
    /// Open the cache, creating it if absent. An unreadable, corrupt, or
    /// incompatible database yields `CacheUnavailable`; recovery goes
    /// through `Cache::rebuild` followed by a full sync.
    pub fn open(db_path: &Path) -> Result<Cache> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent).map_err(|e| unavailable(db_path, e))?;
        }
        let conn = connect(db_path).map_err(|e| unavailable(db_path, e))?;

        let integrity: String = conn
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))
            .map_err(|e| unavailable(db_path, e))?;
        if integrity != "ok" {
            return Err(unavailable(db_path, format!("integrity check failed: {integrity}")));
        }

        let has_meta: bool = conn
            .query_row(
                "SELECT EXISTS(
                    SELECT * FROM sqlite_master
                    WHERE type = 'table' AND name = '_schema_hash'
                )",
                [],
                |row| row.get(0),
            )
            .map_err(|e| unavailable(db_path, e))?;

        if has_meta {
            let row: Option<(String, String)> = conn
                .query_row("SELECT schema_hash, version FROM _schema_hash", [], |row| Ok((row.get(0)?, row.get(1)?)))
                .optional()
                .map_err(|e| unavailable(db_path, e))?;
            match row {
                Some((hash, version)) if hash == schema_hash() && version == VERSION => {}
                _ => return Err(unavailable(db_path, "schema mismatch with this version; a rebuild is required")),
            }
        } else {
            let object_count: i64 =
                conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| row.get(0)).map_err(|e| unavailable(db_path, e))?;
            if object_count > 0 {
                return Err(unavailable(db_path, "unrecognized database contents"));
            }
            conn.execute_batch(CACHE_SCHEMA).map_err(|e| unavailable(db_path, e))?;
            conn.execute_batch(
                "
                CREATE TABLE _schema_hash (
                    schema_hash TEXT
                  , version TEXT
                  , PRIMARY KEY (schema_hash, version)
                )
                ",
            )
            .map_err(|e| unavailable(db_path, e))?;
            conn.execute("INSERT INTO _schema_hash (schema_hash, version) VALUES (?1, ?2)", params![schema_hash(), VERSION])
                .map_err(|e| unavailable(db_path, e))?;
            debug!("created cache database at {}", db_path.display());
        }

        Ok(Cache { db_path: db_path.to_path_buf() })
    }

    /// Delete the database and recreate it empty. This is the recovery
    /// path after `CacheUnavailable`: the caller loses cached records and
    /// repopulates with a full sync.
    pub fn rebuild(db_path: &Path) -> Result<Cache> {
        info!("rebuilding cache database at {}", db_path.display());
        for suffix in ["", "-wal", "-shm"] {
            let p = PathBuf::from(format!("{}{}", db_path.display(), suffix));
            if p.exists() {
                fs::remove_file(&p)?;
            }
        }
        Cache::open(db_path)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn connect(&self) -> Result<Connection> {
        connect(&self.db_path)
    }

    /// Insert or refresh records in one transaction. The favorite flag is
    /// user data, not tag data: a refresh never clobbers it.
    pub fn upsert_tracks(&self, tracks: &[Track]) -> Result<()> {
        if tracks.is_empty() {
            return Ok(());
        }
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "
                INSERT INTO tracks
                    (path, title, artist, album, year, genre, track_number, duration, codec, bitrate, sample_rate, bit_depth, mtime, size, favorite)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, false)
                ON CONFLICT (path) DO UPDATE SET
                    title = excluded.title
                  , artist = excluded.artist
                  , album = excluded.album
                  , year = excluded.year
                  , genre = excluded.genre
                  , track_number = excluded.track_number
                  , duration = excluded.duration
                  , codec = excluded.codec
                  , bitrate = excluded.bitrate
                  , sample_rate = excluded.sample_rate
                  , bit_depth = excluded.bit_depth
                  , mtime = excluded.mtime
                  , size = excluded.size
                ",
            )?;
            for t in tracks {
                stmt.execute(params![
                    t.path.to_string_lossy(),
                    t.title,
                    t.artist,
                    t.album,
                    t.year,
                    t.genre,
                    t.track_number,
                    t.duration,
                    t.codec,
                    t.bitrate,
                    t.sample_rate,
                    t.bit_depth,
                    t.mtime,
                    t.size,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn remove_tracks(&self, paths: &[PathBuf]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare("DELETE FROM tracks WHERE path = ?1")?;
            for p in paths {
                stmt.execute(params![p.to_string_lossy()])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get(&self, path: &Path) -> Result<Option<Track>> {
        let conn = self.connect()?;
        let track = conn
            .query_row("SELECT * FROM tracks WHERE path = ?1", params![path.to_string_lossy()], track_from_row)
            .optional()?;
        Ok(track)
    }

    pub fn get_all(&self) -> Result<Vec<Track>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT * FROM tracks ORDER BY path")?;
        let tracks = stmt.query_map([], track_from_row)?.collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tracks)
    }

    /// path -> (mtime, size) for every cached record; the synchronizer
    /// diffs the filesystem walk against this.
    pub fn fingerprints(&self) -> Result<HashMap<PathBuf, (i64, i64)>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT path, mtime, size FROM tracks")?;
        let rows = stmt.query_map([], |row| {
            Ok((PathBuf::from(row.get::<_, String>(0)?), (row.get::<_, i64>(1)?, row.get::<_, i64>(2)?)))
        })?;
        let mut map = HashMap::new();
        for r in rows {
            let (path, fp) = r?;
            map.insert(path, fp);
        }
        Ok(map)
    }

    /// Returns false when no record exists for the path.
    pub fn set_favorite(&self, path: &Path, favorite: bool) -> Result<bool> {
        let conn = self.connect()?;
        let changed = conn.execute("UPDATE tracks SET favorite = ?1 WHERE path = ?2", params![favorite, path.to_string_lossy()])?;
        Ok(changed > 0)
    }

    /// Drop every track record, leaving playlists and the persisted queue
    /// untouched. Used to force the next sync to re-read the whole
    /// library.
    pub fn clear_tracks(&self) -> Result<()> {
        let conn = self.connect()?;
        let removed = conn.execute("DELETE FROM tracks", [])?;
        info!("cleared {removed} track records");
        Ok(())
    }

    pub fn track_count(&self) -> Result<usize> {
        let conn = self.connect()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM tracks", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// Persist the playback queue, replacing whatever was stored.
    pub fn save_queue(&self, paths: &[PathBuf]) -> Result<()> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM play_queue", [])?;
        {
            let mut stmt = tx.prepare("INSERT INTO play_queue (position, path) VALUES (?1, ?2)")?;
            for (i, p) in paths.iter().enumerate() {
                stmt.execute(params![i as i64, p.to_string_lossy()])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn load_queue(&self) -> Result<Vec<PathBuf>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT path FROM play_queue ORDER BY position")?;
        let paths = stmt
            .query_map([], |row| Ok(PathBuf::from(row.get::<_, String>(0)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(paths)
    }
}

pub fn track_from_row(row: &Row) -> rusqlite::Result<Track> {
    Ok(Track {
        path: PathBuf::from(row.get::<_, String>("path")?),
        title: row.get("title")?,
        artist: row.get("artist")?,
        album: row.get("album")?,
        year: row.get("year")?,
        genre: row.get("genre")?,
        track_number: row.get("track_number")?,
        duration: row.get("duration")?,
        codec: row.get("codec")?,
        bitrate: row.get("bitrate")?,
        sample_rate: row.get("sample_rate")?,
        bit_depth: row.get("bit_depth")?,
        mtime: row.get("mtime")?,
        size: row.get("size")?,
        favorite: row.get("favorite")?,
    })
}
