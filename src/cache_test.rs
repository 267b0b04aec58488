use std::fs;
use std::path::PathBuf;

use crate::cache::Cache;
use crate::errors::WiredError;
use crate::testing;

#[test]
fn test_open_creates_database() {
    let (config, _temp) = testing::config();
    let cache = Cache::open(&config.cache_database_path()).unwrap();
    assert_eq!(cache.track_count().unwrap(), 0);
    // Reopening an existing database succeeds.
    let cache = Cache::open(&config.cache_database_path()).unwrap();
    assert_eq!(cache.track_count().unwrap(), 0);
}

#[test]
fn test_upsert_and_get_roundtrip() {
    let (config, _temp) = testing::config();
    let cache = testing::open_cache(&config);
    let mut track = testing::track("/music/a.flac", "Heart of Glass", "Blondie", "Parallel Lines");
    track.year = Some(1978);
    track.genre = "New Wave;Pop".to_string();
    cache.upsert_tracks(std::slice::from_ref(&track)).unwrap();

    let got = cache.get(&track.path).unwrap().unwrap();
    assert_eq!(got, track);
    assert!(cache.get(&PathBuf::from("/music/missing.flac")).unwrap().is_none());
}

#[test]
fn test_upsert_refresh_preserves_favorite() {
    let (config, _temp) = testing::config();
    let cache = testing::open_cache(&config);
    let mut track = testing::track("/music/a.flac", "Heart of Glass", "Blondie", "Parallel Lines");
    cache.upsert_tracks(std::slice::from_ref(&track)).unwrap();
    assert!(cache.set_favorite(&track.path, true).unwrap());

    // A metadata refresh must not clobber the user flag.
    track.title = "Heart of Glass (2001 Remaster)".to_string();
    track.mtime = 1000;
    cache.upsert_tracks(std::slice::from_ref(&track)).unwrap();

    let got = cache.get(&track.path).unwrap().unwrap();
    assert_eq!(got.title, "Heart of Glass (2001 Remaster)");
    assert!(got.favorite);
}

#[test]
fn test_set_favorite_unknown_path() {
    let (config, _temp) = testing::config();
    let cache = testing::open_cache(&config);
    assert!(!cache.set_favorite(&PathBuf::from("/nope.flac"), true).unwrap());
}

#[test]
fn test_fingerprints_and_remove() {
    let (config, _temp) = testing::config();
    let cache = testing::open_cache(&config);
    let a = testing::track("/music/a.flac", "A", "X", "Y");
    let mut b = testing::track("/music/b.flac", "B", "X", "Y");
    b.mtime = 1234;
    b.size = 42;
    cache.upsert_tracks(&[a.clone(), b.clone()]).unwrap();

    let fps = cache.fingerprints().unwrap();
    assert_eq!(fps.len(), 2);
    assert_eq!(fps[&b.path], (1234, 42));

    cache.remove_tracks(&[a.path.clone()]).unwrap();
    assert_eq!(cache.track_count().unwrap(), 1);
    assert!(cache.get(&a.path).unwrap().is_none());
}

#[test]
fn test_get_all_ordered_by_path() {
    let (config, _temp) = testing::config();
    let cache = testing::open_cache(&config);
    let b = testing::track("/music/b.flac", "B", "X", "Y");
    let a = testing::track("/music/a.flac", "A", "X", "Y");
    cache.upsert_tracks(&[b, a]).unwrap();
    let all = cache.get_all().unwrap();
    assert_eq!(all.iter().map(|t| t.path.display().to_string()).collect::<Vec<_>>(), vec!["/music/a.flac", "/music/b.flac"]);
}

#[test]
fn test_clear_tracks_leaves_user_data() {
    let (config, _temp) = testing::config();
    let cache = testing::open_cache(&config);
    cache
        .upsert_tracks(&[
            testing::track("/music/a.flac", "A", "X", "Y"),
            testing::track("/music/b.flac", "B", "X", "Y"),
        ])
        .unwrap();
    cache.save_queue(&[PathBuf::from("/music/a.flac")]).unwrap();

    cache.clear_tracks().unwrap();
    assert_eq!(cache.track_count().unwrap(), 0);
    // The queue store is user data, not a projection of the filesystem.
    assert_eq!(cache.load_queue().unwrap(), vec![PathBuf::from("/music/a.flac")]);
}

#[test]
fn test_queue_persistence() {
    let (config, _temp) = testing::config();
    let cache = testing::open_cache(&config);
    let paths = vec![PathBuf::from("/music/c.flac"), PathBuf::from("/music/a.flac"), PathBuf::from("/music/c.flac")];
    cache.save_queue(&paths).unwrap();
    assert_eq!(cache.load_queue().unwrap(), paths);

    // Saving replaces, not appends.
    cache.save_queue(&paths[..1]).unwrap();
    assert_eq!(cache.load_queue().unwrap(), paths[..1].to_vec());
}

#[test]
fn test_open_garbage_file_is_cache_unavailable() {
    let (config, _temp) = testing::config();
    let db_path = config.cache_database_path();
    fs::write(&db_path, "definitely not a sqlite database, and long enough to have a header").unwrap();
    match Cache::open(&db_path) {
        Err(WiredError::CacheUnavailable { path, .. }) => assert_eq!(path, db_path),
        other => panic!("expected CacheUnavailable, got {other:?}"),
    }
}

#[test]
fn test_open_with_unusable_directory_is_cache_unavailable() {
    let temp_dir = testing::init();
    // A file sits where the cache directory should go, so setup cannot
    // proceed; every startup failure wears the same error.
    let blocker = temp_dir.path().join("cache");
    fs::write(&blocker, "a file, not a directory").unwrap();
    let db_path = blocker.join("library.db");
    match Cache::open(&db_path) {
        Err(WiredError::CacheUnavailable { path, .. }) => assert_eq!(path, db_path),
        other => panic!("expected CacheUnavailable, got {other:?}"),
    }
}

#[test]
fn test_rebuild_recovers_from_garbage() {
    let (config, _temp) = testing::config();
    let db_path = config.cache_database_path();
    fs::write(&db_path, "garbage").unwrap();
    assert!(Cache::open(&db_path).is_err());
    let cache = Cache::rebuild(&db_path).unwrap();
    assert_eq!(cache.track_count().unwrap(), 0);
}

#[test]
fn test_schema_mismatch_is_cache_unavailable() {
    let (config, _temp) = testing::config();
    let db_path = config.cache_database_path();
    let cache = Cache::open(&db_path).unwrap();
    {
        let conn = cache.connect().unwrap();
        conn.execute("UPDATE _schema_hash SET version = '0.0.0-older'", []).unwrap();
    }
    match Cache::open(&db_path) {
        Err(WiredError::CacheUnavailable { reason, .. }) => assert!(reason.contains("rebuild"), "unexpected reason: {reason}"),
        other => panic!("expected CacheUnavailable, got {other:?}"),
    }
}
