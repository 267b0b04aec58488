use std::path::PathBuf;
use std::sync::Arc;

use crate::errors::WiredError;
use crate::index::LibraryIndex;
use crate::m3u;
use crate::playlists::PlaylistStore;
use crate::testing;
use crate::track::Track;

fn paths(names: &[&str]) -> Vec<PathBuf> {
    names.iter().map(PathBuf::from).collect()
}

fn store_and_index() -> (PlaylistStore, LibraryIndex, tempfile::TempDir) {
    let (config, temp) = testing::config();
    let cache = testing::open_cache(&config);
    let index = testing::index_of(vec![
        testing::track("/m/a.flac", "A", "Blondie", "Parallel Lines"),
        testing::track("/m/b.flac", "B", "Blondie", "Parallel Lines"),
        testing::track("/m/c.flac", "C", "The Beatles", "Revolver"),
    ]);
    (PlaylistStore::new(cache), index, temp)
}

#[test]
fn test_create_get_list() {
    let (store, _index, _temp) = store_and_index();
    let zebra = store.create("Zebra").unwrap();
    let apple = store.create("Apple").unwrap();
    assert_eq!(zebra.track_count, 0);
    assert_eq!(store.get(&zebra.id).unwrap(), zebra);

    // Listed by name.
    let names: Vec<_> = store.list().unwrap().into_iter().map(|p| p.name).collect();
    assert_eq!(names, vec!["Apple", "Zebra"]);
    assert_ne!(zebra.id, apple.id);
}

#[test]
fn test_get_unknown_playlist() {
    let (store, _index, _temp) = store_and_index();
    assert!(matches!(store.get("nope"), Err(WiredError::PlaylistDoesNotExist(_))));
}

#[test]
fn test_rename_and_delete() {
    let (store, _index, _temp) = store_and_index();
    let p = store.create("Old").unwrap();
    store.rename(&p.id, "New").unwrap();
    assert_eq!(store.get(&p.id).unwrap().name, "New");

    store.delete(&p.id).unwrap();
    assert!(store.get(&p.id).is_err());
    assert!(matches!(store.delete(&p.id), Err(WiredError::PlaylistDoesNotExist(_))));
    assert!(matches!(store.rename(&p.id, "X"), Err(WiredError::PlaylistDoesNotExist(_))));
}

#[test]
fn test_delete_cascades_membership() {
    let (store, _index, _temp) = store_and_index();
    let p = store.create("Mix").unwrap();
    store.add_tracks(&p.id, &paths(&["/m/a.flac"]), None).unwrap();
    store.delete(&p.id).unwrap();
    // Recreate and confirm no orphaned membership leaks in.
    let q = store.create("Mix").unwrap();
    assert!(store.tracks(&q.id).unwrap().is_empty());
}

#[test]
fn test_add_tracks_append_and_splice() {
    let (store, _index, _temp) = store_and_index();
    let p = store.create("Mix").unwrap();
    store.add_tracks(&p.id, &paths(&["/m/a.flac", "/m/c.flac"]), None).unwrap();
    store.add_tracks(&p.id, &paths(&["/m/b.flac"]), Some(1)).unwrap();
    assert_eq!(store.tracks(&p.id).unwrap(), paths(&["/m/a.flac", "/m/b.flac", "/m/c.flac"]));
    assert_eq!(store.get(&p.id).unwrap().track_count, 3);

    // Out-of-range position clamps to append.
    store.add_tracks(&p.id, &paths(&["/m/a.flac"]), Some(99)).unwrap();
    assert_eq!(store.tracks(&p.id).unwrap().last(), Some(&PathBuf::from("/m/a.flac")));
}

#[test]
fn test_remove_tracks_keeps_survivor_order() {
    let (store, _index, _temp) = store_and_index();
    let p = store.create("Mix").unwrap();
    store.add_tracks(&p.id, &paths(&["/m/a.flac", "/m/b.flac", "/m/c.flac", "/m/b.flac"]), None).unwrap();
    store.remove_tracks(&p.id, &paths(&["/m/b.flac"])).unwrap();
    assert_eq!(store.tracks(&p.id).unwrap(), paths(&["/m/a.flac", "/m/c.flac"]));
}

#[test]
fn test_reorder() {
    let (store, _index, _temp) = store_and_index();
    let p = store.create("Mix").unwrap();
    store.add_tracks(&p.id, &paths(&["/m/a.flac", "/m/b.flac", "/m/c.flac"]), None).unwrap();
    store.reorder(&p.id, &paths(&["/m/c.flac", "/m/a.flac", "/m/b.flac"])).unwrap();
    assert_eq!(store.tracks(&p.id).unwrap(), paths(&["/m/c.flac", "/m/a.flac", "/m/b.flac"]));
}

#[test]
fn test_invalid_reorder_changes_nothing() {
    let (store, _index, _temp) = store_and_index();
    let p = store.create("Mix").unwrap();
    store.add_tracks(&p.id, &paths(&["/m/a.flac", "/m/b.flac"]), None).unwrap();
    let err = store.reorder(&p.id, &paths(&["/m/a.flac", "/m/c.flac"])).unwrap_err();
    assert!(matches!(err, WiredError::PlaylistReorderInvalid { .. }));
    assert_eq!(store.tracks(&p.id).unwrap(), paths(&["/m/a.flac", "/m/b.flac"]));
}

#[test]
fn test_stale_references_filtered_at_resolve_only() {
    let (store, index, _temp) = store_and_index();
    let p = store.create("Mix").unwrap();
    store.add_tracks(&p.id, &paths(&["/m/a.flac", "/m/gone.flac", "/m/c.flac"]), None).unwrap();

    let resolved = store.resolved_tracks(&p.id, &index).unwrap();
    let titles: Vec<_> = resolved.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, vec!["A", "C"]);
    // Storage still holds the stale path.
    assert_eq!(store.tracks(&p.id).unwrap().len(), 3);
}

#[test]
fn test_save_filter_results_is_a_snapshot() {
    let (store, index, _temp) = store_and_index();
    let selection: Vec<Arc<Track>> = index.by_artist("blondie").to_vec();
    let p = store.save_filter_results("Blondie", &selection).unwrap();
    assert_eq!(p.track_count, 2);
    assert_eq!(store.tracks(&p.id).unwrap(), paths(&["/m/a.flac", "/m/b.flac"]));
}

#[test]
fn test_export_import_roundtrip() {
    let (store, index, temp) = store_and_index();
    let p = store.create("Mix").unwrap();
    store.add_tracks(&p.id, &paths(&["/m/c.flac", "/m/a.flac", "/m/gone.flac"]), None).unwrap();

    let dest = temp.path().join("mix.m3u");
    store.export_m3u(&p.id, &dest, &index).unwrap();

    let doc = m3u::read_file(&dest).unwrap();
    assert_eq!(doc.name.as_deref(), Some("Mix"));
    // Stale reference is not exported.
    assert_eq!(doc.entries.len(), 2);
    assert_eq!(doc.entries[0].display.as_deref(), Some("The Beatles - C"));

    let outcome = store.import_m3u(&dest, &index).unwrap();
    assert_eq!(outcome.playlist.name, "Mix");
    assert!(outcome.skipped.is_empty());
    assert_eq!(store.tracks(&outcome.playlist.id).unwrap(), paths(&["/m/c.flac", "/m/a.flac"]));
}

#[test]
fn test_import_records_unresolvable_entries() {
    let (store, index, temp) = store_and_index();
    let src = temp.path().join("half.m3u");
    std::fs::write(&src, "/m/a.flac\n/m/missing.flac\n").unwrap();

    let outcome = store.import_m3u(&src, &index).unwrap();
    // Name falls back to the file stem.
    assert_eq!(outcome.playlist.name, "half");
    assert_eq!(outcome.skipped, paths(&["/m/missing.flac"]));
    assert_eq!(store.tracks(&outcome.playlist.id).unwrap(), paths(&["/m/a.flac"]));
}
