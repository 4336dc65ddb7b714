use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use tempfile::TempDir;

use super::*;
use crate::bookmarks::{BookmarkItem, BookmarkUpdateInfo};
use crate::constants::{MENU_GUID, ROOT_GUID, TOOLBAR_GUID, UNFILED_GUID};
use crate::history::metadata::HistoryMetadataKey;
use crate::history::VisitObservation;
use crate::types::{Guid, Timestamp, VisitTransitionSet, VisitType};

fn open_store() -> (TempDir, PlacesApi) {
    let tmp = TempDir::new().unwrap();
    let api = PlacesApi::open(tmp.path().join("profile").join("places.sqlite")).unwrap();
    (tmp, api)
}

#[test]
fn writer_is_a_singleton() {
    let (_tmp, api) = open_store();
    assert!(Arc::ptr_eq(&api.get_writer(), &api.get_writer()));
    assert!(api.is_open());
}

#[test]
fn readers_see_committed_writes() {
    let (_tmp, api) = open_store();
    let writer = api.get_writer();
    let reader = api.open_reader().unwrap();

    let folder = writer.create_folder(&Guid::from(MENU_GUID), "Reading", None).unwrap();
    let bm = writer
        .create_bookmark(&folder, "https://example.com/", Some("Example"), None)
        .unwrap();

    match reader.get_bookmark(&folder).unwrap() {
        Some(BookmarkItem::Folder(f)) => assert_eq!(f.child_guids, Some(vec![bm.clone()])),
        other => panic!("expected folder, got {:?}", other),
    }
    // The writer reads too.
    assert!(writer.get_bookmark(&bm).unwrap().is_some());
    assert!(reader.get_bookmark(&Guid::from("nonexistent1")).unwrap().is_none());
}

#[test]
fn close_invalidates_every_session() {
    let (_tmp, api) = open_store();
    let writer = api.get_writer();
    let reader = api.open_reader().unwrap();

    api.close();
    assert!(!api.is_open());
    api.close();

    assert_eq!(reader.get_bookmark(&Guid::from(MENU_GUID)), Err(PlacesApiError::SessionClosed));
    assert_eq!(
        writer.create_folder(&Guid::from(MENU_GUID), "x", None),
        Err(PlacesApiError::SessionClosed)
    );
    // The check happens before the connection is touched at all.
    let untouched: ApiResult<()> = reader.with_conn(|_, _| panic!("connection used after close"));
    assert_eq!(untouched, Err(PlacesApiError::SessionClosed));
    assert_eq!(api.open_reader().err(), Some(PlacesApiError::SessionClosed));
    assert_eq!(api.reset_history_sync_metadata(), Err(PlacesApiError::SessionClosed));
}

#[test]
fn dropping_the_manager_closes_sessions() {
    let (_tmp, api) = open_store();
    let writer = api.get_writer();
    let reader = api.open_reader().unwrap();
    drop(api);

    assert_eq!(writer.get_visit_count(VisitTransitionSet::empty()), Err(PlacesApiError::SessionClosed));
    assert_eq!(reader.match_url("example"), Err(PlacesApiError::SessionClosed));
    // Interrupting a dead session is still fine.
    reader.interrupt();
    writer.interrupt();
}

#[test]
fn open_failures_are_reported() {
    let tmp = TempDir::new().unwrap();
    // A directory can't be opened as a database.
    assert!(matches!(
        PlacesApi::open(tmp.path()).err(),
        Some(PlacesApiError::DatabaseOpenFailed { .. })
    ));

    let junk = tmp.path().join("junk.sqlite");
    std::fs::write(&junk, vec![0x42u8; 4096]).unwrap();
    assert!(matches!(
        PlacesApi::open(&junk).err(),
        Some(PlacesApiError::DatabaseOpenFailed { .. })
    ));
}

#[test]
fn errors_use_the_public_taxonomy() {
    let (_tmp, api) = open_store();
    let writer = api.get_writer();

    assert_eq!(
        writer.create_folder(&Guid::from(ROOT_GUID), "nope", None),
        Err(PlacesApiError::CannotUpdateRoot {
            guid: Guid::from(ROOT_GUID)
        })
    );
    assert_eq!(
        writer.create_separator(&Guid::from("nonexistent1"), None),
        Err(PlacesApiError::NoSuchItem {
            guid: Guid::from("nonexistent1")
        })
    );
    assert!(matches!(
        writer.create_bookmark(&Guid::from(MENU_GUID), "not a url", None, None),
        Err(PlacesApiError::UrlParseError { .. })
    ));
    let huge = format!("https://example.com/{}", "a".repeat(70_000));
    assert_eq!(
        writer.create_bookmark(&Guid::from(MENU_GUID), &huge, None, None),
        Err(PlacesApiError::UrlTooLong)
    );
    assert_eq!(
        writer.delete_bookmark_node(&Guid::from(TOOLBAR_GUID)),
        Err(PlacesApiError::CannotUpdateRoot {
            guid: Guid::from(TOOLBAR_GUID)
        })
    );
    assert_eq!(writer.delete_bookmark_node(&Guid::from("nonexistent1")), Ok(false));

    let sep = writer.create_separator(&Guid::from(MENU_GUID), None).unwrap();
    assert!(matches!(
        writer.update_bookmark_node(BookmarkUpdateInfo {
            guid: sep,
            title: Some("t".into()),
            ..Default::default()
        }),
        Err(PlacesApiError::IllegalChange { .. })
    ));
    assert!(matches!(
        writer.get_latest_history_metadata_for_url("not a url"),
        Err(PlacesApiError::InvalidInput { .. })
    ));
}

#[test]
fn interrupt_with_nothing_running_is_a_noop() {
    let (_tmp, api) = open_store();
    let reader = api.open_reader().unwrap();
    reader.interrupt();
    reader.new_interrupt_handle().interrupt();
    assert!(reader.get_bookmark(&Guid::from(MENU_GUID)).unwrap().is_some());
}

#[test]
fn interrupt_cancels_in_flight_operation_only() {
    let (_tmp, api) = open_store();
    let reader = Arc::new(api.open_reader().unwrap());
    let started = Arc::new(Barrier::new(2));

    let worker = {
        let reader = Arc::clone(&reader);
        let started = Arc::clone(&started);
        thread::spawn(move || {
            reader.with_conn(|conn, scope| {
                started.wait();
                loop {
                    scope.err_if_interrupted()?;
                    conn.query_row(
                        "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c LIMIT 200000)
                         SELECT COUNT(*) FROM c",
                        [],
                        |row| row.get::<_, i64>(0),
                    )?;
                }
            })
        })
    };

    started.wait();
    let handle = reader.new_interrupt_handle();
    handle.interrupt();
    let result: ApiResult<()> = worker.join().unwrap();
    assert_eq!(result, Err(PlacesApiError::Interrupted));

    // Later calls are unaffected.
    assert!(reader.get_bookmark(&Guid::from(MENU_GUID)).unwrap().is_some());
}

#[test]
fn interrupt_spares_calls_waiting_in_line() {
    let (_tmp, api) = open_store();
    let reader = Arc::new(api.open_reader().unwrap());
    let started = Arc::new(Barrier::new(2));

    let running = {
        let reader = Arc::clone(&reader);
        let started = Arc::clone(&started);
        thread::spawn(move || {
            reader.with_conn(|_, _| {
                started.wait();
                thread::sleep(Duration::from_millis(300));
                Ok(())
            })
        })
    };
    started.wait();

    let queued = {
        let reader = Arc::clone(&reader);
        thread::spawn(move || reader.get_bookmark(&Guid::from(MENU_GUID)))
    };
    // Give the second call time to take its place in line.
    thread::sleep(Duration::from_millis(100));
    reader.interrupt();

    let running_result: ApiResult<()> = running.join().unwrap();
    assert_eq!(running_result, Ok(()));
    assert!(queued.join().unwrap().unwrap().is_some());
}

#[test]
fn concurrent_writers_keep_positions_dense() {
    let (_tmp, api) = open_store();
    let writer = api.get_writer();
    let threads: Vec<_> = (0..4)
        .map(|t| {
            let writer = Arc::clone(&writer);
            thread::spawn(move || {
                for i in 0..10 {
                    writer
                        .create_bookmark(
                            &Guid::from(UNFILED_GUID),
                            &format!("https://t{}.example/{}", t, i),
                            None,
                            Some(0),
                        )
                        .unwrap();
                }
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }

    let reader = api.open_reader().unwrap();
    let tree = reader.get_bookmarks_tree(&Guid::from(UNFILED_GUID), true).unwrap().unwrap();
    let BookmarkItem::Folder(unfiled) = tree else { panic!("not a folder") };
    let nodes = unfiled.child_nodes.unwrap();
    assert_eq!(nodes.len(), 40);
    let positions: Vec<u32> = nodes.iter().map(BookmarkItem::position).collect();
    assert_eq!(positions, (0..40).collect::<Vec<u32>>());
}

#[test]
fn readers_work_in_parallel_with_the_writer() {
    let (_tmp, api) = open_store();
    let writer = api.get_writer();
    let readers: Vec<_> = (0..3).map(|_| api.open_reader().unwrap()).collect();

    let writer_thread = {
        let writer = Arc::clone(&writer);
        thread::spawn(move || {
            for i in 0..20 {
                let obs = VisitObservation::new(format!("https://w.example/{}", i))
                    .with_visit_type(VisitType::Link)
                    .with_at(Timestamp(1_000 + i));
                writer.apply_observation(obs).unwrap();
            }
        })
    };
    let reader_threads: Vec<_> = readers
        .into_iter()
        .map(|reader| {
            thread::spawn(move || {
                for _ in 0..20 {
                    let count = reader.get_visit_count(VisitTransitionSet::empty()).unwrap();
                    assert!((0..=20).contains(&count));
                }
            })
        })
        .collect();

    writer_thread.join().unwrap();
    for r in reader_threads {
        r.join().unwrap();
    }
    let urls: Vec<String> = (0..25).map(|i| format!("https://w.example/{}", i)).collect();
    let visited = api.open_reader().unwrap().get_visited(&urls).unwrap();
    assert_eq!(visited.iter().filter(|v| **v).count(), 20);
    assert_eq!(visited.len(), 25);
}

#[test]
fn manager_resets_sync_metadata() {
    let (_tmp, api) = open_store();
    let writer = api.get_writer();
    writer
        .apply_observation(VisitObservation::new("https://a.example/").with_visit_type(VisitType::Typed))
        .unwrap();
    api.reset_history_sync_metadata().unwrap();
    api.reset_bookmark_sync_metadata().unwrap();
    assert_eq!(writer.get_visit_count(VisitTransitionSet::empty()), Ok(1));
}

#[test]
fn history_and_metadata_through_sessions() {
    let (_tmp, api) = open_store();
    let writer = api.get_writer();
    writer
        .apply_observation(
            VisitObservation::new("https://news.example/")
                .with_title("News")
                .with_visit_type(VisitType::Typed)
                .with_at(Timestamp::now()),
        )
        .unwrap();
    let key = HistoryMetadataKey::new("https://news.example/");
    writer
        .note_history_metadata_observation_view_time(key.clone(), Some(30))
        .unwrap();

    let reader = api.open_reader().unwrap();
    assert_eq!(reader.get_visited(&["https://news.example/".to_string(), "%%".to_string()]).unwrap(), vec![true, false]);
    let meta = reader.get_latest_history_metadata_for_url("https://news.example/").unwrap().unwrap();
    assert_eq!(meta.total_view_time, 30);
    assert_eq!(reader.match_url("news").unwrap().map(|u| u.to_string()), Some("https://news.example/".to_string()));

    writer.delete_history_metadata(key).unwrap();
    assert!(reader.get_latest_history_metadata_for_url("https://news.example/").unwrap().is_none());

    assert_eq!(writer.delete_everything_history(), Ok(true));
    assert!(writer.deletion_high_water_mark().unwrap().is_some());
    assert_eq!(reader.get_visited(&["https://news.example/".to_string()]).unwrap(), vec![false]);
    writer.run_maintenance().unwrap();
}
