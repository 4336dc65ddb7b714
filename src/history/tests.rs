use super::metadata::{self, HistoryHighlightWeights, HistoryMetadataKey, HistoryMetadataObservation};
use super::*;
use crate::bookmarks::{self, InsertableBookmark, InsertableBookmarkItem};
use crate::constants::UNFILED_GUID;
use crate::db::test_connection;
use crate::error::{Error, InvalidPlaceInfo};
use crate::types::DocumentType;

const DAY: i64 = 24 * 60 * 60 * 1000;

fn visit_at(conn: &Connection, url: &str, at: i64, visit_type: VisitType) {
    let obs = VisitObservation::new(url).with_visit_type(visit_type).with_at(Timestamp(at));
    apply_observation(conn, &obs).unwrap();
}

fn place_count(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM moz_places", [], |r| r.get(0)).unwrap()
}

fn bookmark(conn: &Connection, url: &str) {
    bookmarks::insert_bookmark(
        conn,
        InsertableBookmarkItem::Bookmark(InsertableBookmark {
            parent_guid: Guid::from(UNFILED_GUID),
            position: Default::default(),
            url: url.to_string(),
            title: None,
            guid: None,
            date_added: None,
        }),
    )
    .unwrap();
}

#[test]
fn observation_records_visit_and_title() {
    let conn = test_connection();
    let obs = VisitObservation::new("https://example.com/")
        .with_title("Example")
        .with_visit_type(VisitType::Typed)
        .with_at(Timestamp(1_000));
    apply_observation(&conn, &obs).unwrap();

    let infos = get_visit_infos(&conn, Timestamp(0), Timestamp(2_000), VisitTransitionSet::empty()).unwrap();
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].url.as_str(), "https://example.com/");
    assert_eq!(infos[0].title.as_deref(), Some("Example"));
    assert_eq!(infos[0].visit_type, VisitType::Typed);
    assert!(!infos[0].is_remote);
    assert!(!infos[0].is_hidden);
}

#[test]
fn error_pages_and_title_only_observations_record_no_visit() {
    let conn = test_connection();
    let mut obs = VisitObservation::new("https://example.com/broken").with_visit_type(VisitType::Link);
    obs.is_error = true;
    apply_observation(&conn, &obs).unwrap();
    apply_observation(&conn, &VisitObservation::new("https://example.com/t").with_title("T")).unwrap();
    assert_eq!(get_visit_count(&conn, VisitTransitionSet::empty()).unwrap(), 0);
}

#[test]
fn bad_observation_url_is_rejected() {
    let conn = test_connection();
    let err = apply_observation(&conn, &VisitObservation::new("not a url")).unwrap_err();
    assert!(matches!(err, Error::UrlParse(_)));
}

#[test]
fn redirect_sources_are_hidden_until_visited_normally() {
    let conn = test_connection();
    let mut obs = VisitObservation::new("https://r.example/")
        .with_visit_type(VisitType::Link)
        .with_at(Timestamp(10));
    obs.is_redirect_source = true;
    apply_observation(&conn, &obs).unwrap();
    assert_eq!(get_visit_count(&conn, VisitTransitionSet::empty()).unwrap(), 0);

    visit_at(&conn, "https://r.example/", 20, VisitType::Typed);
    assert_eq!(get_visit_count(&conn, VisitTransitionSet::empty()).unwrap(), 2);
}

#[test]
fn visit_infos_respect_range_and_exclusions() {
    let conn = test_connection();
    visit_at(&conn, "https://a.example/", 100, VisitType::Link);
    visit_at(&conn, "https://b.example/", 200, VisitType::Reload);
    visit_at(&conn, "https://c.example/", 300, VisitType::Link);

    let all = get_visit_infos(&conn, Timestamp(0), Timestamp(250), VisitTransitionSet::empty()).unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].timestamp, Timestamp(100));

    let no_reload =
        get_visit_infos(&conn, Timestamp(0), Timestamp(1_000), VisitTransitionSet::of(&[VisitType::Reload])).unwrap();
    assert_eq!(no_reload.len(), 2);
    assert!(no_reload.iter().all(|v| v.visit_type == VisitType::Link));

    assert_eq!(get_visit_count(&conn, VisitTransitionSet::of(&[VisitType::Link])).unwrap(), 1);
}

#[test]
fn visited_urls_in_range_can_skip_remote() {
    let conn = test_connection();
    visit_at(&conn, "https://local.example/", 100, VisitType::Link);
    let mut remote = VisitObservation::new("https://remote.example/")
        .with_visit_type(VisitType::Link)
        .with_at(Timestamp(100));
    remote.is_remote = true;
    apply_observation(&conn, &remote).unwrap();

    let all = get_visited_urls_in_range(&conn, Timestamp(0), Timestamp(200), true).unwrap();
    assert_eq!(all.len(), 2);
    let local = get_visited_urls_in_range(&conn, Timestamp(0), Timestamp(200), false).unwrap();
    assert_eq!(local.len(), 1);
    assert_eq!(local[0].as_str(), "https://local.example/");
}

#[test]
fn paging_continues_without_duplicates() {
    let conn = test_connection();
    // Three visits share timestamp 500 so a page boundary falls inside them.
    visit_at(&conn, "https://a.example/", 600, VisitType::Link);
    visit_at(&conn, "https://b.example/", 500, VisitType::Link);
    visit_at(&conn, "https://c.example/", 500, VisitType::Link);
    visit_at(&conn, "https://d.example/", 500, VisitType::Link);
    visit_at(&conn, "https://e.example/", 400, VisitType::Link);

    let mut seen = Vec::new();
    let mut bound = i64::MAX;
    let mut offset = 0;
    loop {
        let page = get_visit_page_with_bound(&conn, bound, offset, 2, VisitTransitionSet::empty()).unwrap();
        if page.infos.is_empty() {
            assert_eq!((page.bound, page.offset), (0, 0));
            break;
        }
        seen.extend(page.infos.iter().map(|i| i.url.to_string()));
        bound = page.bound;
        offset = page.offset;
    }
    assert_eq!(seen.len(), 5);
    let mut dedup = seen.clone();
    dedup.sort();
    dedup.dedup();
    assert_eq!(dedup.len(), 5);
    assert_eq!(seen[0], "https://a.example/");
    assert_eq!(seen[4], "https://e.example/");
}

#[test]
fn get_visited_preserves_length_and_ignores_garbage() {
    let conn = test_connection();
    visit_at(&conn, "https://seen.example/", 100, VisitType::Link);
    let urls = vec![
        "https://seen.example/".to_string(),
        "not a url".to_string(),
        "https://unseen.example/".to_string(),
        "HTTPS://SEEN.example/".to_string(),
    ];
    let visited = get_visited(&conn, &urls, &SqlInterruptScope::dummy()).unwrap();
    assert_eq!(visited, vec![true, false, false, true]);
    assert!(get_visited(&conn, &[], &SqlInterruptScope::dummy()).unwrap().is_empty());
}

#[test]
fn interrupted_scope_stops_get_visited() {
    let conn = test_connection();
    let handle = crate::interrupt::SqlInterruptHandle::new(&conn);
    let scope = handle.begin_interrupt_scope();
    handle.interrupt();
    let err = get_visited(&conn, &["https://x.example/".to_string()], &scope).unwrap_err();
    assert!(matches!(err, Error::Interrupted(_)));
}

#[test]
fn top_sites_honor_threshold() {
    let conn = test_connection();
    let now = Timestamp::now().as_millis();
    visit_at(&conn, "https://once.example/", now, VisitType::Link);
    visit_at(&conn, "https://often.example/", now, VisitType::Link);
    visit_at(&conn, "https://often.example/", now - 1, VisitType::Link);

    let all = get_top_frecent_site_infos(&conn, 10, FrecencyThresholdOption::None).unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].url.as_str(), "https://often.example/");

    let skipped = get_top_frecent_site_infos(&conn, 10, FrecencyThresholdOption::SkipOneTimePages).unwrap();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].url.as_str(), "https://often.example/");
}

#[test]
fn deleting_visits_for_url_removes_place_unless_bookmarked() {
    let conn = test_connection();
    visit_at(&conn, "https://gone.example/", 100, VisitType::Link);
    visit_at(&conn, "https://kept.example/", 100, VisitType::Link);
    bookmark(&conn, "https://kept.example/");
    assert_eq!(place_count(&conn), 2);

    delete_visits_for(&conn, "https://gone.example/").unwrap();
    delete_visits_for(&conn, "https://kept.example/").unwrap();
    assert_eq!(place_count(&conn), 1);
    assert_eq!(get_visit_count(&conn, VisitTransitionSet::empty()).unwrap(), 0);

    let bookmarked = bookmarks::get_bookmarks_with_url(&conn, "https://kept.example/").unwrap();
    assert_eq!(bookmarked.len(), 1);
}

#[test]
fn delete_single_visit_and_range() {
    let conn = test_connection();
    visit_at(&conn, "https://a.example/", 100, VisitType::Link);
    visit_at(&conn, "https://a.example/", 200, VisitType::Link);
    visit_at(&conn, "https://b.example/", 300, VisitType::Link);

    delete_visit(&conn, "https://a.example/", Timestamp(100)).unwrap();
    assert_eq!(get_visit_count(&conn, VisitTransitionSet::empty()).unwrap(), 2);

    delete_visits_between(&conn, Timestamp(150), Timestamp(250)).unwrap();
    assert_eq!(get_visit_count(&conn, VisitTransitionSet::empty()).unwrap(), 1);
    assert_eq!(place_count(&conn), 1);

    assert!(matches!(delete_visit(&conn, "::", Timestamp(1)), Err(Error::UrlParse(_))));
}

#[test]
fn wipe_is_idempotent() {
    let conn = test_connection();
    visit_at(&conn, "https://a.example/", 100, VisitType::Link);
    bookmark(&conn, "https://b.example/");

    assert!(wipe_local_history(&conn).unwrap());
    assert!(!wipe_local_history(&conn).unwrap());
    assert_eq!(place_count(&conn), 1, "bookmarked place survives");
    assert_eq!(deletion_high_water_mark(&conn).unwrap(), None);
}

#[test]
fn delete_everything_records_high_water_mark() {
    let conn = test_connection();
    visit_at(&conn, "https://a.example/", 100, VisitType::Link);
    let before = Timestamp::now();
    assert!(delete_everything(&conn).unwrap());
    let mark = deletion_high_water_mark(&conn).unwrap().unwrap();
    assert!(mark >= before);
    assert_eq!(get_visit_count(&conn, VisitTransitionSet::empty()).unwrap(), 0);
}

#[test]
fn prune_drops_old_and_excess_visits() {
    let conn = test_connection();
    let now = Timestamp::now().as_millis();
    visit_at(&conn, "https://old.example/", now - 200 * DAY, VisitType::Link);
    for i in 0..5 {
        visit_at(&conn, "https://new.example/", now - i, VisitType::Link);
    }
    let options = StoreOptions {
        prune_visit_age_days: 90,
        prune_max_visits: 3,
        ..StoreOptions::default()
    };
    let removed = prune_destructively(&conn, &options, &SqlInterruptScope::dummy()).unwrap();
    assert_eq!(removed, 3);
    assert_eq!(get_visit_count(&conn, VisitTransitionSet::empty()).unwrap(), 3);
    assert_eq!(place_count(&conn), 1);
}

#[test]
fn reset_sync_metadata_clears_tombstones_and_meta() {
    let conn = test_connection();
    db::put_meta(&conn, META_HISTORY_LAST_SYNC, &123i64).unwrap();
    conn.execute("INSERT INTO moz_places_tombstones (guid) VALUES ('aaaaaaaaaaaa')", []).unwrap();
    reset_sync_metadata(&conn).unwrap();
    assert_eq!(db::get_meta::<i64>(&conn, META_HISTORY_LAST_SYNC).unwrap(), None);
    let tombstones: i64 = conn
        .query_row("SELECT COUNT(*) FROM moz_places_tombstones", [], |r| r.get(0))
        .unwrap();
    assert_eq!(tombstones, 0);
}

// ----- metadata -----

fn key(url: &str, search: Option<&str>, referrer: Option<&str>) -> HistoryMetadataKey {
    HistoryMetadataKey {
        url: url.to_string(),
        search_term: search.map(str::to_string),
        referrer_url: referrer.map(str::to_string),
    }
}

#[test]
fn metadata_observations_merge() {
    let conn = test_connection();
    let k = key("https://m.example/", Some("Cats"), Some("https://search.example/"));
    metadata::note_observation(&conn, &HistoryMetadataObservation::view_time(k.clone(), Some(100))).unwrap();
    metadata::note_observation(&conn, &HistoryMetadataObservation::view_time(k.clone(), Some(50))).unwrap();
    metadata::note_observation(&conn, &HistoryMetadataObservation::document_type(k.clone(), DocumentType::Media))
        .unwrap();
    metadata::note_observation(&conn, &HistoryMetadataObservation::title(k, "Cat video")).unwrap();

    let m = metadata::get_latest_for_url(&conn, "https://m.example/").unwrap().unwrap();
    assert_eq!(m.total_view_time, 150);
    assert_eq!(m.document_type, DocumentType::Media);
    assert_eq!(m.title.as_deref(), Some("Cat video"));
    assert_eq!(m.search_term.as_deref(), Some("cats"));
    assert_eq!(m.referrer_url.as_deref(), Some("https://search.example/"));

    // A different key is a different record.
    metadata::note_observation(
        &conn,
        &HistoryMetadataObservation::view_time(key("https://m.example/", None, None), Some(1)),
    )
    .unwrap();
    assert_eq!(metadata::get_since(&conn, Timestamp(0)).unwrap().len(), 2);
}

#[test]
fn metadata_latest_rejects_bad_url() {
    let conn = test_connection();
    let err = metadata::get_latest_for_url(&conn, "not a url").unwrap_err();
    assert!(matches!(err, Error::InvalidPlaceInfo(InvalidPlaceInfo::InvalidInput(_))));
    assert!(metadata::get_latest_for_url(&conn, "https://none.example/").unwrap().is_none());
}

#[test]
fn metadata_query_and_ranges() {
    let conn = test_connection();
    metadata::note_observation(
        &conn,
        &HistoryMetadataObservation::title(key("https://rust.example/book", None, None), "The Rust Book"),
    )
    .unwrap();
    metadata::note_observation(
        &conn,
        &HistoryMetadataObservation::view_time(key("https://other.example/", Some("rust book"), None), Some(5)),
    )
    .unwrap();

    assert_eq!(metadata::query(&conn, "rust book", 10).unwrap().len(), 2);
    assert_eq!(metadata::query(&conn, "rust", 1).unwrap().len(), 1);
    assert!(metadata::query(&conn, "", 10).unwrap().is_empty());

    let now = Timestamp::now();
    assert_eq!(metadata::get_between(&conn, Timestamp(0), Timestamp(now.0 + DAY)).unwrap().len(), 2);
    assert!(metadata::get_between(&conn, Timestamp(0), Timestamp(1)).unwrap().is_empty());
}

#[test]
fn highlights_rank_by_weights() {
    let conn = test_connection();
    metadata::note_observation(
        &conn,
        &HistoryMetadataObservation::view_time(key("https://long.example/", None, None), Some(1_000)),
    )
    .unwrap();
    for term in ["a", "b", "c"] {
        metadata::note_observation(
            &conn,
            &HistoryMetadataObservation::view_time(key("https://often.example/", Some(term), None), Some(10)),
        )
        .unwrap();
    }

    let by_view = metadata::get_highlights(&conn, HistoryHighlightWeights { view_time: 1.0, frequency: 0.0 }, 10).unwrap();
    assert_eq!(by_view[0].url, "https://long.example/");
    let by_freq = metadata::get_highlights(&conn, HistoryHighlightWeights { view_time: 0.0, frequency: 1.0 }, 1).unwrap();
    assert_eq!(by_freq.len(), 1);
    assert_eq!(by_freq[0].url, "https://often.example/");
}

#[test]
fn metadata_deletes() {
    let conn = test_connection();
    let k = key("https://d.example/", Some("term"), None);
    metadata::note_observation(&conn, &HistoryMetadataObservation::view_time(k.clone(), Some(1))).unwrap();
    metadata::note_observation(
        &conn,
        &HistoryMetadataObservation::view_time(key("https://d.example/", None, None), Some(1)),
    )
    .unwrap();

    metadata::delete_metadata(&conn, &k).unwrap();
    let left = metadata::get_since(&conn, Timestamp(0)).unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].search_term, None);
    let terms: i64 = conn
        .query_row("SELECT COUNT(*) FROM moz_places_metadata_search_queries", [], |r| r.get(0))
        .unwrap();
    assert_eq!(terms, 0);

    let removed = metadata::delete_older_than(&conn, Timestamp(Timestamp::now().0 + DAY)).unwrap();
    assert_eq!(removed, 1);
    assert!(metadata::get_since(&conn, Timestamp(0)).unwrap().is_empty());
}
