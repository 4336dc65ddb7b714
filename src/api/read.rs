// Read session: one read-only connection behind a FIFO queue

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rusqlite::Connection;
use url::Url;

use crate::bookmarks::{self, BookmarkData, BookmarkItem};
use crate::error::{ApiResult, PlacesApiError, Result};
use crate::history::metadata::{self, HistoryHighlight, HistoryHighlightWeights, HistoryMetadata};
use crate::history::{self, HistoryVisitInfo, HistoryVisitInfosWithBound, TopFrecentSiteInfo};
use crate::interrupt::{SqlInterruptHandle, SqlInterruptScope};
use crate::matcher::{self, SearchResult};
use crate::serial::SerialQueue;
use crate::types::{FrecencyThresholdOption, Guid, Timestamp, VisitTransitionSet};

/// A read-only view of the store. Operations on one connection run one at a
/// time, in the order they were called; separate connections run in
/// parallel.
///
/// Calling back into the same connection from inside one of its own
/// operations deadlocks.
pub struct PlacesReadConnection {
    conn: SerialQueue<Connection>,
    api_alive: Arc<AtomicBool>,
    interrupt_handle: Arc<SqlInterruptHandle>,
}

impl PlacesReadConnection {
    pub(crate) fn new(conn: Connection, api_alive: Arc<AtomicBool>) -> Self {
        let interrupt_handle = Arc::new(SqlInterruptHandle::new(&conn));
        Self {
            conn: SerialQueue::new(conn),
            api_alive,
            interrupt_handle,
        }
    }

    fn check_alive(&self) -> ApiResult<()> {
        if self.api_alive.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(PlacesApiError::SessionClosed)
        }
    }

    /// Run `f` on this session's connection once every earlier call has
    /// finished. The interrupt scope starts only when `f` gets the
    /// connection, so an interrupt never cancels calls still waiting in line.
    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection, &SqlInterruptScope) -> Result<T>,
    ) -> ApiResult<T> {
        self.check_alive()?;
        self.conn.run(|conn| {
            // The manager may have closed while we waited.
            self.check_alive()?;
            let scope = self.interrupt_handle.begin_interrupt_scope();
            f(conn, &scope).map_err(PlacesApiError::from)
        })
    }

    /// Abort whatever this session is doing. Never blocks and never fails.
    pub fn interrupt(&self) {
        self.interrupt_handle.interrupt();
    }

    /// The session's interrupt handle, for use from another thread.
    pub fn new_interrupt_handle(&self) -> Arc<SqlInterruptHandle> {
        Arc::clone(&self.interrupt_handle)
    }

    // ----- Bookmarks -----

    /// A single node; folders list their children's GUIDs only.
    pub fn get_bookmark(&self, guid: &Guid) -> ApiResult<Option<BookmarkItem>> {
        self.with_conn(|conn, _| bookmarks::get_bookmark_by_guid(conn, guid, false))
    }

    /// The subtree under `guid`: all of it when `recursive`, otherwise one
    /// level of children.
    pub fn get_bookmarks_tree(&self, guid: &Guid, recursive: bool) -> ApiResult<Option<BookmarkItem>> {
        self.with_conn(|conn, scope| {
            if recursive {
                bookmarks::fetch_tree(conn, guid, scope)
            } else {
                bookmarks::get_bookmark_by_guid(conn, guid, true)
            }
        })
    }

    pub fn get_bookmarks_with_url(&self, url: &str) -> ApiResult<Vec<BookmarkData>> {
        self.with_conn(|conn, _| bookmarks::get_bookmarks_with_url(conn, url))
    }

    pub fn get_bookmark_url_for_keyword(&self, keyword: &str) -> ApiResult<Option<Url>> {
        self.with_conn(|conn, _| bookmarks::get_url_for_keyword(conn, keyword))
    }

    pub fn search_bookmarks(&self, query: &str, limit: u32) -> ApiResult<Vec<BookmarkData>> {
        self.with_conn(|conn, _| bookmarks::search_bookmarks(conn, query, limit))
    }

    pub fn get_recent_bookmarks(&self, limit: u32) -> ApiResult<Vec<BookmarkData>> {
        self.with_conn(|conn, _| bookmarks::get_recent_bookmarks(conn, limit))
    }

    // ----- Matching -----

    pub fn get_top_frecent_site_infos(
        &self,
        num_items: i32,
        threshold: FrecencyThresholdOption,
    ) -> ApiResult<Vec<TopFrecentSiteInfo>> {
        self.with_conn(|conn, _| history::get_top_frecent_site_infos(conn, num_items, threshold))
    }

    pub fn match_url(&self, query: &str) -> ApiResult<Option<Url>> {
        self.with_conn(|conn, _| matcher::match_url(conn, query))
    }

    pub fn query_autocomplete(&self, search: &str, limit: u32) -> ApiResult<Vec<SearchResult>> {
        self.with_conn(|conn, _| matcher::query_autocomplete(conn, search, limit))
    }

    // ----- History -----

    pub fn get_visited_urls_in_range(
        &self,
        start: Timestamp,
        end: Timestamp,
        include_remote: bool,
    ) -> ApiResult<Vec<Url>> {
        self.with_conn(|conn, _| history::get_visited_urls_in_range(conn, start, end, include_remote))
    }

    pub fn get_visit_infos(
        &self,
        start: Timestamp,
        end: Timestamp,
        exclude_types: VisitTransitionSet,
    ) -> ApiResult<Vec<HistoryVisitInfo>> {
        self.with_conn(|conn, _| history::get_visit_infos(conn, start, end, exclude_types))
    }

    pub fn get_visit_count(&self, exclude_types: VisitTransitionSet) -> ApiResult<i64> {
        self.with_conn(|conn, _| history::get_visit_count(conn, exclude_types))
    }

    pub fn get_visit_page_with_bound(
        &self,
        bound: i64,
        offset: i64,
        count: i64,
        exclude_types: VisitTransitionSet,
    ) -> ApiResult<HistoryVisitInfosWithBound> {
        self.with_conn(|conn, _| history::get_visit_page_with_bound(conn, bound, offset, count, exclude_types))
    }

    /// One flag per input URL; malformed URLs are `false`.
    pub fn get_visited(&self, urls: &[String]) -> ApiResult<Vec<bool>> {
        self.with_conn(|conn, scope| history::get_visited(conn, urls, scope))
    }

    // ----- Metadata -----

    pub fn get_latest_history_metadata_for_url(&self, url: &str) -> ApiResult<Option<HistoryMetadata>> {
        self.with_conn(|conn, _| metadata::get_latest_for_url(conn, url))
    }

    pub fn get_history_metadata_since(&self, since: Timestamp) -> ApiResult<Vec<HistoryMetadata>> {
        self.with_conn(|conn, _| metadata::get_since(conn, since))
    }

    pub fn get_history_metadata_between(&self, start: Timestamp, end: Timestamp) -> ApiResult<Vec<HistoryMetadata>> {
        self.with_conn(|conn, _| metadata::get_between(conn, start, end))
    }

    pub fn query_history_metadata(&self, query: &str, limit: u32) -> ApiResult<Vec<HistoryMetadata>> {
        self.with_conn(|conn, _| metadata::query(conn, query, limit))
    }

    pub fn get_highlights(&self, weights: HistoryHighlightWeights, limit: u32) -> ApiResult<Vec<HistoryHighlight>> {
        self.with_conn(|conn, _| metadata::get_highlights(conn, weights, limit))
    }
}
