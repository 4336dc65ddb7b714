// Write session: the store's single read-write connection

use std::ops::Deref;

use crate::api::read::PlacesReadConnection;
use crate::bookmarks::{
    self, BookmarkPosition, BookmarkUpdateInfo, InsertableBookmark, InsertableBookmarkItem,
    InsertableFolder, InsertableSeparator,
};
use crate::db::maintenance;
use crate::error::ApiResult;
use crate::history::metadata::{self, HistoryMetadataKey, HistoryMetadataObservation};
use crate::history::{self, VisitObservation};
use crate::options::StoreOptions;
use crate::types::{DocumentType, Guid, Timestamp};

/// The one connection allowed to change the store. Everything a
/// `PlacesReadConnection` can do is available through `Deref`.
pub struct PlacesWriteConnection {
    reader: PlacesReadConnection,
    options: StoreOptions,
}

impl Deref for PlacesWriteConnection {
    type Target = PlacesReadConnection;

    fn deref(&self) -> &PlacesReadConnection {
        &self.reader
    }
}

impl PlacesWriteConnection {
    pub(crate) fn new(reader: PlacesReadConnection, options: StoreOptions) -> Self {
        Self { reader, options }
    }

    // ----- Bookmarks -----

    /// Insert any node. A caller-supplied GUID must be well formed and never
    /// used before.
    pub fn insert_bookmark(&self, item: InsertableBookmarkItem) -> ApiResult<Guid> {
        self.with_conn(|conn, _| bookmarks::insert_bookmark(conn, item))
    }

    pub fn create_folder(&self, parent_guid: &Guid, title: &str, position: Option<u32>) -> ApiResult<Guid> {
        self.insert_bookmark(InsertableBookmarkItem::Folder(InsertableFolder {
            parent_guid: parent_guid.clone(),
            position: BookmarkPosition::from_option(position),
            title: Some(title.to_string()),
            guid: None,
            date_added: None,
        }))
    }

    pub fn create_separator(&self, parent_guid: &Guid, position: Option<u32>) -> ApiResult<Guid> {
        self.insert_bookmark(InsertableBookmarkItem::Separator(InsertableSeparator {
            parent_guid: parent_guid.clone(),
            position: BookmarkPosition::from_option(position),
            guid: None,
            date_added: None,
        }))
    }

    pub fn create_bookmark(
        &self,
        parent_guid: &Guid,
        url: &str,
        title: Option<&str>,
        position: Option<u32>,
    ) -> ApiResult<Guid> {
        self.insert_bookmark(InsertableBookmarkItem::Bookmark(InsertableBookmark {
            parent_guid: parent_guid.clone(),
            position: BookmarkPosition::from_option(position),
            url: url.to_string(),
            title: title.map(str::to_string),
            guid: None,
            date_added: None,
        }))
    }

    /// Delete a node and everything under it. `Ok(false)` if it didn't exist.
    pub fn delete_bookmark_node(&self, guid: &Guid) -> ApiResult<bool> {
        self.with_conn(|conn, _| bookmarks::delete_bookmark(conn, guid))
    }

    pub fn update_bookmark_node(&self, update: BookmarkUpdateInfo) -> ApiResult<()> {
        self.with_conn(|conn, _| bookmarks::update_bookmark(conn, &update))
    }

    pub fn set_bookmark_keyword(&self, url: &str, keyword: &str) -> ApiResult<()> {
        self.with_conn(|conn, _| bookmarks::set_keyword(conn, url, keyword))
    }

    // ----- History -----

    pub fn apply_observation(&self, observation: VisitObservation) -> ApiResult<()> {
        self.with_conn(|conn, _| history::apply_observation(conn, &observation))
    }

    pub fn accept_result(&self, search_string: &str, url: &str) -> ApiResult<()> {
        self.with_conn(|conn, _| history::accept_result(conn, search_string, url))
    }

    pub fn delete_visits_for(&self, url: &str) -> ApiResult<()> {
        self.with_conn(|conn, _| history::delete_visits_for(conn, url))
    }

    pub fn delete_visits_between(&self, start: Timestamp, end: Timestamp) -> ApiResult<()> {
        self.with_conn(|conn, _| history::delete_visits_between(conn, start, end))
    }

    pub fn delete_visit(&self, url: &str, timestamp: Timestamp) -> ApiResult<()> {
        self.with_conn(|conn, _| history::delete_visit(conn, url, timestamp))
    }

    /// Returns whether anything was removed.
    pub fn wipe_local_history(&self) -> ApiResult<bool> {
        self.with_conn(|conn, _| history::wipe_local_history(conn))
    }

    /// Like `wipe_local_history`, and also keeps sync from restoring what
    /// was deleted.
    pub fn delete_everything_history(&self) -> ApiResult<bool> {
        self.with_conn(|conn, _| history::delete_everything(conn))
    }

    /// Returns the number of visits removed.
    pub fn prune_destructively(&self) -> ApiResult<usize> {
        self.with_conn(|conn, scope| history::prune_destructively(conn, &self.options, scope))
    }

    // ----- Metadata -----

    pub fn note_history_metadata_observation(&self, observation: HistoryMetadataObservation) -> ApiResult<()> {
        self.with_conn(|conn, _| metadata::note_observation(conn, &observation))
    }

    pub fn note_history_metadata_observation_view_time(
        &self,
        key: HistoryMetadataKey,
        view_time: Option<i32>,
    ) -> ApiResult<()> {
        self.note_history_metadata_observation(HistoryMetadataObservation::view_time(key, view_time))
    }

    pub fn note_history_metadata_observation_document_type(
        &self,
        key: HistoryMetadataKey,
        document_type: DocumentType,
    ) -> ApiResult<()> {
        self.note_history_metadata_observation(HistoryMetadataObservation::document_type(key, document_type))
    }

    pub fn note_history_metadata_observation_title(&self, key: HistoryMetadataKey, title: &str) -> ApiResult<()> {
        self.note_history_metadata_observation(HistoryMetadataObservation::title(key, title))
    }

    pub fn delete_history_metadata(&self, key: HistoryMetadataKey) -> ApiResult<()> {
        self.with_conn(|conn, _| metadata::delete_metadata(conn, &key))
    }

    pub fn delete_history_metadata_older_than(&self, older_than: Timestamp) -> ApiResult<()> {
        self.with_conn(|conn, _| metadata::delete_older_than(conn, older_than).map(|_| ()))
    }

    // ----- Housekeeping -----

    pub fn run_maintenance(&self) -> ApiResult<()> {
        self.with_conn(maintenance::run_maintenance)
    }

    /// When history was last deleted wholesale, if ever.
    pub fn deletion_high_water_mark(&self) -> ApiResult<Option<Timestamp>> {
        self.with_conn(|conn, _| history::deletion_high_water_mark(conn))
    }

    pub(crate) fn reset_history_sync_metadata(&self) -> ApiResult<()> {
        self.with_conn(|conn, _| history::reset_sync_metadata(conn))
    }

    pub(crate) fn reset_bookmark_sync_metadata(&self) -> ApiResult<()> {
        self.with_conn(|conn, _| bookmarks::reset_sync_metadata(conn))
    }
}
