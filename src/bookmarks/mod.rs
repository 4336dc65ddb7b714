// Bookmark tree model
//
// Folders, bookmarks and separators live in moz_bookmarks. Sibling order is
// the dense 0-based `position` column; every mutation keeps it gap-free.

pub mod fetch;
pub mod mutation;


use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::constants::{
    BOOKMARK_TYPE_BOOKMARK, BOOKMARK_TYPE_FOLDER, BOOKMARK_TYPE_SEPARATOR,
    META_BOOKMARKS_LAST_SYNC, META_BOOKMARKS_SYNC_ID, ROOT_GUID, ROOT_GUIDS, SYNC_STATUS_NEW,
};
use crate::db;
use crate::error::{Error, Result};
use crate::types::{Guid, Timestamp};

pub use fetch::{
    fetch_tree, get_bookmark_by_guid, get_bookmarks_with_url, get_recent_bookmarks,
    get_url_for_keyword, search_bookmarks,
};
pub use mutation::{delete_bookmark, insert_bookmark, set_keyword, update_bookmark};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookmarkType {
    Bookmark,
    Folder,
    Separator,
}

impl BookmarkType {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            BOOKMARK_TYPE_BOOKMARK => Some(BookmarkType::Bookmark),
            BOOKMARK_TYPE_FOLDER => Some(BookmarkType::Folder),
            BOOKMARK_TYPE_SEPARATOR => Some(BookmarkType::Separator),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            BookmarkType::Bookmark => BOOKMARK_TYPE_BOOKMARK,
            BookmarkType::Folder => BOOKMARK_TYPE_FOLDER,
            BookmarkType::Separator => BOOKMARK_TYPE_SEPARATOR,
        }
    }
}

/// Where to put a node among its new siblings. Resolved when the edit is
/// applied, against the parent's child count at that moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookmarkPosition {
    #[default]
    Append,
    Specific(u32),
}

impl BookmarkPosition {
    pub fn from_option(pos: Option<u32>) -> Self {
        pos.map_or(BookmarkPosition::Append, BookmarkPosition::Specific)
    }

    /// Resolve against a parent with `child_count` children, clamped to
    /// `[0, child_count]`.
    pub fn resolve(self, child_count: u32) -> u32 {
        match self {
            BookmarkPosition::Append => child_count,
            BookmarkPosition::Specific(p) => p.min(child_count),
        }
    }
}

pub fn is_root(guid: &Guid) -> bool {
    ROOT_GUIDS.contains(&guid.as_str())
}

pub fn is_top_root(guid: &Guid) -> bool {
    guid.as_str() == ROOT_GUID
}

// ----- Fetched items -----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkData {
    pub guid: Guid,
    pub parent_guid: Guid,
    pub position: u32,
    pub date_added: Timestamp,
    pub last_modified: Timestamp,
    pub url: Url,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Separator {
    pub guid: Guid,
    pub parent_guid: Guid,
    pub position: u32,
    pub date_added: Timestamp,
    pub last_modified: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub guid: Guid,
    /// `None` only for the top root.
    pub parent_guid: Option<Guid>,
    pub position: u32,
    pub date_added: Timestamp,
    pub last_modified: Timestamp,
    pub title: Option<String>,
    pub child_guids: Option<Vec<Guid>>,
    pub child_nodes: Option<Vec<BookmarkItem>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BookmarkItem {
    Bookmark(BookmarkData),
    Separator(Separator),
    Folder(Folder),
}

impl BookmarkItem {
    pub fn guid(&self) -> &Guid {
        match self {
            BookmarkItem::Bookmark(b) => &b.guid,
            BookmarkItem::Separator(s) => &s.guid,
            BookmarkItem::Folder(f) => &f.guid,
        }
    }

    pub fn parent_guid(&self) -> Option<&Guid> {
        match self {
            BookmarkItem::Bookmark(b) => Some(&b.parent_guid),
            BookmarkItem::Separator(s) => Some(&s.parent_guid),
            BookmarkItem::Folder(f) => f.parent_guid.as_ref(),
        }
    }

    pub fn position(&self) -> u32 {
        match self {
            BookmarkItem::Bookmark(b) => b.position,
            BookmarkItem::Separator(s) => s.position,
            BookmarkItem::Folder(f) => f.position,
        }
    }

    pub fn bookmark_type(&self) -> BookmarkType {
        match self {
            BookmarkItem::Bookmark(_) => BookmarkType::Bookmark,
            BookmarkItem::Separator(_) => BookmarkType::Separator,
            BookmarkItem::Folder(_) => BookmarkType::Folder,
        }
    }

    pub fn title(&self) -> Option<&str> {
        match self {
            BookmarkItem::Bookmark(b) => b.title.as_deref(),
            BookmarkItem::Folder(f) => f.title.as_deref(),
            BookmarkItem::Separator(_) => None,
        }
    }
}

// ----- Insert / update requests -----

#[derive(Debug, Clone, PartialEq)]
pub struct InsertableBookmark {
    pub parent_guid: Guid,
    pub position: BookmarkPosition,
    pub url: String,
    pub title: Option<String>,
    pub guid: Option<Guid>,
    pub date_added: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertableFolder {
    pub parent_guid: Guid,
    pub position: BookmarkPosition,
    pub title: Option<String>,
    pub guid: Option<Guid>,
    pub date_added: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertableSeparator {
    pub parent_guid: Guid,
    pub position: BookmarkPosition,
    pub guid: Option<Guid>,
    pub date_added: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InsertableBookmarkItem {
    Bookmark(InsertableBookmark),
    Folder(InsertableFolder),
    Separator(InsertableSeparator),
}

impl InsertableBookmarkItem {
    pub fn parent_guid(&self) -> &Guid {
        match self {
            InsertableBookmarkItem::Bookmark(b) => &b.parent_guid,
            InsertableBookmarkItem::Folder(f) => &f.parent_guid,
            InsertableBookmarkItem::Separator(s) => &s.parent_guid,
        }
    }

    pub fn position(&self) -> BookmarkPosition {
        match self {
            InsertableBookmarkItem::Bookmark(b) => b.position,
            InsertableBookmarkItem::Folder(f) => f.position,
            InsertableBookmarkItem::Separator(s) => s.position,
        }
    }

    pub fn guid(&self) -> Option<&Guid> {
        match self {
            InsertableBookmarkItem::Bookmark(b) => b.guid.as_ref(),
            InsertableBookmarkItem::Folder(f) => f.guid.as_ref(),
            InsertableBookmarkItem::Separator(s) => s.guid.as_ref(),
        }
    }

    pub fn date_added(&self) -> Option<Timestamp> {
        match self {
            InsertableBookmarkItem::Bookmark(b) => b.date_added,
            InsertableBookmarkItem::Folder(f) => f.date_added,
            InsertableBookmarkItem::Separator(s) => s.date_added,
        }
    }

    pub fn bookmark_type(&self) -> BookmarkType {
        match self {
            InsertableBookmarkItem::Bookmark(_) => BookmarkType::Bookmark,
            InsertableBookmarkItem::Folder(_) => BookmarkType::Folder,
            InsertableBookmarkItem::Separator(_) => BookmarkType::Separator,
        }
    }
}

/// A single edit: optional move (parent and/or position) plus optional field
/// changes. Fields left `None` are untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookmarkUpdateInfo {
    pub guid: Guid,
    pub parent_guid: Option<Guid>,
    pub position: Option<u32>,
    pub title: Option<String>,
    pub url: Option<String>,
}

// ----- Raw rows -----

/// One moz_bookmarks row joined with its parent and URL.
#[derive(Debug, Clone)]
pub(crate) struct RawBookmark {
    pub row_id: i64,
    pub parent_id: Option<i64>,
    pub parent_guid: Option<Guid>,
    pub position: u32,
    pub bookmark_type: BookmarkType,
    pub date_added: Timestamp,
    pub last_modified: Timestamp,
    pub guid: Guid,
    pub title: Option<String>,
    pub url: Option<String>,
    pub child_count: u32,
}

pub(crate) const RAW_BOOKMARK_SQL: &str = "
    SELECT b.id, b.parent, p.guid, b.position, b.type, b.date_added, b.last_modified,
           b.guid, b.title, h.url,
           (SELECT COUNT(*) FROM moz_bookmarks c WHERE c.parent = b.id)
    FROM moz_bookmarks b
    LEFT JOIN moz_bookmarks p ON p.id = b.parent
    LEFT JOIN moz_places h ON h.id = b.fk";

impl RawBookmark {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let type_code: u8 = row.get(4)?;
        let bookmark_type = BookmarkType::from_code(type_code).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                4,
                rusqlite::types::Type::Integer,
                format!("unknown bookmark type {}", type_code).into(),
            )
        })?;
        Ok(Self {
            row_id: row.get(0)?,
            parent_id: row.get(1)?,
            parent_guid: row.get(2)?,
            position: row.get(3)?,
            bookmark_type,
            date_added: row.get(5)?,
            last_modified: row.get(6)?,
            guid: row.get(7)?,
            title: row.get(8)?,
            url: row.get(9)?,
            child_count: row.get(10)?,
        })
    }

    /// Convert to a fetched item without children.
    pub(crate) fn into_item(self) -> Result<BookmarkItem> {
        if self.bookmark_type == BookmarkType::Folder {
            return Ok(BookmarkItem::Folder(Folder {
                guid: self.guid,
                parent_guid: self.parent_guid,
                position: self.position,
                date_added: self.date_added,
                last_modified: self.last_modified,
                title: self.title,
                child_guids: None,
                child_nodes: None,
            }));
        }
        let parent_guid = match self.parent_guid {
            Some(p) => p,
            None => return Err(Error::Corruption(format!("{} has no parent", self.guid))),
        };
        if self.bookmark_type == BookmarkType::Separator {
            return Ok(BookmarkItem::Separator(Separator {
                guid: self.guid,
                parent_guid,
                position: self.position,
                date_added: self.date_added,
                last_modified: self.last_modified,
            }));
        }
        let url = match self.url.as_deref().map(Url::parse) {
            Some(Ok(url)) => url,
            Some(Err(e)) => {
                return Err(Error::Corruption(format!("bookmark {} has a bad URL: {}", self.guid, e)))
            }
            None => return Err(Error::Corruption(format!("bookmark {} has no URL", self.guid))),
        };
        Ok(BookmarkItem::Bookmark(BookmarkData {
            guid: self.guid,
            parent_guid,
            position: self.position,
            date_added: self.date_added,
            last_modified: self.last_modified,
            url,
            title: self.title,
        }))
    }
}

pub(crate) fn get_raw_bookmark(conn: &Connection, guid: &Guid) -> Result<Option<RawBookmark>> {
    let sql = format!("{} WHERE b.guid = ?1", RAW_BOOKMARK_SQL);
    let raw = conn
        .query_row(&sql, params![guid], RawBookmark::from_row)
        .optional()?;
    Ok(raw)
}

pub(crate) fn child_guids(conn: &Connection, parent_id: i64) -> Result<Vec<Guid>> {
    let mut stmt =
        conn.prepare_cached("SELECT guid FROM moz_bookmarks WHERE parent = ?1 ORDER BY position")?;
    let guids = stmt
        .query_map(params![parent_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<Guid>, _>>()?;
    Ok(guids)
}

/// Forget everything we know about bookmark sync: the next sync behaves like
/// a first sync.
pub fn reset_sync_metadata(conn: &Connection) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE moz_bookmarks SET sync_change_counter = 1, sync_status = ?1",
        params![SYNC_STATUS_NEW],
    )?;
    db::delete_meta(&tx, META_BOOKMARKS_LAST_SYNC)?;
    db::delete_meta(&tx, META_BOOKMARKS_SYNC_ID)?;
    tx.commit()?;
    log::info!("Reset bookmark sync metadata");
    Ok(())
}
