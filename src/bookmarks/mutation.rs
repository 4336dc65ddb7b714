// Bookmark tree edits: insert, move/update, recursive delete, keywords
//
// Every entry point runs in one IMMEDIATE transaction so the position
// column stays dense even if a step fails halfway.

use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};

use super::{
    get_raw_bookmark, is_root, is_top_root, BookmarkPosition, BookmarkType, BookmarkUpdateInfo,
    InsertableBookmarkItem, RawBookmark,
};
use crate::error::{InvalidPlaceInfo, Result};
use crate::history;
use crate::types::{Guid, Timestamp};
use crate::url_util::{parse_url, truncate_title};

fn begin(conn: &Connection) -> Result<Transaction<'_>> {
    Ok(Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?)
}

/// Resolve a prospective parent: must exist, be a folder, and not be the
/// top root.
fn resolve_parent(conn: &Connection, parent_guid: &Guid) -> Result<RawBookmark> {
    if is_top_root(parent_guid) {
        return Err(InvalidPlaceInfo::CannotUpdateRoot(parent_guid.clone()).into());
    }
    let parent = get_raw_bookmark(conn, parent_guid)?
        .ok_or_else(|| InvalidPlaceInfo::NoSuchGuid(parent_guid.clone()))?;
    if parent.bookmark_type != BookmarkType::Folder {
        return Err(InvalidPlaceInfo::InvalidParent(format!("{} is not a folder", parent_guid)).into());
    }
    Ok(parent)
}

fn touch(conn: &Connection, id: i64, now: Timestamp) -> Result<()> {
    conn.execute(
        "UPDATE moz_bookmarks
         SET last_modified = ?2, sync_change_counter = sync_change_counter + 1
         WHERE id = ?1",
        params![id, now],
    )?;
    Ok(())
}

fn guid_in_use(conn: &Connection, guid: &Guid) -> Result<bool> {
    let used: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM moz_bookmarks WHERE guid = ?1)
             OR EXISTS(SELECT 1 FROM moz_bookmarks_deleted WHERE guid = ?1)",
        params![guid],
        |row| row.get(0),
    )?;
    Ok(used)
}

/// Insert a node and return its GUID.
pub fn insert_bookmark(conn: &Connection, item: InsertableBookmarkItem) -> Result<Guid> {
    let tx = begin(conn)?;

    let guid = match item.guid() {
        Some(guid) => {
            if !guid.is_valid() {
                return Err(InvalidPlaceInfo::InvalidGuid(guid.to_string()).into());
            }
            if guid_in_use(&tx, guid)? {
                return Err(InvalidPlaceInfo::DuplicateGuid(guid.clone()).into());
            }
            guid.clone()
        }
        None => Guid::random(),
    };

    let parent = resolve_parent(&tx, item.parent_guid())?;
    let position = item.position().resolve(parent.child_count);
    let now = Timestamp::now();
    let date_added = item.date_added().unwrap_or(now);

    let (fk, title) = match &item {
        InsertableBookmarkItem::Bookmark(b) => {
            let url = parse_url(&b.url)?;
            let place_id = history::get_or_insert_place(&tx, &url)?;
            (Some(place_id), b.title.as_deref().map(truncate_title))
        }
        InsertableBookmarkItem::Folder(f) => (None, f.title.as_deref().map(truncate_title)),
        InsertableBookmarkItem::Separator(_) => (None, None),
    };

    tx.execute(
        "UPDATE moz_bookmarks SET position = position + 1 WHERE parent = ?1 AND position >= ?2",
        params![parent.row_id, position],
    )?;
    tx.execute(
        "INSERT INTO moz_bookmarks (fk, type, parent, position, title, date_added, last_modified, guid)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, ?7)",
        params![fk, item.bookmark_type().code(), parent.row_id, position, title, date_added, guid],
    )?;
    touch(&tx, parent.row_id, now)?;
    if let Some(place_id) = fk {
        history::update_frecency(&tx, place_id)?;
    }

    tx.commit()?;
    log::debug!("Inserted {:?} {} into {} at {}", item.bookmark_type(), guid, parent.guid, position);
    Ok(guid)
}

/// Delete a node and its whole subtree. Returns false if `guid` is unknown.
pub fn delete_bookmark(conn: &Connection, guid: &Guid) -> Result<bool> {
    if is_root(guid) {
        return Err(InvalidPlaceInfo::CannotUpdateRoot(guid.clone()).into());
    }
    let tx = begin(conn)?;
    let node = match get_raw_bookmark(&tx, guid)? {
        Some(node) => node,
        None => return Ok(false),
    };

    const SUBTREE: &str = "WITH RECURSIVE subtree(id) AS (
             SELECT ?1
             UNION ALL
             SELECT b.id FROM moz_bookmarks b JOIN subtree s ON b.parent = s.id
         )";

    let now = Timestamp::now();
    let place_ids: Vec<i64> = {
        let mut stmt = tx.prepare(&format!(
            "{} SELECT DISTINCT fk FROM moz_bookmarks WHERE id IN (SELECT id FROM subtree) AND fk NOT NULL",
            SUBTREE
        ))?;
        let ids = stmt
            .query_map(params![node.row_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<i64>, _>>()?;
        ids
    };
    tx.execute(
        &format!(
            "{} INSERT OR IGNORE INTO moz_bookmarks_deleted (guid, date_removed)
             SELECT guid, ?2 FROM moz_bookmarks WHERE id IN (SELECT id FROM subtree)",
            SUBTREE
        ),
        params![node.row_id, now],
    )?;
    let removed = tx.execute(
        &format!("{} DELETE FROM moz_bookmarks WHERE id IN (SELECT id FROM subtree)", SUBTREE),
        params![node.row_id],
    )?;

    if let Some(parent_id) = node.parent_id {
        tx.execute(
            "UPDATE moz_bookmarks SET position = position - 1 WHERE parent = ?1 AND position > ?2",
            params![parent_id, node.position],
        )?;
        touch(&tx, parent_id, now)?;
    }
    for place_id in place_ids {
        history::refresh_place(&tx, place_id)?;
    }

    tx.commit()?;
    log::debug!("Deleted {} ({} nodes)", guid, removed);
    Ok(true)
}

fn is_in_subtree(conn: &Connection, ancestor_id: i64, candidate_id: i64) -> Result<bool> {
    let found: bool = conn.query_row(
        "WITH RECURSIVE subtree(id) AS (
             SELECT ?1
             UNION ALL
             SELECT b.id FROM moz_bookmarks b JOIN subtree s ON b.parent = s.id
         )
         SELECT EXISTS(SELECT 1 FROM subtree WHERE id = ?2)",
        params![ancestor_id, candidate_id],
        |row| row.get(0),
    )?;
    Ok(found)
}

/// Apply a move and/or field edit to one node.
///
/// - no parent, no position: fields only
/// - position only: reorder within the current parent
/// - same parent, no position: nothing moves
/// - new parent: move there, appending unless a position is given
///
/// Positions resolve against the destination's children, not counting the
/// node itself.
pub fn update_bookmark(conn: &Connection, update: &BookmarkUpdateInfo) -> Result<()> {
    if is_root(&update.guid) {
        return Err(InvalidPlaceInfo::CannotUpdateRoot(update.guid.clone()).into());
    }
    let tx = begin(conn)?;
    let node = get_raw_bookmark(&tx, &update.guid)?
        .ok_or_else(|| InvalidPlaceInfo::NoSuchGuid(update.guid.clone()))?;

    match node.bookmark_type {
        BookmarkType::Separator if update.title.is_some() || update.url.is_some() => {
            return Err(InvalidPlaceInfo::IllegalChange("separators have no title or URL".into()).into());
        }
        BookmarkType::Folder if update.url.is_some() => {
            return Err(InvalidPlaceInfo::IllegalChange("folders have no URL".into()).into());
        }
        _ => {}
    }

    let now = Timestamp::now();
    let old_parent_id = node
        .parent_id
        .ok_or_else(|| InvalidPlaceInfo::CannotUpdateRoot(update.guid.clone()))?;

    let destination = match (&update.parent_guid, update.position) {
        // A parent without a position appends, even when it is the current parent.
        (Some(parent_guid), position) => {
            let parent = resolve_parent(&tx, parent_guid)?;
            if node.bookmark_type == BookmarkType::Folder && is_in_subtree(&tx, node.row_id, parent.row_id)? {
                return Err(InvalidPlaceInfo::InvalidParent(format!(
                    "can't move {} into its own subtree (destination {})",
                    update.guid, parent_guid
                ))
                .into());
            }
            Some((parent.row_id, BookmarkPosition::from_option(position)))
        }
        (None, Some(position)) => Some((old_parent_id, BookmarkPosition::Specific(position))),
        (None, None) => None,
    };

    if let Some((dest_id, position)) = destination {
        tx.execute(
            "UPDATE moz_bookmarks SET position = position - 1 WHERE parent = ?1 AND position > ?2",
            params![old_parent_id, node.position],
        )?;
        let siblings: u32 = tx.query_row(
            "SELECT COUNT(*) FROM moz_bookmarks WHERE parent = ?1 AND id != ?2",
            params![dest_id, node.row_id],
            |row| row.get(0),
        )?;
        let new_position = position.resolve(siblings);
        tx.execute(
            "UPDATE moz_bookmarks SET position = position + 1
             WHERE parent = ?1 AND position >= ?2 AND id != ?3",
            params![dest_id, new_position, node.row_id],
        )?;
        tx.execute(
            "UPDATE moz_bookmarks SET parent = ?2, position = ?3 WHERE id = ?1",
            params![node.row_id, dest_id, new_position],
        )?;
        touch(&tx, old_parent_id, now)?;
        if dest_id != old_parent_id {
            touch(&tx, dest_id, now)?;
        }
    }

    if let Some(title) = &update.title {
        tx.execute(
            "UPDATE moz_bookmarks SET title = ?2 WHERE id = ?1",
            params![node.row_id, truncate_title(title)],
        )?;
    }

    if let Some(url) = &update.url {
        let url = parse_url(url)?;
        let place_id = history::get_or_insert_place(&tx, &url)?;
        let old_place_id: Option<i64> = tx
            .query_row("SELECT fk FROM moz_bookmarks WHERE id = ?1", params![node.row_id], |row| row.get(0))
            .optional()?
            .flatten();
        tx.execute("UPDATE moz_bookmarks SET fk = ?2 WHERE id = ?1", params![node.row_id, place_id])?;
        history::update_frecency(&tx, place_id)?;
        if let Some(old) = old_place_id.filter(|old| *old != place_id) {
            history::refresh_place(&tx, old)?;
        }
    }

    touch(&tx, node.row_id, now)?;
    tx.commit()?;
    log::debug!("Updated {}", update.guid);
    Ok(())
}

/// Associate `keyword` with a bookmarked URL, replacing any keyword the URL
/// or the keyword had before.
pub fn set_keyword(conn: &Connection, url: &str, keyword: &str) -> Result<()> {
    let keyword = keyword.trim().to_lowercase();
    if keyword.is_empty() || keyword.contains(char::is_whitespace) {
        return Err(InvalidPlaceInfo::InvalidInput(format!("bad keyword {:?}", keyword)).into());
    }
    let url = parse_url(url)?;
    let tx = begin(conn)?;
    let place_id: Option<i64> = tx
        .query_row(
            "SELECT h.id FROM moz_places h
             WHERE h.url = ?1 AND EXISTS(SELECT 1 FROM moz_bookmarks b WHERE b.fk = h.id)",
            params![url.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    let place_id = place_id
        .ok_or_else(|| InvalidPlaceInfo::InvalidInput(format!("{} is not bookmarked", url)))?;

    tx.execute("DELETE FROM moz_keywords WHERE place_id = ?1 OR keyword = ?2", params![place_id, keyword])?;
    tx.execute(
        "INSERT INTO moz_keywords (keyword, place_id) VALUES (?1, ?2)",
        params![keyword, place_id],
    )?;
    tx.commit()?;
    Ok(())
}
