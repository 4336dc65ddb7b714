// Bookmark queries: point lookups, subtree fetch, URL/keyword/search listings

use std::collections::HashMap;

use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use url::Url;

use super::{child_guids, get_raw_bookmark, BookmarkData, BookmarkItem, RawBookmark, RAW_BOOKMARK_SQL};
use crate::constants::BOOKMARK_TYPE_BOOKMARK;
use crate::error::Result;
use crate::interrupt::SqlInterruptScope;
use crate::matcher::{escape_like, split_tokens};
use crate::types::Guid;
use crate::url_util::normalize_for_lookup;

/// Fetch a single node. Folders get `child_guids`; with
/// `get_direct_children` they also get one level of `child_nodes`, whose
/// folders in turn carry only `child_guids`.
pub fn get_bookmark_by_guid(
    conn: &Connection,
    guid: &Guid,
    get_direct_children: bool,
) -> Result<Option<BookmarkItem>> {
    let raw = match get_raw_bookmark(conn, guid)? {
        Some(raw) => raw,
        None => return Ok(None),
    };
    let row_id = raw.row_id;
    let mut item = raw.into_item()?;

    if let BookmarkItem::Folder(folder) = &mut item {
        folder.child_guids = Some(child_guids(conn, row_id)?);
        if get_direct_children {
            let sql = format!("{} WHERE b.parent = ?1 ORDER BY b.position", RAW_BOOKMARK_SQL);
            let mut stmt = conn.prepare_cached(&sql)?;
            let children = stmt
                .query_map(params![row_id], RawBookmark::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            let mut nodes = Vec::with_capacity(children.len());
            for child in children {
                let child_id = child.row_id;
                let mut node = child.into_item()?;
                if let BookmarkItem::Folder(f) = &mut node {
                    f.child_guids = Some(child_guids(conn, child_id)?);
                }
                nodes.push(node);
            }
            folder.child_nodes = Some(nodes);
        }
    }
    Ok(Some(item))
}

/// Fetch the full subtree rooted at `guid`, depth-first in child order.
pub fn fetch_tree(conn: &Connection, guid: &Guid, scope: &SqlInterruptScope) -> Result<Option<BookmarkItem>> {
    let sql = format!(
        "WITH RECURSIVE descendants(id) AS (
             SELECT id FROM moz_bookmarks WHERE guid = ?1
             UNION ALL
             SELECT c.id FROM moz_bookmarks c JOIN descendants d ON c.parent = d.id
         )
         {} WHERE b.id IN (SELECT id FROM descendants) ORDER BY b.parent, b.position",
        RAW_BOOKMARK_SQL
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params![guid])?;

    let mut root: Option<RawBookmark> = None;
    let mut by_parent: HashMap<i64, Vec<RawBookmark>> = HashMap::new();
    while let Some(row) = rows.next()? {
        scope.err_if_interrupted()?;
        let raw = RawBookmark::from_row(row)?;
        if &raw.guid == guid {
            root = Some(raw);
        } else if let Some(parent_id) = raw.parent_id {
            by_parent.entry(parent_id).or_default().push(raw);
        }
    }

    match root {
        Some(root) => Ok(Some(build_subtree(root, &mut by_parent, scope)?)),
        None => Ok(None),
    }
}

fn build_subtree(
    raw: RawBookmark,
    by_parent: &mut HashMap<i64, Vec<RawBookmark>>,
    scope: &SqlInterruptScope,
) -> Result<BookmarkItem> {
    scope.err_if_interrupted()?;
    let row_id = raw.row_id;
    let mut item = raw.into_item()?;
    if let BookmarkItem::Folder(folder) = &mut item {
        let children = by_parent.remove(&row_id).unwrap_or_default();
        folder.child_guids = Some(children.iter().map(|c| c.guid.clone()).collect());
        let mut nodes = Vec::with_capacity(children.len());
        for child in children {
            nodes.push(build_subtree(child, by_parent, scope)?);
        }
        folder.child_nodes = Some(nodes);
    }
    Ok(item)
}

fn bookmark_rows(conn: &Connection, where_clause: &str, args: Vec<String>) -> Result<Vec<BookmarkData>> {
    let sql = format!("{} {}", RAW_BOOKMARK_SQL, where_clause);
    let mut stmt = conn.prepare(&sql)?;
    let raws = stmt
        .query_map(params_from_iter(args.iter()), RawBookmark::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let mut out = Vec::with_capacity(raws.len());
    for raw in raws {
        if let BookmarkItem::Bookmark(b) = raw.into_item()? {
            out.push(b);
        }
    }
    Ok(out)
}

/// All bookmarks pointing at `url`. A malformed URL matches nothing.
pub fn get_bookmarks_with_url(conn: &Connection, url: &str) -> Result<Vec<BookmarkData>> {
    let url = match normalize_for_lookup(url) {
        Some(u) => u,
        None => return Ok(Vec::new()),
    };
    bookmark_rows(
        conn,
        &format!("WHERE b.type = {} AND h.url = ?1 ORDER BY b.date_added DESC, b.id DESC", BOOKMARK_TYPE_BOOKMARK),
        vec![url.to_string()],
    )
}

pub fn get_url_for_keyword(conn: &Connection, keyword: &str) -> Result<Option<Url>> {
    let keyword = keyword.trim().to_lowercase();
    let url: Option<String> = conn
        .query_row(
            "SELECT h.url FROM moz_keywords k JOIN moz_places h ON h.id = k.place_id WHERE k.keyword = ?1",
            params![keyword],
            |row| row.get(0),
        )
        .optional()?;
    Ok(url.and_then(|u| normalize_for_lookup(&u)))
}

/// Bookmarks whose URL or title contains every whitespace-separated token.
pub fn search_bookmarks(conn: &Connection, query: &str, limit: u32) -> Result<Vec<BookmarkData>> {
    let tokens = split_tokens(query);
    if tokens.is_empty() || limit == 0 {
        return Ok(Vec::new());
    }
    let mut clause = format!("WHERE b.type = {}", BOOKMARK_TYPE_BOOKMARK);
    let mut args = Vec::with_capacity(tokens.len());
    for (i, token) in tokens.iter().enumerate() {
        clause.push_str(&format!(
            " AND (h.url LIKE ?{n} ESCAPE '\\' OR b.title LIKE ?{n} ESCAPE '\\')",
            n = i + 1
        ));
        args.push(format!("%{}%", escape_like(token)));
    }
    clause.push_str(&format!(" ORDER BY b.date_added DESC, b.id DESC LIMIT {}", limit));
    bookmark_rows(conn, &clause, args)
}

/// Most recently added bookmarks, newest first. Folders and separators are
/// never included.
pub fn get_recent_bookmarks(conn: &Connection, limit: u32) -> Result<Vec<BookmarkData>> {
    bookmark_rows(
        conn,
        &format!(
            "WHERE b.type = {} ORDER BY b.date_added DESC, b.id DESC LIMIT {}",
            BOOKMARK_TYPE_BOOKMARK, limit
        ),
        Vec::new(),
    )
}
