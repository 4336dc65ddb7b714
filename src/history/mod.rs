// Browsing history: places, visits, frecency and the history deletions
//
// A place (moz_places row) exists while it has visits, is bookmarked or
// keyworded (foreign_count > 0), or carries metadata. `refresh_place` is the
// single point that recounts a place and removes it once nothing keeps it.

pub mod frecency;
pub mod metadata;

#[cfg(test)]
mod tests;

use std::collections::{BTreeSet, HashSet};

use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::constants::{
    META_DELETION_HIGH_WATER_MARK, META_HISTORY_LAST_SYNC, META_HISTORY_SYNC_ID,
    SEARCH_TERM_LENGTH_MAX, SYNC_STATUS_NEW, SYNC_STATUS_NORMAL,
};
use crate::db;
use crate::error::Result;
use crate::interrupt::SqlInterruptScope;
use crate::options::StoreOptions;
use crate::types::{FrecencyThresholdOption, Guid, Timestamp, VisitTransitionSet, VisitType};
use crate::url_util::{normalize_for_lookup, parse_url, truncate_title};

/// Largest number of bound parameters we put in one IN (...) list.
const MAX_VARIABLES_PER_QUERY: usize = 500;

/// One visit with the page it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryVisitInfo {
    pub url: Url,
    pub title: Option<String>,
    pub timestamp: Timestamp,
    pub visit_type: VisitType,
    pub is_hidden: bool,
    pub preview_image_url: Option<Url>,
    pub is_remote: bool,
}

/// A page of visits plus the cursor for the next page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryVisitInfosWithBound {
    pub infos: Vec<HistoryVisitInfo>,
    pub bound: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopFrecentSiteInfo {
    pub url: Url,
    pub title: Option<String>,
}

/// Something the embedder saw happen to a page. Without a `visit_type` it
/// only updates the page's title or preview image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VisitObservation {
    pub url: String,
    pub title: Option<String>,
    pub visit_type: Option<VisitType>,
    pub at: Option<Timestamp>,
    pub is_remote: bool,
    pub is_redirect_source: bool,
    /// Error pages update the title but never record a visit.
    pub is_error: bool,
    pub referrer: Option<String>,
    pub preview_image_url: Option<String>,
}

impl VisitObservation {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_visit_type(mut self, visit_type: VisitType) -> Self {
        self.visit_type = Some(visit_type);
        self
    }

    pub fn with_at(mut self, at: Timestamp) -> Self {
        self.at = Some(at);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

fn begin(conn: &Connection) -> Result<Transaction<'_>> {
    Ok(Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?)
}

// ----- Places -----

pub(crate) fn fetch_place_id(conn: &Connection, url: &Url) -> Result<Option<i64>> {
    let id = conn
        .query_row("SELECT id FROM moz_places WHERE url = ?1", params![url.as_str()], |row| row.get(0))
        .optional()?;
    Ok(id)
}

/// Row id for `url`, creating an unvisited place if there is none.
pub(crate) fn get_or_insert_place(conn: &Connection, url: &Url) -> Result<i64> {
    if let Some(id) = fetch_place_id(conn, url)? {
        return Ok(id);
    }
    conn.execute(
        "INSERT INTO moz_places (url, guid) VALUES (?1, ?2)",
        params![url.as_str(), Guid::random()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn update_frecency(conn: &Connection, place_id: i64) -> Result<()> {
    let frecency = frecency::frecency_for_place(conn, place_id, Timestamp::now())?;
    conn.execute("UPDATE moz_places SET frecency = ?2 WHERE id = ?1", params![place_id, frecency])?;
    Ok(())
}

fn update_visit_counts(conn: &Connection, place_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE moz_places SET
             visit_count_local = (SELECT COUNT(*) FROM moz_historyvisits WHERE place_id = ?1 AND is_local),
             visit_count_remote = (SELECT COUNT(*) FROM moz_historyvisits WHERE place_id = ?1 AND NOT is_local),
             last_visit_date_local = COALESCE(
                 (SELECT MAX(visit_date) FROM moz_historyvisits WHERE place_id = ?1 AND is_local), 0),
             last_visit_date_remote = COALESCE(
                 (SELECT MAX(visit_date) FROM moz_historyvisits WHERE place_id = ?1 AND NOT is_local), 0)
         WHERE id = ?1",
        params![place_id],
    )?;
    Ok(())
}

/// Recount a place after its visits or bookmarks changed; delete it if
/// nothing references it any more. Synced places leave a tombstone.
pub(crate) fn refresh_place(conn: &Connection, place_id: i64) -> Result<()> {
    update_visit_counts(conn, place_id)?;
    let orphan: Option<bool> = conn
        .query_row(
            "SELECT visit_count_local + visit_count_remote = 0 AND foreign_count = 0
                    AND NOT EXISTS(SELECT 1 FROM moz_places_metadata
                                   WHERE place_id = ?1 OR referrer_place_id = ?1)
             FROM moz_places WHERE id = ?1",
            params![place_id],
            |row| row.get(0),
        )
        .optional()?;
    match orphan {
        Some(true) => {
            conn.execute(
                "INSERT OR IGNORE INTO moz_places_tombstones (guid)
                 SELECT guid FROM moz_places WHERE id = ?1 AND sync_status = ?2",
                params![place_id, SYNC_STATUS_NORMAL],
            )?;
            conn.execute("DELETE FROM moz_places WHERE id = ?1", params![place_id])?;
        }
        Some(false) => update_frecency(conn, place_id)?,
        None => {}
    }
    Ok(())
}

// ----- Observations -----

/// Record a visit and/or page details.
pub fn apply_observation(conn: &Connection, obs: &VisitObservation) -> Result<()> {
    let url = parse_url(&obs.url)?;
    let preview = match &obs.preview_image_url {
        Some(p) => Some(parse_url(p)?),
        None => None,
    };

    let tx = begin(conn)?;
    let place_id = get_or_insert_place(&tx, &url)?;

    if let Some(title) = &obs.title {
        tx.execute(
            "UPDATE moz_places SET title = ?2 WHERE id = ?1",
            params![place_id, truncate_title(title)],
        )?;
    }
    if let Some(preview) = &preview {
        tx.execute(
            "UPDATE moz_places SET preview_image_url = ?2 WHERE id = ?1",
            params![place_id, preview.as_str()],
        )?;
    }

    match obs.visit_type {
        Some(visit_type) if !obs.is_error => {
            let at = obs.at.unwrap_or_else(Timestamp::now);
            let hides = obs.is_redirect_source
                || matches!(visit_type, VisitType::Embed | VisitType::FramedLink);
            let from_visit = match obs.referrer.as_deref().and_then(normalize_for_lookup) {
                Some(referrer) => latest_visit_id(&tx, &referrer)?,
                None => None,
            };

            // A page stays hidden only while every visit to it was a hidden kind.
            tx.execute(
                "UPDATE moz_places
                 SET hidden = (hidden OR visit_count_local + visit_count_remote = 0) AND ?2,
                     typed = typed + ?3,
                     sync_change_counter = sync_change_counter + 1
                 WHERE id = ?1",
                params![place_id, hides, (visit_type == VisitType::Typed) as i64],
            )?;
            tx.execute(
                "INSERT INTO moz_historyvisits (is_local, from_visit, place_id, visit_date, visit_type)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![!obs.is_remote, from_visit, place_id, at, visit_type],
            )?;
            update_visit_counts(&tx, place_id)?;
        }
        Some(_) => log::debug!("Not recording a visit for error page {}", url),
        None => {}
    }

    update_frecency(&tx, place_id)?;
    tx.commit()?;
    Ok(())
}

fn latest_visit_id(conn: &Connection, url: &Url) -> Result<Option<i64>> {
    let id = conn
        .query_row(
            "SELECT v.id FROM moz_historyvisits v JOIN moz_places h ON h.id = v.place_id
             WHERE h.url = ?1 ORDER BY v.visit_date DESC LIMIT 1",
            params![url.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

/// Remember that `search_string` led the user to `url`. Unknown pages are
/// ignored.
pub fn accept_result(conn: &Connection, search_string: &str, url: &str) -> Result<()> {
    let url = parse_url(url)?;
    let input: String = search_string.trim().to_lowercase().chars().take(SEARCH_TERM_LENGTH_MAX).collect();
    if input.is_empty() {
        return Ok(());
    }
    let place_id = match fetch_place_id(conn, &url)? {
        Some(id) => id,
        None => {
            log::debug!("accept_result for unknown page {}", url);
            return Ok(());
        }
    };
    conn.execute(
        "INSERT INTO moz_inputhistory (place_id, input, use_count) VALUES (?1, ?2, 1)
         ON CONFLICT(place_id, input) DO UPDATE SET use_count = use_count + 1",
        params![place_id, input],
    )?;
    Ok(())
}

// ----- Queries -----

const VISIT_INFO_SQL: &str = "
    SELECT h.url, h.title, v.visit_date, v.visit_type, h.hidden, h.preview_image_url, v.is_local
    FROM moz_historyvisits v
    JOIN moz_places h ON h.id = v.place_id";

fn visit_info_rows(conn: &Connection, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<HistoryVisitInfo>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let mut rows = stmt.query(args)?;
    let mut infos = Vec::new();
    while let Some(row) = rows.next()? {
        let url: String = row.get(0)?;
        let url = match normalize_for_lookup(&url) {
            Some(u) => u,
            None => continue,
        };
        let preview: Option<String> = row.get(5)?;
        let is_local: bool = row.get(6)?;
        infos.push(HistoryVisitInfo {
            url,
            title: row.get(1)?,
            timestamp: row.get(2)?,
            visit_type: row.get(3)?,
            is_hidden: row.get(4)?,
            preview_image_url: preview.as_deref().and_then(normalize_for_lookup),
            is_remote: !is_local,
        });
    }
    Ok(infos)
}

/// Distinct URLs with a visit in `[start, end]`.
pub fn get_visited_urls_in_range(
    conn: &Connection,
    start: Timestamp,
    end: Timestamp,
    include_remote: bool,
) -> Result<Vec<Url>> {
    let mut stmt = conn.prepare_cached(
        "SELECT DISTINCT h.url FROM moz_places h
         JOIN moz_historyvisits v ON v.place_id = h.id
         WHERE v.visit_date BETWEEN ?1 AND ?2 AND (?3 OR v.is_local)
         ORDER BY h.url",
    )?;
    let urls = stmt
        .query_map(params![start, end, include_remote], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(urls.iter().filter_map(|u| normalize_for_lookup(u)).collect())
}

/// Visits in `[start, end]`, oldest first, minus the excluded transitions.
pub fn get_visit_infos(
    conn: &Connection,
    start: Timestamp,
    end: Timestamp,
    exclude_types: VisitTransitionSet,
) -> Result<Vec<HistoryVisitInfo>> {
    let allowed = exclude_types.complement().bits();
    let sql = format!(
        "{} WHERE v.visit_date BETWEEN ?1 AND ?2 AND ((1 << v.visit_type) & ?3) != 0
         ORDER BY v.visit_date, v.id",
        VISIT_INFO_SQL
    );
    visit_info_rows(conn, &sql, &[&start, &end, &allowed])
}

/// Number of visits to pages that aren't hidden, minus the excluded transitions.
pub fn get_visit_count(conn: &Connection, exclude_types: VisitTransitionSet) -> Result<i64> {
    let allowed = exclude_types.complement().bits();
    let count = conn.query_row(
        "SELECT COUNT(*) FROM moz_historyvisits v JOIN moz_places h ON h.id = v.place_id
         WHERE ((1 << v.visit_type) & ?1) != 0 AND NOT h.hidden",
        params![allowed],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// One page of visits at or before `bound`, newest first.
///
/// The returned `bound`/`offset` continue exactly where this page ended: the
/// offset counts the rows of the page that share its last timestamp.
pub fn get_visit_page_with_bound(
    conn: &Connection,
    bound: i64,
    offset: i64,
    count: i64,
    exclude_types: VisitTransitionSet,
) -> Result<HistoryVisitInfosWithBound> {
    let allowed = exclude_types.complement().bits();
    let sql = format!(
        "{} WHERE v.visit_date <= ?1 AND ((1 << v.visit_type) & ?2) != 0 AND NOT h.hidden
         ORDER BY v.visit_date DESC, v.id DESC
         LIMIT ?3 OFFSET ?4",
        VISIT_INFO_SQL
    );
    let infos = visit_info_rows(conn, &sql, &[&bound, &allowed, &count, &offset])?;

    let (next_bound, next_offset) = match infos.last() {
        None => (0, 0),
        Some(last) => {
            let last_ts = last.timestamp.as_millis();
            let trailing = infos.iter().rev().take_while(|i| i.timestamp.as_millis() == last_ts).count() as i64;
            if last_ts == bound {
                (bound, offset + trailing)
            } else {
                (last_ts, trailing)
            }
        }
    };
    Ok(HistoryVisitInfosWithBound {
        infos,
        bound: next_bound,
        offset: next_offset,
    })
}

/// For each input URL, whether it has been visited. Malformed URLs are
/// simply not visited.
pub fn get_visited(conn: &Connection, urls: &[String], scope: &SqlInterruptScope) -> Result<Vec<bool>> {
    let parsed: Vec<Option<Url>> = urls.iter().map(|u| normalize_for_lookup(u)).collect();
    let wanted: Vec<&str> = parsed
        .iter()
        .flatten()
        .map(Url::as_str)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut visited: HashSet<String> = HashSet::new();
    for chunk in wanted.chunks(MAX_VARIABLES_PER_QUERY) {
        scope.err_if_interrupted()?;
        let placeholders = vec!["?"; chunk.len()].join(",");
        let sql = format!(
            "SELECT url FROM moz_places
             WHERE url IN ({}) AND last_visit_date_local + last_visit_date_remote != 0",
            placeholders
        );
        let mut stmt = conn.prepare(&sql)?;
        let found = stmt
            .query_map(params_from_iter(chunk.iter()), |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        visited.extend(found);
    }

    Ok(parsed
        .iter()
        .map(|u| u.as_ref().map_or(false, |u| visited.contains(u.as_str())))
        .collect())
}

/// Highest-frecency visited pages.
pub fn get_top_frecent_site_infos(
    conn: &Connection,
    num_items: i32,
    threshold: FrecencyThresholdOption,
) -> Result<Vec<TopFrecentSiteInfo>> {
    let mut stmt = conn.prepare_cached(
        "SELECT url, title FROM moz_places
         WHERE frecency >= ?1 AND NOT hidden
           AND last_visit_date_local + last_visit_date_remote != 0
         ORDER BY frecency DESC, id
         LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![threshold.value(), num_items.max(0)], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows
        .into_iter()
        .filter_map(|(url, title)| normalize_for_lookup(&url).map(|url| TopFrecentSiteInfo { url, title }))
        .collect())
}

// ----- Deletion -----

/// Delete the visits matched by `where_clause` (over moz_historyvisits),
/// leaving tombstones for synced places, and refresh the places they
/// belonged to. Returns the number of visits removed.
fn delete_visits_where(conn: &Connection, where_clause: &str, args: &[&dyn rusqlite::ToSql]) -> Result<usize> {
    let place_ids: Vec<i64> = {
        let mut stmt = conn.prepare(&format!(
            "SELECT DISTINCT place_id FROM moz_historyvisits WHERE {}",
            where_clause
        ))?;
        let ids = stmt
            .query_map(args, |row| row.get(0))?
            .collect::<std::result::Result<Vec<i64>, _>>()?;
        ids
    };
    conn.execute(
        &format!(
            "INSERT OR IGNORE INTO moz_historyvisit_tombstones (place_id, visit_date)
             SELECT place_id, visit_date FROM moz_historyvisits
             WHERE {} AND place_id IN (SELECT id FROM moz_places WHERE sync_status = {})",
            where_clause, SYNC_STATUS_NORMAL
        ),
        args,
    )?;
    let removed = conn.execute(&format!("DELETE FROM moz_historyvisits WHERE {}", where_clause), args)?;
    for place_id in place_ids {
        refresh_place(conn, place_id)?;
    }
    Ok(removed)
}

/// Forget a page: all its visits and metadata. Bookmarked pages keep their
/// place row.
pub fn delete_visits_for(conn: &Connection, url: &str) -> Result<()> {
    let url = parse_url(url)?;
    let tx = begin(conn)?;
    if let Some(place_id) = fetch_place_id(&tx, &url)? {
        tx.execute("DELETE FROM moz_places_metadata WHERE place_id = ?1", params![place_id])?;
        tx.execute("DELETE FROM moz_inputhistory WHERE place_id = ?1", params![place_id])?;
        delete_visits_where(&tx, "place_id = ?1", &[&place_id])?;
        refresh_place(&tx, place_id)?;
    }
    tx.commit()?;
    Ok(())
}

pub fn delete_visits_between(conn: &Connection, start: Timestamp, end: Timestamp) -> Result<()> {
    let tx = begin(conn)?;
    let removed = delete_visits_where(&tx, "visit_date BETWEEN ?1 AND ?2", &[&start, &end])?;
    tx.commit()?;
    log::debug!("Deleted {} visits between {} and {}", removed, start, end);
    Ok(())
}

pub fn delete_visit(conn: &Connection, url: &str, timestamp: Timestamp) -> Result<()> {
    let url = parse_url(url)?;
    let tx = begin(conn)?;
    if let Some(place_id) = fetch_place_id(&tx, &url)? {
        delete_visits_where(&tx, "place_id = ?1 AND visit_date = ?2", &[&place_id, &timestamp])?;
    }
    tx.commit()?;
    Ok(())
}

/// Drop every visit, metadata record and unreferenced place. Bookmarked
/// places survive with zeroed counts. Returns whether anything was removed.
fn clear_history(conn: &Connection, write_tombstones: bool) -> Result<bool> {
    if write_tombstones {
        conn.execute(
            "INSERT OR IGNORE INTO moz_places_tombstones (guid)
             SELECT guid FROM moz_places WHERE foreign_count = 0 AND sync_status = ?1",
            params![SYNC_STATUS_NORMAL],
        )?;
    } else {
        conn.execute_batch(
            "DELETE FROM moz_places_tombstones;
             DELETE FROM moz_historyvisit_tombstones;",
        )?;
    }
    let mut changed = conn.execute("DELETE FROM moz_historyvisits", [])?;
    changed += conn.execute("DELETE FROM moz_places_metadata", [])?;
    changed += conn.execute("DELETE FROM moz_inputhistory", [])?;
    conn.execute("DELETE FROM moz_places_metadata_search_queries", [])?;
    changed += conn.execute("DELETE FROM moz_places WHERE foreign_count = 0", [])?;
    conn.execute(
        "UPDATE moz_places SET
             visit_count_local = 0, visit_count_remote = 0,
             last_visit_date_local = 0, last_visit_date_remote = 0,
             typed = 0, hidden = 0, sync_status = ?1, sync_change_counter = 1",
        params![SYNC_STATUS_NEW],
    )?;
    let survivors = {
        let mut stmt = conn.prepare("SELECT id FROM moz_places")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<i64>, _>>()?;
        ids
    };
    for place_id in survivors {
        update_frecency(conn, place_id)?;
    }
    Ok(changed > 0)
}

/// Remove all local history without telling sync about it.
pub fn wipe_local_history(conn: &Connection) -> Result<bool> {
    let tx = begin(conn)?;
    let changed = clear_history(&tx, false)?;
    tx.commit()?;
    log::info!("Wiped local history (changed: {})", changed);
    Ok(changed)
}

/// Remove all history and record when, so older remote visits aren't
/// brought back.
pub fn delete_everything(conn: &Connection) -> Result<bool> {
    let tx = begin(conn)?;
    let changed = clear_history(&tx, true)?;
    db::put_meta(&tx, META_DELETION_HIGH_WATER_MARK, &Timestamp::now())?;
    tx.commit()?;
    log::info!("Deleted all history (changed: {})", changed);
    Ok(changed)
}

/// When `delete_everything` last ran, if ever.
pub fn deletion_high_water_mark(conn: &Connection) -> Result<Option<Timestamp>> {
    db::get_meta(conn, META_DELETION_HIGH_WATER_MARK)
}

/// Reclaim space: drop visits older than the configured age, then the
/// oldest visits beyond the configured cap. No tombstones are written.
/// Returns the number of visits removed.
pub fn prune_destructively(conn: &Connection, options: &StoreOptions, scope: &SqlInterruptScope) -> Result<usize> {
    let cutoff = Timestamp::now().days_before(options.prune_visit_age_days);
    let tx = begin(conn)?;

    let affected: Vec<i64> = {
        let mut stmt = tx.prepare(
            "SELECT DISTINCT place_id FROM moz_historyvisits
             WHERE visit_date < ?1
                OR id NOT IN (SELECT id FROM moz_historyvisits ORDER BY visit_date DESC, id DESC LIMIT ?2)",
        )?;
        let ids = stmt
            .query_map(params![cutoff, options.prune_max_visits], |row| row.get(0))?
            .collect::<std::result::Result<Vec<i64>, _>>()?;
        ids
    };
    scope.err_if_interrupted()?;

    let removed = tx.execute(
        "DELETE FROM moz_historyvisits
         WHERE visit_date < ?1
            OR id NOT IN (SELECT id FROM moz_historyvisits ORDER BY visit_date DESC, id DESC LIMIT ?2)",
        params![cutoff, options.prune_max_visits],
    )?;
    for place_id in affected {
        scope.err_if_interrupted()?;
        refresh_place(&tx, place_id)?;
    }
    tx.commit()?;

    conn.execute_batch("PRAGMA incremental_vacuum;")?;
    log::info!("Pruned {} visits", removed);
    Ok(removed)
}

/// Forget everything we know about history sync.
pub fn reset_sync_metadata(conn: &Connection) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE moz_places SET sync_change_counter = 1, sync_status = ?1",
        params![SYNC_STATUS_NEW],
    )?;
    tx.execute_batch(
        "DELETE FROM moz_places_tombstones;
         DELETE FROM moz_historyvisit_tombstones;",
    )?;
    db::delete_meta(&tx, META_HISTORY_LAST_SYNC)?;
    db::delete_meta(&tx, META_HISTORY_SYNC_ID)?;
    tx.commit()?;
    log::info!("Reset history sync metadata");
    Ok(())
}
