// History metadata: per-page view time and classification, keyed by
// (url, referrer, search term)

use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::{fetch_place_id, get_or_insert_place};
use crate::constants::SEARCH_TERM_LENGTH_MAX;
use crate::error::{InvalidPlaceInfo, Result};
use crate::matcher::{escape_like, split_tokens};
use crate::types::{DocumentType, Timestamp};
use crate::url_util::{normalize_for_lookup, parse_url, truncate_title};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryMetadataKey {
    pub url: String,
    pub search_term: Option<String>,
    pub referrer_url: Option<String>,
}

impl HistoryMetadataKey {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            search_term: None,
            referrer_url: None,
        }
    }
}

/// An incremental update. View time adds up; document type and title
/// overwrite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryMetadataObservation {
    pub url: String,
    pub referrer_url: Option<String>,
    pub search_term: Option<String>,
    pub view_time: Option<i32>,
    pub document_type: Option<DocumentType>,
    pub title: Option<String>,
}

impl HistoryMetadataObservation {
    pub fn from_key(key: HistoryMetadataKey) -> Self {
        Self {
            url: key.url,
            referrer_url: key.referrer_url,
            search_term: key.search_term,
            view_time: None,
            document_type: None,
            title: None,
        }
    }

    pub fn view_time(key: HistoryMetadataKey, view_time: Option<i32>) -> Self {
        Self {
            view_time,
            ..Self::from_key(key)
        }
    }

    pub fn document_type(key: HistoryMetadataKey, document_type: DocumentType) -> Self {
        Self {
            document_type: Some(document_type),
            ..Self::from_key(key)
        }
    }

    pub fn title(key: HistoryMetadataKey, title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::from_key(key)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryMetadata {
    pub url: String,
    pub title: Option<String>,
    pub preview_image_url: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub total_view_time: i64,
    pub search_term: Option<String>,
    pub document_type: DocumentType,
    pub referrer_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryHighlightWeights {
    pub view_time: f64,
    pub frequency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryHighlight {
    pub score: f64,
    pub place_id: i64,
    pub url: String,
    pub title: Option<String>,
    pub preview_image_url: Option<String>,
}

const METADATA_SQL: &str = "
    SELECT h.url, h.title, h.preview_image_url, m.created_at, m.updated_at,
           m.total_view_time, s.term, m.document_type, r.url
    FROM moz_places_metadata m
    JOIN moz_places h ON h.id = m.place_id
    LEFT JOIN moz_places r ON r.id = m.referrer_place_id
    LEFT JOIN moz_places_metadata_search_queries s ON s.id = m.search_query_id";

impl HistoryMetadata {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            url: row.get(0)?,
            title: row.get(1)?,
            preview_image_url: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
            total_view_time: row.get(5)?,
            search_term: row.get(6)?,
            document_type: row.get(7)?,
            referrer_url: row.get(8)?,
        })
    }
}

fn metadata_rows(conn: &Connection, where_clause: &str, args: Vec<Box<dyn rusqlite::ToSql>>) -> Result<Vec<HistoryMetadata>> {
    let sql = format!("{} {}", METADATA_SQL, where_clause);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(args.iter()), HistoryMetadata::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn normalize_search_term(term: Option<&str>) -> Option<String> {
    let term: String = term?.trim().to_lowercase().chars().take(SEARCH_TERM_LENGTH_MAX).collect();
    if term.is_empty() {
        None
    } else {
        Some(term)
    }
}

/// Resolve the row ids a key refers to, without creating anything.
/// `None` means no record can match.
fn lookup_key_ids(conn: &Connection, key: &HistoryMetadataKey) -> Result<Option<(i64, Option<i64>, Option<i64>)>> {
    let url = parse_url(&key.url)?;
    let place_id = match fetch_place_id(conn, &url)? {
        Some(id) => id,
        None => return Ok(None),
    };
    let referrer_id = match key.referrer_url.as_deref().and_then(normalize_for_lookup) {
        Some(referrer) => match fetch_place_id(conn, &referrer)? {
            Some(id) => Some(id),
            None => return Ok(None),
        },
        None => None,
    };
    let search_id = match normalize_search_term(key.search_term.as_deref()) {
        Some(term) => {
            let id: Option<i64> = conn
                .query_row(
                    "SELECT id FROM moz_places_metadata_search_queries WHERE term = ?1",
                    params![term],
                    |row| row.get(0),
                )
                .optional()?;
            match id {
                Some(id) => Some(id),
                None => return Ok(None),
            }
        }
        None => None,
    };
    Ok(Some((place_id, referrer_id, search_id)))
}

/// Create the record for the observation's key if needed and merge the
/// observation into it.
pub fn note_observation(conn: &Connection, obs: &HistoryMetadataObservation) -> Result<()> {
    let url = parse_url(&obs.url)?;
    if let Some(view_time) = obs.view_time {
        if view_time < 0 {
            return Err(InvalidPlaceInfo::InvalidInput(format!("negative view time {}", view_time)).into());
        }
    }
    let referrer = obs.referrer_url.as_deref().and_then(normalize_for_lookup);
    let search_term = normalize_search_term(obs.search_term.as_deref());
    let now = Timestamp::now();

    let tx = conn.unchecked_transaction()?;
    let place_id = get_or_insert_place(&tx, &url)?;
    let referrer_id = match &referrer {
        Some(r) => Some(get_or_insert_place(&tx, r)?),
        None => None,
    };
    let search_id = match &search_term {
        Some(term) => {
            tx.execute(
                "INSERT OR IGNORE INTO moz_places_metadata_search_queries (term) VALUES (?1)",
                params![term],
            )?;
            let id: i64 = tx.query_row(
                "SELECT id FROM moz_places_metadata_search_queries WHERE term = ?1",
                params![term],
                |row| row.get(0),
            )?;
            Some(id)
        }
        None => None,
    };

    let existing: Option<i64> = tx
        .query_row(
            "SELECT id FROM moz_places_metadata
             WHERE place_id = ?1 AND referrer_place_id IS ?2 AND search_query_id IS ?3",
            params![place_id, referrer_id, search_id],
            |row| row.get(0),
        )
        .optional()?;
    let view_time = i64::from(obs.view_time.unwrap_or(0));
    match existing {
        Some(id) => {
            tx.execute(
                "UPDATE moz_places_metadata
                 SET total_view_time = total_view_time + ?2,
                     document_type = COALESCE(?3, document_type),
                     updated_at = ?4
                 WHERE id = ?1",
                params![id, view_time, obs.document_type, now],
            )?;
        }
        None => {
            tx.execute(
                "INSERT INTO moz_places_metadata
                     (place_id, referrer_place_id, search_query_id, created_at, updated_at,
                      total_view_time, document_type)
                 VALUES (?1, ?2, ?3, ?4, ?4, ?5, ?6)",
                params![
                    place_id,
                    referrer_id,
                    search_id,
                    now,
                    view_time,
                    obs.document_type.unwrap_or_default()
                ],
            )?;
        }
    }
    if let Some(title) = &obs.title {
        tx.execute(
            "UPDATE moz_places SET title = ?2 WHERE id = ?1",
            params![place_id, truncate_title(title)],
        )?;
    }
    tx.commit()?;
    Ok(())
}

/// Most recently updated record for `url`. A malformed URL is an error
/// since this targets one page.
pub fn get_latest_for_url(conn: &Connection, url: &str) -> Result<Option<HistoryMetadata>> {
    let url = parse_url(url).map_err(|e| InvalidPlaceInfo::InvalidInput(format!("bad URL {:?}: {}", url, e)))?;
    let sql = format!("{} WHERE h.url = ?1 ORDER BY m.updated_at DESC, m.id DESC LIMIT 1", METADATA_SQL);
    let meta = conn
        .query_row(&sql, params![url.as_str()], HistoryMetadata::from_row)
        .optional()?;
    Ok(meta)
}

pub fn get_since(conn: &Connection, since: Timestamp) -> Result<Vec<HistoryMetadata>> {
    metadata_rows(
        conn,
        "WHERE m.updated_at >= ?1 ORDER BY m.updated_at DESC, m.id DESC",
        vec![Box::new(since) as Box<dyn rusqlite::ToSql>],
    )
}

pub fn get_between(conn: &Connection, start: Timestamp, end: Timestamp) -> Result<Vec<HistoryMetadata>> {
    metadata_rows(
        conn,
        "WHERE m.updated_at BETWEEN ?1 AND ?2 ORDER BY m.updated_at DESC, m.id DESC",
        vec![Box::new(start) as Box<dyn rusqlite::ToSql>, Box::new(end)],
    )
}

/// Records whose URL, title or search term contains every query token.
pub fn query(conn: &Connection, query: &str, limit: u32) -> Result<Vec<HistoryMetadata>> {
    let tokens = split_tokens(query);
    if tokens.is_empty() || limit == 0 {
        return Ok(Vec::new());
    }
    let mut clause = String::from("WHERE 1");
    let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::with_capacity(tokens.len());
    for (i, token) in tokens.iter().enumerate() {
        clause.push_str(&format!(
            " AND (h.url LIKE ?{n} ESCAPE '\\' OR h.title LIKE ?{n} ESCAPE '\\' OR s.term LIKE ?{n} ESCAPE '\\')",
            n = i + 1
        ));
        args.push(Box::new(format!("%{}%", escape_like(token))));
    }
    clause.push_str(&format!(" ORDER BY m.updated_at DESC, m.id DESC LIMIT {}", limit));
    metadata_rows(conn, &clause, args)
}

/// Pages ranked by a weighted mix of total view time and number of
/// metadata records, each normalized against the top page.
pub fn get_highlights(conn: &Connection, weights: HistoryHighlightWeights, limit: u32) -> Result<Vec<HistoryHighlight>> {
    let mut stmt = conn.prepare(
        "SELECT m.place_id, h.url, h.title, h.preview_image_url,
                SUM(m.total_view_time), COUNT(*)
         FROM moz_places_metadata m
         JOIN moz_places h ON h.id = m.place_id
         GROUP BY m.place_id",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let max_view = rows.iter().map(|r| r.4).max().unwrap_or(0).max(1) as f64;
    let max_freq = rows.iter().map(|r| r.5).max().unwrap_or(0).max(1) as f64;

    let mut highlights: Vec<HistoryHighlight> = rows
        .into_iter()
        .map(|(place_id, url, title, preview_image_url, view, freq)| HistoryHighlight {
            score: weights.view_time * (view as f64 / max_view) + weights.frequency * (freq as f64 / max_freq),
            place_id,
            url,
            title,
            preview_image_url,
        })
        .collect();
    highlights.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.place_id.cmp(&b.place_id)));
    highlights.truncate(limit as usize);
    Ok(highlights)
}

fn delete_orphan_search_queries(conn: &Connection) -> Result<()> {
    conn.execute(
        "DELETE FROM moz_places_metadata_search_queries
         WHERE id NOT IN (SELECT search_query_id FROM moz_places_metadata WHERE search_query_id NOT NULL)",
        [],
    )?;
    Ok(())
}

/// Delete the record for exactly this key.
pub fn delete_metadata(conn: &Connection, key: &HistoryMetadataKey) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    if let Some((place_id, referrer_id, search_id)) = lookup_key_ids(&tx, key)? {
        tx.execute(
            "DELETE FROM moz_places_metadata
             WHERE place_id = ?1 AND referrer_place_id IS ?2 AND search_query_id IS ?3",
            params![place_id, referrer_id, search_id],
        )?;
        delete_orphan_search_queries(&tx)?;
    }
    tx.commit()?;
    Ok(())
}

pub fn delete_older_than(conn: &Connection, older_than: Timestamp) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let removed = tx.execute(
        "DELETE FROM moz_places_metadata WHERE updated_at < ?1",
        params![older_than],
    )?;
    delete_orphan_search_queries(&tx)?;
    tx.commit()?;
    log::debug!("Deleted {} metadata records older than {}", removed, older_than);
    Ok(removed)
}
