// URL matching for the address bar: autofill and autocomplete

use rusqlite::{params, params_from_iter, Connection};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::constants::AUTOCOMPLETE_INPUT_HISTORY_BONUS;
use crate::error::Result;
use crate::url_util::normalize_for_lookup;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub url: Url,
    pub title: String,
    pub frecency: i64,
}

/// Escape `\`, `%` and `_` for a LIKE pattern using `ESCAPE '\'`.
pub fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

pub fn split_tokens(s: &str) -> Vec<&str> {
    s.split_whitespace().collect()
}

/// Best visited URL that starts with what the user typed, ignoring the
/// scheme and a leading `www.`.
pub fn match_url(conn: &Connection, query: &str) -> Result<Option<Url>> {
    let query = query.trim();
    if query.is_empty() || query.contains(char::is_whitespace) {
        return Ok(None);
    }
    let lowered = query.to_lowercase();
    let stripped = lowered
        .strip_prefix("https://")
        .or_else(|| lowered.strip_prefix("http://"))
        .unwrap_or(&lowered);
    let stripped = stripped.strip_prefix("www.").unwrap_or(stripped);
    let prefix = format!("{}%", escape_like(stripped));

    let mut stmt = conn.prepare_cached(
        "SELECT url FROM moz_places
         WHERE NOT hidden AND frecency > 0
           AND (url LIKE 'http://' || ?1 ESCAPE '\\'
             OR url LIKE 'https://' || ?1 ESCAPE '\\'
             OR url LIKE 'http://www.' || ?1 ESCAPE '\\'
             OR url LIKE 'https://www.' || ?1 ESCAPE '\\')
         ORDER BY frecency DESC, id
         LIMIT 10",
    )?;
    let candidates = stmt
        .query_map(params![prefix], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(candidates.iter().find_map(|u| normalize_for_lookup(u)))
}

/// Pages whose URL or title contains every token, ranked by frecency plus a
/// bonus for results previously accepted for this input.
pub fn query_autocomplete(conn: &Connection, search: &str, limit: u32) -> Result<Vec<SearchResult>> {
    let tokens = split_tokens(search);
    if tokens.is_empty() || limit == 0 {
        return Ok(Vec::new());
    }
    let input = search.trim().to_lowercase();

    let mut args: Vec<String> = vec![input];
    let mut clause = String::new();
    for token in &tokens {
        args.push(format!("%{}%", escape_like(token)));
        let n = args.len();
        clause.push_str(&format!(
            " AND (h.url LIKE ?{n} ESCAPE '\\' OR h.title LIKE ?{n} ESCAPE '\\')",
            n = n
        ));
    }
    let sql = format!(
        "SELECT h.url, COALESCE(h.title, ''),
                h.frecency + {bonus} * COALESCE(
                    (SELECT SUM(i.use_count) FROM moz_inputhistory i
                     WHERE i.place_id = h.id AND i.input LIKE ?1 || '%'), 0) AS score
         FROM moz_places h
         WHERE NOT h.hidden AND h.frecency >= 0 {clause}
         ORDER BY score DESC, h.id
         LIMIT {limit}",
        bonus = AUTOCOMPLETE_INPUT_HISTORY_BONUS,
        clause = clause,
        limit = limit
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(args.iter()), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows
        .into_iter()
        .filter_map(|(url, title, frecency)| {
            normalize_for_lookup(&url).map(|url| SearchResult { url, title, frecency })
        })
        .collect())
}
