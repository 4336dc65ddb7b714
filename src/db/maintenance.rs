// Periodic housekeeping. Each step is independent; skipping a run is harmless.

use rusqlite::{params, Connection};

use crate::constants::{MAINTENANCE_ANALYZE_INTERVAL_DAYS, META_LAST_MAINTENANCE};
use crate::db::{get_meta, put_meta};
use crate::error::Result;
use crate::history;
use crate::interrupt::SqlInterruptScope;
use crate::types::Timestamp;

pub fn run_maintenance(conn: &Connection, scope: &SqlInterruptScope) -> Result<()> {
    let now = Timestamp::now();

    conn.execute_batch("PRAGMA optimize;")?;
    scope.err_if_interrupted()?;

    let last_run: Option<Timestamp> = get_meta(conn, META_LAST_MAINTENANCE)?;
    let stale = last_run.map_or(true, |t| t < now.days_before(MAINTENANCE_ANALYZE_INTERVAL_DAYS));
    if stale {
        conn.execute_batch("ANALYZE;")?;
        scope.err_if_interrupted()?;
    }

    let tx = conn.unchecked_transaction()?;
    let orphans = tx.execute(
        "DELETE FROM moz_places
         WHERE foreign_count = 0
           AND visit_count_local + visit_count_remote = 0
           AND NOT EXISTS(SELECT 1 FROM moz_places_metadata m
                          WHERE m.place_id = moz_places.id OR m.referrer_place_id = moz_places.id)",
        [],
    )?;
    let repaired = repair_positions(&tx)?;
    scope.err_if_interrupted()?;

    let stale_frecency = {
        let mut stmt = tx.prepare("SELECT id FROM moz_places WHERE frecency < 0")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<i64>, _>>()?;
        ids
    };
    for place_id in &stale_frecency {
        scope.err_if_interrupted()?;
        history::update_frecency(&tx, *place_id)?;
    }
    put_meta(&tx, META_LAST_MAINTENANCE, &now)?;
    tx.commit()?;

    conn.execute_batch("PRAGMA incremental_vacuum;")?;
    log::info!(
        "Maintenance: analyze={}, removed {} orphan places, renumbered {} bookmarks, rescored {} places",
        stale,
        orphans,
        repaired,
        stale_frecency.len()
    );
    Ok(())
}

/// Renumber every folder's children 0..n in their current order. Returns the
/// number of rows whose position changed.
pub(crate) fn repair_positions(conn: &Connection) -> Result<usize> {
    let misplaced = {
        let mut stmt = conn.prepare(
            "SELECT id, pos FROM (
                 SELECT id, position,
                        ROW_NUMBER() OVER (PARTITION BY parent ORDER BY position, id) - 1 AS pos
                 FROM moz_bookmarks WHERE parent IS NOT NULL
             ) WHERE position != pos",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows
    };
    for (id, pos) in &misplaced {
        conn.execute("UPDATE moz_bookmarks SET position = ?2 WHERE id = ?1", params![id, pos])?;
    }
    Ok(misplaced.len())
}
