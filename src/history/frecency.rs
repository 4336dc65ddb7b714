// Frecency: a page's rank from how often and how recently it was visited
//
// The most recent visits are sampled. Each sampled visit scores
// `age_weight * type_bonus / 100`; the total is scaled up to the page's full
// visit count.

use rusqlite::{params, Connection};

use crate::constants::{
    FRECENCY_AGE_BUCKETS, FRECENCY_BOOKMARKED_UNVISITED, FRECENCY_OLDEST_WEIGHT,
    FRECENCY_SAMPLED_VISITS, FRECENCY_UNVISITED,
};
use crate::error::Result;
use crate::types::{Timestamp, VisitType};

const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;
const BOOKMARKED_BONUS: i64 = 75;

pub fn visit_type_bonus(visit_type: VisitType) -> i64 {
    match visit_type {
        VisitType::Link => 100,
        VisitType::Typed => 2000,
        VisitType::Bookmark => 75,
        _ => 0,
    }
}

pub fn age_weight(age_days: i64) -> i64 {
    FRECENCY_AGE_BUCKETS
        .iter()
        .find(|(max_days, _)| age_days <= *max_days)
        .map_or(FRECENCY_OLDEST_WEIGHT, |(_, weight)| *weight)
}

/// Score a page from its sampled visits (newest first) and total visit count.
pub fn calculate(sampled: &[(Timestamp, VisitType)], total_visits: i64, bookmarked: bool, now: Timestamp) -> i64 {
    if sampled.is_empty() || total_visits <= 0 {
        return if bookmarked {
            FRECENCY_BOOKMARKED_UNVISITED
        } else {
            FRECENCY_UNVISITED
        };
    }
    let points: i64 = sampled
        .iter()
        .map(|(at, visit_type)| {
            let age_days = (now.as_millis() - at.as_millis()).max(0) / MS_PER_DAY;
            let mut bonus = visit_type_bonus(*visit_type);
            if bookmarked {
                bonus += BOOKMARKED_BONUS;
            }
            age_weight(age_days) * bonus / 100
        })
        .sum();
    let sample_count = sampled.len() as i64;
    // ceil(total_visits * points / sample_count)
    (total_visits * points + sample_count - 1) / sample_count
}

/// Recompute a stored page's frecency from its visits.
pub(crate) fn frecency_for_place(conn: &Connection, place_id: i64, now: Timestamp) -> Result<i64> {
    let (total_visits, bookmarked): (i64, bool) = conn.query_row(
        "SELECT visit_count_local + visit_count_remote,
                EXISTS(SELECT 1 FROM moz_bookmarks WHERE fk = ?1)
         FROM moz_places WHERE id = ?1",
        params![place_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    let mut stmt = conn.prepare_cached(
        "SELECT visit_date, visit_type FROM moz_historyvisits
         WHERE place_id = ?1 ORDER BY visit_date DESC LIMIT ?2",
    )?;
    let sampled = stmt
        .query_map(params![place_id, FRECENCY_SAMPLED_VISITS], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<std::result::Result<Vec<(Timestamp, VisitType)>, _>>()?;
    Ok(calculate(&sampled, total_visits, bookmarked, now))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: i64 = MS_PER_DAY;

    #[test]
    fn unvisited_pages() {
        let now = Timestamp(100 * DAY);
        assert_eq!(calculate(&[], 0, false, now), FRECENCY_UNVISITED);
        assert_eq!(calculate(&[], 0, true, now), FRECENCY_BOOKMARKED_UNVISITED);
    }

    #[test]
    fn single_recent_link_visit_is_one_time_page() {
        let now = Timestamp(100 * DAY);
        let f = calculate(&[(now, VisitType::Link)], 1, false, now);
        assert_eq!(f, 100);
        assert!(f < crate::types::FrecencyThresholdOption::SkipOneTimePages.value());
    }

    #[test]
    fn typed_and_recent_visits_rank_higher() {
        let now = Timestamp(200 * DAY);
        let typed = calculate(&[(now, VisitType::Typed)], 1, false, now);
        let link = calculate(&[(now, VisitType::Link)], 1, false, now);
        let old_link = calculate(&[(Timestamp(now.0 - 120 * DAY), VisitType::Link)], 1, false, now);
        assert!(typed > link);
        assert!(link > old_link);
        assert_eq!(old_link, FRECENCY_OLDEST_WEIGHT);
    }

    #[test]
    fn sample_is_scaled_to_total_visits() {
        let now = Timestamp(100 * DAY);
        let sampled = vec![(now, VisitType::Link); 2];
        assert_eq!(calculate(&sampled, 20, false, now), 2000);
    }

    #[test]
    fn age_buckets() {
        assert_eq!(age_weight(0), 100);
        assert_eq!(age_weight(4), 100);
        assert_eq!(age_weight(5), 70);
        assert_eq!(age_weight(90), 30);
        assert_eq!(age_weight(91), FRECENCY_OLDEST_WEIGHT);
    }
}
