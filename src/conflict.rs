use chrono::{NaiveDate, NaiveTime};
use rusqlite::Connection;

use crate::calendar::parse_time;
use crate::error::EngineResult;

/// Half-open `[start, end)` overlap: back-to-back intervals do not collide.
pub fn overlaps(a_start: NaiveTime, a_end: NaiveTime, b_start: NaiveTime, b_end: NaiveTime) -> bool {
    a_start < b_end && b_start < a_end
}

pub fn has_conflict(
    conn: &Connection,
    group_id: &str,
    date: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
) -> EngineResult<bool> {
    Ok(find_conflict(conn, group_id, date, start, end, None)?.is_some())
}

/// First class of the group on `date` overlapping `[start, end)`, skipping
/// `ignore_id` (the class being rescheduled).
pub fn find_conflict(
    conn: &Connection,
    group_id: &str,
    date: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
    ignore_id: Option<&str>,
) -> EngineResult<Option<String>> {
    let mut stmt = conn.prepare(
        "SELECT id, start_time, end_time
         FROM classes
         WHERE group_id = ? AND date = ?
         ORDER BY start_time",
    )?;
    let rows = stmt
        .query_map((group_id, date), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    for (id, s, e) in rows {
        if ignore_id == Some(id.as_str()) {
            continue;
        }
        let (existing_start, existing_end) = (parse_time(&s)?, parse_time(&e)?);
        if overlaps(start, end, existing_start, existing_end) {
            return Ok(Some(id));
        }
    }
    Ok(None)
}
