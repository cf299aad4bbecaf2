//! Schedules (weekly patterns) and the classes generated from them.
//!
//! Every mutating operation runs in one transaction. Regeneration only ever
//! touches classes dated on or after the clock's today, so past classes and
//! their attendance survive schedule edits.

use chrono::{NaiveDate, NaiveTime};
use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::{info, warn};

use crate::aggregate;
use crate::attendance::{self, AttendanceRecord, AttendanceUpsert};
use crate::calendar::{
    format_time, materialize, minute_of_day, parse_time, PatternEntry, SchedulePattern,
    SessionDraft,
};
use crate::conflict;
use crate::context::EngineContext;
use crate::db::new_id;
use crate::error::{EngineError, EngineResult};
use crate::roster;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOrigin {
    Schedule,
    Single,
}

impl SessionOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Schedule => "schedule",
            Self::Single => "single",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "schedule" => Some(Self::Schedule),
            "single" => Some(Self::Single),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub group_id: String,
    pub teacher_id: String,
    pub date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub teacher_attendance: Option<bool>,
    pub activities: String,
    pub observations: String,
    pub content: String,
    pub origin: SessionOrigin,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredPattern {
    pub group_id: String,
    pub group_name: String,
    pub company_id: String,
    pub range_start: NaiveDate,
    pub range_end: NaiveDate,
    pub entries: Vec<PatternEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUpdate {
    #[serde(default, deserialize_with = "crate::serde_util::double_option")]
    pub teacher_attendance: Option<Option<bool>>,
    pub activities: Option<String>,
    pub observations: Option<String>,
    pub content: Option<String>,
    pub date: Option<NaiveDate>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionFilters {
    pub date: Option<NaiveDate>,
    pub group_id: Option<String>,
    pub teacher_id: Option<String>,
    pub company_id: Option<String>,
    pub class_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub student_id: String,
    pub name: String,
    pub enrollment_status: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    #[serde(flatten)]
    pub session: Session,
    pub group_name: String,
    pub teacher_name: String,
    pub company_id: String,
    pub company_name: String,
    pub duration_hours: f64,
    pub students: Vec<RosterEntry>,
    pub attendance: Vec<AttendanceRecord>,
}

const SESSION_COLUMNS: &str = "c.id, c.group_id, c.teacher_id, c.date, c.start_time, c.end_time,
     c.teacher_attendance, c.activities, c.observations, c.content, c.origin";

fn session_from_row(r: &Row<'_>) -> rusqlite::Result<Session> {
    let raw: String = r.get(10)?;
    let origin = SessionOrigin::parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            10,
            rusqlite::types::Type::Text,
            format!("unknown class origin {:?}", raw).into(),
        )
    })?;
    Ok(Session {
        id: r.get(0)?,
        group_id: r.get(1)?,
        teacher_id: r.get(2)?,
        date: r.get(3)?,
        start_time: r.get(4)?,
        end_time: r.get(5)?,
        teacher_attendance: r.get(6)?,
        activities: r.get(7)?,
        observations: r.get(8)?,
        content: r.get(9)?,
        origin,
    })
}

pub fn get_session(conn: &Connection, class_id: &str) -> EngineResult<Session> {
    let sql = format!("SELECT {} FROM classes c WHERE c.id = ?", SESSION_COLUMNS);
    conn.query_row(&sql, [class_id], session_from_row)
        .optional()?
        .ok_or_else(|| EngineError::not_found("class", class_id))
}

/// Stored times carry no date, so an end before the start is corrupt data,
/// never a class running past midnight.
pub fn class_minutes(id: &str, start_time: &str, end_time: &str) -> EngineResult<u32> {
    let start = minute_of_day(parse_time(start_time)?);
    let end = minute_of_day(parse_time(end_time)?);
    end.checked_sub(start).ok_or_else(|| {
        EngineError::validation(format!(
            "class {} ends ({}) before it starts ({})",
            id, end_time, start_time
        ))
    })
}

pub fn session_minutes(session: &Session) -> EngineResult<u32> {
    class_minutes(&session.id, &session.start_time, &session.end_time)
}

fn insert_session(
    conn: &Connection,
    group_id: &str,
    draft: &SessionDraft,
    origin: SessionOrigin,
) -> EngineResult<Session> {
    let session = Session {
        id: new_id(),
        group_id: group_id.to_string(),
        teacher_id: draft.teacher_id.clone(),
        date: draft.date,
        start_time: format_time(draft.start),
        end_time: format_time(draft.end),
        teacher_attendance: None,
        activities: String::new(),
        observations: String::new(),
        content: String::new(),
        origin,
    };
    conn.execute(
        "INSERT INTO classes(id, group_id, teacher_id, date, start_time, end_time, origin)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &session.id,
            &session.group_id,
            &session.teacher_id,
            session.date,
            &session.start_time,
            &session.end_time,
            origin.as_str(),
        ),
    )?;
    Ok(session)
}

fn pattern_exists(conn: &Connection, group_id: &str) -> EngineResult<bool> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM schedules WHERE group_id = ?",
            [group_id],
            |r| r.get::<_, i64>(0),
        )
        .optional()?
        .is_some())
}

fn save_pattern(conn: &Connection, group_id: &str, pattern: &SchedulePattern) -> EngineResult<()> {
    let days_json = serde_json::to_string(&pattern.entries)
        .map_err(|e| EngineError::validation(format!("cannot encode schedule days: {}", e)))?;
    conn.execute(
        "INSERT INTO schedules(group_id, range_start, range_end, days_json, updated_at)
         VALUES(?, ?, ?, ?, datetime('now'))
         ON CONFLICT(group_id) DO UPDATE SET
           range_start = excluded.range_start,
           range_end = excluded.range_end,
           days_json = excluded.days_json,
           updated_at = excluded.updated_at",
        (group_id, pattern.range_start, pattern.range_end, days_json),
    )?;
    Ok(())
}

/// Delete the group's classes dated on/after `from` (attendance first), and
/// return the students whose aggregates need recomputing.
fn delete_classes_from(
    conn: &Connection,
    group_id: &str,
    from: NaiveDate,
) -> EngineResult<(usize, BTreeSet<String>)> {
    let mut stmt = conn.prepare("SELECT id FROM classes WHERE group_id = ? AND date >= ?")?;
    let ids = stmt
        .query_map((group_id, from), |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    let students = attendance::students_for_classes(conn, &ids)?;
    conn.execute(
        "DELETE FROM attendance
         WHERE class_id IN (SELECT id FROM classes WHERE group_id = ? AND date >= ?)",
        (group_id, from),
    )?;
    let n = conn.execute(
        "DELETE FROM classes WHERE group_id = ? AND date >= ?",
        (group_id, from),
    )?;
    Ok((n, students))
}

fn insert_generated(
    conn: &Connection,
    group_id: &str,
    drafts: impl Iterator<Item = SessionDraft>,
) -> EngineResult<Vec<Session>> {
    drafts
        .map(|draft| insert_session(conn, group_id, &draft, SessionOrigin::Schedule))
        .collect()
}

pub fn create_pattern(
    ctx: &EngineContext<'_>,
    group_id: &str,
    pattern: &SchedulePattern,
) -> EngineResult<Vec<Session>> {
    let validated = pattern.validate()?;
    let created = ctx.write(|tx| {
        let teacher_id = roster::group_teacher(tx, group_id)?;
        if pattern_exists(tx, group_id)? {
            return Err(EngineError::Conflict(format!(
                "group {} already has a schedule",
                group_id
            )));
        }
        save_pattern(tx, group_id, pattern)?;
        insert_generated(tx, group_id, materialize(&validated, &teacher_id))
    })?;
    info!(group_id, classes = created.len(), "schedule created");
    Ok(created)
}

/// Replace the schedule: classes from today on are discarded and regenerated
/// from the new pattern; earlier classes are left alone.
pub fn replace_pattern(
    ctx: &EngineContext<'_>,
    group_id: &str,
    pattern: &SchedulePattern,
) -> EngineResult<Vec<Session>> {
    let validated = pattern.validate()?;
    let today = ctx.today();
    let (removed, created) = ctx.write(|tx| {
        let teacher_id = roster::group_teacher(tx, group_id)?;
        if !pattern_exists(tx, group_id)? {
            return Err(EngineError::not_found("schedule", group_id));
        }
        let (removed, students) = delete_classes_from(tx, group_id, today)?;
        save_pattern(tx, group_id, pattern)?;
        let created = insert_generated(
            tx,
            group_id,
            materialize(&validated, &teacher_id).starting_from(today),
        )?;
        attendance::recompute_students(tx, ctx.decimals(), group_id, &students)?;
        Ok((removed, created))
    })?;
    info!(
        group_id,
        %today,
        removed,
        created = created.len(),
        "schedule replaced"
    );
    Ok(created)
}

pub fn delete_pattern(ctx: &EngineContext<'_>, group_id: &str) -> EngineResult<usize> {
    let today = ctx.today();
    let removed = ctx.write(|tx| {
        if !pattern_exists(tx, group_id)? {
            return Err(EngineError::not_found("schedule", group_id));
        }
        let (removed, students) = delete_classes_from(tx, group_id, today)?;
        tx.execute("DELETE FROM schedules WHERE group_id = ?", [group_id])?;
        attendance::recompute_students(tx, ctx.decimals(), group_id, &students)?;
        Ok(removed)
    })?;
    info!(group_id, %today, removed, "schedule deleted");
    Ok(removed)
}

fn pattern_from_row(r: &Row<'_>) -> rusqlite::Result<(StoredPattern, String)> {
    Ok((
        StoredPattern {
            group_id: r.get(0)?,
            group_name: r.get(1)?,
            company_id: r.get(2)?,
            range_start: r.get(3)?,
            range_end: r.get(4)?,
            entries: Vec::new(),
        },
        r.get(5)?,
    ))
}

fn decode_entries((mut p, days_json): (StoredPattern, String)) -> EngineResult<StoredPattern> {
    p.entries = serde_json::from_str(&days_json).map_err(|e| {
        EngineError::validation(format!("schedule of group {} is unreadable: {}", p.group_id, e))
    })?;
    Ok(p)
}

pub fn get_pattern(conn: &Connection, group_id: &str) -> EngineResult<StoredPattern> {
    let row = conn
        .query_row(
            "SELECT s.group_id, g.name, g.company_id, s.range_start, s.range_end, s.days_json
             FROM schedules s
             JOIN training_groups g ON g.id = s.group_id
             WHERE s.group_id = ?",
            [group_id],
            pattern_from_row,
        )
        .optional()?
        .ok_or_else(|| EngineError::not_found("schedule", group_id))?;
    decode_entries(row)
}

pub fn list_patterns(conn: &Connection, company_id: Option<&str>) -> EngineResult<Vec<StoredPattern>> {
    let mut sql = String::from(
        "SELECT s.group_id, g.name, g.company_id, s.range_start, s.range_end, s.days_json
         FROM schedules s
         JOIN training_groups g ON g.id = s.group_id",
    );
    let mut bind: Vec<Value> = Vec::new();
    if let Some(cid) = company_id {
        sql.push_str(" WHERE g.company_id = ?");
        bind.push(Value::Text(cid.to_string()));
    }
    sql.push_str(" ORDER BY g.name, s.group_id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(bind), pattern_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(decode_entries).collect()
}

fn parse_interval(start_time: &str, end_time: &str) -> EngineResult<(NaiveTime, NaiveTime)> {
    let start = parse_time(start_time)?;
    let end = parse_time(end_time)?;
    if end <= start {
        return Err(EngineError::validation(format!(
            "endTime {} must be after startTime {}",
            format_time(end),
            format_time(start)
        )));
    }
    Ok((start, end))
}

/// Insert one ad-hoc class, refusing any overlap with the group's classes
/// on that date.
pub fn add_single_session(
    ctx: &EngineContext<'_>,
    group_id: &str,
    date: NaiveDate,
    start_time: &str,
    end_time: &str,
) -> EngineResult<Session> {
    let (start, end) = parse_interval(start_time, end_time)?;
    let session = ctx.write(|tx| {
        let teacher_id = roster::group_teacher(tx, group_id)?;
        if conflict::has_conflict(tx, group_id, date, start, end)? {
            return Err(EngineError::SessionConflict {
                group_id: group_id.to_string(),
                date: date.to_string(),
            });
        }
        let draft = SessionDraft {
            date,
            start,
            end,
            teacher_id,
        };
        insert_session(tx, group_id, &draft, SessionOrigin::Single)
    })
    .inspect_err(|e| {
        if matches!(e, EngineError::SessionConflict { .. }) {
            warn!(group_id, %date, start_time, end_time, "ad-hoc class rejected: overlap");
        }
    })?;
    info!(group_id, class_id = %session.id, %date, "ad-hoc class added");
    Ok(session)
}

/// Record class information and a batch of attendance. Date and time may
/// only change while the class has no attendance.
pub fn update_session(
    ctx: &EngineContext<'_>,
    class_id: &str,
    update: &SessionUpdate,
    upserts: &[AttendanceUpsert],
) -> EngineResult<Session> {
    let session = ctx.write(|tx| {
        let current = get_session(tx, class_id)?;

        let date = update.date.unwrap_or(current.date);
        let start_time = update.start_time.as_deref().unwrap_or(&current.start_time);
        let end_time = update.end_time.as_deref().unwrap_or(&current.end_time);
        let (start, end) = parse_interval(start_time, end_time)?;
        let (start_time, end_time) = (format_time(start), format_time(end));
        let rescheduled = date != current.date
            || start_time != current.start_time
            || end_time != current.end_time;
        if rescheduled {
            if attendance::count_for_class(tx, class_id)? > 0 {
                return Err(EngineError::validation(format!(
                    "class {} already has attendance; its date and time are locked",
                    class_id
                )));
            }
            if conflict::find_conflict(tx, &current.group_id, date, start, end, Some(class_id))?
                .is_some()
            {
                return Err(EngineError::SessionConflict {
                    group_id: current.group_id.clone(),
                    date: date.to_string(),
                });
            }
        }

        let teacher_attendance = match update.teacher_attendance {
            Some(v) => v,
            None => current.teacher_attendance,
        };
        tx.execute(
            "UPDATE classes SET
               date = ?, start_time = ?, end_time = ?, teacher_attendance = ?,
               activities = ?, observations = ?, content = ?
             WHERE id = ?",
            (
                date,
                &start_time,
                &end_time,
                teacher_attendance,
                update.activities.as_deref().unwrap_or(&current.activities),
                update.observations.as_deref().unwrap_or(&current.observations),
                update.content.as_deref().unwrap_or(&current.content),
                class_id,
            ),
        )?;

        let updated = get_session(tx, class_id)?;
        let affected = attendance::apply_upserts(tx, &updated, upserts)?;
        attendance::recompute_students(tx, ctx.decimals(), &updated.group_id, &affected)?;
        Ok(updated)
    })?;
    info!(class_id, attendance = upserts.len(), "class information recorded");
    Ok(session)
}

/// Delete one class and its attendance, then recompute the students it touched.
pub fn delete_session(ctx: &EngineContext<'_>, class_id: &str) -> EngineResult<()> {
    ctx.write(|tx| {
        let session = get_session(tx, class_id)?;
        let students = attendance::students_for_classes(tx, &[session.id.clone()])?;
        tx.execute("DELETE FROM attendance WHERE class_id = ?", [class_id])?;
        tx.execute("DELETE FROM classes WHERE id = ?", [class_id])?;
        for student_id in &students {
            aggregate::recompute_attendance(tx, ctx.decimals(), student_id, &session.group_id)?;
        }
        Ok(())
    })?;
    info!(class_id, "class deleted");
    Ok(())
}

fn group_roster(conn: &Connection, group_id: &str) -> EngineResult<Vec<RosterEntry>> {
    let mut stmt = conn.prepare(
        "SELECT s.id, s.name, e.status
         FROM enrollments e
         JOIN students s ON s.id = e.student_id
         WHERE e.group_id = ?
         ORDER BY s.name, s.id",
    )?;
    let rows = stmt
        .query_map([group_id], |r| {
            Ok(RosterEntry {
                student_id: r.get(0)?,
                name: r.get(1)?,
                enrollment_status: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn list_sessions(conn: &Connection, filters: &SessionFilters) -> EngineResult<Vec<SessionView>> {
    let mut sql = format!(
        "SELECT {}, g.name, t.name, g.company_id, co.name
         FROM classes c
         JOIN training_groups g ON g.id = c.group_id
         JOIN teachers t ON t.id = c.teacher_id
         JOIN companies co ON co.id = g.company_id
         WHERE 1 = 1",
        SESSION_COLUMNS
    );
    let mut bind: Vec<Value> = Vec::new();
    if let Some(date) = filters.date {
        sql.push_str(" AND c.date = ?");
        bind.push(Value::Text(date.format("%Y-%m-%d").to_string()));
    }
    let text_filters = [
        ("c.group_id", &filters.group_id),
        ("c.teacher_id", &filters.teacher_id),
        ("g.company_id", &filters.company_id),
        ("c.id", &filters.class_id),
    ];
    for (column, value) in text_filters {
        if let Some(v) = value {
            sql.push_str(&format!(" AND {} = ?", column));
            bind.push(Value::Text(v.clone()));
        }
    }
    sql.push_str(" ORDER BY c.date, c.start_time, g.name");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(bind), |r| {
            Ok((
                session_from_row(r)?,
                r.get::<_, String>(11)?,
                r.get::<_, String>(12)?,
                r.get::<_, String>(13)?,
                r.get::<_, String>(14)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut rosters: HashMap<String, Vec<RosterEntry>> = HashMap::new();
    let mut out = Vec::with_capacity(rows.len());
    for (session, group_name, teacher_name, company_id, company_name) in rows {
        let minutes = session_minutes(&session)?;
        if !rosters.contains_key(&session.group_id) {
            rosters.insert(session.group_id.clone(), group_roster(conn, &session.group_id)?);
        }
        let students = rosters.get(&session.group_id).cloned().unwrap_or_default();
        let attendance = attendance::list_for_class(conn, &session.id)?;
        out.push(SessionView {
            session,
            group_name,
            teacher_name,
            company_id,
            company_name,
            duration_hours: aggregate::round_to(f64::from(minutes) / 60.0, 2),
            students,
            attendance,
        });
    }
    Ok(out)
}
