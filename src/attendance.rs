use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::info;

use crate::aggregate;
use crate::context::EngineContext;
use crate::db::new_id;
use crate::error::{EngineError, EngineResult};
use crate::roster;
use crate::sessions::{self, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    WithoutNotice,
    InAdvance,
    BusinessTrip,
    StudentVacation,
    NationalHoliday,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::WithoutNotice => "without_notice",
            Self::InAdvance => "in_advance",
            Self::BusinessTrip => "business_trip",
            Self::StudentVacation => "student_vacation",
            Self::NationalHoliday => "national_holiday",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "present" => Some(Self::Present),
            "without_notice" => Some(Self::WithoutNotice),
            "in_advance" => Some(Self::InAdvance),
            "business_trip" => Some(Self::BusinessTrip),
            "student_vacation" => Some(Self::StudentVacation),
            "national_holiday" => Some(Self::NationalHoliday),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceUpsert {
    pub student_id: String,
    pub status: AttendanceStatus,
    /// Defaults to the full class for `present`, zero otherwise.
    pub minutes_attended: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: String,
    pub class_id: String,
    pub student_id: String,
    pub status: AttendanceStatus,
    pub minutes_attended: u32,
}

pub fn list_for_class(conn: &Connection, class_id: &str) -> EngineResult<Vec<AttendanceRecord>> {
    let mut stmt = conn.prepare(
        "SELECT a.id, a.class_id, a.student_id, a.status, a.minutes_attended
         FROM attendance a
         JOIN students s ON s.id = a.student_id
         WHERE a.class_id = ?
         ORDER BY s.name, a.student_id",
    )?;
    let rows = stmt
        .query_map([class_id], |r| {
            let status: String = r.get(3)?;
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                status,
                r.get::<_, u32>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter()
        .map(|(id, class_id, student_id, status, minutes_attended)| {
            let status = AttendanceStatus::parse(&status).ok_or_else(|| {
                EngineError::validation(format!("attendance {} has unknown status {:?}", id, status))
            })?;
            Ok(AttendanceRecord {
                id,
                class_id,
                student_id,
                status,
                minutes_attended,
            })
        })
        .collect()
}

pub fn count_for_class(conn: &Connection, class_id: &str) -> EngineResult<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM attendance WHERE class_id = ?",
        [class_id],
        |r| r.get(0),
    )?)
}

/// Distinct students with attendance in the given classes.
pub fn students_for_classes(conn: &Connection, class_ids: &[String]) -> EngineResult<BTreeSet<String>> {
    let mut stmt = conn.prepare("SELECT DISTINCT student_id FROM attendance WHERE class_id = ?")?;
    let mut out = BTreeSet::new();
    for class_id in class_ids {
        let ids = stmt
            .query_map([class_id], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        out.extend(ids);
    }
    Ok(out)
}

/// Upsert one record per (class, student) and return the affected students.
/// Does not recompute; callers do that once per student.
pub fn apply_upserts(
    conn: &Connection,
    session: &Session,
    upserts: &[AttendanceUpsert],
) -> EngineResult<BTreeSet<String>> {
    let duration = sessions::session_minutes(session)?;
    let mut affected = BTreeSet::new();
    for u in upserts {
        if !roster::student_exists(conn, &u.student_id)? {
            return Err(EngineError::not_found("student", &u.student_id));
        }
        let minutes = match u.minutes_attended {
            Some(m) => m,
            None if u.status == AttendanceStatus::Present => duration,
            None => 0,
        };
        if minutes > duration {
            return Err(EngineError::validation(format!(
                "minutesAttended {} for student {} exceeds class duration {}",
                minutes, u.student_id, duration
            )));
        }
        conn.execute(
            "INSERT INTO attendance(id, class_id, student_id, status, minutes_attended)
             VALUES(?, ?, ?, ?, ?)
             ON CONFLICT(class_id, student_id) DO UPDATE SET
               status = excluded.status,
               minutes_attended = excluded.minutes_attended",
            (new_id(), &session.id, &u.student_id, u.status.as_str(), minutes),
        )?;
        affected.insert(u.student_id.clone());
    }
    Ok(affected)
}

pub fn recompute_students<'a, I>(
    conn: &Connection,
    decimals: u32,
    group_id: &str,
    students: I,
) -> EngineResult<()>
where
    I: IntoIterator<Item = &'a String>,
{
    for student_id in students {
        aggregate::recompute_attendance(conn, decimals, student_id, group_id)?;
    }
    Ok(())
}

/// Mark a whole roster for one class in a single transaction.
pub fn bulk_upsert(
    ctx: &EngineContext<'_>,
    class_id: &str,
    upserts: &[AttendanceUpsert],
) -> EngineResult<Vec<AttendanceRecord>> {
    let records = ctx.write(|tx| {
        let session = sessions::get_session(tx, class_id)?;
        let affected = apply_upserts(tx, &session, upserts)?;
        recompute_students(tx, ctx.decimals(), &session.group_id, &affected)?;
        list_for_class(tx, class_id)
    })?;
    info!(class_id, records = upserts.len(), "attendance batch recorded");
    Ok(records)
}

/// Remove one record and recompute the student's percentage.
pub fn delete_record(ctx: &EngineContext<'_>, class_id: &str, student_id: &str) -> EngineResult<()> {
    ctx.write(|tx| {
        let session = sessions::get_session(tx, class_id)?;
        let id: Option<String> = tx
            .query_row(
                "SELECT id FROM attendance WHERE class_id = ? AND student_id = ?",
                (class_id, student_id),
                |r| r.get(0),
            )
            .optional()?;
        let Some(id) = id else {
            return Err(EngineError::not_found(
                "attendance",
                format!("{}/{}", class_id, student_id),
            ));
        };
        tx.execute("DELETE FROM attendance WHERE id = ?", [&id])?;
        aggregate::recompute_attendance(tx, ctx.decimals(), student_id, &session.group_id)?;
        Ok(())
    })?;
    info!(class_id, student_id, "attendance record deleted");
    Ok(())
}
