//! The per (student, group) projection read by reporting.
//!
//! `attendance_percentage` and `average_score` are written by the aggregators
//! through single-column UPDATEs so the two never overwrite each other.

use chrono::NaiveDate;
use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::aggregate;
use crate::context::EngineContext;
use crate::db::new_id;
use crate::error::{EngineError, EngineResult};
use crate::roster;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Active,
    Completed,
    Abandoned,
}

impl EnrollmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "abandoned" => Some(Self::Abandoned),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub id: String,
    pub student_id: String,
    pub group_id: String,
    pub attendance_percentage: Option<f64>,
    pub average_score: Option<f64>,
    pub status: EnrollmentStatus,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub observations: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentPatch {
    pub status: Option<EnrollmentStatus>,
    #[serde(default, deserialize_with = "crate::serde_util::double_option")]
    pub end_date: Option<Option<NaiveDate>>,
    pub observations: Option<String>,
}

const ENROLLMENT_COLUMNS: &str = "id, student_id, group_id, attendance_percentage, average_score,
     status, start_date, end_date, observations";

fn enrollment_from_row(r: &Row<'_>) -> rusqlite::Result<Enrollment> {
    let raw: String = r.get(5)?;
    let status = EnrollmentStatus::parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            rusqlite::types::Type::Text,
            format!("unknown enrollment status {:?}", raw).into(),
        )
    })?;
    Ok(Enrollment {
        id: r.get(0)?,
        student_id: r.get(1)?,
        group_id: r.get(2)?,
        attendance_percentage: r.get(3)?,
        average_score: r.get(4)?,
        status,
        start_date: r.get(6)?,
        end_date: r.get(7)?,
        observations: r.get(8)?,
    })
}

pub fn find_enrollment(
    conn: &Connection,
    student_id: &str,
    group_id: &str,
) -> EngineResult<Option<Enrollment>> {
    let sql = format!(
        "SELECT {} FROM enrollments WHERE student_id = ? AND group_id = ?",
        ENROLLMENT_COLUMNS
    );
    Ok(conn
        .query_row(&sql, (student_id, group_id), enrollment_from_row)
        .optional()?)
}

pub fn get_enrollment(conn: &Connection, student_id: &str, group_id: &str) -> EngineResult<Enrollment> {
    find_enrollment(conn, student_id, group_id)?
        .ok_or_else(|| EngineError::not_found("enrollment", format!("{}/{}", student_id, group_id)))
}

pub fn list_enrollments(
    conn: &Connection,
    group_id: Option<&str>,
    student_id: Option<&str>,
) -> EngineResult<Vec<Enrollment>> {
    let mut sql = format!("SELECT {} FROM enrollments WHERE 1 = 1", ENROLLMENT_COLUMNS);
    let mut bind: Vec<Value> = Vec::new();
    if let Some(g) = group_id {
        sql.push_str(" AND group_id = ?");
        bind.push(Value::Text(g.to_string()));
    }
    if let Some(s) = student_id {
        sql.push_str(" AND student_id = ?");
        bind.push(Value::Text(s.to_string()));
    }
    sql.push_str(" ORDER BY group_id, start_date, student_id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(bind), enrollment_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Enroll a student. Aggregates are computed immediately from whatever
/// attendance and exam results already exist for the pair.
pub fn create_enrollment(
    ctx: &EngineContext<'_>,
    student_id: &str,
    group_id: &str,
    start_date: NaiveDate,
    observations: Option<&str>,
) -> EngineResult<Enrollment> {
    let enrollment = ctx.write(|tx| {
        if !roster::student_exists(tx, student_id)? {
            return Err(EngineError::not_found("student", student_id));
        }
        if !roster::group_exists(tx, group_id)? {
            return Err(EngineError::not_found("group", group_id));
        }
        if find_enrollment(tx, student_id, group_id)?.is_some() {
            return Err(EngineError::Conflict(format!(
                "student {} is already enrolled in group {}",
                student_id, group_id
            )));
        }
        tx.execute(
            "INSERT INTO enrollments(id, student_id, group_id, status, start_date, observations)
             VALUES(?, ?, ?, 'active', ?, ?)",
            (
                new_id(),
                student_id,
                group_id,
                start_date,
                observations.unwrap_or(""),
            ),
        )?;
        aggregate::recompute_attendance(tx, ctx.decimals(), student_id, group_id)?;
        aggregate::recompute_score(tx, ctx.decimals(), student_id, group_id)?;
        get_enrollment(tx, student_id, group_id)
    })?;
    info!(student_id, group_id, "student enrolled");
    Ok(enrollment)
}

pub fn update_enrollment(
    ctx: &EngineContext<'_>,
    student_id: &str,
    group_id: &str,
    patch: &EnrollmentPatch,
) -> EngineResult<Enrollment> {
    ctx.write(|tx| {
        let current = get_enrollment(tx, student_id, group_id)?;
        let status = patch.status.unwrap_or(current.status);
        let end_date = match patch.end_date {
            Some(v) => v,
            None => current.end_date,
        };
        if let Some(end) = end_date {
            if end < current.start_date {
                return Err(EngineError::validation(format!(
                    "endDate {} is before startDate {}",
                    end, current.start_date
                )));
            }
        }
        let observations = patch
            .observations
            .clone()
            .unwrap_or_else(|| current.observations.clone());
        tx.execute(
            "UPDATE enrollments SET status = ?, end_date = ?, observations = ? WHERE id = ?",
            (status.as_str(), end_date, &observations, &current.id),
        )?;
        get_enrollment(tx, student_id, group_id)
    })
}

/// Returns false when no enrollment row exists for the pair.
pub fn set_attendance_percentage(
    conn: &Connection,
    student_id: &str,
    group_id: &str,
    value: f64,
) -> EngineResult<bool> {
    let n = conn.execute(
        "UPDATE enrollments SET attendance_percentage = ? WHERE student_id = ? AND group_id = ?",
        (value, student_id, group_id),
    )?;
    Ok(n > 0)
}

/// Returns false when no enrollment row exists for the pair.
pub fn set_average_score(
    conn: &Connection,
    student_id: &str,
    group_id: &str,
    value: f64,
) -> EngineResult<bool> {
    let n = conn.execute(
        "UPDATE enrollments SET average_score = ? WHERE student_id = ? AND group_id = ?",
        (value, student_id, group_id),
    )?;
    Ok(n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn seed(conn: &Connection) {
        conn.execute_batch(
            "INSERT INTO companies(id, name) VALUES('co', 'Acme');
             INSERT INTO teachers(id, name) VALUES('t', 'Ada');
             INSERT INTO training_groups(id, name, company_id, teacher_id) VALUES('g', 'B1', 'co', 't');
             INSERT INTO students(id, name) VALUES('s', 'Sam');
             INSERT INTO enrollments(id, student_id, group_id, start_date) VALUES('e', 's', 'g', '2024-01-01');",
        )
        .expect("seed");
    }

    #[test]
    fn reads_stored_status() {
        let conn = db::open_in_memory().expect("db");
        seed(&conn);
        let e = get_enrollment(&conn, "s", "g").expect("enrollment");
        assert_eq!(e.status, EnrollmentStatus::Active);
        assert_eq!(e.attendance_percentage, None);
    }

    #[test]
    fn unknown_status_is_a_read_error() {
        let conn = db::open_in_memory().expect("db");
        seed(&conn);
        conn.execute("UPDATE enrollments SET status = 'paused'", [])
            .expect("corrupt");
        assert!(matches!(
            get_enrollment(&conn, "s", "g"),
            Err(EngineError::Store(rusqlite::Error::FromSqlConversionFailure(5, _, _)))
        ));
        assert!(list_enrollments(&conn, Some("g"), None).is_err());
    }
}
