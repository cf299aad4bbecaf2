//! Attendance and score aggregators.
//!
//! Both run inside the caller's transaction, recompute from the current rows
//! and write one column of the enrollment projection. An empty input set
//! leaves the stored value untouched.

use rusqlite::Connection;
use tracing::debug;

use crate::enrollment;
use crate::error::EngineResult;

pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// `None` when no class has been marked yet.
pub fn attendance_percentage(present: u32, marked: u32, decimals: u32) -> Option<f64> {
    if marked == 0 {
        return None;
    }
    Some(round_to(
        f64::from(present) / f64::from(marked) * 100.0,
        decimals,
    ))
}

pub fn mean_score(scores: &[f64], decimals: u32) -> Option<f64> {
    if scores.is_empty() {
        return None;
    }
    Some(round_to(
        scores.iter().sum::<f64>() / scores.len() as f64,
        decimals,
    ))
}

/// Denominator is the classes of the group that carry an attendance record
/// for the student, not every class of the group.
pub fn recompute_attendance(
    conn: &Connection,
    decimals: u32,
    student_id: &str,
    group_id: &str,
) -> EngineResult<Option<f64>> {
    let (marked, present): (u32, u32) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(CASE WHEN a.status = 'present' THEN 1 ELSE 0 END), 0)
         FROM attendance a
         JOIN classes c ON c.id = a.class_id
         WHERE a.student_id = ? AND c.group_id = ?",
        (student_id, group_id),
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;
    let Some(pct) = attendance_percentage(present, marked, decimals) else {
        debug!(student_id, group_id, "no marked classes, attendance left unchanged");
        return Ok(None);
    };
    let written = enrollment::set_attendance_percentage(conn, student_id, group_id, pct)?;
    debug!(student_id, group_id, present, marked, pct, written, "attendance recomputed");
    Ok(Some(pct))
}

pub fn recompute_score(
    conn: &Connection,
    decimals: u32,
    student_id: &str,
    group_id: &str,
) -> EngineResult<Option<f64>> {
    let mut stmt = conn.prepare(
        "SELECT r.score
         FROM exam_results r
         JOIN exams e ON e.id = r.exam_id
         WHERE r.student_id = ? AND e.group_id = ?",
    )?;
    let scores = stmt
        .query_map((student_id, group_id), |r| r.get::<_, f64>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    let Some(avg) = mean_score(&scores, decimals) else {
        debug!(student_id, group_id, "no exam results, average left unchanged");
        return Ok(None);
    };
    let written = enrollment::set_average_score(conn, student_id, group_id, avg)?;
    debug!(student_id, group_id, results = scores.len(), avg, written, "average score recomputed");
    Ok(Some(avg))
}
