//! Exams and exam results. Every result write recomputes the student's
//! average score for the exam's group in the same transaction.

use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::info;

use crate::aggregate;
use crate::context::EngineContext;
use crate::db::new_id;
use crate::error::{EngineError, EngineResult};
use crate::roster;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Exam {
    pub id: String,
    pub group_id: String,
    pub title: String,
    pub date: Option<NaiveDate>,
    pub max_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamResult {
    pub id: String,
    pub exam_id: String,
    pub student_id: String,
    pub score: f64,
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewExamResult {
    pub student_id: String,
    pub score: f64,
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamResultPatch {
    pub score: Option<f64>,
    #[serde(default, deserialize_with = "crate::serde_util::double_option")]
    pub feedback: Option<Option<String>>,
}

fn exam_from_row(r: &Row<'_>) -> rusqlite::Result<Exam> {
    Ok(Exam {
        id: r.get(0)?,
        group_id: r.get(1)?,
        title: r.get(2)?,
        date: r.get(3)?,
        max_score: r.get(4)?,
    })
}

fn result_from_row(r: &Row<'_>) -> rusqlite::Result<ExamResult> {
    Ok(ExamResult {
        id: r.get(0)?,
        exam_id: r.get(1)?,
        student_id: r.get(2)?,
        score: r.get(3)?,
        feedback: r.get(4)?,
    })
}

pub fn get_exam(conn: &Connection, exam_id: &str) -> EngineResult<Exam> {
    conn.query_row(
        "SELECT id, group_id, title, date, max_score FROM exams WHERE id = ?",
        [exam_id],
        exam_from_row,
    )
    .optional()?
    .ok_or_else(|| EngineError::not_found("exam", exam_id))
}

pub fn get_result(conn: &Connection, result_id: &str) -> EngineResult<ExamResult> {
    conn.query_row(
        "SELECT id, exam_id, student_id, score, feedback FROM exam_results WHERE id = ?",
        [result_id],
        result_from_row,
    )
    .optional()?
    .ok_or_else(|| EngineError::not_found("exam result", result_id))
}

pub fn list_results(conn: &Connection, exam_id: &str) -> EngineResult<Vec<ExamResult>> {
    get_exam(conn, exam_id)?;
    let mut stmt = conn.prepare(
        "SELECT id, exam_id, student_id, score, feedback
         FROM exam_results
         WHERE exam_id = ?
         ORDER BY student_id, rowid",
    )?;
    let rows = stmt
        .query_map([exam_id], result_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn check_score(exam: &Exam, score: f64) -> EngineResult<()> {
    if !score.is_finite() || score < 0.0 {
        return Err(EngineError::validation(format!(
            "score must be a non-negative number, got {}",
            score
        )));
    }
    if let Some(max) = exam.max_score {
        if score > max {
            return Err(EngineError::validation(format!(
                "score {} exceeds the exam maximum {}",
                score, max
            )));
        }
    }
    Ok(())
}

pub fn create_exam(
    ctx: &EngineContext<'_>,
    group_id: &str,
    title: &str,
    date: Option<NaiveDate>,
    max_score: Option<f64>,
) -> EngineResult<Exam> {
    let title = title.trim();
    if title.is_empty() {
        return Err(EngineError::validation("title must not be empty"));
    }
    if let Some(max) = max_score {
        if !max.is_finite() || max <= 0.0 {
            return Err(EngineError::validation("maxScore must be positive"));
        }
    }
    let exam = Exam {
        id: new_id(),
        group_id: group_id.to_string(),
        title: title.to_string(),
        date,
        max_score,
    };
    ctx.write(|tx| {
        if !roster::group_exists(tx, group_id)? {
            return Err(EngineError::not_found("group", group_id));
        }
        tx.execute(
            "INSERT INTO exams(id, group_id, title, date, max_score) VALUES(?, ?, ?, ?, ?)",
            (&exam.id, &exam.group_id, &exam.title, exam.date, exam.max_score),
        )?;
        Ok(())
    })?;
    info!(exam_id = %exam.id, group_id, "exam created");
    Ok(exam)
}

/// Deleting an exam drops its results and recomputes every student who had one.
pub fn delete_exam(ctx: &EngineContext<'_>, exam_id: &str) -> EngineResult<()> {
    ctx.write(|tx| {
        let exam = get_exam(tx, exam_id)?;
        let students: BTreeSet<String> = list_results(tx, exam_id)?
            .into_iter()
            .map(|r| r.student_id)
            .collect();
        tx.execute("DELETE FROM exam_results WHERE exam_id = ?", [exam_id])?;
        tx.execute("DELETE FROM exams WHERE id = ?", [exam_id])?;
        for student_id in &students {
            aggregate::recompute_score(tx, ctx.decimals(), student_id, &exam.group_id)?;
        }
        Ok(())
    })?;
    info!(exam_id, "exam deleted");
    Ok(())
}

fn insert_result(conn: &Connection, exam: &Exam, new: &NewExamResult) -> EngineResult<ExamResult> {
    if !roster::student_exists(conn, &new.student_id)? {
        return Err(EngineError::not_found("student", &new.student_id));
    }
    check_score(exam, new.score)?;
    let result = ExamResult {
        id: new_id(),
        exam_id: exam.id.clone(),
        student_id: new.student_id.clone(),
        score: new.score,
        feedback: new.feedback.clone(),
    };
    conn.execute(
        "INSERT INTO exam_results(id, exam_id, student_id, score, feedback) VALUES(?, ?, ?, ?, ?)",
        (
            &result.id,
            &result.exam_id,
            &result.student_id,
            result.score,
            &result.feedback,
        ),
    )?;
    Ok(result)
}

pub fn create_result(
    ctx: &EngineContext<'_>,
    exam_id: &str,
    new: &NewExamResult,
) -> EngineResult<ExamResult> {
    ctx.write(|tx| {
        let exam = get_exam(tx, exam_id)?;
        let result = insert_result(tx, &exam, new)?;
        aggregate::recompute_score(tx, ctx.decimals(), &result.student_id, &exam.group_id)?;
        Ok(result)
    })
}

/// All results land, and every affected average is recomputed, or nothing does.
pub fn bulk_create_results(
    ctx: &EngineContext<'_>,
    exam_id: &str,
    items: &[NewExamResult],
) -> EngineResult<Vec<ExamResult>> {
    let created = ctx.write(|tx| {
        let exam = get_exam(tx, exam_id)?;
        let created = items
            .iter()
            .map(|new| insert_result(tx, &exam, new))
            .collect::<EngineResult<Vec<_>>>()?;
        let students: BTreeSet<&str> = created.iter().map(|r| r.student_id.as_str()).collect();
        for student_id in students {
            aggregate::recompute_score(tx, ctx.decimals(), student_id, &exam.group_id)?;
        }
        Ok(created)
    })?;
    info!(exam_id, results = created.len(), "exam results recorded");
    Ok(created)
}

pub fn update_result(
    ctx: &EngineContext<'_>,
    result_id: &str,
    patch: &ExamResultPatch,
) -> EngineResult<ExamResult> {
    ctx.write(|tx| {
        let current = get_result(tx, result_id)?;
        let exam = get_exam(tx, &current.exam_id)?;
        let score = patch.score.unwrap_or(current.score);
        check_score(&exam, score)?;
        let feedback = match &patch.feedback {
            Some(v) => v.clone(),
            None => current.feedback.clone(),
        };
        tx.execute(
            "UPDATE exam_results SET score = ?, feedback = ? WHERE id = ?",
            (score, &feedback, result_id),
        )?;
        aggregate::recompute_score(tx, ctx.decimals(), &current.student_id, &exam.group_id)?;
        get_result(tx, result_id)
    })
}

pub fn delete_result(ctx: &EngineContext<'_>, result_id: &str) -> EngineResult<()> {
    ctx.write(|tx| {
        let current = get_result(tx, result_id)?;
        let exam = get_exam(tx, &current.exam_id)?;
        tx.execute("DELETE FROM exam_results WHERE id = ?", [result_id])?;
        aggregate::recompute_score(tx, ctx.decimals(), &current.student_id, &exam.group_id)?;
        Ok(())
    })
}
