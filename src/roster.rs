//! Companies, teachers, groups and students: the records the scheduling
//! engine reads but does not own.

use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use tracing::info;

use crate::context::EngineContext;
use crate::db::new_id;
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    pub name: String,
    pub company_id: String,
    pub teacher_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub company_id: Option<String>,
}

fn required_name(field: &str, raw: &str) -> EngineResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(EngineError::validation(format!("{} must not be empty", field)));
    }
    Ok(name.to_string())
}

fn exists(conn: &Connection, sql: &str, id: &str) -> EngineResult<bool> {
    Ok(conn
        .query_row(sql, [id], |r| r.get::<_, i64>(0))
        .optional()?
        .is_some())
}

pub fn company_exists(conn: &Connection, id: &str) -> EngineResult<bool> {
    exists(conn, "SELECT 1 FROM companies WHERE id = ?", id)
}

pub fn teacher_exists(conn: &Connection, id: &str) -> EngineResult<bool> {
    exists(conn, "SELECT 1 FROM teachers WHERE id = ?", id)
}

pub fn group_exists(conn: &Connection, id: &str) -> EngineResult<bool> {
    exists(conn, "SELECT 1 FROM training_groups WHERE id = ?", id)
}

pub fn student_exists(conn: &Connection, id: &str) -> EngineResult<bool> {
    exists(conn, "SELECT 1 FROM students WHERE id = ?", id)
}

pub fn get_group(conn: &Connection, id: &str) -> EngineResult<Group> {
    conn.query_row(
        "SELECT id, name, company_id, teacher_id FROM training_groups WHERE id = ?",
        [id],
        |r| {
            Ok(Group {
                id: r.get(0)?,
                name: r.get(1)?,
                company_id: r.get(2)?,
                teacher_id: r.get(3)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| EngineError::not_found("group", id))
}

/// The teacher new classes of this group are stamped with.
pub fn group_teacher(conn: &Connection, group_id: &str) -> EngineResult<String> {
    get_group(conn, group_id).map(|g| g.teacher_id)
}

pub fn create_company(ctx: &EngineContext<'_>, name: &str) -> EngineResult<Company> {
    let name = required_name("name", name)?;
    let company = Company { id: new_id(), name };
    ctx.write(|tx| {
        tx.execute(
            "INSERT INTO companies(id, name) VALUES(?, ?)",
            (&company.id, &company.name),
        )?;
        Ok(())
    })?;
    info!(company_id = %company.id, "company created");
    Ok(company)
}

pub fn create_teacher(
    ctx: &EngineContext<'_>,
    name: &str,
    email: Option<&str>,
) -> EngineResult<Teacher> {
    let teacher = Teacher {
        id: new_id(),
        name: required_name("name", name)?,
        email: email.map(|e| e.trim().to_string()).filter(|e| !e.is_empty()),
    };
    ctx.write(|tx| {
        tx.execute(
            "INSERT INTO teachers(id, name, email) VALUES(?, ?, ?)",
            (&teacher.id, &teacher.name, &teacher.email),
        )?;
        Ok(())
    })?;
    info!(teacher_id = %teacher.id, "teacher created");
    Ok(teacher)
}

pub fn create_group(
    ctx: &EngineContext<'_>,
    name: &str,
    company_id: &str,
    teacher_id: &str,
) -> EngineResult<Group> {
    let group = Group {
        id: new_id(),
        name: required_name("name", name)?,
        company_id: company_id.to_string(),
        teacher_id: teacher_id.to_string(),
    };
    ctx.write(|tx| {
        if !company_exists(tx, company_id)? {
            return Err(EngineError::not_found("company", company_id));
        }
        if !teacher_exists(tx, teacher_id)? {
            return Err(EngineError::not_found("teacher", teacher_id));
        }
        tx.execute(
            "INSERT INTO training_groups(id, name, company_id, teacher_id) VALUES(?, ?, ?, ?)",
            (&group.id, &group.name, &group.company_id, &group.teacher_id),
        )?;
        Ok(())
    })?;
    info!(group_id = %group.id, company_id, "group created");
    Ok(group)
}

/// Reassign the group's teacher. Existing classes keep the teacher they were
/// stamped with; only classes created afterwards pick up the new one.
pub fn set_group_teacher(
    ctx: &EngineContext<'_>,
    group_id: &str,
    teacher_id: &str,
) -> EngineResult<Group> {
    ctx.write(|tx| {
        if !teacher_exists(tx, teacher_id)? {
            return Err(EngineError::not_found("teacher", teacher_id));
        }
        let n = tx.execute(
            "UPDATE training_groups SET teacher_id = ? WHERE id = ?",
            (teacher_id, group_id),
        )?;
        if n == 0 {
            return Err(EngineError::not_found("group", group_id));
        }
        get_group(tx, group_id)
    })
}

pub fn create_student(
    ctx: &EngineContext<'_>,
    name: &str,
    email: Option<&str>,
    company_id: Option<&str>,
) -> EngineResult<Student> {
    let student = Student {
        id: new_id(),
        name: required_name("name", name)?,
        email: email.map(|e| e.trim().to_string()).filter(|e| !e.is_empty()),
        company_id: company_id.map(str::to_string),
    };
    ctx.write(|tx| {
        if let Some(cid) = student.company_id.as_deref() {
            if !company_exists(tx, cid)? {
                return Err(EngineError::not_found("company", cid));
            }
        }
        tx.execute(
            "INSERT INTO students(id, name, email, company_id) VALUES(?, ?, ?, ?)",
            (&student.id, &student.name, &student.email, &student.company_id),
        )?;
        Ok(())
    })?;
    info!(student_id = %student.id, "student created");
    Ok(student)
}
