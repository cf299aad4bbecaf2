use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{parse_params, to_json, with_engine};
use crate::ipc::types::{AppState, Request};
use crate::roster;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NameParams {
    name: String,
    email: Option<String>,
    company_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroupParams {
    name: String,
    company_id: String,
    teacher_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetTeacherParams {
    group_id: String,
    teacher_id: String,
}

fn handle_companies_create(state: &mut AppState, req: &Request) -> Value {
    with_engine(state, req, |ctx, params| {
        let p: NameParams = parse_params(params)?;
        let company = roster::create_company(ctx, &p.name)?;
        Ok(json!({ "company": to_json(&company)? }))
    })
}

fn handle_teachers_create(state: &mut AppState, req: &Request) -> Value {
    with_engine(state, req, |ctx, params| {
        let p: NameParams = parse_params(params)?;
        let teacher = roster::create_teacher(ctx, &p.name, p.email.as_deref())?;
        Ok(json!({ "teacher": to_json(&teacher)? }))
    })
}

fn handle_students_create(state: &mut AppState, req: &Request) -> Value {
    with_engine(state, req, |ctx, params| {
        let p: NameParams = parse_params(params)?;
        let student = roster::create_student(
            ctx,
            &p.name,
            p.email.as_deref(),
            p.company_id.as_deref(),
        )?;
        Ok(json!({ "student": to_json(&student)? }))
    })
}

fn handle_groups_create(state: &mut AppState, req: &Request) -> Value {
    with_engine(state, req, |ctx, params| {
        let p: GroupParams = parse_params(params)?;
        let group = roster::create_group(ctx, &p.name, &p.company_id, &p.teacher_id)?;
        Ok(json!({ "group": to_json(&group)? }))
    })
}

fn handle_groups_set_teacher(state: &mut AppState, req: &Request) -> Value {
    with_engine(state, req, |ctx, params| {
        let p: SetTeacherParams = parse_params(params)?;
        let group = roster::set_group_teacher(ctx, &p.group_id, &p.teacher_id)?;
        Ok(json!({ "group": to_json(&group)? }))
    })
}

fn handle_groups_get(state: &mut AppState, req: &Request) -> Value {
    with_engine(state, req, |ctx, params| {
        let Some(group_id) = params.get("groupId").and_then(|v| v.as_str()) else {
            return Err(HandlerErr::bad_params("missing groupId"));
        };
        let group = roster::get_group(ctx.conn, group_id)?;
        Ok(json!({ "group": to_json(&group)? }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "companies.create" => Some(handle_companies_create(state, req)),
        "teachers.create" => Some(handle_teachers_create(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "groups.create" => Some(handle_groups_create(state, req)),
        "groups.get" => Some(handle_groups_get(state, req)),
        "groups.setTeacher" => Some(handle_groups_set_teacher(state, req)),
        _ => None,
    }
}
