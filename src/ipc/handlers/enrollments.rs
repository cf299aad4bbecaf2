use crate::enrollment::{self, EnrollmentPatch};
use crate::ipc::helpers::{parse_params, to_json, with_engine};
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateParams {
    student_id: String,
    group_id: String,
    start_date: NaiveDate,
    observations: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyParams {
    student_id: String,
    group_id: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ListParams {
    group_id: Option<String>,
    student_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateParams {
    student_id: String,
    group_id: String,
    #[serde(default)]
    patch: EnrollmentPatch,
}

fn handle_enrollments_create(state: &mut AppState, req: &Request) -> Value {
    with_engine(state, req, |ctx, params| {
        let p: CreateParams = parse_params(params)?;
        let e = enrollment::create_enrollment(
            ctx,
            &p.student_id,
            &p.group_id,
            p.start_date,
            p.observations.as_deref(),
        )?;
        Ok(json!({ "enrollment": to_json(&e)? }))
    })
}

fn handle_enrollments_get(state: &mut AppState, req: &Request) -> Value {
    with_engine(state, req, |ctx, params| {
        let p: KeyParams = parse_params(params)?;
        let e = enrollment::get_enrollment(ctx.conn, &p.student_id, &p.group_id)?;
        Ok(json!({ "enrollment": to_json(&e)? }))
    })
}

fn handle_enrollments_list(state: &mut AppState, req: &Request) -> Value {
    with_engine(state, req, |ctx, params| {
        let p: ListParams = parse_params(params)?;
        let rows = enrollment::list_enrollments(
            ctx.conn,
            p.group_id.as_deref(),
            p.student_id.as_deref(),
        )?;
        Ok(json!({ "enrollments": to_json(&rows)? }))
    })
}

fn handle_enrollments_update(state: &mut AppState, req: &Request) -> Value {
    with_engine(state, req, |ctx, params| {
        let p: UpdateParams = parse_params(params)?;
        let e = enrollment::update_enrollment(ctx, &p.student_id, &p.group_id, &p.patch)?;
        Ok(json!({ "enrollment": to_json(&e)? }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "enrollments.create" => Some(handle_enrollments_create(state, req)),
        "enrollments.get" => Some(handle_enrollments_get(state, req)),
        "enrollments.list" => Some(handle_enrollments_list(state, req)),
        "enrollments.update" => Some(handle_enrollments_update(state, req)),
        _ => None,
    }
}
