use crate::calendar::SchedulePattern;
use crate::ipc::helpers::{parse_params, to_json, with_engine};
use crate::ipc::types::{AppState, Request};
use crate::sessions;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PatternParams {
    group_id: String,
    #[serde(flatten)]
    pattern: SchedulePattern,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroupParams {
    group_id: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ListParams {
    company_id: Option<String>,
}

fn handle_schedules_create(state: &mut AppState, req: &Request) -> Value {
    with_engine(state, req, |ctx, params| {
        let p: PatternParams = parse_params(params)?;
        let created = sessions::create_pattern(ctx, &p.group_id, &p.pattern)?;
        Ok(json!({
            "groupId": p.group_id,
            "createdCount": created.len(),
            "classes": to_json(&created)?,
        }))
    })
}

fn handle_schedules_update(state: &mut AppState, req: &Request) -> Value {
    with_engine(state, req, |ctx, params| {
        let p: PatternParams = parse_params(params)?;
        let created = sessions::replace_pattern(ctx, &p.group_id, &p.pattern)?;
        Ok(json!({
            "groupId": p.group_id,
            "today": ctx.today().to_string(),
            "createdCount": created.len(),
            "classes": to_json(&created)?,
        }))
    })
}

fn handle_schedules_delete(state: &mut AppState, req: &Request) -> Value {
    with_engine(state, req, |ctx, params| {
        let p: GroupParams = parse_params(params)?;
        let removed = sessions::delete_pattern(ctx, &p.group_id)?;
        Ok(json!({ "ok": true, "removedCount": removed }))
    })
}

fn handle_schedules_get(state: &mut AppState, req: &Request) -> Value {
    with_engine(state, req, |ctx, params| {
        let p: GroupParams = parse_params(params)?;
        let schedule = sessions::get_pattern(ctx.conn, &p.group_id)?;
        Ok(json!({ "schedule": to_json(&schedule)? }))
    })
}

fn handle_schedules_list(state: &mut AppState, req: &Request) -> Value {
    with_engine(state, req, |ctx, params| {
        let p: ListParams = parse_params(params)?;
        let schedules = sessions::list_patterns(ctx.conn, p.company_id.as_deref())?;
        Ok(json!({ "schedules": to_json(&schedules)? }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "schedules.create" => Some(handle_schedules_create(state, req)),
        "schedules.update" => Some(handle_schedules_update(state, req)),
        "schedules.delete" => Some(handle_schedules_delete(state, req)),
        "schedules.get" => Some(handle_schedules_get(state, req)),
        "schedules.list" => Some(handle_schedules_list(state, req)),
        _ => None,
    }
}
