use crate::attendance::AttendanceUpsert;
use crate::error::EngineError;
use crate::ipc::helpers::{parse_params, to_json, with_engine};
use crate::ipc::types::{AppState, Request};
use crate::sessions::{self, SessionFilters, SessionUpdate};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddParams {
    group_id: String,
    date: NaiveDate,
    start_time: String,
    end_time: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClassParams {
    class_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateParams {
    class_id: String,
    #[serde(default)]
    patch: SessionUpdate,
    #[serde(default)]
    attendance: Vec<AttendanceUpsert>,
}

fn handle_classes_add(state: &mut AppState, req: &Request) -> Value {
    with_engine(state, req, |ctx, params| {
        let p: AddParams = parse_params(params)?;
        let class = sessions::add_single_session(ctx, &p.group_id, p.date, &p.start_time, &p.end_time)?;
        Ok(json!({ "class": to_json(&class)? }))
    })
}

fn handle_classes_list(state: &mut AppState, req: &Request) -> Value {
    with_engine(state, req, |ctx, params| {
        let filters: SessionFilters = parse_params(params)?;
        let classes = sessions::list_sessions(ctx.conn, &filters)?;
        Ok(json!({ "classes": to_json(&classes)? }))
    })
}

fn handle_classes_get(state: &mut AppState, req: &Request) -> Value {
    with_engine(state, req, |ctx, params| {
        let p: ClassParams = parse_params(params)?;
        let filters = SessionFilters {
            class_id: Some(p.class_id.clone()),
            ..SessionFilters::default()
        };
        let Some(class) = sessions::list_sessions(ctx.conn, &filters)?.into_iter().next() else {
            return Err(EngineError::not_found("class", p.class_id).into());
        };
        Ok(json!({ "class": to_json(&class)? }))
    })
}

fn handle_classes_update(state: &mut AppState, req: &Request) -> Value {
    with_engine(state, req, |ctx, params| {
        let p: UpdateParams = parse_params(params)?;
        let class = sessions::update_session(ctx, &p.class_id, &p.patch, &p.attendance)?;
        Ok(json!({ "class": to_json(&class)? }))
    })
}

fn handle_classes_delete(state: &mut AppState, req: &Request) -> Value {
    with_engine(state, req, |ctx, params| {
        let p: ClassParams = parse_params(params)?;
        sessions::delete_session(ctx, &p.class_id)?;
        Ok(json!({ "ok": true }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "classes.add" => Some(handle_classes_add(state, req)),
        "classes.list" => Some(handle_classes_list(state, req)),
        "classes.get" => Some(handle_classes_get(state, req)),
        "classes.update" => Some(handle_classes_update(state, req)),
        "classes.delete" => Some(handle_classes_delete(state, req)),
        _ => None,
    }
}
