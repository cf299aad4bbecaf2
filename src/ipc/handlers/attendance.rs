use crate::attendance::{self, AttendanceUpsert};
use crate::ipc::helpers::{parse_params, to_json, with_engine};
use crate::ipc::types::{AppState, Request};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BulkParams {
    class_id: String,
    records: Vec<AttendanceUpsert>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteParams {
    class_id: String,
    student_id: String,
}

fn handle_bulk_upsert(state: &mut AppState, req: &Request) -> Value {
    with_engine(state, req, |ctx, params| {
        let p: BulkParams = parse_params(params)?;
        let records = attendance::bulk_upsert(ctx, &p.class_id, &p.records)?;
        Ok(json!({ "attendance": to_json(&records)? }))
    })
}

fn handle_delete(state: &mut AppState, req: &Request) -> Value {
    with_engine(state, req, |ctx, params| {
        let p: DeleteParams = parse_params(params)?;
        attendance::delete_record(ctx, &p.class_id, &p.student_id)?;
        Ok(json!({ "ok": true }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "attendance.bulkUpsert" => Some(handle_bulk_upsert(state, req)),
        "attendance.delete" => Some(handle_delete(state, req)),
        _ => None,
    }
}
