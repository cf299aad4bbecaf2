use crate::exams::{self, ExamResultPatch, NewExamResult};
use crate::ipc::helpers::{parse_params, to_json, with_engine};
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateExamParams {
    group_id: String,
    title: String,
    date: Option<NaiveDate>,
    max_score: Option<f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExamParams {
    exam_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateResultParams {
    exam_id: String,
    #[serde(flatten)]
    result: NewExamResult,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BulkResultParams {
    exam_id: String,
    results: Vec<NewExamResult>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateResultParams {
    result_id: String,
    #[serde(default)]
    patch: ExamResultPatch,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultParams {
    result_id: String,
}

fn handle_exams_create(state: &mut AppState, req: &Request) -> Value {
    with_engine(state, req, |ctx, params| {
        let p: CreateExamParams = parse_params(params)?;
        let exam = exams::create_exam(ctx, &p.group_id, &p.title, p.date, p.max_score)?;
        Ok(json!({ "exam": to_json(&exam)? }))
    })
}

fn handle_exams_delete(state: &mut AppState, req: &Request) -> Value {
    with_engine(state, req, |ctx, params| {
        let p: ExamParams = parse_params(params)?;
        exams::delete_exam(ctx, &p.exam_id)?;
        Ok(json!({ "ok": true }))
    })
}

fn handle_results_create(state: &mut AppState, req: &Request) -> Value {
    with_engine(state, req, |ctx, params| {
        let p: CreateResultParams = parse_params(params)?;
        let result = exams::create_result(ctx, &p.exam_id, &p.result)?;
        Ok(json!({ "result": to_json(&result)? }))
    })
}

fn handle_results_bulk_create(state: &mut AppState, req: &Request) -> Value {
    with_engine(state, req, |ctx, params| {
        let p: BulkResultParams = parse_params(params)?;
        let results = exams::bulk_create_results(ctx, &p.exam_id, &p.results)?;
        Ok(json!({ "results": to_json(&results)? }))
    })
}

fn handle_results_update(state: &mut AppState, req: &Request) -> Value {
    with_engine(state, req, |ctx, params| {
        let p: UpdateResultParams = parse_params(params)?;
        let result = exams::update_result(ctx, &p.result_id, &p.patch)?;
        Ok(json!({ "result": to_json(&result)? }))
    })
}

fn handle_results_delete(state: &mut AppState, req: &Request) -> Value {
    with_engine(state, req, |ctx, params| {
        let p: ResultParams = parse_params(params)?;
        exams::delete_result(ctx, &p.result_id)?;
        Ok(json!({ "ok": true }))
    })
}

fn handle_results_list(state: &mut AppState, req: &Request) -> Value {
    with_engine(state, req, |ctx, params| {
        let p: ExamParams = parse_params(params)?;
        let results = exams::list_results(ctx.conn, &p.exam_id)?;
        Ok(json!({ "results": to_json(&results)? }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "exams.create" => Some(handle_exams_create(state, req)),
        "exams.delete" => Some(handle_exams_delete(state, req)),
        "exams.results.create" => Some(handle_results_create(state, req)),
        "exams.results.bulkCreate" => Some(handle_results_bulk_create(state, req)),
        "exams.results.update" => Some(handle_results_update(state, req)),
        "exams.results.delete" => Some(handle_results_delete(state, req)),
        "exams.results.list" => Some(handle_results_list(state, req)),
        _ => None,
    }
}
