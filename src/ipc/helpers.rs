use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::context::EngineContext;
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::types::{AppState, Request};

/// Decode `params` into a typed struct; a missing params object reads as `{}`.
pub fn parse_params<T: DeserializeOwned>(params: &Value) -> Result<T, HandlerErr> {
    let v = if params.is_null() {
        Value::Object(Default::default())
    } else {
        params.clone()
    };
    serde_json::from_value(v).map_err(|e| HandlerErr::bad_params(e.to_string()))
}

pub fn to_json<T: Serialize>(v: &T) -> Result<Value, HandlerErr> {
    serde_json::to_value(v).map_err(|e| HandlerErr {
        code: "internal",
        message: e.to_string(),
        details: None,
    })
}

/// Run a handler against the open workspace and wrap its outcome in the
/// response envelope.
pub fn with_engine<F>(state: &AppState, req: &Request, handler: F) -> Value
where
    F: FnOnce(&EngineContext<'_>, &Value) -> Result<Value, HandlerErr>,
{
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let ctx = EngineContext::new(conn, state.clock.as_ref(), &state.settings);
    match handler(&ctx, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id, &req.method),
    }
}
