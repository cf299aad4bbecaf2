use crate::config;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{clock_for, AppState, Request};
use chrono::NaiveDate;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::info;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "today": state.clock.today().to_string(),
        }),
    )
}

/// Open (creating if needed) the workspace database and load its settings.
pub fn open_workspace(
    state: &mut AppState,
    path: &Path,
    today: Option<NaiveDate>,
) -> anyhow::Result<()> {
    let conn = db::open_db(path)?;
    let settings = config::load_engine_settings(&conn)?;
    config::apply_connection_settings(&conn, &settings)?;
    state.workspace = Some(path.to_path_buf());
    state.db = Some(conn);
    state.settings = settings;
    state.clock = clock_for(today.or(state.default_today));
    info!(workspace = %path.display(), today = %state.clock.today(), "workspace opened");
    Ok(())
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };
    let today = match req.params.get("today").and_then(|v| v.as_str()) {
        Some(raw) => match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            Ok(d) => Some(d),
            Err(_) => return err(&req.id, "bad_params", "today must be YYYY-MM-DD", None),
        },
        None => None,
    };

    match open_workspace(state, &path, today) {
        Ok(()) => ok(
            &req.id,
            json!({
                "workspacePath": path.to_string_lossy(),
                "today": state.clock.today().to_string(),
            }),
        ),
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
