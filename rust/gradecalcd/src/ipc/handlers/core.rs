use crate::db;
use crate::ipc::error::{err, ok, respond};
use crate::ipc::helpers::{ensure_workspace, remove_document};
use crate::ipc::types::{AppState, Request};
use crate::store::Gradebook;
use serde_json::json;
use std::path::{Path, PathBuf};

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        }),
    )
}

/// Opens the workspace database and loads the stored gradebook. A document that can't be read
/// leaves the workspace open on an empty gradebook; the blob itself is only replaced by the
/// next mutation.
pub fn open_workspace(state: &mut AppState, path: &Path) -> anyhow::Result<serde_json::Value> {
    let conn = db::open_db(path)?;

    let (book, warnings, load_error) = match Gradebook::load(&conn) {
        Ok((book, warnings)) => (book, warnings, None),
        Err(e) => {
            tracing::warn!(code = e.code(), error = %e, "stored gradebook could not be loaded");
            (
                Gradebook::new(),
                Vec::new(),
                Some(json!({ "code": e.code(), "message": e.to_string() })),
            )
        }
    };
    for w in &warnings {
        tracing::warn!(warning = %w, "stored gradebook entry dropped");
    }

    state.workspace = Some(path.to_path_buf());
    state.db = Some(conn);
    state.book = book;
    state.staging.clear();
    tracing::info!(
        workspace = %path.display(),
        students = state.book.students().len(),
        "workspace opened"
    );

    let mut result = json!({
        "workspacePath": path.to_string_lossy(),
        "students": state.book.students().len(),
        "warnings": warnings,
    });
    if let Some(e) = load_error {
        result["loadError"] = e;
    }
    Ok(result)
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

    match open_workspace(state, &path) {
        Ok(result) => ok(&req.id, result),
        Err(e) => err(&req.id, "db_open_failed", format!("{e:#}"), None),
    }
}

fn handle_data_reset(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = ensure_workspace(state).and_then(|_| {
        remove_document(state)?;
        state.book.reset();
        state.staging.clear();
        tracing::info!("all data reset");
        Ok(json!({ "reset": true }))
    });
    respond(&req.id, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "data.reset" => Some(handle_data_reset(state, req)),
        _ => None,
    }
}
