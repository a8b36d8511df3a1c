use crate::error::GradeError;
use crate::exports::{self, Export};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{get_optional_str, get_required_str, get_semester, get_student_id};
use crate::ipc::types::{AppState, Request};
use crate::sheet;
use serde_json::{json, Value};
use std::path::PathBuf;

fn write_export(params: &Value, export: Export) -> Result<Value, HandlerErr> {
    let out_dir = PathBuf::from(get_required_str(params, "outDir")?);
    let path = out_dir.join(&export.file_name);
    sheet::write_xlsx(&path, &export.workbook).map_err(|e| HandlerErr {
        code: "export_failed",
        message: format!("{e:#}"),
        details: Some(json!({ "path": path.to_string_lossy() })),
    })?;
    tracing::info!(path = %path.display(), "workbook exported");
    Ok(json!({
        "fileName": export.file_name,
        "path": path.to_string_lossy(),
    }))
}

fn template(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let semester = get_semester(params)?;
    let export = exports::template(&state.book, semester)?;
    write_export(params, export)
}

fn student(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = get_student_id(params)?;
    let Some(student) = state.book.student(&student_id) else {
        return Err(GradeError::not_found("student", student_id.as_str()).into());
    };
    write_export(params, exports::student(&state.book, student))
}

fn class(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let class_name = get_required_str(params, "class")?;
    let year = get_optional_str(params, "grade").filter(|s| !s.is_empty());
    let export = exports::class(&state.book, &class_name, year.as_deref())?;
    write_export(params, export)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "exports.template" => template(state, &req.params),
        "exports.student" => student(state, &req.params),
        "exports.class" => class(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
