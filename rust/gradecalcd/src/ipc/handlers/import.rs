use crate::error::GradeError;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{
    ensure_workspace, get_grade_map, get_index, get_optional_str, get_required_str,
    get_semester, mutate,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Semester, StudentId};
use crate::reconcile::{
    self, parse_entered_rows, parse_pasted_text, parse_sheet_rows, EnteredRow, ExistingRowEdit,
    ParseOutcome, PendingCell, RowTargets,
};
use crate::sheet;
use serde_json::{json, Value};
use std::path::PathBuf;

fn staged_json(state: &AppState, semester: Semester) -> Value {
    let rows = reconcile::preview(&state.book, semester, state.staging.rows(semester));
    json!({ "semester": semester, "rows": rows })
}

/// Stages the parsed rows (replacing or appending) and reports the parse next to the new
/// staging contents.
fn stage(state: &mut AppState, semester: Semester, outcome: ParseOutcome, append: bool) -> Value {
    tracing::info!(
        semester = %semester,
        rows_total = outcome.rows_total,
        accepted = outcome.accepted(),
        skipped_rows = outcome.skipped_rows,
        skipped_cells = outcome.skipped_cells,
        "import rows staged"
    );
    let accepted = outcome.accepted();
    let summary = json!({
        "rowsTotal": outcome.rows_total,
        "accepted": accepted,
        "skippedRows": outcome.skipped_rows,
        "skippedCells": outcome.skipped_cells,
        "warnings": outcome.warnings,
    });
    if append {
        state.staging.append(semester, outcome.rows);
    } else {
        state.staging.replace(semester, outcome.rows);
    }
    let mut result = staged_json(state, semester);
    result["summary"] = summary;
    result
}

fn paste_preview(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let semester = get_semester(params)?;
    let Some(text) = params.get("text").and_then(|v| v.as_str()) else {
        return Err(HandlerErr::bad_params("missing text"));
    };
    let outcome = parse_pasted_text(semester, text, state.book.subjects(semester))?;
    Ok(stage(state, semester, outcome, false))
}

fn sheet_preview(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let semester = get_semester(params)?;
    let in_path = PathBuf::from(get_required_str(params, "inPath")?);
    let rows = sheet::read_first_sheet_file(&in_path).map_err(|e| HandlerErr {
        code: "sheet_read_failed",
        message: format!("{e:#}"),
        details: Some(json!({ "path": in_path.to_string_lossy() })),
    })?;
    let outcome = parse_sheet_rows(semester, &rows, state.book.subjects(semester))?;
    Ok(stage(state, semester, outcome, false))
}

fn entered_rows(params: &Value) -> Result<Vec<EnteredRow>, HandlerErr> {
    let Some(raw) = params.get("rows").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("rows must be an array"));
    };
    raw.iter()
        .map(|row| -> Result<EnteredRow, HandlerErr> {
            Ok(EnteredRow {
                class_name: get_optional_str(row, "class").unwrap_or_default(),
                name: get_optional_str(row, "name").unwrap_or_default(),
                values: match row.get("grades") {
                    Some(_) => get_grade_map(row, "grades")?,
                    None => Vec::new(),
                },
            })
        })
        .collect()
}

fn stage_rows(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let semester = get_semester(params)?;
    let rows = entered_rows(params)?;
    let first_line = state.staging.rows(semester).len() + 1;
    let outcome = parse_entered_rows(semester, first_line, &rows, state.book.subjects(semester))?;
    Ok(stage(state, semester, outcome, true))
}

fn staged(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let semester = get_semester(params)?;
    Ok(staged_json(state, semester))
}

fn remove_row(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let semester = get_semester(params)?;
    let index = get_index(params, "index")?;
    let removed = state.staging.remove(semester, index)?;
    let mut result = staged_json(state, semester);
    result["removed"] = json!(removed);
    Ok(result)
}

fn discard(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let semester = get_semester(params)?;
    let discarded = state.staging.discard(semester);
    Ok(json!({ "semester": semester, "discarded": discarded }))
}

fn existing_edits(params: &Value) -> Result<Vec<ExistingRowEdit>, HandlerErr> {
    let Some(raw) = params.get("existing") else {
        return Ok(Vec::new());
    };
    if raw.is_null() {
        return Ok(Vec::new());
    }
    let Some(items) = raw.as_array() else {
        return Err(HandlerErr::bad_params("existing must be an array"));
    };
    items
        .iter()
        .map(|item| -> Result<ExistingRowEdit, HandlerErr> {
            let values = match item.get("grades") {
                Some(_) => get_grade_map(item, "grades")?,
                None => Vec::new(),
            };
            Ok(ExistingRowEdit {
                student_id: StudentId::from(get_required_str(item, "studentId")?),
                class_name: get_optional_str(item, "class").unwrap_or_default(),
                name: get_optional_str(item, "name").unwrap_or_default(),
                values: values
                    .into_iter()
                    .map(|(subject_id, raw)| PendingCell { subject_id, raw })
                    .collect(),
            })
        })
        .collect()
}

/// `targets: [{index, studentId}]` pins staged rows (by preview index) to a student.
fn row_targets(params: &Value) -> Result<RowTargets, HandlerErr> {
    let Some(raw) = params.get("targets").filter(|v| !v.is_null()) else {
        return Ok(RowTargets::new());
    };
    let Some(items) = raw.as_array() else {
        return Err(HandlerErr::bad_params("targets must be an array"));
    };
    items
        .iter()
        .map(|item| -> Result<(usize, StudentId), HandlerErr> {
            Ok((
                get_index(item, "index")?,
                StudentId::from(get_required_str(item, "studentId")?),
            ))
        })
        .collect()
}

/// Ambiguous rows without a target stay staged for another round.
fn commit(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    ensure_workspace(state)?;
    let semester = get_semester(params)?;
    let existing = existing_edits(params)?;
    let targets = row_targets(params)?;
    let pending = state.staging.rows(semester).to_vec();
    if pending.is_empty() && existing.is_empty() {
        return Err(GradeError::bad_params("nothing staged to commit").into());
    }
    let summary = mutate(state, |book| {
        reconcile::commit(book, semester, &pending, &targets, &existing)
    })?;
    let unresolved = summary.unresolved.iter().map(|u| u.row.clone()).collect();
    state.staging.replace(semester, unresolved);
    let mut result = staged_json(state, semester);
    result["summary"] = json!(summary);
    Ok(result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "import.pastePreview" => paste_preview(state, &req.params),
        "import.sheetPreview" => sheet_preview(state, &req.params),
        "import.stageRows" => stage_rows(state, &req.params),
        "import.staged" => staged(state, &req.params),
        "import.removeRow" => remove_row(state, &req.params),
        "import.discard" => discard(state, &req.params),
        "import.commit" => commit(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
