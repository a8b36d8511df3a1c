use crate::band::parse_finite;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{get_index, get_required_str, get_semester, get_subject_id, mutate};
use crate::ipc::types::{AppState, Request};
use crate::model::{Semester, SubjectType, ZScoreSetting};
use crate::store::{Gradebook, NewSubject};
use serde_json::{json, Value};

fn subject_list_json(book: &Gradebook, semester: Semester) -> Value {
    let rows: Vec<Value> = book
        .subjects(semester)
        .iter()
        .map(|s| {
            json!({
                "id": s.id,
                "name": s.name,
                "units": s.units,
                "type": s.kind,
                "inputLabel": s.kind.input_label(),
                "zScore": book.z_score_setting(semester, &s.id),
            })
        })
        .collect();
    json!({ "semester": semester, "subjects": rows })
}

fn number_param(params: &Value, key: &str) -> Option<f64> {
    match params.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_finite(s),
        _ => None,
    }
}

fn parse_new_subject(params: &Value) -> Result<NewSubject, HandlerErr> {
    let name = get_required_str(params, "name")?;
    let units = match params.get("units") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
    .and_then(|n| u32::try_from(n).ok())
    .ok_or_else(|| HandlerErr::bad_params("units must be a positive integer"))?;
    let type_raw = get_required_str(params, "type")?;
    let Some(kind) = SubjectType::parse(&type_raw) else {
        return Err(HandlerErr::bad_params(format!(
            "type must be 'direct' or 'z-score', got '{}'",
            type_raw
        )));
    };
    let z_score = match (number_param(params, "mean"), number_param(params, "std")) {
        (Some(mean), Some(std)) => Some(ZScoreSetting { mean, std }),
        _ => None,
    };
    Ok(NewSubject {
        name,
        units,
        kind,
        z_score,
    })
}

fn list(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let semester = get_semester(params)?;
    Ok(subject_list_json(&state.book, semester))
}

fn add(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let semester = get_semester(params)?;
    let new = parse_new_subject(params)?;
    let id = mutate(state, |book| book.add_subject(semester, new))?;
    Ok(json!({ "subjectId": id }))
}

fn remove(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let semester = get_semester(params)?;
    let subject_id = get_subject_id(params)?;
    let removed = mutate(state, |book| book.remove_subject(semester, &subject_id))?;
    Ok(json!({ "removed": removed }))
}

fn reorder(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let semester = get_semester(params)?;
    let from = get_index(params, "fromIndex")?;
    let to = get_index(params, "toIndex")?;
    mutate(state, |book| book.reorder_subjects(semester, from, to))?;
    Ok(subject_list_json(&state.book, semester))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "subjects.list" => Some(respond(&req.id, list(state, &req.params))),
        "subjects.add" => Some(respond(&req.id, add(state, &req.params))),
        "subjects.remove" => Some(respond(&req.id, remove(state, &req.params))),
        "subjects.reorder" => Some(respond(&req.id, reorder(state, &req.params))),
        _ => None,
    }
}
