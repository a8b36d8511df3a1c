use crate::calc::semester_grade;
use crate::error::GradeError;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{
    get_grade_map, get_optional_semester, get_optional_str, get_semester, get_student_id,
    get_subject_id, mutate,
};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};

fn get(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = get_student_id(params)?;
    let semester = get_semester(params)?;
    if state.book.student(&student_id).is_none() {
        return Err(GradeError::not_found("student", student_id.as_str()).into());
    }
    let records = state.book.grades(&student_id, semester);
    Ok(json!({
        "studentId": student_id,
        "semester": semester,
        "grades": records.cloned().unwrap_or_default(),
        "semesterGrade": records.and_then(|r| semester_grade(r.values())),
    }))
}

/// Form save. Without an explicit semester the student's own semester is used.
fn save(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = get_student_id(params)?;
    let semester = match get_optional_semester(params)? {
        Some(sem) => sem,
        None => state
            .book
            .student(&student_id)
            .map(|s| s.semester)
            .ok_or_else(|| GradeError::not_found("student", student_id.as_str()))?,
    };
    let values = get_grade_map(params, "grades")?;
    let saved = mutate(state, |book| book.save_grades(&student_id, semester, &values))?;
    tracing::info!(student = %student_id, semester = %semester, saved, "grades saved");
    Ok(json!({
        "saved": saved,
        "semesterGrade": state
            .book
            .grades(&student_id, semester)
            .and_then(|r| semester_grade(r.values())),
    }))
}

fn save_cell(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = get_student_id(params)?;
    let semester = get_semester(params)?;
    let subject_id = get_subject_id(params)?;
    let raw = get_optional_str(params, "raw").unwrap_or_default();
    let record = mutate(state, |book| {
        book.save_grade(&student_id, semester, &subject_id, &raw)
    })?;
    Ok(json!({ "saved": record.is_some(), "record": record }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "grades.get" => get(state, &req.params),
        "grades.save" => save(state, &req.params),
        "grades.saveCell" => save_cell(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
