use crate::calc::{class_table, semester_grade, student_report, SemesterGrades};
use crate::error::GradeError;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{get_optional_str, get_required_str, get_semester, get_student_id};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};

fn semester_grade_report(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = get_student_id(params)?;
    let semester = get_semester(params)?;
    if state.book.student(&student_id).is_none() {
        return Err(GradeError::not_found("student", student_id.as_str()).into());
    }
    let grades = SemesterGrades::for_student(&state.book, &student_id);
    Ok(json!({
        "studentId": student_id,
        "semester": semester,
        "semesterGrade": state
            .book
            .grades(&student_id, semester)
            .and_then(|r| semester_grade(r.values())),
        "universityA": grades.university_a(),
        "universityB": grades.university_b(),
    }))
}

fn student(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = get_student_id(params)?;
    let report = student_report(&state.book, &student_id)?;
    Ok(json!(report))
}

fn class(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let class_name = get_required_str(params, "class")?;
    let semester = get_semester(params)?;
    let year = get_optional_str(params, "grade").filter(|s| !s.is_empty());
    let table = class_table(&state.book, &class_name, semester, year.as_deref());
    Ok(json!(table))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "reports.semesterGrade" => semester_grade_report(state, &req.params),
        "reports.student" => student(state, &req.params),
        "reports.classTable" => class(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
