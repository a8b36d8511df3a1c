use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{
    get_optional_semester, get_optional_str, get_required_str, get_student_id, mutate,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Semester, StudentId};
use crate::store::StudentFilter;
use serde_json::{json, Value};

fn non_empty(params: &Value, key: &str) -> Option<String> {
    get_optional_str(params, key).filter(|s| !s.is_empty())
}

fn list(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let semester = get_optional_semester(params)?;
    let year = non_empty(params, "grade");
    let class_name = non_empty(params, "class");
    let students = state.book.students_matching(StudentFilter {
        semester,
        year: year.as_deref(),
        class_name: class_name.as_deref(),
    });
    Ok(json!({ "students": students }))
}

/// Either `semester`, or the form's separate `grade` (school year) and `term`.
fn creation_semester(params: &Value) -> Result<Semester, HandlerErr> {
    if let Some(sem) = get_optional_semester(params)? {
        return Ok(sem);
    }
    let year = get_required_str(params, "grade")?;
    let term = get_required_str(params, "term")?;
    Semester::from_year_term(&year, &term).ok_or_else(|| {
        HandlerErr::bad_params(format!("no semester for grade {} term {}", year, term))
    })
}

fn create(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let semester = creation_semester(params)?;
    let class_name = get_required_str(params, "class")?;
    let name = get_required_str(params, "name")?;
    let id = mutate(state, |book| book.add_student(semester, &class_name, &name))?;
    Ok(json!({ "studentId": id, "semester": semester }))
}

fn update(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_student_id(params)?;
    let class_name = get_required_str(params, "class")?;
    let name = get_required_str(params, "name")?;
    mutate(state, |book| book.update_student(&id, &class_name, &name))?;
    Ok(json!({ "studentId": id }))
}

fn delete(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_student_id(params)?;
    let removed = mutate(state, |book| book.remove_student(&id))?;
    Ok(json!({ "removed": removed }))
}

fn delete_many(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let Some(raw) = params.get("studentIds").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("studentIds must be an array"));
    };
    let ids: Vec<StudentId> = raw
        .iter()
        .filter_map(|v| match v {
            Value::String(s) => Some(StudentId::from(s.as_str())),
            Value::Number(n) => Some(StudentId::from(n.to_string())),
            _ => None,
        })
        .collect();
    if ids.is_empty() {
        return Err(HandlerErr::bad_params("select at least one student"));
    }
    let removed = mutate(state, |book| Ok(book.remove_students(&ids)))?;
    Ok(json!({ "removed": removed }))
}

fn search(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let year = non_empty(params, "grade");
    let class_name = get_required_str(params, "class")?;
    let name = get_required_str(params, "name")?;
    let Some(student) = state.book.find_student(year.as_deref(), &class_name, &name) else {
        return Err(HandlerErr {
            code: "not_found",
            message: format!("no student {} in class {}", name, class_name),
            details: Some(json!({ "class": class_name, "name": name })),
        });
    };
    Ok(json!({ "student": student }))
}

fn classes(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let year = non_empty(params, "grade");
    Ok(json!({ "classes": state.book.classes(year.as_deref()) }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "students.list" => list(state, &req.params),
        "students.create" => create(state, &req.params),
        "students.update" => update(state, &req.params),
        "students.delete" => delete(state, &req.params),
        "students.deleteMany" => delete_many(state, &req.params),
        "students.search" => search(state, &req.params),
        "classes.list" => classes(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
