use serde_json::Value;

use crate::db::BlobStore;
use crate::error::GradeError;
use crate::ipc::error::HandlerErr;
use crate::ipc::types::AppState;
use crate::model::{Semester, StudentId, SubjectId};
use crate::store::Gradebook;

pub fn get_required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    get_optional_str(params, key)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// Strings and numbers are both accepted (class labels often arrive as numbers).
pub fn get_optional_str(params: &Value, key: &str) -> Option<String> {
    match params.get(key)? {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn get_index(params: &Value, key: &str) -> Result<usize, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_u64())
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a non-negative integer", key)))
}

pub fn get_semester(params: &Value) -> Result<Semester, HandlerErr> {
    let raw = get_required_str(params, "semester")?;
    Semester::parse(&raw)
        .ok_or_else(|| HandlerErr::bad_params(format!("unknown semester: {}", raw)))
}

pub fn get_optional_semester(params: &Value) -> Result<Option<Semester>, HandlerErr> {
    match get_optional_str(params, "semester").filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(raw) => Semester::parse(&raw)
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("unknown semester: {}", raw))),
    }
}

pub fn get_student_id(params: &Value) -> Result<StudentId, HandlerErr> {
    get_required_str(params, "studentId").map(StudentId::from)
}

pub fn get_subject_id(params: &Value) -> Result<SubjectId, HandlerErr> {
    get_required_str(params, "subjectId").map(SubjectId::from)
}

/// `{subjectId: raw}` where raw may be a string or a number; null means "left blank".
pub fn get_grade_map(params: &Value, key: &str) -> Result<Vec<(SubjectId, String)>, HandlerErr> {
    let Some(obj) = params.get(key).and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params(format!("{} must be an object", key)));
    };
    let mut out = Vec::with_capacity(obj.len());
    for (subject_id, v) in obj {
        let raw = match v {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Null => String::new(),
            _ => {
                return Err(HandlerErr::bad_params(format!(
                    "{}.{} must be a string or number",
                    key, subject_id
                )))
            }
        };
        out.push((SubjectId::from(subject_id.as_str()), raw));
    }
    Ok(out)
}

pub fn ensure_workspace(state: &AppState) -> Result<(), HandlerErr> {
    if state.db.is_none() {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    }
    Ok(())
}

/// Runs a store mutation and saves the whole gradebook. If either step fails the in-memory
/// gradebook is put back as it was.
pub fn mutate<T>(
    state: &mut AppState,
    f: impl FnOnce(&mut Gradebook) -> Result<T, GradeError>,
) -> Result<T, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    let snapshot = state.book.clone();
    let saved = f(&mut state.book).and_then(|out| {
        state.book.save(conn)?;
        Ok(out)
    });
    if saved.is_err() {
        state.book = snapshot;
    }
    Ok(saved?)
}

pub fn remove_document(state: &AppState) -> Result<(), HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    conn.remove(crate::store::STORAGE_KEY)
        .map_err(|e| HandlerErr::from(GradeError::from(e)))
}
