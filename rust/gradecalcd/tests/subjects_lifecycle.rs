mod common;

use common::{request_err, request_ok, spawn_sidecar, str_at, temp_dir};
use serde_json::json;

fn names(list: &serde_json::Value) -> Vec<String> {
    list["subjects"]
        .as_array()
        .expect("subjects")
        .iter()
        .map(|s| s["name"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[test]
fn subjects_add_validate_reorder_and_remove() {
    let workspace = temp_dir("gradecalc-subjects");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let mut ids = Vec::new();
    for (i, name) in ["A", "B", "C"].iter().enumerate() {
        let res = request_ok(
            &mut stdin,
            &mut reader,
            &format!("add-{i}"),
            "subjects.add",
            json!({ "semester": "2-1", "name": name, "units": 3, "type": "direct" }),
        );
        ids.push(str_at(&res, "/subjectId").to_string());
    }

    // z-score subjects need a usable setting.
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "bad-z",
            "subjects.add",
            json!({ "semester": "2-1", "name": "수학", "units": 4, "type": "z-score", "mean": 70, "std": 0 }),
        ),
        "bad_params"
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "bad-units",
            "subjects.add",
            json!({ "semester": "2-1", "name": "수학", "units": 0, "type": "direct" }),
        ),
        "bad_params"
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "bad-type",
            "subjects.add",
            json!({ "semester": "2-1", "name": "수학", "units": 4, "type": "pass-fail" }),
        ),
        "bad_params"
    );
    let z = request_ok(
        &mut stdin,
        &mut reader,
        "z",
        "subjects.add",
        json!({ "semester": "2-1", "name": "수학", "units": 4, "type": "z-score", "mean": "70", "std": "10" }),
    );
    let z_id = str_at(&z, "/subjectId").to_string();

    let listed = request_ok(&mut stdin, &mut reader, "list", "subjects.list", json!({ "semester": "2-1" }));
    assert_eq!(names(&listed), ["A", "B", "C", "수학"]);
    assert_eq!(listed["subjects"][0]["inputLabel"], "등급");
    assert_eq!(listed["subjects"][3]["inputLabel"], "점수");
    assert_eq!(listed["subjects"][3]["zScore"]["mean"], 70.0);
    assert_eq!(listed["subjects"][3]["zScore"]["std"], 10.0);
    assert!(listed["subjects"][0]["zScore"].is_null());

    // Other semesters are independent.
    let other = request_ok(&mut stdin, &mut reader, "other", "subjects.list", json!({ "semester": "2-2" }));
    assert!(names(&other).is_empty());

    let reordered = request_ok(
        &mut stdin,
        &mut reader,
        "reorder",
        "subjects.reorder",
        json!({ "semester": "2-1", "fromIndex": 0, "toIndex": 2 }),
    );
    assert_eq!(names(&reordered), ["B", "C", "A", "수학"]);

    let same = request_ok(
        &mut stdin,
        &mut reader,
        "reorder-same",
        "subjects.reorder",
        json!({ "semester": "2-1", "fromIndex": 1, "toIndex": 1 }),
    );
    assert_eq!(names(&same), ["B", "C", "A", "수학"]);
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "reorder-oob",
            "subjects.reorder",
            json!({ "semester": "2-1", "fromIndex": 9, "toIndex": 0 }),
        ),
        "bad_params"
    );

    request_ok(
        &mut stdin,
        &mut reader,
        "rm",
        "subjects.remove",
        json!({ "semester": "2-1", "subjectId": z_id }),
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "rm-again",
            "subjects.remove",
            json!({ "semester": "2-1", "subjectId": z_id }),
        ),
        "not_found"
    );
    let after = request_ok(&mut stdin, &mut reader, "list-2", "subjects.list", json!({ "semester": "2-1" }));
    assert_eq!(names(&after), ["B", "C", "A"]);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn orphaned_grades_survive_subject_removal_and_reload() {
    let workspace = temp_dir("gradecalc-subject-orphans");
    let path = workspace.to_string_lossy().to_string();

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(&mut stdin, &mut reader, "1", "workspace.select", json!({ "path": path }));
    let kor = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "subjects.add",
        json!({ "semester": "1-1", "name": "국어", "units": 4, "type": "direct" }),
    );
    let kor_id = str_at(&kor, "/subjectId").to_string();
    let eng = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "subjects.add",
        json!({ "semester": "1-1", "name": "영어", "units": 2, "type": "direct" }),
    );
    let eng_id = str_at(&eng, "/subjectId").to_string();
    let student = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "students.create",
        json!({ "semester": "1-1", "class": "1", "name": "가" }),
    );
    let student_id = str_at(&student, "/studentId").to_string();
    let mut grades = serde_json::Map::new();
    grades.insert(kor_id.clone(), json!("2"));
    grades.insert(eng_id.clone(), json!("5"));
    request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "grades.save",
        json!({ "studentId": student_id, "semester": "1-1", "grades": grades }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "subjects.remove",
        json!({ "semester": "1-1", "subjectId": eng_id }),
    );
    drop(stdin);
    let _ = child.wait();

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(&mut stdin, &mut reader, "1", "workspace.select", json!({ "path": path }));
    let got = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "grades.get",
        json!({ "studentId": student_id, "semester": "1-1" }),
    );
    assert_eq!(got["grades"][&eng_id]["grade"], 5);
    assert_eq!(got["grades"][&kor_id]["grade"], 2);
    // (2*4 + 5*2) / 6 = 3.0; the orphan still counts.
    assert_eq!(got["semesterGrade"], 3.0);

    drop(stdin);
    let _ = child.wait();
}
